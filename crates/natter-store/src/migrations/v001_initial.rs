//! v001 -- Initial schema creation.
//!
//! Creates the four core tables: `users`, `friend_requests`, `friendships`
//! and `messages`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id            TEXT PRIMARY KEY NOT NULL,          -- UUID v4
    username      TEXT NOT NULL,
    username_key  TEXT NOT NULL UNIQUE,               -- Unicode-lowercased username
    email         TEXT NOT NULL UNIQUE,
    mobile        TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,                      -- Argon2id PHC string
    avatar        TEXT,
    created_at    TEXT NOT NULL                       -- RFC-3339, micros, UTC
);

-- ----------------------------------------------------------------
-- Friend requests
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS friend_requests (
    id          TEXT PRIMARY KEY NOT NULL,            -- UUID v4
    sender_id   TEXT NOT NULL,                        -- FK -> users(id)
    receiver_id TEXT NOT NULL,                        -- FK -> users(id)
    status      TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'accepted', 'rejected')),
    created_at  TEXT NOT NULL,

    CHECK (sender_id <> receiver_id),
    FOREIGN KEY (sender_id) REFERENCES users(id),
    FOREIGN KEY (receiver_id) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_friend_requests_receiver
    ON friend_requests(receiver_id, status, created_at DESC);

-- At most one pending request per unordered pair.
CREATE UNIQUE INDEX IF NOT EXISTS idx_friend_requests_pending_pair
    ON friend_requests(min(sender_id, receiver_id), max(sender_id, receiver_id))
    WHERE status = 'pending';

-- ----------------------------------------------------------------
-- Friendships (always two rows per pair)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS friendships (
    user_id    TEXT NOT NULL,                         -- FK -> users(id)
    friend_id  TEXT NOT NULL,                         -- FK -> users(id)
    created_at TEXT NOT NULL,

    PRIMARY KEY (user_id, friend_id),
    FOREIGN KEY (user_id) REFERENCES users(id),
    FOREIGN KEY (friend_id) REFERENCES users(id)
);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    seq         INTEGER PRIMARY KEY AUTOINCREMENT,    -- insertion order tie-break
    id          TEXT NOT NULL UNIQUE,                 -- UUID v4
    sender_id   TEXT NOT NULL,                        -- FK -> users(id)
    receiver_id TEXT NOT NULL,                        -- FK -> users(id)
    content     TEXT NOT NULL,
    seen        INTEGER NOT NULL DEFAULT 0,           -- boolean 0/1
    created_at  TEXT NOT NULL,

    FOREIGN KEY (sender_id) REFERENCES users(id),
    FOREIGN KEY (receiver_id) REFERENCES users(id)
);

CREATE INDEX IF NOT EXISTS idx_messages_pair
    ON messages(sender_id, receiver_id, created_at, seq);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
