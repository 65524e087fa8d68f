//! CRUD operations for [`User`] records.
//!
//! Uniqueness of username, email and mobile is enforced by the schema; the
//! helpers here never check-then-insert. Usernames are compared through
//! `username_key`, the Unicode lowercase form computed by [`username_key`].

use natter_shared::UserId;
use rusqlite::{params, OptionalExtension};

use crate::database::{self, format_ts, parse_ts, parse_uuid, Database};
use crate::error::{not_found, user_conflict, Result, StoreError};
use crate::models::{NewUser, User};

const USER_COLUMNS: &str = "id, username, email, mobile, password_hash, avatar, created_at";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new user. A clash on any unique column is reported as
    /// [`StoreError::Duplicate`] naming the column.
    pub fn create_user(&self, new: &NewUser) -> Result<User> {
        let user = User {
            id: UserId::new(),
            username: new.username.clone(),
            email: new.email.clone(),
            mobile: new.mobile.clone(),
            password_hash: new.password_hash.clone(),
            avatar: None,
            created_at: database::now(),
        };

        self.conn()
            .execute(
                "INSERT INTO users
                    (id, username, username_key, email, mobile, password_hash, avatar, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    user.id.to_string(),
                    user.username,
                    username_key(&user.username),
                    user.email,
                    user.mobile,
                    user.password_hash,
                    user.avatar,
                    format_ts(&user.created_at),
                ],
            )
            .map_err(user_conflict)?;

        Ok(user)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_user(&self, id: UserId) -> Result<User> {
        self.conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id.to_string()],
                row_to_user,
            )
            .map_err(not_found)
    }

    /// Exact-match lookup by email.
    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
                params![email],
                row_to_user,
            )
            .optional()?)
    }

    /// Case-insensitive lookup by username.
    pub fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE username_key = ?1"),
                params![username_key(username)],
                row_to_user,
            )
            .optional()?)
    }

    /// Case-insensitive substring search on username, excluding one user,
    /// ordered by username.
    pub fn search_users(&self, query: &str, excluding: UserId, limit: u32) -> Result<Vec<User>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users
             WHERE instr(username_key, ?1) > 0
               AND id <> ?2
             ORDER BY username_key ASC
             LIMIT ?3"
        ))?;

        let rows = stmt.query_map(
            params![username_key(query), excluding.to_string(), limit],
            row_to_user,
        )?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Replace username, email and mobile. Values owned by another user are
    /// rejected by the unique indexes; re-submitting one's own values is fine.
    pub fn update_user_profile(
        &self,
        id: UserId,
        username: &str,
        email: &str,
        mobile: &str,
    ) -> Result<User> {
        let affected = self
            .conn()
            .execute(
                "UPDATE users
                 SET username = ?1, username_key = ?2, email = ?3, mobile = ?4
                 WHERE id = ?5",
                params![username, username_key(username), email, mobile, id.to_string()],
            )
            .map_err(user_conflict)?;

        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        self.get_user(id)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Case-folded form used for username uniqueness, lookup and search.
/// SQLite's `lower()` and `NOCASE` only fold ASCII.
pub(crate) fn username_key(username: &str) -> String {
    username.to_lowercase()
}

/// Map a row selected with [`USER_COLUMNS`] starting at `offset`.
pub(crate) fn user_at(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<User> {
    let id_str: String = row.get(offset)?;
    let created_str: String = row.get(offset + 6)?;

    Ok(User {
        id: UserId(parse_uuid(offset, &id_str)?),
        username: row.get(offset + 1)?,
        email: row.get(offset + 2)?,
        mobile: row.get(offset + 3)?,
        password_hash: row.get(offset + 4)?,
        avatar: row.get(offset + 5)?,
        created_at: parse_ts(offset + 6, &created_str)?,
    })
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    user_at(row, 0)
}
