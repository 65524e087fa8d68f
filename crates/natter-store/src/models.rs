//! Domain model structs persisted in the SQLite database.
//!
//! Everything except [`User`] and [`NewUser`] derives `Serialize` so it can be handed
//! straight to the transport layer. `User` carries the password hash and
//! must be projected to a [`UserProfile`] before leaving the core.

use chrono::{DateTime, Utc};
use natter_shared::{MessageId, RequestId, RequestStatus, UserId};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A registered account, including its credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub mobile: String,
    /// Argon2id PHC string. Never the plaintext.
    pub password_hash: String,
    pub avatar: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields required to create a [`User`]; the id and timestamp are assigned
/// by the store.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub mobile: String,
    pub password_hash: String,
}

/// The public face of a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub mobile: String,
    pub avatar: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserProfile {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            username: u.username,
            email: u.email,
            mobile: u.mobile,
            avatar: u.avatar,
            created_at: u.created_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Friend request
// ---------------------------------------------------------------------------

/// A directed proposal of friendship.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequest {
    pub id: RequestId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}

/// A pending request joined with the sender's profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IncomingRequest {
    #[serde(flatten)]
    pub request: FriendRequest,
    pub sender: UserProfile,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single chat line between two users.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    pub seen: bool,
    pub created_at: DateTime<Utc>,
    /// Store insertion order, used to break `created_at` ties.
    #[serde(skip)]
    pub seq: i64,
}
