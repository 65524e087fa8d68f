use std::fmt;

use natter_shared::RequestStatus;
use thiserror::Error;

/// A uniqueness constraint on the `users` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Username,
    Email,
    Mobile,
}

impl fmt::Display for UniqueField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Username => "username",
            Self::Email => "email",
            Self::Mobile => "mobile",
        })
    }
}

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A query expected exactly one row but found none.
    #[error("Record not found")]
    NotFound,

    /// The store could not be reached (poisoned lock, worker failure).
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// A user column that must be unique already holds this value.
    #[error("Duplicate {0}")]
    Duplicate(UniqueField),

    /// A pending friend request already exists between the pair.
    #[error("A pending friend request already exists")]
    PendingRequestExists,

    /// The pair is already connected by a friendship.
    #[error("Users are already friends")]
    AlreadyFriends,

    /// The friend request has left the pending state.
    #[error("Friend request already {0}")]
    AlreadyResolved(RequestStatus),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Map `QueryReturnedNoRows` to [`StoreError::NotFound`].
pub(crate) fn not_found(e: rusqlite::Error) -> StoreError {
    match e {
        rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
        other => StoreError::Sqlite(other),
    }
}

/// Translate a UNIQUE violation on `users` into the offending field.
///
/// SQLite reports the violated columns in the message, e.g.
/// `UNIQUE constraint failed: users.email`.
pub(crate) fn user_conflict(e: rusqlite::Error) -> StoreError {
    if let rusqlite::Error::SqliteFailure(ref err, Some(ref msg)) = e {
        if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE {
            if msg.contains("users.username") {
                return StoreError::Duplicate(UniqueField::Username);
            }
            if msg.contains("users.email") {
                return StoreError::Duplicate(UniqueField::Email);
            }
            if msg.contains("users.mobile") {
                return StoreError::Duplicate(UniqueField::Mobile);
            }
        }
    }
    StoreError::Sqlite(e)
}

/// Whether `e` is any UNIQUE constraint violation.
pub(crate) fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}
