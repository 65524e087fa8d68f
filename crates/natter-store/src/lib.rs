//! # natter-store
//!
//! SQLite-backed persistence for users, friend requests, friendships and
//! messages.
//!
//! The crate exposes a synchronous `Database` handle that wraps a
//! `rusqlite::Connection` and provides typed helpers for every domain model.
//! Uniqueness and at-most-once transitions are enforced by the schema and by
//! conditional writes inside transactions, never by read-then-write checks.

pub mod database;
pub mod friends;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod users;

mod error;

pub use database::Database;
pub use error::{StoreError, UniqueField};
pub use models::*;
