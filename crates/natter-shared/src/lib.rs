//! Types and primitives shared by every natter crate: identifiers, request
//! status, session tokens and password hashing.

pub mod constants;
pub mod error;
pub mod password;
pub mod session;
pub mod types;

pub use password::PasswordHasher;
pub use session::{Session, SessionKeys};
pub use types::{MessageId, RequestId, RequestStatus, UserId};
