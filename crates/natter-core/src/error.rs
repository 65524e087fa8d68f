use natter_store::StoreError;
use thiserror::Error;

/// Generic text shown for infrastructure failures.
pub const UNEXPECTED_ERROR: &str = "An unexpected error occurred";

/// Failure of a core operation.
///
/// Every variant except [`ServiceError::Internal`] carries text that is safe
/// to show to the caller. `Internal` holds diagnostic detail for the logs.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Malformed or conflicting input.
    #[error("{0}")]
    Validation(String),

    /// A uniqueness or state constraint was violated.
    #[error("{0}")]
    Conflict(String),

    /// An unknown user or request.
    #[error("{0}")]
    NotFound(String),

    /// Deliberately does not say which credential was wrong.
    #[error("Invalid email or password")]
    InvalidCredentials,

    /// Infrastructure failure (store unreachable, write failed, ...).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Text to surface to the caller.
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal(_) => UNEXPECTED_ERROR.to_string(),
            other => other.to_string(),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        Self::Internal(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_detail_is_hidden() {
        let err = ServiceError::from(StoreError::Unavailable("disk on fire".into()));
        assert!(err.to_string().contains("disk on fire"));
        assert_eq!(err.public_message(), UNEXPECTED_ERROR);
    }

    #[test]
    fn user_facing_errors_pass_through() {
        assert_eq!(
            ServiceError::Conflict("Email is already registered".into()).public_message(),
            "Email is already registered"
        );
        assert_eq!(
            ServiceError::InvalidCredentials.public_message(),
            "Invalid email or password"
        );
    }
}
