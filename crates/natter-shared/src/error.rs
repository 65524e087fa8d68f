use thiserror::Error;

#[derive(Error, Debug)]
pub enum PasswordError {
    #[error("Invalid hashing parameters: {0}")]
    Params(String),

    #[error("Password hashing failed: {0}")]
    Hash(String),

    #[error("Stored password hash is malformed")]
    MalformedHash,
}

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Session secret must be at least {min} bytes, got {got}")]
    SecretTooShort { min: usize, got: usize },

    #[error("Session expiry is out of range")]
    ExpiryOverflow,

    #[error("Token signing failed: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

#[derive(Error, Debug)]
#[error("Unknown request status: {0}")]
pub struct ParseStatusError(pub String);
