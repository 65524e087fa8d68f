//! Stateless session tokens.
//!
//! A token is an HS256 JWT carrying the user id (`sub`), issue and expiry
//! times and a random `jti`. The signing key is derived from the server
//! secret with BLAKE3 so the raw secret never keys a MAC directly.
//!
//! There is no server-side session table. Logging out only discards the
//! client's copy, so a token captured before logout remains valid until its
//! `exp` passes.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::constants::{
    DEFAULT_SESSION_TTL_DAYS, KDF_CONTEXT_SESSION_KEY, MIN_SESSION_SECRET_LEN, SESSION_NONCE_SIZE,
};
use crate::error::TokenError;
use crate::types::UserId;

/// Proof of authentication reconstructed from a verified token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: UserId,
    pub expires: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenClaims {
    sub: UserId,
    iat: i64,
    exp: i64,
    jti: String,
}

/// Issues and verifies session tokens with a process-wide secret.
#[derive(Clone)]
pub struct SessionKeys {
    signing_key: [u8; 32],
    ttl: Duration,
}

impl SessionKeys {
    /// Derive the signing key from the configured secret.
    pub fn from_secret(secret: &[u8]) -> Result<Self, TokenError> {
        if secret.len() < MIN_SESSION_SECRET_LEN {
            return Err(TokenError::SecretTooShort {
                min: MIN_SESSION_SECRET_LEN,
                got: secret.len(),
            });
        }
        Ok(Self {
            signing_key: blake3::derive_key(KDF_CONTEXT_SESSION_KEY, secret),
            ttl: Duration::days(DEFAULT_SESSION_TTL_DAYS),
        })
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn issue(&self, user_id: UserId) -> Result<String, TokenError> {
        self.issue_at(user_id, Utc::now())
    }

    pub fn issue_at(&self, user_id: UserId, now: DateTime<Utc>) -> Result<String, TokenError> {
        let expires = now
            .checked_add_signed(self.ttl)
            .ok_or(TokenError::ExpiryOverflow)?;

        let mut nonce = [0u8; SESSION_NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut nonce);

        let claims = TokenClaims {
            sub: user_id,
            iat: now.timestamp(),
            exp: expires.timestamp(),
            jti: URL_SAFE_NO_PAD.encode(nonce),
        };

        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&self.signing_key),
        )?)
    }

    /// Returns `None` for malformed, tampered, or expired tokens.
    pub fn verify(&self, token: &str) -> Option<Session> {
        self.verify_at(token, Utc::now())
    }

    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Option<Session> {
        // Expiry is checked below against `now`, without clock leeway.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let data = jsonwebtoken::decode::<TokenClaims>(
            token.trim(),
            &DecodingKey::from_secret(&self.signing_key),
            &validation,
        )
        .ok()?;

        let expires = DateTime::from_timestamp(data.claims.exp, 0)?;
        if expires <= now {
            return None;
        }

        Some(Session {
            user_id: data.claims.sub,
            expires,
        })
    }
}

impl Drop for SessionKeys {
    fn drop(&mut self) {
        self.signing_key.zeroize();
    }
}
