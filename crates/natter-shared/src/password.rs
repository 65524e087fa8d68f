//! Password hashing with Argon2id.
//!
//! Hashes are stored as PHC strings, so the salt and cost parameters travel
//! with the hash and verification works across parameter changes.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};

use crate::error::PasswordError;

const DECOY_PASSWORD: &[u8] = b"natter-decoy-password";

/// Argon2id hasher with tunable work factor.
#[derive(Clone)]
pub struct PasswordHasher {
    argon2: Argon2<'static>,
    /// Hash with this hasher's parameters, verified against when no account
    /// matches so that lookups for unknown users cost the same Argon2 work.
    decoy: String,
}

impl PasswordHasher {
    /// Build a hasher with the given memory cost (KiB) and iteration count.
    pub fn new(memory_kib: u32, iterations: u32) -> Result<Self, PasswordError> {
        let params = Params::new(memory_kib, iterations, 1, None)
            .map_err(|e| PasswordError::Params(e.to_string()))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let salt = SaltString::generate(&mut OsRng);
        let decoy = argon2
            .hash_password(DECOY_PASSWORD, &salt)
            .map_err(|e| PasswordError::Hash(e.to_string()))?
            .to_string();
        Ok(Self { argon2, decoy })
    }

    /// Produce a salted PHC hash string. The plaintext is never retained.
    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| PasswordError::Hash(e.to_string()))
    }

    /// Check `password` against a stored PHC hash.
    ///
    /// A malformed stored hash is an error; a mismatch is `Ok(false)`.
    pub fn verify(&self, password: &str, stored: &str) -> Result<bool, PasswordError> {
        let parsed = PasswordHash::new(stored).map_err(|_| PasswordError::MalformedHash)?;
        Ok(self
            .argon2
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }

    /// Spend one verification's worth of work on `password` and discard the
    /// result. Used when there is no stored hash to check against.
    pub fn verify_decoy(&self, password: &str) {
        let _ = self.verify(password, &self.decoy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> PasswordHasher {
        PasswordHasher::new(8 * 1024, 1).unwrap()
    }

    #[test]
    fn test_hash_is_not_plaintext() {
        let hasher = cheap();
        let hash = hasher.hash("hunter22").unwrap();
        assert_ne!(hash, "hunter22");
        assert!(hash.starts_with("$argon2id$"));
    }

    #[test]
    fn test_verify_matches_only_original() {
        let hasher = cheap();
        let hash = hasher.hash("pw1-secret").unwrap();
        assert!(hasher.verify("pw1-secret", &hash).unwrap());
        assert!(!hasher.verify("pw2-secret", &hash).unwrap());
    }

    #[test]
    fn test_same_password_different_salts() {
        let hasher = cheap();
        let a = hasher.hash("same-password").unwrap();
        let b = hasher.hash("same-password").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_malformed_hash_is_error() {
        assert!(matches!(
            cheap().verify("whatever", "not-a-phc-string"),
            Err(PasswordError::MalformedHash)
        ));
    }

    #[test]
    fn test_decoy_uses_configured_cost() {
        let hasher = PasswordHasher::new(8 * 1024, 2).unwrap();
        let decoy = PasswordHash::new(&hasher.decoy).unwrap();
        let params = Params::try_from(&decoy).unwrap();
        assert_eq!(params.m_cost(), 8 * 1024);
        assert_eq!(params.t_cost(), 2);

        assert!(!hasher.verify("pw1", &hasher.decoy).unwrap());
        hasher.verify_decoy("pw1");
    }

    #[test]
    fn test_invalid_params_rejected() {
        assert!(PasswordHasher::new(1, 1).is_err());
    }
}
