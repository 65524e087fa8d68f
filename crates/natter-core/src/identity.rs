//! Registration, authentication and profile updates.

use natter_shared::{PasswordHasher, Session, SessionKeys, UserId};
use natter_store::{NewUser, StoreError, UniqueField, UserProfile};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::error::{Result, ServiceError};
use crate::store::Store;

/// Normalised contact fields shared by registration and profile updates.
struct Contact {
    username: String,
    email: String,
    mobile: String,
}

impl Contact {
    fn parse(username: &str, email: &str, mobile: &str) -> Result<Self> {
        let username = username.trim();
        let email = email.trim();
        let mobile = mobile.trim();

        if username.is_empty() {
            return Err(ServiceError::Validation("Username is required".into()));
        }
        if email.is_empty() || !email.contains('@') {
            return Err(ServiceError::Validation(
                "A valid email address is required".into(),
            ));
        }
        if mobile.is_empty() {
            return Err(ServiceError::Validation("Mobile number is required".into()));
        }

        Ok(Self {
            username: username.to_string(),
            email: email.to_string(),
            mobile: mobile.to_string(),
        })
    }
}

fn conflict_message(field: UniqueField) -> &'static str {
    match field {
        UniqueField::Username => "Username is already taken",
        UniqueField::Email => "Email is already registered",
        UniqueField::Mobile => "Mobile number is already registered",
    }
}

#[derive(Clone)]
pub struct IdentityService {
    store: Store,
    hasher: PasswordHasher,
    keys: SessionKeys,
}

impl IdentityService {
    pub fn new(store: Store, hasher: PasswordHasher, keys: SessionKeys) -> Self {
        Self {
            store,
            hasher,
            keys,
        }
    }

    /// Create an account. Username, email and mobile must each be unused;
    /// usernames compare case-insensitively, email and mobile exactly.
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        mobile: &str,
        password: &str,
    ) -> Result<UserId> {
        let contact = Contact::parse(username, email, mobile)?;
        if password.is_empty() {
            return Err(ServiceError::Validation("Password is required".into()));
        }

        let password_hash = self.hash(Zeroizing::new(password.to_string())).await?;
        let new = NewUser {
            username: contact.username,
            email: contact.email,
            mobile: contact.mobile,
            password_hash,
        };

        match self.store.run(move |db| db.create_user(&new)).await {
            Ok(user) => {
                info!(user = %user.id, username = %user.username, "user registered");
                Ok(user.id)
            }
            Err(StoreError::Duplicate(field)) => {
                debug!(%field, "registration rejected: duplicate");
                Err(ServiceError::Conflict(conflict_message(field).into()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Check credentials and mint a session token.
    ///
    /// Unknown email and wrong password produce the same error.
    pub async fn login(&self, email: &str, password: &str) -> Result<String> {
        let email = email.trim().to_string();
        let found = self
            .store
            .run(move |db| db.find_user_by_email(&email))
            .await?;

        // Unknown emails still pay for one Argon2 verification.
        let hasher = self.hasher.clone();
        let password = Zeroizing::new(password.to_string());
        let stored = found.as_ref().map(|u| u.password_hash.clone());
        let matches = tokio::task::spawn_blocking(move || match stored {
            Some(stored) => hasher.verify(&password, &stored),
            None => {
                hasher.verify_decoy(&password);
                Ok(false)
            }
        })
        .await
        .map_err(|e| ServiceError::Internal(format!("Password task failed: {e}")))?;

        let Some(user) = found else {
            debug!("login rejected: unknown email");
            return Err(ServiceError::InvalidCredentials);
        };

        match matches {
            Ok(true) => {
                let token = self
                    .keys
                    .issue(user.id)
                    .map_err(|e| ServiceError::Internal(e.to_string()))?;
                info!(user = %user.id, "login succeeded");
                Ok(token)
            }
            Ok(false) => {
                debug!(user = %user.id, "login rejected: wrong password");
                Err(ServiceError::InvalidCredentials)
            }
            Err(e) => {
                warn!(user = %user.id, error = %e, "stored password hash unusable");
                Err(ServiceError::InvalidCredentials)
            }
        }
    }

    /// Resolve a presented token. Any failure means "no session".
    pub fn authenticate(&self, token: &str) -> Option<Session> {
        self.keys.verify(token)
    }

    /// End a session.
    ///
    /// Tokens are stateless, so this only tells the caller to discard its
    /// copy. A token copied before logout keeps working until it expires.
    pub fn logout(&self, session: &Session) {
        debug!(user = %session.user_id, "logout");
    }

    /// Change username, email and mobile, re-checking uniqueness against
    /// every other user.
    pub async fn update_profile(
        &self,
        user_id: UserId,
        username: &str,
        email: &str,
        mobile: &str,
    ) -> Result<UserProfile> {
        let contact = Contact::parse(username, email, mobile)?;

        let result = self
            .store
            .run(move |db| {
                db.update_user_profile(user_id, &contact.username, &contact.email, &contact.mobile)
            })
            .await;

        match result {
            Ok(user) => {
                info!(user = %user_id, "profile updated");
                Ok(user.into())
            }
            Err(StoreError::Duplicate(field)) => {
                Err(ServiceError::Conflict(conflict_message(field).into()))
            }
            Err(StoreError::NotFound) => Err(ServiceError::NotFound("User not found".into())),
            Err(e) => Err(e.into()),
        }
    }

    async fn hash(&self, password: Zeroizing<String>) -> Result<String> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| ServiceError::Internal(format!("Password task failed: {e}")))?
            .map_err(|e| ServiceError::Internal(e.to_string()))
    }
}
