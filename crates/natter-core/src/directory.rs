//! User lookup. Every read here degrades to empty on failure.

use natter_shared::constants::SEARCH_RESULT_LIMIT;
use natter_shared::UserId;
use natter_store::{StoreError, UserProfile};
use tracing::warn;

use crate::store::Store;

#[derive(Clone)]
pub struct Directory {
    store: Store,
}

impl Directory {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Up to ten users whose username contains `query` (case-insensitive),
    /// never including `excluding`.
    pub async fn search_users(&self, query: &str, excluding: UserId) -> Vec<UserProfile> {
        let query = query.trim().to_string();
        if query.is_empty() {
            return Vec::new();
        }

        match self
            .store
            .run(move |db| db.search_users(&query, excluding, SEARCH_RESULT_LIMIT))
            .await
        {
            Ok(users) => users.into_iter().map(UserProfile::from).collect(),
            Err(e) => {
                warn!(error = %e, "user search failed");
                Vec::new()
            }
        }
    }

    /// Profile of the signed-in user.
    pub async fn get_user_profile(&self, user: UserId) -> Option<UserProfile> {
        self.lookup(user).await
    }

    /// Profile of any user, e.g. a chat counterpart.
    pub async fn get_user_by_id(&self, user: UserId) -> Option<UserProfile> {
        self.lookup(user).await
    }

    async fn lookup(&self, user: UserId) -> Option<UserProfile> {
        match self.store.run(move |db| db.get_user(user)).await {
            Ok(u) => Some(u.into()),
            Err(StoreError::NotFound) => None,
            Err(e) => {
                warn!(user = %user, error = %e, "user lookup failed");
                None
            }
        }
    }
}
