//! # natter-core
//!
//! The services behind natter: identity, friend requests, messaging with
//! live push, and user lookup. Everything here is transport-agnostic; the
//! server crate maps these calls onto HTTP and WebSocket routes.
//!
//! Write paths return [`ServiceError`]; read paths that list or look
//! things up log failures and return empty results instead.

pub mod directory;
pub mod error;
pub mod hub;
pub mod identity;
pub mod messaging;
pub mod relationships;
pub mod store;

pub use directory::Directory;
pub use error::{ServiceError, UNEXPECTED_ERROR};
pub use hub::{ConversationHub, Subscription};
pub use identity::IdentityService;
pub use messaging::MessagingService;
pub use relationships::RelationshipService;
pub use store::Store;

use natter_shared::{PasswordHasher, SessionKeys};
use natter_store::Database;

/// All services wired to one store and one push hub.
#[derive(Clone)]
pub struct Core {
    pub identity: IdentityService,
    pub relationships: RelationshipService,
    pub messaging: MessagingService,
    pub directory: Directory,
}

impl Core {
    pub fn new(db: Database, keys: SessionKeys, hasher: PasswordHasher) -> Self {
        let store = Store::new(db);
        Self {
            identity: IdentityService::new(store.clone(), hasher, keys),
            relationships: RelationshipService::new(store.clone()),
            messaging: MessagingService::new(store.clone(), ConversationHub::new()),
            directory: Directory::new(store),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{cheap_hasher, session_keys};
    use natter_shared::RequestStatus;

    fn core() -> Core {
        Core::new(
            Database::open_in_memory().unwrap(),
            session_keys(),
            cheap_hasher(),
        )
    }

    #[tokio::test]
    async fn alice_and_bob() {
        let core = core();

        let alice = core
            .identity
            .register("alice", "alice@x.com", "+1000", "pw1")
            .await
            .unwrap();
        let bob = core
            .identity
            .register("bob", "bob@x.com", "+2000", "pw2")
            .await
            .unwrap();

        let token = core.identity.login("alice@x.com", "pw1").await.unwrap();
        assert_eq!(core.identity.authenticate(&token).unwrap().user_id, alice);

        let request = core.relationships.send_request(alice, "bob").await.unwrap();

        let duplicate = core
            .relationships
            .send_request(bob, "alice")
            .await
            .unwrap_err();
        assert!(duplicate.public_message().contains("already exists"));

        let accepted = core.relationships.respond(request.id, bob, true).await.unwrap();
        assert_eq!(accepted.status, RequestStatus::Accepted);
        assert!(core.relationships.are_friends(alice, bob).await.unwrap());
        assert!(core.relationships.are_friends(bob, alice).await.unwrap());

        core.messaging.send(alice, bob, "hi").await.unwrap();

        let from_alice = core.messaging.history(alice, bob).await;
        assert_eq!(from_alice.len(), 1);
        assert_eq!(from_alice[0].content, "hi");
        assert!(!from_alice[0].seen);

        let from_bob = core.messaging.history(bob, alice).await;
        assert_eq!(from_bob.len(), 1);
        assert_eq!(from_bob[0].id, from_alice[0].id);
        assert!(from_bob[0].seen);
    }
}
