//! Friend requests and the friendships they create.

use natter_shared::{RequestId, UserId};
use natter_store::{FriendRequest, IncomingRequest, StoreError, UserProfile};
use tracing::{debug, info, warn};

use crate::error::{Result, ServiceError};
use crate::store::Store;

const USER_NOT_FOUND: &str = "User not found";
const REQUEST_NOT_FOUND: &str = "Friend request not found";

#[derive(Clone)]
pub struct RelationshipService {
    store: Store,
}

impl RelationshipService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Send a friend request to the user called `receiver_username`
    /// (matched case-insensitively).
    pub async fn send_request(
        &self,
        sender: UserId,
        receiver_username: &str,
    ) -> Result<FriendRequest> {
        let username = receiver_username.trim().to_string();
        if username.is_empty() {
            return Err(ServiceError::Validation("Username is required".into()));
        }

        // Business rejections ride inside the store result so the lookup and
        // the insert share one trip to the store.
        let request = self
            .store
            .run(move |db| {
                let Some(receiver) = db.find_user_by_username(&username)? else {
                    return Ok(Err(ServiceError::NotFound(USER_NOT_FOUND.into())));
                };
                if receiver.id == sender {
                    return Ok(Err(ServiceError::Validation(
                        "You cannot send a friend request to yourself".into(),
                    )));
                }
                match db.create_friend_request(sender, receiver.id) {
                    Ok(request) => Ok(Ok(request)),
                    Err(StoreError::AlreadyFriends) => Ok(Err(ServiceError::Conflict(
                        "You are already friends with this user".into(),
                    ))),
                    Err(StoreError::PendingRequestExists) => Ok(Err(ServiceError::Conflict(
                        "A friend request already exists".into(),
                    ))),
                    Err(e) => Err(e),
                }
            })
            .await??;

        info!(
            request = %request.id,
            sender = %request.sender_id,
            receiver = %request.receiver_id,
            "friend request sent"
        );
        Ok(request)
    }

    /// Pending requests addressed to `receiver`, newest first. A store
    /// failure is logged and reads as "no requests".
    pub async fn list_incoming(&self, receiver: UserId) -> Vec<IncomingRequest> {
        match self
            .store
            .run(move |db| db.list_incoming_requests(receiver))
            .await
        {
            Ok(requests) => requests,
            Err(e) => {
                warn!(user = %receiver, error = %e, "failed to list friend requests");
                Vec::new()
            }
        }
    }

    /// Accept or reject a pending request. Only its receiver may answer,
    /// and only once.
    pub async fn respond(
        &self,
        request_id: RequestId,
        responder: UserId,
        accept: bool,
    ) -> Result<FriendRequest> {
        let result = self
            .store
            .run(move |db| {
                let request = db.get_friend_request(request_id)?;
                // Someone else's request is indistinguishable from a missing one.
                if request.receiver_id != responder {
                    return Err(StoreError::NotFound);
                }
                if accept {
                    db.accept_friend_request(request_id)
                } else {
                    db.reject_friend_request(request_id)
                }
            })
            .await;

        match result {
            Ok(request) => {
                info!(
                    request = %request.id,
                    status = %request.status,
                    "friend request answered"
                );
                Ok(request)
            }
            Err(StoreError::NotFound) => Err(ServiceError::NotFound(REQUEST_NOT_FOUND.into())),
            Err(StoreError::AlreadyResolved(status)) => {
                debug!(request = %request_id, %status, "friend request already answered");
                Err(ServiceError::Conflict(
                    "Friend request has already been responded to".into(),
                ))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Friends of `user`, ordered by username. A store failure is logged and
    /// reads as "no friends".
    pub async fn list_friends(&self, user: UserId) -> Vec<UserProfile> {
        match self.store.run(move |db| db.list_friends(user)).await {
            Ok(friends) => friends.into_iter().map(UserProfile::from).collect(),
            Err(e) => {
                warn!(user = %user, error = %e, "failed to list friends");
                Vec::new()
            }
        }
    }

    pub async fn are_friends(&self, a: UserId, b: UserId) -> Result<bool> {
        Ok(self.store.run(move |db| db.are_friends(a, b)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use natter_shared::RequestStatus;
    use crate::testing::{seed_user, store};

    async fn setup() -> (RelationshipService, UserId, UserId, UserId) {
        let store = store();
        let alice = seed_user(&store, "alice").await;
        let bob = seed_user(&store, "bob").await;
        let carol = seed_user(&store, "carol").await;
        (RelationshipService::new(store), alice, bob, carol)
    }

    #[tokio::test]
    async fn accept_creates_symmetric_friendship() {
        let (svc, alice, bob, _) = setup().await;

        let request = svc.send_request(alice, "BOB").await.unwrap();
        assert_eq!(request.status, RequestStatus::Pending);

        let incoming = svc.list_incoming(bob).await;
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].sender.username, "alice");

        let accepted = svc.respond(request.id, bob, true).await.unwrap();
        assert_eq!(accepted.status, RequestStatus::Accepted);

        assert!(svc.are_friends(alice, bob).await.unwrap());
        assert!(svc.are_friends(bob, alice).await.unwrap());
        assert_eq!(svc.list_friends(alice).await[0].username, "bob");
        assert_eq!(svc.list_friends(bob).await[0].username, "alice");
        assert!(svc.list_incoming(bob).await.is_empty());
    }

    #[tokio::test]
    async fn reject_creates_nothing_and_allows_retry() {
        let (svc, alice, bob, _) = setup().await;
        let request = svc.send_request(alice, "bob").await.unwrap();

        svc.respond(request.id, bob, false).await.unwrap();
        assert!(!svc.are_friends(alice, bob).await.unwrap());
        assert!(svc.list_friends(alice).await.is_empty());

        // A rejected request no longer blocks a new one.
        svc.send_request(alice, "bob").await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_pending_in_either_direction() {
        let (svc, alice, bob, _) = setup().await;
        svc.send_request(alice, "bob").await.unwrap();

        let again = svc.send_request(alice, "bob").await.unwrap_err();
        let reverse = svc.send_request(bob, "alice").await.unwrap_err();
        assert_eq!(again.public_message(), "A friend request already exists");
        assert_eq!(reverse.public_message(), "A friend request already exists");
    }

    #[tokio::test]
    async fn already_friends_blocks_new_request() {
        let (svc, alice, bob, _) = setup().await;
        let request = svc.send_request(alice, "bob").await.unwrap();
        svc.respond(request.id, bob, true).await.unwrap();

        let err = svc.send_request(bob, "alice").await.unwrap_err();
        assert_eq!(err.public_message(), "You are already friends with this user");
    }

    #[tokio::test]
    async fn unknown_and_self_targets() {
        let (svc, alice, _, _) = setup().await;
        assert!(matches!(
            svc.send_request(alice, "nobody").await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            svc.send_request(alice, "Alice").await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn only_receiver_may_respond_once() {
        let (svc, alice, bob, carol) = setup().await;
        let request = svc.send_request(alice, "bob").await.unwrap();

        assert!(matches!(
            svc.respond(request.id, carol, true).await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            svc.respond(request.id, alice, true).await,
            Err(ServiceError::NotFound(_))
        ));

        svc.respond(request.id, bob, false).await.unwrap();
        let err = svc.respond(request.id, bob, true).await.unwrap_err();
        assert_eq!(
            err.public_message(),
            "Friend request has already been responded to"
        );
        assert!(!svc.are_friends(alice, bob).await.unwrap());

        assert!(matches!(
            svc.respond(RequestId::new(), bob, true).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_accepts_resolve_once() {
        let (svc, alice, bob, _) = setup().await;
        let request = svc.send_request(alice, "bob").await.unwrap();

        let (a, b) = tokio::join!(
            svc.respond(request.id, bob, true),
            svc.respond(request.id, bob, true),
        );
        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
        assert_eq!(svc.list_friends(alice).await.len(), 1);
    }
}
