//! Conversation history, sending, and live push.

use natter_shared::UserId;
use natter_store::{Message, StoreError};
use tracing::{debug, info, warn};

use crate::error::{Result, ServiceError};
use crate::hub::{ConversationHub, Subscription};
use crate::store::Store;

#[derive(Clone)]
pub struct MessagingService {
    store: Store,
    hub: ConversationHub,
}

impl MessagingService {
    pub fn new(store: Store, hub: ConversationHub) -> Self {
        Self { store, hub }
    }

    /// The conversation between `viewer` and `other`, oldest first.
    ///
    /// Opening a conversation is a write: every unread `other -> viewer`
    /// message is marked seen, and the returned records already show it.
    /// A store failure is logged and reads as an empty conversation.
    pub async fn history(&self, viewer: UserId, other: UserId) -> Vec<Message> {
        match self
            .store
            .run(move |db| db.open_conversation(viewer, other))
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                warn!(viewer = %viewer, other = %other, error = %e, "failed to load conversation");
                Vec::new()
            }
        }
    }

    /// Store a message and push it to the receiver's open views.
    ///
    /// Unlike the read paths, a store failure is returned to the caller so
    /// "not sent" is never confused with "sent".
    pub async fn send(&self, sender: UserId, receiver: UserId, content: &str) -> Result<Message> {
        if content.trim().is_empty() {
            return Err(ServiceError::Validation("Message cannot be empty".into()));
        }

        let content = content.to_string();
        let result = self
            .store
            .run(move |db| {
                db.get_user(receiver)?;
                db.insert_message(sender, receiver, &content)
            })
            .await;

        let message = match result {
            Ok(message) => message,
            Err(StoreError::NotFound) => {
                return Err(ServiceError::NotFound("User not found".into()));
            }
            Err(e) => {
                warn!(sender = %sender, receiver = %receiver, error = %e, "failed to store message");
                return Err(e.into());
            }
        };

        let pushed = self.hub.publish(&message);
        info!(message = %message.id, sender = %sender, receiver = %receiver, "message sent");
        debug!(message = %message.id, pushed, "push fan-out");
        Ok(message)
    }

    /// Open a live push channel for `user` viewing the chat with `friend`.
    pub fn subscribe(&self, user: UserId, friend: UserId) -> Subscription {
        self.hub.subscribe(user, friend)
    }

    pub fn hub(&self) -> &ConversationHub {
        &self.hub
    }
}
