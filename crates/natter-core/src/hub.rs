//! Real-time fan-out of newly sent messages.
//!
//! Each open conversation view registers a [`Subscription`] keyed by
//! `(user, friend)`. A message from A to B is pushed to every subscription
//! keyed `(B, A)` and to nothing else. Delivery is best effort: the
//! authoritative record is always the stored history.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use natter_shared::constants::PUSH_BUFFER_SIZE;
use natter_shared::UserId;
use natter_store::Message;
use tokio::sync::mpsc;
use tracing::debug;

/// `(owner of the connection, the friend they are chatting with)`
pub type ConversationKey = (UserId, UserId);

type Senders = HashMap<u64, mpsc::Sender<Message>>;

#[derive(Clone, Default)]
pub struct ConversationHub {
    connections: Arc<Mutex<HashMap<ConversationKey, Senders>>>,
    next_id: Arc<AtomicU64>,
}

impl ConversationHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a live connection for `user` viewing the chat with `friend`.
    pub fn subscribe(&self, user: UserId, friend: UserId) -> Subscription {
        let (tx, rx) = mpsc::channel(PUSH_BUFFER_SIZE);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let key = (user, friend);

        let open = {
            let mut connections = self.lock();
            let senders = connections.entry(key).or_default();
            senders.insert(id, tx);
            senders.len()
        };

        debug!(user = %user, friend = %friend, open, "push connection registered");

        Subscription {
            key,
            id,
            rx,
            hub: self.clone(),
        }
    }

    /// Push `message` to the receiver's open views of this conversation.
    /// Returns how many connections accepted it.
    pub fn publish(&self, message: &Message) -> usize {
        let key = (message.receiver_id, message.sender_id);
        let mut connections = self.lock();
        let Some(senders) = connections.get_mut(&key) else {
            return 0;
        };

        let mut delivered = 0;
        senders.retain(|conn, tx| match tx.try_send(message.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(conn, message = %message.id, "dropping push for slow connection");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
        if senders.is_empty() {
            connections.remove(&key);
        }

        delivered
    }

    /// Number of live connections registered under `(user, friend)`.
    pub fn connection_count(&self, user: UserId, friend: UserId) -> usize {
        self.lock().get(&(user, friend)).map_or(0, HashMap::len)
    }

    fn unregister(&self, key: ConversationKey, id: u64) {
        let mut connections = self.lock();
        if let Some(senders) = connections.get_mut(&key) {
            senders.remove(&id);
            if senders.is_empty() {
                connections.remove(&key);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConversationKey, Senders>> {
        // The map stays consistent even if a holder panicked mid-operation.
        self.connections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Receiving end of a push connection. Unregisters itself on drop.
pub struct Subscription {
    key: ConversationKey,
    id: u64,
    rx: mpsc::Receiver<Message>,
    hub: ConversationHub,
}

impl Subscription {
    /// Wait for the next pushed message.
    pub async fn recv(&mut self) -> Option<Message> {
        self.rx.recv().await
    }

    pub fn key(&self) -> ConversationKey {
        self.key
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unregister(self.key, self.id);
        debug!(user = %self.key.0, friend = %self.key.1, "push connection closed");
    }
}
