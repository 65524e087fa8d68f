//! Shared, thread-safe handle to the [`Database`].
//!
//! `rusqlite` is blocking, so every call is moved onto tokio's blocking pool
//! and callers suspend until the store answers.

use std::sync::{Arc, Mutex};

use natter_store::{Database, StoreError};

#[derive(Clone)]
pub struct Store {
    db: Arc<Mutex<Database>>,
}

impl Store {
    pub fn new(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    /// Run `f` with exclusive access to the database.
    pub async fn run<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Database) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let mut guard = db
                .lock()
                .map_err(|e| StoreError::Unavailable(format!("Lock poisoned: {e}")))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("Store task failed: {e}")))?
    }
}
