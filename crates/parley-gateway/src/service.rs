use std::sync::Arc;

use anyhow::Result;
use thiserror::Error;
use tokio::sync::Mutex;

use parley_store::{MessageStore, StoreError};
use parley_types::ChatMessage;

use crate::dispatcher::Dispatcher;
use crate::history;

/// Why a submission produced no broadcast.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// Turned away before persistence: blank author or body.
    #[error("submission rejected: {0}")]
    Rejected(#[source] StoreError),

    /// The store could not persist the message. The submission is lost.
    #[error("message store unavailable: {0}")]
    Unavailable(anyhow::Error),
}

/// Shared chat core handed to both the WebSocket gateway and the HTTP
/// routes: one store, one dispatcher.
#[derive(Clone)]
pub struct ChatService {
    store: Arc<MessageStore>,
    dispatcher: Dispatcher,
    /// Held across append + broadcast so fan-out order always matches the
    /// store's id order, even when submissions race.
    write_order: Arc<Mutex<()>>,
}

impl ChatService {
    pub fn new(store: Arc<MessageStore>) -> Self {
        Self {
            store,
            dispatcher: Dispatcher::new(),
            write_order: Arc::new(Mutex::new(())),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Validate, persist, and fan out one submission. On success every
    /// registered connection, the sender's included, has the stored record
    /// queued.
    pub async fn submit(&self, author: String, body: String) -> Result<ChatMessage, SubmitError> {
        let _guard = self.write_order.lock().await;

        let store = self.store.clone();
        let stored = tokio::task::spawn_blocking(move || store.append(&author, &body))
            .await
            .map_err(|e| SubmitError::Unavailable(e.into()))?
            .map_err(|e| {
                if e.is_rejection() {
                    SubmitError::Rejected(e)
                } else {
                    SubmitError::Unavailable(e.into())
                }
            })?;

        self.dispatcher.broadcast(stored.clone()).await;
        Ok(stored)
    }

    /// The catch-up snapshot, shared by new connections and the polling
    /// fallback: most recent messages, ascending by id.
    pub async fn history(&self) -> Result<Vec<ChatMessage>> {
        history::load_snapshot(&self.store).await
    }
}
