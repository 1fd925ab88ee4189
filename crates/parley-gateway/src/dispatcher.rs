use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use parley_types::{ChatMessage, ServerEvent};

/// Manages all connected clients and fans persisted messages out to them.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Per-connection send channels: conn_id -> sender
    connections: RwLock<HashMap<Uuid, mpsc::UnboundedSender<ServerEvent>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                connections: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Register a connection. Returns (conn_id, receiver).
    ///
    /// Events queue in the channel from this moment on, so a connection that
    /// registers before loading its history snapshot misses nothing.
    pub async fn register(&self) -> (Uuid, mpsc::UnboundedReceiver<ServerEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.connections.write().await.insert(conn_id, tx);
        (conn_id, rx)
    }

    /// Unregister a connection. Calling twice with the same id is a no-op.
    pub async fn unregister(&self, conn_id: Uuid) {
        self.inner.connections.write().await.remove(&conn_id);
    }

    /// Push one persisted message to every registered connection, the
    /// sender's included. A connection whose receiver is gone just drops
    /// the event; its own teardown removes it from the registry.
    pub async fn broadcast(&self, message: ChatMessage) {
        let connections = self.inner.connections.read().await;
        for tx in connections.values() {
            let _ = tx.send(ServerEvent::Broadcast {
                message: message.clone(),
            });
        }
    }

    /// Number of currently registered connections.
    pub async fn connection_count(&self) -> usize {
        self.inner.connections.read().await.len()
    }
}
