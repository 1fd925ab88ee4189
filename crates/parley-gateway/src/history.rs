use std::sync::Arc;

use anyhow::Result;

use parley_store::MessageStore;
use parley_types::ChatMessage;

/// How far back a new connection is caught up. Fixed rather than
/// configurable; the snapshot wire shape and the polling fallback both
/// assume it.
pub const HISTORY_LIMIT: u32 = 50;

/// Load the catch-up snapshot for a new connection: the most recent
/// [`HISTORY_LIMIT`] messages, ascending by id. Read-only; the store is
/// never modified here.
pub async fn load_snapshot(store: &Arc<MessageStore>) -> Result<Vec<ChatMessage>> {
    let store = store.clone();
    let messages = tokio::task::spawn_blocking(move || store.recent(HISTORY_LIMIT)).await??;
    Ok(messages)
}
