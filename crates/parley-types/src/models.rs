use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted chat message.
///
/// `id` and `created_at` are assigned by the message store at persistence
/// time and are never client-supplied. `id` is strictly increasing across
/// all messages and doubles as the ordering key: persistence order equals
/// broadcast order equals `id` order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    /// Free-text display name; not tied to any account.
    pub author: String,
    pub body: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}
