use serde::{Deserialize, Serialize};

use crate::models::ChatMessage;

/// Events sent from the gateway to a connected client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerEvent {
    /// History snapshot, sent exactly once per connection immediately after
    /// registration. Replaces the client's local transcript.
    #[serde(rename = "load_messages")]
    Snapshot { messages: Vec<ChatMessage> },

    /// A newly persisted message, fanned out to every registered connection
    /// including the sender's. Additive to the client's transcript.
    #[serde(rename = "message")]
    Broadcast { message: ChatMessage },
}

/// Events sent from a client to the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientEvent {
    /// Submit a message for persistence and broadcast. Fire-and-forget:
    /// there is no reply; an accepted submission comes back to every
    /// connection as a `Broadcast` carrying the server-assigned fields.
    #[serde(rename = "message")]
    Submit { author: String, body: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn submit_uses_observed_wire_name() {
        let event = ClientEvent::Submit {
            author: "alice".into(),
            body: "hello".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "message");
        assert_eq!(json["data"]["author"], "alice");
        assert_eq!(json["data"]["body"], "hello");
    }

    #[test]
    fn snapshot_uses_observed_wire_name() {
        let event = ServerEvent::Snapshot { messages: vec![] };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "load_messages");
    }

    #[test]
    fn broadcast_round_trips_with_camel_case_timestamp() {
        let event = ServerEvent::Broadcast {
            message: ChatMessage {
                id: 7,
                author: "bob".into(),
                body: "hi".into(),
                created_at: Utc::now(),
            },
        };
        let text = serde_json::to_string(&event).unwrap();
        assert!(text.contains("\"createdAt\""));

        let back: ServerEvent = serde_json::from_str(&text).unwrap();
        let ServerEvent::Broadcast { message } = back else {
            panic!("expected broadcast");
        };
        assert_eq!(message.id, 7);
        assert_eq!(message.author, "bob");
    }

    #[test]
    fn unknown_event_type_fails_to_parse() {
        let raw = r#"{"type":"typing","data":{}}"#;
        assert!(serde_json::from_str::<ClientEvent>(raw).is_err());
    }

    #[test]
    fn submit_missing_field_fails_to_parse() {
        let raw = r#"{"type":"message","data":{"author":"alice"}}"#;
        assert!(serde_json::from_str::<ClientEvent>(raw).is_err());
    }
}
