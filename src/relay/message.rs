//! Chat message model shared by history, broadcast and the responder.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of a chat message, serialized as the outbound `type` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    #[serde(rename = "user_message")]
    Visitor,
    #[serde(rename = "admin_message")]
    Operator,
    #[serde(rename = "bot_message")]
    Bot,
    #[serde(rename = "system_message")]
    System,
    #[serde(rename = "join")]
    Join,
    #[serde(rename = "leave")]
    Leave,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Visitor => "user_message",
            Self::Operator => "admin_message",
            Self::Bot => "bot_message",
            Self::System => "system_message",
            Self::Join => "join",
            Self::Leave => "leave",
        }
    }
}

/// Identity attached to a connection by an `identify` frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub display_name: String,
    pub is_operator: bool,
}

impl Identity {
    pub fn new(display_name: impl Into<String>, is_operator: bool) -> Self {
        Self {
            display_name: display_name.into(),
            is_operator,
        }
    }

    /// Kind assigned to chat text sent under this identity
    pub fn message_kind(&self) -> MessageKind {
        if self.is_operator {
            MessageKind::Operator
        } else {
            MessageKind::Visitor
        }
    }
}

/// A single chat message. Immutable once built; the wire form is
/// `{"id","type","sender","text","timestamp"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    id: String,
    #[serde(rename = "type")]
    kind: MessageKind,
    sender: String,
    text: String,
    /// Creation time in Unix epoch milliseconds
    timestamp: i64,
}

impl ChatMessage {
    pub fn new(kind: MessageKind, sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            sender: sender.into(),
            text: text.into(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn join(display_name: &str) -> Self {
        Self::new(
            MessageKind::Join,
            display_name,
            format!("{} has joined the chat", display_name),
        )
    }

    pub fn leave(display_name: &str) -> Self {
        Self::new(
            MessageKind::Leave,
            display_name,
            format!("{} has left the chat", display_name),
        )
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_format() {
        let msg = ChatMessage::new(MessageKind::Operator, "Bob", "On my way");
        let value = serde_json::to_value(&msg).unwrap();

        assert_eq!(value["type"], json!("admin_message"));
        assert_eq!(value["sender"], json!("Bob"));
        assert_eq!(value["text"], json!("On my way"));
        assert!(value["id"].is_string());
        assert!(value["timestamp"].is_i64());
        assert_eq!(value.as_object().unwrap().len(), 5);
    }

    #[test]
    fn test_kind_names_match_serde() {
        for kind in [
            MessageKind::Visitor,
            MessageKind::Operator,
            MessageKind::Bot,
            MessageKind::System,
            MessageKind::Join,
            MessageKind::Leave,
        ] {
            assert_eq!(serde_json::to_value(kind).unwrap(), json!(kind.as_str()));
        }
    }

    #[test]
    fn test_join_and_leave_text() {
        let join = ChatMessage::join("Alice");
        assert_eq!(join.kind(), MessageKind::Join);
        assert_eq!(join.sender(), "Alice");
        assert_eq!(join.text(), "Alice has joined the chat");

        let leave = ChatMessage::leave("Alice");
        assert_eq!(leave.kind(), MessageKind::Leave);
        assert_eq!(leave.text(), "Alice has left the chat");
    }

    #[test]
    fn test_identity_kind() {
        assert_eq!(Identity::new("a", false).message_kind(), MessageKind::Visitor);
        assert_eq!(Identity::new("b", true).message_kind(), MessageKind::Operator);
    }

    #[test]
    fn test_unique_ids() {
        let a = ChatMessage::new(MessageKind::System, "system", "x");
        let b = ChatMessage::new(MessageKind::System, "system", "x");
        assert_ne!(a.id(), b.id());
    }
}
