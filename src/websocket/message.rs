use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::config::ChatConfig;
use crate::error::FrameError;
use crate::relay::ChatMessage;

/// Validated frame sent from client to relay
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    Identify { username: String, is_admin: bool },
    Message { text: String },
}

#[derive(Debug, Deserialize)]
struct IdentifyPayload {
    username: String,
    #[serde(rename = "isAdmin", default)]
    is_admin: bool,
}

#[derive(Debug, Deserialize)]
struct MessagePayload {
    text: String,
}

/// Length limits applied while decoding client frames
#[derive(Debug, Clone, Copy)]
pub struct FrameLimits {
    pub max_username_length: usize,
    pub max_message_length: usize,
}

impl From<&ChatConfig> for FrameLimits {
    fn from(config: &ChatConfig) -> Self {
        Self {
            max_username_length: config.max_username_length,
            max_message_length: config.max_message_length,
        }
    }
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self::from(&ChatConfig::default())
    }
}

impl ClientFrame {
    /// Decode a text frame.
    ///
    /// Returns `Ok(None)` for well-formed frames whose `action` is not one the
    /// relay handles; those are ignored rather than treated as malformed.
    pub fn parse(text: &str, limits: FrameLimits) -> Result<Option<Self>, FrameError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| FrameError::InvalidJson(e.to_string()))?;

        let action = value
            .get("action")
            .and_then(Value::as_str)
            .ok_or(FrameError::MissingAction)?;

        match action {
            "identify" => {
                let payload: IdentifyPayload =
                    serde_json::from_value(value).map_err(|e| invalid("identify", e))?;
                let username = payload.username.trim();
                if username.is_empty() {
                    return Err(invalid("identify", "username is empty"));
                }
                if username.chars().count() > limits.max_username_length {
                    return Err(invalid(
                        "identify",
                        format!("username exceeds {} characters", limits.max_username_length),
                    ));
                }
                Ok(Some(Self::Identify {
                    username: username.to_string(),
                    is_admin: payload.is_admin,
                }))
            }
            "message" => {
                let payload: MessagePayload =
                    serde_json::from_value(value).map_err(|e| invalid("message", e))?;
                let text = payload.text.trim();
                if text.is_empty() {
                    return Err(invalid("message", "text is empty"));
                }
                if text.chars().count() > limits.max_message_length {
                    return Err(invalid(
                        "message",
                        format!("text exceeds {} characters", limits.max_message_length),
                    ));
                }
                Ok(Some(Self::Message {
                    text: text.to_string(),
                }))
            }
            _ => Ok(None),
        }
    }
}

fn invalid(action: &'static str, reason: impl ToString) -> FrameError {
    FrameError::InvalidField {
        action,
        reason: reason.to_string(),
    }
}

/// Item queued on a connection's outbound channel
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    /// Message serialized by the connection's writer task
    Chat(ChatMessage),
    /// Message already serialized once for a broadcast
    Preserialized(Arc<str>),
    /// Transport-level ping
    Ping,
    /// Ask the writer to close the socket
    Close,
}

impl OutboundMessage {
    /// Serialize a chat message once for fan-out
    pub fn preserialize(message: &ChatMessage) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_string(message)?;
        Ok(Self::Preserialized(Arc::from(json)))
    }

    /// JSON text for text-bearing variants; `None` for control items
    pub fn to_json(&self) -> Option<Result<String, serde_json::Error>> {
        match self {
            Self::Chat(message) => Some(serde_json::to_string(message)),
            Self::Preserialized(json) => Some(Ok(json.to_string())),
            Self::Ping | Self::Close => None,
        }
    }
}
