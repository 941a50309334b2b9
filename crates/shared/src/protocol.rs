//! Push stream protocol.
//!
//! Every frame on the notification stream is a JSON object with a `type` tag
//! and, for deliveries, a `data` payload:
//!
//! ```text
//! {"type": "connected"}
//! {"type": "notification", "data": { ...Notification... }}
//! ```

use serde::Deserialize;

use crate::models::Notification;

/// Query parameter the stream credential travels in.
pub const STREAM_TOKEN_PARAM: &str = "token";

/// A decoded stream frame.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    /// A notification delivered to this user.
    Notification(Notification),
    /// Server acknowledgment that the stream is live.
    Connected,
    /// A `type` this client does not handle. Carries the tag for logging.
    Unknown(String),
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("notification frame without data")]
    MissingData,
}

impl StreamMessage {
    /// Decode one text frame.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let frame: RawFrame = serde_json::from_str(text)?;
        match frame.kind.as_str() {
            "notification" => {
                let data = frame.data.ok_or(ProtocolError::MissingData)?;
                Ok(StreamMessage::Notification(serde_json::from_value(data)?))
            }
            "connected" => Ok(StreamMessage::Connected),
            _ => Ok(StreamMessage::Unknown(frame.kind)),
        }
    }
}
