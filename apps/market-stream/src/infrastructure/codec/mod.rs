//! Stream Codec Module
//!
//! Decodes inbound frames from the market data backend. Both transports
//! speak JSON:
//!
//! - **Socket mode**: each frame is an object (or an array of objects) with
//!   a `type` discriminant. Reserved types (`ping`, `pong`, `subscribed`,
//!   `error`) are control messages; any other type is a topic carrying a
//!   data payload in `payload` or `data` (both accepted for compatibility).
//! - **Polling mode**: each response is an envelope
//!   `{"success": bool, "data": {"data": {<symbol>: <payload-or-error>}}}`
//!   treated as a batch of per-topic messages.

use serde::Serialize;
use serde_json::Value;

use crate::domain::subscription::Topic;

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame is missing its `type` discriminant.
    #[error("frame missing `type` field")]
    MissingType,

    /// Data frame has neither a `payload` nor a `data` field.
    #[error("frame for topic {0} missing payload")]
    MissingPayload(String),

    /// Invalid message format.
    #[error("invalid frame format: {0}")]
    InvalidFormat(String),

    /// Poll envelope reported failure.
    #[error("poll response unsuccessful")]
    UnsuccessfulResponse,
}

// =============================================================================
// Decoded Messages
// =============================================================================

/// One topic's data payload extracted from a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicUpdate {
    /// Topic the payload belongs to.
    pub topic: Topic,
    /// Opaque payload as delivered by the backend.
    pub payload: Value,
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// Server-initiated keep-alive probe; reply with a pong.
    Ping,
    /// Keep-alive acknowledgment.
    Pong,
    /// Subscription confirmation listing the active topics.
    Subscribed {
        /// Topics the server confirmed.
        topics: Vec<Topic>,
    },
    /// Server-reported error.
    ServerError {
        /// Error description from the server.
        message: String,
    },
    /// Data message for one topic.
    Update(TopicUpdate),
}

/// One entry of a poll response batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollEntry {
    /// Data payload for one symbol.
    Update(TopicUpdate),
    /// Per-symbol error reported inside an otherwise successful response.
    Error {
        /// Symbol the error belongs to.
        topic: Topic,
        /// Error description from the server.
        message: String,
    },
}

// =============================================================================
// Outbound Control Messages
// =============================================================================

/// Control message declaring interest in a set of topics.
///
/// # Wire Format (JSON)
/// ```json
/// {"type": "subscribe", "topics": ["AAPL", "market_overview"]}
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct SubscribeRequest {
    /// Message type (always "subscribe").
    #[serde(rename = "type")]
    pub msg_type: &'static str,
    /// Topics to start receiving.
    pub topics: Vec<Topic>,
}

impl SubscribeRequest {
    /// Build a subscribe request for the given topics.
    #[must_use]
    pub const fn new(topics: Vec<Topic>) -> Self {
        Self {
            msg_type: "subscribe",
            topics,
        }
    }
}

/// Control message dropping interest in a set of topics.
#[derive(Debug, Clone, Serialize)]
pub struct UnsubscribeRequest {
    /// Message type (always "unsubscribe").
    #[serde(rename = "type")]
    pub msg_type: &'static str,
    /// Topics to stop receiving.
    pub topics: Vec<Topic>,
}

impl UnsubscribeRequest {
    /// Build an unsubscribe request for the given topics.
    #[must_use]
    pub const fn new(topics: Vec<Topic>) -> Self {
        Self {
            msg_type: "unsubscribe",
            topics,
        }
    }
}

/// Keep-alive probe sent periodically in socket mode.
#[derive(Debug, Clone, Serialize)]
pub struct PingMessage {
    /// Message type (always "ping").
    #[serde(rename = "type")]
    pub msg_type: &'static str,
}

impl Default for PingMessage {
    fn default() -> Self {
        Self { msg_type: "ping" }
    }
}

/// Reply to a server-initiated ping.
#[derive(Debug, Clone, Serialize)]
pub struct PongMessage {
    /// Message type (always "pong").
    #[serde(rename = "type")]
    pub msg_type: &'static str,
}

impl Default for PongMessage {
    fn default() -> Self {
        Self { msg_type: "pong" }
    }
}

// =============================================================================
// Codec
// =============================================================================

/// JSON codec for stream frames and poll envelopes.
#[derive(Debug, Default, Clone)]
pub struct FrameCodec;

impl FrameCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Decode a socket frame into inbound messages.
    ///
    /// Frames arrive as a single object or an array of objects; an array is
    /// decoded in order so per-topic delivery order is preserved.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON parsing fails, the discriminant is missing,
    /// or a data frame carries no payload.
    pub fn decode(&self, text: &str) -> Result<Vec<InboundMessage>, CodecError> {
        let trimmed = text.trim();

        if trimmed.starts_with('[') {
            let raw: Vec<Value> = serde_json::from_str(trimmed)?;
            raw.into_iter().map(|v| Self::decode_object(&v)).collect()
        } else if trimmed.starts_with('{') {
            let value: Value = serde_json::from_str(trimmed)?;
            Ok(vec![Self::decode_object(&value)?])
        } else {
            let preview: String = trimmed.chars().take(50).collect();
            Err(CodecError::InvalidFormat(format!(
                "expected JSON array or object, got: {preview}..."
            )))
        }
    }

    fn decode_object(value: &Value) -> Result<InboundMessage, CodecError> {
        let msg_type = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(CodecError::MissingType)?;

        match msg_type {
            "ping" => Ok(InboundMessage::Ping),
            "pong" => Ok(InboundMessage::Pong),
            "subscribed" => {
                let topics = value
                    .get("topics")
                    .and_then(Value::as_array)
                    .map(|arr| {
                        arr.iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(InboundMessage::Subscribed { topics })
            }
            "error" => {
                let message = value
                    .get("message")
                    .or_else(|| value.get("msg"))
                    .and_then(Value::as_str)
                    .unwrap_or("unspecified server error")
                    .to_string();
                Ok(InboundMessage::ServerError { message })
            }
            topic => {
                let payload = value
                    .get("payload")
                    .or_else(|| value.get("data"))
                    .cloned()
                    .ok_or_else(|| CodecError::MissingPayload(topic.to_string()))?;

                Ok(InboundMessage::Update(TopicUpdate {
                    topic: topic.to_string(),
                    payload,
                }))
            }
        }
    }

    /// Decode a poll response envelope into a batch of per-topic entries.
    ///
    /// A symbol mapping to an object with an `error` field is reported as a
    /// [`PollEntry::Error`] rather than a data entry.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON parsing fails, the envelope reports
    /// `success: false`, or the nested data object is missing.
    pub fn decode_poll_envelope(&self, text: &str) -> Result<Vec<PollEntry>, CodecError> {
        let value: Value = serde_json::from_str(text)?;

        let success = value
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if !success {
            return Err(CodecError::UnsuccessfulResponse);
        }

        let data = value
            .get("data")
            .and_then(|d| d.get("data"))
            .and_then(Value::as_object)
            .ok_or_else(|| CodecError::InvalidFormat("missing data.data object".to_string()))?;

        let mut entries = Vec::with_capacity(data.len());
        for (symbol, payload) in data {
            if let Some(message) = payload.get("error").and_then(Value::as_str) {
                entries.push(PollEntry::Error {
                    topic: symbol.clone(),
                    message: message.to_string(),
                });
            } else {
                entries.push(PollEntry::Update(TopicUpdate {
                    topic: symbol.clone(),
                    payload: payload.clone(),
                }));
            }
        }

        Ok(entries)
    }

    /// Encode a control message to a JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<String, CodecError> {
        Ok(serde_json::to_string(value)?)
    }
}

// =============================================================================
// Tests
// =============================================================================
