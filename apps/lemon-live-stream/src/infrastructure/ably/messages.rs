//! Ably Realtime Protocol Messages
//!
//! The subset of the Ably realtime protocol needed to attach to a channel,
//! publish the instrument list and receive quotes.
//!
//! # Frame Format
//!
//! ```json
//! {"action":15,"channel":"usr_abc","messages":[{"data":"{\"isin\":\"US0378331005\",...}"}]}
//! ```
//!
//! Message `data` is usually a JSON string (text format) or raw bytes
//! (msgpack format) holding a lemon.markets quote; an embedded object is
//! accepted too.

use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::infrastructure::lemon::QuoteRecord;

// =============================================================================
// Action
// =============================================================================

/// Protocol action code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum Action {
    /// Heartbeat.
    Heartbeat,
    /// Acknowledge.
    Ack,
    /// Negative acknowledge.
    Nack,
    /// Connect request.
    Connect,
    /// Connection established.
    Connected,
    /// Disconnect request.
    Disconnect,
    /// Connection dropped.
    Disconnected,
    /// Close request.
    Close,
    /// Connection closed.
    Closed,
    /// Connection or channel error.
    Error,
    /// Attach to channel.
    Attach,
    /// Channel attached.
    Attached,
    /// Detach from channel.
    Detach,
    /// Channel detached.
    Detached,
    /// Presence update.
    Presence,
    /// Channel message.
    Message,
    /// Presence sync.
    Sync,
    /// Re-authentication.
    Auth,
    /// Code this client does not know.
    Unknown(u8),
}

impl From<u8> for Action {
    fn from(code: u8) -> Self {
        match code {
            0 => Self::Heartbeat,
            1 => Self::Ack,
            2 => Self::Nack,
            3 => Self::Connect,
            4 => Self::Connected,
            5 => Self::Disconnect,
            6 => Self::Disconnected,
            7 => Self::Close,
            8 => Self::Closed,
            9 => Self::Error,
            10 => Self::Attach,
            11 => Self::Attached,
            12 => Self::Detach,
            13 => Self::Detached,
            14 => Self::Presence,
            15 => Self::Message,
            16 => Self::Sync,
            17 => Self::Auth,
            other => Self::Unknown(other),
        }
    }
}

impl From<Action> for u8 {
    fn from(action: Action) -> Self {
        match action {
            Action::Heartbeat => 0,
            Action::Ack => 1,
            Action::Nack => 2,
            Action::Connect => 3,
            Action::Connected => 4,
            Action::Disconnect => 5,
            Action::Disconnected => 6,
            Action::Close => 7,
            Action::Closed => 8,
            Action::Error => 9,
            Action::Attach => 10,
            Action::Attached => 11,
            Action::Detach => 12,
            Action::Detached => 13,
            Action::Presence => 14,
            Action::Message => 15,
            Action::Sync => 16,
            Action::Auth => 17,
            Action::Unknown(code) => code,
        }
    }
}

// =============================================================================
// Protocol Message
// =============================================================================

/// Error details attached to `ERROR`, `DISCONNECTED` and similar frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    /// Ably error code.
    #[serde(default)]
    pub code: i64,
    /// HTTP-like status code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<i64>,
    /// Description.
    #[serde(default)]
    pub message: String,
}

/// A single frame on the realtime connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolMessage {
    /// Action code.
    pub action: Action,
    /// Channel the frame refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Serial of a published message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_serial: Option<i64>,
    /// Channel messages.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<ChannelMessage>,
    /// Error details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    /// Connection id (on `CONNECTED`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
}

impl ProtocolMessage {
    /// Frame with only an action set.
    #[must_use]
    pub const fn new(action: Action) -> Self {
        Self {
            action,
            channel: None,
            msg_serial: None,
            messages: Vec::new(),
            error: None,
            connection_id: None,
        }
    }

    /// Frame for `action` on `channel`.
    #[must_use]
    pub fn for_channel(action: Action, channel: impl Into<String>) -> Self {
        Self {
            channel: Some(channel.into()),
            ..Self::new(action)
        }
    }

    /// `ATTACH` request.
    #[must_use]
    pub fn attach(channel: impl Into<String>) -> Self {
        Self::for_channel(Action::Attach, channel)
    }

    /// `DETACH` request.
    #[must_use]
    pub fn detach(channel: impl Into<String>) -> Self {
        Self::for_channel(Action::Detach, channel)
    }

    /// `CLOSE` request.
    #[must_use]
    pub const fn close() -> Self {
        Self::new(Action::Close)
    }

    /// `MESSAGE` publishing one text message.
    #[must_use]
    pub fn publish(channel: impl Into<String>, name: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            msg_serial: Some(0),
            messages: vec![ChannelMessage {
                name: Some(name.into()),
                data: Some(MessageData::Text(data.into())),
                encoding: None,
            }],
            ..Self::for_channel(Action::Message, channel)
        }
    }
}

// =============================================================================
// Channel Message
// =============================================================================

/// A message published on a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// Event name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<MessageData>,
    /// Payload encoding, e.g. `json` or `base64`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

/// Channel message payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageData {
    /// String payload.
    Text(String),
    /// Binary payload.
    Binary(Vec<u8>),
    /// Embedded quote object.
    Quote(QuoteRecord),
}

/// Errors decoding a quote from message data.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    /// Text payload was not a JSON quote.
    #[error("invalid JSON quote: {0}")]
    Json(#[from] serde_json::Error),

    /// Binary payload was not a msgpack quote.
    #[error("invalid msgpack quote: {0}")]
    MsgPack(#[from] rmp_serde::decode::Error),
}

impl MessageData {
    /// Interpret the payload as a lemon.markets quote.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload does not hold a quote.
    pub fn decode_quote(&self) -> Result<QuoteRecord, DataError> {
        match self {
            Self::Text(text) => Ok(serde_json::from_str(text)?),
            Self::Binary(bytes) => Ok(rmp_serde::from_slice(bytes)?),
            Self::Quote(record) => Ok(record.clone()),
        }
    }
}

impl Serialize for MessageData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Text(text) => serializer.serialize_str(text),
            Self::Binary(bytes) => serializer.serialize_bytes(bytes),
            Self::Quote(record) => record.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for MessageData {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(MessageDataVisitor)
    }
}

struct MessageDataVisitor;

impl<'de> Visitor<'de> for MessageDataVisitor {
    type Value = MessageData;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a string, bytes or a quote object")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(MessageData::Text(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
        Ok(MessageData::Text(v))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
        Ok(MessageData::Binary(v.to_vec()))
    }

    fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
        Ok(MessageData::Binary(v))
    }

    fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Self::Value, A::Error> {
        QuoteRecord::deserialize(de::value::MapAccessDeserializer::new(map)).map(MessageData::Quote)
    }
}
