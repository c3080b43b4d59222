//! Frame Codec
//!
//! Encodes and decodes realtime protocol frames in the negotiated format.
//!
//! - **json**: frames travel as WebSocket text messages
//! - **msgpack**: frames travel as binary messages holding named maps

use std::fmt;
use std::str::FromStr;

use tokio_tungstenite::tungstenite::Message;

use super::messages::ProtocolMessage;
use crate::application::ports::TransportError;

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// `MessagePack` encoding failed.
    #[error("`MessagePack` encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// `MessagePack` decoding failed.
    #[error("`MessagePack` decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Frame type does not match the negotiated format.
    #[error("unexpected {0} frame")]
    UnexpectedFrame(&'static str),

    /// Unknown format name.
    #[error("unknown frame format: {0}")]
    UnknownFormat(String),
}

impl From<CodecError> for TransportError {
    fn from(err: CodecError) -> Self {
        Self::Codec(err.to_string())
    }
}

/// Wire format negotiated in the connection URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameFormat {
    /// JSON text frames.
    #[default]
    Json,
    /// `MessagePack` binary frames.
    MsgPack,
}

impl FrameFormat {
    /// Name used in the `format` query parameter.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::MsgPack => "msgpack",
        }
    }
}

impl fmt::Display for FrameFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FrameFormat {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "msgpack" => Ok(Self::MsgPack),
            other => Err(CodecError::UnknownFormat(other.to_string())),
        }
    }
}

/// Protocol frame codec for one connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCodec {
    format: FrameFormat,
}

impl FrameCodec {
    /// Create a codec for `format`.
    #[must_use]
    pub const fn new(format: FrameFormat) -> Self {
        Self { format }
    }

    /// Encode a frame into a WebSocket message.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self, frame: &ProtocolMessage) -> Result<Message, CodecError> {
        match self.format {
            FrameFormat::Json => Ok(Message::Text(serde_json::to_string(frame)?.into())),
            FrameFormat::MsgPack => Ok(Message::Binary(rmp_serde::to_vec_named(frame)?.into())),
        }
    }

    /// Decode a WebSocket message into a frame.
    ///
    /// Returns `Ok(None)` for control messages (ping, pong, close).
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be parsed.
    pub fn decode(&self, message: &Message) -> Result<Option<ProtocolMessage>, CodecError> {
        match (self.format, message) {
            (FrameFormat::Json, Message::Text(text)) => Ok(Some(serde_json::from_str(text)?)),
            (FrameFormat::MsgPack, Message::Binary(bytes)) => {
                Ok(Some(rmp_serde::from_slice(bytes)?))
            }
            (FrameFormat::Json, Message::Binary(_)) => Err(CodecError::UnexpectedFrame("binary")),
            (FrameFormat::MsgPack, Message::Text(_)) => Err(CodecError::UnexpectedFrame("text")),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ably::messages::{Action, MessageData};
    use crate::infrastructure::lemon::QuoteRecord;
    use test_case::test_case;

    #[test_case("json", FrameFormat::Json)]
    #[test_case("JSON", FrameFormat::Json)]
    #[test_case(" msgpack ", FrameFormat::MsgPack)]
    fn format_parses(input: &str, expected: FrameFormat) {
        assert_eq!(input.parse::<FrameFormat>().unwrap(), expected);
    }

    #[test]
    fn unknown_format_is_rejected() {
        assert!(matches!(
            "protobuf".parse::<FrameFormat>(),
            Err(CodecError::UnknownFormat(_))
        ));
    }

    #[test]
    fn json_frames_are_text() {
        let codec = FrameCodec::new(FrameFormat::Json);
        let message = codec.encode(&ProtocolMessage::attach("usr_abc")).unwrap();
        assert!(matches!(message, Message::Text(_)));
        assert_eq!(
            codec.decode(&message).unwrap(),
            Some(ProtocolMessage::attach("usr_abc"))
        );
    }

    #[test]
    fn msgpack_frames_are_binary_named_maps() {
        let codec = FrameCodec::new(FrameFormat::MsgPack);
        let frame = ProtocolMessage::publish("usr_abc.subscriptions", "isins", "A,B");
        let message = codec.encode(&frame).unwrap();

        let Message::Binary(bytes) = &message else {
            panic!("expected binary frame");
        };
        // fixmap header followed by the "action" key
        assert_eq!(bytes[1..8], *b"\xa6action");
        assert_eq!(codec.decode(&message).unwrap(), Some(frame));
    }

    #[test]
    fn msgpack_binary_quote_data_decodes() {
        let record = QuoteRecord {
            isin: "US0378331005".to_string(),
            mic: "XMUN".to_string(),
            a: 1_502_500,
            b: 1_502_450,
            a_v: None,
            b_v: None,
            t: 1_660_000_000_123,
        };
        let mut frame = ProtocolMessage::for_channel(Action::Message, "usr_abc");
        frame.messages.push(crate::infrastructure::ably::messages::ChannelMessage {
            name: None,
            data: Some(MessageData::Binary(rmp_serde::to_vec_named(&record).unwrap())),
            encoding: None,
        });

        let codec = FrameCodec::new(FrameFormat::MsgPack);
        let decoded = codec.decode(&codec.encode(&frame).unwrap()).unwrap().unwrap();
        let data = decoded.messages[0].data.as_ref().unwrap();
        assert_eq!(data.decode_quote().unwrap(), record);
    }

    #[test]
    fn control_frames_are_skipped() {
        let codec = FrameCodec::new(FrameFormat::Json);
        assert!(codec.decode(&Message::Ping(b"PING".to_vec().into())).unwrap().is_none());
    }

    #[test]
    fn mismatched_frame_type_is_an_error() {
        let codec = FrameCodec::new(FrameFormat::Json);
        assert!(matches!(
            codec.decode(&Message::Binary(vec![0x80].into())),
            Err(CodecError::UnexpectedFrame("binary"))
        ));
    }
}
