//! Ably Realtime Relay Adapters
//!
//! lemon.markets streams quotes through Ably. Two transports implement
//! [`StreamTransport`](crate::application::ports::StreamTransport):
//!
//! - [`MqttTransport`]: Ably's MQTT adapter, JSON payloads
//! - [`WebSocketTransport`]: Ably realtime protocol, JSON or `MessagePack` frames

pub mod codec;
pub mod messages;
mod mqtt;
mod websocket;

pub use codec::{CodecError, FrameCodec, FrameFormat};
pub use messages::{Action, ChannelMessage, MessageData, ProtocolMessage};
pub use mqtt::{DEFAULT_HOST, DEFAULT_TLS_PORT, MqttTransport, MqttTransportConfig};
pub use websocket::{DEFAULT_ENDPOINT, WebSocketTransport, WebSocketTransportConfig};
