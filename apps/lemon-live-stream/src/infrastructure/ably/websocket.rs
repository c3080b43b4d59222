//! Ably WebSocket Transport
//!
//! Speaks the Ably realtime protocol directly over a WebSocket.
//!
//! # Connection URL
//!
//! `wss://realtime.ably.io?client_id=<user>&access_token=<token>&format=json&heartbeats=false`
//!
//! # Handshake
//!
//! 1. Relay sends `CONNECTED`, client sends `ATTACH {channel: <user>}`
//! 2. Relay sends `ATTACHED`, client publishes the instrument list on
//!    `<user>.subscriptions`
//! 3. Relay sends `MESSAGE` frames, one quote per channel message
//!
//! On cancellation the client detaches, closes the Ably connection and
//! then the socket, waiting briefly for each acknowledgement.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::codec::{FrameCodec, FrameFormat};
use super::messages::{Action, ProtocolMessage};
use crate::application::ports::{StreamEvent, StreamTransport, TransportError};
use crate::domain::credential::Credential;
use crate::domain::quote::Quote;
use crate::domain::session::{
    ChannelSequencer, HandshakeCommand, SUBSCRIPTIONS_MESSAGE_NAME, subscription_payload,
};

/// Production realtime endpoint.
pub const DEFAULT_ENDPOINT: &str = "wss://realtime.ably.io";

/// Payload of client keep-alive pings.
const PING_PAYLOAD: &[u8] = b"PING";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;
type WsRead = SplitStream<WsStream>;

// =============================================================================
// Configuration
// =============================================================================

/// WebSocket transport settings.
#[derive(Debug, Clone)]
pub struct WebSocketTransportConfig {
    /// Relay endpoint without query parameters.
    pub endpoint: String,
    /// Frame format.
    pub format: FrameFormat,
    /// Ask the relay for protocol heartbeats.
    pub heartbeats: bool,
    /// Interval between client pings.
    pub ping_interval: Duration,
    /// How long to wait for each close acknowledgement.
    pub close_timeout: Duration,
}

impl Default for WebSocketTransportConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            format: FrameFormat::Json,
            heartbeats: false,
            ping_interval: Duration::from_secs(5),
            close_timeout: Duration::from_secs(1),
        }
    }
}

impl WebSocketTransportConfig {
    /// Build the connection URL for `credential`.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is not a valid URL.
    pub fn connection_url(&self, credential: &Credential) -> Result<String, TransportError> {
        let heartbeats = if self.heartbeats { "true" } else { "false" };
        let url = reqwest::Url::parse_with_params(
            &self.endpoint,
            &[
                ("client_id", credential.user_id()),
                ("access_token", credential.token()),
                ("format", self.format.as_str()),
                ("heartbeats", heartbeats),
            ],
        )
        .map_err(|e| TransportError::Config(format!("invalid endpoint {}: {e}", self.endpoint)))?;

        Ok(url.to_string())
    }
}

// =============================================================================
// Transport
// =============================================================================

/// Whether the read loop keeps going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Closed,
}

/// Ably realtime protocol over WebSocket.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    config: WebSocketTransportConfig,
    codec: FrameCodec,
}

impl WebSocketTransport {
    /// Create a new transport.
    #[must_use]
    pub const fn new(config: WebSocketTransportConfig) -> Self {
        let codec = FrameCodec::new(config.format);
        Self { config, codec }
    }

    async fn send_frame(
        &self,
        write: &mut WsWrite,
        frame: &ProtocolMessage,
    ) -> Result<(), TransportError> {
        let message = self.codec.encode(frame)?;
        tracing::debug!(action = ?frame.action, channel = ?frame.channel, "Sending frame");
        write
            .send(message)
            .await
            .map_err(|e| TransportError::Connection(format!("failed to send frame: {e}")))
    }

    async fn send_command(
        &self,
        write: &mut WsWrite,
        command: HandshakeCommand,
    ) -> Result<(), TransportError> {
        let frame = match command {
            HandshakeCommand::Attach { channel } => {
                tracing::info!(%channel, "Attaching to channel");
                ProtocolMessage::attach(channel)
            }
            HandshakeCommand::PublishSubscriptions {
                channel,
                instruments,
            } => {
                tracing::info!(%channel, instruments = instruments.len(), "Publishing instruments");
                ProtocolMessage::publish(
                    channel,
                    SUBSCRIPTIONS_MESSAGE_NAME,
                    subscription_payload(&instruments),
                )
            }
        };
        self.send_frame(write, &frame).await
    }

    /// Act on one inbound frame.
    async fn dispatch(
        &self,
        frame: ProtocolMessage,
        sequencer: &mut ChannelSequencer,
        write: &mut WsWrite,
        events: &mpsc::Sender<StreamEvent>,
    ) -> Result<Flow, TransportError> {
        match frame.action {
            Action::Connected => {
                tracing::info!(
                    connection_id = ?frame.connection_id,
                    "Relay connection established"
                );
                let _ = events.send(StreamEvent::Connected).await;
                let command = sequencer.on_connected();
                self.send_command(write, command).await?;
            }
            Action::Attached => {
                if let Some(command) = sequencer.on_attached() {
                    let _ = events
                        .send(StreamEvent::Attached {
                            channel: sequencer.subscriber().to_string(),
                        })
                        .await;
                    self.send_command(write, command).await?;
                    let _ = events
                        .send(StreamEvent::Subscribed {
                            instruments: sequencer.instruments().to_vec(),
                        })
                        .await;
                }
            }
            Action::Message => {
                if !sequencer.accepts_quotes() {
                    tracing::debug!(
                        state = ?sequencer.state(),
                        "Ignoring message before subscription was published"
                    );
                    return Ok(Flow::Continue);
                }
                for message in frame.messages {
                    let Some(data) = message.data else {
                        continue;
                    };
                    match data.decode_quote() {
                        Ok(record) => {
                            let _ = events.send(StreamEvent::Quote(Quote::from(record))).await;
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Skipping undecodable quote");
                        }
                    }
                }
            }
            Action::Error => {
                let (code, message) = frame
                    .error
                    .map_or((0, "unspecified error".to_string()), |e| (e.code, e.message));
                tracing::error!(code, %message, channel = ?frame.channel, "Relay error");
                return Err(TransportError::Rejected { code, message });
            }
            Action::Disconnected | Action::Closed => {
                if let Some(error) = &frame.error {
                    tracing::warn!(
                        code = error.code,
                        message = %error.message,
                        "Relay closed connection"
                    );
                } else {
                    tracing::info!(action = ?frame.action, "Relay closed connection");
                }
                sequencer.reset();
                return Ok(Flow::Closed);
            }
            Action::Heartbeat => {
                tracing::trace!("Heartbeat");
            }
            other => {
                tracing::debug!(action = ?other, "Ignoring frame");
            }
        }

        Ok(Flow::Continue)
    }

    /// Wait for a frame with `action`, giving up after the close timeout.
    async fn await_action(&self, read: &mut WsRead, action: Action) -> bool {
        let wait = async {
            while let Some(Ok(message)) = read.next().await {
                if let Ok(Some(frame)) = self.codec.decode(&message)
                    && frame.action == action
                {
                    return true;
                }
            }
            false
        };

        tokio::time::timeout(self.config.close_timeout, wait)
            .await
            .unwrap_or(false)
    }

    /// Detach, close the Ably connection, then close the socket.
    async fn close_gracefully(
        &self,
        write: &mut WsWrite,
        read: &mut WsRead,
        sequencer: &ChannelSequencer,
    ) {
        if sequencer.state().has_requested_attach() {
            tracing::info!(channel = sequencer.subscriber(), "Detaching from channel");
            if self
                .send_frame(write, &ProtocolMessage::detach(sequencer.subscriber()))
                .await
                .is_ok()
                && !self.await_action(read, Action::Detached).await
            {
                tracing::debug!("No DETACHED before timeout");
            }
        }

        tracing::info!("Closing connection");
        if self.send_frame(write, &ProtocolMessage::close()).await.is_ok()
            && !self.await_action(read, Action::Closed).await
        {
            tracing::debug!("No CLOSED before timeout");
        }

        if let Err(e) = write.close().await {
            tracing::debug!(error = %e, "WebSocket close failed");
        }
    }
}

#[async_trait]
impl StreamTransport for WebSocketTransport {
    fn name(&self) -> &'static str {
        "websocket"
    }

    async fn run(
        &self,
        credential: &Credential,
        instruments: &[String],
        events: mpsc::Sender<StreamEvent>,
        cancel: CancellationToken,
    ) -> Result<(), TransportError> {
        let url = self.config.connection_url(credential)?;
        tracing::info!(
            endpoint = %self.config.endpoint,
            format = %self.config.format,
            heartbeats = self.config.heartbeats,
            "Connecting to realtime relay"
        );

        let (ws_stream, _response) = tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            result = tokio_tungstenite::connect_async(url) => result
                .map_err(|e| TransportError::Connection(e.to_string()))?,
        };
        let (mut write, mut read) = ws_stream.split();

        let mut sequencer = ChannelSequencer::new(credential.user_id(), instruments.to_vec());
        let mut ping = tokio::time::interval_at(
            Instant::now() + self.config.ping_interval,
            self.config.ping_interval,
        );
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    self.close_gracefully(&mut write, &mut read, &sequencer).await;
                    let _ = events.send(StreamEvent::Disconnected).await;
                    return Ok(());
                }
                _ = ping.tick() => {
                    write
                        .send(Message::Ping(PING_PAYLOAD.into()))
                        .await
                        .map_err(|e| TransportError::Connection(format!("failed to send ping: {e}")))?;
                }
                msg = read.next() => {
                    let message = match msg {
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(?frame, "Server sent close frame");
                            let _ = events.send(StreamEvent::Disconnected).await;
                            return Ok(());
                        }
                        Some(Ok(Message::Pong(_))) => {
                            tracing::trace!("Pong");
                            continue;
                        }
                        Some(Ok(message)) => message,
                        Some(Err(e)) => {
                            let _ = events.send(StreamEvent::Disconnected).await;
                            return Err(TransportError::Connection(e.to_string()));
                        }
                        None => {
                            tracing::info!("WebSocket stream ended");
                            let _ = events.send(StreamEvent::Disconnected).await;
                            return Ok(());
                        }
                    };

                    let frame = match self.codec.decode(&message) {
                        Ok(Some(frame)) => frame,
                        Ok(None) => continue,
                        Err(e) => {
                            tracing::warn!(error = %e, "Skipping undecodable frame");
                            let _ = events.send(StreamEvent::Error(e.to_string())).await;
                            continue;
                        }
                    };

                    if self.dispatch(frame, &mut sequencer, &mut write, &events).await? == Flow::Closed {
                        let _ = write.close().await;
                        let _ = events.send(StreamEvent::Disconnected).await;
                        return Ok(());
                    }
                }
            }
        }
    }
}
