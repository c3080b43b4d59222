//! Ably MQTT Transport
//!
//! Uses the relay's MQTT adapter: the bearer token is the MQTT username,
//! the private channel is a topic and the instrument list is a plain
//! publish on `<user>.subscriptions`. Quote payloads are JSON.

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Outgoing,
    Packet, QoS, SubscribeReasonCode, Transport,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{StreamEvent, StreamTransport, TransportError};
use crate::domain::credential::Credential;
use crate::domain::quote::Quote;
use crate::domain::session::{ChannelSequencer, HandshakeCommand, subscription_payload};
use crate::infrastructure::lemon::QuoteRecord;

/// Production MQTT broker.
pub const DEFAULT_HOST: &str = "mqtt.ably.io";

/// TLS port of the broker.
pub const DEFAULT_TLS_PORT: u16 = 8883;

/// MQTT transport settings.
#[derive(Debug, Clone)]
pub struct MqttTransportConfig {
    /// Broker host.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// Connect over TLS.
    pub tls: bool,
    /// MQTT client identifier.
    pub client_id: String,
    /// Keep-alive interval.
    pub keep_alive: Duration,
    /// How long to drain the event loop after DISCONNECT.
    pub close_timeout: Duration,
}

impl Default for MqttTransportConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_TLS_PORT,
            tls: true,
            client_id: "Ably_Client".to_string(),
            keep_alive: Duration::from_secs(60),
            close_timeout: Duration::from_secs(1),
        }
    }
}

impl MqttTransportConfig {
    /// Client options for a connection authenticated with `credential`.
    #[must_use]
    pub fn options(&self, credential: &Credential) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, &self.host, self.port);
        options
            .set_keep_alive(self.keep_alive)
            .set_credentials(credential.token(), "");
        if self.tls {
            options.set_transport(Transport::tls_with_default_config());
        }
        options
    }
}

/// What the connection loop must do after an incoming packet.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    /// Broker accepted the connection; subscribe to the channel.
    Connected(HandshakeCommand),
    /// Subscription confirmed; publish the instrument list.
    Attached(HandshakeCommand),
    /// A quote arrived.
    Quote(Quote),
    /// Broker disconnected.
    Closed,
    /// Nothing to do.
    Idle,
}

/// CONNACK return code as reported by the broker.
const fn refusal_code(code: &ConnectReturnCode) -> i64 {
    match code {
        ConnectReturnCode::Success => 0,
        ConnectReturnCode::RefusedProtocolVersion => 1,
        ConnectReturnCode::BadClientId => 2,
        ConnectReturnCode::ServiceUnavailable => 3,
        ConnectReturnCode::BadUserNamePassword => 4,
        ConnectReturnCode::NotAuthorized => 5,
    }
}

/// Advance the handshake for one incoming packet.
fn step(sequencer: &mut ChannelSequencer, packet: &Packet) -> Result<Step, TransportError> {
    match packet {
        Packet::ConnAck(ack) => {
            if ack.code != ConnectReturnCode::Success {
                return Err(TransportError::Rejected {
                    code: refusal_code(&ack.code),
                    message: format!("connection refused: {:?}", ack.code),
                });
            }
            Ok(Step::Connected(sequencer.on_connected()))
        }
        Packet::SubAck(ack) => {
            if ack
                .return_codes
                .iter()
                .any(|code| matches!(code, SubscribeReasonCode::Failure))
            {
                return Err(TransportError::Rejected {
                    code: 128,
                    message: format!("subscription to {} refused", sequencer.subscriber()),
                });
            }
            Ok(sequencer.on_attached().map_or(Step::Idle, Step::Attached))
        }
        Packet::Publish(publish) => {
            if !sequencer.accepts_quotes() {
                tracing::debug!(topic = %publish.topic, "Ignoring publish before subscription");
                return Ok(Step::Idle);
            }
            match serde_json::from_slice::<QuoteRecord>(&publish.payload) {
                Ok(record) => Ok(Step::Quote(Quote::from(record))),
                Err(e) => {
                    tracing::warn!(
                        topic = %publish.topic,
                        error = %e,
                        "Skipping undecodable quote"
                    );
                    Ok(Step::Idle)
                }
            }
        }
        Packet::Disconnect => {
            sequencer.reset();
            Ok(Step::Closed)
        }
        other => {
            tracing::trace!(packet = ?other, "Ignoring packet");
            Ok(Step::Idle)
        }
    }
}

/// Ably realtime relay over MQTT.
#[derive(Debug, Clone, Default)]
pub struct MqttTransport {
    config: MqttTransportConfig,
}

impl MqttTransport {
    /// Create a new transport.
    #[must_use]
    pub const fn new(config: MqttTransportConfig) -> Self {
        Self { config }
    }

    async fn execute(
        &self,
        client: &AsyncClient,
        command: HandshakeCommand,
    ) -> Result<(), TransportError> {
        match command {
            HandshakeCommand::Attach { channel } => {
                tracing::info!(%channel, "Subscribing to channel");
                client
                    .subscribe(channel, QoS::AtMostOnce)
                    .await
                    .map_err(|e| TransportError::Connection(e.to_string()))
            }
            HandshakeCommand::PublishSubscriptions {
                channel,
                instruments,
            } => {
                tracing::info!(%channel, instruments = instruments.len(), "Publishing instruments");
                client
                    .publish(channel, QoS::AtMostOnce, false, subscription_payload(&instruments))
                    .await
                    .map_err(|e| TransportError::Connection(e.to_string()))
            }
        }
    }

    /// Send DISCONNECT and poll until it is written or the timeout passes.
    async fn disconnect(&self, client: &AsyncClient, eventloop: &mut EventLoop) {
        tracing::info!("Disconnecting from broker");
        if let Err(e) = client.disconnect().await {
            tracing::debug!(error = %e, "Disconnect request failed");
            return;
        }

        let drain = async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        };
        if tokio::time::timeout(self.config.close_timeout, drain).await.is_err() {
            tracing::debug!("Broker did not confirm disconnect before timeout");
        }
    }
}

#[async_trait]
impl StreamTransport for MqttTransport {
    fn name(&self) -> &'static str {
        "mqtt"
    }

    async fn run(
        &self,
        credential: &Credential,
        instruments: &[String],
        events: mpsc::Sender<StreamEvent>,
        cancel: CancellationToken,
    ) -> Result<(), TransportError> {
        tracing::info!(
            host = %self.config.host,
            port = self.config.port,
            tls = self.config.tls,
            "Connecting to MQTT broker"
        );

        let (client, mut eventloop) = AsyncClient::new(self.config.options(credential), 10);
        let mut sequencer = ChannelSequencer::new(credential.user_id(), instruments.to_vec());

        loop {
            let event = tokio::select! {
                () = cancel.cancelled() => {
                    self.disconnect(&client, &mut eventloop).await;
                    let _ = events.send(StreamEvent::Disconnected).await;
                    return Ok(());
                }
                event = eventloop.poll() => event,
            };

            let packet = match event {
                Ok(Event::Incoming(packet)) => packet,
                Ok(Event::Outgoing(_)) => continue,
                Err(ConnectionError::ConnectionRefused(code)) => {
                    return Err(TransportError::Rejected {
                        code: refusal_code(&code),
                        message: format!("connection refused: {code:?}"),
                    });
                }
                Err(e) => {
                    let _ = events.send(StreamEvent::Disconnected).await;
                    return Err(TransportError::Connection(e.to_string()));
                }
            };

            match step(&mut sequencer, &packet)? {
                Step::Connected(command) => {
                    tracing::info!("Connected to MQTT broker");
                    let _ = events.send(StreamEvent::Connected).await;
                    self.execute(&client, command).await?;
                }
                Step::Attached(command) => {
                    let _ = events
                        .send(StreamEvent::Attached {
                            channel: sequencer.subscriber().to_string(),
                        })
                        .await;
                    self.execute(&client, command).await?;
                    let _ = events
                        .send(StreamEvent::Subscribed {
                            instruments: sequencer.instruments().to_vec(),
                        })
                        .await;
                }
                Step::Quote(quote) => {
                    let _ = events.send(StreamEvent::Quote(quote)).await;
                }
                Step::Closed => {
                    tracing::info!("Broker closed connection");
                    let _ = events.send(StreamEvent::Disconnected).await;
                    return Ok(());
                }
                Step::Idle => {}
            }
        }
    }
}
