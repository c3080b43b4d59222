//! Channel Handshake Sequencing
//!
//! Tracks the handshake a realtime connection goes through before quotes
//! start flowing. The sequence is the same for both transports:
//!
//! 1. Transport reports the connection is up
//! 2. Attach to the subscriber's private channel
//! 3. Transport reports the channel is attached
//! 4. Publish the instrument list to `<subscriber>.subscriptions`
//!
//! Only after step 4 are quote messages accepted. The sequencer is pure
//! state; transports translate its commands into protocol frames.

/// Suffix of the topic the instrument list is published to.
pub const SUBSCRIPTIONS_SUFFIX: &str = ".subscriptions";

/// Name of the message carrying the instrument list.
pub const SUBSCRIPTIONS_MESSAGE_NAME: &str = "isins";

// =============================================================================
// Handshake State
// =============================================================================

/// Current state of the channel handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandshakeState {
    /// Not yet connected.
    #[default]
    Disconnected,

    /// Connection established, attach not yet requested.
    Connected,

    /// Attach request sent, awaiting confirmation.
    Attaching,

    /// Channel attached and subscriptions published.
    Attached,
}

impl HandshakeState {
    /// Check if the channel is attached.
    #[must_use]
    pub const fn is_attached(&self) -> bool {
        matches!(self, Self::Attached)
    }

    /// Check if an attach request is outstanding or completed.
    #[must_use]
    pub const fn has_requested_attach(&self) -> bool {
        matches!(self, Self::Attaching | Self::Attached)
    }
}

// =============================================================================
// Commands
// =============================================================================

/// Outbound action a transport must perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeCommand {
    /// Attach to (or subscribe to) the subscriber's channel.
    Attach {
        /// Channel name.
        channel: String,
    },

    /// Publish the comma-joined instrument list.
    PublishSubscriptions {
        /// Target channel, `<subscriber>.subscriptions`.
        channel: String,
        /// Instruments to stream.
        instruments: Vec<String>,
    },
}

/// Join instruments into the payload format the relay expects.
#[must_use]
pub fn subscription_payload(instruments: &[String]) -> String {
    instruments.join(",")
}

// =============================================================================
// Sequencer
// =============================================================================

/// Drives the attach/publish handshake for one connection.
#[derive(Debug, Clone)]
pub struct ChannelSequencer {
    subscriber: String,
    instruments: Vec<String>,
    state: HandshakeState,
}

impl ChannelSequencer {
    /// Create a sequencer for a subscriber and its instrument list.
    #[must_use]
    pub fn new(subscriber: impl Into<String>, instruments: Vec<String>) -> Self {
        Self {
            subscriber: subscriber.into(),
            instruments,
            state: HandshakeState::Disconnected,
        }
    }

    /// Get the current handshake state.
    #[must_use]
    pub const fn state(&self) -> HandshakeState {
        self.state
    }

    /// Subscriber id (private channel name).
    #[must_use]
    pub fn subscriber(&self) -> &str {
        &self.subscriber
    }

    /// Instruments that will be published.
    #[must_use]
    pub fn instruments(&self) -> &[String] {
        &self.instruments
    }

    /// Name of the subscriptions topic.
    #[must_use]
    pub fn subscriptions_channel(&self) -> String {
        format!("{}{SUBSCRIPTIONS_SUFFIX}", self.subscriber)
    }

    /// Check if quote messages should be processed.
    #[must_use]
    pub const fn accepts_quotes(&self) -> bool {
        self.state.is_attached()
    }

    /// Called when the transport reports the connection is up.
    ///
    /// Always returns the attach command; the state moves to `Attaching`.
    pub fn on_connected(&mut self) -> HandshakeCommand {
        self.state = HandshakeState::Connected;
        tracing::debug!(channel = %self.subscriber, "Requesting channel attach");
        self.state = HandshakeState::Attaching;
        HandshakeCommand::Attach {
            channel: self.subscriber.clone(),
        }
    }

    /// Called when the transport confirms the attach.
    ///
    /// Returns the publish command only when an attach is outstanding;
    /// confirmations in any other state are ignored.
    pub fn on_attached(&mut self) -> Option<HandshakeCommand> {
        if self.state != HandshakeState::Attaching {
            tracing::debug!(state = ?self.state, "Ignoring unexpected attach confirmation");
            return None;
        }

        self.state = HandshakeState::Attached;
        Some(HandshakeCommand::PublishSubscriptions {
            channel: self.subscriptions_channel(),
            instruments: self.instruments.clone(),
        })
    }

    /// Reset to disconnected state (e.g., after connection close).
    pub const fn reset(&mut self) {
        self.state = HandshakeState::Disconnected;
    }
}
