//! Stream Session
//!
//! Runs the realtime transport with a valid credential and rotates the
//! connection before the token expires. The rotation sleeps until one hour
//! before expiry, cancels the running connection gracefully, asks the
//! token guard for a fresh credential and reconnects.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::token_guard::TokenGuard;
use crate::application::ports::{
    MarketDataError, MarketDataPort, StreamEvent, StreamTransport, TransportError,
};
use crate::domain::credential::Credential;

/// Lower bound between two token rotations.
pub const MIN_ROTATION_DELAY: Duration = Duration::from_secs(60);

/// Errors that end a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Credential fetch failed.
    #[error("credential fetch failed: {0}")]
    Credentials(#[from] MarketDataError),

    /// Transport failed.
    #[error("{transport} transport failed: {source}")]
    Transport {
        /// Transport name.
        transport: &'static str,
        /// Underlying error.
        #[source]
        source: TransportError,
    },
}

/// Why a single connection ended.
enum ConnectionEnd {
    /// Relay closed or shutdown requested.
    Finished,
    /// Token is about to expire.
    Rotate,
}

/// Owns the credential lifecycle around a transport.
pub struct StreamSession<P: ?Sized, T: ?Sized> {
    guard: TokenGuard<P>,
    transport: Arc<T>,
    instruments: Vec<String>,
    events: mpsc::Sender<StreamEvent>,
}

impl<P, T> StreamSession<P, T>
where
    P: MarketDataPort + ?Sized,
    T: StreamTransport + ?Sized,
{
    /// Create a new session.
    #[must_use]
    pub const fn new(
        guard: TokenGuard<P>,
        transport: Arc<T>,
        instruments: Vec<String>,
        events: mpsc::Sender<StreamEvent>,
    ) -> Self {
        Self {
            guard,
            transport,
            instruments,
            events,
        }
    }

    /// Run connections until shutdown, relay close or error.
    ///
    /// # Errors
    ///
    /// Returns the first credential or transport error. There is no retry.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<(), SessionError> {
        let mut rotating = false;
        loop {
            if shutdown.is_cancelled() {
                return Ok(());
            }

            let credential = if rotating {
                self.guard.refresh().await?.clone()
            } else {
                self.guard.ensure_fresh(Utc::now()).await?.clone()
            };
            let rotate_in = credential
                .time_until_refresh(Utc::now())
                .max(MIN_ROTATION_DELAY);

            tracing::info!(
                transport = self.transport.name(),
                rotate_in_secs = rotate_in.as_secs(),
                "Starting live stream connection"
            );

            match self.run_connection(&credential, rotate_in, &shutdown).await? {
                ConnectionEnd::Finished => return Ok(()),
                ConnectionEnd::Rotate => {
                    tracing::info!("Reconnecting with a fresh token");
                    rotating = true;
                }
            }
        }
    }

    async fn run_connection(
        &self,
        credential: &Credential,
        rotate_in: Duration,
        shutdown: &CancellationToken,
    ) -> Result<ConnectionEnd, SessionError> {
        let connection_cancel = shutdown.child_token();
        let connection = self.transport.run(
            credential,
            &self.instruments,
            self.events.clone(),
            connection_cancel.clone(),
        );
        tokio::pin!(connection);

        let end = tokio::select! {
            result = &mut connection => {
                result.map_err(|source| self.transport_error(source))?;
                ConnectionEnd::Finished
            }
            () = tokio::time::sleep(rotate_in) => {
                tracing::warn!(
                    expires_at = %credential.expires_at(),
                    "Token expires within the hour, closing connection"
                );
                connection_cancel.cancel();
                connection.await.map_err(|source| self.transport_error(source))?;
                ConnectionEnd::Rotate
            }
        };

        Ok(end)
    }

    fn transport_error(&self, source: TransportError) -> SessionError {
        SessionError::Transport {
            transport: self.transport.name(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::MockMarketDataPort;
    use async_trait::async_trait;
    use chrono::TimeDelta;
    use parking_lot::Mutex;

    /// Transport that records the tokens it was started with.
    struct RecordingTransport {
        tokens: Mutex<Vec<String>>,
        fail: bool,
    }

    impl RecordingTransport {
        fn new(fail: bool) -> Self {
            Self {
                tokens: Mutex::new(Vec::new()),
                fail,
            }
        }
    }

    #[async_trait]
    impl StreamTransport for RecordingTransport {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn run(
            &self,
            credential: &Credential,
            _instruments: &[String],
            events: mpsc::Sender<StreamEvent>,
            cancel: CancellationToken,
        ) -> Result<(), TransportError> {
            self.tokens.lock().push(credential.token().to_string());
            if self.fail {
                return Err(TransportError::Connection("refused".to_string()));
            }
            let _ = events.send(StreamEvent::Connected).await;
            cancel.cancelled().await;
            Ok(())
        }
    }

    fn provider_with_tokens(valid_for: TimeDelta) -> MockMarketDataPort {
        let mut provider = MockMarketDataPort::new();
        let mut counter = 0;
        provider.expect_authenticate().returning(move || {
            counter += 1;
            Ok(Credential::new(
                "usr_1",
                format!("token-{counter}"),
                Utc::now() + valid_for,
            ))
        });
        provider
    }

    #[tokio::test(start_paused = true)]
    async fn stale_tokens_rotate_at_minimum_interval() {
        // Every fetched token is already inside the refresh margin
        let provider = Arc::new(provider_with_tokens(TimeDelta::minutes(30)));
        let transport = Arc::new(RecordingTransport::new(false));
        let (tx, _rx) = mpsc::channel(16);

        let mut session = StreamSession::new(
            TokenGuard::new(provider),
            Arc::clone(&transport),
            vec!["US0378331005".to_string()],
            tx,
        );

        let shutdown = CancellationToken::new();
        let stopper = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(150)).await;
            stopper.cancel();
        });

        session.run(shutdown).await.unwrap();

        let tokens = transport.tokens.lock().clone();
        assert_eq!(tokens, vec!["token-1", "token-2", "token-3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn rotation_always_fetches_a_new_token() {
        // Paused time runs ahead of the wall clock, so the held token still
        // looks fresh when the rotation fires
        let provider = Arc::new(provider_with_tokens(TimeDelta::hours(2)));
        let transport = Arc::new(RecordingTransport::new(false));
        let (tx, _rx) = mpsc::channel(16);

        let mut session = StreamSession::new(
            TokenGuard::new(provider),
            Arc::clone(&transport),
            vec!["US0378331005".to_string()],
            tx,
        );

        let shutdown = CancellationToken::new();
        let stopper = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(90 * 60)).await;
            stopper.cancel();
        });

        session.run(shutdown).await.unwrap();

        let tokens = transport.tokens.lock().clone();
        assert_eq!(tokens, vec!["token-1", "token-2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_ends_session_without_rotation() {
        let provider = Arc::new(provider_with_tokens(TimeDelta::hours(24)));
        let transport = Arc::new(RecordingTransport::new(false));
        let (tx, mut rx) = mpsc::channel(16);

        let mut session = StreamSession::new(
            TokenGuard::new(provider),
            Arc::clone(&transport),
            vec![],
            tx,
        );

        let shutdown = CancellationToken::new();
        let stopper = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            stopper.cancel();
        });

        session.run(shutdown).await.unwrap();
        assert_eq!(transport.tokens.lock().len(), 1);
        assert_eq!(rx.recv().await, Some(StreamEvent::Connected));
    }

    #[tokio::test]
    async fn transport_error_ends_session() {
        let provider = Arc::new(provider_with_tokens(TimeDelta::hours(24)));
        let transport = Arc::new(RecordingTransport::new(true));
        let (tx, _rx) = mpsc::channel(16);

        let mut session = StreamSession::new(TokenGuard::new(provider), transport, vec![], tx);

        let err = session.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Transport {
                transport: "recording",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn credential_error_ends_session() {
        let mut provider = MockMarketDataPort::new();
        provider
            .expect_authenticate()
            .returning(|| Err(MarketDataError::Unauthorized));
        let transport = Arc::new(RecordingTransport::new(false));
        let (tx, _rx) = mpsc::channel(16);

        let mut session = StreamSession::new(
            TokenGuard::new(Arc::new(provider)),
            Arc::clone(&transport),
            vec![],
            tx,
        );

        let err = session.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, SessionError::Credentials(MarketDataError::Unauthorized)));
        assert!(transport.tokens.lock().is_empty());
    }
}
