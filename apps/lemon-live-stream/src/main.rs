//! lemon.markets Live Stream Binary
//!
//! Streams quotes for the configured instruments and logs them.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin lemon-live-stream
//! ```
//!
//! # Configuration
//!
//! - `LEMON_API_KEY`: API key (environment, `.env` or `[API]` in `config.ini`)
//! - `LEMON_CONFIG_PATH`: INI file path (default: `config.ini`)
//! - `RUST_LOG`: Overrides `[LOGGING] loglevel`
//!
//! See `config.example.ini` for the INI sections.

use std::process::ExitCode;
use std::sync::Arc;

use lemon_live_stream::{
    LemonClient, LemonClientConfig, LogLevel, MqttTransport, QuoteBook, QuotePrinter,
    QuoteService, StreamConfig, StreamSession, StreamTransport, TokenGuard, TransportKind,
    WebSocketTransport, init_telemetry,
};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Capacity of the transport → quote service channel.
const EVENT_CHANNEL_CAPACITY: usize = 1_000;

#[tokio::main]
#[allow(clippy::expect_used)]
async fn main() -> ExitCode {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv();

    let config = match StreamConfig::load() {
        Ok(config) => config,
        Err(e) => {
            init_telemetry(LogLevel::Info);
            tracing::error!(error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    init_telemetry(config.log_level);
    log_config(&config);

    let client = match LemonClient::new(config.api_key.expose(), &LemonClientConfig::default()) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::error!(error = %e, "Failed to create REST client");
            return ExitCode::FAILURE;
        }
    };

    let transport: Arc<dyn StreamTransport> = match config.transport {
        TransportKind::Mqtt => Arc::new(MqttTransport::new(config.mqtt())),
        TransportKind::WebSocket => Arc::new(WebSocketTransport::new(config.websocket())),
    };

    let shutdown_token = CancellationToken::new();
    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    let book = Arc::new(QuoteBook::new());
    let service = QuoteService::new(
        Arc::clone(&book),
        Arc::clone(&client),
        QuotePrinter::new(config.timezone),
    );
    let service_handle = tokio::spawn(service.run(event_rx));

    tokio::spawn(await_shutdown(shutdown_token.clone()));

    let mut session = StreamSession::new(
        TokenGuard::new(client).with_timezone(config.timezone),
        transport,
        config.instruments.clone(),
        event_tx,
    );
    let result = session.run(shutdown_token).await;

    // Closing the event channel lets the quote service drain and finish
    drop(session);
    if let Err(e) = service_handle.await {
        tracing::warn!(error = %e, "Quote service task failed");
    }

    match result {
        Ok(()) => {
            tracing::info!(instruments = book.len(), "Disconnected. Exiting");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Live stream failed");
            ExitCode::FAILURE
        }
    }
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &StreamConfig) {
    tracing::info!(
        source = %config.source.display(),
        transport = config.transport.as_str(),
        format = %config.format,
        heartbeats = config.heartbeats,
        timezone = %config.timezone,
        instruments = config.instruments.len(),
        "Configuration loaded"
    );
    tracing::debug!(instruments = ?config.instruments, "Requested instruments");
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::warn!("Received Ctrl+C, closing connection");
        }
        () = terminate => {
            tracing::warn!("Received SIGTERM, closing connection");
        }
    }

    shutdown_token.cancel();
}
