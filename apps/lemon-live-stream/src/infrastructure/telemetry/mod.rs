//! Logging Setup
//!
//! Installs a `tracing` subscriber with a console formatter. The level
//! comes from the `[LOGGING]` section of the configuration unless
//! `RUST_LOG` is set, which takes precedence.
//!
//! # Usage
//!
//! ```ignore
//! use lemon_live_stream::infrastructure::{config::LogLevel, telemetry};
//!
//! telemetry::init(LogLevel::Info);
//! tracing::info!("Fetching credentials for live streaming");
//! ```

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::infrastructure::config::LogLevel;

/// Build the filter for `level`, unless `RUST_LOG` overrides it.
#[must_use]
#[allow(clippy::expect_used)]
pub fn env_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_filter()))
        .add_directive(
            "rustls=warn"
                .parse()
                .expect("static directive 'rustls=warn' is valid"),
        )
        .add_directive(
            "hyper=warn"
                .parse()
                .expect("static directive 'hyper=warn' is valid"),
        )
        .add_directive(
            "tungstenite=warn"
                .parse()
                .expect("static directive 'tungstenite=warn' is valid"),
        )
}

/// Initialize the global subscriber.
///
/// Must be called once, before the first log statement.
pub fn init(level: LogLevel) {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(env_filter(level))
        .with(fmt_layer)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_contains_dependency_directives() {
        let filter = env_filter(LogLevel::Debug).to_string();
        assert!(filter.contains("rustls=warn"));
        assert!(filter.contains("tungstenite=warn"));
    }
}
