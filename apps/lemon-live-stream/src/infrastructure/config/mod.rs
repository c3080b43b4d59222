//! Configuration Module
//!
//! Configuration loading for the live stream client.

mod settings;

pub use settings::{
    API_KEY_ENV, ApiKey, CONFIG_PATH_ENV, ConfigError, DEFAULT_CONFIG_PATH, LogLevel,
    StreamConfig, TransportKind,
};
