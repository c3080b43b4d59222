//! Stream Client Configuration Settings
//!
//! Configuration types for the live stream client, loaded from the
//! environment (after `.env`) and an INI file.
//!
//! # Sources
//!
//! - `LEMON_API_KEY`: API key, takes precedence over `[API] LEMON_API_KEY`
//! - `LEMON_CONFIG_PATH`: path of the INI file (default `config.ini`)
//!
//! # INI Layout
//!
//! ```ini
//! [API]
//! LEMON_API_KEY = ...
//!
//! [ISINS]
//! US0378331005 = Apple   ; one instrument per line
//! DE0007164600            ; description is optional
//!
//! [LOGGING]
//! loglevel = INFO
//!
//! [PROTOCOL]
//! transport = mqtt       # or websocket
//! format = json          # or msgpack
//! heartbeats = false
//!
//! [TIME]
//! timezone = Europe/Berlin
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono_tz::Tz;
use config::{Map, Source, Value};

use crate::infrastructure::ably::{FrameFormat, MqttTransportConfig, WebSocketTransportConfig};

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "LEMON_API_KEY";

/// Environment variable overriding the INI file path.
pub const CONFIG_PATH_ENV: &str = "LEMON_CONFIG_PATH";

/// Default INI file path.
pub const DEFAULT_CONFIG_PATH: &str = "config.ini";

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Protocol frames and handshake steps.
    Debug,
    /// Connection lifecycle and quotes.
    #[default]
    Info,
    /// Warnings only.
    Warning,
    /// Errors only.
    Error,
    /// Same as `Error`.
    Critical,
}

impl LogLevel {
    /// `EnvFilter` directive for this level.
    #[must_use]
    pub const fn as_filter(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warn",
            Self::Error | Self::Critical => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "DEBUG" => Ok(Self::Debug),
            "INFO" => Ok(Self::Info),
            "WARNING" | "WARN" => Ok(Self::Warning),
            "ERROR" => Ok(Self::Error),
            "CRITICAL" => Ok(Self::Critical),
            _ => Err(ConfigError::invalid("LOGGING.loglevel", s)),
        }
    }
}

/// Realtime transport selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    /// Ably MQTT adapter.
    #[default]
    Mqtt,
    /// Ably realtime protocol over WebSocket.
    WebSocket,
}

impl TransportKind {
    /// Get the transport name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Mqtt => "mqtt",
            Self::WebSocket => "websocket",
        }
    }
}

impl FromStr for TransportKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mqtt" => Ok(Self::Mqtt),
            "websocket" | "ws" => Ok(Self::WebSocket),
            _ => Err(ConfigError::invalid("PROTOCOL.transport", s)),
        }
    }
}

/// lemon.markets API key.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap a key.
    #[must_use]
    pub const fn new(key: String) -> Self {
        Self(key)
    }

    /// Get the key.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

/// Complete client configuration.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// API key.
    pub api_key: ApiKey,
    /// Instruments to stream, upper-case ISINs in file order.
    pub instruments: Vec<String>,
    /// Log verbosity.
    pub log_level: LogLevel,
    /// Realtime transport.
    pub transport: TransportKind,
    /// WebSocket frame format.
    pub format: FrameFormat,
    /// Ask the relay for protocol heartbeats.
    pub heartbeats: bool,
    /// Display timezone for quote times.
    pub timezone: Tz,
    /// INI file the settings were read from.
    pub source: PathBuf,
}

impl StreamConfig {
    /// Load configuration from the environment and the INI file.
    ///
    /// `.env` must already have been loaded into the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if no API key or no valid instrument is configured,
    /// or if a value cannot be parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
        let api_key = std::env::var(API_KEY_ENV).ok();

        Self::from_sources(api_key, &path)
    }

    /// Build configuration from an explicit API key and INI file.
    ///
    /// A non-empty `env_api_key` wins over the file's `[API]` entry. A
    /// missing file is treated as empty.
    ///
    /// # Errors
    ///
    /// See [`StreamConfig::load`].
    pub fn from_sources(env_api_key: Option<String>, path: &Path) -> Result<Self, ConfigError> {
        let ini = IniSections::read(path)?;

        let api_key = env_api_key
            .filter(|key| !key.trim().is_empty())
            .or_else(|| ini.get("API", "LEMON_API_KEY").map(str::to_string))
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        let instruments = parse_instruments(ini.keys("ISINS"))?;
        if instruments.is_empty() {
            return Err(ConfigError::NoInstruments(path.display().to_string()));
        }

        let log_level = ini
            .get("LOGGING", "loglevel")
            .map_or(Ok(LogLevel::default()), str::parse)?;

        let transport = ini
            .get("PROTOCOL", "transport")
            .map_or(Ok(TransportKind::default()), str::parse)?;

        let format = ini
            .get("PROTOCOL", "format")
            .map_or(Ok(FrameFormat::default()), |v| {
                v.parse()
                    .map_err(|_| ConfigError::invalid("PROTOCOL.format", v))
            })?;

        let heartbeats = ini
            .get("PROTOCOL", "heartbeats")
            .map_or(Ok(false), |v| parse_bool("PROTOCOL.heartbeats", v))?;

        let timezone = ini.get("TIME", "timezone").map_or(Ok(Tz::UTC), |v| {
            v.parse::<Tz>()
                .map_err(|_| ConfigError::InvalidTimezone(v.to_string()))
        })?;

        Ok(Self {
            api_key: ApiKey::new(api_key.trim().to_string()),
            instruments,
            log_level,
            transport,
            format,
            heartbeats,
            timezone,
            source: path.to_path_buf(),
        })
    }

    /// WebSocket transport settings derived from this configuration.
    #[must_use]
    pub fn websocket(&self) -> WebSocketTransportConfig {
        WebSocketTransportConfig {
            format: self.format,
            heartbeats: self.heartbeats,
            ..WebSocketTransportConfig::default()
        }
    }

    /// MQTT transport settings derived from this configuration.
    #[must_use]
    pub fn mqtt(&self) -> MqttTransportConfig {
        MqttTransportConfig::default()
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No API key in the environment or the INI file.
    #[error("no API key found, set {API_KEY_ENV} in the environment, .env or config.ini")]
    MissingApiKey,

    /// `[ISINS]` section missing or empty.
    #[error("no instruments configured in the [ISINS] section of {0}")]
    NoInstruments(String),

    /// Instrument is not a well-formed ISIN.
    #[error("invalid ISIN: {0}")]
    InvalidIsin(String),

    /// Unknown IANA timezone.
    #[error("unknown timezone: {0}")]
    InvalidTimezone(String),

    /// Value could not be parsed.
    #[error("invalid value for {key}: {value}")]
    InvalidValue {
        /// `SECTION.key` of the setting.
        key: String,
        /// Offending value.
        value: String,
    },

    /// INI file exists but could not be read.
    #[error("could not read {path}: {source}")]
    File {
        /// File path.
        path: String,
        /// Underlying error.
        #[source]
        source: config::ConfigError,
    },
}

impl ConfigError {
    fn invalid(key: &str, value: &str) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

// =============================================================================
// INI access
// =============================================================================

/// INI sections with case-insensitive section and key lookup.
#[derive(Debug, Default)]
struct IniSections {
    sections: Vec<(String, Vec<(String, String)>)>,
}

impl IniSections {
    fn read(path: &Path) -> Result<Self, ConfigError> {
        let file_error = |source| ConfigError::File {
            path: path.display().to_string(),
            source,
        };

        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(file_error(config::ConfigError::Foreign(Box::new(e)))),
        };

        let root: Map<String, Value> = config::Config::builder()
            .add_source(config::File::from_str(
                &allow_bare_keys(&text),
                config::FileFormat::Ini,
            ))
            .build()
            .and_then(|built| built.collect())
            .map_err(file_error)?;

        let mut sections = Vec::with_capacity(root.len());
        for (name, value) in root {
            // Keys outside any section are not used
            let Ok(table) = value.into_table() else {
                continue;
            };
            let mut entries = Vec::with_capacity(table.len());
            for (key, value) in table {
                let value = value.into_string().map_err(file_error)?;
                entries.push((key, strip_inline_comment(&value).to_string()));
            }
            sections.push((name, entries));
        }

        Ok(Self { sections })
    }

    fn section(&self, name: &str) -> Option<&[(String, String)]> {
        self.sections
            .iter()
            .find(|(section, _)| section.eq_ignore_ascii_case(name))
            .map(|(_, entries)| entries.as_slice())
    }

    fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.section(section)?
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    }

    fn keys(&self, section: &str) -> Vec<&str> {
        self.section(section)
            .map(|entries| entries.iter().map(|(k, _)| k.as_str()).collect())
            .unwrap_or_default()
    }
}

/// Drop a trailing ` # ...` or ` ; ...` comment and surrounding whitespace.
///
/// A `#` or `;` only starts a comment after whitespace, so `abc#def` is
/// kept whole.
fn strip_inline_comment(value: &str) -> &str {
    let end = value
        .as_bytes()
        .windows(2)
        .position(|pair| pair[0].is_ascii_whitespace() && matches!(pair[1], b'#' | b';'))
        .unwrap_or(value.len());
    value[..end].trim()
}

/// Rewrite bare `KEY` lines as `KEY =` so instrument lists without
/// descriptions parse.
fn allow_bare_keys(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        let trimmed = line.trim();
        let is_entry = !trimmed.is_empty()
            && !trimmed.starts_with(['[', '#', ';'])
            && !trimmed.contains(['=', ':']);
        if is_entry {
            out.push_str(strip_inline_comment(trimmed));
            out.push_str(" =");
        } else {
            out.push_str(line);
        }
        out.push('\n');
    }
    out
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "yes" | "true" | "on" => Ok(true),
        "0" | "no" | "false" | "off" => Ok(false),
        _ => Err(ConfigError::invalid(key, value)),
    }
}

/// Check the ISIN shape: two letters, then ten letters or digits.
fn is_valid_isin(isin: &str) -> bool {
    isin.len() == 12
        && isin.chars().take(2).all(|c| c.is_ascii_alphabetic())
        && isin.chars().skip(2).all(|c| c.is_ascii_alphanumeric())
}

/// Normalise, validate and de-duplicate instrument keys.
fn parse_instruments(keys: Vec<&str>) -> Result<Vec<String>, ConfigError> {
    let mut instruments: Vec<String> = Vec::with_capacity(keys.len());
    for key in keys {
        let isin = key.trim().to_uppercase();
        if !is_valid_isin(&isin) {
            return Err(ConfigError::InvalidIsin(key.to_string()));
        }
        if !instruments.contains(&isin) {
            instruments.push(isin);
        }
    }
    Ok(instruments)
}
