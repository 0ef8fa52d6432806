//! Configuration management for Huddle
//!
//! Settings are layered: built-in defaults, then a TOML file, then `HUDDLE_*`
//! environment variables. Command line overrides are applied by the binary.

use crate::core::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Config file picked up from the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "huddle.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,

    /// Room lifecycle configuration
    pub rooms: RoomConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Metrics and monitoring
    pub metrics: MetricsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP and WebSocket bind address
    pub http_addr: SocketAddr,

    /// Allow any origin, method and header
    pub cors_permissive: bool,
}

/// Room lifecycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// How long an empty room survives before it is deleted
    #[serde(with = "duration_str")]
    pub expiry_grace: Duration,

    /// Number of chat messages retained per open room
    pub history_limit: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Expose Prometheus metrics on `/metrics`
    pub enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            cors_permissive: true,
        }
    }
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            expiry_grace: Duration::from_secs(60),
            history_limit: 100,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Config {
    /// Load configuration from an optional file, then environment overrides
    ///
    /// Without an explicit path, `huddle.toml` in the working directory is used
    /// if it exists; otherwise defaults apply.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::from_file(DEFAULT_CONFIG_FILE)?,
            None => Config::default(),
        };

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("Failed to read config file {:?}: {}", path, e)))?;

        let config = toml::from_str(&contents)?;
        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        use std::env;

        if let Ok(addr) = env::var("HUDDLE_HTTP_ADDR") {
            self.server.http_addr = addr.parse()
                .map_err(|e| Error::config(format!("Invalid HTTP address: {}", e)))?;
        }

        if let Ok(grace) = env::var("HUDDLE_EXPIRY_GRACE") {
            self.rooms.expiry_grace = parse_duration(&grace).map_err(Error::config)?;
        }

        if let Ok(limit) = env::var("HUDDLE_HISTORY_LIMIT") {
            self.rooms.history_limit = limit.parse()
                .map_err(|e| Error::config(format!("Invalid history limit: {}", e)))?;
        }

        if let Ok(level) = env::var("HUDDLE_LOG_LEVEL") {
            self.logging.level = level;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.rooms.expiry_grace.is_zero() {
            return Err(Error::config("Room expiry grace period must be greater than zero"));
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {},
            other => return Err(Error::config(format!("Invalid log level: {}", other))),
        }

        Ok(())
    }
}

/// Parse a duration string such as `500ms`, `60s`, `5m`, `1h` or bare seconds
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        let ms: u64 = ms.parse().map_err(|_| format!("Invalid milliseconds: {}", s))?;
        Ok(Duration::from_millis(ms))
    } else if let Some(secs) = s.strip_suffix('s') {
        let secs: u64 = secs.parse().map_err(|_| format!("Invalid seconds: {}", s))?;
        Ok(Duration::from_secs(secs))
    } else if let Some(mins) = s.strip_suffix('m') {
        let mins: u64 = mins.parse().map_err(|_| format!("Invalid minutes: {}", s))?;
        let secs = mins.checked_mul(60).ok_or_else(|| format!("Invalid minutes: {}", s))?;
        Ok(Duration::from_secs(secs))
    } else if let Some(hours) = s.strip_suffix('h') {
        let hours: u64 = hours.parse().map_err(|_| format!("Invalid hours: {}", s))?;
        let secs = hours.checked_mul(3600).ok_or_else(|| format!("Invalid hours: {}", s))?;
        Ok(Duration::from_secs(secs))
    } else {
        let secs: u64 = s.parse().map_err(|_| format!("Invalid duration format: {}", s))?;
        Ok(Duration::from_secs(secs))
    }
}

// Durations travel through TOML as human-readable strings
mod duration_str {
    use serde::de::{self, Deserializer, Visitor};
    use serde::Serializer;
    use std::fmt;
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DurationVisitor;

        impl<'de> Visitor<'de> for DurationVisitor {
            type Value = Duration;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a duration string like '30s' or '5m', or integer seconds")
            }

            fn visit_str<E>(self, value: &str) -> Result<Duration, E>
            where
                E: de::Error,
            {
                super::parse_duration(value).map_err(E::custom)
            }

            fn visit_i64<E>(self, value: i64) -> Result<Duration, E>
            where
                E: de::Error,
            {
                u64::try_from(value)
                    .map(Duration::from_secs)
                    .map_err(|_| E::custom("duration must not be negative"))
            }

            fn visit_u64<E>(self, value: u64) -> Result<Duration, E>
            where
                E: de::Error,
            {
                Ok(Duration::from_secs(value))
            }
        }

        deserializer.deserialize_any(DurationVisitor)
    }
}
