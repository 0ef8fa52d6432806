//! Error types and handling for Huddle
//!
//! Validation failures carry the exact text that is sent to the offending
//! connection before it is closed, so `to_string()` doubles as the wire reason.

use thiserror::Error;

/// Main result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Huddle
#[derive(Error, Debug)]
pub enum Error {
    /// A room with the requested title already exists
    #[error("Room already exists")]
    DuplicateTitle,

    /// The addressed room does not exist (or has expired)
    #[error("Room not found")]
    RoomNotFound,

    /// A room join was attempted without a display name
    #[error("Name is required")]
    NameRequired,

    /// Another member of the room already uses the display name
    #[error("Name already taken")]
    NameTaken,

    /// The call session already holds its maximum number of peers
    #[error("Room is full")]
    CallFull,

    /// Delivery to a single connection failed; never fatal for a broadcast
    #[error("Send failed: {0}")]
    SendFailure(String),

    /// Inbound signaling frame did not match a known envelope
    #[error("Invalid signaling envelope: {0}")]
    InvalidEnvelope(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors from std
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Config file parse errors
    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Prometheus metrics errors
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a per-recipient send failure
    pub fn send_failure(msg: impl Into<String>) -> Self {
        Self::SendFailure(msg.into())
    }

    /// Create an invalid envelope error
    pub fn invalid_envelope(msg: impl Into<String>) -> Self {
        Self::InvalidEnvelope(msg.into())
    }

    /// Check if this is a client error (4xx equivalent)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::DuplicateTitle
                | Error::RoomNotFound
                | Error::NameRequired
                | Error::NameTaken
                | Error::CallFull
                | Error::InvalidEnvelope(_)
        )
    }

    /// Check if this is a server error (5xx equivalent)
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }
}
