//! Error types for the assistant link

use thiserror::Error;

/// Main error type for the assistant link
#[derive(Error, Debug)]
pub enum LinkError {
    /// Connection error when opening or using the realtime socket
    #[error("Connection error: {0}")]
    Connection(String),

    /// Transport layer error
    #[error("Transport error: {0}")]
    Transport(String),

    /// JSON decode error when parsing a frame or response
    #[error("JSON decode error: {0}")]
    JsonDecode(#[from] serde_json::Error),

    /// Message parse error with optional raw data
    #[error("Message parse error: {message}")]
    MessageParse {
        /// Error message
        message: String,
        /// Raw message data that failed to parse
        data: Option<serde_json::Value>,
    },

    /// Inbound message carried a type tag this client does not know
    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("Request failed with status {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body (may be empty)
        body: String,
    },

    /// Request was still rejected after renewing credentials
    #[error("Unauthorized: credentials were rejected after renewal")]
    Unauthorized,

    /// Credentials could not be renewed; the session has been invalidated
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// A response is already streaming in this chat
    #[error("A response is already streaming")]
    StreamBusy,

    /// Chunked stream ended without a terminator or was cancelled
    #[error("Stream aborted: {0}")]
    StreamAborted(String),

    /// Decoder line exceeded the configured maximum size
    #[error("Line exceeded maximum buffer size of {0} bytes")]
    BufferOverflow(usize),
}

/// Result type alias for assistant link operations
pub type Result<T> = std::result::Result<T, LinkError>;

impl LinkError {
    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a message parse error
    pub fn message_parse(msg: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self::MessageParse {
            message: msg.into(),
            data,
        }
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a session expired error
    pub fn session_expired(reason: impl Into<String>) -> Self {
        Self::SessionExpired(reason.into())
    }

    /// Create a stream aborted error
    pub fn stream_aborted(reason: impl Into<String>) -> Self {
        Self::StreamAborted(reason.into())
    }

    /// Whether this error ended the user's session
    #[must_use]
    pub const fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Unauthorized | Self::SessionExpired(_))
    }
}
