//! Transport layer for talking to the assistant backend
//!
//! Two transports are provided:
//!
//! - [`websocket`] opens the bidirectional realtime socket used by the
//!   connection manager. Socket implementations sit behind [`Connector`] so the
//!   manager can be driven by an in-memory socket in tests.
//! - [`http_stream`] posts a chat request and decodes the chunked response body
//!   line by line.

pub mod http_stream;
pub mod websocket;

use tokio::sync::mpsc;

use crate::error::Result;

/// Close code of a deliberate, clean shutdown
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code the server uses when it rejects the socket's credentials
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// Close code reported when the socket dropped without a close frame
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Frames the connection manager asks a socket to write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// A text frame
    Text(String),
    /// Close the socket with a normal close code
    Close,
}

/// How a socket was closed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    /// Close code
    pub code: u16,
    /// Close reason (may be empty)
    pub reason: String,
}

impl CloseInfo {
    /// Create close info
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Close info for a socket that dropped without a close frame
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self::new(CLOSE_ABNORMAL, reason)
    }

    /// Whether the close was deliberate and clean
    #[must_use]
    pub const fn is_normal(&self) -> bool {
        self.code == CLOSE_NORMAL
    }

    /// Whether the server rejected the socket's credentials
    #[must_use]
    pub const fn is_policy_violation(&self) -> bool {
        self.code == CLOSE_POLICY_VIOLATION
    }
}

/// Events a socket reports to its owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// A text frame arrived
    Text(String),
    /// A non-fatal socket error; a `Closed` event follows if the socket died
    Error(String),
    /// The socket is closed; no further events follow
    Closed(CloseInfo),
}

/// An open socket, as a pair of channels
///
/// Dropping `outbound` closes the socket; `inbound` ends after a
/// [`SocketEvent::Closed`].
#[derive(Debug)]
pub struct SocketChannel {
    /// Frames to write
    pub outbound: mpsc::UnboundedSender<OutboundFrame>,
    /// Events read from the socket
    pub inbound: mpsc::UnboundedReceiver<SocketEvent>,
}

/// Opens realtime sockets
///
/// Implementations resolve once the socket is open and hand back its channel
/// pair. The connection manager calls `connect` once per attempt.
pub trait Connector: Send + Sync + 'static {
    /// Open a socket to `url`
    ///
    /// # Errors
    /// Returns error if the socket could not be opened
    fn connect(&self, url: &str) -> impl std::future::Future<Output = Result<SocketChannel>> + Send;
}

pub use http_stream::{ChatEventStream, ChunkDecoder, HttpStreamTransport};
pub use websocket::{WebSocketConfig, WebSocketConnector};
