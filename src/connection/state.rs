//! Connection state projection

use crate::dispatch::Routable;
use crate::types::identifiers::ConnectionId;

/// Lifecycle state of the realtime connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No socket and no pending reconnection
    #[default]
    Disconnected,
    /// A socket is being opened
    Connecting,
    /// The socket is open
    Connected,
    /// The socket dropped; waiting before the next attempt
    Reconnecting,
}

impl ConnectionState {
    /// Lowercase name for display
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only snapshot of the connection
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionStatus {
    /// Current state
    pub state: ConnectionState,
    /// Reconnection attempts since the last successful open
    pub attempts: u32,
    /// Most recent socket or protocol error
    pub last_error: Option<String>,
    /// Server-assigned ID of the current socket
    pub session_id: Option<ConnectionId>,
    /// Reconnection gave up; the connection stays down until `connect()`
    pub exhausted: bool,
}

impl ConnectionStatus {
    /// Whether messages can be sent
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

/// A single state transition, as delivered to lifecycle listeners
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionChange {
    /// Status before the transition
    pub previous: ConnectionStatus,
    /// Status after the transition
    pub status: ConnectionStatus,
}

impl ConnectionChange {
    /// Whether this transition left the `Connected` state
    #[must_use]
    pub fn left_connected(&self) -> bool {
        self.previous.is_connected() && !self.status.is_connected()
    }
}

impl Routable for ConnectionChange {
    type Kind = ConnectionState;

    fn kind(&self) -> ConnectionState {
        self.status.state
    }
}
