//! Configuration constants and types for the WebSocket transport

use std::time::Duration;

use crate::types::options::DEFAULT_CONNECT_TIMEOUT;

/// Default maximum size of a single inbound message (1MB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// WebSocket connector configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WebSocketConfig {
    /// Timeout for the opening handshake
    pub connect_timeout: Duration,
    /// Messages larger than this are dropped with an error
    pub max_message_size: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}
