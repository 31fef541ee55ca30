//! WebSocket transport implementation
//!
//! This module opens the realtime socket with `tokio-tungstenite` and bridges
//! it to the channel pair the connection manager consumes.

mod config;
mod reader;
mod transport;

// Re-export public types
pub use config::WebSocketConfig;
pub use transport::WebSocketConnector;
