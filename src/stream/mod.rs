//! Streamed chat responses
//!
//! [`StreamCoordinator`] is the transport-neutral state machine. [`SocketChat`]
//! feeds it from the realtime socket and [`HttpChat`] from the chunked-HTTP
//! transport.

mod coordinator;
mod http_chat;
mod socket_chat;

pub use coordinator::{
    StreamCoordinator, StreamEvent, StreamFailure, StreamHandlers, StreamOutcome, StreamPhase,
    StreamSession,
};
pub use http_chat::{CANCELLED, HttpChat, StreamTask};
pub use socket_chat::{CONNECTION_LOST, DEFAULT_MODEL, DEFAULT_PROVIDER, SendOptions, SocketChat};
