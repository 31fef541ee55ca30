//! Type definitions for the assistant link
//!
//! This module contains the type definitions shared by every layer,
//! organized into logical submodules:
//!
//! - [`identifiers`] - Type-safe ID wrappers (`StreamId`, `ConnectionId`, `MessageId`, `ConversationId`)
//! - [`messages`] - Chat history records
//! - [`events`] - Inbound/outbound socket events and chunked-stream events
//! - [`options`] - Client configuration and reconnection policy

pub mod events;
pub mod identifiers;
pub mod messages;
pub mod options;

// Re-export commonly used types
pub use events::{
    ChatStreamEvent, ChatStreamRequest, EventKind, InboundEvent, OutboundMessage,
};
pub use identifiers::{ConnectionId, ConversationId, MessageId, StreamId};
pub use messages::{ChatMessage, MessageMetadata, Role};
pub use options::{
    AuthEndpoints, ClientOptions, ClientOptionsBuilder, ConnectionOptions, ReconnectPolicy,
};
