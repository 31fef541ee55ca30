//! Chat message type definitions
//!
//! `ChatMessage` is the record the UI store renders. Assistant messages are
//! created empty when a stream starts, grow while it is active, and are frozen
//! once the matching end or error event arrives.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::identifiers::{MessageId, StreamId};

/// Author of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Typed by the user
    User,
    /// Produced by the assistant
    Assistant,
    /// Injected by the application
    System,
}

/// Optional metadata attached to a chat message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMetadata {
    /// Model that generated the message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Provider that served the model
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    /// Stream that produced the message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<StreamId>,
    /// Error that terminated the stream, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A single entry of the chat history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message ID
    pub id: MessageId,
    /// Author role
    pub role: Role,
    /// Text content
    pub content: String,
    /// Creation time
    pub timestamp: DateTime<Utc>,
    /// Whether tokens are still arriving for this message
    pub is_streaming: bool,
    /// Optional metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

impl ChatMessage {
    /// Create a finalized user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: MessageId::generate(),
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            is_streaming: false,
            metadata: None,
        }
    }

    /// Create an empty assistant message that is still streaming
    #[must_use]
    pub fn streaming_assistant(metadata: MessageMetadata) -> Self {
        Self {
            id: MessageId::generate(),
            role: Role::Assistant,
            content: String::new(),
            timestamp: Utc::now(),
            is_streaming: true,
            metadata: Some(metadata),
        }
    }

    /// Error annotation, if the message was terminated by a failure
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.metadata.as_ref().and_then(|m| m.error.as_deref())
    }
}
