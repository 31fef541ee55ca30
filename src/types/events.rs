//! Wire event type definitions
//!
//! Every socket frame is a JSON object with a `type` tag. Inbound frames decode
//! into the closed [`InboundEvent`] enum and outbound frames are built from
//! [`OutboundMessage`]. The chunked-HTTP transport has its own smaller event
//! set, [`ChatStreamEvent`].

use serde::{Deserialize, Serialize};

use super::identifiers::{ConnectionId, ConversationId, MessageId, StreamId};

// ============================================================================
// Inbound socket events
// ============================================================================

/// Events received from the server over the realtime socket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InboundEvent {
    /// Server accepted the socket and assigned it an ID
    #[serde(rename = "connection.established")]
    ConnectionEstablished {
        /// Server-assigned connection ID
        connection_id: ConnectionId,
        /// Authenticated user
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
        /// Server timestamp
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
    },
    /// Heartbeat reply
    #[serde(rename = "pong")]
    Pong {
        /// Server timestamp
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
    },
    /// Keep-alive broadcast by the server
    #[serde(rename = "ping")]
    Ping {
        /// Server timestamp
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
    },
    /// Server-side error not tied to a stream
    #[serde(rename = "error")]
    Error {
        /// Error description
        error: String,
    },
    /// An assistant response started streaming
    #[serde(rename = "llm.stream.start")]
    StreamStart {
        /// Stream correlator
        stream_id: StreamId,
        /// Model producing the response
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        /// Provider serving the model
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider: Option<String>,
        /// Server timestamp
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
    },
    /// A partial token batch for the active stream
    #[serde(rename = "llm.stream.chunk")]
    StreamChunk {
        /// Stream correlator
        stream_id: StreamId,
        /// Text to append
        content: String,
        /// Position of the chunk in the stream
        #[serde(default, skip_serializing_if = "Option::is_none")]
        chunk_index: Option<u64>,
    },
    /// The stream finished normally
    #[serde(rename = "llm.stream.end")]
    StreamEnd {
        /// Stream correlator
        stream_id: StreamId,
        /// Number of chunks the server sent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total_chunks: Option<u64>,
        /// Full response text as seen by the server
        #[serde(default, skip_serializing_if = "Option::is_none")]
        full_response: Option<String>,
    },
    /// The stream failed
    #[serde(rename = "llm.stream.error")]
    StreamError {
        /// Stream correlator, absent when the server could not attribute the failure
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stream_id: Option<StreamId>,
        /// Error description
        error: String,
    },
    /// The model requested a function call
    #[serde(rename = "llm.function_call")]
    FunctionCall {
        /// Stream correlator
        stream_id: StreamId,
        /// Function name
        function_name: String,
        /// Raw (possibly partial) JSON arguments
        #[serde(default)]
        arguments: Option<String>,
    },
    /// An agent performed an action (thinking, tool call, ...)
    #[serde(rename = "agent.action")]
    AgentAction {
        /// Acting agent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_name: Option<String>,
        /// Kind of action
        action_type: String,
        /// Action payload
        #[serde(default)]
        data: serde_json::Value,
    },
    /// Reply from an agent on a dedicated agent socket
    #[serde(rename = "agent.response")]
    AgentResponse {
        /// Replying agent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        agent_name: Option<String>,
        /// Reply text
        content: String,
        /// Server timestamp
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
    },
    /// Progress report for a long-running task
    #[serde(rename = "task.progress")]
    TaskProgress {
        /// Task ID
        task_id: String,
        /// Progress fraction or percentage as sent by the server
        progress: f64,
        /// Task status
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<String>,
        /// Human-readable message
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// User-facing notification
    #[serde(rename = "notification")]
    Notification {
        /// Notification category
        #[serde(default, skip_serializing_if = "Option::is_none")]
        notification_type: Option<String>,
        /// Title
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        /// Body
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        /// Extra payload
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<serde_json::Value>,
    },
    /// Broadcast to every connected user
    #[serde(rename = "announcement")]
    Announcement {
        /// Title
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        /// Body
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        /// `info`, `warning`, ...
        #[serde(default, skip_serializing_if = "Option::is_none")]
        severity: Option<String>,
        /// Server timestamp
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<String>,
    },
    /// Someone started typing
    #[serde(rename = "typing.start")]
    TypingStart {
        /// Typing user
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
        /// Conversation
        #[serde(default, skip_serializing_if = "Option::is_none")]
        conversation_id: Option<ConversationId>,
    },
    /// Someone stopped typing
    #[serde(rename = "typing.stop")]
    TypingStop {
        /// Typing user
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
        /// Conversation
        #[serde(default, skip_serializing_if = "Option::is_none")]
        conversation_id: Option<ConversationId>,
    },
    /// A message was read
    #[serde(rename = "read.receipt")]
    ReadReceipt {
        /// Message that was read
        message_id: MessageId,
        /// Conversation
        #[serde(default, skip_serializing_if = "Option::is_none")]
        conversation_id: Option<ConversationId>,
    },
}

/// Discriminant of [`InboundEvent`], used as the subscription routing key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// `connection.established`
    ConnectionEstablished,
    /// `pong`
    Pong,
    /// `ping`
    Ping,
    /// `error`
    Error,
    /// `llm.stream.start`
    StreamStart,
    /// `llm.stream.chunk`
    StreamChunk,
    /// `llm.stream.end`
    StreamEnd,
    /// `llm.stream.error`
    StreamError,
    /// `llm.function_call`
    FunctionCall,
    /// `agent.action`
    AgentAction,
    /// `agent.response`
    AgentResponse,
    /// `task.progress`
    TaskProgress,
    /// `notification`
    Notification,
    /// `announcement`
    Announcement,
    /// `typing.start`
    TypingStart,
    /// `typing.stop`
    TypingStop,
    /// `read.receipt`
    ReadReceipt,
}

impl EventKind {
    /// Every known kind
    pub const ALL: [Self; 17] = [
        Self::ConnectionEstablished,
        Self::Pong,
        Self::Ping,
        Self::Error,
        Self::StreamStart,
        Self::StreamChunk,
        Self::StreamEnd,
        Self::StreamError,
        Self::FunctionCall,
        Self::AgentAction,
        Self::AgentResponse,
        Self::TaskProgress,
        Self::Notification,
        Self::Announcement,
        Self::TypingStart,
        Self::TypingStop,
        Self::ReadReceipt,
    ];

    /// Wire tag for this kind
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConnectionEstablished => "connection.established",
            Self::Pong => "pong",
            Self::Ping => "ping",
            Self::Error => "error",
            Self::StreamStart => "llm.stream.start",
            Self::StreamChunk => "llm.stream.chunk",
            Self::StreamEnd => "llm.stream.end",
            Self::StreamError => "llm.stream.error",
            Self::FunctionCall => "llm.function_call",
            Self::AgentAction => "agent.action",
            Self::AgentResponse => "agent.response",
            Self::TaskProgress => "task.progress",
            Self::Notification => "notification",
            Self::Announcement => "announcement",
            Self::TypingStart => "typing.start",
            Self::TypingStop => "typing.stop",
            Self::ReadReceipt => "read.receipt",
        }
    }

    /// Look up a kind by its wire tag
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == tag)
    }
}

impl InboundEvent {
    /// Routing kind of this event
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::ConnectionEstablished { .. } => EventKind::ConnectionEstablished,
            Self::Pong { .. } => EventKind::Pong,
            Self::Ping { .. } => EventKind::Ping,
            Self::Error { .. } => EventKind::Error,
            Self::StreamStart { .. } => EventKind::StreamStart,
            Self::StreamChunk { .. } => EventKind::StreamChunk,
            Self::StreamEnd { .. } => EventKind::StreamEnd,
            Self::StreamError { .. } => EventKind::StreamError,
            Self::FunctionCall { .. } => EventKind::FunctionCall,
            Self::AgentAction { .. } => EventKind::AgentAction,
            Self::AgentResponse { .. } => EventKind::AgentResponse,
            Self::TaskProgress { .. } => EventKind::TaskProgress,
            Self::Notification { .. } => EventKind::Notification,
            Self::Announcement { .. } => EventKind::Announcement,
            Self::TypingStart { .. } => EventKind::TypingStart,
            Self::TypingStop { .. } => EventKind::TypingStop,
            Self::ReadReceipt { .. } => EventKind::ReadReceipt,
        }
    }
}

// ============================================================================
// Outbound socket messages
// ============================================================================

/// Messages the client sends over the realtime socket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    /// A chat submission
    #[serde(rename = "chat.message")]
    ChatMessage {
        /// User text
        content: String,
        /// Conversation to append to
        #[serde(skip_serializing_if = "Option::is_none")]
        conversation_id: Option<ConversationId>,
        /// Whether the server should stream the reply
        stream: bool,
        /// Model to use
        model: String,
        /// Provider serving the model
        provider: String,
        /// Free-form metadata
        #[serde(skip_serializing_if = "Option::is_none")]
        metadata: Option<serde_json::Value>,
    },
    /// Heartbeat
    #[serde(rename = "ping")]
    Ping,
    /// The user started typing
    #[serde(rename = "typing.start")]
    TypingStart {
        /// Conversation
        #[serde(skip_serializing_if = "Option::is_none")]
        conversation_id: Option<ConversationId>,
    },
    /// The user stopped typing
    #[serde(rename = "typing.stop")]
    TypingStop {
        /// Conversation
        #[serde(skip_serializing_if = "Option::is_none")]
        conversation_id: Option<ConversationId>,
    },
    /// The user read a message
    #[serde(rename = "read.receipt")]
    ReadReceipt {
        /// Message that was read
        message_id: MessageId,
        /// Conversation
        #[serde(skip_serializing_if = "Option::is_none")]
        conversation_id: Option<ConversationId>,
    },
}

// ============================================================================
// Chunked-HTTP chat stream
// ============================================================================

/// Body of the chunked-HTTP chat request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatStreamRequest {
    /// Requesting user
    pub user_id: String,
    /// User text
    pub message: String,
    /// Conversation to append to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,
}

/// One decoded line of the chunked-HTTP chat stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatStreamEvent {
    /// A partial token batch
    Token(String),
    /// The server reported a failure
    Error(String),
    /// `{"type": "complete"}` terminator
    Complete,
    /// `[DONE]` sentinel
    Done,
}

impl ChatStreamEvent {
    /// Whether this event ends the stream
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Token(_))
    }
}
