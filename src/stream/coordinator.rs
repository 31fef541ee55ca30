//! Stream session coordinator
//!
//! Turns `start`/`chunk`/`end`/`error` events into one progressively updated
//! assistant [`ChatMessage`]. At most one stream is active at a time; events
//! that carry a different stream ID than the active one are discarded.
//!
//! ```text
//!            start            end / error
//!   Idle ─────────────▶ Streaming ─────────────▶ Idle
//!                        │    ▲
//!                        └────┘ chunk (matching id)
//! ```
//!
//! Callbacks run after the internal lock is released, so they may call back
//! into the coordinator.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::types::events::InboundEvent;
use crate::types::identifiers::{MessageId, StreamId};
use crate::types::messages::{ChatMessage, MessageMetadata};

// ============================================================================
// Events and state
// ============================================================================

/// Transport-neutral stream event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A response started
    Start {
        /// Stream correlator
        stream_id: StreamId,
        /// Model producing the response
        model: Option<String>,
        /// Provider serving the model
        provider: Option<String>,
    },
    /// Text to append to the active response
    Chunk {
        /// Stream correlator
        stream_id: StreamId,
        /// Text to append
        content: String,
    },
    /// The response finished
    End {
        /// Stream correlator
        stream_id: StreamId,
    },
    /// The response failed
    Error {
        /// Stream correlator; `None` applies to whatever stream is active
        stream_id: Option<StreamId>,
        /// Error description
        error: String,
    },
}

impl StreamEvent {
    /// Extract the stream event carried by an inbound socket event, if any
    #[must_use]
    pub fn from_inbound(event: &InboundEvent) -> Option<Self> {
        match event {
            InboundEvent::StreamStart {
                stream_id,
                model,
                provider,
                ..
            } => Some(Self::Start {
                stream_id: stream_id.clone(),
                model: model.clone(),
                provider: provider.clone(),
            }),
            InboundEvent::StreamChunk {
                stream_id, content, ..
            } => Some(Self::Chunk {
                stream_id: stream_id.clone(),
                content: content.clone(),
            }),
            InboundEvent::StreamEnd { stream_id, .. } => Some(Self::End {
                stream_id: stream_id.clone(),
            }),
            InboundEvent::StreamError { stream_id, error } => Some(Self::Error {
                stream_id: stream_id.clone(),
                error: error.clone(),
            }),
            _ => None,
        }
    }
}

/// Coordinator phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamPhase {
    /// No response in flight
    #[default]
    Idle,
    /// A response is streaming
    Streaming,
}

/// The response currently streaming
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSession {
    /// Stream correlator
    pub stream_id: StreamId,
    /// Text received so far
    pub text: String,
    /// Message being filled
    pub message_id: MessageId,
    /// Model producing the response
    pub model: Option<String>,
    /// Provider serving the model
    pub provider: Option<String>,
}

/// What applying an event did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// A new response started
    Started,
    /// Text was appended to the active response
    Appended,
    /// The active response finished
    Completed,
    /// A response failed
    Failed,
    /// The event did not apply to the current state and was ignored
    Discarded,
}

/// Details passed to the error callback
#[derive(Debug, Clone, PartialEq)]
pub struct StreamFailure {
    /// Stream that failed, if known
    pub stream_id: Option<StreamId>,
    /// The partial message, finalized with the error annotation
    pub message: Option<ChatMessage>,
    /// Error description
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

type StartHandler = Arc<dyn Fn(&ChatMessage) + Send + Sync>;
type UpdateHandler = Arc<dyn Fn(&ChatMessage, &str) + Send + Sync>;
type CompleteHandler = Arc<dyn Fn(&ChatMessage) + Send + Sync>;
type ErrorHandler = Arc<dyn Fn(&StreamFailure) + Send + Sync>;

/// Callbacks fired by the coordinator
#[derive(Clone, Default)]
pub struct StreamHandlers {
    on_start: Option<StartHandler>,
    on_update: Option<UpdateHandler>,
    on_complete: Option<CompleteHandler>,
    on_error: Option<ErrorHandler>,
}

impl StreamHandlers {
    /// Create an empty handler set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with the empty assistant message when a response starts
    #[must_use]
    pub fn on_start<F>(mut self, f: F) -> Self
    where
        F: Fn(&ChatMessage) + Send + Sync + 'static,
    {
        self.on_start = Some(Arc::new(f));
        self
    }

    /// Called with the updated message and the appended text for every chunk
    #[must_use]
    pub fn on_update<F>(mut self, f: F) -> Self
    where
        F: Fn(&ChatMessage, &str) + Send + Sync + 'static,
    {
        self.on_update = Some(Arc::new(f));
        self
    }

    /// Called with the finalized message when a response ends
    #[must_use]
    pub fn on_complete<F>(mut self, f: F) -> Self
    where
        F: Fn(&ChatMessage) + Send + Sync + 'static,
    {
        self.on_complete = Some(Arc::new(f));
        self
    }

    /// Called when a response fails or a message could not be sent
    #[must_use]
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&StreamFailure) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }
}

impl std::fmt::Debug for StreamHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandlers")
            .field("on_start", &self.on_start.is_some())
            .field("on_update", &self.on_update.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

enum Notice {
    Started(ChatMessage),
    Updated(ChatMessage, String),
    Completed(ChatMessage),
    Failed(StreamFailure),
}

// ============================================================================
// Coordinator
// ============================================================================

struct ActiveStream {
    session: StreamSession,
    index: usize,
}

#[derive(Default)]
struct History {
    messages: Vec<ChatMessage>,
    active: Option<ActiveStream>,
}

/// State machine assembling streamed responses into chat history
///
/// Clones share the same history.
#[derive(Clone)]
pub struct StreamCoordinator {
    history: Arc<Mutex<History>>,
    handlers: Arc<StreamHandlers>,
}

impl StreamCoordinator {
    /// Create a coordinator with an empty history
    #[must_use]
    pub fn new(handlers: StreamHandlers) -> Self {
        Self {
            history: Arc::new(Mutex::new(History::default())),
            handlers: Arc::new(handlers),
        }
    }

    /// Apply one stream event
    pub fn apply(&self, event: StreamEvent) -> StreamOutcome {
        let (outcome, notice) = {
            let mut history = self.history.lock();
            Self::transition(&mut history, event)
        };
        if let Some(notice) = notice {
            self.notify(notice);
        }
        outcome
    }

    /// Apply the stream event carried by an inbound socket event
    ///
    /// Returns `None` for events that are not stream events.
    pub fn apply_inbound(&self, event: &InboundEvent) -> Option<StreamOutcome> {
        StreamEvent::from_inbound(event).map(|e| self.apply(e))
    }

    fn transition(history: &mut History, event: StreamEvent) -> (StreamOutcome, Option<Notice>) {
        match event {
            StreamEvent::Start {
                stream_id,
                model,
                provider,
            } => {
                if let Some(active) = &history.active {
                    log::warn!(
                        "Ignoring start of stream {stream_id} while {} is active",
                        active.session.stream_id
                    );
                    return (StreamOutcome::Discarded, None);
                }
                let message = ChatMessage::streaming_assistant(MessageMetadata {
                    model: model.clone(),
                    provider: provider.clone(),
                    stream_id: Some(stream_id.clone()),
                    error: None,
                });
                history.active = Some(ActiveStream {
                    session: StreamSession {
                        stream_id,
                        text: String::new(),
                        message_id: message.id.clone(),
                        model,
                        provider,
                    },
                    index: history.messages.len(),
                });
                history.messages.push(message.clone());
                (StreamOutcome::Started, Some(Notice::Started(message)))
            }

            StreamEvent::Chunk { stream_id, content } => {
                let Some(active) = history.active.as_mut() else {
                    log::debug!("Discarding chunk for {stream_id}: no active stream");
                    return (StreamOutcome::Discarded, None);
                };
                if active.session.stream_id != stream_id {
                    log::debug!(
                        "Discarding chunk for {stream_id}: active stream is {}",
                        active.session.stream_id
                    );
                    return (StreamOutcome::Discarded, None);
                }
                active.session.text.push_str(&content);
                let message = &mut history.messages[active.index];
                message.content.push_str(&content);
                (
                    StreamOutcome::Appended,
                    Some(Notice::Updated(message.clone(), content)),
                )
            }

            StreamEvent::End { stream_id } => {
                let matches = history
                    .active
                    .as_ref()
                    .is_some_and(|a| a.session.stream_id == stream_id);
                if !matches {
                    log::debug!("Discarding end of {stream_id}: not the active stream");
                    return (StreamOutcome::Discarded, None);
                }
                let Some(active) = history.active.take() else {
                    return (StreamOutcome::Discarded, None);
                };
                let message = &mut history.messages[active.index];
                message.is_streaming = false;
                (
                    StreamOutcome::Completed,
                    Some(Notice::Completed(message.clone())),
                )
            }

            StreamEvent::Error { stream_id, error } => {
                let applies = match (&history.active, &stream_id) {
                    (Some(active), Some(id)) => active.session.stream_id == *id,
                    (Some(_), None) | (None, _) => true,
                };
                if !applies {
                    log::debug!("Discarding error for a stream that is not active: {error}");
                    return (StreamOutcome::Discarded, None);
                }

                let Some(active) = history.active.take() else {
                    log::warn!("Stream error with no active stream: {error}");
                    return (
                        StreamOutcome::Failed,
                        Some(Notice::Failed(StreamFailure {
                            stream_id,
                            message: None,
                            error,
                        })),
                    );
                };

                let message = &mut history.messages[active.index];
                message.is_streaming = false;
                message
                    .metadata
                    .get_or_insert_with(MessageMetadata::default)
                    .error = Some(error.clone());
                (
                    StreamOutcome::Failed,
                    Some(Notice::Failed(StreamFailure {
                        stream_id: Some(active.session.stream_id),
                        message: Some(message.clone()),
                        error,
                    })),
                )
            }
        }
    }

    fn notify(&self, notice: Notice) {
        match notice {
            Notice::Started(message) => {
                if let Some(f) = &self.handlers.on_start {
                    f(&message);
                }
            }
            Notice::Updated(message, delta) => {
                if let Some(f) = &self.handlers.on_update {
                    f(&message, &delta);
                }
            }
            Notice::Completed(message) => {
                if let Some(f) = &self.handlers.on_complete {
                    f(&message);
                }
            }
            Notice::Failed(failure) => {
                if let Some(f) = &self.handlers.on_error {
                    f(&failure);
                }
            }
        }
    }

    /// Append a finalized user message to the history
    pub fn push_user_message(&self, content: impl Into<String>) -> ChatMessage {
        let message = ChatMessage::user(content);
        self.history.lock().messages.push(message.clone());
        message
    }

    /// Fail the active stream with a synthetic error
    ///
    /// Returns `false` if nothing was streaming.
    pub fn abort(&self, reason: impl Into<String>) -> bool {
        let Some(stream_id) = self.active_stream().map(|s| s.stream_id) else {
            return false;
        };
        self.apply(StreamEvent::Error {
            stream_id: Some(stream_id),
            error: reason.into(),
        }) == StreamOutcome::Failed
    }

    /// Report a failure that is not tied to a stream, such as a rejected send
    pub fn report_failure(&self, error: impl Into<String>) {
        self.notify(Notice::Failed(StreamFailure {
            stream_id: None,
            message: None,
            error: error.into(),
        }));
    }

    /// Snapshot of the chat history
    #[must_use]
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.history.lock().messages.clone()
    }

    /// Most recent message
    #[must_use]
    pub fn last_message(&self) -> Option<ChatMessage> {
        self.history.lock().messages.last().cloned()
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> StreamPhase {
        if self.history.lock().active.is_some() {
            StreamPhase::Streaming
        } else {
            StreamPhase::Idle
        }
    }

    /// Whether a response is streaming
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.phase() == StreamPhase::Streaming
    }

    /// The active stream, if any
    #[must_use]
    pub fn active_stream(&self) -> Option<StreamSession> {
        self.history
            .lock()
            .active
            .as_ref()
            .map(|a| a.session.clone())
    }

    /// Drop the history and any active stream without firing callbacks
    pub fn reset(&self) {
        let mut history = self.history.lock();
        history.messages.clear();
        history.active = None;
    }
}

impl std::fmt::Debug for StreamCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let history = self.history.lock();
        f.debug_struct("StreamCoordinator")
            .field("messages", &history.messages.len())
            .field(
                "active",
                &history.active.as_ref().map(|a| &a.session.stream_id),
            )
            .finish()
    }
}
