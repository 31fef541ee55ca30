//! Chat over the chunked-HTTP transport

use std::time::Duration;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{LinkError, Result};
use crate::transport::HttpStreamTransport;
use crate::types::events::{ChatStreamEvent, ChatStreamRequest};
use crate::types::identifiers::{ConversationId, StreamId};

use super::coordinator::{StreamCoordinator, StreamEvent, StreamHandlers, StreamOutcome};

/// Reason attached to a stream the caller cancelled
pub const CANCELLED: &str = "cancelled";

/// Handle to one in-flight HTTP chat response
#[derive(Debug)]
pub struct StreamTask {
    stream_id: StreamId,
    cancel: CancellationToken,
    task: JoinHandle<StreamOutcome>,
}

impl StreamTask {
    /// Synthetic ID of the stream
    #[must_use]
    pub const fn stream_id(&self) -> &StreamId {
        &self.stream_id
    }

    /// Abandon the response
    ///
    /// The response body is dropped and the coordinator receives a synthetic
    /// error for this stream.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the response has been fully handled
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the response to finish
    ///
    /// Returns `Completed` or `Failed`.
    pub async fn wait(self) -> StreamOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("Chat stream task failed: {e}");
                StreamOutcome::Failed
            }
        }
    }
}

/// A chat view speaking the chunked-HTTP protocol
#[derive(Debug, Clone)]
pub struct HttpChat {
    transport: HttpStreamTransport,
    coordinator: StreamCoordinator,
    user_id: String,
    idle_timeout: Duration,
}

impl HttpChat {
    /// Create a chat view
    ///
    /// `idle_timeout` bounds the silence between two decoded events.
    pub fn new(
        transport: HttpStreamTransport,
        user_id: impl Into<String>,
        idle_timeout: Duration,
        handlers: StreamHandlers,
    ) -> Self {
        Self {
            transport,
            coordinator: StreamCoordinator::new(handlers),
            user_id: user_id.into(),
            idle_timeout,
        }
    }

    /// Send a chat message and stream the reply into the history
    ///
    /// The user message is appended first and stays in the history whatever
    /// happens next. Must be called from within a tokio runtime.
    ///
    /// # Errors
    /// Returns `LinkError::StreamBusy` if a reply is already streaming
    pub fn send_message(
        &self,
        content: impl Into<String>,
        conversation_id: Option<ConversationId>,
    ) -> Result<StreamTask> {
        let content = content.into();
        self.coordinator.push_user_message(content.clone());

        let stream_id = StreamId::local();
        let started = self.coordinator.apply(StreamEvent::Start {
            stream_id: stream_id.clone(),
            model: None,
            provider: None,
        });
        if started != StreamOutcome::Started {
            self.coordinator
                .report_failure(LinkError::StreamBusy.to_string());
            return Err(LinkError::StreamBusy);
        }

        let request = ChatStreamRequest {
            user_id: self.user_id.clone(),
            message: content,
            conversation_id,
        };
        let cancel = CancellationToken::new();
        let task = tokio::spawn(drive(
            self.transport.clone(),
            self.coordinator.clone(),
            request,
            stream_id.clone(),
            self.idle_timeout,
            cancel.clone(),
        ));

        Ok(StreamTask {
            stream_id,
            cancel,
            task,
        })
    }

    /// The coordinator driving this view
    #[must_use]
    pub const fn coordinator(&self) -> &StreamCoordinator {
        &self.coordinator
    }
}

async fn drive(
    transport: HttpStreamTransport,
    coordinator: StreamCoordinator,
    request: ChatStreamRequest,
    stream_id: StreamId,
    idle_timeout: Duration,
    cancel: CancellationToken,
) -> StreamOutcome {
    let fail = |error: String| {
        coordinator.apply(StreamEvent::Error {
            stream_id: Some(stream_id.clone()),
            error,
        })
    };

    let opened = tokio::select! {
        () = cancel.cancelled() => return fail(CANCELLED.to_string()),
        opened = transport.open(&request) => opened,
    };
    let mut events = match opened {
        Ok(events) => events,
        Err(e) => {
            log::warn!("Chat stream request failed: {e}");
            return fail(e.to_string());
        }
    };

    loop {
        let next = tokio::select! {
            () = cancel.cancelled() => {
                // Returning drops the body, which closes the response.
                log::info!("Chat stream {stream_id} cancelled");
                return fail(CANCELLED.to_string());
            }
            next = tokio::time::timeout(idle_timeout, events.next()) => next,
        };

        let event = match next {
            Err(_) => {
                return fail(LinkError::timeout(format!("no data for {idle_timeout:?}")).to_string());
            }
            Ok(None) => {
                return fail(LinkError::stream_aborted("closed before completion").to_string());
            }
            Ok(Some(Err(e))) => {
                log::warn!("Chat stream {stream_id} aborted: {e}");
                return fail(LinkError::stream_aborted(e.to_string()).to_string());
            }
            Ok(Some(Ok(event))) => event,
        };

        match event {
            ChatStreamEvent::Token(content) => {
                coordinator.apply(StreamEvent::Chunk {
                    stream_id: stream_id.clone(),
                    content,
                });
            }
            ChatStreamEvent::Error(error) => return fail(error),
            ChatStreamEvent::Complete | ChatStreamEvent::Done => {
                return coordinator.apply(StreamEvent::End {
                    stream_id: stream_id.clone(),
                });
            }
        }
    }
}
