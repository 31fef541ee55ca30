//! Chat over the realtime socket

use std::sync::Arc;

use crate::connection::{ConnectionChange, ConnectionManager};
use crate::dispatch::{Subscription, Topic};
use crate::transport::{Connector, WebSocketConnector};
use crate::types::events::{EventKind, InboundEvent, OutboundMessage};
use crate::types::identifiers::{ConversationId, MessageId};
use crate::types::messages::ChatMessage;

use super::coordinator::{StreamCoordinator, StreamHandlers};

/// Default model requested for chat messages
pub const DEFAULT_MODEL: &str = "gpt-4-turbo-preview";

/// Default provider requested for chat messages
pub const DEFAULT_PROVIDER: &str = "openai";

/// Reason attached to a stream that was cut off by a socket drop
pub const CONNECTION_LOST: &str = "connection lost";

/// Per-message send options
#[derive(Debug, Clone, PartialEq)]
pub struct SendOptions {
    /// Conversation to append to
    pub conversation_id: Option<ConversationId>,
    /// Ask the server to stream the reply
    pub stream: bool,
    /// Model to use
    pub model: String,
    /// Provider serving the model
    pub provider: String,
    /// Free-form metadata forwarded to the server
    pub metadata: Option<serde_json::Value>,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            conversation_id: None,
            stream: true,
            model: DEFAULT_MODEL.to_string(),
            provider: DEFAULT_PROVIDER.to_string(),
            metadata: None,
        }
    }
}

impl SendOptions {
    /// Send into a specific conversation
    #[must_use]
    pub fn conversation(mut self, id: impl Into<ConversationId>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }

    /// Request a specific model
    #[must_use]
    pub fn model(mut self, provider: impl Into<String>, model: impl Into<String>) -> Self {
        self.provider = provider.into();
        self.model = model.into();
        self
    }
}

/// A chat view bound to a connection manager
///
/// Stream events arriving on the socket drive the coordinator. When the socket
/// leaves `Connected`, any active stream is aborted, so chunks that arrive
/// after a reconnect for the old stream are discarded.
pub struct SocketChat<C: Connector = WebSocketConnector> {
    connection: Arc<ConnectionManager<C>>,
    coordinator: StreamCoordinator,
    subscriptions: Vec<Subscription<InboundEvent>>,
    lifecycle: Subscription<ConnectionChange>,
}

impl<C: Connector> SocketChat<C> {
    /// Bind a new chat view to `connection`
    pub fn attach(connection: Arc<ConnectionManager<C>>, handlers: StreamHandlers) -> Self {
        let coordinator = StreamCoordinator::new(handlers);

        let subscriptions = [
            EventKind::StreamStart,
            EventKind::StreamChunk,
            EventKind::StreamEnd,
            EventKind::StreamError,
        ]
        .into_iter()
        .map(|kind| {
            let coordinator = coordinator.clone();
            connection
                .dispatcher()
                .subscribe(Topic::Kind(kind), move |event| {
                    coordinator.apply_inbound(event);
                })
        })
        .collect();

        let lifecycle = {
            let coordinator = coordinator.clone();
            connection.on_change(move |change| {
                if change.left_connected() && coordinator.abort(CONNECTION_LOST) {
                    log::info!("Active stream aborted: socket is {}", change.status.state);
                }
            })
        };

        Self {
            connection,
            coordinator,
            subscriptions,
            lifecycle,
        }
    }

    /// Send a chat message
    ///
    /// The user message is appended to history before delivery is attempted
    /// and stays there if delivery fails. Returns whether the socket accepted
    /// the message; on failure the error handler is called.
    pub fn send_message(&self, content: impl Into<String>, options: SendOptions) -> bool {
        let content = content.into();
        self.coordinator.push_user_message(content.clone());

        let sent = self.connection.send(&OutboundMessage::ChatMessage {
            content,
            conversation_id: options.conversation_id,
            stream: options.stream,
            model: options.model,
            provider: options.provider,
            metadata: options.metadata,
        });
        if !sent {
            log::warn!("Chat message not sent: socket is {}", self.connection.state());
            self.coordinator
                .report_failure(format!("Not connected ({})", self.connection.state()));
        }
        sent
    }

    /// Tell the server the user started or stopped typing
    pub fn send_typing(&self, typing: bool, conversation_id: Option<ConversationId>) -> bool {
        let message = if typing {
            OutboundMessage::TypingStart { conversation_id }
        } else {
            OutboundMessage::TypingStop { conversation_id }
        };
        self.connection.send(&message)
    }

    /// Tell the server the user read a message
    pub fn send_read_receipt(
        &self,
        message_id: MessageId,
        conversation_id: Option<ConversationId>,
    ) -> bool {
        self.connection.send(&OutboundMessage::ReadReceipt {
            message_id,
            conversation_id,
        })
    }

    /// Abandon the active stream
    pub fn abort(&self, reason: impl Into<String>) -> bool {
        self.coordinator.abort(reason)
    }

    /// The coordinator driving this view
    #[must_use]
    pub const fn coordinator(&self) -> &StreamCoordinator {
        &self.coordinator
    }

    /// Snapshot of the chat history
    #[must_use]
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.coordinator.messages()
    }

    /// The connection this view is bound to
    #[must_use]
    pub const fn connection(&self) -> &Arc<ConnectionManager<C>> {
        &self.connection
    }

    /// Remove this view's listeners from the connection
    pub fn detach(self) {
        drop(self);
    }
}

impl<C: Connector> Drop for SocketChat<C> {
    fn drop(&mut self) {
        for subscription in &self.subscriptions {
            subscription.unsubscribe();
        }
        self.lifecycle.unsubscribe();
    }
}
