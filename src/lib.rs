//! # Assistant Link
//!
//! Realtime client plumbing for an AI assistant backend: a self-healing
//! socket connection, typed event dispatch, streamed chat responses over a
//! socket or chunked HTTP, and an authenticated request pipeline that renews
//! expired credentials once for all concurrent callers.
//!
//! ## Quick Start
//!
//! ```no_run
//! use assistant_link::{AssistantClient, ClientOptions};
//! use assistant_link::connection::ConnectionState;
//! use assistant_link::stream::{SendOptions, StreamHandlers};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = ClientOptions::builder()
//!         .api_base_url("https://assistant.example.com/api")
//!         .ws_url("wss://assistant.example.com/ws/chat")
//!         .credentials_path("/tmp/assistant-credentials.json")
//!         .build();
//!
//!     let client = AssistantClient::new(options)?;
//!     if !client.restore_session().await? {
//!         client.login("ada@example.com", "correct horse battery staple").await?;
//!     }
//!
//!     client.connect();
//!     client
//!         .connection()
//!         .wait_for(ConnectionState::Connected, Duration::from_secs(10))
//!         .await?;
//!
//!     let chat = client.socket_chat(
//!         StreamHandlers::new()
//!             .on_update(|_, delta| print!("{delta}"))
//!             .on_complete(|message| println!("\n[{} chars]", message.content.len())),
//!     );
//!     chat.send_message("Hello!", SendOptions::default());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`types`]: Wire events, chat records, identifiers, and options
//! - [`message`]: Frame parsing and encoding
//! - [`transport`]: WebSocket connector and chunked-HTTP transport
//! - [`dispatch`]: Type-routed listener registry with wildcard support
//! - [`connection`]: Connection manager with heartbeat and reconnection
//! - [`stream`]: Stream session coordinator and the two chat bindings
//! - [`auth`]: Session manager, credential storage, request pipeline
//! - [`client`]: The `AssistantClient` façade
//! - [`error`]: Error types and handling
//!
//! ## Error Handling
//!
//! All fallible operations return [`Result<T, LinkError>`](Result). Transport
//! and protocol problems never panic: `send()` reports delivery as a `bool`,
//! malformed frames are logged and dropped, and stream failures reach the
//! chat's error handler.
//!
//! ```no_run
//! # use assistant_link::{AssistantClient, ClientOptions, LinkError};
//! # async fn example(client: AssistantClient) {
//! match client.login("ada@example.com", "wrong").await {
//!     Ok(_) => {}
//!     Err(LinkError::Status { status: 401, .. }) => log::warn!("Bad credentials"),
//!     Err(e) => log::error!("Login failed: {e}"),
//! }
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod auth;
pub mod client;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod message;
pub mod stream;
pub mod transport;
pub mod types;

// Re-export commonly used types for external API
pub use auth::{AuthStatus, Credentials, RequestPipeline, SessionManager};
pub use client::AssistantClient;
pub use connection::{ConnectionManager, ConnectionState, ConnectionStatus};
pub use dispatch::{Dispatcher, Subscription, Topic};
pub use error::{LinkError, Result};
pub use message::{encode_outbound, parse_inbound};
pub use stream::{HttpChat, SocketChat, StreamCoordinator, StreamHandlers};
pub use transport::{Connector, WebSocketConnector};
pub use types::{ClientOptions, InboundEvent, OutboundMessage};

/// Version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
