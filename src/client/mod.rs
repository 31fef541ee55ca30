//! `AssistantClient`, the façade wiring every layer together
//!
//! The client owns one [`SessionManager`], one [`RequestPipeline`] sharing it,
//! and one [`ConnectionManager`] whose socket URL carries the current access
//! token. Chat views are created from it for either transport.
//!
//! ```text
//!                 ┌──────────────────────┐
//!                 │    SessionManager    │  token pair, single-flight renewal
//!                 └──────────┬───────────┘
//!             ┌──────────────┴──────────────┐
//!   ┌─────────▼─────────┐         ┌─────────▼─────────┐
//!   │  RequestPipeline  │         │ ConnectionManager │  ?token=... per attempt
//!   └─────────┬─────────┘         └─────────┬─────────┘
//!   ┌─────────▼─────────┐         ┌─────────▼─────────┐
//!   │     HttpChat      │         │    SocketChat     │
//!   └───────────────────┘         └───────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use assistant_link::{AssistantClient, ClientOptions};
//! use assistant_link::stream::{SendOptions, StreamHandlers};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = AssistantClient::new(ClientOptions::default())?;
//! if !client.restore_session().await? {
//!     client.login("ada@example.com", "correct horse battery staple").await?;
//! }
//!
//! client.connect();
//! let chat = client.socket_chat(StreamHandlers::new().on_update(|_, delta| print!("{delta}")));
//! chat.send_message("Hello", SendOptions::default());
//! # Ok(())
//! # }
//! ```

mod client_impl;
mod tasks;

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::auth::{RequestPipeline, SessionManager};
use crate::connection::ConnectionManager;
use crate::types::options::ClientOptions;

/// Client for the assistant backend
pub struct AssistantClient {
    /// Configuration
    options: ClientOptions,
    /// Credential owner shared by every transport
    session: Arc<SessionManager>,
    /// Authenticated HTTP requests
    pipeline: Arc<RequestPipeline>,
    /// Realtime socket
    connection: Arc<ConnectionManager>,
    /// Background session tasks
    monitor: Mutex<Option<(CancellationToken, Vec<JoinHandle<()>>)>>,
}
