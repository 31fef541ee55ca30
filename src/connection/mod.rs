//! Realtime connection management
//!
//! [`ConnectionManager`] keeps one logical connection alive across socket
//! drops: it sends heartbeats while connected, reconnects after unclean
//! closes according to a [`ReconnectPolicy`](crate::types::ReconnectPolicy),
//! and hands every decoded inbound event to its [`Dispatcher`](crate::dispatch::Dispatcher).
//!
//! Close handling:
//!
//! | Close                       | Next state     | Reconnect |
//! |-----------------------------|----------------|-----------|
//! | `1000` normal               | `Disconnected` | no        |
//! | `1008` credentials rejected | `Disconnected` | no        |
//! | anything else, budget left  | `Reconnecting` | yes       |
//! | anything else, exhausted    | `Disconnected` | no        |

mod driver;
mod manager;
mod state;

pub use manager::{ConnectionManager, UrlResolver};
pub use state::{ConnectionChange, ConnectionState, ConnectionStatus};
