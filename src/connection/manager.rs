//! Connection manager for the realtime socket

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::dispatch::{Dispatcher, Subscription, Topic};
use crate::error::{LinkError, Result};
use crate::message::encode_outbound;
use crate::transport::{Connector, OutboundFrame, WebSocketConnector};
use crate::types::events::{InboundEvent, OutboundMessage};
use crate::types::options::ConnectionOptions;

use super::driver::run;
use super::state::{ConnectionChange, ConnectionState, ConnectionStatus};

/// Produces the socket URL for each connection attempt
pub type UrlResolver = Arc<dyn Fn() -> Result<String> + Send + Sync>;

struct DriverHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub(super) struct Shared<C: Connector> {
    pub(super) connector: C,
    pub(super) url: UrlResolver,
    pub(super) options: ConnectionOptions,
    pub(super) dispatcher: Dispatcher<InboundEvent>,
    pub(super) lifecycle: Dispatcher<ConnectionChange>,
    pub(super) outbound: Mutex<Option<mpsc::UnboundedSender<OutboundFrame>>>,
    status: Mutex<ConnectionStatus>,
    state_tx: watch::Sender<ConnectionStatus>,
    driver: Mutex<Option<DriverHandle>>,
}

impl<C: Connector> Shared<C> {
    pub(super) fn status(&self) -> ConnectionStatus {
        self.status.lock().clone()
    }

    /// Apply a transition and notify observers if anything changed
    pub(super) fn update(&self, apply: impl FnOnce(&mut ConnectionStatus)) -> bool {
        self.update_if(|_| true, apply)
    }

    /// Apply a transition only when `guard` holds for the current status
    pub(super) fn update_if(
        &self,
        guard: impl FnOnce(&ConnectionStatus) -> bool,
        apply: impl FnOnce(&mut ConnectionStatus),
    ) -> bool {
        match self.transition_if(guard, apply) {
            Transition::Rejected => false,
            Transition::Unchanged => true,
            Transition::Changed(change) => {
                self.announce(&change);
                true
            }
        }
    }

    /// Apply a transition without running lifecycle listeners
    ///
    /// Watchers of the status channel are updated immediately; the returned
    /// change must be passed to [`Self::announce`] once no lock is held.
    fn transition_if(
        &self,
        guard: impl FnOnce(&ConnectionStatus) -> bool,
        apply: impl FnOnce(&mut ConnectionStatus),
    ) -> Transition {
        let mut status = self.status.lock();
        if !guard(&status) {
            return Transition::Rejected;
        }
        let previous = status.clone();
        apply(&mut status);
        if *status == previous {
            return Transition::Unchanged;
        }
        // Published under the lock so watchers see transitions in order.
        self.state_tx.send_replace(status.clone());
        Transition::Changed(ConnectionChange {
            previous,
            status: status.clone(),
        })
    }

    fn announce(&self, change: &ConnectionChange) {
        if change.previous.state != change.status.state {
            log::debug!(
                "Connection state {} -> {}",
                change.previous.state,
                change.status.state
            );
        }
        self.lifecycle.publish(change);
    }
}

enum Transition {
    Rejected,
    Unchanged,
    Changed(ConnectionChange),
}

/// Owns the realtime socket and keeps it alive
///
/// Cheap to share behind an `Arc`. All methods take `&self`.
///
/// # Example
///
/// ```no_run
/// use assistant_link::connection::ConnectionManager;
/// use assistant_link::types::{ConnectionOptions, OutboundMessage};
///
/// # async fn example() {
/// let manager = ConnectionManager::websocket("ws://localhost:8000/ws/chat", ConnectionOptions::default());
/// manager.connect();
/// if !manager.send(&OutboundMessage::Ping) {
///     // not connected yet
/// }
/// manager.disconnect().await;
/// # }
/// ```
pub struct ConnectionManager<C: Connector = WebSocketConnector> {
    shared: Arc<Shared<C>>,
}

impl ConnectionManager<WebSocketConnector> {
    /// Create a manager for a fixed WebSocket URL
    pub fn websocket(url: impl Into<String>, options: ConnectionOptions) -> Self {
        let url = url.into();
        Self::new(
            WebSocketConnector::default(),
            Arc::new(move || Ok(url.clone())),
            options,
        )
    }
}

impl<C: Connector> ConnectionManager<C> {
    /// Create a manager
    ///
    /// `url` is called before every connection attempt, so it can embed
    /// credentials that change between attempts.
    pub fn new(connector: C, url: UrlResolver, options: ConnectionOptions) -> Self {
        let (state_tx, _) = watch::channel(ConnectionStatus::default());
        Self {
            shared: Arc::new(Shared {
                connector,
                url,
                options,
                dispatcher: Dispatcher::new(),
                lifecycle: Dispatcher::new(),
                outbound: Mutex::new(None),
                status: Mutex::new(ConnectionStatus::default()),
                state_tx,
                driver: Mutex::new(None),
            }),
        }
    }

    /// Open the connection
    ///
    /// A no-op unless the state is `Disconnected`. Must be called from within
    /// a tokio runtime.
    pub fn connect(&self) {
        // The driver slot is held across the transition and the spawn so a
        // concurrent disconnect() either sees the new driver or runs first.
        let change = {
            let mut driver = self.shared.driver.lock();
            let change = match self.shared.transition_if(
                |s| s.state == ConnectionState::Disconnected,
                |s| {
                    s.state = ConnectionState::Connecting;
                    s.attempts = 0;
                    s.exhausted = false;
                    s.last_error = None;
                },
            ) {
                Transition::Rejected => {
                    log::debug!("connect() ignored: connection already active");
                    return;
                }
                Transition::Unchanged => None,
                Transition::Changed(change) => Some(change),
            };

            let cancel = CancellationToken::new();
            let task = tokio::spawn(run(Arc::clone(&self.shared), cancel.clone()));
            if let Some(previous) = driver.replace(DriverHandle { cancel, task }) {
                previous.cancel.cancel();
            }
            change
        };
        if let Some(change) = change {
            self.shared.announce(&change);
        }
    }

    /// Tear the connection down
    ///
    /// Cancels a pending reconnection, stops the heartbeat, closes the socket
    /// and waits for all of it to finish before resetting to `Disconnected`.
    pub async fn disconnect(&self) {
        let change = loop {
            let DriverHandle { cancel, task } = match self.take_driver_or_reset() {
                Ok(handle) => handle,
                Err(change) => break change,
            };
            cancel.cancel();
            if let Err(e) = task.await
                && e.is_panic()
            {
                log::error!("Connection driver panicked: {e}");
            }
        };

        if let Transition::Changed(change) = change {
            self.shared.announce(&change);
        }
        log::info!("Disconnected");
    }

    /// Take the running driver, or reset to `Disconnected` if there is none
    ///
    /// The reset happens while holding the driver slot, so no connect() can
    /// start in between.
    fn take_driver_or_reset(&self) -> std::result::Result<DriverHandle, Transition> {
        let mut driver = self.shared.driver.lock();
        if let Some(handle) = driver.take() {
            return Ok(handle);
        }
        self.shared.outbound.lock().take();
        Err(self.shared.transition_if(
            |_| true,
            |s| {
                s.state = ConnectionState::Disconnected;
                s.attempts = 0;
                s.session_id = None;
                s.exhausted = false;
            },
        ))
    }

    /// Send a message
    ///
    /// Returns `false` without queueing when the socket is not connected or
    /// the message could not be encoded.
    pub fn send(&self, message: &OutboundMessage) -> bool {
        if !self.shared.status().is_connected() {
            return false;
        }
        let text = match encode_outbound(message) {
            Ok(text) => text,
            Err(e) => {
                log::warn!("Failed to encode outbound message: {e}");
                return false;
            }
        };
        let outbound = self.shared.outbound.lock();
        outbound
            .as_ref()
            .is_some_and(|tx| tx.send(OutboundFrame::Text(text)).is_ok())
    }

    /// Current status snapshot
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.shared.status()
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.status().state
    }

    /// Watch channel carrying every status change
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.state_tx.subscribe()
    }

    /// Register a synchronous lifecycle listener
    ///
    /// Listeners run on the task that made the transition, in transition
    /// order, and must not block.
    pub fn on_change<F>(&self, listener: F) -> Subscription<ConnectionChange>
    where
        F: Fn(&ConnectionChange) + Send + Sync + 'static,
    {
        self.shared.lifecycle.subscribe(Topic::All, listener)
    }

    /// Dispatcher receiving every decoded inbound event
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher<InboundEvent> {
        &self.shared.dispatcher
    }

    /// Wait until the connection reaches `state`
    ///
    /// # Errors
    /// Returns `LinkError::Timeout` if the state is not reached in time and
    /// `LinkError::Connection` if reconnection was exhausted while waiting
    pub async fn wait_for(&self, state: ConnectionState, timeout: Duration) -> Result<()> {
        let mut rx = self.subscribe_state();
        let gave_up = |s: &ConnectionStatus| s.exhausted && state != ConnectionState::Disconnected;
        let reached = tokio::time::timeout(timeout, rx.wait_for(|s| s.state == state || gave_up(s)))
            .await
            .map_err(|_| {
                LinkError::timeout(format!("Connection did not become {state} within {timeout:?}"))
            })?
            .map_err(|_| LinkError::connection("Connection manager dropped"))?
            .clone();

        if reached.state == state {
            return Ok(());
        }
        Err(LinkError::connection(
            reached
                .last_error
                .unwrap_or_else(|| "Reconnection attempts exhausted".to_string()),
        ))
    }
}

impl<C: Connector> Drop for ConnectionManager<C> {
    fn drop(&mut self) {
        if let Some(handle) = self.shared.driver.lock().take() {
            handle.cancel.cancel();
        }
    }
}
