//! Background task owning one logical connection
//!
//! The driver opens a socket, pumps it until it closes, and decides from the
//! close code whether to reconnect. It is the only writer of the connection
//! status besides `connect()` and `disconnect()`.

use std::sync::Arc;

use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::message::{encode_outbound, parse_inbound};
use crate::transport::{CloseInfo, Connector, OutboundFrame, SocketChannel, SocketEvent};
use crate::types::events::{InboundEvent, OutboundMessage};

use super::manager::Shared;
use super::state::ConnectionState;

pub(super) async fn run<C: Connector>(shared: Arc<Shared<C>>, cancel: CancellationToken) {
    let policy = shared.options.reconnect;

    loop {
        let close = match (shared.url)() {
            Ok(url) => {
                let opened = tokio::select! {
                    () = cancel.cancelled() => return,
                    result = shared.connector.connect(&url) => result,
                };
                match opened {
                    Ok(channel) => match pump(&shared, channel, &cancel).await {
                        Some(close) => close,
                        None => return,
                    },
                    Err(e) => {
                        log::warn!("Failed to open socket: {e}");
                        CloseInfo::abnormal(e.to_string())
                    }
                }
            }
            Err(e) => {
                log::error!("Cannot resolve socket URL: {e}");
                shared.update(|s| {
                    s.state = ConnectionState::Disconnected;
                    s.last_error = Some(e.to_string());
                    s.session_id = None;
                });
                return;
            }
        };

        shared.outbound.lock().take();

        if close.is_normal() {
            log::info!("Socket closed cleanly");
            shared.update(|s| {
                s.state = ConnectionState::Disconnected;
                s.attempts = 0;
                s.session_id = None;
            });
            return;
        }

        if close.is_policy_violation() {
            log::error!("Server rejected credentials: {}", close.reason);
            shared.update(|s| {
                s.state = ConnectionState::Disconnected;
                s.session_id = None;
                s.last_error = Some(format!("Authentication rejected: {}", close.reason));
            });
            return;
        }

        let attempt = shared.status().attempts;
        if attempt >= policy.max_attempts {
            log::error!("Max reconnection attempts reached ({attempt})");
            shared.update(|s| {
                s.state = ConnectionState::Disconnected;
                s.session_id = None;
                s.exhausted = true;
                s.last_error = Some(format!(
                    "Reconnection failed after {attempt} attempts: {}",
                    close.reason
                ));
            });
            return;
        }

        let delay = policy.delay_for(attempt);
        log::info!(
            "Socket closed (code={}), reconnecting in {delay:?} (attempt {}/{})",
            close.code,
            attempt + 1,
            policy.max_attempts
        );
        shared.update(|s| {
            s.state = ConnectionState::Reconnecting;
            s.attempts = attempt + 1;
            s.session_id = None;
            if s.last_error.is_none() && !close.reason.is_empty() {
                s.last_error = Some(close.reason.clone());
            }
        });

        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(delay) => {}
        }

        shared.update(|s| s.state = ConnectionState::Connecting);
    }
}

/// Pump one open socket until it closes
///
/// Returns `None` when cancelled, after asking the socket to close.
async fn pump<C: Connector>(
    shared: &Shared<C>,
    channel: SocketChannel,
    cancel: &CancellationToken,
) -> Option<CloseInfo> {
    let SocketChannel {
        outbound,
        mut inbound,
    } = channel;

    *shared.outbound.lock() = Some(outbound.clone());
    shared.update(|s| {
        s.state = ConnectionState::Connected;
        s.attempts = 0;
        s.exhausted = false;
        s.last_error = None;
    });
    log::info!("Socket connected");

    let mut heartbeat = heartbeat_timer(shared.options.heartbeat_interval);

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = outbound.send(OutboundFrame::Close);
                return None;
            }
            () = next_heartbeat(&mut heartbeat) => {
                match encode_outbound(&OutboundMessage::Ping) {
                    Ok(ping) => {
                        if outbound.send(OutboundFrame::Text(ping)).is_err() {
                            log::debug!("Heartbeat not sent: socket writer gone");
                        }
                    }
                    Err(e) => log::warn!("Failed to encode heartbeat: {e}"),
                }
            }
            event = inbound.recv() => match event {
                Some(SocketEvent::Text(text)) => handle_text(shared, &text),
                Some(SocketEvent::Error(error)) => {
                    log::warn!("Socket error: {error}");
                    shared.update(|s| s.last_error = Some(error));
                }
                Some(SocketEvent::Closed(close)) => return Some(close),
                None => return Some(CloseInfo::abnormal("socket channel dropped")),
            },
        }
    }
}

/// Heartbeat timer, or `None` when a zero period disables heartbeats
fn heartbeat_timer(period: std::time::Duration) -> Option<Interval> {
    if period.is_zero() {
        log::debug!("Heartbeat disabled");
        return None;
    }
    let mut timer = tokio::time::interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(timer)
}

async fn next_heartbeat(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn handle_text<C: Connector>(shared: &Shared<C>, text: &str) {
    let event = match parse_inbound(text) {
        Ok(event) => event,
        Err(e) => {
            log::warn!("Dropping inbound frame: {e}");
            return;
        }
    };

    match &event {
        InboundEvent::ConnectionEstablished { connection_id, .. } => {
            log::info!("Connection established: {}", connection_id.as_str());
            let id = connection_id.clone();
            shared.update(|s| s.session_id = Some(id));
        }
        InboundEvent::Error { error } => {
            log::warn!("Server error: {error}");
            let error = error.clone();
            shared.update(|s| s.last_error = Some(error));
        }
        InboundEvent::Ping { .. } => log::trace!("Server keep-alive"),
        _ => {}
    }

    shared.dispatcher.publish(&event);
}
