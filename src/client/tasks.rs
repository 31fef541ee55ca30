//! Background tasks for `AssistantClient`

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::auth::{AuthStatus, RequestPipeline, SessionManager};
use crate::connection::ConnectionManager;

impl super::AssistantClient {
    /// Tear the socket down when the session ends
    pub(super) async fn auth_watch_task(
        session: Arc<SessionManager>,
        connection: Arc<ConnectionManager>,
        cancel: CancellationToken,
    ) {
        let mut status = session.subscribe();
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                changed = status.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let current = status.borrow_and_update().clone();
                    match current {
                        AuthStatus::Invalidated(reason) => {
                            log::warn!("Session invalidated ({reason}); closing socket");
                            connection.disconnect().await;
                        }
                        AuthStatus::SignedOut => connection.disconnect().await,
                        AuthStatus::SignedIn => {}
                    }
                }
            }
        }
    }

    /// Re-verify the session at a fixed interval
    pub(super) async fn session_check_task(
        pipeline: Arc<RequestPipeline>,
        me_path: String,
        interval: Duration,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if !pipeline.session().is_authenticated() {
                        continue;
                    }
                    match pipeline.verify_session(&me_path).await {
                        Ok(user) => log::debug!("Session verified for {}", user.email),
                        Err(e) if e.is_auth_failure() => {
                            log::warn!("Session check failed: {e}");
                        }
                        Err(e) => log::debug!("Session check skipped: {e}"),
                    }
                }
            }
        }
    }
}
