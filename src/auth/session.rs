//! Session manager owning the credential state
//!
//! All token mutations go through one [`SessionManager`]. Renewal is
//! single-flight: the first caller that needs a new access token performs the
//! refresh call, every caller arriving while it runs waits for its result.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use crate::error::{LinkError, Result};
use crate::types::options::AuthEndpoints;

use super::credentials::{
    Credentials, LoginRequest, RefreshRequest, RegisterRequest, TokenResponse, UserProfile,
};
use super::endpoint_url;
use super::storage::CredentialStore;

/// Outcome delivered to callers waiting on a refresh
type Waiter = oneshot::Sender<std::result::Result<String, String>>;

/// Authentication status, for redirecting the UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStatus {
    /// No credentials
    SignedOut,
    /// Credentials are present
    SignedIn,
    /// Credentials were dropped because they could not be renewed
    Invalidated(String),
}

#[derive(Default)]
struct CredentialState {
    access_token: Option<String>,
    refresh_token: Option<String>,
    user: Option<UserProfile>,
    refreshing: bool,
    waiters: Vec<Waiter>,
    // Bumped whenever the credentials are replaced or cleared
    generation: u64,
}

impl CredentialState {
    fn snapshot(&self) -> Option<Credentials> {
        self.access_token.as_ref().map(|access_token| Credentials {
            access_token: access_token.clone(),
            refresh_token: self.refresh_token.clone(),
            user: self.user.clone(),
        })
    }
}

enum RenewStep {
    Current(String),
    Wait(oneshot::Receiver<std::result::Result<String, String>>),
    Refresh { refresh_token: String, generation: u64 },
    NoRefreshToken,
}

/// Owner of the access/refresh token pair
pub struct SessionManager {
    client: reqwest::Client,
    base_url: String,
    endpoints: AuthEndpoints,
    timeout: Option<Duration>,
    store: Arc<dyn CredentialStore>,
    state: Mutex<CredentialState>,
    status: watch::Sender<AuthStatus>,
}

impl SessionManager {
    /// Create a signed-out session manager
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        endpoints: AuthEndpoints,
        timeout: Option<Duration>,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        let (status, _) = watch::channel(AuthStatus::SignedOut);
        Self {
            client,
            base_url: base_url.into(),
            endpoints,
            timeout,
            store,
            state: Mutex::new(CredentialState::default()),
            status,
        }
    }

    /// Rehydrate credentials from the store
    ///
    /// Returns whether credentials were found.
    pub fn load_from_store(&self) -> bool {
        let Some(credentials) = self.store.load() else {
            return false;
        };
        log::debug!("Loaded stored credentials");
        self.install(credentials, false);
        true
    }

    /// Replace the credentials and persist them
    pub fn set_credentials(&self, credentials: Credentials) {
        self.install(credentials, true);
    }

    fn install(&self, credentials: Credentials, persist: bool) {
        let waiters = {
            let mut state = self.state.lock();
            state.access_token = Some(credentials.access_token.clone());
            state.refresh_token = credentials.refresh_token.clone();
            state.user = credentials.user.clone();
            state.generation += 1;
            state.refreshing = false;
            std::mem::take(&mut state.waiters)
        };
        // Requests parked on a refresh can use the new token right away
        for waiter in waiters {
            let _ = waiter.send(Ok(credentials.access_token.clone()));
        }
        if persist && let Err(e) = self.store.save(&credentials) {
            log::warn!("Failed to persist credentials: {e}");
        }
        self.status.send_replace(AuthStatus::SignedIn);
    }

    /// Current access token
    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.state.lock().access_token.clone()
    }

    /// Current credentials
    #[must_use]
    pub fn credentials(&self) -> Option<Credentials> {
        self.state.lock().snapshot()
    }

    /// Signed-in user, if known
    #[must_use]
    pub fn user(&self) -> Option<UserProfile> {
        self.state.lock().user.clone()
    }

    /// Record the signed-in user
    pub fn set_user(&self, user: UserProfile) {
        let credentials = {
            let mut state = self.state.lock();
            state.user = Some(user);
            state.snapshot()
        };
        if let Some(credentials) = credentials
            && let Err(e) = self.store.save(&credentials)
        {
            log::warn!("Failed to persist credentials: {e}");
        }
    }

    /// Whether an access token is present
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.state.lock().access_token.is_some()
    }

    /// Whether a refresh call is in flight
    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.state.lock().refreshing
    }

    /// Watch authentication status changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthStatus> {
        self.status.subscribe()
    }

    /// Current authentication status
    #[must_use]
    pub fn status(&self) -> AuthStatus {
        self.status.borrow().clone()
    }

    // ========================================================================
    // Sign in / sign out
    // ========================================================================

    /// Sign in with email and password
    ///
    /// # Errors
    /// Returns `LinkError::Status` if the server rejected the credentials
    pub async fn login(&self, email: &str, password: &str) -> Result<Credentials> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let tokens = self.post_tokens(&self.endpoints.login, &body).await?;
        log::info!("Signed in as {email}");
        Ok(self.accept_tokens(tokens))
    }

    /// Create an account and sign in
    ///
    /// # Errors
    /// Returns `LinkError::Status` if the server rejected the registration
    pub async fn register(&self, request: &RegisterRequest) -> Result<Credentials> {
        let tokens = self.post_tokens(&self.endpoints.register, request).await?;
        log::info!("Registered {}", request.email);
        Ok(self.accept_tokens(tokens))
    }

    fn accept_tokens(&self, tokens: TokenResponse) -> Credentials {
        let credentials = Credentials {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            user: tokens.user,
        };
        self.set_credentials(credentials.clone());
        credentials
    }

    /// Sign out locally and notify the server in the background
    ///
    /// Local state is cleared immediately. The server call is best-effort;
    /// its handle is returned for callers that want to wait for it. Must be
    /// called from within a tokio runtime.
    pub fn logout(&self) -> Option<JoinHandle<()>> {
        let token = self.clear(AuthStatus::SignedOut)?;

        let client = self.client.clone();
        let url = endpoint_url(&self.base_url, &self.endpoints.logout);
        let timeout = self.timeout;
        Some(tokio::spawn(async move {
            let url = match url {
                Ok(url) => url,
                Err(e) => {
                    log::debug!("Skipping server logout: {e}");
                    return;
                }
            };
            let mut request = client.post(url).bearer_auth(token);
            if let Some(timeout) = timeout {
                request = request.timeout(timeout);
            }
            match request.send().await {
                Ok(response) => log::debug!("Server logout: {}", response.status()),
                Err(e) => log::debug!("Server logout failed: {e}"),
            }
        }))
    }

    /// Drop the credentials because they can no longer be used
    pub fn invalidate(&self, reason: impl Into<String>) {
        let reason = reason.into();
        log::warn!("Session invalidated: {reason}");
        self.clear(AuthStatus::Invalidated(reason));
    }

    /// Clear local state, fail waiters and publish `status`
    ///
    /// Returns the access token that was dropped.
    fn clear(&self, status: AuthStatus) -> Option<String> {
        let (token, waiters) = {
            let mut state = self.state.lock();
            let token = state.access_token.take();
            state.refresh_token = None;
            state.user = None;
            state.refreshing = false;
            state.generation += 1;
            (token, std::mem::take(&mut state.waiters))
        };

        let reason = match &status {
            AuthStatus::Invalidated(reason) => reason.clone(),
            _ => "signed out".to_string(),
        };
        for waiter in waiters {
            let _ = waiter.send(Err(reason.clone()));
        }

        if let Err(e) = self.store.clear() {
            log::warn!("Failed to clear stored credentials: {e}");
        }
        self.status.send_replace(status);
        token
    }

    // ========================================================================
    // Renewal
    // ========================================================================

    /// Obtain a fresh access token after an authorization failure
    ///
    /// `stale` is the token the failed request carried. If it has already been
    /// replaced, the current token is returned without another refresh. If a
    /// refresh is running, this waits for it instead of starting a second one.
    ///
    /// # Errors
    /// Returns `LinkError::SessionExpired` if there is no refresh token or the
    /// refresh failed; the session is invalidated in both cases
    pub async fn renew(&self, stale: Option<&str>) -> Result<String> {
        let step = {
            let mut state = self.state.lock();
            let replaced = match (&state.access_token, stale) {
                (Some(current), Some(stale)) if current != stale => Some(current.clone()),
                _ => None,
            };
            if state.refreshing {
                let (tx, rx) = oneshot::channel();
                state.waiters.push(tx);
                RenewStep::Wait(rx)
            } else if let Some(current) = replaced {
                RenewStep::Current(current)
            } else if let Some(refresh_token) = state.refresh_token.clone() {
                state.refreshing = true;
                RenewStep::Refresh {
                    refresh_token,
                    generation: state.generation,
                }
            } else {
                RenewStep::NoRefreshToken
            }
        };

        match step {
            RenewStep::Current(token) => {
                log::debug!("Token already renewed; retrying with current token");
                Ok(token)
            }
            RenewStep::Wait(rx) => {
                log::debug!("Waiting for in-flight token refresh");
                rx.await
                    .map_err(|_| LinkError::session_expired("refresh abandoned"))?
                    .map_err(LinkError::SessionExpired)
            }
            RenewStep::NoRefreshToken => {
                self.invalidate("no refresh token");
                Err(LinkError::session_expired("no refresh token"))
            }
            RenewStep::Refresh {
                refresh_token,
                generation,
            } => {
                let guard = RefreshGuard {
                    session: self,
                    generation,
                    armed: true,
                };
                log::info!("Refreshing access token");
                let result = self
                    .post_tokens(
                        &self.endpoints.refresh,
                        &RefreshRequest {
                            refresh_token: &refresh_token,
                        },
                    )
                    .await;
                guard.finish(result)
            }
        }
    }

    async fn post_tokens<B: serde::Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<TokenResponse> {
        let mut request = self.client.post(endpoint_url(&self.base_url, path)?).json(body);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LinkError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SessionManager")
            .field("base_url", &self.base_url)
            .field("authenticated", &state.access_token.is_some())
            .field("refreshing", &state.refreshing)
            .field("waiters", &state.waiters.len())
            .finish_non_exhaustive()
    }
}

/// Clears the refreshing flag however the refresh ends
///
/// If the refresh future is dropped mid-flight, waiters are failed instead of
/// hanging forever. A refresh only applies its result to the generation of
/// credentials it started from; once they were replaced or cleared the
/// outcome is dropped.
struct RefreshGuard<'a> {
    session: &'a SessionManager,
    generation: u64,
    armed: bool,
}

impl RefreshGuard<'_> {
    fn is_current(&self, state: &CredentialState) -> bool {
        state.refreshing && state.generation == self.generation
    }

    fn superseded() -> LinkError {
        log::debug!("Discarding refresh result for a session that already ended");
        LinkError::session_expired("session ended during refresh")
    }
}

impl RefreshGuard<'_> {
    fn finish(mut self, result: Result<TokenResponse>) -> Result<String> {
        self.armed = false;
        let session = self.session;

        let tokens = match result {
            Ok(tokens) => tokens,
            Err(_) if !self.is_current(&session.state.lock()) => {
                return Err(Self::superseded());
            }
            Err(e) => {
                let reason = format!("refresh failed: {e}");
                session.invalidate(reason.clone());
                return Err(LinkError::SessionExpired(reason));
            }
        };

        let (credentials, waiters) = {
            let mut state = session.state.lock();
            if !self.is_current(&state) {
                return Err(Self::superseded());
            }
            state.generation += 1;
            state.access_token = Some(tokens.access_token.clone());
            if let Some(refresh_token) = tokens.refresh_token {
                state.refresh_token = Some(refresh_token);
            }
            if let Some(user) = tokens.user {
                state.user = Some(user);
            }
            state.refreshing = false;
            (state.snapshot(), std::mem::take(&mut state.waiters))
        };

        log::info!("Access token refreshed; resuming {} waiting request(s)", waiters.len());
        for waiter in waiters {
            let _ = waiter.send(Ok(tokens.access_token.clone()));
        }
        if let Some(credentials) = credentials
            && let Err(e) = session.store.save(&credentials)
        {
            log::warn!("Failed to persist refreshed credentials: {e}");
        }
        session.status.send_replace(AuthStatus::SignedIn);
        Ok(tokens.access_token)
    }
}

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let waiters = {
            let mut state = self.session.state.lock();
            if !self.is_current(&state) {
                return;
            }
            state.refreshing = false;
            std::mem::take(&mut state.waiters)
        };
        log::warn!("Token refresh cancelled");
        for waiter in waiters {
            let _ = waiter.send(Err("refresh cancelled".to_string()));
        }
    }
}
