//! `AssistantClient` implementation

use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::auth::{
    CredentialStore, Credentials, FileCredentialStore, MemoryCredentialStore, RegisterRequest,
    RequestPipeline, SessionManager,
};
use crate::connection::{ConnectionManager, UrlResolver};
use crate::error::{LinkError, Result};
use crate::stream::{HttpChat, SocketChat, StreamHandlers};
use crate::transport::{HttpStreamTransport, WebSocketConfig, WebSocketConnector};
use crate::types::options::ClientOptions;

use super::AssistantClient;

impl AssistantClient {
    /// Create a client
    ///
    /// Credentials are stored in `options.credentials_path` when set and kept
    /// in memory otherwise. Nothing is loaded or connected yet.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built
    pub fn new(options: ClientOptions) -> Result<Self> {
        let store: Arc<dyn CredentialStore> = match &options.credentials_path {
            Some(path) => Arc::new(FileCredentialStore::new(path)),
            None => Arc::new(MemoryCredentialStore::new()),
        };
        Self::with_store(options, store)
    }

    /// Create a client with a custom credential store
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built
    pub fn with_store(options: ClientOptions, store: Arc<dyn CredentialStore>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(options.connect_timeout)
            .build()?;

        let session = Arc::new(SessionManager::new(
            http.clone(),
            options.api_base_url.clone(),
            options.auth.clone(),
            options.request_timeout,
            store,
        ));
        let pipeline = Arc::new(RequestPipeline::new(
            http,
            options.api_base_url.clone(),
            Arc::clone(&session),
            options.request_timeout,
        ));

        let connector = WebSocketConnector::new(WebSocketConfig {
            connect_timeout: options.connect_timeout,
            max_message_size: options.max_line_size,
        });
        let connection = Arc::new(ConnectionManager::new(
            connector,
            socket_url_resolver(options.ws_url.clone(), Arc::clone(&session)),
            options.connection,
        ));

        Ok(Self {
            options,
            session,
            pipeline,
            connection,
            monitor: Mutex::new(None),
        })
    }

    /// Client options
    #[must_use]
    pub const fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Session manager
    #[must_use]
    pub const fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Authenticated request pipeline
    #[must_use]
    pub const fn pipeline(&self) -> &Arc<RequestPipeline> {
        &self.pipeline
    }

    /// Realtime connection
    #[must_use]
    pub const fn connection(&self) -> &Arc<ConnectionManager> {
        &self.connection
    }

    // ========================================================================
    // Session
    // ========================================================================

    /// Rehydrate stored credentials and confirm them with the server
    ///
    /// Returns `false` if nothing was stored or the stored credentials could
    /// not be renewed.
    ///
    /// # Errors
    /// Returns transport errors; stored credentials are kept in that case
    pub async fn restore_session(&self) -> Result<bool> {
        if !self.session.load_from_store() {
            return Ok(false);
        }
        match self.pipeline.verify_session(&self.options.auth.me).await {
            Ok(user) => {
                log::info!("Restored session for {}", user.email);
                Ok(true)
            }
            Err(e) if e.is_auth_failure() => {
                log::info!("Stored session is no longer valid: {e}");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Sign in
    ///
    /// # Errors
    /// Returns `LinkError::Status` if the server rejected the credentials
    pub async fn login(&self, email: &str, password: &str) -> Result<Credentials> {
        let credentials = self.session.login(email, password).await?;
        self.fill_user(credentials).await
    }

    /// Create an account and sign in
    ///
    /// # Errors
    /// Returns `LinkError::Status` if the server rejected the registration
    pub async fn register(&self, request: &RegisterRequest) -> Result<Credentials> {
        let credentials = self.session.register(request).await?;
        self.fill_user(credentials).await
    }

    async fn fill_user(&self, mut credentials: Credentials) -> Result<Credentials> {
        if credentials.user.is_none() {
            match self.pipeline.verify_session(&self.options.auth.me).await {
                Ok(user) => credentials.user = Some(user),
                Err(e) => log::debug!("User profile unavailable: {e}"),
            }
        }
        Ok(credentials)
    }

    /// Sign out: close the socket, clear credentials, notify the server
    pub async fn logout(&self) {
        self.connection.disconnect().await;
        if self.session.logout().is_none() {
            log::debug!("Logout without an active session");
        }
    }

    // ========================================================================
    // Chat
    // ========================================================================

    /// Open the realtime socket
    pub fn connect(&self) {
        self.connection.connect();
    }

    /// Create a chat view over the realtime socket
    #[must_use]
    pub fn socket_chat(&self, handlers: StreamHandlers) -> SocketChat {
        SocketChat::attach(Arc::clone(&self.connection), handlers)
    }

    /// Create a chat view over the chunked-HTTP transport
    ///
    /// # Errors
    /// Returns `LinkError::SessionExpired` if no user is signed in
    pub fn http_chat(&self, handlers: StreamHandlers) -> Result<HttpChat> {
        let user = self
            .session
            .user()
            .ok_or_else(|| LinkError::session_expired("no signed-in user"))?;
        let transport = HttpStreamTransport::new(
            Arc::clone(&self.pipeline),
            self.options.chat_stream_path.clone(),
            self.options.max_line_size,
        );
        Ok(HttpChat::new(
            transport,
            user.user_id,
            self.options.stream_idle_timeout,
            handlers,
        ))
    }

    // ========================================================================
    // Background tasks
    // ========================================================================

    /// Start the session background tasks
    ///
    /// The socket is closed when the session is invalidated or signed out, and
    /// the session is re-verified at `options.session_check_interval` when set.
    /// Calling this twice is a no-op.
    pub fn start_session_monitor(&self) {
        let mut monitor = self.monitor.lock();
        if monitor.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        let mut tasks = vec![tokio::spawn(Self::auth_watch_task(
            Arc::clone(&self.session),
            Arc::clone(&self.connection),
            cancel.clone(),
        ))];
        if let Some(interval) = self
            .options
            .session_check_interval
            .filter(|interval| !interval.is_zero())
        {
            tasks.push(tokio::spawn(Self::session_check_task(
                Arc::clone(&self.pipeline),
                self.options.auth.me.clone(),
                interval,
                cancel.clone(),
            )));
        }
        *monitor = Some((cancel, tasks));
    }

    /// Stop background tasks and close the socket
    pub async fn shutdown(&self) {
        let monitor = self.monitor.lock().take();
        if let Some((cancel, tasks)) = monitor {
            cancel.cancel();
            for task in tasks {
                let _ = task.await;
            }
        }
        self.connection.disconnect().await;
    }
}

/// Socket URL with the current access token as the `token` query parameter
fn socket_url_resolver(ws_url: String, session: Arc<SessionManager>) -> UrlResolver {
    Arc::new(move || {
        let mut url = reqwest::Url::parse(&ws_url)
            .map_err(|e| LinkError::invalid_config(format!("invalid socket URL `{ws_url}`: {e}")))?;
        if let Some(token) = session.access_token() {
            url.query_pairs_mut().append_pair("token", &token);
        }
        Ok(url.to_string())
    })
}

impl Drop for AssistantClient {
    fn drop(&mut self) {
        if let Some((cancel, _)) = self.monitor.lock().take() {
            cancel.cancel();
        }
    }
}

impl std::fmt::Debug for AssistantClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssistantClient")
            .field("api_base_url", &self.options.api_base_url)
            .field("ws_url", &self.options.ws_url)
            .field("connection", &self.connection.state())
            .field("authenticated", &self.session.is_authenticated())
            .finish_non_exhaustive()
    }
}
