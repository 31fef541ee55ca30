//! Client options and configuration
//!
//! This module contains the configuration for the assistant link, including a
//! builder pattern for easy configuration.

use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// Defaults
// ============================================================================

/// Default heartbeat interval for the realtime socket
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Default maximum number of reconnection attempts
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Default per-request timeout for the request pipeline
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default socket connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default idle timeout between chunks of the HTTP chat stream
pub const DEFAULT_STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default maximum line size for the chunked stream decoder (1MB)
pub const DEFAULT_MAX_LINE_SIZE: usize = 1024 * 1024;

// ============================================================================
// Reconnection
// ============================================================================

/// Reconnection schedule applied after an unclean socket close
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Attempts allowed before giving up
    pub max_attempts: u32,
    /// Delay before the first attempt (and every attempt when not exponential)
    pub base_delay: Duration,
    /// Upper bound on the delay
    pub max_delay: Duration,
    /// Double the delay on every attempt
    pub exponential: bool,
}

impl ReconnectPolicy {
    /// Fixed-interval policy
    #[must_use]
    pub const fn fixed(delay: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            exponential: false,
        }
    }

    /// Delay before reconnection attempt number `attempt` (zero-based)
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if !self.exponential {
            return self.base_delay;
        }
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            exponential: true,
        }
    }
}

/// Options for the connection manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Interval between keep-alive pings
    pub heartbeat_interval: Duration,
    /// Reconnection schedule
    pub reconnect: ReconnectPolicy,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

// ============================================================================
// Auth endpoints
// ============================================================================

/// Paths of the authentication endpoints, relative to the API base URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEndpoints {
    /// `POST` login
    pub login: String,
    /// `POST` registration
    pub register: String,
    /// `POST` access token renewal
    pub refresh: String,
    /// `POST` server-side logout
    pub logout: String,
    /// `GET` who-am-I verification
    pub me: String,
}

impl Default for AuthEndpoints {
    fn default() -> Self {
        Self {
            login: "/login".to_string(),
            register: "/register".to_string(),
            refresh: "/refresh".to_string(),
            logout: "/logout".to_string(),
            me: "/me".to_string(),
        }
    }
}

// ============================================================================
// Client Options
// ============================================================================

/// Main options for the assistant link
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Base URL of the REST API
    pub api_base_url: String,
    /// URL of the realtime socket
    pub ws_url: String,
    /// Path of the chunked-HTTP chat endpoint
    pub chat_stream_path: String,
    /// Authentication endpoint paths
    pub auth: AuthEndpoints,
    /// Timeout applied to every pipeline request (None disables it)
    pub request_timeout: Option<Duration>,
    /// Timeout for opening the realtime socket
    pub connect_timeout: Duration,
    /// Maximum silence between chunks of the HTTP chat stream
    pub stream_idle_timeout: Duration,
    /// Maximum line size accepted by the chunked stream decoder
    pub max_line_size: usize,
    /// Socket heartbeat and reconnection options
    pub connection: ConnectionOptions,
    /// File used to persist credentials (in-memory when None)
    pub credentials_path: Option<PathBuf>,
    /// Interval of the proactive session check (disabled when None)
    pub session_check_interval: Option<Duration>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000".to_string(),
            ws_url: "ws://localhost:8000/ws/chat".to_string(),
            chat_stream_path: "/api/v1/chat/stream".to_string(),
            auth: AuthEndpoints::default(),
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            stream_idle_timeout: DEFAULT_STREAM_IDLE_TIMEOUT,
            max_line_size: DEFAULT_MAX_LINE_SIZE,
            connection: ConnectionOptions::default(),
            credentials_path: None,
            session_check_interval: None,
        }
    }
}

impl ClientOptions {
    /// Create a new builder for `ClientOptions`
    #[must_use]
    pub fn builder() -> ClientOptionsBuilder {
        ClientOptionsBuilder::default()
    }
}

// ============================================================================
// Builder for ClientOptions
// ============================================================================

/// Builder for `ClientOptions`
#[derive(Debug, Default)]
pub struct ClientOptionsBuilder {
    options: ClientOptions,
}

impl ClientOptionsBuilder {
    /// Set the REST API base URL
    #[must_use]
    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.options.api_base_url = url.into();
        self
    }

    /// Set the realtime socket URL
    #[must_use]
    pub fn ws_url(mut self, url: impl Into<String>) -> Self {
        self.options.ws_url = url.into();
        self
    }

    /// Set the chunked-HTTP chat path
    #[must_use]
    pub fn chat_stream_path(mut self, path: impl Into<String>) -> Self {
        self.options.chat_stream_path = path.into();
        self
    }

    /// Set the authentication endpoint paths
    #[must_use]
    pub fn auth_endpoints(mut self, endpoints: AuthEndpoints) -> Self {
        self.options.auth = endpoints;
        self
    }

    /// Set the per-request timeout
    #[must_use]
    pub const fn request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.options.request_timeout = timeout;
        self
    }

    /// Set the socket connect timeout
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.options.connect_timeout = timeout;
        self
    }

    /// Set the idle timeout of the HTTP chat stream
    #[must_use]
    pub const fn stream_idle_timeout(mut self, timeout: Duration) -> Self {
        self.options.stream_idle_timeout = timeout;
        self
    }

    /// Set the decoder's maximum line size
    #[must_use]
    pub const fn max_line_size(mut self, size: usize) -> Self {
        self.options.max_line_size = size;
        self
    }

    /// Set the heartbeat interval
    ///
    /// # Panics
    /// Panics if `interval` is zero
    #[must_use]
    pub const fn heartbeat_interval(mut self, interval: Duration) -> Self {
        assert!(!interval.is_zero(), "heartbeat_interval must be non-zero");
        self.options.connection.heartbeat_interval = interval;
        self
    }

    /// Set the reconnection policy
    ///
    /// # Panics
    /// Panics if `max_attempts` exceeds 100
    #[must_use]
    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        const MAX_ALLOWED_ATTEMPTS: u32 = 100;
        assert!(
            policy.max_attempts <= MAX_ALLOWED_ATTEMPTS,
            "max_attempts {} exceeds maximum allowed: {MAX_ALLOWED_ATTEMPTS}",
            policy.max_attempts
        );
        self.options.connection.reconnect = policy;
        self
    }

    /// Persist credentials to this file
    #[must_use]
    pub fn credentials_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.credentials_path = Some(path.into());
        self
    }

    /// Re-verify the session periodically
    ///
    /// # Panics
    /// Panics if `interval` is zero
    #[must_use]
    pub const fn session_check_interval(mut self, interval: Duration) -> Self {
        assert!(!interval.is_zero(), "session_check_interval must be non-zero");
        self.options.session_check_interval = Some(interval);
        self
    }

    /// Build the options
    #[must_use]
    pub fn build(self) -> ClientOptions {
        self.options
    }
}
