//! Authentication and the resilient request pipeline
//!
//! - [`SessionManager`] owns the token pair and performs single-flight renewal
//! - [`RequestPipeline`] attaches tokens to requests and retries once on `401`
//! - [`CredentialStore`] persists credentials between runs

mod credentials;
mod pipeline;
mod session;
mod storage;

pub use credentials::{Credentials, LoginRequest, RegisterRequest, UserProfile};
pub use pipeline::RequestPipeline;
pub use session::{AuthStatus, SessionManager};
pub use storage::{CredentialStore, FileCredentialStore, MemoryCredentialStore};

use crate::error::{LinkError, Result};

/// Join an API path onto a base URL, keeping any path prefix of the base
pub(crate) fn endpoint_url(base: &str, path: &str) -> Result<reqwest::Url> {
    let url = format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    reqwest::Url::parse(&url)
        .map_err(|e| LinkError::invalid_config(format!("invalid URL `{url}`: {e}")))
}
