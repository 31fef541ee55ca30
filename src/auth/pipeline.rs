//! Authenticated request pipeline
//!
//! Every request gets the current bearer token attached before it is sent.
//! A `401` response triggers one renewal through the [`SessionManager`] and
//! one retry; a second `401` is terminal and invalidates the session.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::{Method, Request, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{LinkError, Result};

use super::credentials::UserProfile;
use super::endpoint_url;
use super::session::SessionManager;

/// HTTP client wrapper that renews credentials on authorization failures
#[derive(Debug, Clone)]
pub struct RequestPipeline {
    client: reqwest::Client,
    base_url: String,
    session: Arc<SessionManager>,
    timeout: Option<Duration>,
}

impl RequestPipeline {
    /// Create a pipeline sending requests relative to `base_url`
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        session: Arc<SessionManager>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            session,
            timeout,
        }
    }

    /// Session manager supplying the tokens
    #[must_use]
    pub const fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Start a request to `path`, relative to the base URL
    ///
    /// # Errors
    /// Returns `LinkError::InvalidConfig` if the URL is invalid
    pub fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        Ok(self
            .client
            .request(method, endpoint_url(&self.base_url, path)?))
    }

    /// Send a request with the default timeout
    ///
    /// # Errors
    /// See [`execute_with_timeout`](Self::execute_with_timeout)
    pub async fn execute(&self, request: Request) -> Result<Response> {
        self.execute_with_timeout(request, self.timeout).await
    }

    /// Send a request, renewing credentials once on `401`
    ///
    /// Any response other than `401` is returned as is; use
    /// [`ensure_success`](Self::ensure_success) to turn error statuses into
    /// errors. Requests with streaming bodies cannot be retried and are
    /// rejected.
    ///
    /// # Errors
    /// Returns `LinkError::Unauthorized` if the request is still rejected after
    /// renewal, `LinkError::SessionExpired` if renewal failed, and
    /// `LinkError::Http` for transport failures
    pub async fn execute_with_timeout(
        &self,
        request: Request,
        timeout: Option<Duration>,
    ) -> Result<Response> {
        let mut token = self.session.access_token();
        let mut retried = false;

        loop {
            let mut attempt = request.try_clone().ok_or_else(|| {
                LinkError::invalid_config("request body cannot be replayed for retry")
            })?;
            if let Some(token) = &token {
                let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|e| LinkError::invalid_config(format!("invalid access token: {e}")))?;
                value.set_sensitive(true);
                attempt.headers_mut().insert(AUTHORIZATION, value);
            }
            *attempt.timeout_mut() = timeout;

            let response = self.client.execute(attempt).await.map_err(|e| {
                if e.is_timeout() {
                    LinkError::timeout(format!("{} {}", request.method(), request.url().path()))
                } else {
                    LinkError::Http(e)
                }
            })?;

            if response.status() != StatusCode::UNAUTHORIZED {
                return Ok(response);
            }

            if retried {
                log::warn!(
                    "{} {} rejected after renewal",
                    request.method(),
                    request.url().path()
                );
                self.session.invalidate("request rejected after token renewal");
                return Err(LinkError::Unauthorized);
            }

            retried = true;
            log::debug!(
                "{} {} returned 401; renewing credentials",
                request.method(),
                request.url().path()
            );
            token = Some(self.session.renew(token.as_deref()).await?);
        }
    }

    /// Turn a non-success response into `LinkError::Status`
    ///
    /// # Errors
    /// Returns `LinkError::Status` carrying the status code and body
    pub async fn ensure_success(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(LinkError::Status {
            status: status.as_u16(),
            body,
        })
    }

    /// `GET` a JSON resource
    ///
    /// # Errors
    /// Returns the pipeline's errors, `LinkError::Status` for error statuses
    /// and `LinkError::Http` if the body is not the expected JSON
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let request = self.request(Method::GET, path)?.build()?;
        let response = Self::ensure_success(self.execute(request).await?).await?;
        Ok(response.json().await?)
    }

    /// `POST` a JSON body and decode a JSON reply
    ///
    /// # Errors
    /// Same as [`get_json`](Self::get_json)
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let request = self.request(Method::POST, path)?.json(body).build()?;
        let response = Self::ensure_success(self.execute(request).await?).await?;
        Ok(response.json().await?)
    }

    /// Confirm the stored credentials with the who-am-I endpoint
    ///
    /// A `401` renews once, as for any request.
    ///
    /// # Errors
    /// Returns `LinkError::Unauthorized` or `LinkError::SessionExpired` if the
    /// session is no longer valid
    pub async fn verify_session(&self, me_path: &str) -> Result<UserProfile> {
        let user: UserProfile = self.get_json(me_path).await?;
        self.session.set_user(user.clone());
        Ok(user)
    }
}
