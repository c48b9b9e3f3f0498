//! LMS collaborator clients.
//!
//! The coordinator consumes two LMS capabilities:
//! - [`access::SessionAccessChecker`]: may this identity join this session?
//! - [`attendance::AttendanceRecorder`]: durable join/leave log
//!
//! Both production clients share one [`LmsEndpoint`] (base URL, bearer
//! service token and a pooled `reqwest::Client`).

pub mod access;
pub mod attendance;

use crate::errors::ScError;
use common::secret::{ExposeSecret, SecretString};
use common::types::SessionId;
use reqwest::{RequestBuilder, Url};
use std::time::Duration;

/// Connection details for the LMS REST API.
#[derive(Clone)]
pub struct LmsEndpoint {
    base_url: Url,
    service_token: Option<SecretString>,
    http_client: reqwest::Client,
}

impl LmsEndpoint {
    /// Create an endpoint for `base_url` with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns `ScError::Config` if the URL cannot be parsed or the HTTP
    /// client cannot be built.
    pub fn new(
        base_url: &str,
        service_token: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, ScError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ScError::Config(format!("invalid LMS API URL: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ScError::Config(
                "LMS API URL cannot be used as a base".to_string(),
            ));
        }

        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| ScError::Config(format!("failed to build LMS HTTP client: {e}")))?;

        Ok(Self {
            base_url,
            service_token,
            http_client,
        })
    }

    /// URL of a live-session sub-resource: `{base}/api/live-sessions/{id}/{resource}`.
    ///
    /// The session id is percent-encoded as a single path segment.
    pub(crate) fn session_url(&self, session_id: &SessionId, resource: &str) -> Result<Url, ScError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| ScError::Internal("LMS base URL cannot hold a path".to_string()))?
            .pop_if_empty()
            .extend(["api", "live-sessions", session_id.as_str(), resource]);
        Ok(url)
    }

    pub(crate) fn get(&self, url: Url) -> RequestBuilder {
        self.authorize(self.http_client.get(url))
    }

    pub(crate) fn post(&self, url: Url) -> RequestBuilder {
        self.authorize(self.http_client.post(url))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.service_token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }
}

impl std::fmt::Debug for LmsEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmsEndpoint")
            .field("base_url", &self.base_url.as_str())
            .field(
                "service_token",
                &self.service_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish_non_exhaustive()
    }
}
