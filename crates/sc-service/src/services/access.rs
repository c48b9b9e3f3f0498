//! Session access checks against the LMS.

use crate::errors::ScError;
use crate::services::LmsEndpoint;
use common::types::{SessionId, UserId};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::instrument;

/// Decides whether an identity may join a session.
#[async_trait::async_trait]
pub trait SessionAccessChecker: Send + Sync {
    /// Returns `Ok(true)` if allowed, `Ok(false)` if denied.
    ///
    /// # Errors
    ///
    /// Returns `ScError::AccessCheck` when the decision could not be made.
    async fn check_session_access(
        &self,
        identity: &UserId,
        session_id: &SessionId,
    ) -> Result<bool, ScError>;
}

#[derive(Debug, Deserialize)]
struct AccessResponse {
    allowed: bool,
}

/// `GET {base}/api/live-sessions/{sessionId}/access?userId=<identity>`
pub struct HttpAccessClient {
    endpoint: LmsEndpoint,
}

impl HttpAccessClient {
    #[must_use]
    pub fn new(endpoint: LmsEndpoint) -> Self {
        Self { endpoint }
    }
}

#[async_trait::async_trait]
impl SessionAccessChecker for HttpAccessClient {
    #[instrument(skip_all, fields(session_id = %session_id, identity = %identity))]
    async fn check_session_access(
        &self,
        identity: &UserId,
        session_id: &SessionId,
    ) -> Result<bool, ScError> {
        let mut url = self.endpoint.session_url(session_id, "access")?;
        url.query_pairs_mut()
            .append_pair("userId", identity.as_str());

        let response = self.endpoint.get(url).send().await.map_err(|e| {
            tracing::warn!(target: "sc.services.access", error = %e, "Access check request failed");
            ScError::AccessCheck(format!("request failed: {e}"))
        })?;

        let status = response.status();
        match status {
            StatusCode::OK => {
                let body: AccessResponse = response.json().await.map_err(|e| {
                    tracing::warn!(
                        target: "sc.services.access",
                        error = %e,
                        "Access check returned an unparseable body"
                    );
                    ScError::AccessCheck(format!("invalid response body: {e}"))
                })?;
                tracing::debug!(
                    target: "sc.services.access",
                    allowed = body.allowed,
                    "Access check completed"
                );
                Ok(body.allowed)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                tracing::debug!(
                    target: "sc.services.access",
                    status = status.as_u16(),
                    "Access denied by LMS"
                );
                Ok(false)
            }
            other => {
                tracing::warn!(
                    target: "sc.services.access",
                    status = other.as_u16(),
                    "Access check returned unexpected status"
                );
                Err(ScError::AccessCheck(format!(
                    "unexpected status {}",
                    other.as_u16()
                )))
            }
        }
    }
}
