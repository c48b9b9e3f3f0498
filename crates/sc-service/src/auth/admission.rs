//! Time-bounded admission of new connections.

use crate::auth::{CredentialVerifier, Principal};
use crate::errors::ScError;
use crate::observability::metrics;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;

/// Admits connections by verifying their credential within a deadline.
///
/// Exactly one attempt is made per connection. A failure is final.
#[derive(Clone)]
pub struct Admission {
    verifier: Arc<dyn CredentialVerifier>,
    timeout: Duration,
}

impl Admission {
    #[must_use]
    pub fn new(verifier: Arc<dyn CredentialVerifier>, timeout: Duration) -> Self {
        Self { verifier, timeout }
    }

    /// Verify the credential presented by a connection.
    ///
    /// # Errors
    ///
    /// Returns `ScError::Authentication` when the token is missing, rejected
    /// by the verifier, or the verifier does not answer within the timeout.
    #[instrument(skip_all, name = "sc.admission.admit")]
    pub async fn admit(&self, token: Option<&str>) -> Result<Principal, ScError> {
        let start = Instant::now();

        let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) else {
            tracing::debug!(target: "sc.admission", "Connection presented no credential");
            metrics::record_admission("missing", start.elapsed());
            return Err(ScError::Authentication("missing credential".to_string()));
        };

        match tokio::time::timeout(self.timeout, self.verifier.verify(token)).await {
            Ok(Ok(principal)) => {
                tracing::info!(
                    target: "sc.admission",
                    identity = %principal.identity,
                    role = principal.role.as_str(),
                    "Connection admitted"
                );
                metrics::record_admission("accepted", start.elapsed());
                Ok(principal)
            }
            Ok(Err(e)) => {
                tracing::info!(target: "sc.admission", error = %e, "Connection rejected");
                metrics::record_admission("rejected", start.elapsed());
                Err(e)
            }
            Err(_) => {
                tracing::warn!(
                    target: "sc.admission",
                    timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                    "Credential verification timed out"
                );
                metrics::record_admission("timeout", start.elapsed());
                Err(ScError::Authentication(
                    "credential verification timed out".to_string(),
                ))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::protocol::Role;
    use common::types::UserId;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubVerifier {
        delay: Duration,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl CredentialVerifier for StubVerifier {
        async fn verify(&self, token: &str) -> Result<Principal, ScError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if token == "good" {
                Ok(Principal {
                    identity: UserId::new("u1"),
                    display_name: None,
                    role: Role::Attendee,
                })
            } else {
                Err(ScError::Authentication("bad".to_string()))
            }
        }
    }

    fn admission(delay: Duration) -> (Admission, Arc<StubVerifier>) {
        let verifier = Arc::new(StubVerifier {
            delay,
            calls: AtomicUsize::new(0),
        });
        let admission = Admission::new(verifier.clone(), Duration::from_secs(10));
        (admission, verifier)
    }

    #[tokio::test]
    async fn test_valid_credential_admitted() {
        let (admission, verifier) = admission(Duration::ZERO);
        let principal = admission.admit(Some("good")).await.unwrap();
        assert_eq!(principal.identity, UserId::new("u1"));
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_credential_never_reaches_verifier() {
        let (admission, verifier) = admission(Duration::ZERO);

        assert!(matches!(
            admission.admit(None).await,
            Err(ScError::Authentication(_))
        ));
        assert!(admission.admit(Some("   ")).await.is_err());
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rejected_credential() {
        let (admission, _) = admission(Duration::ZERO);
        let err = admission.admit(Some("bad")).await.unwrap_err();
        assert_eq!(err.error_code(), crate::protocol::ErrorCode::Unauthorized);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_verifier_times_out() {
        let (admission, _) = admission(Duration::from_secs(60));
        let err = admission.admit(Some("good")).await.unwrap_err();
        assert!(matches!(err, ScError::Authentication(msg) if msg.contains("timed out")));
    }
}
