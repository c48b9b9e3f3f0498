//! Mock credential verifier.
//!
//! # Example
//!
//! ```rust,ignore
//! use sc_test_utils::MockCredentialVerifier;
//!
//! let verifier = MockCredentialVerifier::new()
//!     .with_presenter("teacher-token", "ms-frizzle")
//!     .with_attendee("student-token", "arnold");
//! ```

use async_trait::async_trait;
use common::types::UserId;
use sc_service::auth::{CredentialVerifier, Principal};
use sc_service::errors::ScError;
use sc_service::protocol::Role;
use std::collections::HashMap;
use std::time::Duration;

/// Verifier backed by a fixed `token -> Principal` table.
#[derive(Debug, Default)]
pub struct MockCredentialVerifier {
    principals: HashMap<String, Principal>,
    delay: Option<Duration>,
}

impl MockCredentialVerifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `token` as `principal`.
    #[must_use]
    pub fn with_principal(mut self, token: &str, principal: Principal) -> Self {
        self.principals.insert(token.to_string(), principal);
        self
    }

    /// Accept `token` as a presenter named after `identity`.
    #[must_use]
    pub fn with_presenter(self, token: &str, identity: &str) -> Self {
        self.with_principal(token, principal(identity, Role::Presenter))
    }

    /// Accept `token` as an attendee named after `identity`.
    #[must_use]
    pub fn with_attendee(self, token: &str, identity: &str) -> Self {
        self.with_principal(token, principal(identity, Role::Attendee))
    }

    /// Sleep before answering, to exercise admission timeouts.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Principal with no credential display name.
#[must_use]
pub fn principal(identity: &str, role: Role) -> Principal {
    Principal {
        identity: UserId::new(identity),
        display_name: None,
        role,
    }
}

#[async_trait]
impl CredentialVerifier for MockCredentialVerifier {
    async fn verify(&self, token: &str) -> Result<Principal, ScError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.principals
            .get(token)
            .cloned()
            .ok_or_else(|| ScError::Authentication("unknown test token".to_string()))
    }
}
