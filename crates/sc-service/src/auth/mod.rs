//! Connection admission.
//!
//! A connection is admitted exactly once, before any session message is
//! read. The [`CredentialVerifier`] turns a caller-supplied token into a
//! [`Principal`]; [`admission::Admission`] bounds that step in time and
//! records the outcome.

pub mod admission;
pub mod jwt;

use crate::errors::ScError;
use crate::protocol::Role;
use common::types::UserId;

/// LMS roles that are allowed to present.
const PRESENTER_ROLES: &[&str] = &["instructor", "teacher", "admin", "presenter"];

/// Maximum display name length in characters.
pub const MAX_DISPLAY_NAME_CHARS: usize = 64;

/// Authenticated identity attached to a connection for its whole lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Stable user identifier from the credential.
    pub identity: UserId,
    /// Display name carried by the credential, if any.
    pub display_name: Option<String>,
    /// Highest role the credential grants.
    pub role: Role,
}

impl Principal {
    /// Resolve the role used for a join request.
    ///
    /// The credential is authoritative: `presenter` is granted only when the
    /// credential allows it. Any other request becomes `attendee`.
    #[must_use]
    pub fn effective_role(&self, requested: Option<Role>) -> Role {
        match (requested, self.role) {
            (Some(Role::Attendee), _) => Role::Attendee,
            (_, role) => role,
        }
    }

    /// Resolve the display name used for a join request.
    ///
    /// Falls back from the client-supplied name to the credential name and
    /// finally to the identity itself.
    #[must_use]
    pub fn effective_display_name(&self, requested: Option<&str>) -> String {
        requested
            .and_then(normalize_display_name)
            .or_else(|| {
                self.display_name
                    .as_deref()
                    .and_then(normalize_display_name)
            })
            .unwrap_or_else(|| self.identity.to_string())
    }
}

/// Map an LMS role claim onto a session role.
#[must_use]
pub fn role_from_claim(claim: Option<&str>) -> Role {
    match claim {
        Some(role)
            if PRESENTER_ROLES
                .iter()
                .any(|r| r.eq_ignore_ascii_case(role.trim())) =>
        {
            Role::Presenter
        }
        _ => Role::Attendee,
    }
}

fn normalize_display_name(name: &str) -> Option<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(MAX_DISPLAY_NAME_CHARS).collect())
}

/// Verifies client credentials.
#[async_trait::async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// Verify a credential token.
    ///
    /// # Errors
    ///
    /// Returns `ScError::Authentication` when the credential is rejected.
    async fn verify(&self, token: &str) -> Result<Principal, ScError>;
}
