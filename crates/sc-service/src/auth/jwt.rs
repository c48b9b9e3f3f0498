//! JWT credential verification.
//!
//! Client credentials are HS256 JWTs issued by the LMS.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Only HS256 is accepted
//! - Expiration and issued-at claims are validated with clock skew tolerance
//! - Generic error messages prevent information leakage

use crate::auth::{role_from_claim, CredentialVerifier, Principal};
use crate::errors::ScError;
use common::jwt::{check_token_shape, clamp_clock_skew, validate_iat, UserClaims};
use common::secret::{ExposeSecret, SecretString};
use common::types::UserId;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use std::time::Duration;
use tracing::instrument;

const INVALID_TOKEN: &str = "The access token is invalid or expired";

/// HS256 credential verifier.
pub struct JwtCredentialVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
    clock_skew: Duration,
}

impl JwtCredentialVerifier {
    /// Create a verifier for tokens signed with `secret`.
    ///
    /// `clock_skew` is clamped to `common::jwt::MAX_CLOCK_SKEW`.
    #[must_use]
    pub fn new(secret: &SecretString, clock_skew: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            decoding_key: DecodingKey::from_secret(secret.expose_secret().as_bytes()),
            validation,
            clock_skew: clamp_clock_skew(clock_skew),
        }
    }

    /// Validate a token and return its claims.
    ///
    /// # Security Checks
    ///
    /// 1. Size and shape check before parsing
    /// 2. HS256 signature
    /// 3. `exp` claim (reject expired tokens)
    /// 4. `iat` claim with clock skew tolerance
    /// 5. Non-empty `sub`
    fn validate(&self, token: &str) -> Result<UserClaims, ScError> {
        check_token_shape(token).map_err(|e| {
            tracing::debug!(target: "sc.auth.jwt", error = ?e, "Token shape check failed");
            ScError::Authentication(INVALID_TOKEN.to_string())
        })?;

        let token_data =
            decode::<UserClaims>(token, &self.decoding_key, &self.validation).map_err(|e| {
                tracing::debug!(target: "sc.auth.jwt", error = %e, "Token verification failed");
                ScError::Authentication(INVALID_TOKEN.to_string())
            })?;
        let claims = token_data.claims;

        if let Err(e) = validate_iat(claims.iat, self.clock_skew) {
            tracing::debug!(target: "sc.auth.jwt", error = ?e, "Token iat validation failed");
            return Err(ScError::Authentication(INVALID_TOKEN.to_string()));
        }

        if claims.sub.trim().is_empty() {
            tracing::debug!(target: "sc.auth.jwt", "Token has empty subject");
            return Err(ScError::Authentication(INVALID_TOKEN.to_string()));
        }

        Ok(claims)
    }
}

#[async_trait::async_trait]
impl CredentialVerifier for JwtCredentialVerifier {
    #[instrument(skip_all)]
    async fn verify(&self, token: &str) -> Result<Principal, ScError> {
        let claims = self.validate(token)?;

        tracing::debug!(target: "sc.auth.jwt", "Token validated successfully");
        Ok(Principal {
            identity: UserId::new(claims.sub),
            display_name: claims.name,
            role: role_from_claim(claims.role.as_deref()),
        })
    }
}
