//! Builder for signed client credentials.
//!
//! Provides a fluent API for creating HS256 JWTs the coordinator accepts
//! (or rejects, for negative tests).

use chrono::{Duration, Utc};
use common::jwt::UserClaims;
use jsonwebtoken::{encode, EncodingKey, Header};

/// Secret shared by test tokens and test verifiers.
pub const TEST_JWT_SECRET: &str = "sc-test-secret-0123456789abcdef0123456789";

/// Builder for client credential JWTs.
///
/// # Example
/// ```rust,ignore
/// let token = TestTokenBuilder::new()
///     .for_user("alice")
///     .with_name("Alice Liddell")
///     .with_role("instructor")
///     .expires_in(3600)
///     .sign(TEST_JWT_SECRET);
/// ```
pub struct TestTokenBuilder {
    sub: String,
    name: Option<String>,
    role: Option<String>,
    exp: i64,
    iat: i64,
}

impl TestTokenBuilder {
    /// Create a new token builder with defaults (one hour validity).
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            sub: "test-user".to_string(),
            name: None,
            role: None,
            exp: (now + Duration::seconds(3600)).timestamp(),
            iat: now.timestamp(),
        }
    }

    /// Set the subject (user identity)
    pub fn for_user(mut self, subject: &str) -> Self {
        self.sub = subject.to_string();
        self
    }

    /// Set the display name claim
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Set the LMS role claim
    pub fn with_role(mut self, role: &str) -> Self {
        self.role = Some(role.to_string());
        self
    }

    /// Set expiration in seconds from now (negative for expired tokens)
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = (Utc::now() + Duration::seconds(seconds)).timestamp();
        self
    }

    /// Set issued-at timestamp
    pub fn issued_at(mut self, timestamp: i64) -> Self {
        self.iat = timestamp;
        self
    }

    /// Build the claims
    pub fn build(self) -> UserClaims {
        UserClaims {
            sub: self.sub,
            exp: self.exp,
            iat: self.iat,
            name: self.name,
            role: self.role,
        }
    }

    /// Build and sign the token with HS256
    pub fn sign(self, secret: &str) -> String {
        encode(
            &Header::default(),
            &self.build(),
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .expect("HS256 signing with a static secret cannot fail")
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}
