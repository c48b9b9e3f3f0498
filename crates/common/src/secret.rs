//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports the [`secrecy`] types used across the workspace. Anything that
//! grants access (the JWT signing secret, the LMS service token, raw client
//! credentials) is held in a `SecretString` so a derived `Debug` or a stray
//! `tracing` field prints `[REDACTED]` instead of the value.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct LmsCredentials {
//!     base_url: String,
//!     service_token: SecretString,
//! }
//!
//! let creds = LmsCredentials {
//!     base_url: "https://lms.example.com".to_string(),
//!     service_token: SecretString::from("svc-token"),
//! };
//!
//! assert!(!format!("{creds:?}").contains("svc-token"));
//! assert_eq!(creds.service_token.expose_secret(), "svc-token");
//! ```

pub use secrecy::{ExposeSecret, SecretString};

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_string_debug_is_redacted() {
        let secret = SecretString::from("super-secret-value");
        let debug = format!("{secret:?}");
        assert!(!debug.contains("super-secret-value"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_expose_secret_returns_value() {
        let secret = SecretString::from("jwt-signing-key");
        assert_eq!(secret.expose_secret(), "jwt-signing-key");
    }

    #[test]
    fn test_secret_string_deserializes_from_json() {
        #[derive(Debug, serde::Deserialize)]
        struct Wrapper {
            token: SecretString,
        }

        let wrapper: Wrapper = serde_json::from_str(r#"{"token": "abc"}"#).unwrap();
        assert_eq!(wrapper.token.expose_secret(), "abc");
        assert!(!format!("{wrapper:?}").contains("abc"));
    }
}
