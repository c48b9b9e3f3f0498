//! Signaling Coordinator configuration.
//!
//! Configuration is loaded from environment variables. All sensitive
//! fields are redacted in Debug output.

use common::jwt::{clamp_clock_skew, DEFAULT_CLOCK_SKEW};
use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default WebSocket bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default health endpoint bind address.
pub const DEFAULT_HEALTH_BIND_ADDRESS: &str = "0.0.0.0:8081";

/// Default admission window in seconds.
pub const DEFAULT_AUTH_TIMEOUT_SECONDS: u64 = 10;

/// Default per-request LMS timeout in seconds.
pub const DEFAULT_LMS_TIMEOUT_SECONDS: u64 = 5;

/// Default outbound queue depth per connection.
pub const DEFAULT_CONNECTION_BUFFER: usize = 256;

/// Default attendance queue capacity.
pub const DEFAULT_ATTENDANCE_QUEUE_CAPACITY: usize = 1024;

/// Default attendance delivery attempts per event.
pub const DEFAULT_ATTENDANCE_MAX_ATTEMPTS: u32 = 3;

/// Default SC instance ID prefix.
pub const DEFAULT_INSTANCE_ID_PREFIX: &str = "sc";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Signaling Coordinator configuration.
///
/// Loaded from environment variables with sensible defaults.
/// Sensitive fields are redacted in Debug output.
#[derive(Clone)]
pub struct Config {
    /// HS256 secret for client credentials.
    /// Protected by `SecretString` to prevent accidental logging.
    pub jwt_secret: SecretString,

    /// Base URL of the LMS collaborator API.
    pub lms_api_url: String,

    /// Optional bearer token for LMS calls.
    pub lms_service_token: Option<SecretString>,

    /// WebSocket bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Health, metrics and introspection bind address (default: "0.0.0.0:8081").
    pub health_bind_address: String,

    /// Admission window in seconds.
    pub auth_timeout_seconds: u64,

    /// `iat` clock skew tolerance, clamped to `common::jwt::MAX_CLOCK_SKEW`.
    pub jwt_clock_skew: Duration,

    /// Per-request LMS timeout in seconds.
    pub lms_timeout_seconds: u64,

    /// Outbound queue depth per connection.
    pub connection_buffer: usize,

    /// Attendance queue capacity.
    pub attendance_queue_capacity: usize,

    /// Attendance delivery attempts per event.
    pub attendance_max_attempts: u32,

    /// Unique identifier for this SC instance.
    pub instance_id: String,

    /// Log output format.
    pub log_format: LogFormat,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("jwt_secret", &"[REDACTED]")
            .field("lms_api_url", &self.lms_api_url)
            .field(
                "lms_service_token",
                &self.lms_service_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("bind_address", &self.bind_address)
            .field("health_bind_address", &self.health_bind_address)
            .field("auth_timeout_seconds", &self.auth_timeout_seconds)
            .field("jwt_clock_skew", &self.jwt_clock_skew)
            .field("lms_timeout_seconds", &self.lms_timeout_seconds)
            .field("connection_buffer", &self.connection_buffer)
            .field("attendance_queue_capacity", &self.attendance_queue_capacity)
            .field("attendance_max_attempts", &self.attendance_max_attempts)
            .field("instance_id", &self.instance_id)
            .field("log_format", &self.log_format)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let jwt_secret = vars
            .get("SC_JWT_SECRET")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("SC_JWT_SECRET".to_string()))?;
        let jwt_secret = SecretString::from(jwt_secret.clone());

        let lms_api_url = vars
            .get("SC_LMS_API_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("SC_LMS_API_URL".to_string()))?
            .trim_end_matches('/')
            .to_string();
        if !(lms_api_url.starts_with("http://") || lms_api_url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue(format!(
                "SC_LMS_API_URL must be an http(s) URL, got '{lms_api_url}'"
            )));
        }

        let lms_service_token = vars
            .get("SC_LMS_SERVICE_TOKEN")
            .filter(|s| !s.is_empty())
            .map(|s| SecretString::from(s.clone()));

        let bind_address = vars
            .get("SC_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let health_bind_address = vars
            .get("SC_HEALTH_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HEALTH_BIND_ADDRESS.to_string());

        let auth_timeout_seconds = parse_positive(
            vars,
            "SC_AUTH_TIMEOUT_SECONDS",
            DEFAULT_AUTH_TIMEOUT_SECONDS,
        )?;

        let jwt_clock_skew = vars
            .get("SC_JWT_CLOCK_SKEW_SECONDS")
            .map(|s| {
                s.parse::<u64>().map_err(|e| {
                    ConfigError::InvalidValue(format!(
                        "SC_JWT_CLOCK_SKEW_SECONDS must be a number of seconds: {e}"
                    ))
                })
            })
            .transpose()?
            .map_or(DEFAULT_CLOCK_SKEW, Duration::from_secs);
        let jwt_clock_skew = clamp_clock_skew(jwt_clock_skew);

        let lms_timeout_seconds =
            parse_positive(vars, "SC_LMS_TIMEOUT_SECONDS", DEFAULT_LMS_TIMEOUT_SECONDS)?;

        let connection_buffer =
            parse_positive(vars, "SC_CONNECTION_BUFFER", DEFAULT_CONNECTION_BUFFER)?;

        let attendance_queue_capacity = parse_positive(
            vars,
            "SC_ATTENDANCE_QUEUE_CAPACITY",
            DEFAULT_ATTENDANCE_QUEUE_CAPACITY,
        )?;

        let attendance_max_attempts = parse_positive(
            vars,
            "SC_ATTENDANCE_MAX_ATTEMPTS",
            DEFAULT_ATTENDANCE_MAX_ATTEMPTS,
        )?;

        let log_format = match vars.get("SC_LOG_FORMAT").map(String::as_str) {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::InvalidValue(format!(
                    "SC_LOG_FORMAT must be 'text' or 'json', got '{other}'"
                )))
            }
        };

        // Generate SC instance ID
        let instance_id = vars.get("SC_INSTANCE_ID").cloned().unwrap_or_else(|| {
            let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("{DEFAULT_INSTANCE_ID_PREFIX}-{hostname}-{short_suffix}")
        });

        Ok(Config {
            jwt_secret,
            lms_api_url,
            lms_service_token,
            bind_address,
            health_bind_address,
            auth_timeout_seconds,
            jwt_clock_skew,
            lms_timeout_seconds,
            connection_buffer,
            attendance_queue_capacity,
            attendance_max_attempts,
            instance_id,
            log_format,
        })
    }

    #[must_use]
    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_seconds)
    }

    #[must_use]
    pub fn lms_timeout(&self) -> Duration {
        Duration::from_secs(self.lms_timeout_seconds)
    }
}

/// Parse an optional, strictly positive numeric variable.
fn parse_positive<T>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    let Some(raw) = vars.get(name) else {
        return Ok(default);
    };
    match raw.parse::<T>() {
        Ok(value) if value > T::default() => Ok(value),
        _ => Err(ConfigError::InvalidValue(format!(
            "{name} must be a positive number, got '{raw}'"
        ))),
    }
}
