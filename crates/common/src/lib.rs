//! Shared types and helpers for the live-session signaling workspace.

#![warn(clippy::pedantic)]

/// Module for identifier newtypes shared by the service and its test utilities
pub mod types;

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for JWT utilities (size limits, iat validation, user claims)
pub mod jwt;
