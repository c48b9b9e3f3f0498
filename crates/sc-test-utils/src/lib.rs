//! # SC Test Utilities
//!
//! Shared test utilities for the Signaling Coordinator (SC) service.
//!
//! This crate provides mock collaborators and fixtures for testing the
//! coordinator without an LMS or real sockets.
//!
//! ## Modules
//!
//! - `mock_verifier` - Credential verifier with a fixed token table
//! - `mock_access` - Access checker that allows, denies or fails
//! - `mock_attendance` - Attendance recorder that records (or fails)
//! - `test_client` - Scripted client driving a real `ConnectionActor`
//! - `harness` - Registry wired to the mocks
//! - `token_builders` - HS256 JWTs for admission tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sc_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let harness = TestHarness::new();
//!     let mut alice = harness.client("alice");
//!     alice.join("math-101").await;
//!     assert!(matches!(
//!         alice.recv().await,
//!         ServerMessage::ParticipantsList { .. }
//!     ));
//! }
//! ```

pub mod harness;
pub mod mock_access;
pub mod mock_attendance;
pub mod mock_verifier;
pub mod test_client;
pub mod token_builders;

pub use harness::*;
pub use mock_access::*;
pub use mock_attendance::*;
pub use mock_verifier::*;
pub use test_client::*;
pub use token_builders::*;

pub use sc_service::protocol::{ClientMessage, ServerMessage};
