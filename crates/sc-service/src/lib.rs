//! Signaling Coordinator (SC) Service Library
//!
//! This library provides the real-time signaling coordinator for live
//! classroom sessions. It lets instructors and students negotiate direct
//! peer-to-peer media connections and keeps presence state consistent:
//!
//! - Connection admission against a credential verifier
//! - Session registry: who is in which live session
//! - Signaling relay: offer/answer/ICE candidate forwarding to one peer
//! - Presence and media broadcasting to the other session members
//! - Attendance recording through the LMS collaborator API
//!
//! # Architecture
//!
//! The SC uses an actor model hierarchy:
//!
//! ```text
//! SessionRegistry (one per SC instance, injectable handle)
//! ├── supervises N SessionActors
//! │   └── SessionActor (one per live session)
//! │       ├── owns participants and media state
//! │       └── delivers to participant ConnectionHandles
//! ├── ConnectionActor (one per WebSocket connection)
//! │   └── demultiplexes inbound frames into registry operations
//! └── AttendanceDispatcher (bounded queue, single worker)
//! ```
//!
//! # Key Design Decisions
//!
//! - **Session exists iff occupied**: a session actor removes itself from the
//!   registry synchronously when its last participant leaves
//! - **Last writer wins**: a second join by the same identity replaces the
//!   participant record; the replaced connection can no longer evict it
//! - **Two-phase connections**: no session message is read before admission
//! - **Non-blocking fan-out**: outbound queues are bounded and never awaited
//!
//! # Modules
//!
//! - [`actors`] - Actor model implementation
//! - [`auth`] - Credential verification and admission
//! - [`config`] - Service configuration from environment
//! - [`errors`] - Error types with wire error codes
//! - [`observability`] - Health probes and Prometheus metrics
//! - [`protocol`] - Inbound and outbound wire messages
//! - [`services`] - LMS collaborator clients
//! - [`tasks`] - Background tasks
//! - [`transport`] - WebSocket transport and HTTP routes

pub mod actors;
pub mod auth;
pub mod config;
pub mod errors;
pub mod observability;
pub mod protocol;
pub mod services;
pub mod tasks;
pub mod transport;
