//! Actor model for the signaling coordinator.
//!
//! ```text
//! SessionRegistry (cloneable handle, owns the session directory)
//! ├── SessionActor (one per live session)
//! │   └── participant records + outbound ConnectionHandles
//! └── ConnectionActor (one per WebSocket, parses and routes inbound frames)
//! ```
//!
//! Every session mutation goes through the owning `SessionActor`'s mailbox.
//! Cancellation flows from the registry's root token to every session and
//! connection actor.

pub mod connection;
pub mod messages;
pub mod metrics;
pub mod presence;
pub mod registry;
pub mod session;

pub use connection::{ConnectionActor, ConnectionActorHandle, ConnectionHandle};
pub use messages::{JoinResult, LeaveOutcome, NewParticipant, RegistryStatus, SessionState};
pub use metrics::{ActorMetrics, ActorMetricsSnapshot, ActorType, MailboxLevel, MailboxMonitor};
pub use presence::PresenceEvent;
pub use registry::SessionRegistry;
pub use session::SessionActorHandle;
