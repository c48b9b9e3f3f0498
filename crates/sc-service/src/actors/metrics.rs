//! Actor metrics and mailbox monitoring.
//!
//! | Actor Type | Normal | Warning | Critical |
//! |------------|--------|---------|----------|
//! | Session    | < 100  | 100-500 | > 500    |
//! | Connection | < 32   | 32-128  | > 128    |
//!
//! [`ActorMetrics`] keeps in-process population counters and mirrors them
//! into the `sc_*_active` Prometheus gauges on every change.

use crate::observability::metrics as prom;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

pub const SESSION_MAILBOX_NORMAL: usize = 100;
pub const SESSION_MAILBOX_WARNING: usize = 500;

pub const CONNECTION_MAILBOX_NORMAL: usize = 32;
pub const CONNECTION_MAILBOX_WARNING: usize = 128;

/// Actor type for metrics labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorType {
    /// `SessionActor` (one per live session).
    Session,
    /// `ConnectionActor` (one per WebSocket connection).
    Connection,
}

impl ActorType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ActorType::Session => "session",
            ActorType::Connection => "connection",
        }
    }

    #[must_use]
    pub const fn normal_threshold(&self) -> usize {
        match self {
            ActorType::Session => SESSION_MAILBOX_NORMAL,
            ActorType::Connection => CONNECTION_MAILBOX_NORMAL,
        }
    }

    #[must_use]
    pub const fn warning_threshold(&self) -> usize {
        match self {
            ActorType::Session => SESSION_MAILBOX_WARNING,
            ActorType::Connection => CONNECTION_MAILBOX_WARNING,
        }
    }
}

/// Mailbox depth level for alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxLevel {
    Normal,
    Warning,
    Critical,
}

/// Tracks queue depth of one actor mailbox.
///
/// Senders call [`record_enqueue`](Self::record_enqueue) after a successful
/// send; the actor calls [`record_dequeue`](Self::record_dequeue) per message.
#[derive(Debug)]
pub struct MailboxMonitor {
    actor_type: ActorType,
    actor_id: String,
    depth: AtomicUsize,
    peak_depth: AtomicUsize,
    messages_processed: AtomicU64,
}

impl MailboxMonitor {
    #[must_use]
    pub fn new(actor_type: ActorType, actor_id: impl Into<String>) -> Self {
        Self {
            actor_type,
            actor_id: actor_id.into(),
            depth: AtomicUsize::new(0),
            peak_depth: AtomicUsize::new(0),
            messages_processed: AtomicU64::new(0),
        }
    }

    pub fn record_enqueue(&self) {
        let new_depth = self.depth.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_depth.fetch_max(new_depth, Ordering::Relaxed);

        match self.level_for_depth(new_depth) {
            MailboxLevel::Critical => warn!(
                target: "sc.actor.mailbox",
                actor_type = self.actor_type.as_str(),
                actor_id = %self.actor_id,
                depth = new_depth,
                threshold = self.actor_type.warning_threshold(),
                "Mailbox depth critical"
            ),
            // Log once when crossing into the warning band
            MailboxLevel::Warning if new_depth == self.actor_type.normal_threshold() + 1 => {
                debug!(
                    target: "sc.actor.mailbox",
                    actor_type = self.actor_type.as_str(),
                    actor_id = %self.actor_id,
                    depth = new_depth,
                    "Mailbox depth elevated"
                );
            }
            _ => {}
        }
    }

    pub fn record_dequeue(&self) {
        // Saturating: a message sent before the monitor existed must not wrap.
        let _ = self
            .depth
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |d| {
                Some(d.saturating_sub(1))
            });
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
        prom::set_actor_mailbox_depth(self.actor_type.as_str(), self.current_depth());
    }

    #[must_use]
    pub fn current_depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn peak_depth(&self) -> usize {
        self.peak_depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn messages_processed(&self) -> u64 {
        self.messages_processed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn current_level(&self) -> MailboxLevel {
        self.level_for_depth(self.current_depth())
    }

    fn level_for_depth(&self, depth: usize) -> MailboxLevel {
        if depth > self.actor_type.warning_threshold() {
            MailboxLevel::Critical
        } else if depth > self.actor_type.normal_threshold() {
            MailboxLevel::Warning
        } else {
            MailboxLevel::Normal
        }
    }
}

/// Aggregated population counters for the actor system.
#[derive(Debug, Default)]
pub struct ActorMetrics {
    active_sessions: AtomicUsize,
    active_connections: AtomicUsize,
    active_participants: AtomicUsize,
    actor_panics: AtomicU64,
    messages_processed: AtomicU64,
}

/// Point-in-time copy of [`ActorMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActorMetricsSnapshot {
    pub sessions: usize,
    pub connections: usize,
    pub participants: usize,
    pub actor_panics: u64,
    pub messages_processed: u64,
}

impl ActorMetrics {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn session_created(&self) {
        let count = self.active_sessions.fetch_add(1, Ordering::Relaxed) + 1;
        prom::set_sessions_active(count as u64);
    }

    pub fn session_removed(&self) {
        let count = decrement(&self.active_sessions);
        prom::set_sessions_active(count as u64);
    }

    pub fn connection_opened(&self) {
        let count = self.active_connections.fetch_add(1, Ordering::Relaxed) + 1;
        prom::set_connections_active(count as u64);
    }

    pub fn connection_closed(&self) {
        let count = decrement(&self.active_connections);
        prom::set_connections_active(count as u64);
    }

    pub fn participant_added(&self) {
        let count = self.active_participants.fetch_add(1, Ordering::Relaxed) + 1;
        prom::set_participants_active(count as u64);
    }

    /// Remove `n` participant records (a whole session on shutdown).
    pub fn participants_removed(&self, n: usize) {
        let mut remaining = 0;
        let _ = self
            .active_participants
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |c| {
                remaining = c.saturating_sub(n);
                Some(remaining)
            });
        prom::set_participants_active(remaining as u64);
    }

    pub fn record_panic(&self, actor_type: ActorType) {
        self.actor_panics.fetch_add(1, Ordering::Relaxed);
        prom::record_actor_panic(actor_type.as_str());
        tracing::error!(
            target: "sc.actor.panic",
            actor_type = actor_type.as_str(),
            total_panics = self.actor_panics.load(Ordering::Relaxed),
            "Actor panic detected - indicates bug, investigation required"
        );
    }

    pub fn record_message_processed(&self) {
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.active_sessions.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn participant_count(&self) -> usize {
        self.active_participants.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn snapshot(&self) -> ActorMetricsSnapshot {
        ActorMetricsSnapshot {
            sessions: self.session_count(),
            connections: self.connection_count(),
            participants: self.participant_count(),
            actor_panics: self.actor_panics.load(Ordering::Relaxed),
            messages_processed: self.messages_processed.load(Ordering::Relaxed),
        }
    }
}

fn decrement(counter: &AtomicUsize) -> usize {
    let mut remaining = 0;
    let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |c| {
        remaining = c.saturating_sub(1);
        Some(remaining)
    });
    remaining
}
