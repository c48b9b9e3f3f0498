//! `SessionRegistry` - authoritative map of live sessions.
//!
//! The registry is a cloneable handle shared by every connection actor.
//! It owns two maps, each behind a short async lock that is never held
//! across a collaborator call or a session round-trip:
//!
//! - `SessionId -> ManagedSession` (the session actors)
//! - `ConnectionId -> Association` (which session each connection is in)
//!
//! Membership itself lives in the session actors; the registry only routes.
//!
//! # Supervision
//!
//! Session actors run under child tokens of the registry's root token. A
//! session whose task finished without removing its entry (a panic) is
//! detected on the next `get_or_create` and replaced.

use super::connection::ConnectionHandle;
use super::messages::{JoinResult, LeaveOutcome, NewParticipant, RegistryStatus, SessionState};
use super::metrics::{ActorMetrics, ActorType};
use super::presence::PresenceEvent;
use super::session::{SessionActor, SessionActorHandle};
use crate::errors::ScError;
use crate::protocol::{ParticipantInfo, SignalKind};
use crate::services::access::SessionAccessChecker;
use crate::tasks::AttendanceDispatcher;
use common::types::{ConnectionId, SessionId, UserId};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Joins retried after racing with a closing session.
const MAX_JOIN_ATTEMPTS: u32 = 3;

/// Shared session directory. Session actors remove their own entry.
pub(crate) type SessionDirectory = Arc<RwLock<HashMap<SessionId, ManagedSession>>>;

/// A session actor plus its task handle.
pub(crate) struct ManagedSession {
    pub(crate) handle: SessionActorHandle,
    pub(crate) task_handle: JoinHandle<()>,
    pub(crate) generation: u64,
}

#[cfg(test)]
impl ManagedSession {
    /// Entry whose task never finishes, for tests that spawn actors directly.
    pub(crate) fn placeholder(handle: SessionActorHandle, generation: u64) -> Self {
        Self {
            handle,
            task_handle: tokio::spawn(std::future::pending::<()>()),
            generation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Association {
    session_id: SessionId,
    identity: UserId,
}

struct RegistryInner {
    sessions: SessionDirectory,
    associations: Mutex<HashMap<ConnectionId, Association>>,
    access: Arc<dyn SessionAccessChecker>,
    attendance: AttendanceDispatcher,
    metrics: Arc<ActorMetrics>,
    cancel_token: CancellationToken,
    next_generation: AtomicU64,
    shutting_down: AtomicBool,
}

/// Cloneable handle to the registry.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("shutting_down", &self.is_shutting_down())
            .finish_non_exhaustive()
    }
}

impl SessionRegistry {
    /// Create an empty registry.
    ///
    /// `cancel_token` is the root token; session and connection actors get
    /// child tokens.
    #[must_use]
    pub fn new(
        access: Arc<dyn SessionAccessChecker>,
        attendance: AttendanceDispatcher,
        metrics: Arc<ActorMetrics>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                sessions: Arc::new(RwLock::new(HashMap::new())),
                associations: Mutex::new(HashMap::new()),
                access,
                attendance,
                metrics,
                cancel_token,
                next_generation: AtomicU64::new(1),
                shutting_down: AtomicBool::new(false),
            }),
        }
    }

    #[must_use]
    pub fn metrics(&self) -> Arc<ActorMetrics> {
        Arc::clone(&self.inner.metrics)
    }

    /// Child token for a new connection.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.inner.cancel_token.child_token()
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::SeqCst)
    }

    /// Admit `participant` into `session_id`, creating the session if absent.
    ///
    /// The participant list is delivered to the joiner and the newcomer is
    /// announced to everyone else before this returns.
    ///
    /// # Errors
    ///
    /// - `AccessDenied` if the access check says no
    /// - `AccessCheck` if the access check itself fails
    /// - `ShuttingDown` during shutdown
    pub async fn join(
        &self,
        session_id: &SessionId,
        participant: NewParticipant,
        connection: &ConnectionHandle,
    ) -> Result<JoinResult, ScError> {
        if self.is_shutting_down() {
            return Err(ScError::ShuttingDown);
        }

        match self
            .inner
            .access
            .check_session_access(&participant.identity, session_id)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                info!(
                    target: "sc.registry",
                    session_id = %session_id,
                    identity = %participant.identity,
                    "Session access denied"
                );
                return Err(ScError::AccessDenied(session_id.to_string()));
            }
            Err(e) => {
                warn!(
                    target: "sc.registry",
                    session_id = %session_id,
                    identity = %participant.identity,
                    error = %e,
                    "Session access check failed"
                );
                return Err(match e {
                    ScError::AccessCheck(_) => e,
                    other => ScError::AccessCheck(other.to_string()),
                });
            }
        }

        let connection_id = connection.connection_id();
        let previous = self
            .inner
            .associations
            .lock()
            .await
            .get(&connection_id)
            .cloned();
        if let Some(previous) = previous {
            if previous.session_id != *session_id {
                debug!(
                    target: "sc.registry",
                    connection_id = %connection_id,
                    from_session = %previous.session_id,
                    to_session = %session_id,
                    "Connection switching sessions"
                );
                self.leave_connection(connection_id, &previous.session_id)
                    .await;
            }
        }

        let mut attempt = 0;
        let result = loop {
            attempt += 1;
            let handle = self.get_or_create(session_id).await?;
            match handle.join(participant.clone(), connection.clone()).await {
                Ok(result) => break result,
                Err(ScError::SessionClosed(_)) if attempt < MAX_JOIN_ATTEMPTS => {
                    debug!(
                        target: "sc.registry",
                        session_id = %session_id,
                        attempt,
                        "Join raced with session closure, retrying"
                    );
                }
                Err(ScError::SessionClosed(id)) => {
                    return Err(ScError::Internal(format!(
                        "session {id} kept closing during join"
                    )));
                }
                Err(e) => return Err(e),
            }
        };

        self.inner.associations.lock().await.insert(
            connection_id,
            Association {
                session_id: session_id.clone(),
                identity: participant.identity,
            },
        );

        Ok(result)
    }

    /// Remove `identity` from `session_id` regardless of which connection
    /// owns the record. Absent sessions and participants are a no-op.
    pub async fn leave(&self, session_id: &SessionId, identity: &UserId) -> LeaveOutcome {
        self.inner
            .associations
            .lock()
            .await
            .retain(|_, a| !(a.session_id == *session_id && a.identity == *identity));

        let Some(handle) = self.live_handle(session_id).await else {
            return LeaveOutcome::NotPresent;
        };
        handle.leave(identity.clone(), None).await
    }

    /// Leave requested by a connection. Only removes the participant if the
    /// connection still owns the record.
    pub async fn leave_connection(
        &self,
        connection_id: ConnectionId,
        session_id: &SessionId,
    ) -> LeaveOutcome {
        let association = {
            let mut associations = self.inner.associations.lock().await;
            match associations.get(&connection_id) {
                Some(a) if a.session_id == *session_id => associations.remove(&connection_id),
                _ => None,
            }
        };
        let Some(association) = association else {
            return LeaveOutcome::NotPresent;
        };

        let Some(handle) = self.live_handle(session_id).await else {
            return LeaveOutcome::NotPresent;
        };
        handle
            .leave(association.identity, Some(connection_id))
            .await
    }

    /// Clean up after a closed connection. Safe to call more than once.
    pub async fn handle_disconnection(&self, connection_id: ConnectionId) {
        let association = self.inner.associations.lock().await.remove(&connection_id);
        let Some(association) = association else {
            return;
        };

        let Some(handle) = self.live_handle(&association.session_id).await else {
            return;
        };
        let outcome = handle
            .leave(association.identity.clone(), Some(connection_id))
            .await;

        debug!(
            target: "sc.registry",
            connection_id = %connection_id,
            session_id = %association.session_id,
            identity = %association.identity,
            outcome = ?outcome,
            "Disconnection cleaned up"
        );
    }

    /// Forward a negotiation payload inside a session.
    ///
    /// Only the connection currently recorded for the sender's identity may
    /// relay; a superseded connection gets `NotParticipant`.
    pub async fn relay(
        &self,
        session_id: &SessionId,
        sender: &ConnectionHandle,
        target: &UserId,
        kind: SignalKind,
        payload: Value,
    ) -> Result<(), ScError> {
        self.require(session_id)
            .await?
            .relay(
                sender.identity().clone(),
                sender.connection_id(),
                target.clone(),
                kind,
                payload,
            )
            .await
    }

    /// Apply a presence event and fan it out to the other participants.
    pub async fn publish(
        &self,
        session_id: &SessionId,
        sender: &ConnectionHandle,
        event: PresenceEvent,
    ) -> Result<(), ScError> {
        self.require(session_id)
            .await?
            .publish(sender.identity().clone(), sender.connection_id(), event)
            .await
    }

    /// Participants of a session, ordered by join time.
    pub async fn get_participants(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<ParticipantInfo>, ScError> {
        Ok(self.get_session_state(session_id).await?.participants)
    }

    pub async fn get_session_state(&self, session_id: &SessionId) -> Result<SessionState, ScError> {
        self.require(session_id).await?.get_state().await
    }

    pub async fn status(&self) -> RegistryStatus {
        let session_count = self.inner.sessions.read().await.len();
        RegistryStatus {
            session_count,
            connection_count: self.inner.metrics.connection_count(),
            participant_count: self.inner.metrics.participant_count(),
            is_shutting_down: self.is_shutting_down(),
        }
    }

    /// Stop every session actor and wait for them up to `deadline` each.
    pub async fn shutdown(&self, deadline: Duration) {
        self.inner.shutting_down.store(true, Ordering::SeqCst);

        let sessions: Vec<(SessionId, ManagedSession)> =
            self.inner.sessions.write().await.drain().collect();

        info!(
            target: "sc.registry",
            session_count = sessions.len(),
            "Shutting down session registry"
        );

        for (_, managed) in &sessions {
            managed.handle.cancel();
        }
        self.inner.cancel_token.cancel();

        for (session_id, managed) in sessions {
            match tokio::time::timeout(deadline, managed.task_handle).await {
                Ok(Ok(())) => {
                    debug!(
                        target: "sc.registry",
                        session_id = %session_id,
                        "Session actor completed cleanly"
                    );
                }
                Ok(Err(e)) => {
                    warn!(
                        target: "sc.registry",
                        session_id = %session_id,
                        error = ?e,
                        "Session actor task panicked during shutdown"
                    );
                }
                Err(_) => {
                    warn!(
                        target: "sc.registry",
                        session_id = %session_id,
                        "Session actor shutdown timed out"
                    );
                }
            }
        }

        self.inner.associations.lock().await.clear();
        info!(target: "sc.registry", "Session registry shut down");
    }

    async fn require(&self, session_id: &SessionId) -> Result<SessionActorHandle, ScError> {
        self.live_handle(session_id)
            .await
            .ok_or_else(|| ScError::SessionNotFound(session_id.to_string()))
    }

    async fn live_handle(&self, session_id: &SessionId) -> Option<SessionActorHandle> {
        self.inner
            .sessions
            .read()
            .await
            .get(session_id)
            .filter(|managed| !managed.task_handle.is_finished())
            .map(|managed| managed.handle.clone())
    }

    async fn get_or_create(&self, session_id: &SessionId) -> Result<SessionActorHandle, ScError> {
        let mut sessions = self.inner.sessions.write().await;

        if self.is_shutting_down() {
            return Err(ScError::ShuttingDown);
        }

        if let Some(managed) = sessions.get(session_id) {
            if !managed.task_handle.is_finished() {
                return Ok(managed.handle.clone());
            }
        }

        if let Some(dead) = sessions.remove(session_id) {
            warn!(
                target: "sc.registry",
                session_id = %session_id,
                "Session actor task finished unexpectedly"
            );
            if let Err(join_error) = dead.task_handle.await {
                if join_error.is_panic() {
                    error!(
                        target: "sc.registry",
                        session_id = %session_id,
                        error = ?join_error,
                        "Session actor panicked, replacing"
                    );
                    self.inner.metrics.record_panic(ActorType::Session);
                }
                self.inner.metrics.session_removed();
            }
        }

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let (handle, task_handle) = SessionActor::spawn(
            session_id.clone(),
            generation,
            Arc::clone(&self.inner.sessions),
            self.inner.attendance.clone(),
            Arc::clone(&self.inner.metrics),
            self.inner.cancel_token.child_token(),
        );
        sessions.insert(
            session_id.clone(),
            ManagedSession {
                handle: handle.clone(),
                task_handle,
                generation,
            },
        );

        info!(
            target: "sc.registry",
            session_id = %session_id,
            generation,
            session_count = sessions.len(),
            "Session created"
        );

        Ok(handle)
    }
}
