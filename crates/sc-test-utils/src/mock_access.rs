//! Mock access checker.
//!
//! # Example
//!
//! ```rust,ignore
//! use sc_test_utils::MockAccessChecker;
//!
//! let access = MockAccessChecker::allowing().deny_session("locked-room");
//! ```

use async_trait::async_trait;
use common::types::{SessionId, UserId};
use sc_service::errors::ScError;
use sc_service::services::access::SessionAccessChecker;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccessMode {
    Allow,
    Deny,
    Fail,
}

/// Access checker with a configurable answer.
#[derive(Debug)]
pub struct MockAccessChecker {
    mode: AccessMode,
    denied_sessions: HashSet<SessionId>,
    denied_users: HashSet<UserId>,
    calls: AtomicUsize,
    last_call: Mutex<Option<(UserId, SessionId)>>,
}

impl MockAccessChecker {
    fn with_mode(mode: AccessMode) -> Self {
        Self {
            mode,
            denied_sessions: HashSet::new(),
            denied_users: HashSet::new(),
            calls: AtomicUsize::new(0),
            last_call: Mutex::new(None),
        }
    }

    /// Grants every request.
    #[must_use]
    pub fn allowing() -> Self {
        Self::with_mode(AccessMode::Allow)
    }

    /// Denies every request.
    #[must_use]
    pub fn denying() -> Self {
        Self::with_mode(AccessMode::Deny)
    }

    /// Fails every request as if the LMS were unreachable.
    #[must_use]
    pub fn failing() -> Self {
        Self::with_mode(AccessMode::Fail)
    }

    /// Deny one session while allowing the rest.
    #[must_use]
    pub fn deny_session(mut self, session_id: &str) -> Self {
        self.denied_sessions.insert(SessionId::new(session_id));
        self
    }

    /// Deny one user everywhere.
    #[must_use]
    pub fn deny_user(mut self, identity: &str) -> Self {
        self.denied_users.insert(UserId::new(identity));
        self
    }

    /// Number of access checks performed.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Arguments of the most recent check.
    #[must_use]
    pub fn last_call(&self) -> Option<(UserId, SessionId)> {
        self.last_call.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionAccessChecker for MockAccessChecker {
    async fn check_session_access(
        &self,
        identity: &UserId,
        session_id: &SessionId,
    ) -> Result<bool, ScError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_call.lock().unwrap() = Some((identity.clone(), session_id.clone()));

        match self.mode {
            AccessMode::Fail => Err(ScError::AccessCheck("mock LMS unavailable".to_string())),
            AccessMode::Deny => Ok(false),
            AccessMode::Allow => Ok(!self.denied_sessions.contains(session_id)
                && !self.denied_users.contains(identity)),
        }
    }
}
