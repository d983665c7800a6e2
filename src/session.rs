use crate::{
    error::SessionError,
    types::{Attribute, SessionId},
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;
use uuid::Uuid;

#[derive(Clone, Eq, PartialEq, Debug)]
enum SessionState {
    Inactive,
    Active(ActiveSession),
    /// End was requested; the final flush is still running.
    Ending(ActiveSession),
}

/// Identity and attributes of the running session.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct ActiveSession {
    pub id: SessionId,
    /// Attributes given at start, merged into every event of the session
    pub attributes: Arc<[Attribute]>,
}

#[derive(Debug)]
struct Inner {
    state: SessionState,
    /// Identifier to use for the next session, see
    /// [`SessionController::set_session_id`]
    assigned_id: Option<SessionId>,
}

/// Owns the session identity and gates event recording.
///
/// At most one session is active at a time. Starting while a session is
/// active (or still ending) is rejected.
#[derive(Debug)]
pub struct SessionController {
    managed: bool,
    inner: Mutex<Inner>,
}

impl SessionController {
    /// With `managed` set, identifiers are always generated and can't be
    /// assigned by callers.
    pub fn new(managed: bool) -> Self {
        Self {
            managed,
            inner: Mutex::new(Inner {
                state: SessionState::Inactive,
                assigned_id: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn start(&self, attributes: Vec<Attribute>) -> Result<SessionId, SessionError> {
        let mut inner = self.lock();
        match &inner.state {
            SessionState::Active(s) | SessionState::Ending(s) => {
                Err(SessionError::AlreadyActive(s.id.clone()))
            }
            SessionState::Inactive => {
                let id = inner
                    .assigned_id
                    .take()
                    .unwrap_or_else(|| Uuid::new_v4().to_string());
                debug!(session_id = %id, "Session started");
                inner.state = SessionState::Active(ActiveSession {
                    id: id.clone(),
                    attributes: attributes.into(),
                });
                Ok(id)
            }
        }
    }

    /// Marks the active session as ending. Events are no longer accepted,
    /// but the identifier stays readable until [`SessionController::finish_end`].
    pub fn begin_end(&self) -> Result<SessionId, SessionError> {
        let mut inner = self.lock();
        match std::mem::replace(&mut inner.state, SessionState::Inactive) {
            SessionState::Active(s) => {
                let id = s.id.clone();
                inner.state = SessionState::Ending(s);
                Ok(id)
            }
            other => {
                inner.state = other;
                Err(SessionError::NotActive)
            }
        }
    }

    /// Clears an ending session.
    pub fn finish_end(&self) {
        let mut inner = self.lock();
        if let SessionState::Ending(s) = &inner.state {
            debug!(session_id = %s.id, "Session ended");
            inner.state = SessionState::Inactive;
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.lock().state, SessionState::Active(_))
    }

    /// The active session, if events may currently be recorded.
    pub fn active(&self) -> Option<ActiveSession> {
        match &self.lock().state {
            SessionState::Active(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// The current identifier, or an empty string when there is no session.
    pub fn session_id(&self) -> SessionId {
        match &self.lock().state {
            SessionState::Active(s) | SessionState::Ending(s) => s.id.clone(),
            SessionState::Inactive => SessionId::new(),
        }
    }

    /// Assigns the identifier of the next session.
    ///
    /// Only permitted for unmanaged controllers while no session is running.
    pub fn set_session_id(&self, id: SessionId) -> Result<(), SessionError> {
        if self.managed {
            return Err(SessionError::ManagedAutomatically);
        }
        let mut inner = self.lock();
        match &inner.state {
            SessionState::Active(s) | SessionState::Ending(s) => {
                Err(SessionError::AlreadyActive(s.id.clone()))
            }
            SessionState::Inactive => {
                inner.assigned_id = Some(id);
                Ok(())
            }
        }
    }
}
