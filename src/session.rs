use crate::user::User;
use std::path::PathBuf;
use std::sync::Mutex;

/// The interpreter's single mutable record of who is logged in and where.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    /// `None` is the guest.
    pub user: Option<User>,
    /// Absolute working directory used by commands and child processes.
    pub working_dir: PathBuf,
}

impl Session {
    pub fn guest(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            user: None,
            working_dir: working_dir.into(),
        }
    }

    /// Identifier used for history records, `None` for the guest.
    pub fn actor_id(&self) -> Option<i64> {
        self.user.as_ref().map(|u| u.id)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session read before it was initialized")]
    Uninitialized,
    #[error("session lock poisoned")]
    Poisoned,
}

/// Accessor through which commands read and replace the session.
pub trait SessionStore: Send + Sync {
    fn get_session(&self) -> Result<Session, SessionError>;
    fn set_session(&self, session: Session) -> Result<(), SessionError>;
}

/// In-memory session slot guarded by a mutex.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    slot: Mutex<Option<Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store already seeded with `session`.
    pub fn with_session(session: Session) -> Self {
        Self {
            slot: Mutex::new(Some(session)),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn get_session(&self) -> Result<Session, SessionError> {
        let slot = self.slot.lock().map_err(|_| SessionError::Poisoned)?;
        slot.clone().ok_or(SessionError::Uninitialized)
    }

    fn set_session(&self, session: Session) -> Result<(), SessionError> {
        let mut slot = self.slot.lock().map_err(|_| SessionError::Poisoned)?;
        *slot = Some(session);
        Ok(())
    }
}
