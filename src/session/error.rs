//! Session resolution error types

use thiserror::Error;

/// Result type for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

/// Session module error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// No active session could be found at all
    #[error("No active session found (requested: {requested:?})")]
    SessionNotFound {
        /// Session id the caller asked for, if any
        requested: Option<u32>,
    },

    /// The named system process does not run in the session
    #[error("Process {name} not found in session {session_id}")]
    NoSuchProcess {
        /// Image name searched for
        name: String,
        /// Session searched
        session_id: u32,
    },

    /// Terminal Services API failure
    #[error("Terminal Services error: {0}")]
    Os(String),
}

impl SessionError {
    /// Whether retrying later may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SessionError::SessionNotFound { .. } | SessionError::NoSuchProcess { .. }
        )
    }
}

#[cfg(windows)]
impl From<windows::core::Error> for SessionError {
    fn from(e: windows::core::Error) -> Self {
        SessionError::Os(e.to_string())
    }
}
