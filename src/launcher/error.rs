//! Process launch error types

use thiserror::Error;

use super::request::LaunchState;
use crate::session::SessionError;

/// Result type for launch operations
pub type Result<T> = std::result::Result<T, LaunchError>;

/// Why a launch attempt failed
#[derive(Error, Debug)]
pub enum LaunchError {
    /// No active session exists to launch into
    #[error("No active session to launch into (requested: {requested:?})")]
    SessionNotFound {
        /// Session id the caller asked for, if any
        requested: Option<u32>,
    },

    /// Neither a user token nor a winlogon token could be found
    #[error("No logon token available for session {session_id}: {reason}")]
    NoLoggedOnUser {
        /// Target session
        session_id: u32,
        /// Underlying cause
        reason: String,
    },

    /// A token was found but could not be opened or duplicated
    #[error("Token duplication failed for session {session_id}: {reason}")]
    TokenDuplicationFailed {
        /// Target session
        session_id: u32,
        /// Underlying cause
        reason: String,
    },

    /// Anonymous pipes for stdio could not be set up
    #[error("Pipe setup failed: {0}")]
    PipeSetupFailed(String),

    /// `CreateProcessAsUserW` failed
    #[error("Failed to create process {command_line}: {reason}")]
    ProcessCreationFailed {
        /// Command line that was attempted
        command_line: String,
        /// Underlying cause
        reason: String,
    },

    /// Session table could not be read
    #[error("Session lookup failed: {0}")]
    Session(SessionError),

    /// Launching into another session needs Windows
    #[error("Process launch unsupported: {0}")]
    Unsupported(String),
}

/// Stable error kinds reported back to the control channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchErrorKind {
    /// See [`LaunchError::SessionNotFound`]
    SessionNotFound,
    /// See [`LaunchError::NoLoggedOnUser`]
    NoLoggedOnUser,
    /// See [`LaunchError::TokenDuplicationFailed`]
    TokenDuplicationFailed,
    /// See [`LaunchError::PipeSetupFailed`]
    PipeSetupFailed,
    /// See [`LaunchError::ProcessCreationFailed`]
    ProcessCreationFailed,
    /// Session table or platform problem
    Other,
}

impl LaunchError {
    /// Error kind for reporting
    pub fn kind(&self) -> LaunchErrorKind {
        match self {
            LaunchError::SessionNotFound { .. } => LaunchErrorKind::SessionNotFound,
            LaunchError::NoLoggedOnUser { .. } => LaunchErrorKind::NoLoggedOnUser,
            LaunchError::TokenDuplicationFailed { .. } => LaunchErrorKind::TokenDuplicationFailed,
            LaunchError::PipeSetupFailed(_) => LaunchErrorKind::PipeSetupFailed,
            LaunchError::ProcessCreationFailed { .. } => LaunchErrorKind::ProcessCreationFailed,
            LaunchError::Session(_) | LaunchError::Unsupported(_) => LaunchErrorKind::Other,
        }
    }

    /// State of the launch attempt at which this error occurred
    pub fn context(&self) -> LaunchState {
        match self {
            LaunchError::SessionNotFound { .. } | LaunchError::Session(_) => LaunchState::ResolveSession,
            LaunchError::NoLoggedOnUser { .. } | LaunchError::TokenDuplicationFailed { .. } => {
                LaunchState::AcquireToken
            }
            LaunchError::PipeSetupFailed(_) => LaunchState::PreparePipes,
            LaunchError::ProcessCreationFailed { .. } | LaunchError::Unsupported(_) => LaunchState::CreateProcess,
        }
    }

    /// Whether the caller may retry later with a chance of success
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LaunchError::SessionNotFound { .. } | LaunchError::NoLoggedOnUser { .. }
        )
    }
}

impl From<SessionError> for LaunchError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::SessionNotFound { requested } => LaunchError::SessionNotFound { requested },
            other => LaunchError::Session(other),
        }
    }
}
