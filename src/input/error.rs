//! Input Injection Error Types

use thiserror::Error;

/// Result type for input operations
pub type Result<T> = std::result::Result<T, InputError>;

/// Input module error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    /// The OS rejected a synthetic event (e.g. blocked by UIPI)
    #[error("Input injection failed: {0}")]
    InjectionFailed(String),

    /// Mouse button code outside 0..=2
    #[error("Unknown mouse button code: {0}")]
    UnknownButton(u8),

    /// Screen geometry unusable for coordinate mapping
    #[error("Invalid monitor configuration: {0}")]
    InvalidMonitorConfig(String),

    /// A worker thread could not be started
    #[error("Failed to spawn input worker: {0}")]
    WorkerSpawn(String),

    /// Injector has been stopped
    #[error("Input injector stopped")]
    Stopped,

    /// Injection is not available on this platform
    #[error("Input injection unsupported: {0}")]
    Unsupported(String),
}

impl InputError {
    /// Whether a later attempt at the same operation can succeed
    pub fn is_recoverable(&self) -> bool {
        classify_error(self) == ErrorType::Injection && !matches!(self, InputError::Unsupported(_))
    }
}

#[cfg(windows)]
impl From<windows::core::Error> for InputError {
    fn from(e: windows::core::Error) -> Self {
        InputError::InjectionFailed(e.message())
    }
}

/// Error classification for recovery strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
    /// OS rejected the event
    Injection,
    /// Bad caller-supplied data
    Request,
    /// Injector lifecycle
    Lifecycle,
}

/// Classify an error for logging and recovery decisions
pub fn classify_error(error: &InputError) -> ErrorType {
    match error {
        InputError::InjectionFailed(_) | InputError::Unsupported(_) => ErrorType::Injection,
        InputError::UnknownButton(_) | InputError::InvalidMonitorConfig(_) => ErrorType::Request,
        InputError::WorkerSpawn(_) | InputError::Stopped => ErrorType::Lifecycle,
    }
}
