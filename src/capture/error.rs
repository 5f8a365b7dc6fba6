//! Screen capture error types

use thiserror::Error;

/// Result type for capture operations
pub type Result<T> = std::result::Result<T, CaptureError>;

/// Capture module error types
#[derive(Error, Debug)]
pub enum CaptureError {
    /// Switching to or drawing on the input desktop failed
    #[error("Input desktop unavailable: {0}")]
    DesktopUnavailable(String),

    /// Outputs were added, removed or changed mode; backend must be rebuilt
    #[error("Display topology changed: {0}")]
    DisplayTopologyChanged(String),

    /// One frame was lost; the next attempt may succeed
    #[error("Transient capture failure: {0}")]
    Transient(String),

    /// No physical screen is available to capture
    #[error("No screens available for capture")]
    NoScreens,

    /// This backend cannot run in the current session (e.g. DXGI in session 0)
    #[error("Capture backend unsupported: {0}")]
    Unsupported(String),

    /// Frame encoding failed
    #[error("Frame encoding failed: {0}")]
    Encode(String),

    /// Frame buffer dimensions are inconsistent
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Other OS failure
    #[error("Capture OS error: {0}")]
    Os(String),
}

impl CaptureError {
    /// Whether the error only affects the current frame
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CaptureError::DesktopUnavailable(_)
                | CaptureError::DisplayTopologyChanged(_)
                | CaptureError::Transient(_)
        )
    }
}

impl From<image::ImageError> for CaptureError {
    fn from(e: image::ImageError) -> Self {
        CaptureError::Encode(e.to_string())
    }
}

#[cfg(windows)]
impl From<windows::core::Error> for CaptureError {
    fn from(e: windows::core::Error) -> Self {
        CaptureError::Os(e.to_string())
    }
}
