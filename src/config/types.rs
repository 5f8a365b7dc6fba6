//! Configuration type definitions

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::capture::{CaptureBackendKind, DEFAULT_QUALITY};
use crate::input::DEFAULT_WORKERS;
use crate::launcher::DEFAULT_DESKTOP;

fn default_true() -> bool {
    true
}

fn default_quality() -> u8 {
    DEFAULT_QUALITY
}

fn default_acquire_timeout_ms() -> u64 {
    100
}

fn default_settle_delay_ms() -> u64 {
    1
}

fn default_thumbnail_width() -> u32 {
    320
}

fn default_thumbnail_height() -> u32 {
    180
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_desktop() -> String {
    DEFAULT_DESKTOP.to_string()
}

fn default_level() -> String {
    "info".to_string()
}

/// Screen capture configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Capture backend ("gdi", "dxgi", "auto")
    #[serde(default)]
    pub backend: CaptureBackendKind,

    /// Initial JPEG quality for new viewers (1-100)
    #[serde(default = "default_quality")]
    pub quality: u8,

    /// Draw the cursor into frames by default
    #[serde(default = "default_true")]
    pub draw_cursor: bool,

    /// Longest a DXGI frame acquisition may block
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,

    /// Pause before each DXGI acquisition
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Thumbnail bounding box width
    #[serde(default = "default_thumbnail_width")]
    pub thumbnail_width: u32,

    /// Thumbnail bounding box height
    #[serde(default = "default_thumbnail_height")]
    pub thumbnail_height: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            backend: CaptureBackendKind::default(),
            quality: default_quality(),
            draw_cursor: true,
            acquire_timeout_ms: default_acquire_timeout_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            thumbnail_width: default_thumbnail_width(),
            thumbnail_height: default_thumbnail_height(),
        }
    }
}

/// Input injection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputConfig {
    /// Worker threads executing queued input
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Accept remote input at startup (false = view-only)
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            enabled: true,
        }
    }
}

/// Process launcher configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LauncherConfig {
    /// Desktop inside `winsta0` for launched processes
    #[serde(default = "default_desktop")]
    pub desktop: String,

    /// Launch without a console window
    #[serde(default = "default_true")]
    pub hidden_window: bool,

    /// Redirect the child's stdio through pipes
    #[serde(default = "default_true")]
    pub redirect_streams: bool,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            desktop: default_desktop(),
            hidden_window: true,
            redirect_streams: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level ("trace", "debug", "info", "warn", "error")
    #[serde(default = "default_level")]
    pub level: String,

    /// Also write logs to this file
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            log_file: None,
        }
    }
}
