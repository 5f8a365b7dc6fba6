//! Configuration management
//!
//! Handles loading, validation, and merging of configuration from:
//! - TOML files
//! - CLI arguments

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub mod types;

pub use types::{CaptureConfig, InputConfig, LauncherConfig, LoggingConfig};

use crate::capture::CaptureBackendKind;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Screen capture configuration
    #[serde(default)]
    pub capture: CaptureConfig,
    /// Input injection configuration
    #[serde(default)]
    pub input: InputConfig,
    /// Process launcher configuration
    #[serde(default)]
    pub launcher: LauncherConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where a loaded configuration came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// Read from the file
    File,
    /// File absent; built-in defaults
    Defaults,
}

impl Config {
    /// Load configuration from file; a missing file yields the defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_with_source(path).map(|(config, _)| config)
    }

    /// Like [`Config::load`], also reporting whether the file existed.
    ///
    /// Nothing is logged here: the logging level and file come from the
    /// result, so the caller reports the source once its subscriber is up.
    pub fn load_with_source(path: impl AsRef<Path>) -> Result<(Self, ConfigSource)> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok((Self::default_config(), ConfigSource::Defaults));
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;

        config.validate()?;
        Ok((config, ConfigSource::File))
    }

    /// Create default configuration
    pub fn default_config() -> Self {
        Config {
            capture: CaptureConfig::default(),
            input: InputConfig::default(),
            launcher: LauncherConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.capture.quality) {
            anyhow::bail!("Invalid JPEG quality: {} (expected 1-100)", self.capture.quality);
        }

        if self.capture.acquire_timeout_ms == 0 || self.capture.acquire_timeout_ms > 5_000 {
            anyhow::bail!(
                "acquire_timeout_ms ({}) must be between 1 and 5000",
                self.capture.acquire_timeout_ms
            );
        }

        if self.capture.thumbnail_width == 0 || self.capture.thumbnail_height == 0 {
            anyhow::bail!(
                "Invalid thumbnail size: {}x{}",
                self.capture.thumbnail_width,
                self.capture.thumbnail_height
            );
        }

        if self.input.workers == 0 {
            anyhow::bail!("input.workers must be at least 1");
        }

        // the desktop is joined onto "winsta0\"
        if self.launcher.desktop.is_empty() || self.launcher.desktop.contains('\\') {
            anyhow::bail!("Invalid launcher desktop: {:?}", self.launcher.desktop);
        }

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            anyhow::bail!("Invalid log level: {}", self.logging.level);
        }

        Ok(())
    }

    /// Override config with CLI arguments
    pub fn with_overrides(mut self, backend: Option<CaptureBackendKind>, quality: Option<u8>) -> Self {
        if let Some(backend) = backend {
            self.capture.backend = backend;
        }
        if let Some(quality) = quality {
            self.capture.quality = quality.clamp(1, 100);
        }
        self
    }

    /// DXGI acquisition timeout
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.capture.acquire_timeout_ms)
    }

    /// Pause before each DXGI acquisition
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.capture.settle_delay_ms)
    }
}
