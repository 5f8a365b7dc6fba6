//! Startup selection between the GDI and DXGI backends

use std::time::Duration;

use tracing::{info, warn};

use super::{CaptureBackendKind, DxgiCapturer, FrameSource, GdiCapturer, RawFrame, Result, ScreenDescriptor};

/// The capture backend chosen at startup
pub enum SystemBackend {
    /// GDI `BitBlt`
    Gdi(GdiCapturer),
    /// DXGI desktop duplication
    Dxgi(DxgiCapturer),
}

impl SystemBackend {
    /// Build the requested backend.
    ///
    /// `Auto` tries DXGI once and falls back to GDI when duplication cannot be
    /// set up (service session 0, RDP sessions, basic display driver).
    pub fn select(kind: CaptureBackendKind, acquire_timeout: Duration, settle_delay: Duration) -> Self {
        match kind {
            CaptureBackendKind::Gdi => SystemBackend::Gdi(GdiCapturer::new()),
            CaptureBackendKind::Dxgi => SystemBackend::Dxgi(DxgiCapturer::new(acquire_timeout, settle_delay)),
            CaptureBackendKind::Auto => {
                let mut dxgi = DxgiCapturer::new(acquire_timeout, settle_delay);
                match dxgi.initialize() {
                    Ok(()) => {
                        info!("Using DXGI desktop duplication");
                        SystemBackend::Dxgi(dxgi)
                    }
                    Err(e) => {
                        warn!("DXGI duplication unavailable ({}), falling back to GDI", e);
                        SystemBackend::Gdi(GdiCapturer::new())
                    }
                }
            }
        }
    }
}

impl FrameSource for SystemBackend {
    fn kind(&self) -> CaptureBackendKind {
        match self {
            SystemBackend::Gdi(b) => b.kind(),
            SystemBackend::Dxgi(b) => b.kind(),
        }
    }

    fn initialize(&mut self) -> Result<()> {
        match self {
            SystemBackend::Gdi(b) => b.initialize(),
            SystemBackend::Dxgi(b) => b.initialize(),
        }
    }

    fn screens(&self) -> Vec<ScreenDescriptor> {
        match self {
            SystemBackend::Gdi(b) => b.screens(),
            SystemBackend::Dxgi(b) => b.screens(),
        }
    }

    fn capture_screen(&mut self, screen: &ScreenDescriptor, draw_cursor: bool) -> Result<RawFrame> {
        match self {
            SystemBackend::Gdi(b) => b.capture_screen(screen, draw_cursor),
            SystemBackend::Dxgi(b) => b.capture_screen(screen, draw_cursor),
        }
    }
}
