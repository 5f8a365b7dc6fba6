//! GDI capture backend
//!
//! One memory DC with one DIB section, reused across frames and resized only
//! when the requested screen size differs from the cached one. Each frame is
//! a `BitBlt` from the screen DC of the calling thread's desktop, which is why
//! the service switches to the input desktop before every call. GDI sees the
//! desktop after rotation, so every screen reports [`Rotation::Identity`].

use std::mem::size_of;

use tracing::{debug, trace};
use windows::core::BOOL;
use windows::Win32::Foundation::{LPARAM, RECT};
use windows::Win32::Graphics::Gdi::{
    BitBlt, EnumDisplayMonitors, GetMonitorInfoW, CAPTUREBLT, HDC, HMONITOR, MONITORINFO, MONITORINFOEXW,
    MONITORINFOF_PRIMARY, ROP_CODE, SRCCOPY,
};

use super::surface::{OffscreenSurface, ScreenDc};
use super::{CaptureBackendKind, CaptureError, FrameSource, RawFrame, Result, Rotation, ScreenDescriptor, ScreenRect};
use crate::cursor::CursorOverlay;

/// `BitBlt`-based capturer
pub struct GdiCapturer {
    screens: Vec<ScreenDescriptor>,
    surface: Option<OffscreenSurface>,
    cursor: CursorOverlay,
}

// SAFETY: GDI handles are process-wide; CaptureService serializes all access
// to the capturer under its backend lock.
unsafe impl Send for GdiCapturer {}

impl GdiCapturer {
    /// Create an uninitialized capturer
    pub fn new() -> Self {
        Self {
            screens: Vec::new(),
            surface: None,
            cursor: CursorOverlay::new(),
        }
    }

    fn surface_for(&mut self, width: u32, height: u32) -> Result<&OffscreenSurface> {
        if !self.surface.as_ref().is_some_and(|s| s.matches(width, height)) {
            trace!(width, height, "Resizing GDI capture surface");
            // release the old DIB before allocating the new one
            self.surface = None;
            self.surface = Some(OffscreenSurface::new(width, height)?);
        }
        self.surface
            .as_ref()
            .ok_or_else(|| CaptureError::Os("capture surface missing".into()))
    }
}

impl Default for GdiCapturer {
    fn default() -> Self {
        Self::new()
    }
}

unsafe extern "system" fn collect_monitor(monitor: HMONITOR, _hdc: HDC, _clip: *mut RECT, data: LPARAM) -> BOOL {
    // SAFETY: data is the &mut Vec passed to EnumDisplayMonitors below, alive for the whole enumeration.
    let screens = unsafe { &mut *(data.0 as *mut Vec<ScreenDescriptor>) };

    let mut info = MONITORINFOEXW::default();
    info.monitorInfo.cbSize = size_of::<MONITORINFOEXW>() as u32;
    // SAFETY: MONITORINFOEXW starts with MONITORINFO and cbSize announces the extended layout.
    let ok = unsafe { GetMonitorInfoW(monitor, &mut info.monitorInfo as *mut MONITORINFO) };
    if !ok.as_bool() {
        // keep enumerating
        return BOOL(1);
    }

    let rc = info.monitorInfo.rcMonitor;
    let len = info.szDevice.iter().position(|&c| c == 0).unwrap_or(info.szDevice.len());
    screens.push(ScreenDescriptor {
        name: String::from_utf16_lossy(&info.szDevice[..len]),
        is_primary: info.monitorInfo.dwFlags & MONITORINFOF_PRIMARY != 0,
        bounds: ScreenRect::new(rc.left, rc.top, (rc.right - rc.left) as u32, (rc.bottom - rc.top) as u32),
        rotation: Rotation::Identity,
    });
    BOOL(1)
}

impl FrameSource for GdiCapturer {
    fn kind(&self) -> CaptureBackendKind {
        CaptureBackendKind::Gdi
    }

    fn initialize(&mut self) -> Result<()> {
        self.surface = None;

        let mut screens: Vec<ScreenDescriptor> = Vec::new();
        // SAFETY: the callback only dereferences `screens` during this call.
        let ok = unsafe {
            EnumDisplayMonitors(
                None,
                None,
                Some(collect_monitor),
                LPARAM(&mut screens as *mut Vec<ScreenDescriptor> as isize),
            )
        };
        if !ok.as_bool() {
            return Err(CaptureError::Os("EnumDisplayMonitors failed".into()));
        }

        debug!(count = screens.len(), "GDI enumerated monitors");
        self.screens = screens;
        Ok(())
    }

    fn screens(&self) -> Vec<ScreenDescriptor> {
        self.screens.clone()
    }

    fn capture_screen(&mut self, screen: &ScreenDescriptor, draw_cursor: bool) -> Result<RawFrame> {
        let bounds = screen.bounds;
        let screen_dc = ScreenDc::acquire()?;
        let target = self.surface_for(bounds.width, bounds.height)?.dc;

        // SAFETY: both DCs are valid; the blit stays within the surface size.
        unsafe {
            BitBlt(
                target,
                0,
                0,
                bounds.width as i32,
                bounds.height as i32,
                Some(screen_dc.0),
                bounds.x,
                bounds.y,
                ROP_CODE(SRCCOPY.0 | CAPTUREBLT.0),
            )
        }
        .map_err(|e| CaptureError::DesktopUnavailable(format!("BitBlt failed: {e}")))?;
        drop(screen_dc);

        if draw_cursor {
            self.cursor.draw(target, &bounds);
        }

        self.surface
            .as_ref()
            .map(OffscreenSurface::read)
            .ok_or_else(|| CaptureError::Os("capture surface missing".into()))
    }
}
