//! GDI cursor drawing with a cached icon copy

use tracing::trace;
use windows::Win32::Foundation::POINT;
use windows::Win32::Graphics::Gdi::{DeleteObject, HDC, HGDIOBJ};
use windows::Win32::UI::WindowsAndMessaging::{
    CopyIcon, DestroyIcon, DrawIconEx, GetCursorInfo, GetIconInfo, CURSORINFO, CURSOR_SHOWING, DI_NORMAL, HICON,
    ICONINFO,
};

use super::cursor_relative_position;
use crate::capture::surface::OffscreenSurface;
use crate::capture::{RawFrame, ScreenRect};

/// Private copy of the cursor icon, destroyed on drop
struct CachedCursor {
    position: (i32, i32),
    icon: HICON,
    hotspot: (i32, i32),
}

impl CachedCursor {
    fn load(info: &CURSORINFO) -> Option<Self> {
        // SAFETY: hCursor is the live system cursor; CopyIcon gives us our own handle.
        let icon = unsafe { CopyIcon(HICON(info.hCursor.0)) }.ok()?;

        let mut icon_info = ICONINFO::default();
        // SAFETY: icon is valid; GetIconInfo creates bitmaps that we delete below.
        let hotspot = match unsafe { GetIconInfo(icon, &mut icon_info) } {
            Ok(()) => {
                // SAFETY: both bitmaps are owned by the caller of GetIconInfo.
                unsafe {
                    if !icon_info.hbmMask.is_invalid() {
                        let _ = DeleteObject(HGDIOBJ(icon_info.hbmMask.0));
                    }
                    if !icon_info.hbmColor.is_invalid() {
                        let _ = DeleteObject(HGDIOBJ(icon_info.hbmColor.0));
                    }
                }
                (icon_info.xHotspot as i32, icon_info.yHotspot as i32)
            }
            Err(_) => (0, 0),
        };

        Some(Self {
            position: (info.ptScreenPos.x, info.ptScreenPos.y),
            icon,
            hotspot,
        })
    }
}

impl Drop for CachedCursor {
    fn drop(&mut self) {
        // SAFETY: the icon came from CopyIcon and is destroyed exactly once.
        let _ = unsafe { DestroyIcon(self.icon) };
    }
}

/// Draws the system cursor onto captured frames
#[derive(Default)]
pub struct CursorOverlay {
    cached: Option<CachedCursor>,
    scratch: Option<OffscreenSurface>,
}

impl CursorOverlay {
    /// Create an overlay with an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Refresh the cache from the global cursor state; `None` if hidden
    fn current(&mut self) -> Option<&CachedCursor> {
        let mut info = CURSORINFO {
            cbSize: std::mem::size_of::<CURSORINFO>() as u32,
            ..Default::default()
        };
        // SAFETY: info is a properly sized out-parameter.
        if let Err(e) = unsafe { GetCursorInfo(&mut info) } {
            trace!("GetCursorInfo failed: {}", e);
            return None;
        }
        if info.flags.0 & CURSOR_SHOWING.0 == 0 {
            return None;
        }

        let POINT { x, y } = info.ptScreenPos;
        let stale = self.cached.as_ref().map_or(true, |c| c.position != (x, y));
        if stale {
            // dropping the old entry destroys its icon
            self.cached = CachedCursor::load(&info);
        }
        self.cached.as_ref()
    }

    /// Draw the cursor onto a DC holding an image of `bounds`.
    ///
    /// Returns whether anything was drawn.
    pub fn draw(&mut self, hdc: HDC, bounds: &ScreenRect) -> bool {
        let Some(cursor) = self.current() else {
            return false;
        };
        let Some((x, y)) = cursor_relative_position(cursor.position, cursor.hotspot, bounds) else {
            return false;
        };
        // SAFETY: hdc is a valid DC supplied by the caller; icon is owned by the cache.
        unsafe { DrawIconEx(hdc, x, y, cursor.icon, 0, 0, 0, None, DI_NORMAL) }.is_ok()
    }

    /// Draw the cursor into a raw frame via a scratch DIB
    pub fn draw_onto_frame(&mut self, frame: &mut RawFrame, bounds: &ScreenRect) -> bool {
        let visible = self
            .current()
            .and_then(|c| cursor_relative_position(c.position, c.hotspot, bounds))
            .is_some();
        if !visible {
            return false;
        }

        if !self
            .scratch
            .as_ref()
            .is_some_and(|s| s.matches(frame.width, frame.height))
        {
            self.scratch = None;
            match OffscreenSurface::new(frame.width, frame.height) {
                Ok(surface) => self.scratch = Some(surface),
                Err(e) => {
                    trace!("Cursor scratch surface unavailable: {}", e);
                    return false;
                }
            }
        }
        let Some(mut scratch) = self.scratch.take() else {
            return false;
        };

        scratch.write(frame);
        let drawn = self.draw(scratch.dc, bounds);
        if drawn {
            *frame = scratch.read();
        }
        self.scratch = Some(scratch);
        drawn
    }
}
