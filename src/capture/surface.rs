//! Reusable GDI offscreen surface

use std::ffi::c_void;
use std::ptr::null_mut;

use windows::Win32::Graphics::Gdi::{
    CreateCompatibleDC, CreateDIBSection, DeleteDC, DeleteObject, GdiFlush, GetDC, ReleaseDC, SelectObject,
    BITMAPINFO, BITMAPINFOHEADER, BI_RGB, DIB_RGB_COLORS, HBITMAP, HDC, HGDIOBJ,
};

use super::{CaptureError, RawFrame, Result, BYTES_PER_PIXEL};

/// Screen device context, released on drop
pub(crate) struct ScreenDc(pub(crate) HDC);

impl ScreenDc {
    pub(crate) fn acquire() -> Result<Self> {
        // SAFETY: GetDC(None) returns the DC of the calling thread's desktop.
        let dc = unsafe { GetDC(None) };
        if dc.is_invalid() {
            return Err(CaptureError::DesktopUnavailable("GetDC returned a null screen DC".into()));
        }
        Ok(Self(dc))
    }
}

impl Drop for ScreenDc {
    fn drop(&mut self) {
        // SAFETY: the DC was acquired with GetDC(None).
        let _ = unsafe { ReleaseDC(None, self.0) };
    }
}

/// Memory DC with a selected top-down 32-bit DIB section
pub(crate) struct OffscreenSurface {
    pub(crate) dc: HDC,
    bitmap: HBITMAP,
    previous: HGDIOBJ,
    bits: *mut c_void,
    pub(crate) width: u32,
    pub(crate) height: u32,
}

impl OffscreenSurface {
    pub(crate) fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(CaptureError::InvalidFrame(format!("{}x{} surface", width, height)));
        }

        // SAFETY: a DC compatible with the screen; released in Drop or below.
        let dc = unsafe { CreateCompatibleDC(None) };
        if dc.is_invalid() {
            return Err(CaptureError::Os("CreateCompatibleDC failed".into()));
        }

        let mut info = BITMAPINFO::default();
        info.bmiHeader.biSize = std::mem::size_of::<BITMAPINFOHEADER>() as u32;
        info.bmiHeader.biWidth = width as i32;
        info.bmiHeader.biHeight = -(height as i32);
        info.bmiHeader.biPlanes = 1;
        info.bmiHeader.biBitCount = 32;
        info.bmiHeader.biCompression = BI_RGB.0;

        let mut bits: *mut c_void = null_mut();
        // SAFETY: info describes a valid 32bpp DIB; bits receives the pixel pointer.
        let bitmap = match unsafe { CreateDIBSection(Some(dc), &info, DIB_RGB_COLORS, &mut bits, None, 0) } {
            Ok(bitmap) if !bits.is_null() => bitmap,
            Ok(bitmap) => {
                // SAFETY: both objects were created above.
                unsafe {
                    let _ = DeleteObject(HGDIOBJ(bitmap.0));
                    let _ = DeleteDC(dc);
                }
                return Err(CaptureError::Os("CreateDIBSection returned no pixel buffer".into()));
            }
            Err(e) => {
                // SAFETY: dc was created above.
                let _ = unsafe { DeleteDC(dc) };
                return Err(CaptureError::Os(format!("CreateDIBSection failed: {e}")));
            }
        };

        // SAFETY: dc and bitmap are valid; the previous object is restored in Drop.
        let previous = unsafe { SelectObject(dc, HGDIOBJ(bitmap.0)) };

        Ok(Self {
            dc,
            bitmap,
            previous,
            bits,
            width,
            height,
        })
    }

    pub(crate) fn matches(&self, width: u32, height: u32) -> bool {
        self.width == width && self.height == height
    }

    fn len(&self) -> usize {
        self.width as usize * self.height as usize * BYTES_PER_PIXEL
    }

    /// Copy the surface contents out as a tightly packed frame
    pub(crate) fn read(&self) -> RawFrame {
        let mut frame = RawFrame::black(self.width, self.height);
        // SAFETY: pending GDI batches must land before the bits are read.
        let _ = unsafe { GdiFlush() };
        // SAFETY: bits points at width*height*4 bytes owned by the DIB section.
        unsafe {
            std::ptr::copy_nonoverlapping(self.bits.cast::<u8>(), frame.data.as_mut_ptr(), self.len());
        }
        frame
    }

    /// Overwrite the surface with a frame of identical size
    pub(crate) fn write(&mut self, frame: &RawFrame) {
        let row_bytes = self.width as usize * BYTES_PER_PIXEL;
        for y in 0..self.height.min(frame.height) {
            let src = frame.row(y);
            // SAFETY: the destination row lies within the DIB buffer.
            unsafe {
                std::ptr::copy_nonoverlapping(
                    src.as_ptr(),
                    self.bits.cast::<u8>().add(y as usize * row_bytes),
                    src.len().min(row_bytes),
                );
            }
        }
    }
}

impl Drop for OffscreenSurface {
    fn drop(&mut self) {
        // SAFETY: restore the original bitmap, then delete what we created.
        unsafe {
            let _ = SelectObject(self.dc, self.previous);
            let _ = DeleteObject(HGDIOBJ(self.bitmap.0));
            let _ = DeleteDC(self.dc);
        }
    }
}
