//! Virtual-screen montage

use super::{RawFrame, ScreenRect, BYTES_PER_PIXEL};

/// Place each frame at its screen's position on the virtual desktop.
///
/// The canvas covers the bounding box of every screen, so montage pixel
/// `(x, y)` is desktop pixel `(bounds.x + x, bounds.y + y)` and pointer
/// fractions of the montage are fractions of the virtual desktop. Screens
/// side by side come out left to right whatever their enumeration order,
/// and area not covered by a screen (below a shorter one, gaps) stays
/// black. Frames are never scaled; a frame larger than its bounds is
/// clipped to the canvas.
pub fn compose_virtual(placed: &[(ScreenRect, RawFrame)]) -> RawFrame {
    let bounds = ScreenRect::bounding(placed.iter().map(|(rect, _)| rect));
    let mut canvas = RawFrame::black(bounds.width, bounds.height);

    for (rect, frame) in placed.iter().filter(|(rect, _)| !rect.is_empty()) {
        let left = (rect.x - bounds.x) as usize;
        let top = (rect.y - bounds.y) as u32;
        let width = (frame.width as usize).min(canvas.width as usize - left);
        let rows = frame.height.min(canvas.height - top);
        let row_bytes = width * BYTES_PER_PIXEL;

        for y in 0..rows {
            let dst = (top + y) as usize * canvas.stride + left * BYTES_PER_PIXEL;
            canvas.data[dst..dst + row_bytes].copy_from_slice(&frame.row(y)[..row_bytes]);
        }
    }

    canvas
}
