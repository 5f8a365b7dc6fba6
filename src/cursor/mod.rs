//! Cursor overlay
//!
//! Neither `BitBlt` nor desktop duplication includes the hardware cursor in
//! the captured image, so it is drawn in afterwards. The overlay queries the
//! global cursor state, skips hidden cursors and cursors on other screens,
//! and keeps a copy of the last cursor icon so the OS resource is reloaded
//! only when the cursor actually moved.

#[cfg(windows)]
mod overlay;

#[cfg(windows)]
pub use overlay::CursorOverlay;

use crate::capture::ScreenRect;

/// Where to draw a cursor inside a captured screen.
///
/// `cursor` is the screen-absolute hotspot position and `hotspot` the offset
/// of that hotspot inside the icon. Returns the icon's top-left corner in
/// frame coordinates, or `None` when the cursor is on another screen.
pub fn cursor_relative_position(cursor: (i32, i32), hotspot: (i32, i32), bounds: &ScreenRect) -> Option<(i32, i32)> {
    if !bounds.contains(cursor.0, cursor.1) {
        return None;
    }
    Some((cursor.0 - bounds.x - hotspot.0, cursor.1 - bounds.y - hotspot.1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_on_primary() {
        let bounds = ScreenRect::new(0, 0, 1920, 1080);
        assert_eq!(cursor_relative_position((100, 200), (0, 0), &bounds), Some((100, 200)));
    }

    #[test]
    fn test_hotspot_offset() {
        let bounds = ScreenRect::new(0, 0, 1920, 1080);
        // I-beam style cursor with its hotspot in the middle
        assert_eq!(cursor_relative_position((100, 200), (8, 16), &bounds), Some((92, 184)));
        // near the edge the icon may start off-frame
        assert_eq!(cursor_relative_position((2, 2), (8, 16), &bounds), Some((-6, -14)));
    }

    #[test]
    fn test_cursor_on_secondary_left_of_primary() {
        let left = ScreenRect::new(-1280, 0, 1280, 1024);
        assert_eq!(cursor_relative_position((-1000, 10), (0, 0), &left), Some((280, 10)));
        assert_eq!(cursor_relative_position((5, 10), (0, 0), &left), None);
    }

    #[test]
    fn test_cursor_outside_bounds() {
        let bounds = ScreenRect::new(1920, 0, 1920, 1080);
        assert_eq!(cursor_relative_position((100, 100), (0, 0), &bounds), None);
        assert_eq!(cursor_relative_position((3840, 100), (0, 0), &bounds), None);
    }
}
