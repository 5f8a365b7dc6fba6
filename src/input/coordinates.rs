//! Coordinate Transformation
//!
//! Operators point at the screen they are watching, as fractions (0..1) of
//! that screen. `SendInput` with `MOUSEEVENTF_VIRTUALDESK` addresses the whole
//! virtual desktop in a 0..=65535 range on each axis. The conversion goes
//! through virtual-desktop fractions:
//!
//! ```text
//! selected-screen fraction ─> virtual-desktop pixel ─> virtual-desktop fraction ─> 0..=65535
//! ```

use tracing::trace;

use super::error::{InputError, Result};
use super::events::ABSOLUTE_MAX;
use crate::capture::ScreenRect;

/// Maps selected-screen fractions to absolute input coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMapper {
    screen: ScreenRect,
    virtual_screen: ScreenRect,
}

impl CoordinateMapper {
    /// Create a mapper for `screen` inside `virtual_screen`
    pub fn new(screen: ScreenRect, virtual_screen: ScreenRect) -> Result<Self> {
        if virtual_screen.is_empty() {
            return Err(InputError::InvalidMonitorConfig("empty virtual screen".into()));
        }
        if screen.is_empty() {
            return Err(InputError::InvalidMonitorConfig("empty selected screen".into()));
        }
        Ok(Self { screen, virtual_screen })
    }

    /// Selected screen bounds
    pub fn screen(&self) -> ScreenRect {
        self.screen
    }

    /// Fraction of the selected screen to fraction of the virtual desktop.
    ///
    /// Inputs are clamped to `0..=1`; NaN is treated as 0.
    pub fn to_virtual_fraction(&self, x: f64, y: f64) -> (f64, f64) {
        let x = clamp_unit(x);
        let y = clamp_unit(y);

        let px = self.screen.x as f64 + x * self.screen.width as f64;
        let py = self.screen.y as f64 + y * self.screen.height as f64;

        let vx = (px - self.virtual_screen.x as f64) / self.virtual_screen.width as f64;
        let vy = (py - self.virtual_screen.y as f64) / self.virtual_screen.height as f64;
        (clamp_unit(vx), clamp_unit(vy))
    }

    /// Fraction of the selected screen to `SendInput` absolute coordinates
    pub fn to_absolute(&self, x: f64, y: f64) -> (u16, u16) {
        let (vx, vy) = self.to_virtual_fraction(x, y);
        let ax = (vx * ABSOLUTE_MAX as f64).round() as u16;
        let ay = (vy * ABSOLUTE_MAX as f64).round() as u16;
        trace!(x, y, vx, vy, ax, ay, "Mapped pointer position");
        (ax, ay)
    }
}

fn clamp_unit(v: f64) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// 1920x1080 primary with a 1280x1024 screen to its left
    fn dual_layout() -> (ScreenRect, ScreenRect, ScreenRect) {
        let primary = ScreenRect::new(0, 0, 1920, 1080);
        let left = ScreenRect::new(-1280, 0, 1280, 1024);
        (primary, left, primary.union(&left))
    }

    #[test]
    fn test_single_screen_identity() {
        let screen = ScreenRect::new(0, 0, 1920, 1080);
        let mapper = CoordinateMapper::new(screen, screen).unwrap();

        assert_eq!(mapper.to_virtual_fraction(0.25, 0.75), (0.25, 0.75));
        assert_eq!(mapper.to_absolute(0.0, 0.0), (0, 0));
        assert_eq!(mapper.to_absolute(1.0, 1.0), (65535, 65535));
        assert_eq!(mapper.to_absolute(0.5, 0.5), (32768, 32768));
    }

    #[test]
    fn test_primary_right_of_secondary() {
        let (primary, _, virt) = dual_layout();
        let mapper = CoordinateMapper::new(primary, virt).unwrap();

        let (vx, vy) = mapper.to_virtual_fraction(0.0, 0.5);
        assert!((vx - 1280.0 / 3200.0).abs() < 1e-9);
        assert!((vy - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_secondary_screen_height_smaller_than_virtual() {
        let (_, left, virt) = dual_layout();
        let mapper = CoordinateMapper::new(left, virt).unwrap();

        let (vx, vy) = mapper.to_virtual_fraction(1.0, 1.0);
        assert!((vx - 1280.0 / 3200.0).abs() < 1e-9);
        assert!((vy - 1024.0 / 1080.0).abs() < 1e-9);
    }

    #[test]
    fn test_out_of_range_input_clamped() {
        let screen = ScreenRect::new(0, 0, 800, 600);
        let mapper = CoordinateMapper::new(screen, screen).unwrap();

        assert_eq!(mapper.to_absolute(-3.0, 7.5), (0, 65535));
        assert_eq!(mapper.to_absolute(f64::NAN, 0.0), (0, 0));
    }

    #[test]
    fn test_empty_geometry_rejected() {
        let screen = ScreenRect::new(0, 0, 800, 600);
        assert!(CoordinateMapper::new(screen, ScreenRect::default()).is_err());
        assert!(CoordinateMapper::new(ScreenRect::default(), screen).is_err());
    }

    proptest! {
        #[test]
        fn prop_absolute_monotonic_in_x(a in 0.0f64..=1.0, b in 0.0f64..=1.0, y in 0.0f64..=1.0) {
            let (primary, _, virt) = dual_layout();
            let mapper = CoordinateMapper::new(primary, virt).unwrap();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(mapper.to_absolute(lo, y).0 <= mapper.to_absolute(hi, y).0);
        }

        #[test]
        fn prop_selected_screen_stays_inside_its_region(x in -2.0f64..3.0, y in -2.0f64..3.0) {
            let (primary, _, virt) = dual_layout();
            let mapper = CoordinateMapper::new(primary, virt).unwrap();
            let (vx, vy) = mapper.to_virtual_fraction(x, y);
            prop_assert!((1280.0 / 3200.0 - 1e-9..=1.0).contains(&vx));
            prop_assert!((0.0..=1.0).contains(&vy));
        }
    }
}
