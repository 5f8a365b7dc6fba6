//! Synthetic input events

use serde::{Deserialize, Serialize};

use super::error::{InputError, Result};

/// Magnitude of one wheel notch (`WHEEL_DELTA`)
pub const WHEEL_TICK: i32 = 120;

/// Upper bound of the absolute input coordinate space
pub const ABSOLUTE_MAX: u16 = u16::MAX;

/// Mouse button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MouseButton {
    /// Primary button
    Left,
    /// Wheel button
    Middle,
    /// Secondary button
    Right,
}

impl MouseButton {
    /// Map an operator button code (0 left, 1 middle, 2 right)
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(MouseButton::Left),
            1 => Ok(MouseButton::Middle),
            2 => Ok(MouseButton::Right),
            other => Err(InputError::UnknownButton(other)),
        }
    }
}

/// One event to inject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyntheticInput {
    /// Absolute move on the virtual desktop, both axes 0..=65535
    MouseMove {
        /// Horizontal position
        x: u16,
        /// Vertical position
        y: u16,
    },
    /// Button press or release
    MouseButton {
        /// Which button
        button: MouseButton,
        /// Down (true) or up (false)
        pressed: bool,
    },
    /// One wheel notch, +120 away from the user, -120 toward
    MouseWheel {
        /// Signed wheel delta
        delta: i32,
    },
    /// Virtual-key press or release
    Key {
        /// Windows virtual-key code
        virtual_key: u16,
        /// Down (true) or up (false)
        pressed: bool,
    },
}

/// Map an operator scroll delta to one wheel notch.
///
/// Operators send DOM-style deltas where positive means "scroll down", which
/// is a negative wheel rotation. Zero produces no event.
pub fn wheel_delta(operator_delta: f64) -> Option<i32> {
    if operator_delta > 0.0 {
        Some(-WHEEL_TICK)
    } else if operator_delta < 0.0 {
        Some(WHEEL_TICK)
    } else {
        None
    }
}

/// Virtual keys that need `KEYEVENTF_EXTENDEDKEY`
pub fn is_extended_key(virtual_key: u16) -> bool {
    matches!(
        virtual_key,
        0x21..=0x28   // page up/down, end, home, arrows
            | 0x2D | 0x2E // insert, delete
            | 0x5B..=0x5D // windows keys, apps
            | 0x6F        // numpad divide
            | 0x90        // num lock
            | 0xA3 | 0xA5 // right ctrl, right alt
    )
}
