//! Input Injection
//!
//! Operator mouse and keyboard events are converted to [`SyntheticInput`]
//! values and executed by the [`InputInjector`] worker pool, each preceded by
//! a switch to the input desktop so events land on whatever desktop currently
//! owns the keyboard (including Winlogon and the secure UAC desktop).
//!
//! # Architecture
//!
//! ```text
//! operator event (percent of selected screen, button code, wheel delta, vk)
//!       ↓
//! ┌─────────────────────────┐
//! │  CoordinateMapper       │  screen % → virtual % → 0..=65535
//! └─────────────────────────┘
//!       ↓
//! ┌─────────────────────────┐
//! │  InputInjector          │  FIFO queue, N workers, view-only toggle
//! └─────────────────────────┘
//!       ↓
//! ┌─────────────────────────┐
//! │  InputSink              │  SendInputSink on Windows
//! └─────────────────────────┘
//! ```
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lamco_desktop_agent::capture::ScreenRect;
//! use lamco_desktop_agent::desktop::NullDesktopSwitcher;
//! use lamco_desktop_agent::input::{CoordinateMapper, InputInjector, NullInputSink};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let injector = InputInjector::new(4, Arc::new(NullDesktopSwitcher), Arc::new(NullInputSink))?;
//!
//! let screen = ScreenRect::new(0, 0, 1920, 1080);
//! let mapper = CoordinateMapper::new(screen, screen)?;
//! injector.enqueue_mouse_move(&mapper, 0.5, 0.5);
//! injector.enqueue_mouse_button(&mapper, 0.5, 0.5, 0, true);
//! injector.enqueue_mouse_button(&mapper, 0.5, 0.5, 0, false);
//!
//! // view-only
//! injector.set_input_enabled(false);
//! # Ok(())
//! # }
//! ```

pub mod coordinates;
pub mod error;
pub mod events;
pub mod injector;
pub mod pool;
#[cfg(windows)]
mod sendinput;

pub use coordinates::CoordinateMapper;
pub use error::{InputError, Result};
pub use events::{is_extended_key, wheel_delta, MouseButton, SyntheticInput, ABSOLUTE_MAX, WHEEL_TICK};
pub use injector::{InputInjector, InputSink, InputStats, NullInputSink, DEFAULT_WORKERS};
pub use pool::{ObjectPool, Pooled};
#[cfg(windows)]
pub use sendinput::SendInputSink;

use std::sync::Arc;

/// The platform input sink: `SendInput` on Windows, discarding elsewhere
pub fn system_sink() -> Arc<dyn InputSink> {
    #[cfg(windows)]
    {
        Arc::new(SendInputSink::new())
    }
    #[cfg(not(windows))]
    {
        Arc::new(NullInputSink)
    }
}
