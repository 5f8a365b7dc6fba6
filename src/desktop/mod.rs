//! Input Desktop Switching
//!
//! Windows routes physical keyboard and mouse input to exactly one desktop at
//! a time: `Default` for a normal logon, `Winlogon` for the logon and lock
//! screens, the secure desktop during UAC prompts, `Screen-saver` while the
//! screen saver runs. GDI capture and `SendInput` both act on the desktop the
//! *calling thread* is attached to, so every frame grab and every injected
//! input event starts by re-attaching the thread to the current input desktop.
//!
//! # Failure model
//!
//! Switching fails routinely (the secure desktop refuses access for a moment
//! during every UAC transition). [`DesktopSwitch::switch_to_input_desktop`]
//! therefore returns `bool` instead of an error; callers proceed best-effort and
//! the frame or input event for that cycle may be lost.
//!
//! # Handle ownership
//!
//! Each thread keeps the desktop it last switched to in its own
//! [`DesktopSlot`]. A desktop handle cannot be closed while a thread is
//! attached to it, so the new handle is attached first and the previous one
//! is closed afterwards. Repeated switching (once per frame, once per input
//! event) holds at most one handle per switching thread.

mod slot;
#[cfg(windows)]
mod win32;

use std::sync::Arc;

pub use slot::DesktopSlot;
#[cfg(windows)]
pub use win32::InputDesktopSwitcher;

/// Attaches the calling thread to whichever desktop currently receives input.
pub trait DesktopSwitch: Send + Sync {
    /// Open the input desktop, make it the calling thread's desktop and
    /// activate it.
    ///
    /// Returns `false` on any OS failure. Never panics.
    fn switch_to_input_desktop(&self) -> bool;

    /// Name of the desktop currently receiving input (`Default`, `Winlogon`, ...).
    fn current_desktop_name(&self) -> Option<String>;
}

impl<T: DesktopSwitch + ?Sized> DesktopSwitch for Arc<T> {
    fn switch_to_input_desktop(&self) -> bool {
        (**self).switch_to_input_desktop()
    }

    fn current_desktop_name(&self) -> Option<String> {
        (**self).current_desktop_name()
    }
}

/// Switcher for hosts without desktop objects; always reports success.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDesktopSwitcher;

impl DesktopSwitch for NullDesktopSwitcher {
    fn switch_to_input_desktop(&self) -> bool {
        true
    }

    fn current_desktop_name(&self) -> Option<String> {
        None
    }
}

/// The switcher appropriate for this platform.
pub fn system_switcher() -> Arc<dyn DesktopSwitch> {
    #[cfg(windows)]
    {
        Arc::new(InputDesktopSwitcher::new())
    }
    #[cfg(not(windows))]
    {
        Arc::new(NullDesktopSwitcher)
    }
}
