//! Win32 input desktop switcher

use std::cell::RefCell;
use std::ffi::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, warn};
use windows::Win32::Foundation::{GENERIC_ALL, HANDLE};
use windows::Win32::System::StationsAndDesktops::{
    CloseDesktop, GetThreadDesktop, GetUserObjectInformationW, OpenInputDesktop, SetThreadDesktop, SwitchDesktop,
    DESKTOP_ACCESS_FLAGS, DESKTOP_CONTROL_FLAGS, DESKTOP_READOBJECTS, HDESK, UOI_NAME,
};
use windows::Win32::System::Threading::GetCurrentThreadId;

use super::{DesktopSlot, DesktopSwitch};

/// Desktop handles opened by switchers and not yet closed, across all threads
static OPEN_DESKTOPS: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static THREAD_DESKTOP: RefCell<ThreadDesktop> = RefCell::new(ThreadDesktop::capture_home());
}

/// Owned `HDESK`, closed on drop
#[derive(Debug)]
struct OwnedDesktop(HDESK);

impl OwnedDesktop {
    fn open_input(access: DESKTOP_ACCESS_FLAGS) -> windows::core::Result<Self> {
        // SAFETY: OpenInputDesktop has no pointer arguments; a returned handle is owned by us.
        let desk = unsafe { OpenInputDesktop(DESKTOP_CONTROL_FLAGS(0), false, access) }?;
        OPEN_DESKTOPS.fetch_add(1, Ordering::Relaxed);
        Ok(Self(desk))
    }

    fn name(&self) -> Option<String> {
        let mut buffer = [0u16; 256];
        let mut needed = 0u32;

        // SAFETY: buffer is valid for its full byte length for the duration of the call.
        unsafe {
            GetUserObjectInformationW(
                HANDLE(self.0 .0),
                UOI_NAME,
                Some(buffer.as_mut_ptr().cast::<c_void>()),
                std::mem::size_of_val(&buffer) as u32,
                Some(&mut needed),
            )
        }
        .ok()?;

        let len = buffer.iter().position(|&c| c == 0).unwrap_or(buffer.len());
        Some(String::from_utf16_lossy(&buffer[..len]))
    }
}

impl Drop for OwnedDesktop {
    fn drop(&mut self) {
        // SAFETY: the handle came from OpenInputDesktop and is closed exactly once.
        match unsafe { CloseDesktop(self.0) } {
            Ok(()) => {
                OPEN_DESKTOPS.fetch_sub(1, Ordering::Relaxed);
            }
            // a thread of this process is still attached; the handle leaks
            Err(e) => warn!("CloseDesktop failed, desktop handle leaked: {}", e),
        }
    }
}

/// The calling thread's switched desktop plus the desktop it started on
struct ThreadDesktop {
    /// Not owned; returned by GetThreadDesktop and never closed
    home: Option<HDESK>,
    slot: DesktopSlot<OwnedDesktop>,
}

impl ThreadDesktop {
    fn capture_home() -> Self {
        // SAFETY: plain query on the current thread id.
        let home = unsafe { GetThreadDesktop(GetCurrentThreadId()) }.ok();
        Self {
            home,
            slot: DesktopSlot::new(),
        }
    }

    fn switch(&mut self) -> windows::core::Result<()> {
        self.slot.cycle(
            || OwnedDesktop::open_input(DESKTOP_ACCESS_FLAGS(GENERIC_ALL.0)),
            // SAFETY: desk is a live handle owned by the slot.
            |desk| unsafe { SetThreadDesktop(desk.0) },
            // SAFETY: as above.
            |desk| unsafe { SwitchDesktop(desk.0) },
        )
    }
}

impl Drop for ThreadDesktop {
    fn drop(&mut self) {
        if self.slot.open_handles() == 0 {
            return;
        }
        // Detach before closing so CloseDesktop can succeed at thread exit.
        if let Some(home) = self.home {
            // SAFETY: home is the thread's original desktop and stays open for the process.
            if let Err(e) = unsafe { SetThreadDesktop(home) } {
                debug!("Restoring thread desktop failed: {}", e);
            }
        }
        self.slot.clear();
    }
}

/// Switcher backed by `OpenInputDesktop` / `SetThreadDesktop` / `SwitchDesktop`
///
/// Each calling thread keeps its own desktop handle, so a handle is only
/// ever closed by the one thread that was attached to it.
#[derive(Debug, Default, Clone, Copy)]
pub struct InputDesktopSwitcher;

impl InputDesktopSwitcher {
    /// Create a switcher
    pub fn new() -> Self {
        Self
    }

    /// Outstanding desktop handles across all threads; at most one per
    /// thread that has switched
    pub fn open_handles() -> usize {
        OPEN_DESKTOPS.load(Ordering::Relaxed)
    }
}

impl DesktopSwitch for InputDesktopSwitcher {
    fn switch_to_input_desktop(&self) -> bool {
        let result = THREAD_DESKTOP.try_with(|desktop| desktop.borrow_mut().switch());

        match result {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                debug!("Input desktop switch failed: {}", e);
                false
            }
            // thread is exiting
            Err(_) => false,
        }
    }

    fn current_desktop_name(&self) -> Option<String> {
        match OwnedDesktop::open_input(DESKTOP_READOBJECTS) {
            Ok(desk) => desk.name(),
            Err(e) => {
                debug!("OpenInputDesktop for name query failed: {}", e);
                None
            }
        }
    }
}
