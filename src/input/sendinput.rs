//! `SendInput` delivery

use std::mem::size_of;

use tracing::trace;
use windows::core::Error as WinError;
use windows::Win32::Foundation::GetLastError;
use windows::Win32::UI::Input::KeyboardAndMouse::{
    MapVirtualKeyW, SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, INPUT_MOUSE, KEYBDINPUT, KEYBD_EVENT_FLAGS,
    KEYEVENTF_EXTENDEDKEY, KEYEVENTF_KEYUP, MAPVK_VK_TO_VSC, MOUSEEVENTF_ABSOLUTE, MOUSEEVENTF_LEFTDOWN,
    MOUSEEVENTF_LEFTUP, MOUSEEVENTF_MIDDLEDOWN, MOUSEEVENTF_MIDDLEUP, MOUSEEVENTF_MOVE, MOUSEEVENTF_RIGHTDOWN,
    MOUSEEVENTF_RIGHTUP, MOUSEEVENTF_VIRTUALDESK, MOUSEEVENTF_WHEEL, MOUSEINPUT, MOUSE_EVENT_FLAGS, VIRTUAL_KEY,
};

use super::error::{InputError, Result};
use super::events::{is_extended_key, MouseButton, SyntheticInput};
use super::injector::InputSink;
use super::pool::ObjectPool;

const POOL_CAPACITY: usize = 32;

/// Injects events into the calling thread's desktop with `SendInput`
pub struct SendInputSink {
    pool: ObjectPool<INPUT>,
}

impl SendInputSink {
    /// Create a sink
    pub fn new() -> Self {
        Self {
            pool: ObjectPool::new(POOL_CAPACITY, INPUT::default),
        }
    }
}

impl Default for SendInputSink {
    fn default() -> Self {
        Self::new()
    }
}

fn mouse(dx: i32, dy: i32, data: i32, flags: MOUSE_EVENT_FLAGS) -> (INPUT_0, bool) {
    (
        INPUT_0 {
            mi: MOUSEINPUT {
                dx,
                dy,
                mouseData: data as _,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
        true,
    )
}

fn fill(event: &mut INPUT, input: &SyntheticInput) {
    let (payload, is_mouse) = match *input {
        SyntheticInput::MouseMove { x, y } => mouse(
            i32::from(x),
            i32::from(y),
            0,
            MOUSEEVENTF_ABSOLUTE | MOUSEEVENTF_MOVE | MOUSEEVENTF_VIRTUALDESK,
        ),
        SyntheticInput::MouseButton { button, pressed } => {
            let flags = match (button, pressed) {
                (MouseButton::Left, true) => MOUSEEVENTF_LEFTDOWN,
                (MouseButton::Left, false) => MOUSEEVENTF_LEFTUP,
                (MouseButton::Middle, true) => MOUSEEVENTF_MIDDLEDOWN,
                (MouseButton::Middle, false) => MOUSEEVENTF_MIDDLEUP,
                (MouseButton::Right, true) => MOUSEEVENTF_RIGHTDOWN,
                (MouseButton::Right, false) => MOUSEEVENTF_RIGHTUP,
            };
            mouse(0, 0, 0, flags)
        }
        SyntheticInput::MouseWheel { delta } => mouse(0, 0, delta, MOUSEEVENTF_WHEEL),
        SyntheticInput::Key { virtual_key, pressed } => {
            let mut flags = KEYBD_EVENT_FLAGS(0);
            if !pressed {
                flags |= KEYEVENTF_KEYUP;
            }
            if is_extended_key(virtual_key) {
                flags |= KEYEVENTF_EXTENDEDKEY;
            }
            // SAFETY: pure table lookup.
            let scan = unsafe { MapVirtualKeyW(u32::from(virtual_key), MAPVK_VK_TO_VSC) } as u16;
            (
                INPUT_0 {
                    ki: KEYBDINPUT {
                        wVk: VIRTUAL_KEY(virtual_key),
                        wScan: scan,
                        dwFlags: flags,
                        time: 0,
                        dwExtraInfo: 0,
                    },
                },
                false,
            )
        }
    };

    event.r#type = if is_mouse { INPUT_MOUSE } else { INPUT_KEYBOARD };
    event.Anonymous = payload;
}

impl InputSink for SendInputSink {
    fn send(&self, input: &SyntheticInput) -> Result<()> {
        let mut event = self.pool.get();
        fill(&mut event, input);

        // SAFETY: one fully initialised INPUT and its exact size.
        let sent = unsafe { SendInput(std::slice::from_ref(&*event), size_of::<INPUT>() as i32) };
        if sent == 0 {
            // SAFETY: GetLastError is safe to call and returns the last error for the calling thread.
            let last_error = unsafe { GetLastError() };
            // typically UIPI: the target desktop belongs to a higher integrity level
            return Err(InputError::InjectionFailed(format!(
                "SendInput rejected {input:?}: {}",
                WinError::from(last_error.to_hresult()).message()
            )));
        }

        trace!(?input, "Injected");
        Ok(())
    }
}
