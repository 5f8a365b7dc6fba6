//! Terminal Services (WTS) session provider

use std::ptr::null_mut;

use windows::core::PCWSTR;
use windows::Win32::System::RemoteDesktop::{
    WTSActive, WTSConnected, WTSDisconnected, WTSEnumerateProcessesW, WTSEnumerateSessionsW, WTSFreeMemory,
    WTSGetActiveConsoleSessionId, WTS_CONNECTSTATE_CLASS, WTS_PROCESS_INFOW, WTS_SESSION_INFOW,
};

use super::{ProcessEntry, Result, SessionDescriptor, SessionError, SessionProvider, SessionState};

/// Buffer allocated by a `WTSEnumerate*` call, freed on every exit path
struct WtsBuffer<T> {
    ptr: *mut T,
    count: u32,
}

impl<T> WtsBuffer<T> {
    fn as_slice(&self) -> &[T] {
        if self.ptr.is_null() || self.count == 0 {
            return &[];
        }
        // SAFETY: the enumeration call returned `count` contiguous entries at `ptr`.
        unsafe { std::slice::from_raw_parts(self.ptr, self.count as usize) }
    }
}

impl<T> Drop for WtsBuffer<T> {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            // SAFETY: pointer was allocated by WTSEnumerate* and must be freed with WTSFreeMemory.
            unsafe { WTSFreeMemory(self.ptr.cast()) };
        }
    }
}

fn wide_to_string(text: PCWSTR) -> String {
    if text.is_null() {
        return String::new();
    }
    // SAFETY: WTS enumeration strings are nul-terminated and live as long as the buffer.
    unsafe { text.to_string() }.unwrap_or_default()
}

fn map_state(state: WTS_CONNECTSTATE_CLASS) -> SessionState {
    match state {
        WTSActive => SessionState::Active,
        WTSConnected => SessionState::Connected,
        WTSDisconnected => SessionState::Disconnected,
        _ => SessionState::Other,
    }
}

/// Reads the live session table of the local server
#[derive(Debug, Default, Clone, Copy)]
pub struct WtsSessionProvider;

impl SessionProvider for WtsSessionProvider {
    fn console_session_id(&self) -> u32 {
        // SAFETY: no arguments; returns a process-global value.
        unsafe { WTSGetActiveConsoleSessionId() }
    }

    fn sessions(&self) -> Result<Vec<SessionDescriptor>> {
        let mut buffer = WtsBuffer::<WTS_SESSION_INFOW> {
            ptr: null_mut(),
            count: 0,
        };

        // SAFETY: out-pointers are valid; the buffer guard frees the allocation.
        unsafe { WTSEnumerateSessionsW(None, 0, 1, &mut buffer.ptr, &mut buffer.count) }
            .map_err(|e| SessionError::Os(format!("WTSEnumerateSessionsW failed: {e}")))?;

        Ok(buffer
            .as_slice()
            .iter()
            .map(|info| SessionDescriptor {
                session_id: info.SessionId,
                state: map_state(info.State),
                station_name: wide_to_string(PCWSTR(info.pWinStationName.0)),
            })
            .collect())
    }

    fn processes_in_session(&self, session_id: u32) -> Result<Vec<ProcessEntry>> {
        let mut buffer = WtsBuffer::<WTS_PROCESS_INFOW> {
            ptr: null_mut(),
            count: 0,
        };

        // SAFETY: out-pointers are valid; the buffer guard frees the allocation.
        unsafe { WTSEnumerateProcessesW(None, 0, 1, &mut buffer.ptr, &mut buffer.count) }
            .map_err(|e| SessionError::Os(format!("WTSEnumerateProcessesW failed: {e}")))?;

        Ok(buffer
            .as_slice()
            .iter()
            .filter(|entry| entry.SessionId == session_id)
            .map(|entry| ProcessEntry {
                process_id: entry.ProcessId,
                name: wide_to_string(PCWSTR(entry.pProcessName.0)),
            })
            .collect())
    }
}
