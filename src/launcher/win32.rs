//! Token acquisition and `CreateProcessAsUserW`

use std::ffi::c_void;
use std::fs::File;
use std::mem::size_of;
use std::os::windows::io::{FromRawHandle, OwnedHandle};

use tracing::{debug, info, warn};
use windows::core::{PCWSTR, PWSTR};
use windows::Win32::Foundation::{
    CloseHandle, GetHandleInformation, SetHandleInformation, HANDLE, HANDLE_FLAGS, HANDLE_FLAG_INHERIT,
};
use windows::Win32::Security::{
    DuplicateTokenEx, SecurityIdentification, TokenPrimary, TOKEN_ALL_ACCESS, TOKEN_ASSIGN_PRIMARY, TOKEN_DUPLICATE,
    TOKEN_QUERY,
};
use windows::Win32::System::Environment::{CreateEnvironmentBlock, DestroyEnvironmentBlock};
use windows::Win32::System::Pipes::CreatePipe;
use windows::Win32::System::RemoteDesktop::WTSQueryUserToken;
use windows::Win32::System::Threading::{
    CreateProcessAsUserW, OpenProcess, OpenProcessToken, CREATE_NEW_CONSOLE, CREATE_NO_WINDOW,
    CREATE_UNICODE_ENVIRONMENT, PROCESS_CREATION_FLAGS, PROCESS_INFORMATION, PROCESS_QUERY_LIMITED_INFORMATION,
    STARTF_USESTDHANDLES, STARTUPINFOW,
};

use super::error::{LaunchError, Result};
use super::handles::{inheritance_section, ProcessHandleSet};
use super::request::{ConsoleMode, LaunchRequest, LaunchState};
use crate::session::{SessionProvider, SessionResolver};

const WINLOGON: &str = "winlogon.exe";

/// Kernel handle closed on drop
struct Handle(HANDLE);

impl Handle {
    fn into_owned(self) -> OwnedHandle {
        let raw = self.0;
        std::mem::forget(self);
        // SAFETY: `raw` is an open handle whose ownership moves to OwnedHandle.
        unsafe { OwnedHandle::from_raw_handle(raw.0) }
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        if !self.0.is_invalid() {
            // SAFETY: the handle is owned and closed exactly once.
            unsafe {
                let _ = CloseHandle(self.0);
            }
        }
    }
}

/// User environment block, destroyed on drop
struct EnvironmentBlock(*mut c_void);

impl EnvironmentBlock {
    fn for_token(token: HANDLE) -> Option<Self> {
        let mut block: *mut c_void = std::ptr::null_mut();
        // SAFETY: `block` is a valid out-pointer; the token is open.
        match unsafe { CreateEnvironmentBlock(&mut block, Some(token), false) } {
            Ok(()) => Some(Self(block)),
            Err(e) => {
                warn!("CreateEnvironmentBlock failed ({}), child inherits the agent environment", e);
                None
            }
        }
    }
}

impl Drop for EnvironmentBlock {
    fn drop(&mut self) {
        // SAFETY: the block came from CreateEnvironmentBlock.
        unsafe {
            let _ = DestroyEnvironmentBlock(self.0);
        }
    }
}

/// One anonymous pipe split into the child's end and ours
struct Pipe {
    child: Handle,
    parent: Handle,
}

impl Pipe {
    /// `child_reads` picks which end the child gets
    fn create(child_reads: bool, name: &str) -> Result<Self> {
        let mut read = HANDLE::default();
        let mut write = HANDLE::default();

        // SAFETY: both out-pointers are valid; default security, not inheritable.
        unsafe { CreatePipe(&mut read, &mut write, None, 0) }
            .map_err(|e| LaunchError::PipeSetupFailed(format!("CreatePipe({name}) failed: {e}")))?;

        let (read, write) = (Handle(read), Handle(write));
        let (child, parent) = if child_reads { (read, write) } else { (write, read) };

        // SAFETY: the handle is open and owned.
        unsafe { SetHandleInformation(child.0, HANDLE_FLAG_INHERIT.0, HANDLE_FLAG_INHERIT) }
            .map_err(|e| LaunchError::PipeSetupFailed(format!("SetHandleInformation({name}) failed: {e}")))?;

        let mut flags = 0u32;
        // SAFETY: the handle is open; `flags` is a valid out-pointer.
        unsafe { GetHandleInformation(child.0, &mut flags) }
            .map_err(|e| LaunchError::PipeSetupFailed(format!("GetHandleInformation({name}) failed: {e}")))?;

        // a non-inheritable child end silently loses the child's output
        if HANDLE_FLAGS(flags) & HANDLE_FLAG_INHERIT != HANDLE_FLAG_INHERIT {
            return Err(LaunchError::PipeSetupFailed(format!("{name} handle is not inheritable")));
        }

        Ok(Self { child, parent })
    }
}

struct StdioPipes {
    stdin: Pipe,
    stdout: Pipe,
    stderr: Pipe,
}

impl StdioPipes {
    fn create() -> Result<Self> {
        Ok(Self {
            stdin: Pipe::create(true, "stdin")?,
            stdout: Pipe::create(false, "stdout")?,
            stderr: Pipe::create(false, "stderr")?,
        })
    }

    fn into_parent_files(self) -> (File, File, File) {
        // child ends close here
        (
            File::from(self.stdin.parent.into_owned()),
            File::from(self.stdout.parent.into_owned()),
            File::from(self.stderr.parent.into_owned()),
        )
    }
}

fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(Some(0)).collect()
}

/// Primary token for `session_id`: the logged-on user's, else winlogon's
fn acquire_token<P: SessionProvider>(resolver: &SessionResolver<P>, session_id: u32) -> Result<Handle> {
    let mut token = HANDLE::default();

    // SAFETY: `WTSQueryUserToken` writes a token handle into `token` on success.
    match unsafe { WTSQueryUserToken(session_id, &mut token) } {
        Ok(()) => {
            debug!(session_id, "Using logged-on user token");
            return Ok(Handle(token));
        }
        Err(e) => {
            debug!(session_id, "WTSQueryUserToken failed ({}), trying winlogon token", e);
        }
    }

    let pid = resolver
        .find_system_process_for_session(WINLOGON, session_id)
        .map_err(|e| LaunchError::NoLoggedOnUser {
            session_id,
            reason: e.to_string(),
        })?;

    let dup_error = |what: &str, e: windows::core::Error| LaunchError::TokenDuplicationFailed {
        session_id,
        reason: format!("{what} failed: {e}"),
    };

    // SAFETY: plain handle-returning call.
    let process = unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, pid) }
        .map(Handle)
        .map_err(|e| dup_error("OpenProcess(winlogon)", e))?;

    let mut winlogon_token = HANDLE::default();
    // SAFETY: OpenProcessToken writes a token handle into `winlogon_token` on success.
    unsafe {
        OpenProcessToken(
            process.0,
            TOKEN_DUPLICATE | TOKEN_ASSIGN_PRIMARY | TOKEN_QUERY,
            &mut winlogon_token,
        )
    }
    .map_err(|e| dup_error("OpenProcessToken(winlogon)", e))?;
    let winlogon_token = Handle(winlogon_token);

    let mut primary = HANDLE::default();
    // SAFETY: DuplicateTokenEx writes a new token handle into `primary` on success.
    unsafe {
        DuplicateTokenEx(
            winlogon_token.0,
            TOKEN_ALL_ACCESS,
            None,
            SecurityIdentification,
            TokenPrimary,
            &mut primary,
        )
    }
    .map_err(|e| dup_error("DuplicateTokenEx(winlogon)", e))?;

    info!(session_id, winlogon_pid = pid, "Using winlogon token");
    Ok(Handle(primary))
}

/// Run one launch attempt into an already resolved session
pub(crate) fn launch<P: SessionProvider>(
    resolver: &SessionResolver<P>,
    session_id: u32,
    request: &LaunchRequest,
) -> Result<ProcessHandleSet> {
    debug!(session_id, state = %LaunchState::AcquireToken, "Launching");
    let token = acquire_token(resolver, session_id)?;

    // Declared before `pipes` so it is released after every child end closes.
    let _inheritance = inheritance_section(request.redirects_streams());
    let pipes = if request.redirects_streams() {
        debug!(session_id, state = %LaunchState::PreparePipes, "Launching");
        Some(StdioPipes::create()?)
    } else {
        None
    };

    debug!(session_id, state = %LaunchState::CreateProcess, "Launching");
    let environment = EnvironmentBlock::for_token(token.0);

    let command_line = request.command_line();
    let mut command_w = to_wide(&command_line);
    let mut desktop_w = to_wide(&request.desktop_path());
    let working_dir_w = request.working_dir().map(|dir| to_wide(&dir.to_string_lossy()));

    let mut startup_info = STARTUPINFOW {
        cb: size_of::<STARTUPINFOW>() as u32,
        lpDesktop: PWSTR(desktop_w.as_mut_ptr()),
        ..Default::default()
    };
    if let Some(pipes) = &pipes {
        startup_info.dwFlags |= STARTF_USESTDHANDLES;
        startup_info.hStdInput = pipes.stdin.child.0;
        startup_info.hStdOutput = pipes.stdout.child.0;
        startup_info.hStdError = pipes.stderr.child.0;
    }

    let mut flags: PROCESS_CREATION_FLAGS = CREATE_UNICODE_ENVIRONMENT;
    flags |= match request.console_mode() {
        ConsoleMode::NoWindow => CREATE_NO_WINDOW,
        ConsoleMode::NewConsole => CREATE_NEW_CONSOLE,
    };

    let mut process_info = PROCESS_INFORMATION::default();

    // SAFETY:
    // - the token is an open primary token
    // - command/desktop/working-dir buffers are nul-terminated and outlive the call
    // - the environment block, when present, came from CreateEnvironmentBlock
    // - startup_info/process_info are valid pointers
    let created = unsafe {
        CreateProcessAsUserW(
            Some(token.0),
            PCWSTR::null(),
            Some(PWSTR(command_w.as_mut_ptr())),
            None,
            None,
            pipes.is_some(),
            flags,
            environment.as_ref().map(|env| env.0 as *const c_void),
            working_dir_w
                .as_ref()
                .map_or(PCWSTR::null(), |dir| PCWSTR(dir.as_ptr())),
            &startup_info,
            &mut process_info,
        )
    };

    created.map_err(|e| LaunchError::ProcessCreationFailed {
        command_line: command_line.clone(),
        reason: e.to_string(),
    })?;

    let process = Handle(process_info.hProcess).into_owned();
    let thread = Handle(process_info.hThread).into_owned();
    // closes the child ends while the inheritance section is still held
    let stdio = pipes.map(StdioPipes::into_parent_files);

    info!(
        session_id,
        pid = process_info.dwProcessId,
        desktop = %request.desktop_path(),
        state = %LaunchState::Done,
        "Launched {}",
        command_line
    );

    Ok(ProcessHandleSet::new(
        process_info.dwProcessId,
        process_info.dwThreadId,
        process,
        thread,
        stdio,
    ))
}
