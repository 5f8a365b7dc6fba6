//! Handles of a launched process

use std::fs::File;
use std::io;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};

#[cfg(windows)]
use std::os::windows::io::{AsRawHandle, OwnedHandle};

#[cfg(windows)]
use windows::Win32::Foundation::{HANDLE, WAIT_OBJECT_0, WAIT_TIMEOUT};
#[cfg(windows)]
use windows::Win32::System::Threading::{GetExitCodeProcess, TerminateProcess, WaitForSingleObject};

static INHERITABLE_HANDLES: Mutex<()> = parking_lot::const_mutex(());

/// Exclusive section for launches that create inheritable handles.
///
/// A process created with inheritance enabled receives every inheritable
/// handle open in the agent, including pipe ends belonging to a concurrent
/// launch, and would hold that launch's pipes open after its own child exits.
/// Hold the guard from pipe creation until the parent has closed the child
/// ends. Launches that inherit nothing get `None` and never wait.
#[cfg_attr(not(windows), allow(dead_code))]
pub(crate) fn inheritance_section(inherits_handles: bool) -> Option<MutexGuard<'static, ()>> {
    inherits_handles.then(|| INHERITABLE_HANDLES.lock())
}

/// Process and thread handles plus the parent ends of any stdio pipes.
///
/// Dropping the set closes every handle; the child keeps running.
#[derive(Debug)]
pub struct ProcessHandleSet {
    process_id: u32,
    thread_id: u32,
    stdin: Option<File>,
    stdout: Option<File>,
    stderr: Option<File>,
    #[cfg(windows)]
    process: OwnedHandle,
    #[cfg(windows)]
    _thread: OwnedHandle,
    #[cfg(not(windows))]
    never: std::convert::Infallible,
}

impl ProcessHandleSet {
    #[cfg(windows)]
    pub(crate) fn new(
        process_id: u32,
        thread_id: u32,
        process: OwnedHandle,
        thread: OwnedHandle,
        stdio: Option<(File, File, File)>,
    ) -> Self {
        let (stdin, stdout, stderr) = match stdio {
            Some((stdin, stdout, stderr)) => (Some(stdin), Some(stdout), Some(stderr)),
            None => (None, None, None),
        };
        Self {
            process_id,
            thread_id,
            stdin,
            stdout,
            stderr,
            process,
            _thread: thread,
        }
    }

    /// Child process id
    pub fn process_id(&self) -> u32 {
        self.process_id
    }

    /// Id of the child's primary thread
    pub fn thread_id(&self) -> u32 {
        self.thread_id
    }

    /// Write end of the child's stdin
    pub fn stdin(&mut self) -> Option<&mut File> {
        self.stdin.as_mut()
    }

    /// Take the write end of the child's stdin
    pub fn take_stdin(&mut self) -> Option<File> {
        self.stdin.take()
    }

    /// Take the read end of the child's stdout
    pub fn take_stdout(&mut self) -> Option<File> {
        self.stdout.take()
    }

    /// Take the read end of the child's stderr
    pub fn take_stderr(&mut self) -> Option<File> {
        self.stderr.take()
    }

    /// Whether stdio was redirected
    pub fn has_redirected_streams(&self) -> bool {
        self.stdout.is_some() || self.stderr.is_some() || self.stdin.is_some()
    }
}

#[cfg(windows)]
impl ProcessHandleSet {
    fn raw_process(&self) -> HANDLE {
        HANDLE(self.process.as_raw_handle())
    }

    /// Whether the child is still running
    pub fn is_alive(&self) -> bool {
        // SAFETY: the process handle is owned and open.
        unsafe { WaitForSingleObject(self.raw_process(), 0) == WAIT_TIMEOUT }
    }

    /// Wait up to `timeout`; `Some(exit_code)` once the child has exited
    pub fn wait(&self, timeout: Duration) -> io::Result<Option<u32>> {
        let millis = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX - 1);

        // SAFETY: the process handle is owned and open.
        let status = unsafe { WaitForSingleObject(self.raw_process(), millis) };
        if status == WAIT_TIMEOUT {
            return Ok(None);
        }
        if status != WAIT_OBJECT_0 {
            return Err(io::Error::other(format!("WaitForSingleObject failed: {status:?}")));
        }

        let mut code = 0u32;
        // SAFETY: the process handle is owned and open; `code` is a valid out-pointer.
        unsafe { GetExitCodeProcess(self.raw_process(), &mut code) }.map_err(io::Error::other)?;
        Ok(Some(code))
    }

    /// Forcefully end the child
    pub fn terminate(&self, exit_code: u32) -> io::Result<()> {
        // SAFETY: the process handle is owned and open.
        unsafe { TerminateProcess(self.raw_process(), exit_code) }.map_err(io::Error::other)
    }
}

#[cfg(not(windows))]
impl ProcessHandleSet {
    /// Whether the child is still running
    pub fn is_alive(&self) -> bool {
        match self.never {}
    }

    /// Wait up to `timeout`; `Some(exit_code)` once the child has exited
    pub fn wait(&self, _timeout: Duration) -> io::Result<Option<u32>> {
        match self.never {}
    }

    /// Forcefully end the child
    pub fn terminate(&self, _exit_code: u32) -> io::Result<()> {
        match self.never {}
    }
}
