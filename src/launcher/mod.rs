//! Impersonated Process Launcher
//!
//! Starts a process visibly inside a specific interactive session, as that
//! session's user, from an agent that itself runs as a service in session 0.
//!
//! # Launch states
//!
//! ```text
//! ResolveSession ─> AcquireToken ─> PreparePipes ─> CreateProcess ─> Done
//!       │                │               │                │
//!       └────────────────┴───────────────┴────────────────┴──────> Failed
//! ```
//!
//! Tokens are tried in order: the logged-on user's token
//! (`WTSQueryUserToken`), then a primary duplicate of the session's
//! `winlogon.exe` token, which exists even before anyone logs on. Any failure
//! aborts the attempt and releases every handle acquired so far. Nothing is
//! retried here.

pub mod error;
pub mod handles;
pub mod request;
#[cfg(windows)]
mod win32;

use tracing::{info, warn};

pub use error::{LaunchError, LaunchErrorKind, Result};
pub use handles::ProcessHandleSet;
pub use request::{build_command_line, desktop_path, ConsoleMode, LaunchRequest, LaunchState, DEFAULT_DESKTOP};

use crate::session::{SessionProvider, SessionResolver};

/// Launches processes into interactive sessions
pub struct ProcessLauncher<P> {
    resolver: SessionResolver<P>,
}

impl<P: SessionProvider> ProcessLauncher<P> {
    /// Launcher resolving sessions through `resolver`
    pub fn new(resolver: SessionResolver<P>) -> Self {
        Self { resolver }
    }

    /// Session resolver in use
    pub fn resolver(&self) -> &SessionResolver<P> {
        &self.resolver
    }

    /// Launch `request` into its target session
    pub fn launch(&self, request: &LaunchRequest) -> Result<ProcessHandleSet> {
        let session_id = self
            .resolver
            .resolve_target_session_id(request.target_session())
            .map_err(|e| {
                warn!(state = %LaunchState::Failed, "Session resolution failed: {}", e);
                LaunchError::from(e)
            })?;

        info!(
            session_id,
            executable = %request.executable().display(),
            desktop = %request.desktop_path(),
            "Launching process in session"
        );

        self.launch_in_session(session_id, request).map_err(|e| {
            warn!(session_id, state = %LaunchState::Failed, at = %e.context(), "Launch failed: {}", e);
            e
        })
    }

    #[cfg(windows)]
    fn launch_in_session(&self, session_id: u32, request: &LaunchRequest) -> Result<ProcessHandleSet> {
        win32::launch(&self.resolver, session_id, request)
    }

    #[cfg(not(windows))]
    fn launch_in_session(&self, _session_id: u32, _request: &LaunchRequest) -> Result<ProcessHandleSet> {
        Err(LaunchError::Unsupported(
            "launching into another session requires Windows".to_string(),
        ))
    }
}

/// Launcher over the live Terminal Services session table
#[cfg(windows)]
pub fn system_launcher() -> ProcessLauncher<crate::session::WtsSessionProvider> {
    ProcessLauncher::new(crate::session::system_resolver())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MockSessionProvider, SessionDescriptor, SessionState};

    fn provider_with(sessions: Vec<SessionDescriptor>, console: u32) -> MockSessionProvider {
        let mut provider = MockSessionProvider::new();
        provider.expect_console_session_id().return_const(console);
        provider.expect_sessions().returning(move || Ok(sessions.clone()));
        provider
    }

    #[test]
    fn test_no_active_session_fails_before_launch() {
        let provider = provider_with(
            vec![SessionDescriptor {
                session_id: 0,
                state: SessionState::Disconnected,
                station_name: "Services".into(),
            }],
            crate::session::NO_CONSOLE_SESSION,
        );
        let launcher = ProcessLauncher::new(SessionResolver::new(provider));

        let err = launcher.launch(&LaunchRequest::new("notepad.exe")).unwrap_err();
        assert_eq!(err.kind(), LaunchErrorKind::SessionNotFound);
        assert!(err.is_recoverable());
    }

    #[cfg(not(windows))]
    #[test]
    fn test_resolved_launch_is_unsupported_off_windows() {
        let provider = provider_with(
            vec![SessionDescriptor {
                session_id: 1,
                state: SessionState::Active,
                station_name: "Console".into(),
            }],
            1,
        );
        let launcher = ProcessLauncher::new(SessionResolver::new(provider));

        let err = launcher.launch(&LaunchRequest::new("notepad.exe")).unwrap_err();
        assert!(matches!(err, LaunchError::Unsupported(_)));
        assert_eq!(err.context(), LaunchState::CreateProcess);
    }
}
