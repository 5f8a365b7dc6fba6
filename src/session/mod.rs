//! Session Resolution
//!
//! Maps the agent's notion of "where should this run" onto Windows logon
//! sessions. A machine can carry several sessions at once: session 0 for
//! services (where this agent usually runs), the physical console session,
//! and any number of RDP sessions, each connected, disconnected or merely
//! listening.
//!
//! # Resolution policy
//!
//! ```text
//! resolve_target_session_id(None)        → console session
//!                                          (last active session if no console)
//! resolve_target_session_id(Some(id))    → id, if it is Active
//!                                          otherwise the LAST active session
//! no Active session at all               → SessionError::SessionNotFound
//! ```
//!
//! Falling back to the last active session instead of failing keeps process
//! launches working when the requested session has just ended, at the price
//! of possibly launching into a different user's session. The fallback is
//! logged at `warn`.
//!
//! The OS session table is never cached; every call re-enumerates.

mod error;
#[cfg(windows)]
mod wts;

use serde::Serialize;
use tracing::{debug, warn};

pub use error::{Result, SessionError};
#[cfg(windows)]
pub use wts::WtsSessionProvider;

/// `WTSGetActiveConsoleSessionId` result when no console session is attached
pub const NO_CONSOLE_SESSION: u32 = 0xFFFF_FFFF;

/// Connection state of a logon session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// A user is logged on and the session is attached to a display
    Active,
    /// Connected to a client, no user logged on yet
    Connected,
    /// User logged on, client detached
    Disconnected,
    /// Listening, shadowing, resetting, down or initializing
    Other,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Active => write!(f, "active"),
            SessionState::Connected => write!(f, "connected"),
            SessionState::Disconnected => write!(f, "disconnected"),
            SessionState::Other => write!(f, "other"),
        }
    }
}

/// Snapshot of one row of the OS session table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionDescriptor {
    /// Session id
    pub session_id: u32,
    /// Connection state
    pub state: SessionState,
    /// WinStation name (`Console`, `RDP-Tcp#3`, `Services`)
    pub station_name: String,
}

/// Process visible in a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    /// Process id
    pub process_id: u32,
    /// Image name, e.g. `winlogon.exe`
    pub name: String,
}

/// Source of session and per-session process information
#[cfg_attr(test, mockall::automock)]
pub trait SessionProvider: Send + Sync {
    /// Console session id, or [`NO_CONSOLE_SESSION`]
    fn console_session_id(&self) -> u32;

    /// Every session in the OS table, in OS order
    fn sessions(&self) -> Result<Vec<SessionDescriptor>>;

    /// Processes running in `session_id`
    fn processes_in_session(&self, session_id: u32) -> Result<Vec<ProcessEntry>>;
}

/// Applies the resolution policy on top of a [`SessionProvider`]
#[derive(Debug, Clone)]
pub struct SessionResolver<P> {
    provider: P,
}

impl<P: SessionProvider> SessionResolver<P> {
    /// Create a resolver over `provider`
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Underlying provider
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Session attached to the physical console
    pub fn active_console_session_id(&self) -> Result<u32> {
        match self.provider.console_session_id() {
            NO_CONSOLE_SESSION => Err(SessionError::SessionNotFound { requested: None }),
            id => Ok(id),
        }
    }

    /// All sessions in the `Active` state
    pub fn enumerate_active_sessions(&self) -> Result<Vec<SessionDescriptor>> {
        Ok(self
            .provider
            .sessions()?
            .into_iter()
            .filter(|s| s.state == SessionState::Active)
            .collect())
    }

    /// All sessions regardless of state
    pub fn list_sessions(&self) -> Result<Vec<SessionDescriptor>> {
        self.provider.sessions()
    }

    /// Pick the session a launch should target
    pub fn resolve_target_session_id(&self, explicit: Option<u32>) -> Result<u32> {
        if explicit.is_none() {
            if let Ok(console) = self.active_console_session_id() {
                debug!(session_id = console, "Resolved console session");
                return Ok(console);
            }
        }

        let active = self.enumerate_active_sessions()?;

        if let Some(requested) = explicit {
            if active.iter().any(|s| s.session_id == requested) {
                debug!(session_id = requested, "Requested session is active");
                return Ok(requested);
            }
        }

        let fallback = active
            .last()
            .map(|s| s.session_id)
            .ok_or(SessionError::SessionNotFound {
                requested: explicit,
            })?;

        warn!(
            requested = ?explicit,
            session_id = fallback,
            "Requested session unavailable, falling back to last active session"
        );
        Ok(fallback)
    }

    /// Process id of `name` in `session_id`.
    ///
    /// Matching is case-insensitive and the `.exe` suffix is optional, so
    /// `"winlogon"` finds `winlogon.exe`.
    pub fn find_system_process_for_session(&self, name: &str, session_id: u32) -> Result<u32> {
        self.provider
            .processes_in_session(session_id)?
            .into_iter()
            .find(|p| image_name_matches(&p.name, name))
            .map(|p| p.process_id)
            .ok_or_else(|| SessionError::NoSuchProcess {
                name: name.to_string(),
                session_id,
            })
    }
}

fn image_name_matches(image: &str, wanted: &str) -> bool {
    fn stem(name: &str) -> &str {
        match name.len().checked_sub(4) {
            Some(cut) if name.is_char_boundary(cut) && name[cut..].eq_ignore_ascii_case(".exe") => &name[..cut],
            _ => name,
        }
    }
    stem(image).eq_ignore_ascii_case(stem(wanted))
}

/// Resolver over the live Terminal Services session table
#[cfg(windows)]
pub fn system_resolver() -> SessionResolver<WtsSessionProvider> {
    SessionResolver::new(WtsSessionProvider)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(id: u32, state: SessionState) -> SessionDescriptor {
        SessionDescriptor {
            session_id: id,
            state,
            station_name: format!("Station{}", id),
        }
    }

    fn resolver_with(console: u32, sessions: Vec<SessionDescriptor>) -> SessionResolver<MockSessionProvider> {
        let mut provider = MockSessionProvider::new();
        provider.expect_console_session_id().return_const(console);
        provider
            .expect_sessions()
            .returning(move || Ok(sessions.clone()));
        SessionResolver::new(provider)
    }

    #[test]
    fn test_default_is_console_session() {
        let resolver = resolver_with(1, vec![session(2, SessionState::Active)]);
        assert_eq!(resolver.resolve_target_session_id(None).unwrap(), 1);
    }

    #[test]
    fn test_no_console_falls_back_to_last_active() {
        let resolver = resolver_with(
            NO_CONSOLE_SESSION,
            vec![session(2, SessionState::Active), session(3, SessionState::Active)],
        );
        assert_eq!(resolver.resolve_target_session_id(None).unwrap(), 3);
    }

    #[test]
    fn test_explicit_active_session() {
        let resolver = resolver_with(
            1,
            vec![
                session(0, SessionState::Disconnected),
                session(1, SessionState::Active),
                session(4, SessionState::Active),
            ],
        );
        assert_eq!(resolver.resolve_target_session_id(Some(1)).unwrap(), 1);
    }

    #[test]
    fn test_explicit_inactive_session_uses_last_active() {
        let resolver = resolver_with(
            1,
            vec![
                session(1, SessionState::Active),
                session(5, SessionState::Disconnected),
                session(6, SessionState::Active),
                session(7, SessionState::Connected),
            ],
        );
        assert_eq!(resolver.resolve_target_session_id(Some(5)).unwrap(), 6);
    }

    #[test]
    fn test_no_active_sessions_is_session_not_found() {
        let resolver = resolver_with(
            NO_CONSOLE_SESSION,
            vec![session(0, SessionState::Other), session(2, SessionState::Disconnected)],
        );
        assert_eq!(
            resolver.resolve_target_session_id(Some(2)),
            Err(SessionError::SessionNotFound { requested: Some(2) })
        );
        assert_eq!(
            resolver.resolve_target_session_id(None),
            Err(SessionError::SessionNotFound { requested: None })
        );
    }

    #[test]
    fn test_enumerate_filters_active() {
        let resolver = resolver_with(
            1,
            vec![
                session(0, SessionState::Other),
                session(1, SessionState::Active),
                session(2, SessionState::Connected),
            ],
        );
        let active = resolver.enumerate_active_sessions().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].session_id, 1);
        assert_eq!(resolver.list_sessions().unwrap().len(), 3);
    }

    #[test]
    fn test_console_sentinel_is_error() {
        let resolver = resolver_with(NO_CONSOLE_SESSION, vec![]);
        assert!(resolver.active_console_session_id().is_err());
    }

    #[test]
    fn test_find_winlogon_case_insensitive() {
        let mut provider = MockSessionProvider::new();
        provider
            .expect_processes_in_session()
            .withf(|id| *id == 3)
            .returning(|_| {
                Ok(vec![
                    ProcessEntry {
                        process_id: 400,
                        name: "csrss.exe".into(),
                    },
                    ProcessEntry {
                        process_id: 512,
                        name: "WinLogon.EXE".into(),
                    },
                ])
            });
        let resolver = SessionResolver::new(provider);

        assert_eq!(resolver.find_system_process_for_session("winlogon", 3).unwrap(), 512);
        assert_eq!(resolver.find_system_process_for_session("winlogon.exe", 3).unwrap(), 512);
    }

    #[test]
    fn test_find_missing_process() {
        let mut provider = MockSessionProvider::new();
        provider.expect_processes_in_session().returning(|_| Ok(vec![]));
        let resolver = SessionResolver::new(provider);

        let err = resolver.find_system_process_for_session("winlogon", 2).unwrap_err();
        assert_eq!(
            err,
            SessionError::NoSuchProcess {
                name: "winlogon".into(),
                session_id: 2
            }
        );
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_image_name_matching() {
        assert!(image_name_matches("winlogon.exe", "winlogon"));
        assert!(image_name_matches("WINLOGON", "winlogon.exe"));
        assert!(!image_name_matches("winlogon2.exe", "winlogon"));
        assert!(!image_name_matches("exe", "winlogon"));
    }
}
