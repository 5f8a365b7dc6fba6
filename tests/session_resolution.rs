use lamco_desktop_agent::session::{
    ProcessEntry, SessionDescriptor, SessionError, SessionProvider, SessionResolver, SessionState, NO_CONSOLE_SESSION,
};

/// Terminal server with an idle console and a few RDP sessions
struct TerminalServer {
    console: u32,
    table: Vec<(u32, SessionState, &'static str)>,
    processes: Vec<(u32, u32, &'static str)>,
}

impl TerminalServer {
    fn busy() -> Self {
        Self {
            console: 1,
            table: vec![
                (0, SessionState::Disconnected, "Services"),
                (1, SessionState::Connected, "Console"),
                (2, SessionState::Active, "RDP-Tcp#0"),
                (3, SessionState::Disconnected, "RDP-Tcp#1"),
                (5, SessionState::Active, "RDP-Tcp#4"),
                (65536, SessionState::Other, "RDP-Tcp"),
            ],
            processes: vec![
                (1, 612, "winlogon.exe"),
                (1, 640, "csrss.exe"),
                (2, 2044, "WINLOGON.EXE"),
                (2, 3120, "explorer.exe"),
                (5, 4410, "winlogon.exe"),
            ],
        }
    }
}

impl SessionProvider for TerminalServer {
    fn console_session_id(&self) -> u32 {
        self.console
    }

    fn sessions(&self) -> lamco_desktop_agent::session::Result<Vec<SessionDescriptor>> {
        Ok(self
            .table
            .iter()
            .map(|&(session_id, state, station)| SessionDescriptor {
                session_id,
                state,
                station_name: station.to_string(),
            })
            .collect())
    }

    fn processes_in_session(&self, session_id: u32) -> lamco_desktop_agent::session::Result<Vec<ProcessEntry>> {
        Ok(self
            .processes
            .iter()
            .filter(|(sid, _, _)| *sid == session_id)
            .map(|&(_, process_id, name)| ProcessEntry {
                process_id,
                name: name.to_string(),
            })
            .collect())
    }
}

#[test]
fn test_console_is_default_target() {
    let resolver = SessionResolver::new(TerminalServer::busy());
    assert_eq!(resolver.resolve_target_session_id(None).unwrap(), 1);
}

#[test]
fn test_explicit_active_session_is_honoured() {
    let resolver = SessionResolver::new(TerminalServer::busy());
    assert_eq!(resolver.resolve_target_session_id(Some(2)).unwrap(), 2);
}

#[test]
fn test_inactive_request_falls_back_to_last_active() {
    let resolver = SessionResolver::new(TerminalServer::busy());
    // 3 is disconnected, 9 does not exist
    assert_eq!(resolver.resolve_target_session_id(Some(3)).unwrap(), 5);
    assert_eq!(resolver.resolve_target_session_id(Some(9)).unwrap(), 5);
}

#[test]
fn test_detached_console_uses_active_sessions() {
    let mut server = TerminalServer::busy();
    server.console = NO_CONSOLE_SESSION;
    let resolver = SessionResolver::new(server);

    assert!(resolver.active_console_session_id().is_err());
    assert_eq!(resolver.resolve_target_session_id(None).unwrap(), 5);
}

#[test]
fn test_no_active_session_is_an_error() {
    let mut server = TerminalServer::busy();
    server.console = NO_CONSOLE_SESSION;
    server.table.retain(|(_, state, _)| *state != SessionState::Active);
    let resolver = SessionResolver::new(server);

    assert_eq!(
        resolver.resolve_target_session_id(Some(2)).unwrap_err(),
        SessionError::SessionNotFound { requested: Some(2) }
    );
}

#[test]
fn test_listing_keeps_every_state() {
    let resolver = SessionResolver::new(TerminalServer::busy());
    assert_eq!(resolver.list_sessions().unwrap().len(), 6);

    let active: Vec<u32> = resolver
        .enumerate_active_sessions()
        .unwrap()
        .iter()
        .map(|s| s.session_id)
        .collect();
    assert_eq!(active, vec![2, 5]);
}

#[test]
fn test_winlogon_lookup_per_session() {
    let resolver = SessionResolver::new(TerminalServer::busy());

    assert_eq!(resolver.find_system_process_for_session("winlogon", 1).unwrap(), 612);
    assert_eq!(resolver.find_system_process_for_session("winlogon.exe", 2).unwrap(), 2044);
    assert_eq!(
        resolver.find_system_process_for_session("winlogon", 3).unwrap_err(),
        SessionError::NoSuchProcess {
            name: "winlogon".into(),
            session_id: 3
        }
    );
}
