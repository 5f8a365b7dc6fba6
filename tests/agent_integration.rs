//! End-to-end tests of the agent facade against in-process fakes
//!
//! Capture, input and launch are wired exactly as the binary wires them; only
//! the OS seams (frame source, input sink, session table) are replaced.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use lamco_desktop_agent::capture::{
    CaptureBackendKind, CaptureError, CaptureService, ConnectionId, FrameSource, RawFrame, Rotation, ScreenDescriptor,
    ScreenRect, VIRTUAL_SCREEN_NAME,
};
use lamco_desktop_agent::desktop::NullDesktopSwitcher;
use lamco_desktop_agent::input::{InputInjector, InputSink, MouseButton, SyntheticInput};
use lamco_desktop_agent::launcher::{LaunchError, LaunchErrorKind, LaunchRequest, ProcessLauncher};
use lamco_desktop_agent::session::{
    ProcessEntry, SessionDescriptor, SessionProvider, SessionResolver, SessionState, NO_CONSOLE_SESSION,
};
use lamco_desktop_agent::DesktopAgent;

/// Brightness the fake backend paints each screen with
const PRIMARY_LEVEL: u8 = 0xF0;
const SECONDARY_LEVEL: u8 = 0x40;

/// 1920x1080 primary enumerated first, plus a 1280x1024 secondary
struct DualScreens {
    secondary_x: i32,
    screens: Vec<ScreenDescriptor>,
}

impl DualScreens {
    /// Secondary to the right of the primary
    fn new() -> Self {
        Self {
            secondary_x: 1920,
            screens: Vec::new(),
        }
    }

    /// Secondary to the left of the primary, at negative desktop x
    fn left_of_primary() -> Self {
        Self {
            secondary_x: -1280,
            screens: Vec::new(),
        }
    }
}

impl FrameSource for DualScreens {
    fn kind(&self) -> CaptureBackendKind {
        CaptureBackendKind::Gdi
    }

    fn initialize(&mut self) -> lamco_desktop_agent::capture::Result<()> {
        self.screens = vec![
            ScreenDescriptor {
                name: "\\\\.\\DISPLAY1".into(),
                is_primary: true,
                bounds: ScreenRect::new(0, 0, 1920, 1080),
                rotation: Rotation::Identity,
            },
            ScreenDescriptor {
                name: "\\\\.\\DISPLAY2".into(),
                is_primary: false,
                bounds: ScreenRect::new(self.secondary_x, 0, 1280, 1024),
                rotation: Rotation::Identity,
            },
        ];
        Ok(())
    }

    fn screens(&self) -> Vec<ScreenDescriptor> {
        self.screens.clone()
    }

    fn capture_screen(
        &mut self,
        screen: &ScreenDescriptor,
        _draw_cursor: bool,
    ) -> lamco_desktop_agent::capture::Result<RawFrame> {
        if screen.is_virtual() {
            return Err(CaptureError::NoScreens);
        }
        let level = if screen.is_primary { PRIMARY_LEVEL } else { SECONDARY_LEVEL };
        let (w, h) = (screen.bounds.width, screen.bounds.height);
        RawFrame::from_bgra(w, h, w as usize * 4, vec![level; w as usize * h as usize * 4])
    }
}

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<SyntheticInput>>,
}

impl InputSink for RecordingSink {
    fn send(&self, input: &SyntheticInput) -> lamco_desktop_agent::input::Result<()> {
        self.events.lock().push(*input);
        Ok(())
    }
}

/// Session table with a fixed console and a list of sessions
struct FixedSessions {
    console: u32,
    sessions: Vec<(u32, SessionState)>,
}

impl SessionProvider for FixedSessions {
    fn console_session_id(&self) -> u32 {
        self.console
    }

    fn sessions(&self) -> lamco_desktop_agent::session::Result<Vec<SessionDescriptor>> {
        Ok(self
            .sessions
            .iter()
            .map(|&(session_id, state)| SessionDescriptor {
                session_id,
                state,
                station_name: format!("RDP-Tcp#{session_id}"),
            })
            .collect())
    }

    fn processes_in_session(&self, session_id: u32) -> lamco_desktop_agent::session::Result<Vec<ProcessEntry>> {
        Ok(vec![ProcessEntry {
            process_id: 1000 + session_id,
            name: "winlogon.exe".into(),
        }])
    }
}

fn build_agent(sessions: FixedSessions) -> (DesktopAgent<DualScreens, FixedSessions>, Arc<RecordingSink>) {
    build_agent_with(DualScreens::new(), sessions)
}

fn build_agent_with(
    screens: DualScreens,
    sessions: FixedSessions,
) -> (DesktopAgent<DualScreens, FixedSessions>, Arc<RecordingSink>) {
    let switcher = Arc::new(NullDesktopSwitcher);
    let capture = CaptureService::new(screens, switcher.clone()).with_defaults(50, false);
    capture.initialize().unwrap();

    let sink = Arc::new(RecordingSink::default());
    let input = InputInjector::new(3, switcher.clone(), sink.clone()).unwrap();
    let launcher = ProcessLauncher::new(SessionResolver::new(sessions));

    (DesktopAgent::new(capture, input, launcher, switcher), sink)
}

fn no_sessions() -> FixedSessions {
    FixedSessions {
        console: NO_CONSOLE_SESSION,
        sessions: Vec::new(),
    }
}

fn wait_for_executed(agent: &DesktopAgent<DualScreens, FixedSessions>, count: u64) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while agent.input().stats().executed() + agent.input().stats().failed() < count {
        assert!(Instant::now() < deadline, "input workers did not drain the queue");
        std::thread::sleep(Duration::from_millis(5));
    }
}

fn decode(jpeg: &[u8]) -> image::RgbImage {
    image::load_from_memory_with_format(jpeg, image::ImageFormat::Jpeg)
        .unwrap()
        .to_rgb8()
}

fn decode_size(jpeg: &[u8]) -> (u32, u32) {
    decode(jpeg).dimensions()
}

/// Which fake screen painted a pixel, tolerant of JPEG error
fn screen_level(img: &image::RgbImage, x: u32, y: u32) -> u8 {
    let level = img.get_pixel(x, y).0[1];
    if level.abs_diff(PRIMARY_LEVEL) < 0x20 {
        PRIMARY_LEVEL
    } else if level.abs_diff(SECONDARY_LEVEL) < 0x20 {
        SECONDARY_LEVEL
    } else {
        level
    }
}

#[test]
fn test_displays_include_virtual_screen() {
    let (agent, _) = build_agent(no_sessions());
    let displays = agent.list_displays();

    assert_eq!(displays.len(), 3);
    let virtual_screen = displays.last().unwrap();
    assert_eq!(virtual_screen.name, VIRTUAL_SCREEN_NAME);
    assert_eq!(virtual_screen.bounds, ScreenRect::new(0, 0, 3200, 1080));
}

#[test]
fn test_frames_follow_screen_selection() {
    let (agent, _) = build_agent(no_sessions());
    let conn = ConnectionId::from("viewer-1");
    agent.connect(&conn);

    let frame = agent.next_frame(&conn).unwrap();
    assert_eq!(decode_size(&frame), (1920, 1080));

    assert_eq!(agent.set_selected_screen(&conn, "\\\\.\\DISPLAY2").as_deref(), Some("\\\\.\\DISPLAY2"));
    let frame = agent.next_frame(&conn).unwrap();
    assert_eq!(decode_size(&frame), (1280, 1024));

    agent.set_selected_screen(&conn, VIRTUAL_SCREEN_NAME);
    let frame = agent.next_frame(&conn).unwrap();
    assert_eq!(decode_size(&frame), (3200, 1080));
    assert_eq!(agent.capture().stats().frames_captured(), 3);
}

#[test]
fn test_thumbnail_keeps_viewer_selection() {
    let (agent, _) = build_agent(no_sessions());
    let conn = ConnectionId::from("viewer-1");
    agent.connect(&conn);
    agent.set_selected_screen(&conn, "\\\\.\\DISPLAY2");

    let thumb = agent.thumbnail(&conn, 320, 180).unwrap();
    let (w, h) = decode_size(&thumb);
    assert!(w <= 320 && h <= 180);

    assert_eq!(agent.capture().selected_screen(&conn).as_deref(), Some("\\\\.\\DISPLAY2"));
}

#[test]
fn test_viewers_are_independent() {
    let (agent, _) = build_agent(no_sessions());
    let a = ConnectionId::from("a");
    let b = ConnectionId::from("b");
    agent.connect(&a);
    agent.connect(&b);

    agent.set_selected_screen(&a, "\\\\.\\DISPLAY2");
    agent.set_quality(&b, 90);

    assert_eq!(agent.capture().selected_screen(&b).as_deref(), Some("\\\\.\\DISPLAY1"));
    assert_eq!(agent.capture().context_snapshot(&a).unwrap().quality, 50);

    agent.disconnect(&a);
    assert_eq!(agent.capture().connection_count(), 1);
}

#[test]
fn test_click_on_secondary_screen_maps_into_virtual_desktop() {
    let (agent, sink) = build_agent(no_sessions());
    let conn = ConnectionId::from("viewer-1");
    agent.connect(&conn);
    agent.set_selected_screen(&conn, "\\\\.\\DISPLAY2");

    assert!(agent.enqueue_mouse_button(&conn, 0.5, 0.5, 0, true));
    assert!(agent.enqueue_mouse_button(&conn, 0.5, 0.5, 0, false));
    wait_for_executed(&agent, 2);

    let events = sink.events.lock().clone();
    let expected_move = SyntheticInput::MouseMove { x: 52428, y: 31068 };
    assert_eq!(
        events,
        vec![
            expected_move,
            SyntheticInput::MouseButton {
                button: MouseButton::Left,
                pressed: true
            },
            expected_move,
            SyntheticInput::MouseButton {
                button: MouseButton::Left,
                pressed: false
            },
        ]
    );
}

#[test]
fn test_virtual_click_lands_on_screen_shown_in_montage() {
    let (agent, sink) = build_agent_with(DualScreens::left_of_primary(), no_sessions());
    let conn = ConnectionId::from("viewer-1");
    agent.connect(&conn);
    agent.set_selected_screen(&conn, VIRTUAL_SCREEN_NAME);
    assert_eq!(agent.capture().virtual_bounds(), ScreenRect::new(-1280, 0, 3200, 1080));

    let montage = decode(&agent.next_frame(&conn).unwrap());
    assert_eq!(montage.dimensions(), (3200, 1080));
    // secondary fills the left 1280 columns, primary the rest
    assert_eq!(screen_level(&montage, 320, 540), SECONDARY_LEVEL);
    assert_eq!(screen_level(&montage, 1300, 540), PRIMARY_LEVEL);
    assert_eq!(screen_level(&montage, 2560, 540), PRIMARY_LEVEL);

    assert!(agent.enqueue_mouse_move(&conn, 0.1, 0.5));
    assert!(agent.enqueue_mouse_move(&conn, 0.8, 0.5));
    wait_for_executed(&agent, 2);

    let events = sink.events.lock().clone();
    assert_eq!(
        events,
        vec![
            SyntheticInput::MouseMove { x: 6554, y: 32768 },
            SyntheticInput::MouseMove { x: 52428, y: 32768 },
        ]
    );

    // absolute x back to desktop pixels: -1280 + ax / 65535 * 3200
    let desktop_x = |ax: u16| -1280 + (f64::from(ax) / 65535.0 * 3200.0).round() as i32;
    assert!((-1280..0).contains(&desktop_x(6554)));
    assert!((0..1920).contains(&desktop_x(52428)));
}

#[test]
fn test_concurrent_viewers_get_their_own_screens() {
    let (agent, _) = build_agent(no_sessions());
    let primary = ConnectionId::from("primary-viewer");
    let overview = ConnectionId::from("overview-viewer");
    agent.connect(&primary);
    agent.set_selected_screen(&overview, VIRTUAL_SCREEN_NAME);

    std::thread::scope(|scope| {
        let agent = &agent;
        let primary = &primary;
        let overview = &overview;
        scope.spawn(move || {
            for _ in 0..6 {
                assert_eq!(decode_size(&agent.next_frame(primary).unwrap()), (1920, 1080));
            }
        });
        scope.spawn(move || {
            for _ in 0..6 {
                assert_eq!(decode_size(&agent.next_frame(overview).unwrap()), (3200, 1080));
            }
        });
    });

    assert_eq!(agent.capture().stats().frames_captured(), 12);
    assert_eq!(agent.capture().stats().frames_dropped(), 0);
}

#[test]
fn test_thumbnail_swap_invisible_to_concurrent_frames() {
    let (agent, _) = build_agent(no_sessions());
    let conn = ConnectionId::from("viewer-1");
    agent.connect(&conn);
    agent.set_selected_screen(&conn, "\\\\.\\DISPLAY2");

    std::thread::scope(|scope| {
        let agent = &agent;
        let conn = &conn;
        scope.spawn(move || {
            for _ in 0..8 {
                let frame = decode(&agent.next_frame(conn).unwrap());
                assert_eq!(frame.dimensions(), (1280, 1024));
                assert_eq!(screen_level(&frame, 640, 512), SECONDARY_LEVEL);
            }
        });
        scope.spawn(move || {
            for _ in 0..8 {
                // 3200x1080 desktop scaled into 320x180
                assert_eq!(decode_size(&agent.thumbnail(conn, 320, 180).unwrap()), (320, 108));
            }
        });
    });

    assert_eq!(agent.capture().selected_screen(&conn).as_deref(), Some("\\\\.\\DISPLAY2"));
    assert_eq!(agent.capture().screen_bounds(&conn), Some(ScreenRect::new(1920, 0, 1280, 1024)));
}

#[test]
fn test_key_order_preserved_across_workers() {
    let (agent, sink) = build_agent(no_sessions());

    for vk in 0x41u16..0x41 + 26 {
        assert!(agent.enqueue_key(vk, true));
        assert!(agent.enqueue_key(vk, false));
    }
    wait_for_executed(&agent, 52);

    let keys: Vec<(u16, bool)> = sink
        .events
        .lock()
        .iter()
        .map(|e| match *e {
            SyntheticInput::Key { virtual_key, pressed } => (virtual_key, pressed),
            other => panic!("unexpected event {other:?}"),
        })
        .collect();
    let expected: Vec<(u16, bool)> = (0x41u16..0x41 + 26).flat_map(|vk| [(vk, true), (vk, false)]).collect();
    assert_eq!(keys, expected);
}

#[test]
fn test_view_only_mode_drops_input() {
    let (agent, sink) = build_agent(no_sessions());
    let conn = ConnectionId::from("viewer-1");
    agent.connect(&conn);

    agent.set_input_enabled(false);
    assert!(!agent.enqueue_key(0x0D, true));
    assert!(!agent.enqueue_mouse_move(&conn, 0.1, 0.1));
    assert!(!agent.enqueue_mouse_wheel(1.0));
    assert_eq!(agent.input().stats().dropped(), 3);

    agent.set_input_enabled(true);
    assert!(agent.enqueue_mouse_wheel(1.0));
    wait_for_executed(&agent, 1);
    assert_eq!(*sink.events.lock(), vec![SyntheticInput::MouseWheel { delta: -120 }]);
}

#[test]
fn test_unknown_viewer_has_no_pointer_mapping() {
    let (agent, sink) = build_agent(no_sessions());
    assert!(!agent.enqueue_mouse_move(&ConnectionId::from("never-connected"), 0.25, 0.0));

    let conn = ConnectionId::from("viewer-1");
    agent.connect(&conn);
    assert!(!agent.enqueue_mouse_button(&conn, 0.25, 0.0, 7, true));
    assert!(agent.enqueue_mouse_move(&conn, 0.25, 0.0));
    wait_for_executed(&agent, 1);
    assert_eq!(*sink.events.lock(), vec![SyntheticInput::MouseMove { x: 9830, y: 0 }]);
}

#[test]
fn test_launch_without_any_session_fails_before_touching_the_os() {
    let (agent, _) = build_agent(no_sessions());
    let request = LaunchRequest::new("C:\\Windows\\System32\\cmd.exe").arg("/c").arg("ver");

    let err = agent.launch_in_session(&request).unwrap_err();
    assert_eq!(err.kind(), LaunchErrorKind::SessionNotFound);
    assert!(err.is_recoverable());
}

#[cfg(not(windows))]
#[test]
fn test_launch_reports_unsupported_off_windows() {
    let (agent, _) = build_agent(FixedSessions {
        console: 1,
        sessions: vec![(1, SessionState::Active)],
    });
    let request = LaunchRequest::new("/bin/true");

    let err = agent.launch_in_session(&request).unwrap_err();
    assert!(matches!(err, LaunchError::Unsupported(_)));
    assert_eq!(err.kind(), LaunchErrorKind::Other);
}

#[test]
fn test_desktop_queries_delegate_to_switcher() {
    let (agent, _) = build_agent(no_sessions());
    assert!(agent.switch_to_input_desktop());
    assert_eq!(agent.current_desktop_name(), None);
}
