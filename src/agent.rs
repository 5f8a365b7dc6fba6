//! Collaborator-facing surface
//!
//! [`DesktopAgent`] bundles capture, input injection, process launch and
//! desktop diagnostics behind the calls a control-channel handler makes for
//! each connected viewer.

use std::sync::Arc;

use bytes::Bytes;
use tracing::debug;

use crate::capture::{CaptureService, ConnectionId, FrameSource, ScreenDescriptor};
use crate::desktop::DesktopSwitch;
use crate::input::{CoordinateMapper, InputInjector};
use crate::launcher::{LaunchRequest, ProcessHandleSet, ProcessLauncher};
use crate::session::SessionProvider;

/// Engine facade used by the control channel
pub struct DesktopAgent<B, P> {
    capture: CaptureService<B>,
    input: InputInjector,
    launcher: ProcessLauncher<P>,
    switcher: Arc<dyn DesktopSwitch>,
}

impl<B: FrameSource, P: SessionProvider> DesktopAgent<B, P> {
    /// Assemble an agent from its parts
    pub fn new(
        capture: CaptureService<B>,
        input: InputInjector,
        launcher: ProcessLauncher<P>,
        switcher: Arc<dyn DesktopSwitch>,
    ) -> Self {
        Self {
            capture,
            input,
            launcher,
            switcher,
        }
    }

    /// Capture service
    pub fn capture(&self) -> &CaptureService<B> {
        &self.capture
    }

    /// Input injector
    pub fn input(&self) -> &InputInjector {
        &self.input
    }

    /// Process launcher
    pub fn launcher(&self) -> &ProcessLauncher<P> {
        &self.launcher
    }

    /// Register a viewer
    pub fn connect(&self, connection: &ConnectionId) {
        self.capture.open_connection(connection);
    }

    /// Forget a viewer
    pub fn disconnect(&self, connection: &ConnectionId) {
        self.capture.close_connection(connection);
    }

    /// Screens a viewer can select
    pub fn list_displays(&self) -> Vec<ScreenDescriptor> {
        self.capture.list_displays()
    }

    /// Select a screen for `connection`; returns the screen actually selected
    pub fn set_selected_screen(&self, connection: &ConnectionId, name: &str) -> Option<String> {
        self.capture.set_selected_screen(connection, name)
    }

    /// Next encoded frame for `connection`
    pub fn next_frame(&self, connection: &ConnectionId) -> Option<Bytes> {
        self.capture.next_frame(connection)
    }

    /// Downscaled frame for `connection`
    pub fn thumbnail(&self, connection: &ConnectionId, max_width: u32, max_height: u32) -> Option<Bytes> {
        self.capture.thumbnail(connection, max_width, max_height)
    }

    /// JPEG quality for `connection`
    pub fn set_quality(&self, connection: &ConnectionId, quality: u8) {
        self.capture.set_quality(connection, quality);
    }

    /// Cursor overlay toggle for `connection`
    pub fn set_cursor_overlay(&self, connection: &ConnectionId, enabled: bool) {
        self.capture.set_cursor_overlay(connection, enabled);
    }

    fn mapper_for(&self, connection: &ConnectionId) -> Option<CoordinateMapper> {
        let screen = self.capture.screen_bounds(connection)?;
        match CoordinateMapper::new(screen, self.capture.virtual_bounds()) {
            Ok(mapper) => Some(mapper),
            Err(e) => {
                debug!(connection = %connection, "No coordinate mapping: {}", e);
                None
            }
        }
    }

    /// Pointer move to fractions of the viewer's selected screen
    pub fn enqueue_mouse_move(&self, connection: &ConnectionId, x: f64, y: f64) -> bool {
        self.mapper_for(connection)
            .is_some_and(|mapper| self.input.enqueue_mouse_move(&mapper, x, y))
    }

    /// Button press or release at fractions of the viewer's selected screen
    pub fn enqueue_mouse_button(&self, connection: &ConnectionId, x: f64, y: f64, button: u8, pressed: bool) -> bool {
        self.mapper_for(connection)
            .is_some_and(|mapper| self.input.enqueue_mouse_button(&mapper, x, y, button, pressed))
    }

    /// One wheel notch
    pub fn enqueue_mouse_wheel(&self, delta: f64) -> bool {
        self.input.enqueue_mouse_wheel(delta)
    }

    /// Virtual-key press or release
    pub fn enqueue_key(&self, virtual_key: u16, pressed: bool) -> bool {
        self.input.enqueue_key(virtual_key, pressed)
    }

    /// View-only toggle
    pub fn set_input_enabled(&self, enabled: bool) {
        self.input.set_input_enabled(enabled);
    }

    /// Start a process in another session
    pub fn launch_in_session(&self, request: &LaunchRequest) -> crate::launcher::Result<ProcessHandleSet> {
        self.launcher.launch(request)
    }

    /// Name of the desktop receiving input
    pub fn current_desktop_name(&self) -> Option<String> {
        self.switcher.current_desktop_name()
    }

    /// Attach the calling thread to the input desktop
    pub fn switch_to_input_desktop(&self) -> bool {
        self.switcher.switch_to_input_desktop()
    }
}
