//! Multi-viewer capture service

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use super::encode::{encode_jpeg, encode_thumbnail};
use super::montage::compose_virtual;
use super::{
    CaptureBackendKind, CaptureError, FrameSource, RawFrame, Result, Rotation, ScreenDescriptor, ScreenRect,
    VIRTUAL_SCREEN_NAME,
};
use crate::desktop::DesktopSwitch;

/// JPEG quality used for new viewers
pub const DEFAULT_QUALITY: u8 = 60;

/// Opaque identifier of one remote viewer
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Fresh random identifier
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Identifier as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-viewer capture settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureContext {
    /// Selected screen name, or [`VIRTUAL_SCREEN_NAME`]
    pub selected_screen: String,
    /// Draw the cursor into frames
    pub draw_cursor: bool,
    /// JPEG quality, 0-100
    pub quality: u8,
    /// Bounds of the selected screen on the virtual desktop
    pub bounds: ScreenRect,
}

/// Capture counters
#[derive(Debug, Default)]
pub struct CaptureStats {
    frames_captured: AtomicU64,
    frames_dropped: AtomicU64,
    reinitializations: AtomicU64,
}

impl CaptureStats {
    /// Frames successfully encoded
    pub fn frames_captured(&self) -> u64 {
        self.frames_captured.load(Ordering::Relaxed)
    }

    /// Frames lost to transient failures
    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped.load(Ordering::Relaxed)
    }

    /// Backend rebuilds after topology changes
    pub fn reinitializations(&self) -> u64 {
        self.reinitializations.load(Ordering::Relaxed)
    }
}

/// Physical screens plus the synthetic virtual entry when there are several
pub fn with_virtual_screen(physical: &[ScreenDescriptor]) -> Vec<ScreenDescriptor> {
    let mut displays = physical.to_vec();
    if physical.len() > 1 {
        displays.push(ScreenDescriptor {
            name: VIRTUAL_SCREEN_NAME.to_string(),
            is_primary: false,
            bounds: ScreenRect::bounding(physical.iter().map(|s| &s.bounds)),
            rotation: Rotation::Identity,
        });
    }
    displays
}

/// Resolve a requested name against the current screen set.
///
/// Unknown names (and the virtual name when only one screen exists) fall back
/// to the first screen.
fn resolve_selection(requested: &str, screens: &[ScreenDescriptor]) -> Option<(String, ScreenRect)> {
    let displays = with_virtual_screen(screens);
    displays
        .iter()
        .find(|d| d.name == requested)
        .or_else(|| screens.first())
        .map(|d| (d.name.clone(), d.bounds))
}

/// Shared capture front end for every viewer
pub struct CaptureService<B> {
    backend: Mutex<B>,
    screens: RwLock<Arc<Vec<ScreenDescriptor>>>,
    contexts: RwLock<HashMap<ConnectionId, Arc<Mutex<CaptureContext>>>>,
    switcher: Arc<dyn DesktopSwitch>,
    default_quality: u8,
    default_draw_cursor: bool,
    stats: CaptureStats,
}

impl<B: FrameSource> CaptureService<B> {
    /// Wrap an uninitialized backend
    pub fn new(backend: B, switcher: Arc<dyn DesktopSwitch>) -> Self {
        Self {
            backend: Mutex::new(backend),
            screens: RwLock::new(Arc::new(Vec::new())),
            contexts: RwLock::new(HashMap::new()),
            switcher,
            default_quality: DEFAULT_QUALITY,
            default_draw_cursor: true,
            stats: CaptureStats::default(),
        }
    }

    /// Defaults applied to viewers opened after this call
    pub fn with_defaults(mut self, quality: u8, draw_cursor: bool) -> Self {
        self.default_quality = quality.min(100);
        self.default_draw_cursor = draw_cursor;
        self
    }

    /// Backend in use
    pub fn backend_kind(&self) -> CaptureBackendKind {
        self.backend.lock().kind()
    }

    /// Capture counters
    pub fn stats(&self) -> &CaptureStats {
        &self.stats
    }

    /// Enumerate outputs, rebuilding all backend state
    pub fn initialize(&self) -> Result<()> {
        let mut backend = self.backend.lock();
        self.reinitialize_locked(&mut backend)?;
        if self.screens.read().is_empty() {
            return Err(CaptureError::NoScreens);
        }
        Ok(())
    }

    fn reinitialize_locked(&self, backend: &mut B) -> Result<()> {
        // Desktop duplication and the screen DC both bind to the thread's desktop.
        self.switcher.switch_to_input_desktop();
        backend.initialize()?;
        let screens = backend.screens();
        info!(
            backend = %backend.kind(),
            count = screens.len(),
            "Capture backend initialized"
        );
        *self.screens.write() = Arc::new(screens);
        Ok(())
    }

    /// Physical screens, plus the virtual screen when there are several
    pub fn list_displays(&self) -> Vec<ScreenDescriptor> {
        with_virtual_screen(&self.screens.read())
    }

    /// Bounding box of every physical screen
    pub fn virtual_bounds(&self) -> ScreenRect {
        ScreenRect::bounding(self.screens.read().iter().map(|s| &s.bounds))
    }

    fn new_context(&self) -> CaptureContext {
        let screens = self.screens.read().clone();
        let initial = screens
            .iter()
            .find(|s| s.is_primary)
            .or_else(|| screens.first())
            .map(|s| (s.name.clone(), s.bounds))
            .unwrap_or_default();
        CaptureContext {
            selected_screen: initial.0,
            draw_cursor: self.default_draw_cursor,
            quality: self.default_quality,
            bounds: initial.1,
        }
    }

    fn context(&self, connection: &ConnectionId) -> Arc<Mutex<CaptureContext>> {
        if let Some(ctx) = self.contexts.read().get(connection) {
            return ctx.clone();
        }
        self.contexts
            .write()
            .entry(connection.clone())
            .or_insert_with(|| Arc::new(Mutex::new(self.new_context())))
            .clone()
    }

    /// Register a viewer, selecting the primary screen
    pub fn open_connection(&self, connection: &ConnectionId) {
        self.context(connection);
        debug!(connection = %connection, "Capture context opened");
    }

    /// Forget a viewer
    pub fn close_connection(&self, connection: &ConnectionId) {
        if self.contexts.write().remove(connection).is_some() {
            debug!(connection = %connection, "Capture context closed");
        }
    }

    /// Number of registered viewers
    pub fn connection_count(&self) -> usize {
        self.contexts.read().len()
    }

    /// Snapshot of a viewer's settings
    pub fn context_snapshot(&self, connection: &ConnectionId) -> Option<CaptureContext> {
        let ctx = self.contexts.read().get(connection).cloned()?;
        let snapshot = ctx.lock().clone();
        Some(snapshot)
    }

    /// Select a screen for a viewer; returns the name actually selected.
    ///
    /// Unknown names fall back to the first enumerated screen.
    pub fn set_selected_screen(&self, connection: &ConnectionId, name: &str) -> Option<String> {
        let ctx = self.context(connection);
        let mut ctx = ctx.lock();
        let screens = self.screens.read().clone();
        let (selected, bounds) = resolve_selection(name, &screens)?;
        if selected != name {
            debug!(
                connection = %connection,
                requested = name,
                selected = %selected,
                "Unknown screen requested, using first screen"
            );
        }
        ctx.selected_screen = selected.clone();
        ctx.bounds = bounds;
        Some(selected)
    }

    /// Screen currently selected by a viewer
    pub fn selected_screen(&self, connection: &ConnectionId) -> Option<String> {
        self.context_snapshot(connection).map(|c| c.selected_screen)
    }

    /// Bounds of a viewer's selected screen
    pub fn screen_bounds(&self, connection: &ConnectionId) -> Option<ScreenRect> {
        self.context_snapshot(connection).map(|c| c.bounds)
    }

    /// Set a viewer's JPEG quality (0-100)
    pub fn set_quality(&self, connection: &ConnectionId, quality: u8) {
        self.context(connection).lock().quality = quality.min(100);
    }

    /// Toggle cursor drawing for a viewer
    pub fn set_cursor_overlay(&self, connection: &ConnectionId, enabled: bool) {
        self.context(connection).lock().draw_cursor = enabled;
    }

    /// Next encoded frame for a viewer, or `None` if this cycle failed.
    ///
    /// Failures are logged and counted, never returned.
    pub fn next_frame(&self, connection: &ConnectionId) -> Option<Bytes> {
        let ctx = self.context(connection);
        let mut ctx = ctx.lock();

        let frame = self.capture_selected(&mut ctx)?;
        match encode_jpeg(&frame, ctx.quality) {
            Ok(jpeg) => {
                self.stats.frames_captured.fetch_add(1, Ordering::Relaxed);
                Some(jpeg)
            }
            Err(e) => {
                self.drop_frame(connection, &e);
                None
            }
        }
    }

    /// Downscaled preview of the whole desktop for a viewer.
    ///
    /// Uses the virtual screen when several screens exist; the viewer's own
    /// selection is restored before the viewer lock is released, so a
    /// concurrent [`CaptureService::next_frame`] for the same viewer never
    /// observes the swap.
    pub fn thumbnail(&self, connection: &ConnectionId, max_width: u32, max_height: u32) -> Option<Bytes> {
        let ctx = self.context(connection);
        let mut ctx = ctx.lock();

        let previous = ctx.clone();
        if self.screens.read().len() > 1 {
            ctx.selected_screen = VIRTUAL_SCREEN_NAME.to_string();
        }
        let frame = self.capture_selected(&mut ctx);
        *ctx = previous;

        let frame = frame?;
        match encode_thumbnail(&frame, max_width, max_height, ctx.quality) {
            Ok(jpeg) => Some(jpeg),
            Err(e) => {
                self.drop_frame(connection, &e);
                None
            }
        }
    }

    fn drop_frame(&self, connection: &ConnectionId, error: &CaptureError) {
        self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
        if error.is_recoverable() {
            trace!(connection = %connection, "Frame dropped: {}", error);
        } else {
            warn!(connection = %connection, "Frame dropped: {}", error);
        }
    }

    /// Capture the context's selection; refreshes its bounds as a side effect.
    fn capture_selected(&self, ctx: &mut CaptureContext) -> Option<RawFrame> {
        let mut backend = self.backend.lock();

        if !self.switcher.switch_to_input_desktop() {
            trace!("Capturing without input desktop switch");
        }

        let screens = self.screens.read().clone();
        let Some((selected, bounds)) = resolve_selection(&ctx.selected_screen, &screens) else {
            self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
            debug!("No screens to capture");
            return None;
        };
        ctx.selected_screen = selected;
        ctx.bounds = bounds;

        let result = if ctx.selected_screen == VIRTUAL_SCREEN_NAME {
            screens
                .iter()
                .map(|screen| Ok((screen.bounds, backend.capture_screen(screen, ctx.draw_cursor)?)))
                .collect::<Result<Vec<_>>>()
                .map(|placed| compose_virtual(&placed))
        } else {
            match screens.iter().find(|s| s.name == ctx.selected_screen) {
                Some(screen) => backend.capture_screen(screen, ctx.draw_cursor),
                None => Err(CaptureError::NoScreens),
            }
        };

        match result {
            Ok(frame) => Some(frame),
            Err(CaptureError::DisplayTopologyChanged(reason)) => {
                info!("Display topology changed ({}), reinitializing capture", reason);
                self.stats.reinitializations.fetch_add(1, Ordering::Relaxed);
                self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
                if let Err(e) = self.reinitialize_locked(&mut backend) {
                    warn!("Capture reinitialization failed: {}", e);
                }
                None
            }
            Err(e) => {
                self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
                if e.is_recoverable() {
                    trace!(screen = %ctx.selected_screen, "Capture failed: {}", e);
                } else {
                    debug!(screen = %ctx.selected_screen, "Capture failed: {}", e);
                }
                None
            }
        }
    }
}
