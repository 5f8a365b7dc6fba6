//! Screen Capture
//!
//! Produces JPEG stills of whichever desktop currently receives input, for
//! any number of concurrent viewers.
//!
//! # Architecture
//!
//! ```text
//! viewer A ─┐                        ┌─> GdiCapturer   (BitBlt into one reusable DIB)
//! viewer B ─┼─> CaptureService ──────┤
//! viewer C ─┘   │  per-viewer        └─> DxgiCapturer  (desktop duplication,
//!               │  CaptureContext                        one device per output)
//!               │  (own lock)
//!               └─> one backend lock ─> DesktopSwitch ─> FrameSource::capture_screen
//!                                                         │
//!                          montage (virtual screen) <─────┘
//!                          rotate / resize / JPEG encode
//! ```
//!
//! # Locking
//!
//! Every viewer's [`CaptureContext`] sits behind its own mutex, the backend
//! behind one more. Lock order is always *context, then backend*, so a viewer
//! holding its context (e.g. during a thumbnail selection swap) only ever
//! waits for the backend, and unrelated viewers never wait on each other's
//! settings.
//!
//! # Virtual screen
//!
//! When more than one physical screen exists, [`CaptureService::list_displays`]
//! appends a synthetic entry named [`VIRTUAL_SCREEN_NAME`] covering the union of
//! all screens. Selecting it yields a left-to-right montage of every screen at
//! native height with black padding below shorter screens.

mod encode;
mod error;
mod montage;
mod service;

#[cfg(windows)]
mod backend;
#[cfg(windows)]
mod dxgi;
#[cfg(windows)]
mod gdi;
#[cfg(windows)]
pub(crate) mod surface;

use serde::{Deserialize, Serialize};

pub use encode::{bgra_to_rgb, encode_jpeg, encode_thumbnail, rotate_bgra, thumbnail_size};
pub use error::{CaptureError, Result};
pub use montage::compose_virtual;
pub use service::{
    with_virtual_screen, CaptureContext, CaptureService, CaptureStats, ConnectionId, DEFAULT_QUALITY,
};

#[cfg(windows)]
pub use backend::SystemBackend;
#[cfg(windows)]
pub use dxgi::DxgiCapturer;
#[cfg(windows)]
pub use gdi::GdiCapturer;

/// Name of the synthetic entry spanning all physical screens
pub const VIRTUAL_SCREEN_NAME: &str = "Virtual Screen";

/// Bytes per BGRA pixel
pub const BYTES_PER_PIXEL: usize = 4;

/// Rectangle in virtual-desktop pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ScreenRect {
    /// Left edge (may be negative for screens left of the primary)
    pub x: i32,
    /// Top edge
    pub y: i32,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl ScreenRect {
    /// Create a rectangle
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Exclusive right edge
    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width as i32)
    }

    /// Exclusive bottom edge
    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height as i32)
    }

    /// Check if a point is within this rectangle
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    /// Zero-area rectangle
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Smallest rectangle containing both
    pub fn union(&self, other: &ScreenRect) -> ScreenRect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        ScreenRect::new(x, y, (right - x) as u32, (bottom - y) as u32)
    }

    /// Bounding box of every rectangle in `rects`
    pub fn bounding<'a>(rects: impl IntoIterator<Item = &'a ScreenRect>) -> ScreenRect {
        rects
            .into_iter()
            .fold(ScreenRect::default(), |acc, r| acc.union(r))
    }
}

/// Output orientation as reported by the display driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rotation {
    /// Landscape, no rotation
    #[default]
    Identity,
    /// Rotated 90 degrees
    Rotate90,
    /// Upside down
    Rotate180,
    /// Rotated 270 degrees
    Rotate270,
}

impl Rotation {
    /// Rotation in degrees
    pub fn degrees(&self) -> u16 {
        match self {
            Rotation::Identity => 0,
            Rotation::Rotate90 => 90,
            Rotation::Rotate180 => 180,
            Rotation::Rotate270 => 270,
        }
    }

    /// Whether width and height trade places
    pub fn swaps_axes(&self) -> bool {
        matches!(self, Rotation::Rotate90 | Rotation::Rotate270)
    }
}

/// One capturable screen
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScreenDescriptor {
    /// Device name, e.g. `\\.\DISPLAY1`, or [`VIRTUAL_SCREEN_NAME`]
    pub name: String,
    /// Primary monitor flag
    pub is_primary: bool,
    /// Position and size on the virtual desktop (post-rotation)
    pub bounds: ScreenRect,
    /// Driver-reported orientation
    pub rotation: Rotation,
}

impl ScreenDescriptor {
    /// Width and height in pixels
    pub fn resolution(&self) -> (u32, u32) {
        (self.bounds.width, self.bounds.height)
    }

    /// Whether this is the synthetic all-screens entry
    pub fn is_virtual(&self) -> bool {
        self.name == VIRTUAL_SCREEN_NAME
    }
}

/// Uncompressed top-down BGRA frame
#[derive(Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Bytes per row
    pub stride: usize,
    /// Pixel data, `stride * height` bytes
    pub data: Vec<u8>,
}

impl std::fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl RawFrame {
    /// All-black, tightly packed frame
    pub fn black(width: u32, height: u32) -> Self {
        let stride = width as usize * BYTES_PER_PIXEL;
        Self {
            width,
            height,
            stride,
            data: vec![0; stride * height as usize],
        }
    }

    /// Wrap an existing buffer, checking its size against the dimensions
    pub fn from_bgra(width: u32, height: u32, stride: usize, data: Vec<u8>) -> Result<Self> {
        if stride < width as usize * BYTES_PER_PIXEL {
            return Err(CaptureError::InvalidFrame(format!(
                "stride {} too small for width {}",
                stride, width
            )));
        }
        if data.len() < stride * height as usize {
            return Err(CaptureError::InvalidFrame(format!(
                "{} bytes for {}x{} with stride {}",
                data.len(),
                width,
                height,
                stride
            )));
        }
        Ok(Self {
            width,
            height,
            stride,
            data,
        })
    }

    /// One row of pixels without stride padding
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.width as usize * BYTES_PER_PIXEL]
    }

    /// BGRA value at (x, y)
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let offset = y as usize * self.stride + x as usize * BYTES_PER_PIXEL;
        [
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
            self.data[offset + 3],
        ]
    }
}

/// Capture implementation selected at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CaptureBackendKind {
    /// GDI `BitBlt` from the screen DC; works in every session type
    Gdi,
    /// DXGI desktop duplication; GPU-backed, needs a console session
    Dxgi,
    /// DXGI when duplication can be set up, GDI otherwise
    #[default]
    Auto,
}

impl std::fmt::Display for CaptureBackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gdi => write!(f, "gdi"),
            Self::Dxgi => write!(f, "dxgi"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

impl std::str::FromStr for CaptureBackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gdi" | "bitblt" => Ok(Self::Gdi),
            "dxgi" | "gpu" | "duplication" => Ok(Self::Dxgi),
            "auto" => Ok(Self::Auto),
            _ => Err(format!("Unknown capture backend: {}", s)),
        }
    }
}

/// Common contract of the capture backends
///
/// Implementations are not reentrant; [`CaptureService`] serializes every
/// call under one lock.
pub trait FrameSource: Send {
    /// Which backend this is
    fn kind(&self) -> CaptureBackendKind;

    /// (Re)enumerate outputs, tearing down all previous per-output state.
    ///
    /// Safe to call at any time.
    fn initialize(&mut self) -> Result<()>;

    /// Physical screens found by the last [`FrameSource::initialize`]
    fn screens(&self) -> Vec<ScreenDescriptor>;

    /// Grab one upright frame of `screen`, optionally with the cursor drawn in
    fn capture_screen(&mut self, screen: &ScreenDescriptor, draw_cursor: bool) -> Result<RawFrame>;
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn kind(&self) -> CaptureBackendKind {
        (**self).kind()
    }

    fn initialize(&mut self) -> Result<()> {
        (**self).initialize()
    }

    fn screens(&self) -> Vec<ScreenDescriptor> {
        (**self).screens()
    }

    fn capture_screen(&mut self, screen: &ScreenDescriptor, draw_cursor: bool) -> Result<RawFrame> {
        (**self).capture_screen(screen, draw_cursor)
    }
}
