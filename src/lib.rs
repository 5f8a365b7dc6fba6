//! # lamco-desktop-agent
//!
//! Interactive session control for Windows remote administration.
//!
//! The agent usually runs as a LocalSystem service in session 0. This crate
//! lets it work with whatever the person at the machine is looking at:
//! - [`capture`] - Screen capture of the input desktop (GDI or DXGI duplication)
//! - [`input`] - Synthetic mouse and keyboard injection
//! - [`desktop`] - Following the input desktop across Default, Winlogon and UAC
//! - [`session`] - Terminal Services session resolution
//! - [`launcher`] - Starting processes in another user's session
//!
//! # Architecture
//!
//! ```text
//! control channel (viewer connections)
//!   └─> DesktopAgent
//!         ├─> CaptureService ─> FrameSource (GDI | DXGI) ─> CursorOverlay
//!         ├─> InputInjector  ─> InputSink (SendInput)
//!         ├─> ProcessLauncher ─> SessionResolver ─> SessionProvider (WTS)
//!         └─> DesktopSwitch (shared by capture and input)
//! ```
//!
//! # Data Flow
//!
//! **Video Path:** input desktop → FrameSource → CursorOverlay → montage → JPEG → viewer
//!
//! **Input Path:** viewer → CoordinateMapper → InputInjector queue → desktop switch → SendInput
//!
//! **Launch Path:** request → session resolution → token → pipes → CreateProcessAsUserW
//!
//! Everything except the OS bindings is platform-neutral and runs on any host;
//! the Windows implementations sit behind `cfg(windows)`.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Collaborator-facing facade bundling capture, input and launch
pub mod agent;

/// Screen capture
///
/// Two interchangeable backends behind [`capture::FrameSource`]:
///
/// - **GDI**: `BitBlt` from the screen DC into an offscreen DIB. Works
///   everywhere, including session 0 and RDP sessions.
/// - **DXGI**: desktop duplication per output with a CPU staging texture.
///   Faster on real GPUs; handles rotated outputs.
///
/// [`capture::CaptureService`] keeps per-viewer selection, quality and cursor
/// settings and produces JPEG frames and thumbnails. With several physical
/// screens a synthetic "Virtual Screen" spanning all of them is offered.
pub mod capture;

/// Agent configuration
pub mod config;

/// Cursor placement and overlay drawing
pub mod cursor;

/// Input desktop switching
pub mod desktop;

/// Input injection
///
/// Operator events are queued and executed in order by a small worker pool,
/// each after attaching the worker thread to the input desktop. A view-only
/// toggle drops new events.
pub mod input;

/// Process launch into interactive sessions
pub mod launcher;

/// Terminal Services session resolution
///
/// Console session, active session enumeration, and lookup of system
/// processes (`winlogon.exe`) per session. The policy layer is testable
/// against a mocked [`session::SessionProvider`].
pub mod session;

/// Utility functions
pub mod utils;

pub use agent::DesktopAgent;
