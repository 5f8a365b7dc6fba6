//! Host diagnostics and operator error reports
//!
//! [`SystemInfo`] describes the machine and the session the agent runs in.
//! [`RuntimeStats`] folds capture and input counters into one loggable line.
//! [`format_user_error`] renders an error chain with troubleshooting hints.
//!
//! ```rust,no_run
//! use lamco_desktop_agent::utils::{format_user_error, SystemInfo};
//!
//! let info = SystemInfo::gather();
//! info.log();
//! if info.in_service_session() {
//!     println!("running as a service in session 0");
//! }
//!
//! # fn launch() -> anyhow::Result<()> { Ok(()) }
//! if let Err(e) = launch() {
//!     eprintln!("{}", format_user_error(&e));
//! }
//! ```

pub mod diagnostics;
pub mod errors;

pub use diagnostics::{current_session_id, log_startup_diagnostics, RuntimeStats, SystemInfo};
pub use errors::format_user_error;
