//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Prepare watch dir → Wait for gates (path, socket) → Validate live → Start daemon
//!
//! Shutdown (shutdown.rs):
//!     Operator signal → Stop watcher → Stop daemon (graceful, then forced) → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown
//!     SIGHUP → Re-validate and reload the live config
//! ```
//!
//! # Design Decisions
//! - Ordered startup: gates first, daemon last
//! - Ordered shutdown: watcher first so no cycle starts mid-stop
//! - Every stop wait has a deadline

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::OperatorSignal;
