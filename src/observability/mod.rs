//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! watcher / validator / supervisor / controller
//!     → tracing events with structured fields (path, pid, signal, status)
//!     → logging.rs subscriber (stderr, filtered by RUST_LOG)
//! ```
//!
//! # Design Decisions
//! - Structured fields instead of formatted messages
//! - The daemon's own output is inherited, never routed through here
//! - Test command output is attached to the rejection event

pub mod logging;

pub use logging::init_logging;
