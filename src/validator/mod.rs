//! Candidate configuration validation.
//!
//! # Data Flow
//! ```text
//! staged snapshot path
//!     → command.rs (run test command with the path substituted)
//!     → ValidationReport { ok, output }
//!     → controller decides promote / discard
//! ```
//!
//! # Design Decisions
//! - Validation never errors: launch problems are failed reports
//! - No test command means every configuration passes
//! - Output is captured whatever the outcome, for the operator's logs

pub mod command;

use std::future::Future;
use std::path::Path;

pub use command::CommandValidator;

/// Outcome of one validation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    /// Whether the configuration may be promoted.
    pub ok: bool,
    /// Combined stdout and stderr of the test command.
    pub output: String,
}

impl ValidationReport {
    pub fn passed(output: impl Into<String>) -> Self {
        Self {
            ok: true,
            output: output.into(),
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            ok: false,
            output: output.into(),
        }
    }
}

/// Anything that can judge a configuration file.
pub trait Validate {
    fn validate(&self, path: &Path) -> impl Future<Output = ValidationReport> + Send;
}
