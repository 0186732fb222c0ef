//! Supervision of the single daemon process.
//!
//! # States
//! - Stopped: no child process
//! - Starting: spawn in progress
//! - Running: child alive
//! - Stopping: graceful signal sent, waiting for exit
//!
//! # State Transitions
//! ```text
//! Stopped  → Starting → Running    start() (spawn failure returns to Stopped)
//! Running  → Running               reload() (signal or reload command)
//! Stopped  → Starting → Running    reload() when nothing runs
//! Running  → Stopping → Stopped    stop() (graceful, then forced)
//! Running  → Stopped               child exited on its own (seen by is_running)
//! ```
//!
//! # Design Decisions
//! - One owned child handle; the controller only issues intents
//! - Every wait is bounded; an unkillable daemon is a fatal error
//! - The daemon inherits our stdout/stderr so its logs stay visible

pub mod process;
pub mod signal;
pub mod terminate;

use std::future::Future;
use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use nix::errno::Errno;
use thiserror::Error;

pub use process::ProcessSupervisor;
pub use signal::SignalName;

/// Lifecycle state of the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Read-only view of the supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaemonStatus {
    pub state: SupervisorState,
    /// Process id of the current child, if any.
    pub pid: Option<u32>,
    /// Exit status of the most recent child that exited.
    pub last_exit: Option<ExitStatus>,
}

/// What `reload()` ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// The running daemon was sent the reload signal.
    Signaled,
    /// The reload command ran successfully.
    RanCommand,
    /// Nothing was running, so the daemon was started.
    Started,
}

/// How a `stop()` settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    NotRunning,
    /// Exited after the graceful signal.
    Exited(ExitStatus),
    /// Had to be killed after the graceful timeout.
    Killed(ExitStatus),
}

impl StopOutcome {
    /// Whether the daemon stopped without escalation.
    pub fn is_clean(&self) -> bool {
        !matches!(self, StopOutcome::Killed(_))
    }
}

/// Errors raised by the supervisor.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The daemon could not be spawned.
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// Signal delivery failed.
    #[error("failed to send {signal} to pid {pid}: {source}")]
    Signal {
        pid: u32,
        signal: SignalName,
        #[source]
        source: Errno,
    },

    /// The reload command could not run or exited non-zero.
    #[error("reload command `{command}` failed: {reason}")]
    ReloadCommand { command: String, reason: String },

    /// Waiting on the child failed.
    #[error("failed to wait for daemon: {0}")]
    Wait(#[source] io::Error),

    /// A signal was requested but no daemon process is known.
    #[error("daemon is not running")]
    NotRunning,

    /// The daemon survived the forced kill. Operator intervention required.
    #[error("daemon pid {pid} still alive {waited:?} after forced kill")]
    Unkillable { pid: u32, waited: Duration },
}

impl SupervisorError {
    /// Errors that must terminate the whole program.
    ///
    /// A missing or non-executable daemon binary can never start, since the
    /// command never changes.
    pub fn is_fatal(&self) -> bool {
        match self {
            SupervisorError::Unkillable { .. } => true,
            SupervisorError::Spawn { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied
            ),
            _ => false,
        }
    }
}

/// Lifecycle intents the controller issues.
pub trait DaemonControl {
    fn start(&mut self) -> impl Future<Output = Result<(), SupervisorError>> + Send;

    fn reload(&mut self) -> impl Future<Output = Result<ReloadOutcome, SupervisorError>> + Send;

    fn stop(&mut self, timeout: Duration) -> impl Future<Output = Result<StopOutcome, SupervisorError>> + Send;

    fn is_running(&mut self) -> bool;
}
