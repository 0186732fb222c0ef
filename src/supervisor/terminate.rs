//! Graceful-then-forced termination.
//!
//! ```text
//! send stop signal ─▶ wait ≤ grace ──exit──▶ Exited
//!                          │
//!                       timeout
//!                          ▼
//!                  force kill ─▶ wait ≤ kill_wait ──exit──▶ Killed
//!                                      │
//!                                   timeout ──▶ Unkillable (fatal)
//! ```

use std::future::Future;
use std::io;
use std::process::ExitStatus;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::process::Child;
use tokio::time;

use super::{SignalName, StopOutcome, SupervisorError};

/// The operations termination needs from a child handle.
pub trait Terminate {
    fn pid(&self) -> Option<u32>;

    fn send_signal(&mut self, signal: Signal) -> Result<(), Errno>;

    fn force_kill(&mut self) -> io::Result<()>;

    fn wait_exit(&mut self) -> impl Future<Output = io::Result<ExitStatus>> + Send;
}

impl Terminate for Child {
    fn pid(&self) -> Option<u32> {
        self.id()
    }

    fn send_signal(&mut self, signal: Signal) -> Result<(), Errno> {
        match self.id() {
            Some(pid) => kill(Pid::from_raw(pid as i32), signal),
            // Already reaped.
            None => Err(Errno::ESRCH),
        }
    }

    fn force_kill(&mut self) -> io::Result<()> {
        self.start_kill()
    }

    fn wait_exit(&mut self) -> impl Future<Output = io::Result<ExitStatus>> + Send {
        self.wait()
    }
}

/// Stop `child`, escalating to a forced kill after `grace`.
pub async fn terminate<T: Terminate>(
    child: &mut T,
    stop_signal: SignalName,
    grace: Duration,
    kill_wait: Duration,
) -> Result<StopOutcome, SupervisorError> {
    let pid = child.pid().unwrap_or_default();

    match child.send_signal(stop_signal.signal()) {
        Ok(()) => tracing::info!(pid, signal = %stop_signal, "Stopping daemon"),
        Err(Errno::ESRCH) => tracing::debug!(pid, "Daemon already gone"),
        Err(e) => tracing::warn!(pid, signal = %stop_signal, error = %e, "Failed to signal daemon"),
    }

    match time::timeout(grace, child.wait_exit()).await {
        Ok(Ok(status)) => {
            tracing::info!(pid, %status, "Daemon stopped");
            return Ok(StopOutcome::Exited(status));
        }
        Ok(Err(e)) => return Err(SupervisorError::Wait(e)),
        Err(_) => tracing::warn!(
            pid,
            grace_secs = grace.as_secs_f64(),
            "Daemon ignored stop signal, killing"
        ),
    }

    if let Err(e) = child.force_kill() {
        tracing::error!(pid, error = %e, "Failed to kill daemon");
    }

    match time::timeout(kill_wait, child.wait_exit()).await {
        Ok(Ok(status)) => {
            tracing::warn!(pid, %status, "Daemon killed");
            Ok(StopOutcome::Killed(status))
        }
        Ok(Err(e)) => Err(SupervisorError::Wait(e)),
        Err(_) => {
            tracing::error!(pid, "Daemon survived forced kill; operator intervention required");
            Err(SupervisorError::Unkillable { pid, waited: kill_wait })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;

    /// Test double whose reaction to signals is scripted.
    struct Scripted {
        exits_on_term: bool,
        exits_on_kill: bool,
        termed: bool,
        killed: bool,
    }

    impl Scripted {
        fn new(exits_on_term: bool, exits_on_kill: bool) -> Self {
            Self {
                exits_on_term,
                exits_on_kill,
                termed: false,
                killed: false,
            }
        }
    }

    impl Terminate for Scripted {
        fn pid(&self) -> Option<u32> {
            Some(4242)
        }

        fn send_signal(&mut self, _signal: Signal) -> Result<(), Errno> {
            self.termed = true;
            Ok(())
        }

        fn force_kill(&mut self) -> io::Result<()> {
            self.killed = true;
            Ok(())
        }

        fn wait_exit(&mut self) -> impl Future<Output = io::Result<ExitStatus>> + Send {
            let exited = (self.termed && self.exits_on_term) || (self.killed && self.exits_on_kill);
            async move {
                if exited {
                    Ok(ExitStatus::from_raw(0))
                } else {
                    std::future::pending().await
                }
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_graceful_exit() {
        let mut child = Scripted::new(true, true);
        let outcome = terminate(&mut child, SignalName::TERMINATE, Duration::from_secs(10), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(matches!(outcome, StopOutcome::Exited(_)));
        assert!(!child.killed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_escalates_to_kill() {
        let mut child = Scripted::new(false, true);
        let outcome = terminate(&mut child, SignalName::TERMINATE, Duration::from_secs(10), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(matches!(outcome, StopOutcome::Killed(_)));
        assert!(child.killed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unkillable_is_fatal() {
        let mut child = Scripted::new(false, false);
        let started = time::Instant::now();
        let err = terminate(&mut child, SignalName::TERMINATE, Duration::from_secs(10), Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(matches!(err, SupervisorError::Unkillable { pid: 4242, .. }));
        assert!(err.is_fatal());
        // Both bounded waits elapsed, nothing more.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(15) && elapsed < Duration::from_secs(16));
    }
}
