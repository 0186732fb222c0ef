//! The production supervisor: one child process spawned from a command.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use nix::sys::signal::kill;
use nix::unistd::Pid;
use tokio::process::Child;
use tokio::time;

use super::terminate::terminate;
use super::{DaemonControl, DaemonStatus, ReloadOutcome, SignalName, StopOutcome, SupervisorError, SupervisorState};
use crate::command::CommandSpec;

/// Default wait after the forced kill before declaring the daemon unkillable.
pub const DEFAULT_KILL_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on a reload command.
pub const DEFAULT_RELOAD_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// How a running daemon is told to re-read its configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadAction {
    Signal(SignalName),
    Command(CommandSpec),
}

impl Default for ReloadAction {
    fn default() -> Self {
        ReloadAction::Signal(SignalName::HANGUP)
    }
}

/// Owns the daemon's child handle and drives its lifecycle.
#[derive(Debug)]
pub struct ProcessSupervisor {
    command: CommandSpec,
    reload: ReloadAction,
    stop_signal: SignalName,
    kill_timeout: Duration,
    reload_command_timeout: Duration,
    state: SupervisorState,
    child: Option<Child>,
    pid: Option<u32>,
    last_exit: Option<ExitStatus>,
}

impl ProcessSupervisor {
    pub fn new(command: CommandSpec) -> Self {
        Self {
            command,
            reload: ReloadAction::default(),
            stop_signal: SignalName::TERMINATE,
            kill_timeout: DEFAULT_KILL_TIMEOUT,
            reload_command_timeout: DEFAULT_RELOAD_COMMAND_TIMEOUT,
            state: SupervisorState::Stopped,
            child: None,
            pid: None,
            last_exit: None,
        }
    }

    pub fn with_reload(mut self, reload: ReloadAction) -> Self {
        self.reload = reload;
        self
    }

    pub fn with_stop_signal(mut self, signal: SignalName) -> Self {
        self.stop_signal = signal;
        self
    }

    pub fn with_kill_timeout(mut self, timeout: Duration) -> Self {
        self.kill_timeout = timeout;
        self
    }

    pub fn with_reload_command_timeout(mut self, timeout: Duration) -> Self {
        self.reload_command_timeout = timeout;
        self
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn status(&self) -> DaemonStatus {
        DaemonStatus {
            state: self.state,
            pid: self.pid,
            last_exit: self.last_exit,
        }
    }

    fn spawn(&mut self) -> Result<(), SupervisorError> {
        self.state = SupervisorState::Starting;

        let mut cmd = self.command.command();
        cmd.stdin(Stdio::null()).kill_on_drop(true);

        match cmd.spawn() {
            Ok(child) => {
                let pid = child.id();
                tracing::info!(command = %self.command, pid = ?pid, "Daemon started");
                self.child = Some(child);
                self.pid = pid;
                self.state = SupervisorState::Running;
                Ok(())
            }
            Err(source) => {
                self.state = SupervisorState::Stopped;
                Err(SupervisorError::Spawn {
                    command: self.command.to_string(),
                    source,
                })
            }
        }
    }

    fn deliver(&self, signal: SignalName) -> Result<(), SupervisorError> {
        // pid 0 would signal our own process group.
        let pid = self.pid.ok_or(SupervisorError::NotRunning)?;
        kill(Pid::from_raw(pid as i32), signal.signal())
            .map_err(|source| SupervisorError::Signal { pid, signal, source })?;
        tracing::info!(pid, %signal, "Reload signal sent");
        Ok(())
    }

    async fn run_reload_command(&self, spec: &CommandSpec) -> Result<(), SupervisorError> {
        let failed = |reason: String| SupervisorError::ReloadCommand {
            command: spec.to_string(),
            reason,
        };

        let mut cmd = spec.command();
        cmd.stdin(Stdio::null()).kill_on_drop(true);
        let mut child = cmd.spawn().map_err(|e| failed(e.to_string()))?;

        let status = time::timeout(self.reload_command_timeout, child.wait())
            .await
            .map_err(|_| failed(format!("timed out after {:?}", self.reload_command_timeout)))?
            .map_err(|e| failed(e.to_string()))?;

        if !status.success() {
            return Err(failed(format!("exited with {status}")));
        }
        tracing::info!(command = %spec, "Reload command finished");
        Ok(())
    }
}

impl DaemonControl for ProcessSupervisor {
    async fn start(&mut self) -> Result<(), SupervisorError> {
        if self.is_running() {
            tracing::debug!(pid = ?self.pid, "Daemon already running");
            return Ok(());
        }
        self.spawn()
    }

    async fn reload(&mut self) -> Result<ReloadOutcome, SupervisorError> {
        if !self.is_running() {
            tracing::info!("Daemon not running, starting instead of reloading");
            self.spawn()?;
            return Ok(ReloadOutcome::Started);
        }

        match &self.reload {
            ReloadAction::Signal(signal) => {
                self.deliver(*signal)?;
                Ok(ReloadOutcome::Signaled)
            }
            ReloadAction::Command(spec) => {
                self.run_reload_command(spec).await?;
                Ok(ReloadOutcome::RanCommand)
            }
        }
    }

    async fn stop(&mut self, timeout: Duration) -> Result<StopOutcome, SupervisorError> {
        if !self.is_running() {
            return Ok(StopOutcome::NotRunning);
        }
        let Some(child) = self.child.as_mut() else {
            return Ok(StopOutcome::NotRunning);
        };

        self.state = SupervisorState::Stopping;
        // On error the child stays owned here, in `Stopping`.
        let outcome = terminate(child, self.stop_signal, timeout, self.kill_timeout).await?;

        if let StopOutcome::Exited(status) | StopOutcome::Killed(status) = outcome {
            self.last_exit = Some(status);
        }
        self.child = None;
        self.pid = None;
        self.state = SupervisorState::Stopped;
        Ok(outcome)
    }

    fn is_running(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };

        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                tracing::warn!(pid = ?self.pid, %status, "Daemon exited");
                self.last_exit = Some(status);
                self.child = None;
                self.pid = None;
                self.state = SupervisorState::Stopped;
                false
            }
            Err(e) => {
                tracing::warn!(pid = ?self.pid, error = %e, "Cannot query daemon status");
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_without_daemon_is_refused() {
        let supervisor = ProcessSupervisor::new("sleep 30".parse().unwrap());
        let err = supervisor.deliver(SignalName::HANGUP).unwrap_err();
        assert!(matches!(err, SupervisorError::NotRunning));
        assert!(!err.is_fatal());
    }
}
