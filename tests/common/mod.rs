//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::fs;
use std::future::Future;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::Semaphore;

use reloadconf::supervisor::{DaemonControl, ReloadOutcome, StopOutcome, SupervisorError};
use reloadconf::validator::{CommandValidator, Validate, ValidationReport};

/// Test command that accepts files whose first line starts with `valid`.
pub const CHECK_SCRIPT: &str =
    r#"sh -c 'head -n 1 "$1" | grep -q "^valid" || { echo "bad config: $1" >&2; exit 1; }' check {}"#;

pub fn check_validator() -> CommandValidator {
    CommandValidator::new(Some(CHECK_SCRIPT.parse().unwrap()))
}

/// A watch directory and a live config path inside one temp dir.
pub struct Workspace {
    pub dir: TempDir,
    pub watch: PathBuf,
    pub live: PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let watch = dir.path().join("incoming");
        let etc = dir.path().join("etc");
        fs::create_dir_all(&watch).unwrap();
        fs::create_dir_all(&etc).unwrap();
        Self {
            live: etc.join("app.conf"),
            watch,
            dir,
        }
    }

    pub fn candidate(&self) -> PathBuf {
        self.watch.join("app.conf")
    }

    pub fn drop_candidate(&self, content: &str) -> PathBuf {
        let path = self.candidate();
        fs::write(&path, content).unwrap();
        path
    }

    pub fn write_live(&self, content: &str) {
        fs::write(&self.live, content).unwrap();
    }

    pub fn live_content(&self) -> Option<String> {
        fs::read_to_string(&self.live).ok()
    }

    /// Write a shell script into the temp dir, to be run as `sh <script>`.
    pub fn script(&self, name: &str, body: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, format!("{body}\n")).unwrap();
        path
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

/// What the controller asked a `FakeDaemon` to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Start,
    Reload,
    Stop,
}

/// In-memory daemon that records every lifecycle call.
#[derive(Debug, Default)]
pub struct FakeDaemon {
    pub calls: Vec<Call>,
    pub running: bool,
    /// Spawn error kind returned by `start` and by `reload` when stopped.
    pub spawn_error: Option<io::ErrorKind>,
    pub unkillable: bool,
}

impl FakeDaemon {
    pub fn count(&self, call: Call) -> usize {
        self.calls.iter().filter(|c| **c == call).count()
    }

    fn spawn(&mut self) -> Result<(), SupervisorError> {
        if let Some(kind) = self.spawn_error {
            return Err(SupervisorError::Spawn {
                command: "fake-daemon".into(),
                source: io::Error::from(kind),
            });
        }
        self.running = true;
        Ok(())
    }
}

impl DaemonControl for FakeDaemon {
    async fn start(&mut self) -> Result<(), SupervisorError> {
        self.calls.push(Call::Start);
        self.spawn()
    }

    async fn reload(&mut self) -> Result<ReloadOutcome, SupervisorError> {
        self.calls.push(Call::Reload);
        if self.running {
            return Ok(ReloadOutcome::Signaled);
        }
        self.spawn()?;
        Ok(ReloadOutcome::Started)
    }

    async fn stop(&mut self, timeout: Duration) -> Result<StopOutcome, SupervisorError> {
        self.calls.push(Call::Stop);
        if !self.running {
            return Ok(StopOutcome::NotRunning);
        }
        if self.unkillable {
            return Err(SupervisorError::Unkillable {
                pid: 4242,
                waited: timeout,
            });
        }
        self.running = false;
        Ok(StopOutcome::Exited(ExitStatus::from_raw(0)))
    }

    fn is_running(&mut self) -> bool {
        self.running
    }
}

/// Validator that blocks until a permit is released, then passes.
///
/// Records the content of every file it was asked about.
#[derive(Debug, Clone)]
pub struct GatedValidator {
    pub gate: Arc<Semaphore>,
    pub seen: Arc<Mutex<Vec<String>>>,
}

impl GatedValidator {
    pub fn closed() -> Self {
        Self {
            gate: Arc::new(Semaphore::new(0)),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn open(&self) {
        self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

impl Validate for GatedValidator {
    async fn validate(&self, path: &Path) -> ValidationReport {
        let content = fs::read_to_string(path).unwrap_or_default();
        self.seen.lock().unwrap().push(content);
        let _permit = self.gate.acquire().await.unwrap();
        ValidationReport::passed("")
    }
}

/// Poll `condition` until it holds, failing the test after `timeout`.
pub async fn eventually<F: FnMut() -> bool>(timeout: Duration, mut condition: F) {
    let deadline = tokio::time::Instant::now() + timeout;
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not met within {timeout:?}");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Run `fut` with a test-level deadline.
pub async fn within<T>(timeout: Duration, fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(timeout, fut).await.expect("timed out")
}
