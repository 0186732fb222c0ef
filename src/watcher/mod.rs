//! Candidate file observation.
//!
//! # Data Flow
//! ```text
//! native.rs (notify events) ──┐
//!                             ├─▶ raw change notices ─▶ debounce.rs ─▶ queue.rs ─▶ controller
//! polling.rs (fingerprints) ──┘         (bounded)        (quiescence)   (latest wins)
//! ```
//!
//! # Design Decisions
//! - Only the exact candidate file name inside the watch directory counts
//! - Events fire after the quiescence window, never mid-write
//! - Native watch failures fall back to polling; observation never stops
//! - `CandidateSource` is the seam: tests inject synthetic events through it

pub mod debounce;
pub mod native;
pub mod polling;
pub mod queue;

use std::fs;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

pub use debounce::Debouncer;
pub use native::NativeDetector;
pub use polling::PollingDetector;
pub use queue::{candidate_queue, CandidateReceiver, CandidateSender};

/// Capacity of the raw notice channel between a detector and the debouncer.
/// A full channel already means a notice is pending, so extras are dropped.
const NOTICE_BUFFER: usize = 8;

/// A candidate file whose content has stopped changing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateReadyEvent {
    /// Full path of the candidate inside the watch directory.
    pub path: PathBuf,
    /// When the watcher declared the file stable.
    pub observed_at: SystemTime,
}

impl CandidateReadyEvent {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            observed_at: SystemTime::now(),
        }
    }
}

/// Raw "something happened to the candidate" notice, before debouncing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Changed;

/// How changes are detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchMode {
    /// Filesystem notifications, falling back to polling on failure.
    #[default]
    Native,
    /// Fixed-interval polling only.
    Polling,
}

/// Everything the watcher needs to know.
#[derive(Debug, Clone)]
pub struct WatchSettings {
    pub watch_dir: PathBuf,
    pub candidate_name: String,
    pub mode: WatchMode,
    pub quiescence: Duration,
    pub poll_interval: Duration,
}

impl WatchSettings {
    pub fn candidate_path(&self) -> PathBuf {
        self.watch_dir.join(&self.candidate_name)
    }
}

/// Cheap identity of a file's content: size plus modification time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    len: u64,
    modified: Option<SystemTime>,
}

impl Fingerprint {
    pub fn of(path: &Path) -> io::Result<Self> {
        let meta = fs::metadata(path)?;
        Ok(Self {
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }
}

/// Anything that can produce candidate events.
pub trait CandidateSource: Send + 'static {
    /// Produce events into `events` until `shutdown` fires.
    fn watch(
        self,
        events: CandidateSender,
        shutdown: broadcast::Receiver<()>,
    ) -> impl Future<Output = ()> + Send;
}

/// Start `source` on its own task and return the consuming end of its queue.
pub fn observe<S: CandidateSource>(
    source: S,
    shutdown: broadcast::Receiver<()>,
) -> (CandidateReceiver, JoinHandle<()>) {
    let (tx, rx) = candidate_queue();
    let handle = tokio::spawn(source.watch(tx, shutdown));
    (rx, handle)
}

/// The production watcher: a change detector feeding a debouncer.
#[derive(Debug, Clone)]
pub struct FileWatcher {
    settings: WatchSettings,
}

impl FileWatcher {
    pub fn new(settings: WatchSettings) -> Self {
        Self { settings }
    }
}

impl CandidateSource for FileWatcher {
    fn watch(
        self,
        events: CandidateSender,
        shutdown: broadcast::Receiver<()>,
    ) -> impl Future<Output = ()> + Send {
        async move {
            let (notice_tx, notice_rx) = mpsc::channel(NOTICE_BUFFER);
            let debouncer = Debouncer::new(self.settings.candidate_path(), self.settings.quiescence);
            let debounce = tokio::spawn(debouncer.run(notice_rx, events));

            tracing::info!(
                watch_dir = %self.settings.watch_dir.display(),
                candidate = %self.settings.candidate_name,
                mode = ?self.settings.mode,
                "Watching for candidate configuration"
            );

            match self.settings.mode {
                WatchMode::Native => NativeDetector::new(self.settings).run(notice_tx, shutdown).await,
                WatchMode::Polling => {
                    PollingDetector::new(self.settings.candidate_path(), self.settings.poll_interval)
                        .run(notice_tx, shutdown)
                        .await
                }
            }

            // The detector dropped its sender; the debouncer drains and exits.
            let _ = debounce.await;
            tracing::debug!("Watcher stopped");
        }
    }
}
