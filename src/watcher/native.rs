//! Native filesystem notification detector.
//!
//! # Responsibilities
//! - Watch the directory (non-recursively) with the platform backend
//! - Forward create/modify events that name the candidate file
//! - Detect backend failure or loss of the directory and fall back to polling
//!
//! A directory that is removed and recreated under the same path is a
//! different inode; the old watch is dead, so that counts as loss too.
//!
//! # Design Decisions
//! - The directory is watched, not the file, so atomic rename-into-place by
//!   the producer is seen
//! - Fallback is one-way: once polling, the detector stays polling

use std::ffi::OsStr;
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};
use tokio::time;

use super::{Changed, PollingDetector, WatchSettings};

/// Backend events buffered between notify's thread and the detector loop.
const BRIDGE_BUFFER: usize = 64;

pub struct NativeDetector {
    settings: WatchSettings,
}

impl NativeDetector {
    pub fn new(settings: WatchSettings) -> Self {
        Self { settings }
    }

    pub async fn run(self, notices: mpsc::Sender<Changed>, mut shutdown: broadcast::Receiver<()>) {
        let Err(e) = self.watch(&notices, &mut shutdown).await else {
            return;
        };
        tracing::warn!(
            watch_dir = %self.settings.watch_dir.display(),
            error = %e,
            "Native watch failed, falling back to polling"
        );

        PollingDetector::new(self.settings.candidate_path(), self.settings.poll_interval)
            .run(notices, shutdown)
            .await;
    }

    /// Returns `Ok` on shutdown and `Err` when the backend can no longer be trusted.
    async fn watch(
        &self,
        notices: &mpsc::Sender<Changed>,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> notify::Result<()> {
        let (bridge_tx, mut bridge_rx) = mpsc::channel::<notify::Result<()>>(BRIDGE_BUFFER);
        let name = self.settings.candidate_name.clone();
        let watch_dir = self.settings.watch_dir.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if removes_dir(&event, &watch_dir) {
                        let _ = bridge_tx.try_send(Err(lost(&watch_dir)));
                    } else if is_relevant(&event, &name) {
                        let _ = bridge_tx.try_send(Ok(()));
                    }
                }
                Err(e) => {
                    let _ = bridge_tx.try_send(Err(e));
                }
            },
            Config::default(),
        )?;
        watcher.watch(&self.settings.watch_dir, RecursiveMode::NonRecursive)?;
        let identity = DirIdentity::of(&self.settings.watch_dir).ok_or_else(|| lost(&self.settings.watch_dir))?;

        tracing::debug!(watch_dir = %self.settings.watch_dir.display(), "Native watch started");

        if self.settings.candidate_path().exists() {
            let _ = notices.try_send(Changed);
        }

        let mut health = time::interval(self.settings.poll_interval);
        loop {
            tokio::select! {
                Some(res) = bridge_rx.recv() => {
                    res?;
                    let _ = notices.try_send(Changed);
                }
                _ = health.tick() => {
                    if DirIdentity::of(&self.settings.watch_dir) != Some(identity) {
                        return Err(lost(&self.settings.watch_dir));
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Native detector received shutdown signal");
                    return Ok(());
                }
            }
        }
    }
}

/// Device and inode of the watched directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DirIdentity {
    dev: u64,
    ino: u64,
}

impl DirIdentity {
    fn of(dir: &Path) -> Option<Self> {
        let meta = fs::metadata(dir).ok().filter(|m| m.is_dir())?;
        Some(Self {
            dev: meta.dev(),
            ino: meta.ino(),
        })
    }
}

fn lost(dir: &Path) -> notify::Error {
    notify::Error::path_not_found().add_path(dir.to_path_buf())
}

fn removes_dir(event: &Event, dir: &Path) -> bool {
    event.kind.is_remove() && event.paths.iter().any(|p| p == dir)
}

fn is_relevant(event: &Event, name: &str) -> bool {
    (event.kind.is_create() || event.kind.is_modify())
        && event.paths.iter().any(|p| names_candidate(p, name))
}

fn names_candidate(path: &Path, name: &str) -> bool {
    path.file_name() == Some(OsStr::new(name))
}
