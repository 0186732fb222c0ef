//! Fixed-interval polling detector.
//!
//! # Responsibilities
//! - Stat the candidate on every tick
//! - Emit a raw notice whenever its fingerprint differs from the last tick
//!
//! # Design Decisions
//! - The first tick fires immediately, so a candidate that already exists is
//!   reported once at startup
//! - A missing directory or file is just "no candidate"; polling keeps going

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::{self, MissedTickBehavior};

use super::{Changed, Fingerprint};

pub struct PollingDetector {
    candidate: PathBuf,
    interval: Duration,
}

impl PollingDetector {
    pub fn new(candidate: PathBuf, interval: Duration) -> Self {
        Self { candidate, interval }
    }

    pub async fn run(self, notices: mpsc::Sender<Changed>, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            path = %self.candidate.display(),
            interval_ms = self.interval.as_millis() as u64,
            "Polling for candidate changes"
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last: Option<Fingerprint> = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let current = self.fingerprint();
                    if current.is_some() && current != last {
                        let _ = notices.try_send(Changed);
                    }
                    last = current;
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Polling detector received shutdown signal");
                    break;
                }
            }
        }
    }

    fn fingerprint(&self) -> Option<Fingerprint> {
        match Fingerprint::of(&self.candidate) {
            Ok(fp) => Some(fp),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!(path = %self.candidate.display(), error = %e, "Cannot stat candidate");
                None
            }
        }
    }
}
