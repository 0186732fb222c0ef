//! Quiescence-based debouncing.
//!
//! A burst of raw notices collapses into one `CandidateReadyEvent`, emitted
//! once the candidate has been left alone for the quiescence window: no
//! notice arrived and its fingerprint did not move. Detectors that report
//! coarsely (polling) cannot end a window early this way.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time;

use super::{CandidateReadyEvent, CandidateSender, Changed, Fingerprint};

pub struct Debouncer {
    candidate: PathBuf,
    quiescence: Duration,
}

impl Debouncer {
    pub fn new(candidate: PathBuf, quiescence: Duration) -> Self {
        Self {
            candidate,
            quiescence,
        }
    }

    /// Run until the notice channel closes or the receiver goes away.
    pub async fn run(self, mut notices: mpsc::Receiver<Changed>, events: CandidateSender) {
        let mut emitted: Option<Fingerprint> = None;

        while notices.recv().await.is_some() {
            let Some(settled) = self.settle(&mut notices).await else {
                return;
            };

            // Removals and renames away also produce notices.
            let Some(fingerprint) = settled else {
                tracing::debug!(path = %self.candidate.display(), "Candidate vanished before settling");
                continue;
            };

            // A late notice for content already reported.
            if emitted == Some(fingerprint) {
                tracing::debug!(path = %self.candidate.display(), "Candidate unchanged since last event");
                continue;
            }

            tracing::debug!(path = %self.candidate.display(), "Candidate settled");
            if !events.push(CandidateReadyEvent::new(self.candidate.clone())) {
                return;
            }
            emitted = Some(fingerprint);
        }
    }

    /// Wait until a full quiescence window passes with no notice and no
    /// fingerprint change. Yields the settled fingerprint (`None` when the
    /// candidate is missing), or `None` if the channel closed meanwhile.
    async fn settle(&self, notices: &mut mpsc::Receiver<Changed>) -> Option<Option<Fingerprint>> {
        let mut baseline = self.fingerprint();
        loop {
            match time::timeout(self.quiescence, notices.recv()).await {
                Ok(Some(Changed)) => baseline = self.fingerprint(),
                Ok(None) => return None,
                Err(_) => {
                    let current = self.fingerprint();
                    if current == baseline {
                        return Some(current);
                    }
                    tracing::trace!(path = %self.candidate.display(), "Candidate still changing");
                    baseline = current;
                }
            }
        }
    }

    fn fingerprint(&self) -> Option<Fingerprint> {
        Fingerprint::of(&self.candidate).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::candidate_queue;

    #[tokio::test(start_paused = true)]
    async fn test_burst_collapses_into_one_event() {
        let dir = tempfile::tempdir().unwrap();
        let candidate = dir.path().join("app.conf");
        std::fs::write(&candidate, "x").unwrap();

        let (events, mut rx) = candidate_queue();
        let (tx, notices) = mpsc::channel(8);
        let task = tokio::spawn(Debouncer::new(candidate.clone(), Duration::from_millis(500)).run(notices, events));

        for _ in 0..5 {
            tx.send(Changed).await.unwrap();
            time::sleep(Duration::from_millis(200)).await;
            assert!(!rx.has_pending(), "no event may fire while writes continue");
        }

        time::sleep(Duration::from_millis(600)).await;
        let event = rx.next().await.unwrap();
        assert_eq!(event.path, candidate);

        time::sleep(Duration::from_secs(5)).await;
        assert!(!rx.has_pending());

        drop(tx);
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_bursts_give_separate_events() {
        let dir = tempfile::tempdir().unwrap();
        let candidate = dir.path().join("app.conf");
        std::fs::write(&candidate, "x").unwrap();

        let (events, mut rx) = candidate_queue();
        let (tx, notices) = mpsc::channel(8);
        tokio::spawn(Debouncer::new(candidate.clone(), Duration::from_millis(100)).run(notices, events));

        tx.send(Changed).await.unwrap();
        assert!(rx.next().await.is_some());

        std::fs::write(&candidate, "x, rewritten").unwrap();
        tx.send(Changed).await.unwrap();
        assert!(rx.next().await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeat_notice_for_same_content_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let candidate = dir.path().join("app.conf");
        std::fs::write(&candidate, "x").unwrap();

        let (events, mut rx) = candidate_queue();
        let (tx, notices) = mpsc::channel(8);
        tokio::spawn(Debouncer::new(candidate, Duration::from_millis(100)).run(notices, events));

        tx.send(Changed).await.unwrap();
        assert!(rx.next().await.is_some());

        tx.send(Changed).await.unwrap();
        time::sleep(Duration::from_secs(1)).await;
        assert!(!rx.has_pending());
    }

    #[tokio::test]
    async fn test_window_extends_while_file_grows() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let candidate = dir.path().join("app.conf");
        let mut file = std::fs::File::create(&candidate).unwrap();

        let (events, mut rx) = candidate_queue();
        let (tx, notices) = mpsc::channel(8);
        tokio::spawn(Debouncer::new(candidate.clone(), Duration::from_millis(200)).run(notices, events));

        // One notice only, as a slow poller would send; the writer keeps going.
        tx.send(Changed).await.unwrap();
        for i in 0..15 {
            writeln!(file, "line {i}").unwrap();
            time::sleep(Duration::from_millis(40)).await;
            assert!(!rx.has_pending(), "event fired while the file was still growing");
        }
        let final_len = std::fs::metadata(&candidate).unwrap().len();

        time::timeout(Duration::from_secs(5), rx.next()).await.unwrap().unwrap();
        assert_eq!(std::fs::metadata(&candidate).unwrap().len(), final_len);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_candidate_is_not_reported() {
        let dir = tempfile::tempdir().unwrap();
        let candidate = dir.path().join("app.conf");

        let (events, rx) = candidate_queue();
        let (tx, notices) = mpsc::channel(8);
        let task = tokio::spawn(Debouncer::new(candidate, Duration::from_millis(100)).run(notices, events));

        tx.send(Changed).await.unwrap();
        time::sleep(Duration::from_secs(1)).await;
        assert!(!rx.has_pending());

        drop(tx);
        task.await.unwrap();
    }
}
