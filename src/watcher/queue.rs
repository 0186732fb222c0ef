//! Hand-off queue between the watcher and the reload controller.
//!
//! The queue holds at most one pending event: pushing while an event is
//! pending replaces it. A flood of filesystem activity therefore never grows
//! memory, and the controller always sees the latest candidate.

use std::sync::Arc;

use tokio::sync::watch;

use super::CandidateReadyEvent;

/// Create a connected sender/receiver pair.
pub fn candidate_queue() -> (CandidateSender, CandidateReceiver) {
    let (tx, rx) = watch::channel(None);
    (CandidateSender { tx: Arc::new(tx) }, CandidateReceiver { rx })
}

/// Producer side, held by the watcher.
#[derive(Debug, Clone)]
pub struct CandidateSender {
    tx: Arc<watch::Sender<Option<CandidateReadyEvent>>>,
}

impl CandidateSender {
    /// Queue an event, replacing any event not yet taken.
    ///
    /// Returns `false` once the receiver is gone.
    pub fn push(&self, event: CandidateReadyEvent) -> bool {
        self.tx.send(Some(event)).is_ok()
    }

    /// Whether the controller side has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side, held by the controller.
#[derive(Debug)]
pub struct CandidateReceiver {
    rx: watch::Receiver<Option<CandidateReadyEvent>>,
}

impl CandidateReceiver {
    /// Wait for the next event.
    ///
    /// Returns `None` when every sender is dropped and nothing is pending.
    pub async fn next(&mut self) -> Option<CandidateReadyEvent> {
        loop {
            if self.rx.changed().await.is_err() {
                return None;
            }
            if let Some(event) = self.rx.borrow_and_update().clone() {
                return Some(event);
            }
        }
    }

    /// Whether an event is waiting to be taken.
    pub fn has_pending(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn event(name: &str) -> CandidateReadyEvent {
        CandidateReadyEvent::new(PathBuf::from(name))
    }

    #[tokio::test]
    async fn test_latest_event_wins() {
        let (tx, mut rx) = candidate_queue();
        assert!(!rx.has_pending());

        assert!(tx.push(event("/watch/first")));
        assert!(tx.push(event("/watch/second")));
        assert!(rx.has_pending());

        let got = rx.next().await.unwrap();
        assert_eq!(got.path, PathBuf::from("/watch/second"));
        assert!(!rx.has_pending());
    }

    #[tokio::test]
    async fn test_closed_after_senders_dropped() {
        let (tx, mut rx) = candidate_queue();
        let tx2 = tx.clone();
        drop(tx);
        tx2.push(event("/watch/last"));
        drop(tx2);

        assert_eq!(rx.next().await.unwrap().path, PathBuf::from("/watch/last"));
        assert!(rx.next().await.is_none());
    }

    #[tokio::test]
    async fn test_push_fails_without_receiver() {
        let (tx, rx) = candidate_queue();
        drop(rx);
        assert!(tx.is_closed());
        assert!(!tx.push(event("/watch/x")));
    }
}
