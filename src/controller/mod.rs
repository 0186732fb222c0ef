//! Reload orchestration.
//!
//! # Data Flow
//! ```text
//! CandidateReadyEvent
//!     → promotion.rs stage (snapshot beside the live config)
//!     → validator (test command on the snapshot)
//!     → pass: promotion.rs commit (atomic rename) → supervisor reload
//!     → fail: promotion.rs reject (live config untouched)
//! ```
//!
//! # Design Decisions
//! - One cycle at a time; events arriving meanwhile collapse in the queue
//! - Validation or promotion failures never stop the loop
//! - Only fatal supervisor errors (see `SupervisorError::is_fatal`) escape `run`
//! - Operator signals take priority over queued candidates

pub mod promotion;

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::lifecycle::signals::OperatorSignal;
use crate::supervisor::{DaemonControl, ReloadOutcome, StopOutcome, SupervisorError};
use crate::validator::{Validate, ValidationReport};
use crate::watcher::{CandidateReadyEvent, CandidateReceiver};

pub use promotion::{DiscardPolicy, FileMode, OwnerSpec, Ownership, Promoter, PromotionError, StagedCandidate};

/// What to do when the live configuration fails validation at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StartupPolicy {
    /// Warn and start the daemon anyway.
    #[default]
    Start,
    /// Leave the daemon stopped until a valid candidate is promoted.
    Wait,
    /// Exit with an error.
    Abort,
}

/// A candidate accepted from the queue, about to be processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCandidate {
    pub source: PathBuf,
    pub discovered_at: SystemTime,
}

impl From<CandidateReadyEvent> for PendingCandidate {
    fn from(event: CandidateReadyEvent) -> Self {
        Self {
            source: event.path,
            discovered_at: event.observed_at,
        }
    }
}

/// How startup settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupOutcome {
    Started,
    /// No live configuration exists yet; waiting for the first candidate.
    NoLiveConfig,
    /// The live configuration is invalid and the policy is to wait.
    Deferred,
}

/// Result of one candidate cycle.
#[derive(Debug)]
pub enum CycleOutcome {
    /// Promoted, and the daemon was told about it.
    Promoted(ReloadOutcome),
    /// Failed validation; the live configuration is unchanged.
    Rejected(ValidationReport),
    /// The candidate vanished before it could be processed.
    Skipped,
    /// A recoverable failure; the loop carries on.
    Failed(ReloadError),
}

/// Errors raised by a reload cycle.
#[derive(Debug, Error)]
pub enum ReloadError {
    #[error(transparent)]
    Promotion(#[from] PromotionError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error("live configuration {path} failed validation")]
    InvalidLiveConfig { path: PathBuf, output: String },
}

impl ReloadError {
    pub fn is_fatal(&self) -> bool {
        match self {
            ReloadError::Supervisor(e) => e.is_fatal(),
            ReloadError::InvalidLiveConfig { .. } => true,
            ReloadError::Promotion(_) => false,
        }
    }
}

/// Ties validation, promotion and supervision together.
#[derive(Debug)]
pub struct ReloadController<V, D> {
    validator: V,
    daemon: D,
    promoter: Promoter,
    startup_policy: StartupPolicy,
}

impl<V: Validate, D: DaemonControl> ReloadController<V, D> {
    pub fn new(validator: V, daemon: D, promoter: Promoter) -> Self {
        Self {
            validator,
            daemon,
            promoter,
            startup_policy: StartupPolicy::default(),
        }
    }

    pub fn with_startup_policy(mut self, policy: StartupPolicy) -> Self {
        self.startup_policy = policy;
        self
    }

    pub fn daemon(&self) -> &D {
        &self.daemon
    }

    /// Validate the existing live configuration and start the daemon.
    pub async fn startup(&mut self) -> Result<StartupOutcome, ReloadError> {
        let live = self.promoter.live_path().to_path_buf();
        if !live.exists() {
            tracing::info!(live = %live.display(), "No live configuration yet, waiting for a candidate");
            return Ok(StartupOutcome::NoLiveConfig);
        }

        let report = self.validator.validate(&live).await;
        if !report.ok {
            tracing::warn!(
                live = %live.display(),
                output = %report.output.trim(),
                policy = ?self.startup_policy,
                "Live configuration failed validation"
            );
            match self.startup_policy {
                StartupPolicy::Start => {}
                StartupPolicy::Wait => return Ok(StartupOutcome::Deferred),
                StartupPolicy::Abort => {
                    return Err(ReloadError::InvalidLiveConfig {
                        path: live,
                        output: report.output,
                    })
                }
            }
        }

        self.daemon.start().await?;
        Ok(StartupOutcome::Started)
    }

    /// Run one candidate through validate, promote and reload.
    ///
    /// Only fatal errors are returned as `Err`.
    pub async fn process(&mut self, candidate: PendingCandidate) -> Result<CycleOutcome, ReloadError> {
        tracing::info!(candidate = %candidate.source.display(), "Processing candidate");

        match self.cycle(&candidate).await {
            Ok(CycleOutcome::Promoted(outcome)) => {
                tracing::info!(?outcome, "Configuration reloaded");
                Ok(CycleOutcome::Promoted(outcome))
            }
            Ok(CycleOutcome::Rejected(report)) => {
                tracing::warn!(
                    candidate = %candidate.source.display(),
                    output = %report.output.trim(),
                    "Candidate failed validation, live configuration unchanged"
                );
                Ok(CycleOutcome::Rejected(report))
            }
            Ok(other) => Ok(other),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                tracing::error!(candidate = %candidate.source.display(), error = %e, "Reload cycle failed");
                Ok(CycleOutcome::Failed(e))
            }
        }
    }

    async fn cycle(&mut self, candidate: &PendingCandidate) -> Result<CycleOutcome, ReloadError> {
        if !candidate.source.exists() {
            tracing::debug!(candidate = %candidate.source.display(), "Candidate gone, skipping");
            return Ok(CycleOutcome::Skipped);
        }

        let staged = self.promoter.stage(&candidate.source)?;
        let report = self.validator.validate(staged.path()).await;
        if !report.ok {
            self.promoter.reject(staged);
            return Ok(CycleOutcome::Rejected(report));
        }

        self.promoter.commit(staged)?;
        let outcome = self.daemon.reload().await?;
        Ok(CycleOutcome::Promoted(outcome))
    }

    /// Re-validate the live configuration and reload the daemon with it.
    ///
    /// Returns `None` when there is nothing valid to reload.
    pub async fn reload_live(&mut self) -> Result<Option<ReloadOutcome>, ReloadError> {
        let live = self.promoter.live_path().to_path_buf();
        if !live.exists() {
            tracing::warn!(live = %live.display(), "Reload requested but no live configuration exists");
            return Ok(None);
        }

        let report = self.validator.validate(&live).await;
        if !report.ok {
            tracing::warn!(
                live = %live.display(),
                output = %report.output.trim(),
                "Reload requested but live configuration is invalid"
            );
            return Ok(None);
        }

        match self.daemon.reload().await {
            Ok(outcome) => {
                tracing::info!(?outcome, "Live configuration reloaded on request");
                Ok(Some(outcome))
            }
            Err(e) if e.is_fatal() => Err(e.into()),
            Err(e) => {
                tracing::error!(error = %e, "Requested reload failed");
                Ok(None)
            }
        }
    }

    /// Process candidates until shutdown is requested or the source closes.
    pub async fn run(
        &mut self,
        candidates: &mut CandidateReceiver,
        operator: &mut mpsc::Receiver<OperatorSignal>,
    ) -> Result<(), ReloadError> {
        loop {
            tokio::select! {
                biased;

                Some(signal) = operator.recv() => match signal {
                    OperatorSignal::Shutdown => {
                        tracing::info!("Shutdown requested");
                        return Ok(());
                    }
                    OperatorSignal::Reload => {
                        self.reload_live().await?;
                    }
                },

                event = candidates.next() => match event {
                    Some(event) => {
                        self.process(event.into()).await?;
                    }
                    None => {
                        tracing::info!("Candidate source closed");
                        return Ok(());
                    }
                },
            }
        }
    }

    /// Stop the daemon, gracefully first.
    pub async fn shutdown(&mut self, timeout: Duration) -> Result<StopOutcome, ReloadError> {
        Ok(self.daemon.stop(timeout).await?)
    }
}
