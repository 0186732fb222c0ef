//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check required values are present once file and flags are merged
//! - Validate value ranges (intervals > 0, socket addresses have a port)
//! - Detect a candidate path that would collide with the live config
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure apart from checking what already exists on disk:
//!   ReloadConfig → Result<RuntimeConfig, Vec<ValidationError>>
//! - Runs before any subsystem is built

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::config::schema::{ReloadConfig, RuntimeConfig};
use crate::supervisor::process::ReloadAction;
use crate::watcher::WatchSettings;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required setting `{0}`")]
    Missing(&'static str),

    #[error("`live_config` must name a file, got {0}")]
    LiveConfigNotFile(PathBuf),

    #[error("candidate name `{0}` must be a plain file name")]
    InvalidCandidateName(String),

    #[error("candidate {0} is the live config itself")]
    CandidateIsLive(PathBuf),

    #[error("watch path {0} exists and is not a directory")]
    WatchDirNotDirectory(PathBuf),

    #[error("`{0}` must be greater than zero")]
    Zero(&'static str),

    #[error("`wait_for_sock` must be host:port, got `{0}`")]
    InvalidSocket(String),
}

/// Check a merged configuration and resolve it for the runtime.
pub fn validate_config(config: &ReloadConfig) -> Result<RuntimeConfig, Vec<ValidationError>> {
    let mut errors = Vec::new();

    let watch_dir = require(&config.watch_dir, "watch_dir", &mut errors);
    let live_config = require(&config.live_config, "live_config", &mut errors);
    let command = require(&config.command, "command", &mut errors);

    if let Some(dir) = &watch_dir {
        if dir.exists() && !dir.is_dir() {
            errors.push(ValidationError::WatchDirNotDirectory(dir.clone()));
        }
    }
    if let Some(live) = &live_config {
        if live.file_name().is_none() {
            errors.push(ValidationError::LiveConfigNotFile(live.clone()));
        }
    }

    let candidate_name = config.candidate_name();
    if let Some(name) = &candidate_name {
        if name.is_empty() || name.contains('/') || name == "." || name == ".." {
            errors.push(ValidationError::InvalidCandidateName(name.clone()));
        }
    }
    if let (Some(dir), Some(live), Some(name)) = (&watch_dir, &live_config, &candidate_name) {
        let candidate = dir.join(name);
        if candidate == *live {
            errors.push(ValidationError::CandidateIsLive(candidate));
        }
    }

    let timeouts = &config.timeouts;
    for (value, field) in [
        (timeouts.kill_secs, "timeouts.kill_secs"),
        (timeouts.reload_command_secs, "timeouts.reload_command_secs"),
        (config.watch.poll_interval_ms, "watch.poll_interval_ms"),
    ] {
        if value == 0 {
            errors.push(ValidationError::Zero(field));
        }
    }
    if timeouts.validate_secs == Some(0) {
        errors.push(ValidationError::Zero("timeouts.validate_secs"));
    }

    if let Some(addr) = &config.startup.wait_for_sock {
        let valid = addr
            .rsplit_once(':')
            .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
        if !valid {
            errors.push(ValidationError::InvalidSocket(addr.clone()));
        }
    }

    match (watch_dir, live_config, command, candidate_name) {
        (Some(watch_dir), Some(live_config), Some(command), Some(candidate_name)) if errors.is_empty() => {
            let reload = match &config.reload_command {
                Some(cmd) => ReloadAction::Command(cmd.clone()),
                None => ReloadAction::Signal(config.reload_signal),
            };
            Ok(RuntimeConfig {
                watch: WatchSettings {
                    watch_dir,
                    candidate_name,
                    mode: config.watch.mode,
                    quiescence: Duration::from_millis(config.watch.quiescence_ms),
                    poll_interval: Duration::from_millis(config.watch.poll_interval_ms),
                },
                live_config,
                command,
                test_command: config.test_command.clone(),
                reload,
                stop_signal: config.stop_signal,
                stop_timeout: Duration::from_secs(timeouts.stop_secs),
                kill_timeout: Duration::from_secs(timeouts.kill_secs),
                validate_timeout: timeouts.validate_secs.map(Duration::from_secs),
                reload_command_timeout: Duration::from_secs(timeouts.reload_command_secs),
                promotion: config.promotion.clone(),
                startup: config.startup.clone(),
            })
        }
        _ => Err(errors),
    }
}

fn require<T: Clone>(value: &Option<T>, name: &'static str, errors: &mut Vec<ValidationError>) -> Option<T> {
    if value.is_none() {
        errors.push(ValidationError::Missing(name));
    }
    value.clone()
}
