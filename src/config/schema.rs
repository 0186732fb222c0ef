//! Configuration schema definitions.
//!
//! `ReloadConfig` is what the TOML settings file and the command line
//! describe. Every field has a default so partial files are accepted;
//! required values are checked in `validation.rs`, which produces a
//! `RuntimeConfig` with everything resolved.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::command::CommandSpec;
use crate::controller::{DiscardPolicy, FileMode, OwnerSpec, StartupPolicy};
use crate::supervisor::process::ReloadAction;
use crate::supervisor::SignalName;
use crate::watcher::{WatchMode, WatchSettings};

/// Root configuration for reloadconf.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReloadConfig {
    /// Directory where candidate configurations are dropped.
    pub watch_dir: Option<PathBuf>,

    /// Path the daemon reads its configuration from.
    pub live_config: Option<PathBuf>,

    /// File name of the candidate inside `watch_dir`.
    /// Defaults to the file name of `live_config`.
    pub candidate_name: Option<String>,

    /// The daemon command line.
    pub command: Option<CommandSpec>,

    /// Command that checks a configuration file; `{}` is replaced by its path.
    pub test_command: Option<CommandSpec>,

    /// Command run instead of signalling the daemon on reload.
    pub reload_command: Option<CommandSpec>,

    /// Signal telling the daemon to re-read its configuration.
    pub reload_signal: SignalName,

    /// Signal asking the daemon to exit.
    pub stop_signal: SignalName,

    pub timeouts: TimeoutConfig,
    pub watch: WatchConfig,
    pub promotion: PromotionConfig,
    pub startup: StartupConfig,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            watch_dir: None,
            live_config: None,
            candidate_name: None,
            command: None,
            test_command: None,
            reload_command: None,
            reload_signal: SignalName::HANGUP,
            stop_signal: SignalName::TERMINATE,
            timeouts: TimeoutConfig::default(),
            watch: WatchConfig::default(),
            promotion: PromotionConfig::default(),
            startup: StartupConfig::default(),
        }
    }
}

impl ReloadConfig {
    /// Explicit candidate name, else the live config's file name.
    pub fn candidate_name(&self) -> Option<String> {
        self.candidate_name.clone().or_else(|| {
            self.live_config
                .as_ref()
                .and_then(|live| live.file_name())
                .map(|name| name.to_string_lossy().into_owned())
        })
    }
}

/// Timeout configuration, in seconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Wait after the stop signal before killing the daemon.
    pub stop_secs: u64,

    /// Wait after the kill before declaring the daemon unkillable.
    pub kill_secs: u64,

    /// Bound on one test command run. Unbounded when unset.
    pub validate_secs: Option<u64>,

    /// Bound on one reload command run.
    pub reload_command_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            stop_secs: 10,
            kill_secs: 5,
            validate_secs: None,
            reload_command_secs: 30,
        }
    }
}

/// Change detection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WatchConfig {
    pub mode: WatchMode,

    /// How long the candidate must stay unchanged before it is processed.
    pub quiescence_ms: u64,

    /// Polling interval, used in polling mode and as the native fallback.
    pub poll_interval_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            mode: WatchMode::Native,
            quiescence_ms: 1000,
            poll_interval_ms: 3000,
        }
    }
}

/// How promoted and rejected files are treated.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PromotionConfig {
    /// Mode given to the promoted file (and a created watch directory).
    pub chmod: Option<FileMode>,

    /// Owner given to the promoted file (and a created watch directory).
    pub chown: Option<OwnerSpec>,

    /// What happens to a candidate that fails validation.
    pub on_invalid: DiscardPolicy,
}

/// Startup gates and policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StartupConfig {
    /// What to do when the live configuration is invalid at startup.
    pub on_invalid: StartupPolicy,

    /// Do not start until this path exists.
    pub wait_for_path: Option<PathBuf>,

    /// Do not start until this `host:port` accepts TCP connections.
    pub wait_for_sock: Option<String>,

    /// Bound on each startup gate.
    pub wait_timeout_secs: u64,
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            on_invalid: StartupPolicy::Start,
            wait_for_path: None,
            wait_for_sock: None,
            wait_timeout_secs: 10,
        }
    }
}

/// Fully resolved configuration, produced by validation.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub watch: WatchSettings,
    pub live_config: PathBuf,
    pub command: CommandSpec,
    pub test_command: Option<CommandSpec>,
    pub reload: ReloadAction,
    pub stop_signal: SignalName,
    pub stop_timeout: Duration,
    pub kill_timeout: Duration,
    pub validate_timeout: Option<Duration>,
    pub reload_command_timeout: Duration,
    pub promotion: PromotionConfig,
    pub startup: StartupConfig,
}

impl RuntimeConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.startup.wait_timeout_secs)
    }
}
