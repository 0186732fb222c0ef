//! Command-line flags.
//!
//! Every flag overrides the matching value from the settings file.

use std::path::PathBuf;

use clap::Parser;

use crate::command::CommandSpec;
use crate::config::schema::ReloadConfig;
use crate::controller::{DiscardPolicy, FileMode, OwnerSpec, StartupPolicy};
use crate::supervisor::SignalName;
use crate::watcher::WatchMode;

#[derive(Debug, Parser)]
#[command(name = "reloadconf", version)]
#[command(about = "Supervise a daemon and reload it when a validated config arrives", long_about = None)]
pub struct Cli {
    /// TOML settings file
    #[arg(long, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Daemon command line
    #[arg(long, value_name = "CMD")]
    pub command: Option<CommandSpec>,

    /// Directory watched for candidate configs
    #[arg(long, value_name = "DIR")]
    pub watch: Option<PathBuf>,

    /// Live config path read by the daemon
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Candidate file name inside the watch directory
    #[arg(long, value_name = "NAME")]
    pub candidate_name: Option<String>,

    /// Config test command; `{}` is replaced by the file path
    #[arg(long, value_name = "CMD")]
    pub test: Option<CommandSpec>,

    /// Command run to reload the daemon instead of signalling it
    #[arg(long, value_name = "CMD")]
    pub reload: Option<CommandSpec>,

    /// Signal sent to the daemon to reload
    #[arg(long, value_name = "SIGNAL")]
    pub reload_signal: Option<SignalName>,

    /// Signal sent to the daemon to stop
    #[arg(long, value_name = "SIGNAL")]
    pub stop_signal: Option<SignalName>,

    /// Seconds to wait for a graceful stop before killing
    #[arg(long, value_name = "SECS")]
    pub stop_timeout: Option<u64>,

    /// Seconds to wait after killing before giving up
    #[arg(long, value_name = "SECS")]
    pub kill_timeout: Option<u64>,

    /// Seconds a config test may run
    #[arg(long, value_name = "SECS")]
    pub validate_timeout: Option<u64>,

    /// Milliseconds a candidate must stay unchanged
    #[arg(long, value_name = "MS")]
    pub quiescence_ms: Option<u64>,

    /// Milliseconds between polls
    #[arg(long, value_name = "MS")]
    pub poll_interval_ms: Option<u64>,

    /// Poll instead of using filesystem notifications
    #[arg(long)]
    pub polling: bool,

    /// Mode for the promoted config, in octal
    #[arg(long, value_name = "MODE")]
    pub chmod: Option<FileMode>,

    /// Owner for the promoted config
    #[arg(long, value_name = "USER[:GROUP]")]
    pub chown: Option<OwnerSpec>,

    /// Keep candidates that fail validation instead of deleting them
    #[arg(long)]
    pub keep_invalid: bool,

    /// What to do when the live config is invalid at startup
    #[arg(long, value_enum, value_name = "POLICY")]
    pub on_invalid_startup: Option<StartupPolicy>,

    /// Wait for this path to exist before starting
    #[arg(long, value_name = "PATH")]
    pub wait_for_path: Option<PathBuf>,

    /// Wait for this TCP endpoint to accept connections before starting
    #[arg(long, value_name = "HOST:PORT")]
    pub wait_for_sock: Option<String>,

    /// Seconds to wait on each startup gate
    #[arg(long, value_name = "SECS")]
    pub wait_timeout: Option<u64>,

    /// Verbose logging
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    /// Overlay the flags that were given onto `config`.
    pub fn apply(&self, config: &mut ReloadConfig) {
        overlay(&mut config.command, &self.command);
        overlay(&mut config.watch_dir, &self.watch);
        overlay(&mut config.live_config, &self.config);
        overlay(&mut config.candidate_name, &self.candidate_name);
        overlay(&mut config.test_command, &self.test);
        overlay(&mut config.reload_command, &self.reload);
        overlay(&mut config.promotion.chmod, &self.chmod);
        overlay(&mut config.promotion.chown, &self.chown);
        overlay(&mut config.startup.wait_for_path, &self.wait_for_path);
        overlay(&mut config.startup.wait_for_sock, &self.wait_for_sock);

        if let Some(signal) = self.reload_signal {
            config.reload_signal = signal;
        }
        if let Some(signal) = self.stop_signal {
            config.stop_signal = signal;
        }
        if let Some(secs) = self.stop_timeout {
            config.timeouts.stop_secs = secs;
        }
        if let Some(secs) = self.kill_timeout {
            config.timeouts.kill_secs = secs;
        }
        if self.validate_timeout.is_some() {
            config.timeouts.validate_secs = self.validate_timeout;
        }
        if let Some(ms) = self.quiescence_ms {
            config.watch.quiescence_ms = ms;
        }
        if let Some(ms) = self.poll_interval_ms {
            config.watch.poll_interval_ms = ms;
        }
        if self.polling {
            config.watch.mode = WatchMode::Polling;
        }
        if self.keep_invalid {
            config.promotion.on_invalid = DiscardPolicy::Keep;
        }
        if let Some(policy) = self.on_invalid_startup {
            config.startup.on_invalid = policy;
        }
        if let Some(secs) = self.wait_timeout {
            config.startup.wait_timeout_secs = secs;
        }
    }
}

fn overlay<T: Clone>(target: &mut Option<T>, flag: &Option<T>) {
    if flag.is_some() {
        target.clone_from(flag);
    }
}
