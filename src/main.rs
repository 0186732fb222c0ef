//! reloadconf
//!
//! Runs a daemon, watches a directory for a new configuration, and only
//! lets a configuration reach the daemon after it passes a test command.
//!
//! # Architecture Overview
//!
//! ```text
//!   watch dir                                              live config
//!  ┌──────────┐   ┌──────────┐   ┌────────────┐  promote   ┌──────────┐
//!  │ app.conf │──▶│ watcher  │──▶│ controller │───────────▶│ app.conf │
//!  └──────────┘   │ debounce │   │            │            └──────────┘
//!                 └──────────┘   │            │──▶ validator (test command)
//!                                │            │
//!   SIGTERM/SIGINT/SIGHUP ──────▶│            │──▶ supervisor ──▶ daemon
//!                                └────────────┘     (start/reload/stop)
//! ```
//!
//! Exit status is 0 when the daemon stopped within the graceful timeout
//! (or was not running), 1 otherwise.

use std::error::Error;
use std::process::ExitCode;

use clap::Parser;

use reloadconf::config::{finalize, load_config, Cli};
use reloadconf::controller::{Ownership, Promoter, ReloadController};
use reloadconf::lifecycle::{signals, startup, Shutdown};
use reloadconf::observability::init_logging;
use reloadconf::watcher::{observe, FileWatcher};
use reloadconf::{CommandValidator, ProcessSupervisor};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "reloadconf starting");

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "reloadconf failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, Box<dyn Error>> {
    let mut settings = load_config(cli.settings.as_deref())?;
    cli.apply(&mut settings);
    let config = finalize(&settings)?;

    tracing::info!(
        command = %config.command,
        watch_dir = %config.watch.watch_dir.display(),
        live_config = %config.live_config.display(),
        candidate = %config.watch.candidate_name,
        "Configuration loaded"
    );

    let owner = config
        .promotion
        .chown
        .as_ref()
        .map(Ownership::resolve)
        .transpose()?;

    startup::prepare_watch_dir(&config.watch.watch_dir, config.promotion.chmod, owner)?;
    if let Some(path) = &config.startup.wait_for_path {
        startup::wait_for_path(path, config.wait_timeout()).await?;
    }
    if let Some(addr) = &config.startup.wait_for_sock {
        startup::wait_for_sock(addr, config.wait_timeout()).await?;
    }

    let supervisor = ProcessSupervisor::new(config.command.clone())
        .with_reload(config.reload.clone())
        .with_stop_signal(config.stop_signal)
        .with_kill_timeout(config.kill_timeout)
        .with_reload_command_timeout(config.reload_command_timeout);
    let validator = CommandValidator::new(config.test_command.clone()).with_timeout(config.validate_timeout);
    let promoter = Promoter::new(config.live_config.clone())
        .with_mode(config.promotion.chmod)
        .with_owner(owner)
        .with_discard(config.promotion.on_invalid);
    let mut controller =
        ReloadController::new(validator, supervisor, promoter).with_startup_policy(config.startup.on_invalid);

    let mut operator = signals::listen()?;
    let shutdown = Shutdown::new();
    let (mut candidates, watcher) = observe(FileWatcher::new(config.watch.clone()), shutdown.subscribe());

    let result = match controller.startup().await {
        Ok(outcome) => {
            tracing::info!(?outcome, "Startup complete");
            controller.run(&mut candidates, &mut operator).await
        }
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            tracing::error!(error = %e, "Daemon failed to start, waiting for a new candidate");
            controller.run(&mut candidates, &mut operator).await
        }
    };

    shutdown.trigger();
    if let Err(e) = watcher.await {
        tracing::warn!(error = %e, "Watcher task failed");
    }

    if let Err(e) = result {
        tracing::error!(error = %e, "Fatal error, exiting");
        return Ok(ExitCode::FAILURE);
    }

    match controller.shutdown(config.stop_timeout).await {
        Ok(outcome) if outcome.is_clean() => {
            tracing::info!(?outcome, "Shutdown complete");
            Ok(ExitCode::SUCCESS)
        }
        Ok(outcome) => {
            tracing::warn!(?outcome, "Daemon had to be killed");
            Ok(ExitCode::FAILURE)
        }
        Err(e) => {
            tracing::error!(error = %e, "Daemon could not be stopped");
            Ok(ExitCode::FAILURE)
        }
    }
}
