//! OS signal handling.
//!
//! # Responsibilities
//! - Register handlers for SIGTERM, SIGINT and SIGHUP
//! - Translate them into `OperatorSignal`s for the controller
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - SIGHUP reloads the live config, it never shuts down

use std::io;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;

/// Requests from the operator, delivered as process signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorSignal {
    Shutdown,
    Reload,
}

const SIGNAL_BUFFER: usize = 4;

/// Install the handlers and forward signals on the returned channel.
///
/// Must be called from within a Tokio runtime.
pub fn listen() -> io::Result<mpsc::Receiver<OperatorSignal>> {
    let mut terminate = signal(SignalKind::terminate())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut hangup = signal(SignalKind::hangup())?;
    let (tx, rx) = mpsc::channel(SIGNAL_BUFFER);

    tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                _ = terminate.recv() => ("SIGTERM", OperatorSignal::Shutdown),
                _ = interrupt.recv() => ("SIGINT", OperatorSignal::Shutdown),
                _ = hangup.recv() => ("SIGHUP", OperatorSignal::Reload),
            };
            tracing::info!(signal = received.0, "Signal received");
            if tx.send(received.1).await.is_err() {
                break;
            }
        }
    });

    Ok(rx)
}
