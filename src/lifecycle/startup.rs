//! Startup preparation.
//!
//! # Responsibilities
//! - Create the watch directory, with the configured mode and owner
//! - Hold startup until a required path exists
//! - Hold startup until a required TCP endpoint accepts connections
//!
//! # Design Decisions
//! - Fail fast: a gate that never opens is a startup error
//! - Gates are polled at a fixed step, bounded by one deadline each

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::{self, Instant};

use crate::controller::{FileMode, Ownership};

/// Interval between gate checks.
const WAIT_STEP: Duration = Duration::from_millis(100);

/// Errors raised before the daemon is started.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("watch path {0} exists and is not a directory")]
    WatchDirNotDirectory(PathBuf),

    #[error("cannot create watch directory {path}: {source}")]
    CreateWatchDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{what} not available after {waited:?}")]
    WaitTimeout { what: String, waited: Duration },
}

/// Make sure the watch directory exists.
///
/// Mode and owner are only applied to a directory created here; failing
/// to apply them is logged, not fatal.
pub fn prepare_watch_dir(
    dir: &Path,
    mode: Option<FileMode>,
    owner: Option<Ownership>,
) -> Result<(), StartupError> {
    if dir.is_dir() {
        return Ok(());
    }
    if dir.exists() {
        return Err(StartupError::WatchDirNotDirectory(dir.to_path_buf()));
    }

    fs::create_dir_all(dir).map_err(|source| StartupError::CreateWatchDir {
        path: dir.to_path_buf(),
        source,
    })?;
    tracing::info!(path = %dir.display(), "Created watch directory");

    if let Some(mode) = mode {
        // Directories need the search bit wherever the file mode grants read.
        let bits = mode.bits() | ((mode.bits() & 0o444) >> 2);
        if let Err(e) = fs::set_permissions(dir, fs::Permissions::from_mode(bits)) {
            tracing::warn!(path = %dir.display(), error = %e, "Cannot set watch directory mode");
        }
    }
    if let Some(owner) = owner {
        if let Err(e) = owner.apply(dir) {
            tracing::warn!(path = %dir.display(), error = %e, "Cannot set watch directory owner");
        }
    }
    Ok(())
}

/// Wait until `path` exists.
pub async fn wait_for_path(path: &Path, timeout: Duration) -> Result<(), StartupError> {
    let deadline = Instant::now() + timeout;
    tracing::info!(path = %path.display(), "Waiting for path");

    while !path.exists() {
        if Instant::now() >= deadline {
            return Err(StartupError::WaitTimeout {
                what: format!("path {}", path.display()),
                waited: timeout,
            });
        }
        time::sleep(WAIT_STEP).await;
    }

    tracing::info!(path = %path.display(), "Path available");
    Ok(())
}

/// Wait until a TCP connection to `addr` (host:port) succeeds.
pub async fn wait_for_sock(addr: &str, timeout: Duration) -> Result<(), StartupError> {
    let deadline = Instant::now() + timeout;
    tracing::info!(addr, "Waiting for socket");

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match time::timeout(remaining, TcpStream::connect(addr)).await {
            Ok(Ok(_)) => {
                tracing::info!(addr, "Socket accepting connections");
                return Ok(());
            }
            Ok(Err(e)) => tracing::debug!(addr, error = %e, "Socket not ready"),
            Err(_) => {}
        }

        if Instant::now() >= deadline {
            return Err(StartupError::WaitTimeout {
                what: format!("socket {addr}"),
                waited: timeout,
            });
        }
        time::sleep(WAIT_STEP).await;
    }
}
