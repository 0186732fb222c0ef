//! reloadconf: supervise a daemon and reload it when a validated
//! configuration arrives.

pub mod command;
pub mod config;
pub mod controller;
pub mod lifecycle;
pub mod observability;
pub mod supervisor;
pub mod validator;
pub mod watcher;

pub use command::CommandSpec;
pub use config::{ReloadConfig, RuntimeConfig};
pub use controller::ReloadController;
pub use lifecycle::Shutdown;
pub use supervisor::ProcessSupervisor;
pub use validator::CommandValidator;
pub use watcher::FileWatcher;
