//! External command specifications.
//!
//! # Responsibilities
//! - Parse shell-like command strings into program + argv
//! - Substitute a file path into a command (test command)
//! - Build `tokio::process::Command` values for the supervisor and validator
//!
//! # Design Decisions
//! - Quoting follows POSIX shell words, but no shell is involved: the daemon
//!   is our direct child, so signals reach it and not an intermediate `sh`
//! - Commands are immutable once parsed

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;

/// Token replaced by the candidate path in a test command.
pub const PATH_PLACEHOLDER: &str = "{}";

/// Error returned when a command string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandParseError {
    /// The string contains no words.
    #[error("command is empty")]
    Empty,

    /// Quotes or escapes are not balanced.
    #[error("command has unbalanced quoting: {0}")]
    Unbalanced(String),
}

/// A parsed external command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommandSpec {
    raw: String,
    program: String,
    args: Vec<String>,
}

impl CommandSpec {
    /// Program name or path (first word).
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments after the program.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Build a command as written.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }

    /// Build a command with `path` substituted for `{}`.
    ///
    /// If no argument mentions the placeholder, the path is appended.
    pub fn command_with_path(&self, path: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.args_with_path(path));
        cmd
    }

    fn args_with_path(&self, path: &Path) -> Vec<String> {
        let path = path.to_string_lossy();
        let mut substituted = false;
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|arg| {
                if arg.contains(PATH_PLACEHOLDER) {
                    substituted = true;
                    arg.replace(PATH_PLACEHOLDER, &path)
                } else {
                    arg.clone()
                }
            })
            .collect();
        if !substituted {
            args.push(path.into_owned());
        }
        args
    }
}

impl FromStr for CommandSpec {
    type Err = CommandParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let words = shlex::split(s).ok_or_else(|| CommandParseError::Unbalanced(s.to_string()))?;
        let mut words = words.into_iter();
        let program = words.next().ok_or(CommandParseError::Empty)?;

        Ok(Self {
            raw: s.trim().to_string(),
            program,
            args: words.collect(),
        })
    }
}

impl TryFrom<String> for CommandSpec {
    type Error = CommandParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CommandSpec> for String {
    fn from(spec: CommandSpec) -> Self {
        spec.raw
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
