//! Signal names as they appear in configuration.

use std::fmt;
use std::str::FromStr;

use nix::sys::signal::Signal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown signal: {0}")]
pub struct UnknownSignal(pub String);

/// A POSIX signal, written as `HUP`, `SIGHUP`, `hup` or `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SignalName(Signal);

impl SignalName {
    pub const HANGUP: Self = Self(Signal::SIGHUP);
    pub const TERMINATE: Self = Self(Signal::SIGTERM);

    pub fn signal(self) -> Signal {
        self.0
    }
}

impl FromStr for SignalName {
    type Err = UnknownSignal;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(number) = trimmed.parse::<i32>() {
            return Signal::try_from(number)
                .map(Self)
                .map_err(|_| UnknownSignal(s.to_string()));
        }

        let upper = trimmed.to_ascii_uppercase();
        let full = if upper.starts_with("SIG") {
            upper
        } else {
            format!("SIG{upper}")
        };
        full.parse::<Signal>()
            .map(Self)
            .map_err(|_| UnknownSignal(s.to_string()))
    }
}

impl TryFrom<String> for SignalName {
    type Error = UnknownSignal;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SignalName> for String {
    fn from(name: SignalName) -> Self {
        name.0.as_str().to_string()
    }
}

impl fmt::Display for SignalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}
