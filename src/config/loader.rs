//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::{ReloadConfig, RuntimeConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load settings from a TOML file, or defaults when no file is given.
///
/// The result is not validated: command-line flags are merged first.
pub fn load_config(path: Option<&Path>) -> Result<ReloadConfig, ConfigError> {
    let Some(path) = path else {
        return Ok(ReloadConfig::default());
    };
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    toml::from_str(&content).map_err(ConfigError::Parse)
}

/// Validate merged settings and resolve them for the runtime.
pub fn finalize(config: &ReloadConfig) -> Result<RuntimeConfig, ConfigError> {
    validate_config(config).map_err(ConfigError::Validation)
}
