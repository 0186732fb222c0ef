//! Test-command validator.

use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::time;

use super::{Validate, ValidationReport};
use crate::command::CommandSpec;

/// Validates by running an external command against the file.
#[derive(Debug, Clone, Default)]
pub struct CommandValidator {
    command: Option<CommandSpec>,
    timeout: Option<Duration>,
}

impl CommandValidator {
    /// `None` selects pass-through mode.
    pub fn new(command: Option<CommandSpec>) -> Self {
        Self {
            command,
            timeout: None,
        }
    }

    /// Kill the test command if it runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    async fn run(&self, spec: &CommandSpec, path: &Path) -> ValidationReport {
        let mut cmd = spec.command_with_path(path);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(command = %spec, error = %e, "Failed to launch test command");
                return ValidationReport::failed(format!("failed to launch `{spec}`: {e}"));
            }
        };

        // Dropping the wait future on timeout drops the child, which kills it.
        let waited = match self.timeout {
            Some(limit) => match time::timeout(limit, child.wait_with_output()).await {
                Ok(res) => res,
                Err(_) => {
                    tracing::warn!(command = %spec, timeout_secs = limit.as_secs_f64(), "Test command timed out");
                    return ValidationReport::failed(format!(
                        "`{spec}` did not finish within {:.1}s",
                        limit.as_secs_f64()
                    ));
                }
            },
            None => child.wait_with_output().await,
        };

        match waited {
            Ok(output) => report_from(output),
            Err(e) => ValidationReport::failed(format!("failed to wait for `{spec}`: {e}")),
        }
    }
}

impl Validate for CommandValidator {
    async fn validate(&self, path: &Path) -> ValidationReport {
        match &self.command {
            Some(spec) => {
                let report = self.run(spec, path).await;
                tracing::debug!(path = %path.display(), ok = report.ok, "Validation finished");
                report
            }
            None => {
                tracing::debug!(path = %path.display(), "No test command, accepting configuration");
                ValidationReport::passed("")
            }
        }
    }
}

fn report_from(output: Output) -> ValidationReport {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));

    if output.status.success() {
        ValidationReport::passed(text)
    } else {
        if text.is_empty() {
            text = format!("test command exited with {}", output.status);
        }
        ValidationReport::failed(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator(cmd: &str) -> CommandValidator {
        CommandValidator::new(Some(cmd.parse().unwrap()))
    }

    #[tokio::test]
    async fn test_pass_through_without_command() {
        let report = CommandValidator::new(None).validate(Path::new("/nonexistent")).await;
        assert!(report.ok);
    }

    #[tokio::test]
    async fn test_exit_status_decides() {
        assert!(validator("/bin/true").validate(Path::new("/tmp/x")).await.ok);
        assert!(!validator("/bin/false").validate(Path::new("/tmp/x")).await.ok);
    }

    #[tokio::test]
    async fn test_output_captured_and_path_substituted() {
        let report = validator("/bin/sh -c 'echo checking $0; echo broken >&2; exit 3' {}")
            .validate(Path::new("/etc/app.conf"))
            .await;
        assert!(!report.ok);
        assert!(report.output.contains("checking /etc/app.conf"));
        assert!(report.output.contains("broken"));
    }

    #[tokio::test]
    async fn test_missing_executable_is_a_failed_report() {
        let report = validator("/definitely/not/here --check").validate(Path::new("/tmp/x")).await;
        assert!(!report.ok);
        assert!(report.output.contains("failed to launch"));
    }

    #[tokio::test]
    async fn test_timeout_kills_hung_command() {
        let report = validator("/bin/sleep 30")
            .with_timeout(Some(Duration::from_millis(200)))
            .validate(Path::new("5"))
            .await;
        assert!(!report.ok);
        assert!(report.output.contains("did not finish"));
    }
}
