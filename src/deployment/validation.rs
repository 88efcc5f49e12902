//! Post-task validation checks.

use std::path::{Path, PathBuf};

use super::executor::run_command;
use super::types::{ValidationCheck, ValidationResult};
use crate::error::Error;
use crate::{clog_debug, clog_warn};

/// Runs validation checks and interprets their exit code and stdout.
#[derive(Debug, Clone, Default)]
pub struct ValidationChecker {
    working_dir: Option<PathBuf>,
}

impl ValidationChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_working_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Run one check once. Failures are reported in the result, never raised.
    pub async fn run(&self, check: &ValidationCheck) -> ValidationResult {
        clog_debug!("Validation {} ({}): {}", check.id, check.kind, check.command);

        let output = match run_command(
            &check.command,
            &check.args,
            check.timeout,
            self.working_dir.as_deref(),
        )
        .await
        {
            Ok(output) => output,
            Err(e) => {
                let message = match e {
                    Error::Timeout(limit) => format!("Timed out after {:?}", limit),
                    other => other.to_string(),
                };
                clog_warn!("Validation {} could not run: {}", check.id, message);
                return ValidationResult {
                    check_name: check.name.clone(),
                    kind: check.kind,
                    success: false,
                    output: String::new(),
                    error: Some(message),
                    exit_code: None,
                };
            }
        };

        let error = if output.exit_code != Some(check.expected_exit_code) {
            Some(format!(
                "Expected exit code {}, got {}",
                check.expected_exit_code,
                output
                    .exit_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "none (signal)".to_string())
            ))
        } else if let Some(validate) = &check.output_validation {
            if validate(&output.stdout) {
                None
            } else {
                Some("Output validation failed".to_string())
            }
        } else {
            None
        };

        if let Some(reason) = &error {
            clog_warn!("Validation {} failed: {}", check.id, reason);
        }

        ValidationResult {
            check_name: check.name.clone(),
            kind: check.kind,
            success: error.is_none(),
            output: output.stdout,
            error,
            exit_code: output.exit_code,
        }
    }
}
