//! Success-criteria evaluation.

use super::types::SuccessCriteria;
use crate::{clog_debug, clog_warn};

/// Outcome of evaluating one phase's success criteria.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CriteriaEvaluation {
    pub passed_checks: Vec<String>,
    pub failed_checks: Vec<String>,
    /// One `"Custom check failed: <name>"` entry per failed check.
    pub errors: Vec<String>,
    /// Informational flags set to `false`.
    pub false_flags: Vec<&'static str>,
}

impl CriteriaEvaluation {
    pub fn passed(&self) -> bool {
        self.failed_checks.is_empty()
    }
}

/// Evaluates custom checks in order.
#[derive(Debug, Clone, Copy, Default)]
pub struct SuccessCriteriaEvaluator;

impl SuccessCriteriaEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Await each custom check in declaration order.
    ///
    /// A check fails when it returns `Ok(false)`, returns `Err`, or panics.
    /// Each check runs in its own tokio task so a panic is contained.
    pub async fn evaluate(&self, criteria: &SuccessCriteria) -> CriteriaEvaluation {
        let mut evaluation = CriteriaEvaluation {
            false_flags: criteria.false_flags(),
            ..Default::default()
        };

        if !evaluation.false_flags.is_empty() {
            clog_debug!("Success criteria flags set to false: {:?}", evaluation.false_flags);
        }

        for check in &criteria.custom_checks {
            let fut = (check.validator)();
            let passed = match tokio::spawn(fut).await {
                Ok(Ok(passed)) => passed,
                Ok(Err(e)) => {
                    clog_warn!("Custom check {} errored: {}", check.name, e);
                    false
                }
                Err(join_err) => {
                    clog_warn!("Custom check {} panicked: {}", check.name, join_err);
                    false
                }
            };

            if passed {
                evaluation.passed_checks.push(check.name.clone());
            } else {
                evaluation.failed_checks.push(check.name.clone());
                evaluation
                    .errors
                    .push(format!("Custom check failed: {}", check.name));
            }
        }

        evaluation
    }
}
