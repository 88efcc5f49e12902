//! Drives a single phase through its state machine.
//!
//! Tasks run strictly in order. A non-critical failure is recorded as a
//! warning and execution continues; a critical failure stops the task loop
//! and triggers best-effort rollback. Validation checks and success criteria
//! are evaluated afterwards in every case.

use chrono::Utc;

use super::criteria::SuccessCriteriaEvaluator;
use super::executor::TaskExecutor;
use super::logger::{DeploymentEvent, DeploymentLogger};
use super::state::{PhaseRun, PhaseState};
use super::types::{Phase, PhaseResult, RollbackStep, Task};
use super::validation::ValidationChecker;
use crate::config::DeploymentSettings;
use crate::{clog, clog_debug, clog_error, clog_warn};

pub struct PhaseOrchestrator {
    executor: TaskExecutor,
    checker: ValidationChecker,
    evaluator: SuccessCriteriaEvaluator,
    logger: DeploymentLogger,
}

impl PhaseOrchestrator {
    pub fn new(logger: DeploymentLogger) -> Self {
        Self {
            executor: TaskExecutor::new(),
            checker: ValidationChecker::new(),
            evaluator: SuccessCriteriaEvaluator::new(),
            logger,
        }
    }

    /// Build an orchestrator whose executor and checker honour `settings`.
    pub fn from_settings(settings: &DeploymentSettings, logger: DeploymentLogger) -> Self {
        let mut executor = TaskExecutor::new().with_retry_delay(settings.retry_delay());
        let mut checker = ValidationChecker::new();
        if let Some(dir) = settings.working_dir_path() {
            executor = executor.with_working_dir(&dir);
            checker = checker.with_working_dir(&dir);
        }
        Self {
            executor,
            checker,
            evaluator: SuccessCriteriaEvaluator::new(),
            logger,
        }
    }

    pub fn with_executor(mut self, executor: TaskExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_checker(mut self, checker: ValidationChecker) -> Self {
        self.checker = checker;
        self
    }

    pub fn logger(&self) -> &DeploymentLogger {
        &self.logger
    }

    /// Execute one phase and report what happened.
    ///
    /// `success` is false only when a critical task failed or a custom
    /// success check did not pass. Validation failures are advisory.
    pub async fn execute_phase(&self, phase: &Phase) -> PhaseResult {
        let started_at = Utc::now();
        let mut run = PhaseRun::new(&phase.id);
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut tasks_executed = 0;
        let mut tasks_succeeded = 0;
        let mut tasks_failed = 0;
        let mut critical_failure = false;
        let mut rollback_steps = Vec::new();
        let mut rollback_performed = false;

        clog!("Phase {} ({}) starting", phase.id, phase.name);
        self.logger
            .record(DeploymentEvent::PhaseStarted {
                phase_id: phase.id.clone(),
                name: phase.name.clone(),
            })
            .await;
        advance(&mut run, PhaseState::Running, &mut errors);

        for task in &phase.tasks {
            tasks_executed += 1;
            self.logger
                .record(DeploymentEvent::TaskStarted {
                    phase_id: phase.id.clone(),
                    task_id: task.id.clone(),
                })
                .await;

            let outcome = self.executor.execute(task).await;
            if outcome.success {
                tasks_succeeded += 1;
                self.logger
                    .record(DeploymentEvent::TaskSucceeded {
                        phase_id: phase.id.clone(),
                        task_id: task.id.clone(),
                        attempts: outcome.attempts,
                    })
                    .await;
                continue;
            }

            tasks_failed += 1;
            let reason = outcome.error.unwrap_or_else(|| "unknown error".to_string());
            self.logger
                .record(DeploymentEvent::TaskFailed {
                    phase_id: phase.id.clone(),
                    task_id: task.id.clone(),
                    critical: task.critical,
                    error: reason.clone(),
                })
                .await;

            if task.critical {
                clog_error!("Phase {}: critical task {} failed: {}", phase.id, task.id, reason);
                errors.push(format!(
                    "Critical task '{}' failed after {} attempt(s): {}",
                    task.name, outcome.attempts, reason
                ));
                critical_failure = true;
                break;
            }

            clog_warn!("Phase {}: task {} failed: {}", phase.id, task.id, reason);
            warnings.push(format!(
                "Task '{}' failed after {} attempt(s): {}",
                task.name, outcome.attempts, reason
            ));
        }

        if critical_failure && !phase.rollback_tasks.is_empty() {
            advance(&mut run, PhaseState::RollingBack, &mut errors);
            rollback_steps = self.rollback(phase).await;
            for step in &rollback_steps {
                if let Err(e) = &step.outcome {
                    warnings.push(format!("Rollback task '{}' failed: {}", step.task_name, e));
                }
            }
            rollback_performed = true;
            advance(&mut run, PhaseState::RolledBack, &mut errors);
        }

        advance(&mut run, PhaseState::Validating, &mut errors);
        let mut validation_results = Vec::with_capacity(phase.validation_checks.len());
        for check in &phase.validation_checks {
            let result = self.checker.run(check).await;
            self.logger
                .record(DeploymentEvent::ValidationCompleted {
                    phase_id: phase.id.clone(),
                    check: check.name.clone(),
                    success: result.success,
                })
                .await;
            if !result.success {
                warnings.push(format!(
                    "Validation '{}' failed: {}",
                    check.name,
                    result.error.as_deref().unwrap_or("unknown error")
                ));
            }
            validation_results.push(result);
        }

        advance(&mut run, PhaseState::EvaluatingCriteria, &mut errors);
        let evaluation = self.evaluator.evaluate(&phase.success_criteria).await;
        for check in &evaluation.failed_checks {
            self.logger
                .record(DeploymentEvent::CriteriaFailed {
                    phase_id: phase.id.clone(),
                    check: check.clone(),
                })
                .await;
        }
        errors.extend(evaluation.errors.iter().cloned());

        let success = !critical_failure && evaluation.passed();
        advance(
            &mut run,
            if success {
                PhaseState::Succeeded
            } else {
                PhaseState::Failed
            },
            &mut errors,
        );

        self.logger
            .record(DeploymentEvent::PhaseCompleted {
                phase_id: phase.id.clone(),
                success,
            })
            .await;
        clog!(
            "Phase {} finished success={} executed={} succeeded={} failed={}",
            phase.id,
            success,
            tasks_executed,
            tasks_succeeded,
            tasks_failed
        );

        PhaseResult {
            phase_id: phase.id.clone(),
            success,
            tasks_executed,
            tasks_succeeded,
            tasks_failed,
            rollback_performed,
            rollback_steps,
            validation_results,
            errors,
            warnings,
            final_state: run.current(),
            state_history: run.into_history(),
            started_at,
            completed_at: Utc::now(),
        }
    }

    /// Run every rollback task of `phase` in order, best-effort.
    ///
    /// Each step's failure is captured in its outcome; later steps still run.
    pub async fn rollback(&self, phase: &Phase) -> Vec<RollbackStep> {
        self.logger
            .record(DeploymentEvent::RollbackStarted {
                phase_id: phase.id.clone(),
                tasks: phase.rollback_tasks.len(),
            })
            .await;

        let mut steps = Vec::with_capacity(phase.rollback_tasks.len());
        for task in &phase.rollback_tasks {
            let step = self.rollback_step(task).await;
            self.logger
                .record(DeploymentEvent::RollbackTaskCompleted {
                    phase_id: phase.id.clone(),
                    task_id: task.id.clone(),
                    error: step.outcome.clone().err(),
                })
                .await;
            steps.push(step);
        }
        steps
    }

    async fn rollback_step(&self, task: &Task) -> RollbackStep {
        clog_debug!("Rollback task {}: {}", task.id, task.command_line());
        let outcome = self.executor.execute(task).await;
        let result = if outcome.success {
            Ok(())
        } else {
            let reason = outcome.error.unwrap_or_else(|| "unknown error".to_string());
            clog_warn!("Rollback task {} failed: {}", task.id, reason);
            Err(reason)
        };
        RollbackStep {
            task_id: task.id.clone(),
            task_name: task.name.clone(),
            attempts: outcome.attempts,
            outcome: result,
        }
    }
}

/// Transitions are fixed by the control flow above; a rejected one is a bug,
/// surfaced as a phase error rather than a panic.
fn advance(run: &mut PhaseRun, target: PhaseState, errors: &mut Vec<String>) {
    if let Err(e) = run.transition(target) {
        clog_error!("Phase {}: {}", run.phase_id(), e);
        errors.push(e.to_string());
    }
}
