//! Phase, task and result types for campaign deployments.

use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};

use super::state::{PhaseState, StateEntry};
use crate::Result;

/// Default per-command timeout when a task or check does not set one.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

/// Predicate applied to a validation check's stdout.
pub type OutputValidator = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Async predicate backing a custom success criterion.
pub type CustomValidator = Arc<dyn Fn() -> BoxFuture<'static, Result<bool>> + Send + Sync>;

/// One external command run as part of a phase.
///
/// Tasks are immutable once built. `retries` is the maximum number of
/// attempts; at least one attempt always happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub timeout: Duration,
    pub retries: u32,
    /// A critical failure stops the phase and triggers rollback.
    pub critical: bool,
}

impl Task {
    pub fn new(id: &str, name: &str, command: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            command: command.to_string(),
            args: Vec::new(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
            retries: 1,
            critical: false,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    /// Number of attempts the executor will make before giving up.
    pub fn max_attempts(&self) -> u32 {
        self.retries.max(1)
    }

    /// The command line as it would be typed, for logs.
    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }
}

/// What a validation check asserts about the code base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ValidationKind {
    Build,
    Lint,
    Test,
    TypeCheck,
    Config,
    #[default]
    Custom,
}

impl fmt::Display for ValidationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationKind::Build => write!(f, "build"),
            ValidationKind::Lint => write!(f, "lint"),
            ValidationKind::Test => write!(f, "test"),
            ValidationKind::TypeCheck => write!(f, "type_check"),
            ValidationKind::Config => write!(f, "config"),
            ValidationKind::Custom => write!(f, "custom"),
        }
    }
}

/// A diagnostic command run after a phase's tasks.
#[derive(Clone)]
pub struct ValidationCheck {
    pub id: String,
    pub name: String,
    pub kind: ValidationKind,
    pub command: String,
    pub args: Vec<String>,
    pub timeout: Duration,
    pub expected_exit_code: i32,
    pub output_validation: Option<OutputValidator>,
}

impl ValidationCheck {
    pub fn new(id: &str, name: &str, command: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            kind: ValidationKind::default(),
            command: command.to_string(),
            args: Vec::new(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
            expected_exit_code: 0,
            output_validation: None,
        }
    }

    pub fn kind(mut self, kind: ValidationKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn expect_exit_code(mut self, code: i32) -> Self {
        self.expected_exit_code = code;
        self
    }

    pub fn validate_output<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.output_validation = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for ValidationCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationCheck")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("command", &self.command)
            .field("args", &self.args)
            .field("timeout", &self.timeout)
            .field("expected_exit_code", &self.expected_exit_code)
            .field("output_validation", &self.output_validation.is_some())
            .finish()
    }
}

/// A named async predicate evaluated as part of a phase's success criteria.
#[derive(Clone)]
pub struct CustomCheck {
    pub name: String,
    pub validator: CustomValidator,
}

impl CustomCheck {
    pub fn new<F, Fut>(name: &str, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<bool>> + Send + 'static,
    {
        Self {
            name: name.to_string(),
            validator: Arc::new(move || f().boxed()),
        }
    }
}

impl fmt::Debug for CustomCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomCheck").field("name", &self.name).finish()
    }
}

/// Final gate for a phase.
///
/// The boolean flags are set by the caller from external build/test/lint
/// results and are informational; only `custom_checks` decide success.
#[derive(Debug, Clone)]
pub struct SuccessCriteria {
    pub build_success: bool,
    pub tests_pass: bool,
    pub linting_pass: bool,
    pub configuration_valid: bool,
    pub custom_checks: Vec<CustomCheck>,
}

impl Default for SuccessCriteria {
    fn default() -> Self {
        Self {
            build_success: true,
            tests_pass: true,
            linting_pass: true,
            configuration_valid: true,
            custom_checks: Vec::new(),
        }
    }
}

impl SuccessCriteria {
    pub fn with_custom_check(mut self, check: CustomCheck) -> Self {
        self.custom_checks.push(check);
        self
    }

    /// Names of the informational flags set to `false`.
    pub fn false_flags(&self) -> Vec<&'static str> {
        let mut flags = Vec::new();
        if !self.build_success {
            flags.push("build_success");
        }
        if !self.tests_pass {
            flags.push("tests_pass");
        }
        if !self.linting_pass {
            flags.push("linting_pass");
        }
        if !self.configuration_valid {
            flags.push("configuration_valid");
        }
        flags
    }
}

/// One named unit of orchestrated work.
///
/// Supplied by the caller; the orchestrator only ever borrows it.
#[derive(Debug, Clone)]
pub struct Phase {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Ids of phases that must have run (successfully) earlier in the pipeline.
    pub prerequisites: BTreeSet<String>,
    pub tasks: Vec<Task>,
    /// Run, in order, only after a critical task failure.
    pub rollback_tasks: Vec<Task>,
    pub validation_checks: Vec<ValidationCheck>,
    pub success_criteria: SuccessCriteria,
}

impl Phase {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: String::new(),
            prerequisites: BTreeSet::new(),
            tasks: Vec::new(),
            rollback_tasks: Vec::new(),
            validation_checks: Vec::new(),
            success_criteria: SuccessCriteria::default(),
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn prerequisite(mut self, phase_id: &str) -> Self {
        self.prerequisites.insert(phase_id.to_string());
        self
    }

    pub fn task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn rollback_task(mut self, task: Task) -> Self {
        self.rollback_tasks.push(task);
        self
    }

    pub fn validation_check(mut self, check: ValidationCheck) -> Self {
        self.validation_checks.push(check);
        self
    }

    pub fn success_criteria(mut self, criteria: SuccessCriteria) -> Self {
        self.success_criteria = criteria;
        self
    }
}

/// Result of running one task (all attempts).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub success: bool,
    pub attempts: u32,
    /// Captured stdout of the last attempt.
    pub output: String,
    /// Failure reason of the last attempt.
    pub error: Option<String>,
}

/// Outcome of one validation check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub check_name: String,
    pub kind: ValidationKind,
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    pub exit_code: Option<i32>,
}

/// Outcome of one best-effort rollback task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackStep {
    pub task_id: String,
    pub task_name: String,
    pub attempts: u32,
    pub outcome: std::result::Result<(), String>,
}

impl RollbackStep {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Everything observed while executing one phase.
///
/// Built once at the end of `PhaseOrchestrator::execute_phase`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseResult {
    pub phase_id: String,
    pub success: bool,
    pub tasks_executed: usize,
    pub tasks_succeeded: usize,
    pub tasks_failed: usize,
    pub rollback_performed: bool,
    pub rollback_steps: Vec<RollbackStep>,
    pub validation_results: Vec<ValidationResult>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub final_state: PhaseState,
    pub state_history: Vec<StateEntry>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl PhaseResult {
    pub fn failed_validations(&self) -> impl Iterator<Item = &ValidationResult> {
        self.validation_results.iter().filter(|v| !v.success)
    }

    pub fn duration(&self) -> chrono::Duration {
        self.completed_at - self.started_at
    }
}
