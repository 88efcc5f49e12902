//! Phased deployment of code-base transformations.
//!
//! A [`DeploymentPipeline`] runs [`Phase`]s one after another through a
//! [`PhaseOrchestrator`], which executes each phase's tasks, rolls back on
//! critical failure, runs validation checks, and evaluates success criteria.
//! Every step is recorded by the [`DeploymentLogger`].

mod criteria;
mod definition;
mod executor;
mod logger;
mod orchestrator;
mod pipeline;
mod state;
mod types;
mod validation;

pub use criteria::{CriteriaEvaluation, SuccessCriteriaEvaluator};
pub use definition::{CommandCheckDef, CriteriaDef, PhaseDef, PhaseFile, TaskDef, ValidationDef};
pub use executor::{run_command, CommandOutput, TaskExecutor};
pub use logger::{DeploymentEvent, DeploymentLogger, EntryLevel, LogEntry};
pub use orchestrator::PhaseOrchestrator;
pub use pipeline::{validate_phases, DeploymentPipeline, DeploymentSummary};
pub use state::{PhaseRun, PhaseState, StateEntry};
pub use types::{
    CustomCheck, CustomValidator, OutputValidator, Phase, PhaseResult, RollbackStep,
    SuccessCriteria, Task, TaskOutcome, ValidationCheck, ValidationKind, ValidationResult,
    DEFAULT_COMMAND_TIMEOUT,
};
pub use validation::ValidationChecker;
