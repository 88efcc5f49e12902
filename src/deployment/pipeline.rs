//! Sequential execution of phases.

use std::collections::HashSet;

use serde::Serialize;

use super::logger::DeploymentEvent;
use super::orchestrator::PhaseOrchestrator;
use super::types::{Phase, PhaseResult};
use crate::error::{Error, Result};
use crate::{clog, clog_error, clog_warn};

/// Check that phase ids are unique, task ids are unique within a phase, and
/// no prerequisite names the phase itself or a later phase.
///
/// Prerequisites outside the list are taken as completed by an earlier run.
pub fn validate_phases(phases: &[Phase]) -> Result<()> {
    let listed: HashSet<&str> = phases.iter().map(|p| p.id.as_str()).collect();
    let mut seen: HashSet<&str> = HashSet::new();
    for phase in phases {
        if phase.id.trim().is_empty() {
            return Err(Error::InvalidPipeline(format!(
                "phase '{}' has an empty id",
                phase.name
            )));
        }
        for prerequisite in &phase.prerequisites {
            if !listed.contains(prerequisite.as_str()) {
                clog_warn!(
                    "Phase {} requires {}, which is not in this deployment; assuming it already ran",
                    phase.id,
                    prerequisite
                );
            } else if !seen.contains(prerequisite.as_str()) {
                return Err(Error::InvalidPipeline(format!(
                    "phase '{}' requires '{}', which does not run before it",
                    phase.id, prerequisite
                )));
            }
        }
        if !seen.insert(&phase.id) {
            return Err(Error::InvalidPipeline(format!(
                "duplicate phase id '{}'",
                phase.id
            )));
        }

        let mut task_ids: HashSet<&str> = HashSet::new();
        for task in phase.tasks.iter().chain(&phase.rollback_tasks) {
            if !task_ids.insert(&task.id) {
                return Err(Error::InvalidPipeline(format!(
                    "phase '{}' has duplicate task id '{}'",
                    phase.id, task.id
                )));
            }
        }
    }
    Ok(())
}

/// Runs phases in order and stops at the first failed one.
pub struct DeploymentPipeline {
    orchestrator: PhaseOrchestrator,
}

impl DeploymentPipeline {
    pub fn new(orchestrator: PhaseOrchestrator) -> Self {
        Self { orchestrator }
    }

    pub fn orchestrator(&self) -> &PhaseOrchestrator {
        &self.orchestrator
    }

    /// Execute `phases` strictly in order.
    ///
    /// The returned list ends with the first unsuccessful phase, if any; later
    /// phases are never started. Only an invalid phase list is an error.
    pub async fn execute_deployment(&self, phases: &[Phase]) -> Result<Vec<PhaseResult>> {
        validate_phases(phases)?;

        let logger = self.orchestrator.logger();
        logger
            .record(DeploymentEvent::PipelineStarted {
                phases: phases.len(),
            })
            .await;

        let mut results = Vec::with_capacity(phases.len());
        for phase in phases {
            let result = self.orchestrator.execute_phase(phase).await;
            let success = result.success;
            results.push(result);

            if !success {
                clog_error!("Deployment halted at phase {}", phase.id);
                logger
                    .record(DeploymentEvent::PipelineHalted {
                        phase_id: phase.id.clone(),
                    })
                    .await;
                return Ok(results);
            }
        }

        clog!("Deployment completed: {} phase(s)", results.len());
        logger
            .record(DeploymentEvent::PipelineCompleted {
                phases: results.len(),
            })
            .await;
        Ok(results)
    }
}

/// Condensed view of a deployment for printing and exit codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentSummary {
    pub phases_planned: usize,
    pub phases_run: usize,
    pub succeeded: bool,
    pub halted_at: Option<String>,
    pub total_errors: usize,
    pub total_warnings: usize,
}

impl DeploymentSummary {
    pub fn from_results(phases_planned: usize, results: &[PhaseResult]) -> Self {
        let halted_at = results
            .iter()
            .find(|r| !r.success)
            .map(|r| r.phase_id.clone());
        Self {
            phases_planned,
            phases_run: results.len(),
            succeeded: halted_at.is_none() && results.len() == phases_planned,
            halted_at,
            total_errors: results.iter().map(|r| r.errors.len()).sum(),
            total_warnings: results.iter().map(|r| r.warnings.len()).sum(),
        }
    }
}
