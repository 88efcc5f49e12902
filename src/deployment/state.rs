//! Phase execution state machine with transition validation.
//!
//! A phase run moves through:
//!
//! Pending -> Running -> Validating -> EvaluatingCriteria -> Succeeded | Failed
//!
//! When a critical task fails and the phase has rollback tasks, the run detours
//! through RollingBack -> RolledBack before Validating.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PhaseState {
    #[default]
    Pending,
    Running,
    RollingBack,
    RolledBack,
    Validating,
    EvaluatingCriteria,
    Succeeded,
    Failed,
}

impl PhaseState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PhaseState::Succeeded | PhaseState::Failed)
    }
}

impl fmt::Display for PhaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhaseState::Pending => write!(f, "pending"),
            PhaseState::Running => write!(f, "running"),
            PhaseState::RollingBack => write!(f, "rolling_back"),
            PhaseState::RolledBack => write!(f, "rolled_back"),
            PhaseState::Validating => write!(f, "validating"),
            PhaseState::EvaluatingCriteria => write!(f, "evaluating_criteria"),
            PhaseState::Succeeded => write!(f, "succeeded"),
            PhaseState::Failed => write!(f, "failed"),
        }
    }
}

/// A state the run entered, with timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEntry {
    pub state: PhaseState,
    pub entered_at: DateTime<Utc>,
}

/// Tracks the state of a single phase execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseRun {
    phase_id: String,
    state: PhaseState,
    history: Vec<StateEntry>,
}

impl PhaseRun {
    /// Start tracking a run; the initial `Pending` state is recorded.
    pub fn new(phase_id: &str) -> Self {
        Self {
            phase_id: phase_id.to_string(),
            state: PhaseState::Pending,
            history: vec![StateEntry {
                state: PhaseState::Pending,
                entered_at: Utc::now(),
            }],
        }
    }

    pub fn can_transition(&self, target: PhaseState) -> bool {
        use PhaseState::*;
        matches!(
            (self.state, target),
            (Pending, Running)
                | (Running, Validating)
                | (Running, RollingBack)
                | (RollingBack, RolledBack)
                | (RolledBack, Validating)
                | (Validating, EvaluatingCriteria)
                | (EvaluatingCriteria, Succeeded)
                | (EvaluatingCriteria, Failed)
        )
    }

    /// Move to `target`, or fail without changing anything.
    pub fn transition(&mut self, target: PhaseState) -> Result<()> {
        if !self.can_transition(target) {
            return Err(Error::InvalidStateTransition {
                from: self.state.to_string(),
                to: target.to_string(),
            });
        }

        self.state = target;
        self.history.push(StateEntry {
            state: target,
            entered_at: Utc::now(),
        });
        Ok(())
    }

    pub fn phase_id(&self) -> &str {
        &self.phase_id
    }

    pub fn current(&self) -> PhaseState {
        self.state
    }

    pub fn history(&self) -> &[StateEntry] {
        &self.history
    }

    pub fn into_history(self) -> Vec<StateEntry> {
        self.history
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_at(states: &[PhaseState]) -> PhaseRun {
        let mut run = PhaseRun::new("phase-1");
        for state in states {
            run.transition(*state).unwrap();
        }
        run
    }

    #[test]
    fn test_new_run_is_pending() {
        let run = PhaseRun::new("phase-1");
        assert_eq!(run.current(), PhaseState::Pending);
        assert_eq!(run.history().len(), 1);
        assert_eq!(run.phase_id(), "phase-1");
    }

    #[test]
    fn test_happy_path() {
        let run = run_at(&[
            PhaseState::Running,
            PhaseState::Validating,
            PhaseState::EvaluatingCriteria,
            PhaseState::Succeeded,
        ]);
        assert_eq!(run.current(), PhaseState::Succeeded);
        assert!(run.current().is_terminal());
        assert_eq!(run.history().len(), 5);
    }

    #[test]
    fn test_rollback_path() {
        let run = run_at(&[
            PhaseState::Running,
            PhaseState::RollingBack,
            PhaseState::RolledBack,
            PhaseState::Validating,
            PhaseState::EvaluatingCriteria,
            PhaseState::Failed,
        ]);
        let states: Vec<_> = run.history().iter().map(|e| e.state).collect();
        assert_eq!(
            states,
            vec![
                PhaseState::Pending,
                PhaseState::Running,
                PhaseState::RollingBack,
                PhaseState::RolledBack,
                PhaseState::Validating,
                PhaseState::EvaluatingCriteria,
                PhaseState::Failed,
            ]
        );
    }

    #[test]
    fn test_cannot_skip_validation() {
        let mut run = run_at(&[PhaseState::Running]);
        assert!(run.transition(PhaseState::EvaluatingCriteria).is_err());
        assert!(run.transition(PhaseState::Succeeded).is_err());
        assert_eq!(run.current(), PhaseState::Running);
    }

    #[test]
    fn test_rolled_back_cannot_resume_running() {
        let mut run = run_at(&[
            PhaseState::Running,
            PhaseState::RollingBack,
            PhaseState::RolledBack,
        ]);
        assert!(!run.can_transition(PhaseState::Running));
        assert!(run.transition(PhaseState::Running).is_err());
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut run = run_at(&[
            PhaseState::Running,
            PhaseState::Validating,
            PhaseState::EvaluatingCriteria,
            PhaseState::Failed,
        ]);
        for target in [
            PhaseState::Pending,
            PhaseState::Running,
            PhaseState::Validating,
            PhaseState::Succeeded,
        ] {
            assert!(run.transition(target).is_err());
        }
        assert_eq!(run.current(), PhaseState::Failed);
    }

    #[test]
    fn test_history_not_modified_on_failed_transition() {
        let mut run = PhaseRun::new("p");
        let _ = run.transition(PhaseState::Succeeded);
        assert_eq!(run.history().len(), 1);
    }

    #[test]
    fn test_error_message_contains_states() {
        let mut run = PhaseRun::new("p");
        let msg = run.transition(PhaseState::RolledBack).unwrap_err().to_string();
        assert!(msg.contains("pending"));
        assert!(msg.contains("rolled_back"));
    }

    #[test]
    fn test_state_serialization_format() {
        assert_eq!(
            serde_json::to_string(&PhaseState::EvaluatingCriteria).unwrap(),
            r#""evaluating_criteria""#
        );
        let run = run_at(&[PhaseState::Running]);
        let json = serde_json::to_string(&run).unwrap();
        let parsed: PhaseRun = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.current(), PhaseState::Running);
        assert_eq!(parsed.history().len(), 2);
    }
}
