//! Phase definitions loaded from TOML.
//!
//! ```toml
//! [[phases]]
//! id = "unused-imports"
//! name = "Remove unused imports"
//!
//! [[phases.tasks]]
//! id = "fix"
//! name = "Apply fixes"
//! command = "eslint"
//! args = ["--fix", "src"]
//! critical = true
//!
//! [[phases.rollback_tasks]]
//! id = "restore"
//! name = "Restore sources"
//! command = "git"
//! args = ["checkout", "--", "src"]
//!
//! [[phases.validation_checks]]
//! id = "build"
//! name = "Build"
//! kind = "build"
//! command = "yarn"
//! args = ["build"]
//! output_pattern = "(?i)compiled successfully"
//!
//! [phases.success_criteria]
//! linting_pass = true
//!
//! [[phases.success_criteria.custom]]
//! name = "no-explicit-any"
//! command = "sh"
//! args = ["-c", "! grep -r ': any' src"]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::executor::run_command;
use super::pipeline::validate_phases;
use super::types::{CustomCheck, Phase, SuccessCriteria, Task, ValidationCheck, ValidationKind};
use crate::config::DeploymentSettings;
use crate::error::Result;
use crate::clog_debug;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhaseFile {
    #[serde(default)]
    pub phases: Vec<PhaseDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseDef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    #[serde(default)]
    pub tasks: Vec<TaskDef>,
    #[serde(default)]
    pub rollback_tasks: Vec<TaskDef>,
    #[serde(default)]
    pub validation_checks: Vec<ValidationDef>,
    #[serde(default)]
    pub success_criteria: CriteriaDef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDef {
    pub id: String,
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub timeout_secs: Option<u64>,
    pub retries: Option<u32>,
    #[serde(default)]
    pub critical: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationDef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub kind: ValidationKind,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub expected_exit_code: i32,
    /// Stdout must contain this text.
    pub output_contains: Option<String>,
    /// Stdout must match this regex.
    pub output_pattern: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CriteriaDef {
    pub build_success: bool,
    pub tests_pass: bool,
    pub linting_pass: bool,
    pub configuration_valid: bool,
    pub custom: Vec<CommandCheckDef>,
}

impl Default for CriteriaDef {
    fn default() -> Self {
        Self {
            build_success: true,
            tests_pass: true,
            linting_pass: true,
            configuration_valid: true,
            custom: Vec::new(),
        }
    }
}

/// A custom success check that passes when its command exits 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandCheckDef {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub timeout_secs: Option<u64>,
}

impl PhaseFile {
    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        clog_debug!("PhaseFile::load path={}", path.display());
        Self::parse(&std::fs::read_to_string(path)?)
    }

    /// Build validated phases, filling unset timeouts and retries from
    /// `settings`. Custom checks run in `settings.working_dir` when set.
    pub fn into_phases(self, settings: &DeploymentSettings) -> Result<Vec<Phase>> {
        let working_dir = settings.working_dir_path();
        let phases = self
            .phases
            .into_iter()
            .map(|def| def.into_phase(settings, working_dir.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        validate_phases(&phases)?;
        Ok(phases)
    }
}

impl PhaseDef {
    fn into_phase(
        self,
        settings: &DeploymentSettings,
        working_dir: Option<&PathBuf>,
    ) -> Result<Phase> {
        let mut phase = Phase::new(&self.id, &self.name).description(&self.description);
        for prerequisite in &self.prerequisites {
            phase = phase.prerequisite(prerequisite);
        }
        for task in self.tasks {
            phase = phase.task(task.into_task(settings));
        }
        for task in self.rollback_tasks {
            phase = phase.rollback_task(task.into_task(settings));
        }
        for check in self.validation_checks {
            phase = phase.validation_check(check.into_check(settings)?);
        }

        let criteria_def = self.success_criteria;
        let mut criteria = SuccessCriteria {
            build_success: criteria_def.build_success,
            tests_pass: criteria_def.tests_pass,
            linting_pass: criteria_def.linting_pass,
            configuration_valid: criteria_def.configuration_valid,
            custom_checks: Vec::new(),
        };
        for check in criteria_def.custom {
            criteria = criteria.with_custom_check(check.into_custom_check(settings, working_dir));
        }
        Ok(phase.success_criteria(criteria))
    }
}

fn timeout_or_default(secs: Option<u64>, settings: &DeploymentSettings) -> Duration {
    secs.map(Duration::from_secs)
        .unwrap_or_else(|| settings.default_timeout())
}

impl TaskDef {
    fn into_task(self, settings: &DeploymentSettings) -> Task {
        Task::new(&self.id, &self.name, &self.command)
            .args(self.args)
            .timeout(timeout_or_default(self.timeout_secs, settings))
            .retries(self.retries.unwrap_or(settings.default_retries))
            .critical(self.critical)
    }
}

impl ValidationDef {
    fn into_check(self, settings: &DeploymentSettings) -> Result<ValidationCheck> {
        let mut check = ValidationCheck::new(&self.id, &self.name, &self.command)
            .kind(self.kind)
            .args(self.args)
            .timeout(timeout_or_default(self.timeout_secs, settings))
            .expect_exit_code(self.expected_exit_code);

        let pattern = self.output_pattern.as_deref().map(Regex::new).transpose()?;
        let needle = self.output_contains;
        if pattern.is_some() || needle.is_some() {
            check = check.validate_output(move |output| {
                let contains = needle.as_deref().map_or(true, |n| output.contains(n));
                let matches = pattern.as_ref().map_or(true, |re| re.is_match(output));
                contains && matches
            });
        }
        Ok(check)
    }
}

impl CommandCheckDef {
    fn into_custom_check(
        self,
        settings: &DeploymentSettings,
        working_dir: Option<&PathBuf>,
    ) -> CustomCheck {
        let timeout = timeout_or_default(self.timeout_secs, settings);
        let command = self.command;
        let args = self.args;
        let working_dir = working_dir.cloned();
        CustomCheck::new(&self.name, move || {
            let command = command.clone();
            let args = args.clone();
            let working_dir = working_dir.clone();
            async move {
                let output = run_command(&command, &args, timeout, working_dir.as_deref()).await?;
                Ok(output.succeeded())
            }
        })
    }
}
