//! Append-only audit trail of deployment events.
//!
//! Entries are kept in memory and, when a file is configured, appended to it
//! one line per event as they happen.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::clog_warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryLevel {
    Info,
    Warn,
    Error,
}

impl fmt::Display for EntryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryLevel::Info => write!(f, "INFO"),
            EntryLevel::Warn => write!(f, "WARN"),
            EntryLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Something that happened during a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum DeploymentEvent {
    PipelineStarted { phases: usize },
    PipelineHalted { phase_id: String },
    PipelineCompleted { phases: usize },
    PhaseStarted { phase_id: String, name: String },
    PhaseCompleted { phase_id: String, success: bool },
    TaskStarted { phase_id: String, task_id: String },
    TaskSucceeded { phase_id: String, task_id: String, attempts: u32 },
    TaskFailed { phase_id: String, task_id: String, critical: bool, error: String },
    RollbackStarted { phase_id: String, tasks: usize },
    RollbackTaskCompleted { phase_id: String, task_id: String, error: Option<String> },
    ValidationCompleted { phase_id: String, check: String, success: bool },
    CriteriaFailed { phase_id: String, check: String },
}

impl DeploymentEvent {
    pub fn level(&self) -> EntryLevel {
        match self {
            DeploymentEvent::PipelineHalted { .. } => EntryLevel::Error,
            DeploymentEvent::PhaseCompleted { success: false, .. } => EntryLevel::Error,
            DeploymentEvent::TaskFailed { critical: true, .. } => EntryLevel::Error,
            DeploymentEvent::TaskFailed { critical: false, .. } => EntryLevel::Warn,
            DeploymentEvent::RollbackTaskCompleted { error: Some(_), .. } => EntryLevel::Warn,
            DeploymentEvent::ValidationCompleted { success: false, .. } => EntryLevel::Warn,
            DeploymentEvent::CriteriaFailed { .. } => EntryLevel::Error,
            _ => EntryLevel::Info,
        }
    }
}

impl fmt::Display for DeploymentEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeploymentEvent::PipelineStarted { phases } => {
                write!(f, "pipeline_started phases={}", phases)
            }
            DeploymentEvent::PipelineHalted { phase_id } => {
                write!(f, "pipeline_halted phase={}", phase_id)
            }
            DeploymentEvent::PipelineCompleted { phases } => {
                write!(f, "pipeline_completed phases={}", phases)
            }
            DeploymentEvent::PhaseStarted { phase_id, name } => {
                write!(f, "phase_started phase={} name={:?}", phase_id, name)
            }
            DeploymentEvent::PhaseCompleted { phase_id, success } => {
                write!(f, "phase_completed phase={} success={}", phase_id, success)
            }
            DeploymentEvent::TaskStarted { phase_id, task_id } => {
                write!(f, "task_started phase={} task={}", phase_id, task_id)
            }
            DeploymentEvent::TaskSucceeded {
                phase_id,
                task_id,
                attempts,
            } => write!(
                f,
                "task_succeeded phase={} task={} attempts={}",
                phase_id, task_id, attempts
            ),
            DeploymentEvent::TaskFailed {
                phase_id,
                task_id,
                critical,
                error,
            } => write!(
                f,
                "task_failed phase={} task={} critical={} error={:?}",
                phase_id, task_id, critical, error
            ),
            DeploymentEvent::RollbackStarted { phase_id, tasks } => {
                write!(f, "rollback_started phase={} tasks={}", phase_id, tasks)
            }
            DeploymentEvent::RollbackTaskCompleted {
                phase_id,
                task_id,
                error,
            } => match error {
                None => write!(f, "rollback_task_completed phase={} task={}", phase_id, task_id),
                Some(e) => write!(
                    f,
                    "rollback_task_failed phase={} task={} error={:?}",
                    phase_id, task_id, e
                ),
            },
            DeploymentEvent::ValidationCompleted {
                phase_id,
                check,
                success,
            } => write!(
                f,
                "validation_completed phase={} check={:?} success={}",
                phase_id, check, success
            ),
            DeploymentEvent::CriteriaFailed { phase_id, check } => {
                write!(f, "criteria_failed phase={} check={:?}", phase_id, check)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: EntryLevel,
    pub event: DeploymentEvent,
}

impl LogEntry {
    /// The single-line text form written to log files.
    pub fn to_line(&self) -> String {
        format!(
            "{} [{}] {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.level,
            self.event
        )
    }
}

/// Shared, append-only deployment log. Cloning shares the same entries.
#[derive(Debug, Clone, Default)]
pub struct DeploymentLogger {
    entries: Arc<RwLock<Vec<LogEntry>>>,
    file: Option<PathBuf>,
}

impl DeploymentLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also append every event to `path` as it is recorded.
    pub fn with_file(path: impl AsRef<Path>) -> Self {
        Self {
            entries: Arc::default(),
            file: Some(path.as_ref().to_path_buf()),
        }
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    /// Record an event. File append failures are logged, not returned, so
    /// auditing never interrupts a deployment.
    pub async fn record(&self, event: DeploymentEvent) {
        let entry = LogEntry {
            timestamp: Utc::now(),
            level: event.level(),
            event,
        };
        let line = entry.to_line();
        self.entries.write().await.push(entry);

        if let Some(path) = &self.file {
            if let Err(e) = append_line(path, &line).await {
                clog_warn!("Deployment log append to {} failed: {}", path.display(), e);
            }
        }
    }

    pub async fn entries(&self) -> Vec<LogEntry> {
        self.entries.read().await.clone()
    }

    pub async fn lines(&self) -> Vec<String> {
        self.entries.read().await.iter().map(LogEntry::to_line).collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Write the whole in-memory log to `path`, replacing its contents.
    pub async fn save_deployment_log(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut text = self.lines().await.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        tokio::fs::write(path.as_ref(), text).await?;
        Ok(())
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

async fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.write_all(b"\n").await?;
    file.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn started(phase: &str) -> DeploymentEvent {
        DeploymentEvent::PhaseStarted {
            phase_id: phase.to_string(),
            name: format!("Phase {}", phase),
        }
    }

    #[test]
    fn test_event_levels() {
        assert_eq!(started("a").level(), EntryLevel::Info);
        let non_critical = DeploymentEvent::TaskFailed {
            phase_id: "a".into(),
            task_id: "t".into(),
            critical: false,
            error: "x".into(),
        };
        assert_eq!(non_critical.level(), EntryLevel::Warn);
        let critical = DeploymentEvent::TaskFailed {
            critical: true,
            phase_id: "a".into(),
            task_id: "t".into(),
            error: "x".into(),
        };
        assert_eq!(critical.level(), EntryLevel::Error);
    }

    #[test]
    fn test_line_format() {
        let entry = LogEntry {
            timestamp: Utc::now(),
            level: EntryLevel::Info,
            event: DeploymentEvent::TaskSucceeded {
                phase_id: "lint".into(),
                task_id: "fix".into(),
                attempts: 2,
            },
        };
        let line = entry.to_line();
        assert!(line.contains("[INFO] task_succeeded phase=lint task=fix attempts=2"));
        assert!(!line.contains('\n'));
    }

    #[tokio::test]
    async fn test_record_keeps_chronological_order() {
        let logger = DeploymentLogger::new();
        logger.record(started("a")).await;
        logger.record(started("b")).await;

        let entries = logger.entries().await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].event, started("a"));
        assert!(entries[0].timestamp <= entries[1].timestamp);
    }

    #[tokio::test]
    async fn test_clones_share_entries() {
        let logger = DeploymentLogger::new();
        let clone = logger.clone();
        clone.record(started("a")).await;
        assert_eq!(logger.len().await, 1);
        logger.clear().await;
        assert!(clone.is_empty().await);
    }

    #[tokio::test]
    async fn test_file_append_and_save() {
        let dir = TempDir::new().unwrap();
        let live = dir.path().join("live.log");
        let logger = DeploymentLogger::with_file(&live);
        logger.record(started("a")).await;
        logger.record(started("b")).await;

        let appended = std::fs::read_to_string(&live).unwrap();
        assert_eq!(appended.lines().count(), 2);

        let saved = dir.path().join("saved.log");
        logger.save_deployment_log(&saved).await.unwrap();
        let saved_text = std::fs::read_to_string(&saved).unwrap();
        assert_eq!(saved_text, appended);
        assert_eq!(saved_text.lines().collect::<Vec<_>>(), logger.lines().await);
    }

    #[tokio::test]
    async fn test_save_to_missing_directory_errors() {
        let dir = TempDir::new().unwrap();
        let logger = DeploymentLogger::new();
        logger.record(started("a")).await;
        let result = logger
            .save_deployment_log(dir.path().join("missing").join("log.txt"))
            .await;
        assert!(result.is_err());
    }
}
