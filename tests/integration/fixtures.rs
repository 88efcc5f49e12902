//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Scratch directories with marker files
//! - Predefined phases and tasks
//! - Reporters with scripted benchmark timings

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use campaign::deployment::{DeploymentLogger, DeploymentPipeline, Phase, PhaseOrchestrator, Task};
use campaign::performance::{
    BenchmarkCategory, FixedSampler, PerformanceReporter, PerformanceState, SimulatedTieredCache,
};

/// A scratch directory that is removed when dropped.
pub struct Workspace {
    temp_dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        Self { temp_dir }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Create a file and return its path.
    pub fn touch(&self, name: &str) -> PathBuf {
        let path = self.path().join(name);
        std::fs::write(&path, "marker\n").expect("Failed to write marker file");
        path
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.path().join(name)
    }
}

pub fn echo(id: &str, text: &str) -> Task {
    Task::new(id, &format!("echo {}", text), "echo")
        .args([text])
        .timeout(Duration::from_secs(5))
}

pub fn fail(id: &str) -> Task {
    Task::new(id, "always fails", "false").timeout(Duration::from_secs(5))
}

pub fn remove(id: &str, path: &PathBuf) -> Task {
    Task::new(id, "remove file", "rm")
        .args([path.to_string_lossy().into_owned()])
        .timeout(Duration::from_secs(5))
}

/// A phase whose single task succeeds.
pub fn passing_phase(id: &str) -> Phase {
    Phase::new(id, id).task(echo("work", id))
}

/// A phase whose single critical task fails.
pub fn failing_phase(id: &str) -> Phase {
    Phase::new(id, id).task(fail("work").critical(true))
}

pub fn pipeline() -> (DeploymentPipeline, DeploymentLogger) {
    let logger = DeploymentLogger::new();
    let pipeline = DeploymentPipeline::new(PhaseOrchestrator::new(logger.clone()));
    (pipeline, logger)
}

/// Reporter over `state` whose every benchmark sample is `value` ms.
pub fn reporter_with_timing(state: PerformanceState, value: f64) -> PerformanceReporter {
    let mut reporter = PerformanceReporter::new(state)
        .with_sample_count(2)
        .with_cache_source(Arc::new(SimulatedTieredCache::default()));
    for category in BenchmarkCategory::ALL {
        reporter = reporter.with_sampler(category, Arc::new(FixedSampler::constant(value)));
    }
    reporter
}
