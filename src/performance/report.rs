//! Report assembly, scoring, and export.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::alerts::{Alert, AlertManager};
use super::benchmark::{BenchmarkDefinition, BenchmarkHistory, BenchmarkRunner, ImprovementSummary};
use super::cache::{CacheTierSource, CacheTierValidator};
use super::regression::RegressionDetector;
use super::sampler::BenchmarkSampler;
use super::types::{
    Benchmark, BenchmarkCategory, BenchmarkStatus, BuildStatus, PerformanceReport,
    RegressionTestResult,
};
use crate::config::{PerformanceSettings, RegressionThresholds};
use crate::error::{Error, Result};
use crate::{clog, clog_debug, clog_warn};

pub const DEFAULT_IMPROVEMENT_TARGET: f64 = 0.5;

/// Benchmark history and alert list shared by the reporter and the monitor.
#[derive(Debug, Clone)]
pub struct PerformanceState {
    pub history: Arc<RwLock<BenchmarkHistory>>,
    pub alerts: AlertManager,
}

impl Default for PerformanceState {
    fn default() -> Self {
        Self::new(super::benchmark::DEFAULT_HISTORY_LIMIT)
    }
}

impl PerformanceState {
    pub fn new(history_limit: usize) -> Self {
        Self {
            history: Arc::new(RwLock::new(BenchmarkHistory::new(history_limit))),
            alerts: AlertManager::new(),
        }
    }

    /// Drop all history and alerts.
    pub async fn reset(&self) {
        self.history.write().await.clear();
        self.alerts.clear_alerts().await;
    }

    /// Replace the in-memory history with the one saved at `path`.
    /// Returns false when there is nothing to restore.
    pub async fn restore(&self, path: &Path) -> Result<bool> {
        if !path.exists() {
            clog_debug!("No saved history at {}", path.display());
            return Ok(false);
        }
        let mut history = self.history.write().await;
        let loaded = BenchmarkHistory::load(path, history.limit())?;
        clog!("Restored {} history entries from {}", loaded.len(), path.display());
        *history = loaded;
        Ok(true)
    }

    pub async fn flush(&self, path: &Path) -> Result<()> {
        self.history.read().await.save(path)
    }
}

/// Weighted score in `[0, 100]`: 50 for passing benchmarks, 30 for cache
/// efficiency, 20 for regression-free benchmarks.
pub fn overall_score(passing_ratio: f64, efficiency: f64, regression_free_ratio: f64) -> f64 {
    let unit = |x: f64| if x.is_nan() { 0.0 } else { x.clamp(0.0, 1.0) };
    let score = 50.0 * unit(passing_ratio)
        + 30.0 * unit(efficiency / 100.0)
        + 20.0 * unit(regression_free_ratio);
    score.clamp(0.0, 100.0)
}

fn regression_free_ratio(results: &[RegressionTestResult]) -> f64 {
    if results.is_empty() {
        return 1.0;
    }
    let clean = results.iter().filter(|r| !r.regression_detected).count();
    clean as f64 / results.len() as f64
}

fn benchmark_recommendation(benchmark: &Benchmark) -> Option<String> {
    match benchmark.status {
        BenchmarkStatus::Passing => None,
        BenchmarkStatus::Degraded => Some(format!(
            "{} ({}) is degraded: {:.2}ms against a {:.2}ms target; optimize toward the target",
            benchmark.name, benchmark.category, benchmark.current, benchmark.target
        )),
        BenchmarkStatus::Failing => Some(format!(
            "{} ({}) is failing: {:.2}ms is slower than the {:.2}ms baseline; investigate recent changes",
            benchmark.name, benchmark.category, benchmark.current, benchmark.baseline
        )),
    }
}

/// Runs the benchmark, cache, and regression checks and assembles reports.
pub struct PerformanceReporter {
    state: PerformanceState,
    runner: BenchmarkRunner,
    cache: CacheTierValidator,
    regression: RegressionDetector,
    improvement_target: f64,
}

impl PerformanceReporter {
    pub fn new(state: PerformanceState) -> Self {
        Self {
            runner: BenchmarkRunner::new(state.history.clone()),
            cache: CacheTierValidator::new(state.alerts.clone()),
            regression: RegressionDetector::new(RegressionThresholds::default(), state.alerts.clone()),
            improvement_target: DEFAULT_IMPROVEMENT_TARGET,
            state,
        }
    }

    pub fn from_settings(settings: &PerformanceSettings, state: PerformanceState) -> Self {
        Self {
            runner: BenchmarkRunner::new(state.history.clone())
                .with_sample_count(settings.samples_per_benchmark),
            cache: CacheTierValidator::from_settings(settings, state.alerts.clone()),
            regression: RegressionDetector::new(settings.regression_thresholds, state.alerts.clone()),
            improvement_target: settings.improvement_target,
            state,
        }
    }

    pub fn with_sampler(mut self, category: BenchmarkCategory, sampler: Arc<dyn BenchmarkSampler>) -> Self {
        self.runner = self.runner.with_sampler(category, sampler);
        self
    }

    pub fn with_definitions(mut self, definitions: Vec<BenchmarkDefinition>) -> Self {
        self.runner = self.runner.with_definitions(definitions);
        self
    }

    pub fn with_sample_count(mut self, sample_count: usize) -> Self {
        self.runner = self.runner.with_sample_count(sample_count);
        self
    }

    pub fn with_cache_source(mut self, source: Arc<dyn CacheTierSource>) -> Self {
        self.cache = self.cache.with_source(source);
        self
    }

    pub fn with_improvement_target(mut self, target: f64) -> Self {
        self.improvement_target = target;
        self
    }

    pub fn state(&self) -> &PerformanceState {
        &self.state
    }

    pub fn alerts(&self) -> &AlertManager {
        &self.state.alerts
    }

    /// Run every benchmark once, raising a `threshold` alert per failing one.
    pub async fn run_benchmarks(&self) -> Vec<Benchmark> {
        let benchmarks = self.runner.run_all().await;
        for benchmark in benchmarks.iter().filter(|b| b.status == BenchmarkStatus::Failing) {
            self.state
                .alerts
                .add_alert(Alert::threshold(
                    &benchmark.name,
                    benchmark.category,
                    benchmark.current,
                    benchmark.target,
                    benchmark.baseline,
                ))
                .await;
        }
        benchmarks
    }

    pub async fn generate_report(&self) -> PerformanceReport {
        let benchmarks = self.run_benchmarks().await;

        let cache_metrics = match self.cache.validate().await {
            Ok(metrics) => Some(metrics),
            Err(e) => {
                clog_warn!("Cache tier validation failed: {}", e);
                None
            }
        };

        let (regression_tests, history_empty) = {
            let history = self.state.history.read().await;
            (self.regression.compare(&history), history.is_empty())
        };
        self.regression.raise_alerts(&regression_tests).await;

        let summary = ImprovementSummary::from_benchmarks(&benchmarks);
        let improvement_maintained = !history_empty
            && !benchmarks.is_empty()
            && summary.average_improvement >= self.improvement_target;
        if !benchmarks.is_empty() && summary.average_improvement < self.improvement_target {
            self.state
                .alerts
                .add_alert(Alert::slow_algorithm(summary.average_improvement, self.improvement_target))
                .await;
        }

        let efficiency = cache_metrics.as_ref().map_or(0.0, |m| m.overall.efficiency);
        let overall_score = overall_score(
            summary.passing_ratio(),
            efficiency,
            regression_free_ratio(&regression_tests),
        );

        let mut recommendations: Vec<String> =
            benchmarks.iter().filter_map(benchmark_recommendation).collect();
        for result in regression_tests.iter().filter(|r| r.regression_detected) {
            for hint in &result.recommendations {
                let line = format!("{}: {}", result.test_name, hint);
                if !recommendations.contains(&line) {
                    recommendations.push(line);
                }
            }
        }

        clog!(
            "Performance report: score={:.1} passing={}/{} regressions={}",
            overall_score,
            summary.passing,
            summary.benchmarks,
            regression_tests.iter().filter(|r| r.regression_detected).count()
        );

        PerformanceReport {
            timestamp: Utc::now(),
            benchmarks,
            cache_metrics,
            regression_tests,
            overall_score,
            improvement_maintained,
            recommendations,
            alerts: self.state.alerts.current_alerts().await,
        }
    }

    /// Generate a fresh report and write it to `path` as JSON.
    pub async fn export_performance_data(&self, path: &Path) -> Result<PerformanceReport> {
        let report = self.generate_report().await;
        write_report(&report, path).await?;
        Ok(report)
    }

    pub async fn check_build_status(&self, status: BuildStatus) -> Option<Alert> {
        self.state.alerts.check_build_status(status).await
    }
}

/// Write `report` to a sibling temporary file and rename it over `path`.
/// On failure the temporary file is removed and `path` is left untouched.
pub async fn write_report(report: &PerformanceReport, path: &Path) -> Result<()> {
    let export_error = |message: String| Error::Export {
        path: path.to_path_buf(),
        message,
    };

    let file_name = path
        .file_name()
        .ok_or_else(|| export_error("path has no file name".into()))?
        .to_string_lossy()
        .into_owned();
    let tmp: PathBuf = path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));

    let json = serde_json::to_vec_pretty(report).map_err(|e| export_error(e.to_string()))?;
    let written = match tokio::fs::write(&tmp, &json).await {
        Ok(()) => tokio::fs::rename(&tmp, path).await,
        Err(e) => Err(e),
    };

    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&tmp).await;
        clog_warn!("Export to {} failed: {}", path.display(), e);
        return Err(export_error(e.to_string()));
    }
    clog!("Exported performance data to {}", path.display());
    Ok(())
}
