//! Benchmark, cache and report types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::alerts::Alert;

/// The five fixed benchmark categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BenchmarkCategory {
    Algorithm,
    Cache,
    Database,
    Api,
    Ui,
}

impl BenchmarkCategory {
    pub const ALL: [BenchmarkCategory; 5] = [
        BenchmarkCategory::Algorithm,
        BenchmarkCategory::Cache,
        BenchmarkCategory::Database,
        BenchmarkCategory::Api,
        BenchmarkCategory::Ui,
    ];
}

impl fmt::Display for BenchmarkCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BenchmarkCategory::Algorithm => write!(f, "algorithm"),
            BenchmarkCategory::Cache => write!(f, "cache"),
            BenchmarkCategory::Database => write!(f, "database"),
            BenchmarkCategory::Api => write!(f, "api"),
            BenchmarkCategory::Ui => write!(f, "ui"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BenchmarkStatus {
    Passing,
    Degraded,
    Failing,
}

impl BenchmarkStatus {
    /// `passing` at or under target, `degraded` at or under baseline,
    /// otherwise `failing`.
    pub fn classify(current: f64, baseline: f64, target: f64) -> Self {
        if current <= target {
            BenchmarkStatus::Passing
        } else if current <= baseline {
            BenchmarkStatus::Degraded
        } else {
            BenchmarkStatus::Failing
        }
    }
}

impl fmt::Display for BenchmarkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BenchmarkStatus::Passing => write!(f, "passing"),
            BenchmarkStatus::Degraded => write!(f, "degraded"),
            BenchmarkStatus::Failing => write!(f, "failing"),
        }
    }
}

/// Fractional improvement of `current` over `baseline`, floored at zero.
pub fn improvement(baseline: f64, current: f64) -> f64 {
    if baseline <= 0.0 {
        return 0.0;
    }
    ((baseline - current) / baseline).clamp(0.0, 1.0)
}

/// One timed measurement of a named benchmark. Times are in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Benchmark {
    pub name: String,
    pub category: BenchmarkCategory,
    pub baseline: f64,
    pub current: f64,
    pub improvement: f64,
    pub target: f64,
    pub status: BenchmarkStatus,
    pub samples: Vec<f64>,
    pub timestamp: DateTime<Utc>,
}

impl Benchmark {
    /// Derive a benchmark from raw samples. `None` when there are no samples.
    pub fn from_samples(
        name: &str,
        category: BenchmarkCategory,
        baseline: f64,
        target: f64,
        samples: Vec<f64>,
    ) -> Option<Self> {
        let current = crate::util::mean(&samples)?;
        Some(Self {
            name: name.to_string(),
            category,
            baseline,
            current,
            improvement: improvement(baseline, current),
            target,
            status: BenchmarkStatus::classify(current, baseline, target),
            samples,
            timestamp: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheTier {
    Memory,
    Redis,
    Database,
}

impl CacheTier {
    pub const ALL: [CacheTier; 3] = [CacheTier::Memory, CacheTier::Redis, CacheTier::Database];
}

impl fmt::Display for CacheTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheTier::Memory => write!(f, "memory"),
            CacheTier::Redis => write!(f, "redis"),
            CacheTier::Database => write!(f, "database"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheTierMetrics {
    pub tier: CacheTier,
    /// 0.0..=1.0
    pub hit_rate: f64,
    /// Milliseconds, always positive.
    pub avg_response_time: f64,
    pub size: usize,
    pub max_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallCacheMetrics {
    pub hit_rate: f64,
    pub avg_response_time: f64,
    /// 0.0..=100.0
    pub efficiency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachePerformanceMetrics {
    pub tier1: CacheTierMetrics,
    pub tier2: CacheTierMetrics,
    pub tier3: CacheTierMetrics,
    pub overall: OverallCacheMetrics,
}

impl CachePerformanceMetrics {
    pub fn tiers(&self) -> [&CacheTierMetrics; 3] {
        [&self.tier1, &self.tier2, &self.tier3]
    }
}

/// Comparison of a benchmark's latest run with the run before it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTestResult {
    pub test_name: String,
    pub category: BenchmarkCategory,
    pub previous_performance: f64,
    pub current_performance: f64,
    pub regression_detected: bool,
    /// Positive means slower.
    pub regression_percentage: f64,
    pub threshold: f64,
    pub recommendations: Vec<String>,
}

/// Build health reported by the external build-and-lint collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Passing,
    Failing,
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildStatus::Passing => write!(f, "passing"),
            BuildStatus::Failing => write!(f, "failing"),
        }
    }
}

impl std::str::FromStr for BuildStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "passing" | "pass" | "ok" => Ok(BuildStatus::Passing),
            "failing" | "fail" | "failed" => Ok(BuildStatus::Failing),
            other => Err(format!("unknown build status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub timestamp: DateTime<Utc>,
    pub benchmarks: Vec<Benchmark>,
    /// Absent when the cache tiers could not be measured.
    pub cache_metrics: Option<CachePerformanceMetrics>,
    pub regression_tests: Vec<RegressionTestResult>,
    pub overall_score: f64,
    pub improvement_maintained: bool,
    pub recommendations: Vec<String>,
    pub alerts: Vec<Alert>,
}
