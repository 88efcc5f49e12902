//! Performance validation: benchmarks, cache tiers, regressions, alerts.
//!
//! [`PerformanceReporter`] ties the pieces together. It runs the
//! [`BenchmarkRunner`], measures cache tiers through the
//! [`CacheTierValidator`], compares runs with the [`RegressionDetector`], and
//! snapshots the [`AlertManager`]. History and alerts live in a
//! [`PerformanceState`] that the [`PerformanceMonitor`] shares.

mod alerts;
mod benchmark;
mod cache;
mod monitor;
mod regression;
mod report;
mod sampler;
mod types;

pub use alerts::{Alert, AlertContext, AlertId, AlertKind, AlertManager, AlertSeverity};
pub use benchmark::{
    default_definitions, BenchmarkDefinition, BenchmarkHistory, BenchmarkRunner,
    ImprovementSummary, DEFAULT_HISTORY_LIMIT, DEFAULT_SAMPLE_COUNT,
};
pub use cache::{
    aggregate, efficiency, CacheTierSource, CacheTierValidator, SimulatedTieredCache,
    SimulationProfile, DEFAULT_LOW_HIT_RATE_THRESHOLD, DEFAULT_REFERENCE_LATENCY_MS,
};
pub use monitor::{MonitorHandle, PerformanceMonitor};
pub use regression::{recommendations_for, regression_percentage, RegressionDetector};
pub use report::{
    overall_score, write_report, PerformanceReporter, PerformanceState,
    DEFAULT_IMPROVEMENT_TARGET,
};
pub use sampler::{default_sampler, BenchmarkSampler, FixedSampler, FnSampler, WorkloadSampler};
pub use types::{
    improvement, Benchmark, BenchmarkCategory, BenchmarkStatus, BuildStatus, CachePerformanceMetrics,
    CacheTier, CacheTierMetrics, OverallCacheMetrics, PerformanceReport, RegressionTestResult,
};
