//! Performance validation integration tests.
//!
//! Benchmark timings are injected through samplers, so every assertion here
//! is deterministic.

use std::sync::Arc;

use campaign::config::{PerformanceSettings, RegressionThresholds};
use campaign::performance::{
    improvement, AlertKind, AlertSeverity, BenchmarkCategory, BenchmarkDefinition,
    BenchmarkHistory, BenchmarkRunner, BenchmarkStatus, BuildStatus, CacheTierValidator,
    FixedSampler, PerformanceReporter, PerformanceState, RegressionDetector,
    SimulatedTieredCache,
};
use campaign::Error;
use tokio::sync::RwLock;

use super::fixtures::{reporter_with_timing, Workspace};

fn runner_with(history: Arc<RwLock<BenchmarkHistory>>, value: f64) -> BenchmarkRunner {
    let mut runner = BenchmarkRunner::new(history).with_sample_count(1);
    for category in BenchmarkCategory::ALL {
        runner = runner.with_sampler(category, Arc::new(FixedSampler::constant(value)));
    }
    runner
}

/// Test: Improvement and status follow their formulas for every benchmark
/// Given a sweep of injected timings around each baseline and target
/// When benchmarks run
/// Then improvement and status match the closed-form rules
#[tokio::test]
async fn test_improvement_and_status_properties() {
    let history = Arc::new(RwLock::new(BenchmarkHistory::default()));
    for step in 0..30 {
        let value = step as f64 * 25.0;
        let benchmarks = runner_with(history.clone(), value).run_all().await;
        assert_eq!(benchmarks.len(), 5);
        for b in &benchmarks {
            let expected = ((b.baseline - b.current) / b.baseline).max(0.0);
            assert!((b.improvement - expected).abs() < 1e-3);
            assert!((b.improvement - improvement(b.baseline, b.current)).abs() < 1e-12);
            let status = if b.current <= b.target {
                BenchmarkStatus::Passing
            } else if b.current <= b.baseline {
                BenchmarkStatus::Degraded
            } else {
                BenchmarkStatus::Failing
            };
            assert_eq!(b.status, status, "{} at {}ms", b.name, value);
            assert!(!b.samples.is_empty());
        }
    }
}

/// Test: History grows monotonically and is capped at 500
#[tokio::test]
async fn test_history_is_monotonic_and_capped() {
    let history = Arc::new(RwLock::new(BenchmarkHistory::default()));
    let runner = runner_with(history.clone(), 1.0);
    let mut last = 0;
    for _ in 0..120 {
        runner.run_all().await;
        let len = history.read().await.len();
        assert!(len >= last);
        assert!(len <= 500);
        last = len;
    }
    assert_eq!(last, 500);
}

/// Test: Regression detection across runs
/// Given a baseline run and then an improving run
/// When regressions are checked
/// Then none is flagged; after a synthetic 3x slowdown all are flagged
#[tokio::test]
async fn test_regression_detection_between_runs() {
    let history = Arc::new(RwLock::new(BenchmarkHistory::default()));
    let state_alerts = campaign::performance::AlertManager::new();
    let detector = RegressionDetector::new(RegressionThresholds::default(), state_alerts.clone());

    runner_with(history.clone(), 40.0).run_all().await;
    runner_with(history.clone(), 30.0).run_all().await;
    let results = detector.detect(&*history.read().await).await;
    assert_eq!(results.len(), 5);
    assert!(results.iter().all(|r| !r.regression_detected));
    assert!(state_alerts.is_empty().await);

    runner_with(history.clone(), 90.0).run_all().await;
    let results = detector.detect(&*history.read().await).await;
    assert!(results.iter().all(|r| r.regression_detected));
    assert!(results.iter().all(|r| r.regression_percentage > r.threshold));
    assert!(results.iter().all(|r| (r.regression_percentage - 200.0).abs() < 1e-9));

    let alerts = state_alerts.alerts_of_kind(AlertKind::Regression).await;
    assert_eq!(alerts.len(), 5);
    assert!(alerts.iter().all(|a| a.message.contains("regression detected")));
    assert!(alerts.iter().all(|a| a.severity == AlertSeverity::High));
}

/// Test: clear_alerts drops everything raised before it
#[tokio::test]
async fn test_clear_alerts_forgets_prior_alerts() {
    let reporter = reporter_with_timing(PerformanceState::default(), 5_000.0);
    reporter.generate_report().await;
    reporter.check_build_status(BuildStatus::Failing).await;
    assert!(!reporter.alerts().current_alerts().await.is_empty());

    reporter.alerts().clear_alerts().await;
    assert!(reporter.alerts().current_alerts().await.is_empty());

    reporter.check_build_status(BuildStatus::Passing).await;
    assert!(reporter.alerts().is_empty().await);
}

/// Test: Cache validation with a strict threshold raises cache_miss alerts
#[tokio::test]
async fn test_cache_validation_alerts_name_the_tier() {
    let state = PerformanceState::default();
    let validator = CacheTierValidator::new(state.alerts.clone())
        .with_source(Arc::new(SimulatedTieredCache::default()))
        .with_threshold(1.01);
    let metrics = validator.validate().await.unwrap();

    assert!((0.0..=1.0).contains(&metrics.overall.hit_rate));
    assert!(metrics.overall.avg_response_time > 0.0);
    assert!((0.0..=100.0).contains(&metrics.overall.efficiency));

    let alerts = state.alerts.alerts_of_kind(AlertKind::CacheMiss).await;
    assert_eq!(alerts.len(), 3);
    for (alert, tier) in alerts.iter().zip(["memory", "redis", "database"]) {
        assert!(alert.message.contains(tier), "{}", alert.message);
        assert!(alert.message.contains('%'));
    }
}

/// Test: Settings flow into the reporter
/// Given a 0.99 improvement target
/// When a report is generated with fast timings
/// Then improvement is not maintained and a slow_algorithm alert is raised
#[tokio::test]
async fn test_reporter_from_settings_uses_improvement_target() {
    let settings = PerformanceSettings {
        improvement_target: 0.99,
        samples_per_benchmark: 1,
        ..PerformanceSettings::default()
    };
    let mut reporter = PerformanceReporter::from_settings(&settings, PerformanceState::default())
        .with_definitions(vec![BenchmarkDefinition::new(
            "scoring",
            BenchmarkCategory::Algorithm,
            100.0,
            50.0,
        )])
        .with_sample_count(1);
    reporter = reporter.with_sampler(BenchmarkCategory::Algorithm, Arc::new(FixedSampler::constant(10.0)));

    let report = reporter.generate_report().await;
    assert_eq!(report.benchmarks.len(), 1);
    assert!(!report.improvement_maintained);
    assert!(report
        .alerts
        .iter()
        .any(|a| a.kind() == AlertKind::SlowAlgorithm));
}

/// Test: Export to an unwritable location
/// Given a path whose parent directory does not exist
/// When the report is exported
/// Then a typed error is returned and no file is left behind
#[tokio::test]
async fn test_export_failure_leaves_no_partial_file() {
    let workspace = Workspace::new();
    let target = workspace.path().join("no-such-dir").join("performance.json");
    let reporter = reporter_with_timing(PerformanceState::default(), 1.0);

    let err = reporter.export_performance_data(&target).await.unwrap_err();

    assert!(matches!(err, Error::Export { .. }));
    assert!(err.to_string().contains("Failed to export performance data"));
    assert!(!target.exists());
    assert_eq!(std::fs::read_dir(workspace.path()).unwrap().count(), 0);
}

/// Test: Exported JSON round-trips into a report
#[tokio::test]
async fn test_export_round_trip() {
    let workspace = Workspace::new();
    let target = workspace.file("performance.json");
    let reporter = reporter_with_timing(PerformanceState::default(), 1.0);
    reporter.check_build_status(BuildStatus::Failing).await;

    let report = reporter.export_performance_data(&target).await.unwrap();
    let text = std::fs::read_to_string(&target).unwrap();
    let parsed: campaign::performance::PerformanceReport = serde_json::from_str(&text).unwrap();

    let names = |r: &campaign::performance::PerformanceReport| {
        r.benchmarks.iter().map(|b| b.name.clone()).collect::<Vec<_>>()
    };
    assert_eq!(names(&parsed), names(&report));
    assert!((parsed.overall_score - report.overall_score).abs() < 1e-9);
    let ids = |r: &campaign::performance::PerformanceReport| {
        r.alerts.iter().map(|a| a.id).collect::<Vec<_>>()
    };
    assert_eq!(ids(&parsed), ids(&report));
    assert!(parsed.alerts.iter().any(|a| a.kind() == AlertKind::Build));
}
