//! Continuous monitoring integration tests.

use std::sync::Arc;
use std::time::Duration;

use campaign::performance::{
    BenchmarkCategory, BenchmarkHistory, FnSampler, PerformanceMonitor, PerformanceReporter,
    PerformanceState,
};
use campaign::Error;
use tokio::sync::mpsc;

use super::fixtures::{reporter_with_timing, Workspace};

/// Test: Monitor persists history that a new process can restore
/// Given a monitor writing to a history file
/// When it is stopped after two reports
/// Then a fresh state restores the same history
#[tokio::test]
async fn test_history_survives_restart() {
    let workspace = Workspace::new();
    let history_file = workspace.file("history.json");
    let state = PerformanceState::default();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let handle = PerformanceMonitor::new(
        reporter_with_timing(state.clone(), 2.0),
        Duration::from_millis(10),
        Some(history_file.clone()),
    )
    .with_reports(tx)
    .spawn();
    rx.recv().await.unwrap();
    rx.recv().await.unwrap();
    handle.stop().await.unwrap();

    let restarted = PerformanceState::new(500);
    assert!(restarted.restore(&history_file).await.unwrap());
    let before = state.history.read().await.len();
    let after = restarted.history.read().await.len();
    assert_eq!(before, after);
    assert!(after >= 10);

    // A restored history feeds regression detection on the next report.
    let report = reporter_with_timing(restarted, 2.0).generate_report().await;
    assert_eq!(report.regression_tests.len(), 5);
    assert!(report.regression_tests.iter().all(|r| !r.regression_detected));
}

/// Test: Sample failures degrade a run without stopping the monitor
#[tokio::test]
async fn test_failing_samples_do_not_stop_monitoring() {
    let state = PerformanceState::default();
    let mut reporter = PerformanceReporter::new(state.clone()).with_sample_count(2);
    for category in BenchmarkCategory::ALL {
        reporter = reporter.with_sampler(
            category,
            Arc::new(FnSampler::new(|| Err(Error::Sampler("timer unavailable".into())))),
        );
    }
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = PerformanceMonitor::new(reporter, Duration::from_millis(10), None)
        .with_reports(tx)
        .spawn();

    let first = rx.recv().await.unwrap();
    let second = rx.recv().await.unwrap();
    assert!(first.benchmarks.is_empty());
    assert!(second.benchmarks.is_empty());
    assert!(!second.improvement_maintained);
    handle.stop().await.unwrap();
    assert!(state.history.read().await.is_empty());
}

/// Test: Stop waits for the final flush
#[tokio::test]
async fn test_stop_flushes_even_when_idle() {
    let workspace = Workspace::new();
    let history_file = workspace.file("nested").join("history.json");
    let handle = PerformanceMonitor::new(
        reporter_with_timing(PerformanceState::default(), 1.0),
        Duration::from_secs(3600),
        Some(history_file.clone()),
    )
    .spawn();

    handle.stop().await.unwrap();
    assert!(history_file.exists());
    assert!(BenchmarkHistory::load(&history_file, 500).is_ok());
}
