//! Run-over-run regression detection.

use super::alerts::{Alert, AlertManager};
use super::benchmark::BenchmarkHistory;
use super::types::{BenchmarkCategory, RegressionTestResult};
use crate::config::RegressionThresholds;
use crate::{clog_debug, clog_warn};

/// Slowdown in percent from `previous` to `current`; zero when `previous`
/// is not positive.
pub fn regression_percentage(previous: f64, current: f64) -> f64 {
    if previous <= 0.0 || !previous.is_finite() || !current.is_finite() {
        return 0.0;
    }
    (current - previous) / previous * 100.0
}

/// Remediation hints for a regressed category.
pub fn recommendations_for(category: BenchmarkCategory) -> Vec<String> {
    let hints: &[&str] = match category {
        BenchmarkCategory::Algorithm => &[
            "Profile the hot path for added allocations or quadratic loops",
            "Check whether memoized intermediate results are still reused",
        ],
        BenchmarkCategory::Cache => &[
            "Review cache key construction and eviction settings",
            "Verify that warm-up still populates the memory tier",
        ],
        BenchmarkCategory::Database => &[
            "Inspect query plans for missing or unused indexes",
            "Batch queries issued inside loops",
        ],
        BenchmarkCategory::Api => &[
            "Reduce payload size or serialization work per request",
            "Check for new sequential calls that could run concurrently",
        ],
        BenchmarkCategory::Ui => &[
            "Look for unnecessary re-renders of unchanged rows",
            "Defer or virtualize rendering of off-screen content",
        ],
    };
    hints.iter().map(|h| h.to_string()).collect()
}

pub struct RegressionDetector {
    thresholds: RegressionThresholds,
    alerts: AlertManager,
}

impl RegressionDetector {
    pub fn new(thresholds: RegressionThresholds, alerts: AlertManager) -> Self {
        Self { thresholds, alerts }
    }

    pub fn thresholds(&self) -> &RegressionThresholds {
        &self.thresholds
    }

    /// Compare the latest entry of every benchmark with at least two runs
    /// against the run before it. Raises nothing.
    pub fn compare(&self, history: &BenchmarkHistory) -> Vec<RegressionTestResult> {
        history
            .names()
            .iter()
            .filter_map(|name| history.last_two(name))
            .map(|(previous, latest)| {
                let threshold = self.thresholds.for_category(latest.category);
                let percentage = regression_percentage(previous.current, latest.current);
                let detected = percentage > threshold;
                RegressionTestResult {
                    test_name: latest.name.clone(),
                    category: latest.category,
                    previous_performance: previous.current,
                    current_performance: latest.current,
                    regression_detected: detected,
                    regression_percentage: percentage,
                    threshold,
                    recommendations: if detected {
                        recommendations_for(latest.category)
                    } else {
                        Vec::new()
                    },
                }
            })
            .collect()
    }

    /// [`compare`](Self::compare), raising a `regression` alert per detection.
    pub async fn detect(&self, history: &BenchmarkHistory) -> Vec<RegressionTestResult> {
        let results = self.compare(history);
        self.raise_alerts(&results).await;
        results
    }

    /// Raise one `regression` alert per flagged result.
    pub async fn raise_alerts(&self, results: &[RegressionTestResult]) {
        for result in results.iter().filter(|r| r.regression_detected) {
            clog_warn!(
                "Regression in {}: {:.1}% over threshold {:.1}%",
                result.test_name,
                result.regression_percentage,
                result.threshold
            );
            self.alerts
                .add_alert(Alert::regression(
                    &result.test_name,
                    result.category,
                    result.previous_performance,
                    result.current_performance,
                    result.regression_percentage,
                    result.threshold,
                ))
                .await;
        }
        clog_debug!(
            "Regression check: {} compared, {} regressed",
            results.len(),
            results.iter().filter(|r| r.regression_detected).count()
        );
    }
}
