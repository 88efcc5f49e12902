//! Typed, severity-tagged alerts and the shared alert list.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::types::{BenchmarkCategory, BuildStatus, CacheTier};
use crate::{clog_debug, clog_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertId(pub Uuid);

impl AlertId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for AlertId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertSeverity::Low => write!(f, "low"),
            AlertSeverity::Medium => write!(f, "medium"),
            AlertSeverity::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Threshold,
    Regression,
    CacheMiss,
    SlowAlgorithm,
    Build,
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertKind::Threshold => write!(f, "threshold"),
            AlertKind::Regression => write!(f, "regression"),
            AlertKind::CacheMiss => write!(f, "cache_miss"),
            AlertKind::SlowAlgorithm => write!(f, "slow_algorithm"),
            AlertKind::Build => write!(f, "build"),
        }
    }
}

/// Metrics snapshot attached to an alert. The variant is the alert type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "metrics", rename_all = "snake_case")]
pub enum AlertContext {
    Threshold {
        benchmark: String,
        category: BenchmarkCategory,
        current: f64,
        target: f64,
        baseline: f64,
    },
    Regression {
        test_name: String,
        category: BenchmarkCategory,
        previous: f64,
        current: f64,
        percentage: f64,
        threshold: f64,
    },
    CacheMiss {
        tier: CacheTier,
        hit_rate: f64,
        threshold: f64,
    },
    SlowAlgorithm {
        average_improvement: f64,
        target: f64,
    },
    Build {
        status: BuildStatus,
    },
}

impl AlertContext {
    pub fn kind(&self) -> AlertKind {
        match self {
            AlertContext::Threshold { .. } => AlertKind::Threshold,
            AlertContext::Regression { .. } => AlertKind::Regression,
            AlertContext::CacheMiss { .. } => AlertKind::CacheMiss,
            AlertContext::SlowAlgorithm { .. } => AlertKind::SlowAlgorithm,
            AlertContext::Build { .. } => AlertKind::Build,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub timestamp: DateTime<Utc>,
    pub severity: AlertSeverity,
    pub message: String,
    pub context: AlertContext,
}

impl Alert {
    pub fn new(severity: AlertSeverity, message: impl Into<String>, context: AlertContext) -> Self {
        Self {
            id: AlertId::new(),
            timestamp: Utc::now(),
            severity,
            message: message.into(),
            context,
        }
    }

    pub fn kind(&self) -> AlertKind {
        self.context.kind()
    }

    pub fn threshold(
        benchmark: &str,
        category: BenchmarkCategory,
        current: f64,
        target: f64,
        baseline: f64,
    ) -> Self {
        Self::new(
            AlertSeverity::Medium,
            format!(
                "Benchmark '{}' is failing: {:.2}ms exceeds baseline {:.2}ms (target {:.2}ms)",
                benchmark, current, baseline, target
            ),
            AlertContext::Threshold {
                benchmark: benchmark.to_string(),
                category,
                current,
                target,
                baseline,
            },
        )
    }

    /// High severity once the slowdown exceeds twice the threshold.
    pub fn regression(
        test_name: &str,
        category: BenchmarkCategory,
        previous: f64,
        current: f64,
        percentage: f64,
        threshold: f64,
    ) -> Self {
        let severity = if percentage > threshold * 2.0 {
            AlertSeverity::High
        } else {
            AlertSeverity::Medium
        };
        Self::new(
            severity,
            format!(
                "Performance regression detected in {} ({}): {:.1}% slower ({:.2}ms -> {:.2}ms)",
                test_name, category, percentage, previous, current
            ),
            AlertContext::Regression {
                test_name: test_name.to_string(),
                category,
                previous,
                current,
                percentage,
                threshold,
            },
        )
    }

    pub fn cache_miss(tier: CacheTier, hit_rate: f64, threshold: f64) -> Self {
        Self::new(
            AlertSeverity::Medium,
            format!(
                "Low cache hit rate in {} tier: {:.1}% (threshold {:.1}%)",
                tier,
                hit_rate * 100.0,
                threshold * 100.0
            ),
            AlertContext::CacheMiss {
                tier,
                hit_rate,
                threshold,
            },
        )
    }

    pub fn slow_algorithm(average_improvement: f64, target: f64) -> Self {
        Self::new(
            AlertSeverity::Medium,
            format!(
                "Average improvement {:.1}% is below the {:.1}% target",
                average_improvement * 100.0,
                target * 100.0
            ),
            AlertContext::SlowAlgorithm {
                average_improvement,
                target,
            },
        )
    }

    pub fn build_failing() -> Self {
        Self::new(
            AlertSeverity::High,
            "Build is failing",
            AlertContext::Build {
                status: BuildStatus::Failing,
            },
        )
    }
}

/// Shared, append-only alert list. Clones share the same list.
#[derive(Debug, Clone, Default)]
pub struct AlertManager {
    alerts: Arc<RwLock<Vec<Alert>>>,
}

impl AlertManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_alert(&self, alert: Alert) {
        clog_warn!(
            "Alert [{}] {} ({}): {}",
            alert.severity,
            alert.kind(),
            alert.id.short(),
            alert.message
        );
        self.alerts.write().await.push(alert);
    }

    /// All alerts in the order they were raised.
    pub async fn current_alerts(&self) -> Vec<Alert> {
        self.alerts.read().await.clone()
    }

    pub async fn alerts_of_kind(&self, kind: AlertKind) -> Vec<Alert> {
        self.alerts
            .read()
            .await
            .iter()
            .filter(|a| a.kind() == kind)
            .cloned()
            .collect()
    }

    pub async fn clear_alerts(&self) {
        let mut alerts = self.alerts.write().await;
        clog_debug!("AlertManager::clear_alerts dropping {}", alerts.len());
        alerts.clear();
    }

    pub async fn len(&self) -> usize {
        self.alerts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.alerts.read().await.is_empty()
    }

    /// Block every writer until the guard drops.
    #[cfg(test)]
    pub(crate) async fn hold(&self) -> tokio::sync::RwLockWriteGuard<'_, Vec<Alert>> {
        self.alerts.write().await
    }

    /// Raise a `build` alert when the tracked build is failing.
    pub async fn check_build_status(&self, status: BuildStatus) -> Option<Alert> {
        match status {
            BuildStatus::Passing => None,
            BuildStatus::Failing => {
                let alert = Alert::build_failing();
                self.add_alert(alert.clone()).await;
                Some(alert)
            }
        }
    }
}
