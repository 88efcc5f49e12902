use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::performance::BenchmarkCategory;
use crate::{clog_debug, Error, Result};

/// Engine configuration, read from `~/.campaign/campaign.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub deployment: DeploymentSettings,
    #[serde(default)]
    pub performance: PerformanceSettings,
}

/// Defaults applied to tasks and checks that do not set their own values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentSettings {
    pub default_timeout_secs: u64,
    pub default_retries: u32,
    pub retry_delay_ms: u64,
    /// Audit log file the deployment logger appends to, if any.
    pub log_file: Option<String>,
    /// Working directory for spawned commands.
    pub working_dir: Option<String>,
}

impl Default for DeploymentSettings {
    fn default() -> Self {
        Self {
            default_timeout_secs: 300,
            default_retries: 1,
            retry_delay_ms: 0,
            log_file: None,
            working_dir: None,
        }
    }
}

impl DeploymentSettings {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn log_path(&self) -> Option<PathBuf> {
        self.log_file.as_deref().map(expand_tilde)
    }

    pub fn working_dir_path(&self) -> Option<PathBuf> {
        self.working_dir.as_deref().map(expand_tilde)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceSettings {
    /// Maximum benchmark history entries kept in memory.
    pub history_limit: usize,
    pub samples_per_benchmark: usize,
    /// Tiers below this hit rate raise a cache_miss alert.
    pub low_hit_rate_threshold: f64,
    /// Required mean improvement (0.0..=1.0) over baselines.
    pub improvement_target: f64,
    /// Latency (ms) at which the cache latency score is 0.5.
    pub reference_latency_ms: f64,
    pub monitor_interval_secs: u64,
    pub history_file: Option<String>,
    pub regression_thresholds: RegressionThresholds,
}

impl Default for PerformanceSettings {
    fn default() -> Self {
        Self {
            history_limit: 500,
            samples_per_benchmark: 5,
            low_hit_rate_threshold: 0.7,
            improvement_target: 0.5,
            reference_latency_ms: 10.0,
            monitor_interval_secs: 300,
            history_file: None,
            regression_thresholds: RegressionThresholds::default(),
        }
    }
}

impl PerformanceSettings {
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs.max(1))
    }

    /// Where benchmark history is flushed; defaults to `~/.campaign/history.json`.
    pub fn history_path(&self) -> Result<PathBuf> {
        match &self.history_file {
            Some(file) => Ok(expand_tilde(file)),
            None => Ok(Config::campaign_dir()?.join("history.json")),
        }
    }
}

/// Regression thresholds in percent, per benchmark category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegressionThresholds {
    pub algorithm: f64,
    pub cache: f64,
    pub database: f64,
    pub api: f64,
    pub ui: f64,
}

impl Default for RegressionThresholds {
    fn default() -> Self {
        Self {
            algorithm: 10.0,
            cache: 10.0,
            database: 10.0,
            api: 10.0,
            ui: 10.0,
        }
    }
}

impl RegressionThresholds {
    pub fn for_category(&self, category: BenchmarkCategory) -> f64 {
        match category {
            BenchmarkCategory::Algorithm => self.algorithm,
            BenchmarkCategory::Cache => self.cache,
            BenchmarkCategory::Database => self.database,
            BenchmarkCategory::Api => self.api,
            BenchmarkCategory::Ui => self.ui,
        }
    }

    pub fn uniform(percent: f64) -> Self {
        Self {
            algorithm: percent,
            cache: percent,
            database: percent,
            api: percent,
            ui: percent,
        }
    }
}

impl Config {
    pub fn campaign_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".campaign"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::campaign_dir()?.join("campaign.toml"))
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load from an explicit path, falling back to defaults when it is missing.
    pub fn load_from(path: &Path) -> Result<Self> {
        clog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            clog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        config.validate()?;
        clog_debug!(
            "Config loaded: timeout={}s retries={} history_limit={} hit_rate_threshold={}",
            config.deployment.default_timeout_secs,
            config.deployment.default_retries,
            config.performance.history_limit,
            config.performance.low_hit_rate_threshold
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let perf = &self.performance;
        if perf.history_limit == 0 {
            return Err(Error::Validation("history_limit must be at least 1".into()));
        }
        if perf.samples_per_benchmark == 0 {
            return Err(Error::Validation(
                "samples_per_benchmark must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&perf.low_hit_rate_threshold) {
            return Err(Error::Validation(
                "low_hit_rate_threshold must be within 0.0..=1.0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&perf.improvement_target) {
            return Err(Error::Validation(
                "improvement_target must be within 0.0..=1.0".into(),
            ));
        }
        if perf.reference_latency_ms <= 0.0 {
            return Err(Error::Validation(
                "reference_latency_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.deployment.default_timeout_secs, 300);
        assert_eq!(config.deployment.default_retries, 1);
        assert!(config.deployment.log_file.is_none());
        assert_eq!(config.performance.history_limit, 500);
        assert_eq!(config.performance.improvement_target, 0.5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_expand_tilde() {
        let expanded = expand_tilde("~/logs/deploy.log");
        assert!(expanded.ends_with("logs/deploy.log"));
        assert!(!expanded.to_string_lossy().contains('~'));

        let absolute = expand_tilde("/var/log/deploy.log");
        assert_eq!(absolute, PathBuf::from("/var/log/deploy.log"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml = r#"
            [performance]
            low_hit_rate_threshold = 0.9

            [performance.regression_thresholds]
            database = 25.0
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.performance.low_hit_rate_threshold, 0.9);
        assert_eq!(config.performance.history_limit, 500);
        assert_eq!(
            config
                .performance
                .regression_thresholds
                .for_category(BenchmarkCategory::Database),
            25.0
        );
        assert_eq!(
            config
                .performance
                .regression_thresholds
                .for_category(BenchmarkCategory::Api),
            10.0
        );
        assert_eq!(config.deployment.default_retries, 1);
    }

    #[test]
    fn test_load_from_missing_file_returns_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.performance.samples_per_benchmark, 5);
    }

    #[test]
    fn test_load_from_rejects_invalid_threshold() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("campaign.toml");
        fs::write(&path, "[performance]\nlow_hit_rate_threshold = 1.5\n").unwrap();
        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_config_roundtrip() {
        let mut config = Config::default();
        config.deployment.log_file = Some("~/deploy.log".to_string());
        config.performance.regression_thresholds = RegressionThresholds::uniform(15.0);

        let toml = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.deployment.log_file, Some("~/deploy.log".to_string()));
        assert_eq!(parsed.performance.regression_thresholds.ui, 15.0);
    }
}
