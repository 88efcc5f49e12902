//! Benchmark definitions, bounded history, and the runner.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::sampler::{default_sampler, BenchmarkSampler};
use super::types::{Benchmark, BenchmarkCategory, BenchmarkStatus};
use crate::error::{Error, Result};
use crate::{clog, clog_debug, clog_warn};

pub const DEFAULT_HISTORY_LIMIT: usize = 500;
pub const DEFAULT_SAMPLE_COUNT: usize = 5;

/// A named benchmark with its fixed baseline and target, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkDefinition {
    pub name: String,
    pub category: BenchmarkCategory,
    pub baseline: f64,
    pub target: f64,
    pub sample_count: usize,
}

impl BenchmarkDefinition {
    pub fn new(name: &str, category: BenchmarkCategory, baseline: f64, target: f64) -> Self {
        Self {
            name: name.to_string(),
            category,
            baseline,
            target,
            sample_count: DEFAULT_SAMPLE_COUNT,
        }
    }
}

/// One benchmark per category.
pub fn default_definitions() -> Vec<BenchmarkDefinition> {
    vec![
        BenchmarkDefinition::new("recommendation_scoring", BenchmarkCategory::Algorithm, 100.0, 50.0),
        BenchmarkDefinition::new("cache_lookup", BenchmarkCategory::Cache, 10.0, 5.0),
        BenchmarkDefinition::new("index_query", BenchmarkCategory::Database, 200.0, 100.0),
        BenchmarkDefinition::new("api_serialization", BenchmarkCategory::Api, 500.0, 250.0),
        BenchmarkDefinition::new("ui_render", BenchmarkCategory::Ui, 50.0, 25.0),
    ]
}

/// Append-only benchmark history that drops the oldest entries past `limit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkHistory {
    limit: usize,
    entries: VecDeque<Benchmark>,
}

impl Default for BenchmarkHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl BenchmarkHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            entries: VecDeque::new(),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn push(&mut self, benchmark: Benchmark) {
        self.entries.push_back(benchmark);
        while self.entries.len() > self.limit {
            self.entries.pop_front();
        }
    }

    pub fn extend(&mut self, benchmarks: impl IntoIterator<Item = Benchmark>) {
        for benchmark in benchmarks {
            self.push(benchmark);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Benchmark> {
        self.entries.iter()
    }

    /// Benchmark names in order of first appearance.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for entry in &self.entries {
            if !names.contains(&entry.name) {
                names.push(entry.name.clone());
            }
        }
        names
    }

    /// The two most recent entries for `name` as `(previous, latest)`.
    pub fn last_two(&self, name: &str) -> Option<(&Benchmark, &Benchmark)> {
        let mut matching = self.entries.iter().rev().filter(|b| b.name == name);
        let latest = matching.next()?;
        let previous = matching.next()?;
        Some((previous, latest))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let persist = |e: &dyn std::fmt::Display| Error::HistoryPersist {
            path: path.to_path_buf(),
            message: e.to_string(),
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| persist(&e))?;
            }
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| persist(&e))?;
        std::fs::write(path, json).map_err(|e| persist(&e))?;
        clog_debug!("Saved {} history entries to {}", self.len(), path.display());
        Ok(())
    }

    /// Load a saved history, re-applying `limit`.
    pub fn load(path: &Path, limit: usize) -> Result<Self> {
        let persist = |e: &dyn std::fmt::Display| Error::HistoryPersist {
            path: path.to_path_buf(),
            message: e.to_string(),
        };
        let text = std::fs::read_to_string(path).map_err(|e| persist(&e))?;
        let saved: BenchmarkHistory = serde_json::from_str(&text).map_err(|e| persist(&e))?;
        let mut history = BenchmarkHistory::new(limit);
        history.extend(saved.entries);
        Ok(history)
    }
}

/// Aggregate view of one benchmark run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementSummary {
    pub benchmarks: usize,
    pub passing: usize,
    pub degraded: usize,
    pub failing: usize,
    pub average_improvement: f64,
}

impl ImprovementSummary {
    pub fn from_benchmarks(benchmarks: &[Benchmark]) -> Self {
        let count = |status: BenchmarkStatus| benchmarks.iter().filter(|b| b.status == status).count();
        let improvements: Vec<f64> = benchmarks.iter().map(|b| b.improvement).collect();
        Self {
            benchmarks: benchmarks.len(),
            passing: count(BenchmarkStatus::Passing),
            degraded: count(BenchmarkStatus::Degraded),
            failing: count(BenchmarkStatus::Failing),
            average_improvement: crate::util::mean(&improvements).unwrap_or(0.0),
        }
    }

    /// Share of passing benchmarks; zero for an empty run.
    pub fn passing_ratio(&self) -> f64 {
        if self.benchmarks == 0 {
            0.0
        } else {
            self.passing as f64 / self.benchmarks as f64
        }
    }
}

/// Runs benchmark definitions through their category's sampler and records
/// every result in the shared history.
pub struct BenchmarkRunner {
    definitions: Vec<BenchmarkDefinition>,
    samplers: HashMap<BenchmarkCategory, Arc<dyn BenchmarkSampler>>,
    history: Arc<RwLock<BenchmarkHistory>>,
}

impl BenchmarkRunner {
    pub fn new(history: Arc<RwLock<BenchmarkHistory>>) -> Self {
        let samplers = BenchmarkCategory::ALL
            .iter()
            .map(|c| (*c, default_sampler(*c)))
            .collect();
        Self {
            definitions: default_definitions(),
            samplers,
            history,
        }
    }

    pub fn with_sampler(mut self, category: BenchmarkCategory, sampler: Arc<dyn BenchmarkSampler>) -> Self {
        self.samplers.insert(category, sampler);
        self
    }

    pub fn with_definitions(mut self, definitions: Vec<BenchmarkDefinition>) -> Self {
        self.definitions = definitions;
        self
    }

    pub fn with_sample_count(mut self, sample_count: usize) -> Self {
        for definition in &mut self.definitions {
            definition.sample_count = sample_count.max(1);
        }
        self
    }

    pub fn definitions(&self) -> &[BenchmarkDefinition] {
        &self.definitions
    }

    pub fn history(&self) -> Arc<RwLock<BenchmarkHistory>> {
        self.history.clone()
    }

    async fn run_definition(&self, definition: &BenchmarkDefinition) -> Option<Benchmark> {
        let sampler = match self.samplers.get(&definition.category) {
            Some(sampler) => sampler,
            None => {
                clog_warn!("No sampler for category {}, skipping {}", definition.category, definition.name);
                return None;
            }
        };

        let mut samples = Vec::with_capacity(definition.sample_count);
        for i in 0..definition.sample_count {
            match sampler.sample().await {
                Ok(ms) if ms.is_finite() && ms >= 0.0 => samples.push(ms),
                Ok(ms) => clog_warn!("Discarding sample {} of {}: {}", i, definition.name, ms),
                Err(e) => clog_warn!("Sample {} of {} failed: {}", i, definition.name, e),
            }
        }

        let benchmark = Benchmark::from_samples(
            &definition.name,
            definition.category,
            definition.baseline,
            definition.target,
            samples,
        );
        match &benchmark {
            Some(b) => clog_debug!(
                "Benchmark {} current={:.3}ms status={} improvement={:.3}",
                b.name,
                b.current,
                b.status,
                b.improvement
            ),
            None => clog_warn!("Benchmark {} produced no samples, omitted", definition.name),
        }
        benchmark
    }

    async fn run_definitions(&self, definitions: Vec<&BenchmarkDefinition>) -> Vec<Benchmark> {
        let results = join_all(definitions.into_iter().map(|d| self.run_definition(d))).await;
        let benchmarks: Vec<Benchmark> = results.into_iter().flatten().collect();
        self.history.write().await.extend(benchmarks.iter().cloned());
        benchmarks
    }

    /// Run every definition in `category`.
    pub async fn run_category(&self, category: BenchmarkCategory) -> Vec<Benchmark> {
        let definitions = self.definitions.iter().filter(|d| d.category == category).collect();
        self.run_definitions(definitions).await
    }

    /// Run all definitions, categories concurrently.
    pub async fn run_all(&self) -> Vec<Benchmark> {
        let benchmarks = self.run_definitions(self.definitions.iter().collect()).await;
        clog!(
            "Benchmark run complete: {}/{} produced",
            benchmarks.len(),
            self.definitions.len()
        );
        benchmarks
    }
}
