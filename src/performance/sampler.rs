//! Per-category timing routines.
//!
//! The runner takes one [`BenchmarkSampler`] per category, so tests can
//! replace the built-in workloads with fixed or scripted timings.

use std::collections::{BTreeMap, HashMap};
use std::hint::black_box;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::types::BenchmarkCategory;
use crate::util::{blocking, timed};
use crate::{Error, Result};

/// Produces one timing, in milliseconds, per call.
pub trait BenchmarkSampler: Send + Sync {
    fn sample(&self) -> BoxFuture<'_, Result<f64>>;
}

/// Sampler backed by a closure.
pub struct FnSampler<F> {
    f: F,
}

impl<F> FnSampler<F>
where
    F: Fn() -> Result<f64> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> BenchmarkSampler for FnSampler<F>
where
    F: Fn() -> Result<f64> + Send + Sync,
{
    fn sample(&self) -> BoxFuture<'_, Result<f64>> {
        let value = (self.f)();
        async move { value }.boxed()
    }
}

/// Cycles through a fixed list of timings.
pub struct FixedSampler {
    values: Vec<f64>,
    next: AtomicUsize,
}

impl FixedSampler {
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            values,
            next: AtomicUsize::new(0),
        }
    }

    pub fn constant(value: f64) -> Self {
        Self::new(vec![value])
    }
}

impl BenchmarkSampler for FixedSampler {
    fn sample(&self) -> BoxFuture<'_, Result<f64>> {
        async move {
            if self.values.is_empty() {
                return Err(Error::Sampler("fixed sampler has no values".into()));
            }
            let i = self.next.fetch_add(1, Ordering::Relaxed) % self.values.len();
            Ok(self.values[i])
        }
        .boxed()
    }
}

/// Built-in in-process workload for one category, run on the blocking pool.
#[derive(Debug, Clone)]
pub struct WorkloadSampler {
    category: BenchmarkCategory,
    size: usize,
}

impl WorkloadSampler {
    pub fn new(category: BenchmarkCategory) -> Self {
        let size = match category {
            BenchmarkCategory::Algorithm => 50_000,
            BenchmarkCategory::Cache => 100_000,
            BenchmarkCategory::Database => 200_000,
            BenchmarkCategory::Api => 2_000,
            BenchmarkCategory::Ui => 5_000,
        };
        Self { category, size }
    }

    pub fn with_size(mut self, size: usize) -> Self {
        self.size = size.max(1);
        self
    }

    pub fn category(&self) -> BenchmarkCategory {
        self.category
    }
}

impl BenchmarkSampler for WorkloadSampler {
    fn sample(&self) -> BoxFuture<'_, Result<f64>> {
        let category = self.category;
        let size = self.size;
        async move {
            blocking(move || {
                let ms = match category {
                    BenchmarkCategory::Algorithm => timed(|| black_box(score_and_rank(size))).1,
                    BenchmarkCategory::Cache => timed(|| black_box(hash_lookups(size))).1,
                    BenchmarkCategory::Database => timed(|| black_box(index_scan(size))).1,
                    BenchmarkCategory::Api => {
                        let (result, ms) = timed(|| json_round_trip(size));
                        black_box(result?);
                        ms
                    }
                    BenchmarkCategory::Ui => timed(|| black_box(render_rows(size))).1,
                };
                Ok(ms)
            })
            .await
        }
        .boxed()
    }
}

/// The built-in sampler for `category`.
pub fn default_sampler(category: BenchmarkCategory) -> Arc<dyn BenchmarkSampler> {
    Arc::new(WorkloadSampler::new(category))
}

fn score_and_rank(n: usize) -> u64 {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut scores: Vec<(u64, usize)> = (0..n)
        .map(|i| {
            let a = rng.gen_range(0..1000u64);
            let b = rng.gen_range(0..1000u64);
            (a * 3 + b * 7 + (i as u64 % 13), i)
        })
        .collect();
    scores.sort_unstable_by(|x, y| y.0.cmp(&x.0));
    scores.iter().take(10).map(|(s, _)| *s).sum()
}

fn hash_lookups(n: usize) -> usize {
    let keys = n.max(1) as u64;
    let map: HashMap<u64, u64> = (0..keys / 2).map(|k| (k, k * 2)).collect();
    let mut rng = StdRng::seed_from_u64(42);
    (0..n)
        .filter(|_| map.contains_key(&rng.gen_range(0..keys)))
        .count()
}

fn index_scan(n: usize) -> u64 {
    let keys = n.max(1) as u64;
    let index: BTreeMap<u64, u64> = (0..keys).map(|k| (k * 3, k)).collect();
    let mut rng = StdRng::seed_from_u64(7);
    (0..100)
        .map(|_| {
            let start = rng.gen_range(0..keys * 3);
            index.range(start..start + 300).map(|(_, v)| *v).sum::<u64>()
        })
        .sum()
}

#[derive(Serialize, Deserialize)]
struct Record {
    id: u64,
    name: String,
    tags: Vec<String>,
    score: f64,
}

fn json_round_trip(n: usize) -> Result<usize> {
    let records: Vec<Record> = (0..n as u64)
        .map(|id| Record {
            id,
            name: format!("record-{}", id),
            tags: vec!["alpha".into(), "beta".into()],
            score: id as f64 * 0.5,
        })
        .collect();
    let text = serde_json::to_string(&records)?;
    let back: Vec<Record> = serde_json::from_str(&text)?;
    Ok(back.len())
}

fn render_rows(n: usize) -> usize {
    let mut out = String::new();
    for i in 0..n {
        out.push_str(&format!("<li class=\"row-{}\">item {:>6}</li>\n", i % 2, i));
    }
    out.len()
}
