//! Three-tier cache measurement (memory, redis, database).

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use futures::FutureExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::alerts::{Alert, AlertManager};
use super::types::{CachePerformanceMetrics, CacheTier, CacheTierMetrics, OverallCacheMetrics};
use crate::config::PerformanceSettings;
use crate::util::{blocking, duration_ms};
use crate::{clog_debug, Result};

pub const DEFAULT_LOW_HIT_RATE_THRESHOLD: f64 = 0.7;
pub const DEFAULT_REFERENCE_LATENCY_MS: f64 = 10.0;

/// Smallest latency reported for a tier, in milliseconds.
const MIN_LATENCY_MS: f64 = 0.001;

/// Source of per-tier cache metrics.
pub trait CacheTierSource: Send + Sync {
    fn measure_tier(&self, tier: CacheTier) -> BoxFuture<'_, Result<CacheTierMetrics>>;

    /// Metrics for memory, redis and database, in that order. Sources that
    /// measure every tier in one pass override this.
    fn measure_all(&self) -> BoxFuture<'_, Result<[CacheTierMetrics; 3]>> {
        async move {
            Ok([
                self.measure_tier(CacheTier::Memory).await?,
                self.measure_tier(CacheTier::Redis).await?,
                self.measure_tier(CacheTier::Database).await?,
            ])
        }
        .boxed()
    }
}

/// Composite efficiency in `[0, 100]`: 70% hit rate, 30% latency score,
/// where the latency score is `reference / (reference + avg_ms)`.
pub fn efficiency(hit_rate: f64, avg_response_time: f64, reference_latency_ms: f64) -> f64 {
    let hit_rate = sanitize_hit_rate(hit_rate);
    let latency = sanitize_latency(avg_response_time);
    let reference = if reference_latency_ms > 0.0 {
        reference_latency_ms
    } else {
        DEFAULT_REFERENCE_LATENCY_MS
    };
    let latency_score = reference / (reference + latency);
    (100.0 * (0.7 * hit_rate + 0.3 * latency_score)).clamp(0.0, 100.0)
}

fn sanitize_hit_rate(hit_rate: f64) -> f64 {
    if hit_rate.is_nan() {
        0.0
    } else {
        hit_rate.clamp(0.0, 1.0)
    }
}

fn sanitize_latency(ms: f64) -> f64 {
    if ms.is_finite() && ms > MIN_LATENCY_MS {
        ms
    } else if ms.is_infinite() && ms > 0.0 {
        f64::MAX
    } else {
        MIN_LATENCY_MS
    }
}

/// Mean hit rate and latency across tiers, plus efficiency.
pub fn aggregate(tiers: &[&CacheTierMetrics], reference_latency_ms: f64) -> OverallCacheMetrics {
    let hit_rates: Vec<f64> = tiers.iter().map(|t| t.hit_rate).collect();
    let latencies: Vec<f64> = tiers.iter().map(|t| t.avg_response_time).collect();
    let hit_rate = crate::util::mean(&hit_rates).map_or(0.0, sanitize_hit_rate);
    let avg_response_time = crate::util::mean(&latencies).map_or(MIN_LATENCY_MS, sanitize_latency);
    OverallCacheMetrics {
        hit_rate,
        avg_response_time,
        efficiency: efficiency(hit_rate, avg_response_time, reference_latency_ms),
    }
}

pub struct CacheTierValidator {
    source: Arc<dyn CacheTierSource>,
    alerts: AlertManager,
    low_hit_rate_threshold: f64,
    reference_latency_ms: f64,
}

impl CacheTierValidator {
    pub fn new(alerts: AlertManager) -> Self {
        Self {
            source: Arc::new(SimulatedTieredCache::default()),
            alerts,
            low_hit_rate_threshold: DEFAULT_LOW_HIT_RATE_THRESHOLD,
            reference_latency_ms: DEFAULT_REFERENCE_LATENCY_MS,
        }
    }

    pub fn from_settings(settings: &PerformanceSettings, alerts: AlertManager) -> Self {
        Self::new(alerts)
            .with_threshold(settings.low_hit_rate_threshold)
            .with_reference_latency(settings.reference_latency_ms)
    }

    pub fn with_source(mut self, source: Arc<dyn CacheTierSource>) -> Self {
        self.source = source;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.low_hit_rate_threshold = threshold;
        self
    }

    pub fn with_reference_latency(mut self, ms: f64) -> Self {
        self.reference_latency_ms = ms;
        self
    }

    /// Measure all three tiers and raise a `cache_miss` alert for each tier
    /// whose hit rate is under the threshold.
    pub async fn validate(&self) -> Result<CachePerformanceMetrics> {
        let [tier1, tier2, tier3] = self.source.measure_all().await?;
        let tier1 = sanitize(tier1, CacheTier::Memory);
        let tier2 = sanitize(tier2, CacheTier::Redis);
        let tier3 = sanitize(tier3, CacheTier::Database);
        let overall = aggregate(&[&tier1, &tier2, &tier3], self.reference_latency_ms);
        let metrics = CachePerformanceMetrics {
            tier1,
            tier2,
            tier3,
            overall,
        };

        for tier in metrics.tiers() {
            clog_debug!(
                "Cache tier {} hit_rate={:.3} avg={:.3}ms size={}/{}",
                tier.tier,
                tier.hit_rate,
                tier.avg_response_time,
                tier.size,
                tier.max_size
            );
            if tier.hit_rate < self.low_hit_rate_threshold {
                self.alerts
                    .add_alert(Alert::cache_miss(tier.tier, tier.hit_rate, self.low_hit_rate_threshold))
                    .await;
            }
        }
        Ok(metrics)
    }
}

fn sanitize(mut metrics: CacheTierMetrics, tier: CacheTier) -> CacheTierMetrics {
    metrics.tier = tier;
    metrics.hit_rate = sanitize_hit_rate(metrics.hit_rate);
    metrics.avg_response_time = sanitize_latency(metrics.avg_response_time);
    metrics
}

/// Tunables for [`SimulatedTieredCache`].
#[derive(Debug, Clone)]
pub struct SimulationProfile {
    pub memory_capacity: usize,
    pub redis_capacity: usize,
    pub requests: usize,
    pub key_space: u64,
    /// Keys below this are present in the database tier.
    pub stored_keys: u64,
    pub hot_keys: u64,
    pub hot_ratio: f64,
    /// Modeled per-lookup latency added to the measured time, in ms.
    pub memory_latency_ms: f64,
    pub redis_latency_ms: f64,
    pub database_latency_ms: f64,
    pub seed: u64,
}

impl Default for SimulationProfile {
    fn default() -> Self {
        Self {
            memory_capacity: 64,
            redis_capacity: 512,
            requests: 20_000,
            key_space: 600,
            stored_keys: 570,
            hot_keys: 48,
            hot_ratio: 0.8,
            memory_latency_ms: 0.1,
            redis_latency_ms: 2.0,
            database_latency_ms: 15.0,
            seed: 0x0c0ffee,
        }
    }
}

/// In-process three-tier cache replaying a deterministic key workload.
#[derive(Debug, Clone, Default)]
pub struct SimulatedTieredCache {
    profile: SimulationProfile,
}

impl SimulatedTieredCache {
    pub fn new(profile: SimulationProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &SimulationProfile {
        &self.profile
    }

    /// Run the full workload and return metrics for all three tiers.
    pub fn simulate(&self) -> [CacheTierMetrics; 3] {
        let p = &self.profile;
        let mut memory = LruTier::new(p.memory_capacity);
        let mut redis = FifoTier::new(p.redis_capacity);
        let mut stats = [TierStats::default(), TierStats::default(), TierStats::default()];
        let mut rng = StdRng::seed_from_u64(p.seed);
        let hot_ratio = if p.hot_ratio.is_nan() { 0.0 } else { p.hot_ratio.clamp(0.0, 1.0) };

        for _ in 0..p.requests {
            let key = if rng.gen_bool(hot_ratio) {
                rng.gen_range(0..p.hot_keys.max(1))
            } else {
                rng.gen_range(0..p.key_space.max(1))
            };

            let start = Instant::now();
            let hit = memory.get(key);
            stats[0].record(hit, duration_ms(start.elapsed()));
            if hit {
                continue;
            }

            let start = Instant::now();
            let hit = redis.get(key);
            stats[1].record(hit, duration_ms(start.elapsed()));
            if hit {
                memory.insert(key);
                continue;
            }

            let start = Instant::now();
            let hit = key < p.stored_keys;
            stats[2].record(hit, duration_ms(start.elapsed()));
            if hit {
                redis.insert(key);
                memory.insert(key);
            }
        }

        let stored = p.stored_keys.min(p.key_space) as usize;
        [
            stats[0].metrics(CacheTier::Memory, p.memory_latency_ms, memory.len(), p.memory_capacity),
            stats[1].metrics(CacheTier::Redis, p.redis_latency_ms, redis.len(), p.redis_capacity),
            stats[2].metrics(CacheTier::Database, p.database_latency_ms, stored, stored),
        ]
    }
}

impl CacheTierSource for SimulatedTieredCache {
    fn measure_tier(&self, tier: CacheTier) -> BoxFuture<'_, Result<CacheTierMetrics>> {
        async move {
            let [memory, redis, database] = self.measure_all().await?;
            Ok(match tier {
                CacheTier::Memory => memory,
                CacheTier::Redis => redis,
                CacheTier::Database => database,
            })
        }
        .boxed()
    }

    fn measure_all(&self) -> BoxFuture<'_, Result<[CacheTierMetrics; 3]>> {
        let cache = self.clone();
        async move { blocking(move || Ok(cache.simulate())).await }.boxed()
    }
}

#[derive(Debug, Default)]
struct TierStats {
    lookups: u64,
    hits: u64,
    elapsed_ms: f64,
}

impl TierStats {
    fn record(&mut self, hit: bool, elapsed_ms: f64) {
        self.lookups += 1;
        if hit {
            self.hits += 1;
        }
        self.elapsed_ms += elapsed_ms;
    }

    fn metrics(&self, tier: CacheTier, modeled_ms: f64, size: usize, max_size: usize) -> CacheTierMetrics {
        let (hit_rate, measured) = if self.lookups == 0 {
            (0.0, 0.0)
        } else {
            (
                self.hits as f64 / self.lookups as f64,
                self.elapsed_ms / self.lookups as f64,
            )
        };
        CacheTierMetrics {
            tier,
            hit_rate,
            avg_response_time: sanitize_latency(modeled_ms + measured),
            size,
            max_size,
        }
    }
}

/// Least-recently-used set of keys.
struct LruTier {
    capacity: usize,
    clock: u64,
    entries: HashMap<u64, u64>,
}

impl LruTier {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            clock: 0,
            entries: HashMap::new(),
        }
    }

    fn get(&mut self, key: u64) -> bool {
        self.clock += 1;
        match self.entries.get_mut(&key) {
            Some(used) => {
                *used = self.clock;
                true
            }
            None => false,
        }
    }

    fn insert(&mut self, key: u64) {
        self.clock += 1;
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            if let Some(oldest) = self.entries.iter().min_by_key(|(_, used)| **used).map(|(k, _)| *k) {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(key, self.clock);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// First-in-first-out set of keys.
struct FifoTier {
    capacity: usize,
    order: VecDeque<u64>,
    keys: HashSet<u64>,
}

impl FifoTier {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            keys: HashSet::new(),
        }
    }

    fn get(&self, key: u64) -> bool {
        self.keys.contains(&key)
    }

    fn insert(&mut self, key: u64) {
        if !self.keys.insert(key) {
            return;
        }
        self.order.push_back(key);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.keys.remove(&evicted);
            }
        }
    }

    fn len(&self) -> usize {
        self.keys.len()
    }
}
