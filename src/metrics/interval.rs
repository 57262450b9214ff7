//! Interval-bucketed in-memory aggregation
//!
//! Keeps a bounded ring of fixed-width time buckets. Only the newest bucket
//! accepts writes; once a newer bucket exists the older one is frozen the
//! first time it is snapshotted and shared by reference afterwards.
//!
//! ```text
//!   ring (oldest dropped when len > retain / width)
//!   ┌────────┬────────┬────────┬─────────────┐
//!   │ frozen │ frozen │ frozen │ current (🔒) │ ◄── ingest
//!   └────────┴────────┴────────┴─────────────┘
//! ```
//!
//! The ring lock is taken for writing only when a bucket is created; ingest
//! takes it for reading, then the current bucket's own mutex.

use super::aggregate::AggregateSample;
use super::clock::{MetricsClock, MetricsTimestamp, ProductionClock};
use super::config::IntervalConfig;
use super::error::MetricsError;
use super::key_encoder::MetricKeyEncoder;
use super::types::Tag;
use crate::sinks::Sink;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::debug;

/// Last value of a gauge within one bucket
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GaugeValue {
    pub name: String,
    pub value: f64,
    pub tags: Vec<Tag>,
}

/// Aggregated counter or sample within one bucket
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampledValue {
    pub name: String,
    pub tags: Vec<Tag>,
    #[serde(flatten)]
    pub sample: AggregateSample,
}

impl SampledValue {
    fn new(name: String, tags: Vec<Tag>) -> Self {
        SampledValue {
            name,
            tags,
            sample: AggregateSample::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct BucketData {
    gauges: HashMap<String, GaugeValue>,
    counters: HashMap<String, SampledValue>,
    samples: HashMap<String, SampledValue>,
}

/// One time window of aggregated metrics
#[derive(Debug)]
struct IntervalBucket {
    start: MetricsTimestamp,
    data: Mutex<BucketData>,
    frozen: OnceLock<Arc<BucketSnapshot>>,
}

impl IntervalBucket {
    fn new(start: MetricsTimestamp) -> Self {
        IntervalBucket {
            start,
            data: Mutex::new(BucketData::default()),
            frozen: OnceLock::new(),
        }
    }

    fn copy(&self, immutable: bool) -> BucketSnapshot {
        let data = self.data.lock();
        BucketSnapshot {
            start: self.start,
            gauges: data.gauges.clone(),
            counters: data.counters.clone(),
            samples: data.samples.clone(),
            immutable,
        }
    }
}

/// Independent copy of one bucket
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketSnapshot {
    /// Bucket start, aligned to the interval width
    pub start: MetricsTimestamp,
    /// Keyed by series identity
    pub gauges: HashMap<String, GaugeValue>,
    pub counters: HashMap<String, SampledValue>,
    pub samples: HashMap<String, SampledValue>,
    /// False only for the bucket still accepting writes
    pub immutable: bool,
}

/// In-memory sink aggregating into a ring of interval buckets
pub struct IntervalAggregator<C: MetricsClock = ProductionClock> {
    width: Duration,
    max_intervals: usize,
    rate_denominator: f64,
    intervals: RwLock<VecDeque<Arc<IntervalBucket>>>,
    clock: C,
}

/// The in-memory sink is the interval aggregator itself
pub type InmemSink = IntervalAggregator<ProductionClock>;

impl IntervalAggregator<ProductionClock> {
    pub fn new(config: IntervalConfig) -> Result<Self, MetricsError> {
        IntervalAggregator::with_clock(config, ProductionClock::new())
    }
}

impl<C: MetricsClock> IntervalAggregator<C> {
    pub fn with_clock(config: IntervalConfig, clock: C) -> Result<Self, MetricsError> {
        config.validate()?;
        let max_intervals = config.max_intervals();
        Ok(IntervalAggregator {
            width: config.width,
            max_intervals,
            rate_denominator: config.width.as_secs_f64(),
            intervals: RwLock::new(VecDeque::with_capacity(max_intervals)),
            clock,
        })
    }

    pub fn width(&self) -> Duration {
        self.width
    }

    /// Bucket covering `now`, created if needed
    fn current_bucket(&self, now: MetricsTimestamp) -> Arc<IntervalBucket> {
        let start = now.truncate(self.width);
        {
            let intervals = self.intervals.read();
            if let Some(last) = intervals.back() {
                // A clock stepping backwards keeps writing to the newest bucket
                if last.start >= start {
                    return last.clone();
                }
            }
        }

        let mut intervals = self.intervals.write();
        if let Some(last) = intervals.back() {
            if last.start >= start {
                return last.clone();
            }
        }

        let bucket = Arc::new(IntervalBucket::new(start));
        intervals.push_back(bucket.clone());
        while intervals.len() > self.max_intervals {
            intervals.pop_front();
        }
        debug!(start = start.0, retained = intervals.len(), "created interval bucket");
        bucket
    }

    fn ingest_sampled(
        &self,
        pick: fn(&mut BucketData) -> &mut HashMap<String, SampledValue>,
        key: &[&str],
        value: f64,
        tags: &[Tag],
    ) {
        let now = self.clock.now();
        let flat = MetricKeyEncoder::flatten(key, tags);
        let bucket = self.current_bucket(now);

        let mut data = bucket.data.lock();
        let entry = pick(&mut data)
            .entry(flat.identity)
            .or_insert_with(|| SampledValue::new(flat.display_name, tags.to_vec()));
        entry.sample.ingest(value, self.rate_denominator, now);
    }

    /// Independent copy of every retained bucket, oldest first.
    ///
    /// Forces creation of the current bucket, so the result is never empty.
    pub fn snapshot(&self) -> Vec<Arc<BucketSnapshot>> {
        self.current_bucket(self.clock.now());

        let intervals = self.intervals.read();
        let n = intervals.len();
        intervals
            .iter()
            .enumerate()
            .map(|(i, bucket)| {
                if i + 1 < n {
                    bucket
                        .frozen
                        .get_or_init(|| Arc::new(bucket.copy(true)))
                        .clone()
                } else {
                    Arc::new(bucket.copy(false))
                }
            })
            .collect()
    }

    /// JSON view of the most recent completed bucket (or the current one if
    /// none has completed yet)
    pub fn display_metrics(&self) -> serde_json::Value {
        let snapshot = self.snapshot();
        let n = snapshot.len();
        let bucket = if n >= 2 { &snapshot[n - 2] } else { &snapshot[n - 1] };

        let mut gauges: Vec<&GaugeValue> = bucket.gauges.values().collect();
        gauges.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.tags.cmp(&b.tags)));
        let mut counters: Vec<&SampledValue> = bucket.counters.values().collect();
        counters.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.tags.cmp(&b.tags)));
        let mut samples: Vec<&SampledValue> = bucket.samples.values().collect();
        samples.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.tags.cmp(&b.tags)));

        serde_json::json!({
            "timestamp": bucket.start.0,
            "gauges": gauges,
            "counters": counters,
            "samples": samples,
        })
    }
}

impl<C: MetricsClock> Sink for IntervalAggregator<C> {
    fn set_gauge(&self, key: &[&str], value: f64, tags: &[Tag]) {
        let flat = MetricKeyEncoder::flatten(key, tags);
        let bucket = self.current_bucket(self.clock.now());

        bucket.data.lock().gauges.insert(
            flat.identity,
            GaugeValue {
                name: flat.display_name,
                value,
                tags: tags.to_vec(),
            },
        );
    }

    fn incr_counter(&self, key: &[&str], value: f64, tags: &[Tag]) {
        self.ingest_sampled(|d| &mut d.counters, key, value, tags);
    }

    fn add_sample(&self, key: &[&str], value: f64, tags: &[Tag]) {
        self.ingest_sampled(|d| &mut d.samples, key, value, tags);
    }
}
