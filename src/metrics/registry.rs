//! Concurrent, expiry-managed metric registry
//!
//! Holds exactly one live entry per series identity per [`MetricKind`] and is
//! shared by the pull and push sinks.
//!
//! ## Concurrency
//!
//! ```text
//! writer ──► shard read guard ──► per-key atomics / per-key mutex
//! writer ──► (miss) shard write guard ──► insert dynamic entry
//! sweep  ──► shard write guard ──► evict expired dynamic, render the rest
//! ```
//!
//! Updating an existing series never takes a registry-wide lock. Gauge values
//! and counter totals are `f64` bit patterns in atomics; counters accumulate
//! with a CAS loop so concurrent increments are never lost. Summaries hold a
//! per-key mutex around their [`AggregateSample`].
//!
//! `updated_at` is stored with relaxed ordering and last-writer-wins. Two
//! racing writers may publish their timestamps out of order; that only shifts
//! when the series expires, never its value.

use super::aggregate::AggregateSample;
use super::clock::MetricsTimestamp;
use super::config::RegistryConfig;
use super::key_encoder::MetricKeyEncoder;
use super::types::{MetricKind, StaticDeclaration, Tag};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

type EntryMap = DashMap<String, RegistryEntry, ahash::RandomState>;

/// `f64` stored as its bit pattern
#[derive(Debug)]
struct AtomicF64(AtomicU64);

impl AtomicF64 {
    fn new(value: f64) -> Self {
        AtomicF64(AtomicU64::new(value.to_bits()))
    }

    fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }

    fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Release);
    }

    fn fetch_add(&self, delta: f64) {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            let next = (f64::from_bits(current) + delta).to_bits();
            match self
                .0
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }
}

/// Kind-specific payload of an entry
#[derive(Debug)]
enum EntryValue {
    Gauge(AtomicF64),
    Counter(AtomicF64),
    Summary(Mutex<AggregateSample>),
}

impl EntryValue {
    fn empty(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Gauge => EntryValue::Gauge(AtomicF64::new(0.0)),
            MetricKind::Counter => EntryValue::Counter(AtomicF64::new(0.0)),
            MetricKind::Summary => EntryValue::Summary(Mutex::new(AggregateSample::new())),
        }
    }

    fn render(&self) -> RenderedValue {
        match self {
            EntryValue::Gauge(v) => RenderedValue::Gauge(v.load()),
            EntryValue::Counter(v) => RenderedValue::Counter(v.load()),
            EntryValue::Summary(s) => RenderedValue::Summary(s.lock().clone()),
        }
    }
}

/// One live series owned by the registry
#[derive(Debug)]
struct RegistryEntry {
    name: String,
    help: String,
    tags: Vec<Tag>,
    value: EntryValue,
    updated_at: AtomicU64,
    deletable: bool,
}

impl RegistryEntry {
    fn new(
        kind: MetricKind,
        name: String,
        help: String,
        tags: Vec<Tag>,
        now: MetricsTimestamp,
        deletable: bool,
    ) -> Self {
        RegistryEntry {
            name,
            help,
            tags,
            value: EntryValue::empty(kind),
            updated_at: AtomicU64::new(now.0),
            deletable,
        }
    }

    fn touch(&self, now: MetricsTimestamp) {
        self.updated_at.store(now.0, Ordering::Relaxed);
    }

    fn updated_at(&self) -> MetricsTimestamp {
        MetricsTimestamp(self.updated_at.load(Ordering::Relaxed))
    }

    fn is_expired(&self, now: MetricsTimestamp, expiration: Duration) -> bool {
        !expiration.is_zero() && now > self.updated_at() + expiration
    }

    fn render(&self, kind: MetricKind, identity: &str) -> RenderedEntry {
        RenderedEntry {
            kind,
            name: self.name.clone(),
            help: self.help.clone(),
            identity: identity.to_string(),
            tags: self.tags.clone(),
            value: self.value.render(),
            updated_at: self.updated_at(),
            deletable: self.deletable,
        }
    }
}

/// Point-in-time value of a rendered series
#[derive(Debug, Clone, PartialEq)]
pub enum RenderedValue {
    Gauge(f64),
    Counter(f64),
    Summary(AggregateSample),
}

impl RenderedValue {
    /// Scalar view: gauge/counter value, or the summary sum
    pub fn as_f64(&self) -> f64 {
        match self {
            RenderedValue::Gauge(v) | RenderedValue::Counter(v) => *v,
            RenderedValue::Summary(s) => s.sum,
        }
    }
}

/// A series as seen by a backend at render time
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEntry {
    pub kind: MetricKind,
    /// Sanitized display name
    pub name: String,
    pub help: String,
    pub identity: String,
    pub tags: Vec<Tag>,
    pub value: RenderedValue,
    pub updated_at: MetricsTimestamp,
    /// False for statically declared series
    pub deletable: bool,
}

/// Controls for [`ExpiringRegistry::sweep_and_render_with`]
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    /// Idle time after which dynamic series are evicted (0 = never)
    pub expiration: Duration,
    /// Remove dynamic series after rendering them
    pub cleanup: bool,
}

/// Concurrent map of live series with lazy, render-driven eviction
pub struct ExpiringRegistry {
    gauges: EntryMap,
    counters: EntryMap,
    summaries: EntryMap,
    /// Help text from static declarations, keyed by kind and display name
    help: RwLock<HashMap<(MetricKind, String), String>>,
    rate_denominator: f64,
}

impl Default for ExpiringRegistry {
    fn default() -> Self {
        ExpiringRegistry::with_rate_denominator(1.0)
    }
}

impl ExpiringRegistry {
    /// Build a registry and register every static declaration in `config`
    pub fn new(config: &RegistryConfig, now: MetricsTimestamp) -> Self {
        let registry = ExpiringRegistry::with_rate_denominator(config.rate_denominator());
        for decl in &config.gauges {
            registry.declare(MetricKind::Gauge, decl, now);
        }
        for decl in &config.counters {
            registry.declare(MetricKind::Counter, decl, now);
        }
        for decl in &config.summaries {
            registry.declare(MetricKind::Summary, decl, now);
        }
        registry
    }

    /// Empty registry; summary rates are `sum / rate_denominator`
    pub fn with_rate_denominator(rate_denominator: f64) -> Self {
        ExpiringRegistry {
            gauges: DashMap::with_hasher(ahash::RandomState::new()),
            counters: DashMap::with_hasher(ahash::RandomState::new()),
            summaries: DashMap::with_hasher(ahash::RandomState::new()),
            help: RwLock::new(HashMap::new()),
            rate_denominator,
        }
    }

    fn map(&self, kind: MetricKind) -> &EntryMap {
        match kind {
            MetricKind::Gauge => &self.gauges,
            MetricKind::Counter => &self.counters,
            MetricKind::Summary => &self.summaries,
        }
    }

    /// Pre-register a series that never expires.
    ///
    /// The help text also applies to dynamic series created later under the
    /// same display name. Re-declaring replaces the existing series.
    pub fn declare(&self, kind: MetricKind, decl: &StaticDeclaration, now: MetricsTimestamp) {
        let name = MetricKeyEncoder::sanitize_display(&decl.name);
        let identity = MetricKeyEncoder::identity_for(&name, &decl.const_tags);

        // Help lock is released before touching the map; writers take them in
        // the opposite order on the miss path.
        self.help
            .write()
            .insert((kind, name.clone()), decl.help.clone());

        let entry = RegistryEntry::new(
            kind,
            name,
            decl.help.clone(),
            decl.const_tags.clone(),
            now,
            false,
        );
        debug!(%kind, identity = %identity, "declared static metric");
        self.map(kind).insert(identity, entry);
    }

    fn help_for(&self, kind: MetricKind, name: &str) -> String {
        self.help
            .read()
            .get(&(kind, name.to_string()))
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    /// Apply `update` to the series for `key`/`tags`, creating it on first write
    fn with_entry<F>(
        &self,
        kind: MetricKind,
        key: &[&str],
        tags: &[Tag],
        now: MetricsTimestamp,
        update: F,
    ) where
        F: Fn(&EntryValue),
    {
        let flat = MetricKeyEncoder::flatten(key, tags);
        let map = self.map(kind);

        if let Some(entry) = map.get(&flat.identity) {
            update(&entry.value);
            entry.touch(now);
            return;
        }

        let help = self.help_for(kind, &flat.display_name);
        let entry = map.entry(flat.identity).or_insert_with(|| {
            RegistryEntry::new(kind, flat.display_name, help, tags.to_vec(), now, true)
        });
        update(&entry.value);
        entry.touch(now);
    }

    /// Set the last value of a gauge
    pub fn set_gauge(&self, key: &[&str], value: f64, tags: &[Tag], now: MetricsTimestamp) {
        self.with_entry(MetricKind::Gauge, key, tags, now, |v| {
            if let EntryValue::Gauge(g) = v {
                g.store(value);
            }
        });
    }

    /// Add `delta` to a counter
    pub fn incr_counter(&self, key: &[&str], delta: f64, tags: &[Tag], now: MetricsTimestamp) {
        self.with_entry(MetricKind::Counter, key, tags, now, |v| {
            if let EntryValue::Counter(c) = v {
                c.fetch_add(delta);
            }
        });
    }

    /// Ingest one observation into a summary
    pub fn add_sample(&self, key: &[&str], value: f64, tags: &[Tag], now: MetricsTimestamp) {
        let rate_denominator = self.rate_denominator;
        self.with_entry(MetricKind::Summary, key, tags, now, |v| {
            if let EntryValue::Summary(s) = v {
                s.lock().ingest(value, rate_denominator, now);
            }
        });
    }

    /// Evict expired dynamic series and render everything that remains.
    ///
    /// A dynamic series last written at `t0` is rendered iff
    /// `now <= t0 + expiration`. Static series always render. A zero
    /// `expiration` disables eviction.
    pub fn sweep_and_render(
        &self,
        now: MetricsTimestamp,
        expiration: Duration,
    ) -> Vec<RenderedEntry> {
        self.sweep_and_render_with(
            now,
            RenderOptions {
                expiration,
                cleanup: false,
            },
        )
    }

    pub fn sweep_and_render_with(
        &self,
        now: MetricsTimestamp,
        options: RenderOptions,
    ) -> Vec<RenderedEntry> {
        let mut rendered = Vec::with_capacity(self.len());
        let mut evicted = 0usize;

        for kind in MetricKind::ALL {
            self.map(kind).retain(|identity, entry| {
                if entry.deletable && entry.is_expired(now, options.expiration) {
                    evicted += 1;
                    return false;
                }
                rendered.push(entry.render(kind, identity));
                !(options.cleanup && entry.deletable)
            });
        }

        if evicted > 0 {
            debug!(evicted, remaining = rendered.len(), "evicted expired metrics");
        }
        rendered
    }

    /// Render one series without sweeping
    pub fn get(&self, kind: MetricKind, identity: &str) -> Option<RenderedEntry> {
        self.map(kind)
            .get(identity)
            .map(|entry| entry.render(kind, identity))
    }

    /// Total live series across all kinds
    pub fn len(&self) -> usize {
        self.gauges.len() + self.counters.len() + self.summaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn ts(ms: u64) -> MetricsTimestamp {
        MetricsTimestamp(ms)
    }

    fn find<'a>(entries: &'a [RenderedEntry], identity: &str) -> Option<&'a RenderedEntry> {
        entries.iter().find(|e| e.identity == identity)
    }

    #[test]
    fn test_gauge_last_value_wins() {
        let registry = ExpiringRegistry::default();
        let tags = Tag::from_pairs(&[("host", "web01")]);

        registry.set_gauge(&["cpu", "load"], 1.5, &tags, ts(0));
        registry.set_gauge(&["cpu", "load"], 2.5, &tags, ts(1));

        let entry = registry.get(MetricKind::Gauge, "cpu_load;host=web01").unwrap();
        assert_eq!(entry.value, RenderedValue::Gauge(2.5));
        assert_eq!(entry.updated_at, ts(1));
        assert!(entry.deletable);
        assert_eq!(entry.help, "cpu_load");
    }

    #[test]
    fn test_counter_accumulates() {
        let registry = ExpiringRegistry::default();
        registry.incr_counter(&["requests"], 2.0, &[], ts(0));
        registry.incr_counter(&["requests"], 3.5, &[], ts(0));

        let entry = registry.get(MetricKind::Counter, "requests").unwrap();
        assert_eq!(entry.value, RenderedValue::Counter(5.5));
    }

    #[test]
    fn test_summary_ingests() {
        let registry = ExpiringRegistry::default();
        for v in [1.0, 2.0, 3.0] {
            registry.add_sample(&["latency"], v, &[], ts(0));
        }

        match registry.get(MetricKind::Summary, "latency").unwrap().value {
            RenderedValue::Summary(s) => {
                assert_eq!(s.count, 3);
                assert_eq!(s.mean(), Some(2.0));
            }
            other => panic!("expected summary, got {:?}", other),
        }
    }

    #[test]
    fn test_kinds_are_separate() {
        let registry = ExpiringRegistry::default();
        registry.set_gauge(&["m"], 1.0, &[], ts(0));
        registry.incr_counter(&["m"], 1.0, &[], ts(0));
        registry.add_sample(&["m"], 1.0, &[], ts(0));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_dynamic_entry_expires_after_deadline() {
        let registry = ExpiringRegistry::default();
        let expiration = Duration::from_millis(100);
        registry.set_gauge(&["temp"], 20.0, &[], ts(1000));

        // Present up to and including t0 + e
        let at_deadline = registry.sweep_and_render(ts(1100), expiration);
        assert!(find(&at_deadline, "temp").is_some());

        let after = registry.sweep_and_render(ts(1101), expiration);
        assert!(find(&after, "temp").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_write_refreshes_expiry() {
        let registry = ExpiringRegistry::default();
        let expiration = Duration::from_millis(100);
        registry.incr_counter(&["hits"], 1.0, &[], ts(0));
        registry.incr_counter(&["hits"], 1.0, &[], ts(90));

        let rendered = registry.sweep_and_render(ts(150), expiration);
        assert_eq!(find(&rendered, "hits").unwrap().value, RenderedValue::Counter(2.0));
    }

    #[test]
    fn test_zero_expiration_never_expires() {
        let registry = ExpiringRegistry::default();
        registry.set_gauge(&["forever"], 1.0, &[], ts(0));
        let rendered = registry.sweep_and_render(ts(u64::MAX / 2), Duration::ZERO);
        assert_eq!(rendered.len(), 1);
    }

    #[test]
    fn test_static_entry_never_expires() {
        let mut config = RegistryConfig::default();
        config.gauges.push(
            StaticDeclaration::new("build.info", "Build metadata")
                .with_const_tags(Tag::from_pairs(&[("version", "1.2")])),
        );
        let registry = ExpiringRegistry::new(&config, ts(0));

        let tags = Tag::from_pairs(&[("version", "1.2")]);
        registry.set_gauge(&["build", "info"], 1.0, &tags, ts(10));

        let rendered = registry.sweep_and_render(ts(1_000_000), Duration::from_millis(1));
        let entry = find(&rendered, "build_info;version=1.2").unwrap();
        assert!(!entry.deletable);
        assert_eq!(entry.value, RenderedValue::Gauge(1.0));
        assert_eq!(entry.help, "Build metadata");
    }

    #[test]
    fn test_dynamic_entry_inherits_declared_help() {
        let registry = ExpiringRegistry::default();
        registry.declare(
            MetricKind::Counter,
            &StaticDeclaration::new("http_requests", "Total HTTP requests"),
            ts(0),
        );

        let tags = Tag::from_pairs(&[("code", "500")]);
        registry.incr_counter(&["http", "requests"], 1.0, &tags, ts(0));

        let entry = registry
            .get(MetricKind::Counter, "http_requests;code=500")
            .unwrap();
        assert_eq!(entry.help, "Total HTTP requests");
        assert!(entry.deletable);
    }

    #[test]
    fn test_cleanup_removes_only_dynamic() {
        let registry = ExpiringRegistry::default();
        registry.declare(MetricKind::Gauge, &StaticDeclaration::new("up", "Up"), ts(0));
        registry.set_gauge(&["temp"], 1.0, &[], ts(0));

        let options = RenderOptions {
            expiration: Duration::ZERO,
            cleanup: true,
        };
        assert_eq!(registry.sweep_and_render_with(ts(1), options).len(), 2);

        let second = registry.sweep_and_render_with(ts(2), options);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].identity, "up");
    }

    #[test]
    fn test_concurrent_increments_not_lost() {
        let registry = Arc::new(ExpiringRegistry::default());
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        registry.incr_counter(&["shared"], 1.0, &[], ts(0));
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        let entry = registry.get(MetricKind::Counter, "shared").unwrap();
        assert_eq!(entry.value, RenderedValue::Counter(8000.0));
    }

    #[test]
    fn test_atomic_f64_fetch_add() {
        let v = AtomicF64::new(1.5);
        v.fetch_add(2.25);
        assert_eq!(v.load(), 3.75);
        v.store(-1.0);
        assert_eq!(v.load(), -1.0);
    }
}
