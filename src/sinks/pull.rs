//! Pull-style sink: series live in an expiring registry and are rendered
//! when a scraper collects them.

use super::Sink;
use crate::metrics::{
    ExpiringRegistry, MetricKind, MetricsClock, ProductionClock, RegistryConfig, RenderedEntry,
    StaticDeclaration, Tag,
};
use std::time::Duration;

pub struct PullSink<C: MetricsClock = ProductionClock> {
    registry: ExpiringRegistry,
    expiration: Duration,
    clock: C,
}

impl PullSink<ProductionClock> {
    pub fn new(config: &RegistryConfig) -> Self {
        PullSink::with_clock(config, ProductionClock::new())
    }
}

impl<C: MetricsClock> PullSink<C> {
    pub fn with_clock(config: &RegistryConfig, clock: C) -> Self {
        PullSink {
            registry: ExpiringRegistry::new(config, clock.now()),
            expiration: config.expiration,
            clock,
        }
    }

    pub fn declare(&self, kind: MetricKind, decl: &StaticDeclaration) {
        self.registry.declare(kind, decl, self.clock.now());
    }

    /// Sweep expired series and render the live ones.
    ///
    /// Order is by kind (gauges, counters, summaries), unspecified within a
    /// kind.
    pub fn collect(&self) -> Vec<RenderedEntry> {
        self.registry
            .sweep_and_render(self.clock.now(), self.expiration)
    }

    pub fn registry(&self) -> &ExpiringRegistry {
        &self.registry
    }
}

impl<C: MetricsClock> Sink for PullSink<C> {
    fn set_gauge(&self, key: &[&str], value: f64, tags: &[Tag]) {
        self.registry.set_gauge(key, value, tags, self.clock.now());
    }

    fn incr_counter(&self, key: &[&str], value: f64, tags: &[Tag]) {
        self.registry.incr_counter(key, value, tags, self.clock.now());
    }

    fn add_sample(&self, key: &[&str], value: f64, tags: &[Tag]) {
        self.registry.add_sample(key, value, tags, self.clock.now());
    }
}
