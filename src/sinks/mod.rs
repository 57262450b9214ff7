//! Backend adapters behind the common [`Sink`] interface
//!
//! - `BlackholeSink`: discards everything (global default)
//! - `FanoutSink`: forwards to several sinks
//! - `InmemSink`: interval-bucketed aggregation (see `metrics::interval`)
//! - `PullSink`: expiring registry rendered on scrape
//! - `PushSink`: expiring registry published on a timer
//! - `StatsdSink`: statsd/dogstatsd lines over the batch transport

mod factory;
mod pull;
mod push;
mod statsd;

pub use factory::sink_from_url;
pub use pull::PullSink;
pub use push::{Datum, DatumValue, PublishError, Publisher, PushSink};
pub use statsd::{format_line, StatsdSink};

use crate::metrics::Tag;
use std::sync::Arc;
use std::time::Instant;

/// Write-side interface shared by every backend.
///
/// Calls never block on I/O and never fail; backends that cannot accept a
/// value drop it.
pub trait Sink: Send + Sync {
    /// Replace the current value of a gauge
    fn set_gauge(&self, key: &[&str], value: f64, tags: &[Tag]);

    /// Add `value` to a counter
    fn incr_counter(&self, key: &[&str], value: f64, tags: &[Tag]);

    /// Record one observation of a sample/timer
    fn add_sample(&self, key: &[&str], value: f64, tags: &[Tag]);

    /// Record the elapsed time since `start` in milliseconds
    fn measure_since(&self, key: &[&str], start: Instant, tags: &[Tag]) {
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        self.add_sample(key, elapsed_ms, tags);
    }
}

impl<S: Sink + ?Sized> Sink for Arc<S> {
    fn set_gauge(&self, key: &[&str], value: f64, tags: &[Tag]) {
        (**self).set_gauge(key, value, tags)
    }

    fn incr_counter(&self, key: &[&str], value: f64, tags: &[Tag]) {
        (**self).incr_counter(key, value, tags)
    }

    fn add_sample(&self, key: &[&str], value: f64, tags: &[Tag]) {
        (**self).add_sample(key, value, tags)
    }

    fn measure_since(&self, key: &[&str], start: Instant, tags: &[Tag]) {
        (**self).measure_since(key, start, tags)
    }
}

/// Sink that discards every value
#[derive(Debug, Clone, Copy, Default)]
pub struct BlackholeSink;

impl Sink for BlackholeSink {
    fn set_gauge(&self, _key: &[&str], _value: f64, _tags: &[Tag]) {}
    fn incr_counter(&self, _key: &[&str], _value: f64, _tags: &[Tag]) {}
    fn add_sample(&self, _key: &[&str], _value: f64, _tags: &[Tag]) {}
}

/// Sink forwarding every call to each inner sink in order
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn Sink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn Sink>>) -> Self {
        FanoutSink { sinks }
    }

    pub fn push(&mut self, sink: Arc<dyn Sink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl Sink for FanoutSink {
    fn set_gauge(&self, key: &[&str], value: f64, tags: &[Tag]) {
        for sink in &self.sinks {
            sink.set_gauge(key, value, tags);
        }
    }

    fn incr_counter(&self, key: &[&str], value: f64, tags: &[Tag]) {
        for sink in &self.sinks {
            sink.incr_counter(key, value, tags);
        }
    }

    fn add_sample(&self, key: &[&str], value: f64, tags: &[Tag]) {
        for sink in &self.sinks {
            sink.add_sample(key, value, tags);
        }
    }

    fn measure_since(&self, key: &[&str], start: Instant, tags: &[Tag]) {
        // One elapsed reading so every backend sees the same duration
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        self.add_sample(key, elapsed_ms, tags);
    }
}
