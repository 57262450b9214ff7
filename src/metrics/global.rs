//! Process-wide sink
//!
//! Discards everything until [`set_global`] installs a real sink, which can
//! happen once per process.

use super::error::MetricsError;
use super::types::{MetricDescription, MetricKind, Tag};
use crate::sinks::{BlackholeSink, Sink};
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::info;

static GLOBAL: OnceLock<Arc<dyn Sink>> = OnceLock::new();
static BLACKHOLE: BlackholeSink = BlackholeSink;

/// The installed sink, or a blackhole
pub fn global() -> &'static dyn Sink {
    match GLOBAL.get() {
        Some(sink) => sink.as_ref(),
        None => &BLACKHOLE,
    }
}

/// Install the process-wide sink. Fails if one was already installed.
pub fn set_global(sink: Arc<dyn Sink>) -> Result<(), MetricsError> {
    GLOBAL
        .set(sink)
        .map_err(|_| MetricsError::GlobalAlreadySet)?;
    info!("global metrics sink installed");
    Ok(())
}

pub fn set_gauge(key: &[&str], value: f64, tags: &[Tag]) {
    global().set_gauge(key, value, tags);
}

pub fn incr_counter(key: &[&str], value: f64, tags: &[Tag]) {
    global().incr_counter(key, value, tags);
}

pub fn add_sample(key: &[&str], value: f64, tags: &[Tag]) {
    global().add_sample(key, value, tags);
}

pub fn measure_since(key: &[&str], start: Instant, tags: &[Tag]) {
    global().measure_since(key, start, tags);
}

impl MetricDescription {
    /// Emit `value` to `sink` according to this description's kind, with
    /// `tag_values` paired positionally with the required tags
    pub fn emit(&self, sink: &dyn Sink, value: f64, tag_values: &[&str]) {
        let tags = self.tags(tag_values);
        let key = [self.name.as_str()];
        match self.kind {
            MetricKind::Gauge => sink.set_gauge(&key, value, &tags),
            MetricKind::Counter => sink.incr_counter(&key, value, &tags),
            MetricKind::Summary => sink.add_sample(&key, value, &tags),
        }
    }

    /// [`emit`](MetricDescription::emit) to the global sink
    pub fn emit_global(&self, value: f64, tag_values: &[&str]) {
        self.emit(global(), value, tag_values);
    }

    /// Record milliseconds elapsed since `start` to the global sink
    pub fn measure_since(&self, start: Instant, tag_values: &[&str]) {
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        self.emit_global(elapsed_ms, tag_values);
    }
}
