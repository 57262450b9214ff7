//! Instrumentation sinks
//!
//! Application code records gauges, counters and timing samples through the
//! [`Sink`] trait; backends expose them for scraping, publish them on a timer,
//! aggregate them in memory or forward them as statsd lines.

pub mod metrics;
pub mod sinks;
pub mod transport;

#[cfg(test)]
mod stateright;

pub use metrics::{
    AggregateSample, ExpiringRegistry, InmemSink, IntervalAggregator, MetricDescription,
    MetricKind, MetricsError, StaticDeclaration, Tag,
};
pub use sinks::{sink_from_url, BlackholeSink, FanoutSink, PullSink, PushSink, Sink, StatsdSink};
