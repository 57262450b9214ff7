//! Metric State and Aggregation
//!
//! Shared building blocks for every sink:
//!
//! - **Key flattening**: name parts + tags to display name and series identity
//! - **Aggregate samples**: count/sum/min/max/stddev/rate with O(1) ingest
//! - **Expiring registry**: sharded concurrent series map, swept on render
//! - **Interval aggregation**: bounded ring of time buckets
//! - **Global sink**: process-wide blackhole until replaced once

mod aggregate;
mod clock;
mod config;
mod error;
pub mod global;
mod interval;
mod key_encoder;
mod registry;
mod types;

pub use aggregate::AggregateSample;
pub use clock::{MetricsClock, MetricsTimestamp, ProductionClock, SimulatedClock};
pub use config::{
    IntervalConfig, LineFormat, MetricsConfig, PushConfig, RegistryConfig, TransportConfig,
};
pub use error::MetricsError;
pub use global::{global, set_global};
pub use interval::{BucketSnapshot, GaugeValue, InmemSink, IntervalAggregator, SampledValue};
pub use key_encoder::{FlatKey, MetricKeyEncoder};
pub use registry::{ExpiringRegistry, RenderOptions, RenderedEntry, RenderedValue};
pub use types::{MetricDescription, MetricKind, StaticDeclaration, Tag};
