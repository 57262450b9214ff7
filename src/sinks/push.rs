//! Push-style sink: series live in an expiring registry and are published
//! to a backend API on a timer.
//!
//! ```text
//!   Sink calls ──► ExpiringRegistry ──► data() ──► batches of N ──► Publisher
//!                                         ▲
//!                       run(): every publish_interval, once more on cancel
//! ```

use super::Sink;
use crate::metrics::{
    ExpiringRegistry, MetricKind, MetricsClock, MetricsError, MetricsTimestamp, ProductionClock,
    PushConfig, RegistryConfig, RenderOptions, RenderedValue, StaticDeclaration, Tag,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Value carried by a published datum
#[derive(Debug, Clone, PartialEq)]
pub enum DatumValue {
    /// Gauge value or counter total
    Value(f64),
    /// Summary statistics since the series was created
    Statistics {
        min: f64,
        max: f64,
        sum: f64,
        sample_count: f64,
    },
}

/// One series as handed to a [`Publisher`]
#[derive(Debug, Clone, PartialEq)]
pub struct Datum {
    pub name: String,
    pub dimensions: Vec<Tag>,
    /// Time of the last write to the series
    pub timestamp: MetricsTimestamp,
    pub value: DatumValue,
}

/// Failure reported by a [`Publisher`]
#[derive(Debug, Clone, PartialEq)]
pub enum PublishError {
    /// Credentials missing or expired; retrying will not help
    Unauthorized(String),
    /// Anything else; retried on the next tick
    Transient(String),
}

impl PublishError {
    /// True when the publishing loop should stop
    pub fn is_fatal(&self) -> bool {
        matches!(self, PublishError::Unauthorized(_))
    }
}

impl std::fmt::Display for PublishError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PublishError::Unauthorized(msg) => write!(f, "publish unauthorized: {}", msg),
            PublishError::Transient(msg) => write!(f, "publish failed: {}", msg),
        }
    }
}

impl std::error::Error for PublishError {}

/// Backend API that accepts batches of datums
pub trait Publisher: Send + Sync + 'static {
    fn publish<'a>(
        &'a self,
        namespace: &'a str,
        data: &'a [Datum],
    ) -> Pin<Box<dyn Future<Output = Result<(), PublishError>> + Send + 'a>>;
}

pub struct PushSink<P: Publisher, C: MetricsClock = ProductionClock> {
    config: PushConfig,
    registry: ExpiringRegistry,
    publisher: P,
    clock: C,
}

impl<P: Publisher> PushSink<P, ProductionClock> {
    pub fn new(config: PushConfig, publisher: P) -> Result<Self, MetricsError> {
        PushSink::with_clock(config, publisher, ProductionClock::new())
    }
}

impl<P: Publisher, C: MetricsClock> PushSink<P, C> {
    pub fn with_clock(config: PushConfig, publisher: P, clock: C) -> Result<Self, MetricsError> {
        config.validate()?;
        let registry_config = RegistryConfig::default().with_expiration(config.expiration);
        Ok(PushSink {
            registry: ExpiringRegistry::new(&registry_config, clock.now()),
            config,
            publisher,
            clock,
        })
    }

    pub fn declare(&self, kind: MetricKind, decl: &StaticDeclaration) {
        self.registry.declare(kind, decl, self.clock.now());
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Sweep expired series and convert the rest into datums
    pub fn data(&self) -> Vec<Datum> {
        let rendered = self.registry.sweep_and_render_with(
            self.clock.now(),
            RenderOptions {
                expiration: self.config.expiration,
                cleanup: self.config.with_cleanup,
            },
        );

        let mut data = Vec::with_capacity(rendered.len());
        for entry in rendered {
            let dimensions = self.dimensions(&entry.tags);
            match entry.value {
                RenderedValue::Gauge(v) | RenderedValue::Counter(v) => data.push(Datum {
                    name: entry.name,
                    dimensions,
                    timestamp: entry.updated_at,
                    value: DatumValue::Value(v),
                }),
                RenderedValue::Summary(sample) => {
                    // Declared summaries with no observations yet have no statistics
                    let (Some(min), Some(max), Some(mean)) =
                        (sample.min(), sample.max(), sample.mean())
                    else {
                        continue;
                    };
                    let count = sample.count as f64;

                    if self.config.with_sample_count {
                        for (suffix, value) in
                            [("_count", count), ("_sum", sample.sum), ("_avg", mean)]
                        {
                            data.push(Datum {
                                name: format!("{}{}", entry.name, suffix),
                                dimensions: dimensions.clone(),
                                timestamp: entry.updated_at,
                                value: DatumValue::Value(value),
                            });
                        }
                    }
                    data.push(Datum {
                        name: entry.name,
                        dimensions,
                        timestamp: entry.updated_at,
                        value: DatumValue::Statistics {
                            min,
                            max,
                            sum: sample.sum,
                            sample_count: count,
                        },
                    });
                }
            }
        }
        data
    }

    /// Keep at most `max_dimensions` tags, choosing by name order when over
    fn dimensions(&self, tags: &[Tag]) -> Vec<Tag> {
        if tags.len() <= self.config.max_dimensions {
            return tags.to_vec();
        }
        warn!(
            dimensions = tags.len(),
            limit = self.config.max_dimensions,
            "truncating metric dimensions"
        );
        let mut sorted = tags.to_vec();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));
        sorted.truncate(self.config.max_dimensions);
        sorted
    }

    /// Render and publish everything in batches of `batch_size`.
    ///
    /// Stops at the first failing batch. Returns the number of datums
    /// published.
    pub async fn flush(&self) -> Result<usize, PublishError> {
        let data = self.data();
        for batch in data.chunks(self.config.batch_size) {
            self.publisher.publish(&self.config.namespace, batch).await?;
        }
        if !data.is_empty() {
            debug!(count = data.len(), namespace = %self.config.namespace, "published metrics");
        }
        Ok(data.len())
    }

    /// Publish every `publish_interval` until cancelled, then flush once more.
    ///
    /// Returns early if the publisher reports a fatal error.
    pub async fn run(&self, cancel: CancellationToken) {
        let period = self.config.publish_interval;
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("push sink stopping");
                    if let Err(e) = self.flush().await {
                        error!("final metrics flush failed: {}", e);
                    }
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.flush().await {
                        error!("metrics publish failed: {}", e);
                        if e.is_fatal() {
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Run the publishing loop on the current tokio runtime
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }
}

impl<P: Publisher, C: MetricsClock> Sink for PushSink<P, C> {
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

/// Publisher that records every batch in memory
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingPublisher {
    pub batches: parking_lot::Mutex<Vec<(String, Vec<Datum>)>>,
    pub fail_with: parking_lot::Mutex<Option<PublishError>>,
}

#[cfg(test)]
impl Publisher for RecordingPublisher {
    fn publish<'a>(
        &'a self,
        namespace: &'a str,
        data: &'a [Datum],
    ) -> Pin<Box<dyn Future<Output = Result<(), PublishError>> + Send + 'a>> {
        Box::pin(async move {
            if let Some(e) = self.fail_with.lock().clone() {
                return Err(e);
            }
            self.batches
                .lock()
                .push((namespace.to_string(), data.to_vec()));
            Ok(())
        })
    }
}
