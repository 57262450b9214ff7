//! Configuration for registries, aggregators, transport and push sinks
//!
//! Every section has a `Default` (or is optional when no sensible default
//! exists), a `test()` preset with short timings, and a `validate()` that
//! sinks call at construction so bad settings fail fast.

use super::error::MetricsError;
use super::types::StaticDeclaration;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration, loadable from TOML
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub registry: RegistryConfig,
    /// In-memory interval aggregation; absent unless configured explicitly
    pub interval: Option<IntervalConfig>,
    pub transport: TransportConfig,
    pub push: PushConfig,
}

impl MetricsConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, MetricsError> {
        let config: MetricsConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, MetricsError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), MetricsError> {
        self.registry.validate()?;
        if let Some(interval) = &self.interval {
            interval.validate()?;
        }
        self.transport.validate()?;
        Ok(())
    }
}

/// Expiring registry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// How long a dynamic series survives without writes (0 = never expire)
    #[serde(with = "duration_millis")]
    pub expiration: Duration,
    /// Window summary rates are reported over (default: 1s, i.e. per second)
    #[serde(with = "duration_millis")]
    pub rate_window: Duration,
    pub gauges: Vec<StaticDeclaration>,
    pub counters: Vec<StaticDeclaration>,
    pub summaries: Vec<StaticDeclaration>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            expiration: Duration::from_secs(60),
            rate_window: Duration::from_secs(1),
            gauges: Vec::new(),
            counters: Vec::new(),
            summaries: Vec::new(),
        }
    }
}

impl RegistryConfig {
    /// Registry whose dynamic entries never expire
    pub fn never_expire() -> Self {
        RegistryConfig {
            expiration: Duration::ZERO,
            ..Default::default()
        }
    }

    pub fn with_expiration(mut self, expiration: Duration) -> Self {
        self.expiration = expiration;
        self
    }

    pub fn validate(&self) -> Result<(), MetricsError> {
        if self.rate_window.is_zero() {
            return Err(MetricsError::Config(
                "registry rate_window must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Rate window in seconds
    pub fn rate_denominator(&self) -> f64 {
        self.rate_window.as_secs_f64()
    }
}

/// Interval aggregator settings. Both fields are required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalConfig {
    /// Width of each bucket
    #[serde(with = "duration_millis")]
    pub width: Duration,
    /// Total history kept; `retain / width` buckets
    #[serde(with = "duration_millis")]
    pub retain: Duration,
}

impl IntervalConfig {
    pub fn new(width: Duration, retain: Duration) -> Self {
        IntervalConfig { width, retain }
    }

    pub fn test() -> Self {
        IntervalConfig {
            width: Duration::from_secs(1),
            retain: Duration::from_secs(10),
        }
    }

    pub fn validate(&self) -> Result<(), MetricsError> {
        if self.width.as_millis() == 0 {
            return Err(MetricsError::Config(
                "interval width must be at least 1ms".to_string(),
            ));
        }
        if self.max_intervals() < 1 {
            return Err(MetricsError::Config(format!(
                "retain ({:?}) must be at least one interval width ({:?})",
                self.retain, self.width
            )));
        }
        Ok(())
    }

    /// Number of buckets kept in the ring
    pub fn max_intervals(&self) -> usize {
        let width = self.width.as_millis();
        if width == 0 {
            return 0;
        }
        (self.retain.as_millis() / width) as usize
    }
}

/// Line format carried by the batch transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineFormat {
    /// Tag values folded into the dotted name
    #[default]
    Statsd,
    /// Tags sent as `|#name:value` suffixes
    DogStatsd,
}

/// Batch transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Destination address (default: 127.0.0.1:8125)
    pub addr: String,
    /// Maximum bytes per packet (default: 1400)
    pub max_packet_size: usize,
    /// Flush a non-empty frame at least this often (default: 100ms)
    #[serde(with = "duration_millis")]
    pub flush_interval: Duration,
    /// Bounded emission queue capacity (default: 4096)
    pub queue_capacity: usize,
    /// Wait after a connect or write failure (default: 5s)
    #[serde(with = "duration_millis")]
    pub reconnect_backoff: Duration,
    pub format: LineFormat,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            addr: "127.0.0.1:8125".to_string(),
            max_packet_size: 1400,
            flush_interval: Duration::from_millis(100),
            queue_capacity: 4096,
            reconnect_backoff: Duration::from_secs(5),
            format: LineFormat::Statsd,
        }
    }
}

impl TransportConfig {
    /// Load the destination from `STATSD_ADDR`, keeping defaults otherwise
    pub fn from_env() -> Self {
        let mut config = TransportConfig::default();
        if let Ok(addr) = std::env::var("STATSD_ADDR") {
            if !addr.trim().is_empty() {
                config.addr = addr.trim().to_string();
            }
        }
        config
    }

    /// Short timings for tests
    pub fn test() -> Self {
        TransportConfig {
            addr: "127.0.0.1:0".to_string(),
            max_packet_size: 64,
            flush_interval: Duration::from_millis(10),
            queue_capacity: 64,
            reconnect_backoff: Duration::from_millis(20),
            format: LineFormat::Statsd,
        }
    }

    pub fn validate(&self) -> Result<(), MetricsError> {
        if self.max_packet_size == 0 {
            return Err(MetricsError::Config(
                "transport max_packet_size must be greater than zero".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(MetricsError::Config(
                "transport queue_capacity must be greater than zero".to_string(),
            ));
        }
        if self.flush_interval.is_zero() {
            return Err(MetricsError::Config(
                "transport flush_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Push sink settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    /// Namespace metrics are published under (required)
    pub namespace: String,
    /// How often to publish (default: 30s)
    #[serde(with = "duration_millis")]
    pub publish_interval: Duration,
    /// Expiry for dynamic series (default: 60 minutes)
    #[serde(with = "duration_millis")]
    pub expiration: Duration,
    /// Datums per publish request (default: 20)
    pub batch_size: usize,
    /// Dimensions kept per datum (default: 10)
    pub max_dimensions: usize,
    /// Emit `_count`, `_sum` and `_avg` companions for summaries
    pub with_sample_count: bool,
    /// Remove dynamic series once they have been published
    pub with_cleanup: bool,
}

impl Default for PushConfig {
    fn default() -> Self {
        PushConfig {
            namespace: String::new(),
            publish_interval: Duration::from_secs(30),
            expiration: Duration::from_secs(60 * 60),
            batch_size: 20,
            max_dimensions: 10,
            with_sample_count: false,
            with_cleanup: false,
        }
    }
}

impl PushConfig {
    pub fn new(namespace: impl Into<String>) -> Self {
        PushConfig {
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), MetricsError> {
        if self.namespace.is_empty() {
            return Err(MetricsError::Config("push namespace required".to_string()));
        }
        if self.publish_interval.is_zero() {
            return Err(MetricsError::Config(
                "push publish_interval must be greater than zero".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(MetricsError::Config(
                "push batch_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Serde helper for Duration as milliseconds
pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
