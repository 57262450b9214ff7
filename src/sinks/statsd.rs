//! Statsd/dogstatsd sink over the batch transport
//!
//! Line formats:
//! - statsd:    `http.requests.GET:1|c`
//! - dogstatsd: `http.requests:1|c|#method:GET`

use super::Sink;
use crate::metrics::{LineFormat, MetricKeyEncoder, MetricKind, MetricsError, Tag, TransportConfig};
use crate::transport::{spawn_transport, TransportHandle, UdpConnector};
use tokio::task::JoinHandle;

/// Render one newline-terminated protocol line
pub fn format_line(
    format: LineFormat,
    kind: MetricKind,
    key: &[&str],
    value: f64,
    tags: &[Tag],
) -> String {
    match format {
        LineFormat::Statsd => format!(
            "{}:{}|{}\n",
            MetricKeyEncoder::flatten_statsd(key, tags),
            value,
            kind.type_code()
        ),
        LineFormat::DogStatsd => {
            let mut line = format!(
                "{}:{}|{}",
                MetricKeyEncoder::flatten_statsd(key, &[]),
                value,
                kind.type_code()
            );
            for (i, tag) in tags.iter().enumerate() {
                line.push_str(if i == 0 { "|#" } else { "," });
                line.push_str(&MetricKeyEncoder::sanitize_statsd(&tag.name));
                line.push(':');
                line.push_str(&MetricKeyEncoder::sanitize_statsd(&tag.value));
            }
            line.push('\n');
            line
        }
    }
}

pub struct StatsdSink {
    handle: TransportHandle,
    format: LineFormat,
}

impl StatsdSink {
    /// Wrap an existing transport
    pub fn new(handle: TransportHandle, format: LineFormat) -> Self {
        StatsdSink { handle, format }
    }

    /// Start a UDP transport to `config.addr` on the current tokio runtime
    pub fn spawn(config: &TransportConfig) -> Result<(Self, JoinHandle<()>), MetricsError> {
        let (handle, task) = spawn_transport(UdpConnector::new(config.addr.clone()), config)?;
        Ok((StatsdSink::new(handle, config.format), task))
    }

    pub fn transport(&self) -> &TransportHandle {
        &self.handle
    }

    /// Stop flushing; queued lines get one final send
    pub fn shutdown(&self) {
        self.handle.shutdown();
    }

    fn push(&self, kind: MetricKind, key: &[&str], value: f64, tags: &[Tag]) {
        self.handle
            .push_metric(format_line(self.format, kind, key, value, tags));
    }
}

impl Sink for StatsdSink {
    fn set_gauge(&self, key: &[&str], value: f64, tags: &[Tag]) {
        self.push(MetricKind::Gauge, key, value, tags);
    }

    fn incr_counter(&self, key: &[&str], value: f64, tags: &[Tag]) {
        self.push(MetricKind::Counter, key, value, tags);
    }

    fn add_sample(&self, key: &[&str], value: f64, tags: &[Tag]) {
        self.push(MetricKind::Summary, key, value, tags);
    }
}
