//! Build a sink from a URL
//!
//! - `statsd://host:port`: statsd lines over UDP (port defaults to 8125)
//! - `dogstatsd://host:port`: same transport, tags as `|#k:v`
//! - `inmem://?interval=10s&retain=1m`: interval aggregator; both params
//!   are required

use super::{Sink, StatsdSink};
use crate::metrics::{
    IntervalAggregator, IntervalConfig, LineFormat, MetricsError, TransportConfig,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use url::Url;

const DEFAULT_STATSD_PORT: u16 = 8125;

/// Create a sink from a URL whose scheme names the backend.
///
/// Network sinks spawn their transport on the current tokio runtime and
/// fail with a configuration error outside one.
pub fn sink_from_url(raw: &str) -> Result<Arc<dyn Sink>, MetricsError> {
    let url = Url::parse(raw)?;
    match url.scheme() {
        "statsd" => statsd_from_url(&url, LineFormat::Statsd),
        "dogstatsd" => statsd_from_url(&url, LineFormat::DogStatsd),
        "inmem" => inmem_from_url(&url),
        other => Err(MetricsError::UnknownScheme(other.to_string())),
    }
}

fn statsd_from_url(url: &Url, format: LineFormat) -> Result<Arc<dyn Sink>, MetricsError> {
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| MetricsError::InvalidUrl(format!("missing host in {}", url)))?;
    let port = url.port().unwrap_or(DEFAULT_STATSD_PORT);

    if tokio::runtime::Handle::try_current().is_err() {
        return Err(MetricsError::Config(
            "statsd sink requires a tokio runtime".to_string(),
        ));
    }

    let config = TransportConfig {
        addr: format!("{}:{}", host, port),
        format,
        ..TransportConfig::default()
    };
    let (sink, _task) = StatsdSink::spawn(&config)?;
    info!(addr = %config.addr, ?format, "statsd sink started");
    Ok(Arc::new(sink))
}

fn inmem_from_url(url: &Url) -> Result<Arc<dyn Sink>, MetricsError> {
    let interval = duration_param(url, "interval")?;
    let retain = duration_param(url, "retain")?;
    let sink = IntervalAggregator::new(IntervalConfig::new(interval, retain))?;
    Ok(Arc::new(sink))
}

fn duration_param(url: &Url, name: &str) -> Result<Duration, MetricsError> {
    let value = url
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
        .ok_or_else(|| MetricsError::Config(format!("bad '{}' param: missing", name)))?;
    humantime::parse_duration(&value)
        .map_err(|e| MetricsError::Config(format!("bad '{}' param: {}", name, e)))
}
