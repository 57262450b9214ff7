//! Metric sinks demo
//!
//! Emits a few series through the global sink and prints what the pull and
//! in-memory backends captured.
//!
//! Usage:
//!   cargo run --bin metrics-demo -- [config.toml]
//!
//! Set `STATSD_ADDR` to also forward statsd lines over UDP.

use metric_sinks::metrics::{self, IntervalConfig, MetricsConfig, TransportConfig};
use metric_sinks::sinks::{FanoutSink, PullSink, Sink, StatsdSink};
use metric_sinks::{InmemSink, MetricDescription, MetricKind, Tag};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => MetricsConfig::from_file(path)?,
        None => MetricsConfig::default(),
    };

    let pull = Arc::new(PullSink::new(&config.registry));
    let inmem = Arc::new(InmemSink::new(
        config.interval.unwrap_or_else(IntervalConfig::test),
    )?);
    let mut fanout = FanoutSink::new(vec![pull.clone() as Arc<dyn Sink>, inmem.clone()]);

    let statsd = if std::env::var("STATSD_ADDR").is_ok() {
        let transport = TransportConfig::from_env();
        let (sink, task) = StatsdSink::spawn(&transport)?;
        let sink = Arc::new(sink);
        fanout.push(sink.clone());
        info!(addr = %transport.addr, "forwarding to statsd");
        Some((sink, task))
    } else {
        None
    };

    metrics::set_global(Arc::new(fanout))?;

    let requests =
        MetricDescription::new(MetricKind::Counter, "http_requests", "HTTP requests served")
            .with_required_tags(&["method", "status"]);
    pull.declare(MetricKind::Counter, &requests.declaration());

    for i in 0..20u32 {
        let start = Instant::now();
        let status = if i % 5 == 0 { "500" } else { "200" };
        requests.emit_global(1.0, &["GET", status]);
        metrics::global::set_gauge(
            &["queue", "depth"],
            f64::from(i % 7),
            &Tag::from_pairs(&[("queue", "email")]),
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
        metrics::global::measure_since(&["handler", "latency"], start, &[]);
    }

    println!("--- pull sink ---");
    for entry in pull.collect() {
        println!("{} {} {:?} {}", entry.kind, entry.identity, entry.value, entry.help);
    }

    println!("--- inmem sink ---");
    println!("{}", serde_json::to_string_pretty(&inmem.display_metrics())?);

    if let Some((sink, task)) = statsd {
        sink.shutdown();
        task.await?;
        println!("--- statsd transport ---");
        println!("{:?}", sink.transport().stats());
    }

    Ok(())
}
