//! Time source for expiry and interval bucketing.
//!
//! Registries and aggregators never read the system clock directly. They take
//! a [`MetricsClock`] so expiry deadlines and bucket boundaries can be pinned
//! in tests with [`SimulatedClock`].

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Wall-clock milliseconds since the Unix epoch
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct MetricsTimestamp(pub u64);

impl MetricsTimestamp {
    pub const ZERO: MetricsTimestamp = MetricsTimestamp(0);

    pub fn from_millis(ms: u64) -> Self {
        MetricsTimestamp(ms)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Start of the `width`-aligned window containing this instant.
    /// Zero width is the identity.
    pub fn truncate(&self, width: Duration) -> MetricsTimestamp {
        match width.as_millis() as u64 {
            0 => *self,
            w => MetricsTimestamp(self.0 / w * w),
        }
    }
}

/// Deadline arithmetic; saturates instead of wrapping.
impl std::ops::Add<Duration> for MetricsTimestamp {
    type Output = MetricsTimestamp;

    fn add(self, rhs: Duration) -> Self::Output {
        MetricsTimestamp(self.0.saturating_add(rhs.as_millis() as u64))
    }
}

pub trait MetricsClock: Send + Sync + Clone + 'static {
    fn now(&self) -> MetricsTimestamp;
}

/// Epoch time sampled once, then advanced by `Instant`.
///
/// Readings never go backwards when the host clock is stepped.
#[derive(Clone)]
pub struct ProductionClock {
    anchor: Instant,
    anchor_ms: u64,
}

impl Default for ProductionClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ProductionClock {
    pub fn new() -> Self {
        // Pre-1970 host clocks count from zero
        let anchor_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_millis() as u64);
        ProductionClock {
            anchor: Instant::now(),
            anchor_ms,
        }
    }
}

impl MetricsClock for ProductionClock {
    fn now(&self) -> MetricsTimestamp {
        MetricsTimestamp(self.anchor_ms) + self.anchor.elapsed()
    }
}

/// Manually driven clock. Clones observe the same time.
#[derive(Clone)]
pub struct SimulatedClock {
    ms: Arc<AtomicU64>,
}

impl SimulatedClock {
    pub fn new(start_ms: u64) -> Self {
        SimulatedClock {
            ms: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.advance_ms(by.as_millis() as u64);
    }

    pub fn advance_ms(&self, ms: u64) {
        self.ms.fetch_add(ms, Ordering::SeqCst);
    }

    /// Jump to an absolute time, backwards included
    pub fn set(&self, ms: u64) {
        self.ms.store(ms, Ordering::SeqCst);
    }
}

impl MetricsClock for SimulatedClock {
    fn now(&self) -> MetricsTimestamp {
        MetricsTimestamp(self.ms.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_clock_near_system_time() {
        let clock = ProductionClock::new();
        let system = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64;

        let now = clock.now().as_millis();
        assert!(now.abs_diff(system) < 1_000);

        std::thread::sleep(Duration::from_millis(10));
        assert!(clock.now().as_millis() >= now + 10);
    }

    #[test]
    fn test_simulated_clock_moves_only_when_driven() {
        let clock = SimulatedClock::new(1_000);
        let observer = clock.clone();
        assert_eq!(observer.now(), MetricsTimestamp(1_000));

        clock.advance(Duration::from_secs(2));
        clock.advance_ms(5);
        assert_eq!(observer.now(), MetricsTimestamp(3_005));

        clock.set(10);
        assert_eq!(observer.now(), MetricsTimestamp(10));
    }

    #[test]
    fn test_truncate_aligns_to_window() {
        let ts = MetricsTimestamp::from_millis(1_704_067_215_432);
        assert_eq!(
            ts.truncate(Duration::from_secs(10)).as_millis(),
            1_704_067_210_000
        );
        assert_eq!(ts.truncate(Duration::from_millis(1)), ts);
        assert_eq!(ts.truncate(Duration::ZERO), ts);
    }

    #[test]
    fn test_deadline_add_saturates() {
        assert_eq!(
            MetricsTimestamp(1_000) + Duration::from_millis(500),
            MetricsTimestamp(1_500)
        );
        assert_eq!(
            MetricsTimestamp(u64::MAX - 1) + Duration::from_secs(1),
            MetricsTimestamp(u64::MAX)
        );
    }
}
