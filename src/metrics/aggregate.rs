//! Rolling aggregate statistic with O(1) ingestion

use super::clock::MetricsTimestamp;
use serde::{Deserialize, Serialize};

/// Rolled-up view of a stream of values.
///
/// Min, max and mean are undefined until the first value is ingested.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateSample {
    /// Number of ingested values
    pub count: u64,
    /// Sum per rate unit (usually per second)
    pub rate: f64,
    /// Sum of values
    pub sum: f64,
    /// Sum of squared values
    #[serde(skip)]
    pub sum_squares: f64,
    min: f64,
    max: f64,
    /// When a value was last ingested
    #[serde(skip)]
    pub last_updated: MetricsTimestamp,
}

impl AggregateSample {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest one value.
    ///
    /// `rate_denominator` is the aggregation window expressed in the
    /// reporting unit; a non-positive denominator leaves the rate at `sum`.
    pub fn ingest(&mut self, value: f64, rate_denominator: f64, now: MetricsTimestamp) {
        self.count = self.count.saturating_add(1);
        self.sum += value;
        self.sum_squares += value * value;
        if self.count == 1 || value < self.min {
            self.min = value;
        }
        if self.count == 1 || value > self.max {
            self.max = value;
        }
        self.rate = if rate_denominator > 0.0 {
            self.sum / rate_denominator
        } else {
            self.sum
        };
        self.last_updated = now;
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn min(&self) -> Option<f64> {
        (self.count > 0).then_some(self.min)
    }

    pub fn max(&self) -> Option<f64> {
        (self.count > 0).then_some(self.max)
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }

    /// Sample standard deviation; 0 with fewer than two values
    pub fn stddev(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        let n = self.count as f64;
        let num = n * self.sum_squares - self.sum * self.sum;
        let div = n * (n - 1.0);
        // Cancellation can push num slightly below zero for constant inputs
        (num.max(0.0) / div).sqrt()
    }
}

impl std::fmt::Display for AggregateSample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            return write!(f, "Count: 0");
        }
        let stddev = self.stddev();
        if stddev == 0.0 {
            return write!(
                f,
                "Count: {} Sum: {:.3} LastUpdated: {}",
                self.count, self.sum, self.last_updated.0
            );
        }
        write!(
            f,
            "Count: {} Min: {:.3} Mean: {:.3} Max: {:.3} Stddev: {:.3} Sum: {:.3} LastUpdated: {}",
            self.count,
            self.min,
            self.sum / self.count as f64,
            self.max,
            stddev,
            self.sum,
            self.last_updated.0
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ingest_all(values: &[f64]) -> AggregateSample {
        let mut sample = AggregateSample::new();
        for (i, v) in values.iter().enumerate() {
            sample.ingest(*v, 1.0, MetricsTimestamp(i as u64));
        }
        sample
    }

    #[test]
    fn test_ingest_one_two_three() {
        let sample = ingest_all(&[1.0, 2.0, 3.0]);

        assert_eq!(sample.count, 3);
        assert_eq!(sample.sum, 6.0);
        assert_eq!(sample.min(), Some(1.0));
        assert_eq!(sample.max(), Some(3.0));
        assert_eq!(sample.mean(), Some(2.0));
        assert!((sample.stddev() - 1.0).abs() < 1e-12);
        assert_eq!(sample.last_updated, MetricsTimestamp(2));
    }

    #[test]
    fn test_empty_sample_is_undefined() {
        let sample = AggregateSample::new();
        assert!(sample.is_empty());
        assert_eq!(sample.min(), None);
        assert_eq!(sample.max(), None);
        assert_eq!(sample.mean(), None);
        assert_eq!(sample.stddev(), 0.0);
        assert_eq!(sample.to_string(), "Count: 0");
    }

    #[test]
    fn test_single_value_stddev_zero() {
        let sample = ingest_all(&[42.0]);
        assert_eq!(sample.stddev(), 0.0);
        assert_eq!(sample.min(), Some(42.0));
        assert_eq!(sample.max(), Some(42.0));
    }

    #[test]
    fn test_negative_values_track_min() {
        let sample = ingest_all(&[5.0, -3.0, 0.0]);
        assert_eq!(sample.min(), Some(-3.0));
        assert_eq!(sample.max(), Some(5.0));
    }

    #[test]
    fn test_rate_uses_denominator() {
        let mut sample = AggregateSample::new();
        sample.ingest(10.0, 10.0, MetricsTimestamp::ZERO);
        sample.ingest(30.0, 10.0, MetricsTimestamp::ZERO);
        assert_eq!(sample.rate, 4.0);
    }

    #[test]
    fn test_constant_values_no_nan() {
        let sample = ingest_all(&[0.1, 0.1, 0.1, 0.1]);
        assert!(!sample.stddev().is_nan());
    }

    #[test]
    fn test_display_formats() {
        let sample = ingest_all(&[1.0, 2.0, 3.0]);
        let text = sample.to_string();
        assert!(text.starts_with("Count: 3 Min: 1.000 Mean: 2.000 Max: 3.000 Stddev: 1.000"));

        let flat = ingest_all(&[2.0, 2.0]);
        assert!(flat.to_string().starts_with("Count: 2 Sum: 4.000"));
    }
}
