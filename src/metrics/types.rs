//! Core metric types shared by every sink

use serde::{Deserialize, Serialize};
use tracing::warn;

/// A dimension attached to a metric series
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

impl Tag {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Tag {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Build tags from `(name, value)` pairs, preserving order
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Vec<Tag> {
        pairs.iter().map(|(n, v)| Tag::new(*n, *v)).collect()
    }
}

/// Kind of quantity a metric records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Last-value metric
    Gauge,
    /// Monotonically accumulating metric
    Counter,
    /// Distribution summarized as count/sum/min/max/rate
    Summary,
}

impl MetricKind {
    pub const ALL: [MetricKind; 3] = [MetricKind::Gauge, MetricKind::Counter, MetricKind::Summary];

    /// Statsd line-protocol type code
    pub fn type_code(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "g",
            MetricKind::Counter => "c",
            MetricKind::Summary => "ms",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
            MetricKind::Summary => "summary",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pre-registered, never-expiring metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticDeclaration {
    /// Metric name; sanitized the same way as emitted name parts
    pub name: String,
    /// Help text reported by pull backends
    pub help: String,
    /// Tags every series of this declaration carries
    #[serde(default)]
    pub const_tags: Vec<Tag>,
}

impl StaticDeclaration {
    pub fn new(name: impl Into<String>, help: impl Into<String>) -> Self {
        StaticDeclaration {
            name: name.into(),
            help: help.into(),
            const_tags: Vec::new(),
        }
    }

    pub fn with_const_tags(mut self, tags: Vec<Tag>) -> Self {
        self.const_tags = tags;
        self
    }
}

/// Describes a metric with positional required tags.
///
/// Lets call sites emit `desc.tags(&["GET", "200"])` instead of repeating tag
/// names, and feeds the same name/help into a [`StaticDeclaration`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDescription {
    pub kind: MetricKind,
    pub name: String,
    pub help: String,
    #[serde(default)]
    pub required_tags: Vec<String>,
}

impl MetricDescription {
    pub fn new(kind: MetricKind, name: impl Into<String>, help: impl Into<String>) -> Self {
        MetricDescription {
            kind,
            name: name.into(),
            help: help.into(),
            required_tags: Vec::new(),
        }
    }

    pub fn with_required_tags(mut self, names: &[&str]) -> Self {
        self.required_tags = names.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Pair `values` with the required tag names.
    ///
    /// A count mismatch is logged and yields no tags; emission must not fail.
    pub fn tags(&self, values: &[&str]) -> Vec<Tag> {
        if values.len() != self.required_tags.len() {
            warn!(
                metric = %self.name,
                required = self.required_tags.len(),
                provided = values.len(),
                "invalid tag count for described metric"
            );
            return Vec::new();
        }
        self.required_tags
            .iter()
            .zip(values)
            .map(|(name, value)| Tag::new(name.as_str(), *value))
            .collect()
    }

    pub fn declaration(&self) -> StaticDeclaration {
        StaticDeclaration::new(self.name.as_str(), self.help.as_str())
    }
}
