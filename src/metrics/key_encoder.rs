//! Key flattening for metric identities
//!
//! Turns structured metric names (name parts + tags) into the strings every
//! sink keys its state by.
//!
//! Key formats:
//! - display name: `http_server_requests` (parts joined with `_`, sanitized)
//! - identity: `http_server_requests;method=GET;status=200`
//! - statsd name: `http.server.requests.GET.200`

use super::types::Tag;

/// Characters replaced by `_` in display names
const FORBIDDEN_DISPLAY_CHARS: [char; 5] = [' ', '.', '=', '-', '/'];

/// Result of flattening a structured metric key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlatKey {
    /// Sanitized, backend-safe metric name
    pub display_name: String,
    /// Display name plus ordered `;name=value` tag suffixes; one per series
    pub identity: String,
}

/// Encodes metric keys for registry and wire use
pub struct MetricKeyEncoder;

impl MetricKeyEncoder {
    /// Flatten name parts and tags into a display name and series identity.
    ///
    /// Tags are appended in the order supplied; callers that want
    /// order-independent identities must supply tags in a consistent order.
    ///
    /// Tag names and values are not escaped, so a value containing `;` or
    /// `=` can produce the same identity as a different tag list
    /// (`x="1;y=2"` and `x="1", y="2"` both give `m;x=1;y=2`).
    pub fn flatten(parts: &[&str], tags: &[Tag]) -> FlatKey {
        let display_name = Self::sanitize_display(&parts.join("_"));
        let identity = Self::identity_for(&display_name, tags);
        FlatKey {
            display_name,
            identity,
        }
    }

    /// Replace every forbidden character with `_`; length is preserved.
    pub fn sanitize_display(name: &str) -> String {
        name.chars()
            .map(|c| {
                if FORBIDDEN_DISPLAY_CHARS.contains(&c) {
                    '_'
                } else {
                    c
                }
            })
            .collect()
    }

    /// Build the identity for an already-sanitized display name
    pub fn identity_for(display_name: &str, tags: &[Tag]) -> String {
        let extra: usize = tags.iter().map(|t| t.name.len() + t.value.len() + 2).sum();
        let mut identity = String::with_capacity(display_name.len() + extra);
        identity.push_str(display_name);
        for tag in tags {
            identity.push(';');
            identity.push_str(&tag.name);
            identity.push('=');
            identity.push_str(&tag.value);
        }
        identity
    }

    /// Flatten for the tagless statsd line protocol.
    ///
    /// Name parts and tag values are joined with `.`; `:` and spaces become
    /// `_` since they are protocol delimiters.
    pub fn flatten_statsd(parts: &[&str], tags: &[Tag]) -> String {
        let mut joined = parts.join(".");
        for tag in tags {
            joined.push('.');
            joined.push_str(&tag.value);
        }
        Self::sanitize_statsd(&joined)
    }

    /// Replace statsd delimiters (`:`, `|`, `,`, space) with `_`
    pub fn sanitize_statsd(name: &str) -> String {
        name.chars()
            .map(|c| match c {
                ':' | ' ' | '|' | ',' => '_',
                other => other,
            })
            .collect()
    }
}
