//! Error type for sink construction and configuration
//!
//! Emission calls never return errors; everything here surfaces at
//! construction time or from background workers.

use std::io::Error as IoError;

#[derive(Debug)]
pub enum MetricsError {
    /// Missing or invalid setting
    Config(String),
    /// Sink URL could not be parsed
    InvalidUrl(String),
    /// Sink URL scheme has no registered factory
    UnknownScheme(String),
    /// The process-wide sink was already replaced
    GlobalAlreadySet,
    /// I/O error (config files, sockets)
    Io(IoError),
    /// TOML configuration could not be decoded
    Toml(toml::de::Error),
}

impl std::fmt::Display for MetricsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricsError::Config(msg) => write!(f, "invalid metrics configuration: {}", msg),
            MetricsError::InvalidUrl(msg) => write!(f, "invalid sink URL: {}", msg),
            MetricsError::UnknownScheme(scheme) => {
                write!(f, "unrecognized sink name: {:?}", scheme)
            }
            MetricsError::GlobalAlreadySet => write!(f, "global metrics sink already set"),
            MetricsError::Io(e) => write!(f, "metrics I/O error: {}", e),
            MetricsError::Toml(e) => write!(f, "metrics config parse error: {}", e),
        }
    }
}

impl std::error::Error for MetricsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MetricsError::Io(e) => Some(e),
            MetricsError::Toml(e) => Some(e),
            _ => None,
        }
    }
}

impl From<IoError> for MetricsError {
    fn from(e: IoError) -> Self {
        MetricsError::Io(e)
    }
}

impl From<toml::de::Error> for MetricsError {
    fn from(e: toml::de::Error) -> Self {
        MetricsError::Toml(e)
    }
}

impl From<url::ParseError> for MetricsError {
    fn from(e: url::ParseError) -> Self {
        MetricsError::InvalidUrl(e.to_string())
    }
}
