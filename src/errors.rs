//! Failure taxonomy shared across the scanning pipeline.
//!
//! Every fallible boundary in the pipeline returns one of these tags so
//! callers can route on it (retry, skip provider, abort scan, ...) instead
//! of pattern-matching on string messages.

use std::fmt;

/// Tagged error variant threaded through the scan pipeline.
#[derive(Debug, Clone)]
pub enum ScanError {
    /// Network, timeout, 5xx, rate-limited. Safe to retry or try another provider.
    Transient(String),
    /// 4xx (other than 429), bad schema, not-supported symbol. Not retried.
    Permanent(String),
    /// Breaker open or rate token unavailable before cancellation.
    Guarded(String),
    /// NaN where forbidden, negative volume, invalid book ordering.
    DataIntegrity(String),
    /// Invalid weights, empty universe. Fatal, aborts the scan.
    Configuration(String),
    /// Scan was cancelled via the `ScanHandle`.
    Cancelled,
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient(msg) => write!(f, "transient error: {msg}"),
            Self::Permanent(msg) => write!(f, "permanent error: {msg}"),
            Self::Guarded(msg) => write!(f, "guarded: {msg}"),
            Self::DataIntegrity(msg) => write!(f, "data integrity error: {msg}"),
            Self::Configuration(msg) => write!(f, "configuration error: {msg}"),
            Self::Cancelled => write!(f, "scan cancelled"),
        }
    }
}

impl std::error::Error for ScanError {}

impl ScanError {
    /// Whether this error class justifies trying the next provider in priority order.
    pub fn is_routable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::Guarded(_))
    }
}

pub type ScanResult<T> = Result<T, ScanError>;
