// src/core/error.rs

use std::time::Duration;

/// Failures that abort a collection run. Everything else is recorded as a
/// soft failure in the report's error map.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollectError {
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    #[error("DNS resolution failed: {0}")]
    Dns(String),

    #[error("DNS resolution timed out after {}ms", .0.as_millis())]
    DnsTimeout(Duration),
}
