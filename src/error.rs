//! Error taxonomy shared by every module
//!
//! Each module has its own `thiserror` enum; all of them map onto one of
//! these categories so callers can pick a retry policy without matching on
//! every variant.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad class of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Bad input (key encoding, fee rate, address); nothing was created
    Validation,
    /// Not enough funds or signatures; no retry implied
    Resource,
    /// A signing authority failed; see `DeviceError::recovery`
    Device,
    /// Provider unreachable; safe to retry with backoff
    Network,
    /// Invalid signature, conflicting signature, digest mismatch, log rewrite
    Integrity,
}

impl ErrorCategory {
    /// Whether the caller may retry the same operation unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCategory::Network)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::Resource => "resource",
            ErrorCategory::Device => "device",
            ErrorCategory::Network => "network",
            ErrorCategory::Integrity => "integrity",
        };
        f.write_str(name)
    }
}
