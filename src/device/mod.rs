//! Signing authorities
//!
//! Every authority, whether a hardware device behind a transport or a key
//! held in software, implements the same [`SigningDevice`] contract. Signing
//! is synchronous and may block for as long as a person takes to press a
//! button, so each call carries a [`SignContext`] with a deadline and a
//! cancellation token. The async layer runs calls on blocking threads.

pub mod hardware;
pub mod registry;
pub mod simulated;
pub mod software;
pub mod transport;

pub use hardware::HardwareDevice;
pub use registry::DeviceRegistry;
pub use software::SoftwareSigner;
pub use transport::{DeviceTransport, SignPoll, TransportError};

use crate::error::ErrorCategory;
use crate::signing::PartialSignature;
use crate::tx::SigningDigest;
use secp256k1::PublicKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

// =============================================================================
// Authority Identity
// =============================================================================

/// The three signing authorities of a wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthorityId {
    HardwareA,
    HardwareB,
    SoftwareKey,
}

impl AuthorityId {
    pub const ALL: [AuthorityId; 3] = [
        AuthorityId::HardwareA,
        AuthorityId::HardwareB,
        AuthorityId::SoftwareKey,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthorityId::HardwareA => "hardware-a",
            AuthorityId::HardwareB => "hardware-b",
            AuthorityId::SoftwareKey => "software-key",
        }
    }

    pub fn is_hardware(&self) -> bool {
        !matches!(self, AuthorityId::SoftwareKey)
    }
}

impl fmt::Display for AuthorityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthorityId {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AuthorityId::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DeviceError::UnknownAuthority(s.to_string()))
    }
}

/// Public key bound to each authority in a wallet
pub type AuthorityKeys = BTreeMap<AuthorityId, PublicKey>;

// =============================================================================
// Errors
// =============================================================================

/// What the caller should do after a device failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Try the same call again
    Retry,
    /// Ask the user to reconnect the device, then retry
    Reconnect,
    /// Stop; the user or the device refused
    Abort,
}

/// Errors reported by signing authorities
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Device {0} is not connected")]
    NotPresent(AuthorityId),
    #[error("User rejected signing on {0}")]
    UserRejected(AuthorityId),
    #[error("Device {authority} did not respond within {after:?}")]
    Timeout { authority: AuthorityId, after: Duration },
    #[error("Signing failed on {authority}: {reason}")]
    SigningFailed { authority: AuthorityId, reason: String },
    #[error("Device {authority} reports key {actual}, wallet expects {expected}")]
    KeyMismatch {
        authority: AuthorityId,
        expected: String,
        actual: String,
    },
    #[error("Signing on {0} was cancelled")]
    Cancelled(AuthorityId),
    #[error("No device registered for {0}")]
    NotRegistered(AuthorityId),
    #[error("Unknown authority: {0}")]
    UnknownAuthority(String),
}

impl DeviceError {
    /// Only timeouts are retried without user involvement
    pub fn is_retryable(&self) -> bool {
        matches!(self, DeviceError::Timeout { .. })
    }

    pub fn recovery(&self) -> Recovery {
        match self {
            DeviceError::Timeout { .. } => Recovery::Retry,
            DeviceError::NotPresent(_) | DeviceError::NotRegistered(_) => Recovery::Reconnect,
            _ => Recovery::Abort,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            DeviceError::KeyMismatch { .. } => ErrorCategory::Integrity,
            DeviceError::UnknownAuthority(_) => ErrorCategory::Validation,
            _ => ErrorCategory::Device,
        }
    }
}

// =============================================================================
// Requests
// =============================================================================

/// What an authority is asked to sign
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignRequest {
    /// Template the digest belongs to, shown to the user for confirmation
    pub template_id: String,
    pub input_index: usize,
    pub digest: SigningDigest,
}

/// Cancellation and deadline for one signing call
#[derive(Debug, Clone)]
pub struct SignContext {
    token: CancellationToken,
    deadline: Instant,
    timeout: Duration,
}

impl SignContext {
    pub fn new(token: CancellationToken, timeout: Duration) -> Self {
        Self {
            token,
            deadline: Instant::now() + timeout,
            timeout,
        }
    }

    /// Context with a fresh token that nobody else can cancel
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new(CancellationToken::new(), timeout)
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Fail fast when the call is already cancelled or past its deadline
    pub fn check(&self, authority: AuthorityId) -> Result<(), DeviceError> {
        if self.is_cancelled() {
            return Err(DeviceError::Cancelled(authority));
        }
        if self.is_expired() {
            return Err(DeviceError::Timeout {
                authority,
                after: self.timeout,
            });
        }
        Ok(())
    }
}

// =============================================================================
// Device Contract
// =============================================================================

/// Capability set shared by all signing authorities
pub trait SigningDevice: Send + Sync {
    fn authority(&self) -> AuthorityId;

    /// Public key this authority signs with; stable across calls
    fn identify(&self) -> Result<PublicKey, DeviceError>;

    /// Sign one input's digest
    ///
    /// The returned signature is not trusted: callers verify it before use.
    fn sign(&self, request: &SignRequest, ctx: &SignContext) -> Result<PartialSignature, DeviceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        let timeout = DeviceError::Timeout {
            authority: AuthorityId::HardwareA,
            after: Duration::from_secs(1),
        };
        assert!(timeout.is_retryable());
        assert_eq!(timeout.recovery(), Recovery::Retry);

        let missing = DeviceError::NotPresent(AuthorityId::HardwareB);
        assert!(!missing.is_retryable());
        assert_eq!(missing.recovery(), Recovery::Reconnect);

        let rejected = DeviceError::UserRejected(AuthorityId::HardwareA);
        assert!(!rejected.is_retryable());
        assert_eq!(rejected.recovery(), Recovery::Abort);
    }

    #[test]
    fn test_authority_parse() {
        assert_eq!("hardware-a".parse::<AuthorityId>().unwrap(), AuthorityId::HardwareA);
        assert_eq!("Software-Key".parse::<AuthorityId>().unwrap(), AuthorityId::SoftwareKey);
        assert!("ledger".parse::<AuthorityId>().is_err());
        assert_eq!(
            serde_json::to_string(&AuthorityId::HardwareB).unwrap(),
            "\"hardware-b\""
        );
    }

    #[test]
    fn test_context_cancel_and_expire() {
        let ctx = SignContext::with_timeout(Duration::from_secs(60));
        assert!(ctx.check(AuthorityId::HardwareA).is_ok());

        ctx.token().cancel();
        assert_eq!(
            ctx.check(AuthorityId::HardwareA),
            Err(DeviceError::Cancelled(AuthorityId::HardwareA))
        );

        let expired = SignContext::with_timeout(Duration::ZERO);
        assert!(matches!(
            expired.check(AuthorityId::SoftwareKey),
            Err(DeviceError::Timeout { .. })
        ));
    }
}
