//! Low-level link to a hardware authority
//!
//! A transport hides USB, HID or NFC framing. Signing is split into a
//! request and repeated polls so the caller can give up between polls.

use thiserror::Error;

/// Result of polling a pending signature request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignPoll {
    /// Waiting for the user
    Pending,
    /// DER-encoded signature
    Signed(Vec<u8>),
    /// The user declined on the device
    Rejected,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Device disconnected")]
    Disconnected,
    #[error("Transport I/O error: {0}")]
    Io(String),
}

pub trait DeviceTransport: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Compressed public key held by the device
    fn public_key(&self) -> Result<Vec<u8>, TransportError>;

    /// Ask the device to sign `digest`; completes immediately
    fn begin_sign(&self, digest: &[u8; 32]) -> Result<(), TransportError>;

    fn poll_sign(&self) -> Result<SignPoll, TransportError>;

    /// Drop any pending request
    fn abort(&self);
}
