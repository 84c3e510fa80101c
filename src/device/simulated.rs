//! Scripted transport for tests and demos
//!
//! Behaves like a hardware device whose user responds according to a
//! [`SimBehavior`]. The behavior can be changed between calls.

use super::transport::{DeviceTransport, SignPoll, TransportError};
use crate::crypto::{double_sha256, KeyPair};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// How the simulated device and its user respond
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimBehavior {
    /// Sign immediately
    Approve,
    /// Sign once the delay has elapsed
    ApproveAfter(Duration),
    /// User presses reject
    Reject,
    /// Request stays pending forever
    NeverRespond,
    /// Transport error on every sign request
    Fault(String),
    /// Returns a well-formed signature over a different digest
    ForgeSignature,
    /// Device unplugged
    Disconnected,
}

#[derive(Debug)]
struct Pending {
    digest: [u8; 32],
    started: Instant,
}

#[derive(Debug)]
pub struct SimulatedTransport {
    key: KeyPair,
    behavior: Mutex<SimBehavior>,
    pending: Mutex<Option<Pending>>,
    requests: Mutex<usize>,
}

impl SimulatedTransport {
    pub fn new(key: KeyPair, behavior: SimBehavior) -> Self {
        Self {
            key,
            behavior: Mutex::new(behavior),
            pending: Mutex::new(None),
            requests: Mutex::new(0),
        }
    }

    pub fn set_behavior(&self, behavior: SimBehavior) {
        *self.behavior.lock().unwrap_or_else(|e| e.into_inner()) = behavior;
    }

    /// Number of sign requests received
    pub fn request_count(&self) -> usize {
        *self.requests.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether a request is still outstanding
    pub fn has_pending(&self) -> bool {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    fn behavior(&self) -> SimBehavior {
        self.behavior.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn sign(&self, digest: &[u8; 32]) -> Result<Vec<u8>, TransportError> {
        self.key
            .sign(digest)
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}

impl DeviceTransport for SimulatedTransport {
    fn is_connected(&self) -> bool {
        self.behavior() != SimBehavior::Disconnected
    }

    fn public_key(&self) -> Result<Vec<u8>, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected);
        }
        Ok(self.key.public_key.serialize().to_vec())
    }

    fn begin_sign(&self, digest: &[u8; 32]) -> Result<(), TransportError> {
        match self.behavior() {
            SimBehavior::Disconnected => return Err(TransportError::Disconnected),
            SimBehavior::Fault(reason) => return Err(TransportError::Io(reason)),
            _ => {}
        }

        *self.requests.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        *self.pending.lock().unwrap_or_else(|e| e.into_inner()) = Some(Pending {
            digest: *digest,
            started: Instant::now(),
        });
        Ok(())
    }

    fn poll_sign(&self) -> Result<SignPoll, TransportError> {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let Some(request) = pending.as_ref() else {
            return Err(TransportError::Io("no request pending".into()));
        };

        let outcome = match self.behavior() {
            SimBehavior::Approve => SignPoll::Signed(self.sign(&request.digest)?),
            SimBehavior::ApproveAfter(delay) => {
                if request.started.elapsed() < delay {
                    return Ok(SignPoll::Pending);
                }
                SignPoll::Signed(self.sign(&request.digest)?)
            }
            SimBehavior::Reject => SignPoll::Rejected,
            SimBehavior::NeverRespond => return Ok(SignPoll::Pending),
            SimBehavior::Fault(reason) => return Err(TransportError::Io(reason)),
            SimBehavior::ForgeSignature => {
                let mut other = request.digest;
                other[0] ^= 0xff;
                SignPoll::Signed(self.sign(&double_sha256(&other))?)
            }
            SimBehavior::Disconnected => return Err(TransportError::Disconnected),
        };

        *pending = None;
        Ok(outcome)
    }

    fn abort(&self) {
        *self.pending.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}
