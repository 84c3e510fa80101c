//! Hardware authority driven through a [`DeviceTransport`]

use super::transport::{DeviceTransport, SignPoll, TransportError};
use super::{AuthorityId, DeviceError, SignContext, SignRequest, SigningDevice};
use crate::crypto::parse_public_key;
use crate::signing::PartialSignature;
use secp256k1::PublicKey;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Default interval between status polls while waiting for the user
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct HardwareDevice {
    authority: AuthorityId,
    transport: Arc<dyn DeviceTransport>,
    poll_interval: Duration,
    identity: OnceLock<PublicKey>,
}

impl HardwareDevice {
    pub fn new(authority: AuthorityId, transport: Arc<dyn DeviceTransport>) -> Self {
        Self {
            authority,
            transport,
            poll_interval: DEFAULT_POLL_INTERVAL,
            identity: OnceLock::new(),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn map_transport(&self, err: TransportError) -> DeviceError {
        match err {
            TransportError::Disconnected => DeviceError::NotPresent(self.authority),
            TransportError::Io(reason) => DeviceError::SigningFailed {
                authority: self.authority,
                reason,
            },
        }
    }

    /// Poll until the device answers, the deadline passes or the call is
    /// cancelled
    fn wait_for_signature(&self, ctx: &SignContext) -> Result<Vec<u8>, DeviceError> {
        loop {
            if let Err(e) = ctx.check(self.authority) {
                self.transport.abort();
                log::warn!("Aborting signing request on {}: {}", self.authority, e);
                return Err(e);
            }

            match self.transport.poll_sign().map_err(|e| self.map_transport(e))? {
                SignPoll::Signed(der) => return Ok(der),
                SignPoll::Rejected => return Err(DeviceError::UserRejected(self.authority)),
                SignPoll::Pending => {
                    std::thread::sleep(self.poll_interval.min(ctx.remaining()));
                }
            }
        }
    }
}

impl std::fmt::Debug for HardwareDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HardwareDevice")
            .field("authority", &self.authority)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl SigningDevice for HardwareDevice {
    fn authority(&self) -> AuthorityId {
        self.authority
    }

    fn identify(&self) -> Result<PublicKey, DeviceError> {
        if let Some(key) = self.identity.get() {
            return Ok(*key);
        }

        if !self.transport.is_connected() {
            return Err(DeviceError::NotPresent(self.authority));
        }
        let raw = self.transport.public_key().map_err(|e| self.map_transport(e))?;
        let key = parse_public_key(&raw).map_err(|e| DeviceError::SigningFailed {
            authority: self.authority,
            reason: e.to_string(),
        })?;

        Ok(*self.identity.get_or_init(|| key))
    }

    fn sign(&self, request: &SignRequest, ctx: &SignContext) -> Result<PartialSignature, DeviceError> {
        ctx.check(self.authority)?;
        if !self.transport.is_connected() {
            return Err(DeviceError::NotPresent(self.authority));
        }

        let public_key = self.identify()?;
        log::info!(
            "Confirm input {} of {} on {}",
            request.input_index,
            request.template_id,
            self.authority
        );

        self.transport
            .begin_sign(request.digest.as_bytes())
            .map_err(|e| self.map_transport(e))?;
        let der = self.wait_for_signature(ctx)?;

        Ok(PartialSignature::new(self.authority, request.input_index, der, public_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{double_sha256, KeyPair};
    use crate::device::simulated::{SimBehavior, SimulatedTransport};
    use crate::tx::SigningDigest;

    fn request() -> SignRequest {
        SignRequest {
            template_id: "test".into(),
            input_index: 0,
            digest: SigningDigest::from_bytes(double_sha256(b"digest")),
        }
    }

    fn device(behavior: SimBehavior) -> (HardwareDevice, KeyPair) {
        let key = KeyPair::generate();
        let transport = Arc::new(SimulatedTransport::new(key.clone(), behavior));
        let device = HardwareDevice::new(AuthorityId::HardwareA, transport)
            .with_poll_interval(Duration::from_millis(5));
        (device, key)
    }

    #[test]
    fn test_identify_is_stable() {
        let (device, key) = device(SimBehavior::Approve);
        assert_eq!(device.identify().unwrap(), key.public_key);
        assert_eq!(device.identify().unwrap(), key.public_key);
    }

    #[test]
    fn test_approve_after_delay() {
        let (device, key) = device(SimBehavior::ApproveAfter(Duration::from_millis(20)));
        let ctx = SignContext::with_timeout(Duration::from_secs(5));

        let partial = device.sign(&request(), &ctx).unwrap();
        assert_eq!(partial.public_key, key.public_key);
        assert!(partial.verify(&request().digest));
    }

    #[test]
    fn test_never_responds_times_out() {
        let (device, _) = device(SimBehavior::NeverRespond);
        let ctx = SignContext::with_timeout(Duration::from_millis(30));

        let err = device.sign(&request(), &ctx).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_reject_and_disconnect() {
        let (device, _) = device(SimBehavior::Reject);
        let ctx = SignContext::with_timeout(Duration::from_secs(1));
        assert_eq!(
            device.sign(&request(), &ctx),
            Err(DeviceError::UserRejected(AuthorityId::HardwareA))
        );

        let (device, _) = device_disconnected();
        assert_eq!(
            device.sign(&request(), &ctx),
            Err(DeviceError::NotPresent(AuthorityId::HardwareA))
        );
    }

    fn device_disconnected() -> (HardwareDevice, KeyPair) {
        device(SimBehavior::Disconnected)
    }

    #[test]
    fn test_cancel_mid_wait() {
        let (device, _) = device(SimBehavior::NeverRespond);
        let ctx = SignContext::with_timeout(Duration::from_secs(30));
        let token = ctx.token().clone();

        let handle = std::thread::spawn(move || device.sign(&request(), &ctx));
        std::thread::sleep(Duration::from_millis(20));
        token.cancel();

        assert_eq!(
            handle.join().unwrap(),
            Err(DeviceError::Cancelled(AuthorityId::HardwareA))
        );
    }
}
