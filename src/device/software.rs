//! Software-held signing key

use super::{AuthorityId, DeviceError, SignContext, SignRequest, SigningDevice};
use crate::crypto::{KeyError, KeyPair};
use crate::signing::PartialSignature;
use secp256k1::PublicKey;

/// Authority whose key lives in process memory
#[derive(Debug, Clone)]
pub struct SoftwareSigner {
    authority: AuthorityId,
    key: KeyPair,
}

impl SoftwareSigner {
    pub fn new(key: KeyPair) -> Self {
        Self {
            authority: AuthorityId::SoftwareKey,
            key,
        }
    }

    /// Load the key from a hex-encoded secret
    pub fn from_private_key_hex(hex_key: &str) -> Result<Self, KeyError> {
        Ok(Self::new(KeyPair::from_private_key_hex(hex_key)?))
    }

    /// Use the key for a different authority slot (tests and demos)
    pub fn with_authority(mut self, authority: AuthorityId) -> Self {
        self.authority = authority;
        self
    }
}

impl SigningDevice for SoftwareSigner {
    fn authority(&self) -> AuthorityId {
        self.authority
    }

    fn identify(&self) -> Result<PublicKey, DeviceError> {
        Ok(self.key.public_key)
    }

    fn sign(&self, request: &SignRequest, ctx: &SignContext) -> Result<PartialSignature, DeviceError> {
        ctx.check(self.authority)?;

        let der = self
            .key
            .sign(request.digest.as_bytes())
            .map_err(|e| DeviceError::SigningFailed {
                authority: self.authority,
                reason: e.to_string(),
            })?;

        Ok(PartialSignature::new(
            self.authority,
            request.input_index,
            der,
            self.key.public_key,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::double_sha256;
    use crate::tx::SigningDigest;
    use std::time::Duration;

    #[test]
    fn test_sign_verifies() {
        let signer = SoftwareSigner::new(KeyPair::generate());
        let request = SignRequest {
            template_id: "t".into(),
            input_index: 2,
            digest: SigningDigest::from_bytes(double_sha256(b"x")),
        };

        let partial = signer
            .sign(&request, &SignContext::with_timeout(Duration::from_secs(1)))
            .unwrap();
        assert_eq!(partial.authority, AuthorityId::SoftwareKey);
        assert_eq!(partial.input_index, 2);
        assert!(partial.verify(&request.digest));
    }

    #[test]
    fn test_cancelled_before_sign() {
        let signer = SoftwareSigner::new(KeyPair::generate());
        let ctx = SignContext::with_timeout(Duration::from_secs(1));
        ctx.token().cancel();

        let request = SignRequest {
            template_id: "t".into(),
            input_index: 0,
            digest: SigningDigest::from_bytes([1; 32]),
        };
        assert_eq!(
            signer.sign(&request, &ctx),
            Err(DeviceError::Cancelled(AuthorityId::SoftwareKey))
        );
    }
}
