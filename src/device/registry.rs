//! Set of signing authorities available to a session

use super::{AuthorityId, AuthorityKeys, DeviceError, SigningDevice};
use crate::crypto::public_key_hex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Devices keyed by the authority they act for
#[derive(Default, Clone)]
pub struct DeviceRegistry {
    devices: BTreeMap<AuthorityId, Arc<dyn SigningDevice>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device, replacing any previous one for the same authority
    pub fn register(&mut self, device: Arc<dyn SigningDevice>) {
        let authority = device.authority();
        if self.devices.insert(authority, device).is_some() {
            log::info!("Replaced device for {}", authority);
        } else {
            log::debug!("Registered device for {}", authority);
        }
    }

    pub fn get(&self, authority: AuthorityId) -> Result<Arc<dyn SigningDevice>, DeviceError> {
        self.devices
            .get(&authority)
            .cloned()
            .ok_or(DeviceError::NotRegistered(authority))
    }

    pub fn authorities(&self) -> Vec<AuthorityId> {
        self.devices.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Check that every registered device reports the key the wallet binds
    /// to its authority
    pub fn check_identities(&self, expected: &AuthorityKeys) -> Result<(), DeviceError> {
        for (authority, device) in &self.devices {
            let wanted = expected
                .get(authority)
                .ok_or_else(|| DeviceError::UnknownAuthority(authority.to_string()))?;
            let actual = device.identify()?;
            if actual != *wanted {
                log::error!(
                    "Device for {} reports {}, wallet expects {}",
                    authority,
                    public_key_hex(&actual),
                    public_key_hex(wanted)
                );
                return Err(DeviceError::KeyMismatch {
                    authority: *authority,
                    expected: public_key_hex(wanted),
                    actual: public_key_hex(&actual),
                });
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("authorities", &self.authorities())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::device::SoftwareSigner;

    #[test]
    fn test_check_identities() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();

        let mut registry = DeviceRegistry::new();
        registry.register(Arc::new(SoftwareSigner::new(a.clone())));
        registry.register(Arc::new(SoftwareSigner::new(b.clone()).with_authority(AuthorityId::HardwareA)));
        assert_eq!(registry.len(), 2);

        let mut expected = AuthorityKeys::new();
        expected.insert(AuthorityId::SoftwareKey, a.public_key);
        expected.insert(AuthorityId::HardwareA, b.public_key);
        registry.check_identities(&expected).unwrap();

        expected.insert(AuthorityId::HardwareA, KeyPair::generate().public_key);
        assert!(matches!(
            registry.check_identities(&expected),
            Err(DeviceError::KeyMismatch { authority: AuthorityId::HardwareA, .. })
        ));
    }

    #[test]
    fn test_missing_device() {
        let registry = DeviceRegistry::new();
        assert!(matches!(
            registry.get(AuthorityId::HardwareB),
            Err(DeviceError::NotRegistered(AuthorityId::HardwareB))
        ));
    }
}
