//! Wallet record
//!
//! Binds each signing authority to one key of the threshold script. The
//! record is written once when the wallet is created and never mutated.

use crate::device::{AuthorityId, AuthorityKeys};
use crate::error::ErrorCategory;
use crate::script::{Network, PublicKeyTriple, ScriptError, ThresholdScript, TOTAL_KEYS};
use chrono::{DateTime, Utc};
use secp256k1::PublicKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wallet-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("Wallet name must not be empty")]
    EmptyName,
    #[error("No key given for authority {0}")]
    MissingAuthority(AuthorityId),
    #[error("Key for authority {0} is not part of the wallet script")]
    AuthorityNotInScript(AuthorityId),
    #[error("Script error: {0}")]
    Script(#[from] ScriptError),
}

impl WalletError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            WalletError::AuthorityNotInScript(_) => ErrorCategory::Integrity,
            _ => ErrorCategory::Validation,
        }
    }
}

/// Persisted description of a 2-of-3 wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletRecord {
    pub name: String,
    script: ThresholdScript,
    authorities: AuthorityKeys,
    pub created_at: DateTime<Utc>,
}

impl WalletRecord {
    /// Create a wallet from one key per authority
    ///
    /// The keys are put in canonical script order here, once.
    pub fn create(name: &str, keys: AuthorityKeys, network: Network) -> Result<Self, WalletError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(WalletError::EmptyName);
        }
        if let Some(missing) = AuthorityId::ALL.iter().find(|a| !keys.contains_key(*a)) {
            return Err(WalletError::MissingAuthority(*missing));
        }

        let raw: Vec<[u8; 33]> = keys.values().map(|k| k.serialize()).collect();
        let triple = PublicKeyTriple::canonical(&raw)?;
        let script = ThresholdScript::new(triple, network);

        let record = Self {
            name: name.to_string(),
            script,
            authorities: keys,
            created_at: Utc::now(),
        };
        log::info!("Created wallet {} with address {}", record.name, record.address());
        Ok(record)
    }

    /// Check a loaded record: exactly the three authorities, each bound to a
    /// key of the script
    pub fn validate(&self) -> Result<(), WalletError> {
        if self.name.trim().is_empty() {
            return Err(WalletError::EmptyName);
        }
        if let Some(missing) = AuthorityId::ALL.iter().find(|a| !self.authorities.contains_key(*a)) {
            return Err(WalletError::MissingAuthority(*missing));
        }
        for (authority, key) in &self.authorities {
            if !self.script.keys().contains(key) {
                return Err(WalletError::AuthorityNotInScript(*authority));
            }
        }
        debug_assert_eq!(self.authorities.len(), TOTAL_KEYS);
        Ok(())
    }

    pub fn script(&self) -> &ThresholdScript {
        &self.script
    }

    pub fn address(&self) -> &str {
        self.script.address()
    }

    pub fn network(&self) -> Network {
        self.script.network()
    }

    pub fn authorities(&self) -> &AuthorityKeys {
        &self.authorities
    }

    pub fn key_for(&self, authority: AuthorityId) -> Option<&PublicKey> {
        self.authorities.get(&authority)
    }

    /// Authority whose key sits at `position` in the script
    pub fn authority_at(&self, position: usize) -> Option<AuthorityId> {
        let key = self.script.keys().keys().get(position)?;
        self.authorities
            .iter()
            .find(|(_, k)| *k == key)
            .map(|(a, _)| *a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    fn keys() -> AuthorityKeys {
        AuthorityId::ALL
            .iter()
            .map(|a| (*a, KeyPair::generate().public_key))
            .collect()
    }

    #[test]
    fn test_create_wallet() {
        let keys = keys();
        let wallet = WalletRecord::create("vault", keys.clone(), Network::Testnet).unwrap();

        assert!(wallet.address().starts_with('2'));
        assert_eq!(wallet.key_for(AuthorityId::HardwareB), keys.get(&AuthorityId::HardwareB));
        wallet.validate().unwrap();

        let positions: Vec<AuthorityId> = (0..3).filter_map(|i| wallet.authority_at(i)).collect();
        assert_eq!(positions.len(), 3);
        assert_eq!(
            wallet.script().keys().position(wallet.key_for(positions[0]).unwrap()),
            Some(0)
        );
    }

    #[test]
    fn test_missing_authority() {
        let mut keys = keys();
        keys.remove(&AuthorityId::SoftwareKey);
        assert_eq!(
            WalletRecord::create("vault", keys, Network::Mainnet),
            Err(WalletError::MissingAuthority(AuthorityId::SoftwareKey))
        );
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let shared = KeyPair::generate().public_key;
        let mut keys = keys();
        keys.insert(AuthorityId::HardwareA, shared);
        keys.insert(AuthorityId::HardwareB, shared);
        assert!(matches!(
            WalletRecord::create("vault", keys, Network::Mainnet),
            Err(WalletError::Script(ScriptError::InvalidKeyCount(_)))
        ));
    }

    #[test]
    fn test_record_roundtrip_validates() {
        let wallet = WalletRecord::create("vault", keys(), Network::Regtest).unwrap();
        let json = serde_json::to_string(&wallet).unwrap();
        let loaded: WalletRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, wallet);
        loaded.validate().unwrap();
    }
}
