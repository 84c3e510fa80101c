//! Partial signatures and per-input signature sets

use super::AggregationError;
use crate::crypto::verify_digest;
use crate::device::AuthorityId;
use crate::encoding::hex_bytes;
use crate::script::{ThresholdScript, TOTAL_KEYS};
use crate::tx::SigningDigest;
use secp256k1::PublicKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One authority's signature over one input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialSignature {
    pub authority: AuthorityId,
    pub input_index: usize,
    /// DER encoding, without the sighash byte
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
    pub public_key: PublicKey,
}

impl PartialSignature {
    pub fn new(
        authority: AuthorityId,
        input_index: usize,
        signature: Vec<u8>,
        public_key: PublicKey,
    ) -> Self {
        Self {
            authority,
            input_index,
            signature,
            public_key,
        }
    }

    /// Whether the signature is valid for `digest` under `public_key`
    pub fn verify(&self, digest: &SigningDigest) -> bool {
        verify_digest(&self.public_key, digest.as_bytes(), &self.signature).unwrap_or(false)
    }
}

/// Outcome of adding a signature to a set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Insert {
    Added,
    /// The same signature was already present
    AlreadyPresent,
}

/// Accepted signatures for a single input, at most one per authority
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SignatureSet {
    signatures: BTreeMap<AuthorityId, PartialSignature>,
}

impl SignatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    pub fn get(&self, authority: AuthorityId) -> Option<&PartialSignature> {
        self.signatures.get(&authority)
    }

    pub fn authorities(&self) -> impl Iterator<Item = AuthorityId> + '_ {
        self.signatures.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PartialSignature> {
        self.signatures.values()
    }

    /// Add an already verified signature
    ///
    /// An existing entry for the authority is never replaced.
    pub fn insert(&mut self, partial: PartialSignature) -> Result<Insert, AggregationError> {
        if let Some(existing) = self.signatures.get(&partial.authority) {
            if *existing == partial {
                return Ok(Insert::AlreadyPresent);
            }
            return Err(AggregationError::DuplicateAuthorityConflict {
                input: partial.input_index,
                authority: partial.authority,
            });
        }

        debug_assert!(self.signatures.len() < TOTAL_KEYS);
        self.signatures.insert(partial.authority, partial);
        Ok(Insert::Added)
    }

    /// Signatures whose keys appear in `script`, in the script's key order
    pub fn ordered_for(&self, script: &ThresholdScript) -> Vec<&PartialSignature> {
        let mut ordered: Vec<(usize, &PartialSignature)> = self
            .signatures
            .values()
            .filter_map(|p| script.keys().position(&p.public_key).map(|pos| (pos, p)))
            .collect();
        ordered.sort_by_key(|(pos, _)| *pos);
        ordered.into_iter().map(|(_, p)| p).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{double_sha256, KeyPair};

    fn signed(authority: AuthorityId, key: &KeyPair, digest: &SigningDigest) -> PartialSignature {
        PartialSignature::new(authority, 0, key.sign(digest.as_bytes()).unwrap(), key.public_key)
    }

    #[test]
    fn test_insert_idempotent() {
        let key = KeyPair::generate();
        let digest = SigningDigest::from_bytes(double_sha256(b"a"));
        let partial = signed(AuthorityId::HardwareA, &key, &digest);

        let mut set = SignatureSet::new();
        assert_eq!(set.insert(partial.clone()).unwrap(), Insert::Added);
        assert_eq!(set.insert(partial).unwrap(), Insert::AlreadyPresent);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_conflict_keeps_original() {
        let key = KeyPair::generate();
        let first = signed(AuthorityId::HardwareB, &key, &SigningDigest::from_bytes(double_sha256(b"a")));
        let second = signed(AuthorityId::HardwareB, &key, &SigningDigest::from_bytes(double_sha256(b"b")));

        let mut set = SignatureSet::new();
        set.insert(first.clone()).unwrap();
        assert!(matches!(
            set.insert(second),
            Err(AggregationError::DuplicateAuthorityConflict { authority: AuthorityId::HardwareB, .. })
        ));
        assert_eq!(set.get(AuthorityId::HardwareB), Some(&first));
    }

    #[test]
    fn test_verify_rejects_wrong_key() {
        let digest = SigningDigest::from_bytes(double_sha256(b"a"));
        let mut partial = signed(AuthorityId::SoftwareKey, &KeyPair::generate(), &digest);
        assert!(partial.verify(&digest));

        partial.public_key = KeyPair::generate().public_key;
        assert!(!partial.verify(&digest));
    }
}
