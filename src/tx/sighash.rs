//! Signature digest computation
//!
//! This is the only code that produces the bytes an authority signs. Devices,
//! the software key, the aggregator's verification and the finalizer's
//! self-check all obtain digests from [`compute_digest`].

use super::transaction::UnsignedTransaction;
use super::BuildError;
use crate::crypto::double_sha256;
use crate::script::interpreter::SIGHASH_ALL;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 32-byte legacy `SIGHASH_ALL` digest for one input
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SigningDigest([u8; 32]);

impl SigningDigest {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for SigningDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for SigningDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SigningDigest({})", self.to_hex())
    }
}

impl Serialize for SigningDigest {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for SigningDigest {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("digest must be 32 bytes"))?;
        Ok(Self(arr))
    }
}

/// Compute the digest for `input_index`
///
/// Legacy sighash: serialize the transaction with the spent input's
/// scriptSig replaced by its redeem script and every other scriptSig empty,
/// append the 4-byte sighash type, double SHA-256.
pub fn compute_digest(
    tx: &UnsignedTransaction,
    input_index: usize,
) -> Result<SigningDigest, BuildError> {
    let input = tx
        .inputs()
        .get(input_index)
        .ok_or(BuildError::InputIndexOutOfRange {
            index: input_index,
            inputs: tx.inputs().len(),
        })?;

    let redeem = input.script.redeem_script();
    let script_sigs: Vec<&[u8]> = (0..tx.inputs().len())
        .map(|i| if i == input_index { redeem } else { &[][..] })
        .collect();

    let mut preimage = tx.encode(&script_sigs);
    preimage.extend_from_slice(&(SIGHASH_ALL as u32).to_le_bytes());

    Ok(SigningDigest(double_sha256(&preimage)))
}

/// Digests for every input, in input order
pub fn compute_all_digests(tx: &UnsignedTransaction) -> Vec<SigningDigest> {
    (0..tx.inputs().len())
        .filter_map(|i| compute_digest(tx, i).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx::transaction::tests::{sample_input, sample_script};
    use crate::tx::transaction::TxOutput;

    fn two_input_tx() -> UnsignedTransaction {
        let script = sample_script();
        UnsignedTransaction::new(
            vec![sample_input(&script, 1, 60_000), sample_input(&script, 2, 50_000)],
            vec![TxOutput {
                value: 100_000,
                script_pubkey: vec![0x76; 25],
            }],
            10_000,
        )
        .unwrap()
    }

    #[test]
    fn test_digest_is_deterministic() {
        let tx = two_input_tx();
        let copy: UnsignedTransaction =
            serde_json::from_str(&serde_json::to_string(&tx).unwrap()).unwrap();

        assert_eq!(compute_digest(&tx, 0).unwrap(), compute_digest(&tx, 0).unwrap());
        assert_eq!(compute_digest(&tx, 1).unwrap(), compute_digest(&copy, 1).unwrap());
    }

    #[test]
    fn test_digest_differs_per_input() {
        let tx = two_input_tx();
        assert_ne!(compute_digest(&tx, 0).unwrap(), compute_digest(&tx, 1).unwrap());
        assert_eq!(compute_all_digests(&tx).len(), 2);
    }

    #[test]
    fn test_out_of_range() {
        let tx = two_input_tx();
        assert!(matches!(
            compute_digest(&tx, 2),
            Err(BuildError::InputIndexOutOfRange { index: 2, inputs: 2 })
        ));
    }
}
