//! Unsigned transaction template
//!
//! Inputs and outputs are frozen at construction: there are no mutable
//! accessors, and every later stage (digests, signatures, finalization)
//! works from a shared read-only reference.

use super::BuildError;
use crate::crypto::double_sha256;
use crate::encoding::{hex_bytes, write_varint};
use crate::script::{Address, Network, ThresholdScript};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Constants
// =============================================================================

/// Transaction version
pub const TX_VERSION: i32 = 2;

/// Sequence number that disables locktime and RBF signalling
pub const SEQUENCE_FINAL: u32 = 0xFFFF_FFFF;

// =============================================================================
// Txid
// =============================================================================

/// Transaction id, stored in internal (hash) byte order and displayed
/// reversed, as block explorers show it
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Txid([u8; 32]);

impl Txid {
    /// Txid of serialized transaction bytes
    pub fn from_raw_tx(raw: &[u8]) -> Self {
        Self(double_sha256(raw))
    }

    pub fn from_internal(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Bytes in internal order (as serialized in outpoints)
    pub fn as_internal(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Txid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut display = self.0;
        display.reverse();
        f.write_str(&hex::encode(display))
    }
}

impl fmt::Debug for Txid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Txid({})", self)
    }
}

impl FromStr for Txid {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| BuildError::InvalidTemplate(format!("txid {}: {}", s, e)))?;
        let mut internal: [u8; 32] = bytes
            .try_into()
            .map_err(|_| BuildError::InvalidTemplate(format!("txid {} is not 32 bytes", s)))?;
        internal.reverse();
        Ok(Self(internal))
    }
}

impl Serialize for Txid {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Txid {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Outputs and UTXOs
// =============================================================================

/// Reference to a previous transaction output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: Txid,
    pub vout: u32,
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

/// Unspent output as reported by a UTXO provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub outpoint: OutPoint,
    /// Value in satoshis
    pub value: u64,
    #[serde(with = "hex_bytes")]
    pub script_pubkey: Vec<u8>,
}

/// Transaction output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    /// Value in satoshis
    pub value: u64,
    #[serde(with = "hex_bytes")]
    pub script_pubkey: Vec<u8>,
}

impl TxOutput {
    /// Payment to a Base58Check address on `network`
    pub fn to_address(address: &str, value: u64, network: Network) -> Result<Self, BuildError> {
        let address = Address::parse(address, network)?;
        Ok(Self {
            value,
            script_pubkey: address.script_pubkey(),
        })
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.value.to_le_bytes());
        write_varint(out, self.script_pubkey.len() as u64);
        out.extend_from_slice(&self.script_pubkey);
    }
}

/// Transaction input spending a threshold-script output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub previous_output: OutPoint,
    /// Claimed value of the spent output
    pub value: u64,
    /// Script needed to spend the output
    pub script: ThresholdScript,
    pub sequence: u32,
}

// =============================================================================
// Unsigned Transaction
// =============================================================================

/// Immutable transaction template awaiting signatures
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TemplateRepr", into = "TemplateRepr")]
pub struct UnsignedTransaction {
    version: i32,
    inputs: Vec<TxInput>,
    outputs: Vec<TxOutput>,
    lock_time: u32,
    fee: u64,
}

#[derive(Serialize, Deserialize)]
struct TemplateRepr {
    version: i32,
    inputs: Vec<TxInput>,
    outputs: Vec<TxOutput>,
    lock_time: u32,
    fee: u64,
}

impl TryFrom<TemplateRepr> for UnsignedTransaction {
    type Error = BuildError;

    fn try_from(r: TemplateRepr) -> Result<Self, Self::Error> {
        Self::with_params(r.version, r.inputs, r.outputs, r.lock_time, r.fee)
    }
}

impl From<UnsignedTransaction> for TemplateRepr {
    fn from(tx: UnsignedTransaction) -> Self {
        Self {
            version: tx.version,
            inputs: tx.inputs,
            outputs: tx.outputs,
            lock_time: tx.lock_time,
            fee: tx.fee,
        }
    }
}

impl UnsignedTransaction {
    /// Build a template, checking `Σ inputs ≥ Σ outputs + fee`
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>, fee: u64) -> Result<Self, BuildError> {
        Self::with_params(TX_VERSION, inputs, outputs, 0, fee)
    }

    fn with_params(
        version: i32,
        inputs: Vec<TxInput>,
        outputs: Vec<TxOutput>,
        lock_time: u32,
        fee: u64,
    ) -> Result<Self, BuildError> {
        if inputs.is_empty() {
            return Err(BuildError::InvalidTemplate("no inputs".into()));
        }
        if outputs.is_empty() {
            return Err(BuildError::NoOutputs);
        }

        let mut seen = std::collections::HashSet::new();
        for input in &inputs {
            if !seen.insert(input.previous_output) {
                return Err(BuildError::InvalidTemplate(format!(
                    "outpoint {} spent twice",
                    input.previous_output
                )));
            }
        }

        let total_in = checked_sum(inputs.iter().map(|i| i.value))?;
        let total_out = checked_sum(outputs.iter().map(|o| o.value))?;
        let needed = total_out
            .checked_add(fee)
            .ok_or_else(|| BuildError::InvalidTemplate("value overflow".into()))?;

        if total_in < needed {
            return Err(BuildError::InvalidTemplate(format!(
                "inputs {} do not cover outputs {} plus fee {}",
                total_in, total_out, fee
            )));
        }

        Ok(Self {
            version,
            inputs,
            outputs,
            lock_time,
            fee,
        })
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn inputs(&self) -> &[TxInput] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TxOutput] {
        &self.outputs
    }

    pub fn lock_time(&self) -> u32 {
        self.lock_time
    }

    /// Declared fee in satoshis
    pub fn fee(&self) -> u64 {
        self.fee
    }

    pub fn total_input(&self) -> u64 {
        self.inputs.iter().map(|i| i.value).sum()
    }

    pub fn total_output(&self) -> u64 {
        self.outputs.iter().map(|o| o.value).sum()
    }

    /// Stable identifier of the template (hash of the unsigned serialization)
    pub fn template_id(&self) -> String {
        let empty: Vec<&[u8]> = vec![&[][..]; self.inputs.len()];
        hex::encode(&double_sha256(&self.encode(&empty))[..16])
    }

    /// Legacy serialization with the given scriptSig per input
    pub(crate) fn encode(&self, script_sigs: &[&[u8]]) -> Vec<u8> {
        debug_assert_eq!(script_sigs.len(), self.inputs.len());

        let mut out = Vec::with_capacity(256);
        out.extend_from_slice(&self.version.to_le_bytes());

        write_varint(&mut out, self.inputs.len() as u64);
        for (input, script_sig) in self.inputs.iter().zip(script_sigs) {
            out.extend_from_slice(input.previous_output.txid.as_internal());
            out.extend_from_slice(&input.previous_output.vout.to_le_bytes());
            write_varint(&mut out, script_sig.len() as u64);
            out.extend_from_slice(script_sig);
            out.extend_from_slice(&input.sequence.to_le_bytes());
        }

        write_varint(&mut out, self.outputs.len() as u64);
        for output in &self.outputs {
            output.encode(&mut out);
        }

        out.extend_from_slice(&self.lock_time.to_le_bytes());
        out
    }
}

fn checked_sum(mut values: impl Iterator<Item = u64>) -> Result<u64, BuildError> {
    values.try_fold(0u64, |acc, v| {
        acc.checked_add(v)
            .ok_or_else(|| BuildError::InvalidTemplate("value overflow".into()))
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::script::derive;

    pub(crate) fn sample_script() -> ThresholdScript {
        let keys: Vec<Vec<u8>> = (0..3)
            .map(|_| KeyPair::generate().public_key.serialize().to_vec())
            .collect();
        derive(&keys, Network::Regtest).unwrap()
    }

    pub(crate) fn sample_input(script: &ThresholdScript, seed: u8, value: u64) -> TxInput {
        TxInput {
            previous_output: OutPoint {
                txid: Txid::from_internal([seed; 32]),
                vout: 0,
            },
            value,
            script: script.clone(),
            sequence: SEQUENCE_FINAL,
        }
    }

    #[test]
    fn test_txid_display_is_reversed() {
        let mut internal = [0u8; 32];
        internal[0] = 0xab;
        let txid = Txid::from_internal(internal);
        assert!(txid.to_string().ends_with("ab"));

        let parsed: Txid = txid.to_string().parse().unwrap();
        assert_eq!(parsed, txid);
    }

    #[test]
    fn test_value_invariant() {
        let script = sample_script();
        let output = TxOutput {
            value: 95_000,
            script_pubkey: script.script_pubkey().to_vec(),
        };

        let ok = UnsignedTransaction::new(vec![sample_input(&script, 1, 100_000)], vec![output.clone()], 5_000);
        assert!(ok.is_ok());

        let too_much = UnsignedTransaction::new(vec![sample_input(&script, 1, 100_000)], vec![output], 5_001);
        assert!(matches!(too_much, Err(BuildError::InvalidTemplate(_))));
    }

    #[test]
    fn test_value_overflow_rejected() {
        let script = sample_script();
        let output = TxOutput {
            value: 1_000,
            script_pubkey: script.script_pubkey().to_vec(),
        };
        let inputs = vec![sample_input(&script, 1, u64::MAX), sample_input(&script, 2, 2)];
        let result = UnsignedTransaction::new(inputs, vec![output], 0);
        assert!(matches!(result, Err(BuildError::InvalidTemplate(msg)) if msg.contains("overflow")));
    }

    #[test]
    fn test_rejects_double_spend_in_template() {
        let script = sample_script();
        let output = TxOutput {
            value: 1_000,
            script_pubkey: script.script_pubkey().to_vec(),
        };
        let input = sample_input(&script, 7, 50_000);
        let result = UnsignedTransaction::new(vec![input.clone(), input], vec![output], 1_000);
        assert!(result.is_err());
    }

    #[test]
    fn test_serde_revalidates() {
        let script = sample_script();
        let output = TxOutput {
            value: 10_000,
            script_pubkey: script.script_pubkey().to_vec(),
        };
        let tx = UnsignedTransaction::new(vec![sample_input(&script, 3, 20_000)], vec![output], 500).unwrap();

        let json = serde_json::to_string(&tx).unwrap();
        let loaded: UnsignedTransaction = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, tx);
        assert_eq!(loaded.template_id(), tx.template_id());

        let inflated = json.replace("\"fee\":500", "\"fee\":50000");
        assert!(serde_json::from_str::<UnsignedTransaction>(&inflated).is_err());
    }
}
