//! 2-of-3 threshold script derivation
//!
//! The public keys are put in lexicographic byte order exactly once, when the
//! wallet is created. A persisted triple is never re-sorted: loading one that
//! is out of order is an error, because a different order is a different
//! script and therefore a different (incompatible) address.

use super::address::{Address, Network};
use super::opcodes::{push_data, small_int, OP_CHECKMULTISIG};
use crate::crypto::{hash160, parse_public_key, public_key_hex, KeyError};
use secp256k1::PublicKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Signatures required to spend (M)
pub const THRESHOLD: usize = 2;

/// Keys in the script (N)
pub const TOTAL_KEYS: usize = 3;

/// Errors related to threshold scripts and addresses
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    #[error("Expected exactly {TOTAL_KEYS} distinct public keys, got {0}")]
    InvalidKeyCount(usize),
    #[error("Public key {index} is not a valid curve point: {reason}")]
    InvalidKeyEncoding { index: usize, reason: String },
    #[error("Public keys are not in canonical order")]
    NonCanonicalOrder,
    #[error("Malformed script: {0}")]
    MalformedScript(String),
    #[error("Unsupported sighash type: {0:#04x}")]
    UnsupportedSighash(u8),
    #[error("Script not satisfied: {0}")]
    NotSatisfied(String),
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Unsupported address version byte: {0:#04x}")]
    UnsupportedAddressVersion(u8),
}

// =============================================================================
// Public Key Triple
// =============================================================================

/// Exactly three distinct public keys in canonical (lexicographic) order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<PublicKey>", into = "Vec<PublicKey>")]
pub struct PublicKeyTriple([PublicKey; TOTAL_KEYS]);

impl PublicKeyTriple {
    /// Validate raw key encodings and put them in canonical order
    ///
    /// This is the only place ordering happens.
    pub fn canonical<K: AsRef<[u8]>>(keys: &[K]) -> Result<Self, ScriptError> {
        if keys.len() != TOTAL_KEYS {
            return Err(ScriptError::InvalidKeyCount(keys.len()));
        }

        let mut parsed = Vec::with_capacity(TOTAL_KEYS);
        for (index, raw) in keys.iter().enumerate() {
            let key = parse_public_key(raw.as_ref()).map_err(|e| {
                let reason = match e {
                    KeyError::InvalidPublicKey(reason) => reason,
                    other => other.to_string(),
                };
                ScriptError::InvalidKeyEncoding { index, reason }
            })?;
            parsed.push(key);
        }

        parsed.sort_by_key(|k| k.serialize());
        Self::from_ordered(parsed)
    }

    /// Parse hex-encoded keys, then order them canonically
    pub fn canonical_from_hex<S: AsRef<str>>(keys: &[S]) -> Result<Self, ScriptError> {
        let mut raw = Vec::with_capacity(keys.len());
        for (index, key) in keys.iter().enumerate() {
            let bytes = hex::decode(key.as_ref().trim()).map_err(|e| {
                ScriptError::InvalidKeyEncoding {
                    index,
                    reason: e.to_string(),
                }
            })?;
            raw.push(bytes);
        }
        Self::canonical(&raw)
    }

    /// Accept keys that must already be in canonical order (persisted wallets)
    fn from_ordered(keys: Vec<PublicKey>) -> Result<Self, ScriptError> {
        let keys: [PublicKey; TOTAL_KEYS] = keys
            .try_into()
            .map_err(|v: Vec<PublicKey>| ScriptError::InvalidKeyCount(v.len()))?;

        for pair in keys.windows(2) {
            let (a, b) = (pair[0].serialize(), pair[1].serialize());
            if a == b {
                return Err(ScriptError::InvalidKeyCount(TOTAL_KEYS - 1));
            }
            if a > b {
                return Err(ScriptError::NonCanonicalOrder);
            }
        }

        Ok(Self(keys))
    }

    /// Keys in script order
    pub fn keys(&self) -> &[PublicKey; TOTAL_KEYS] {
        &self.0
    }

    /// Position of a key in script order
    pub fn position(&self, key: &PublicKey) -> Option<usize> {
        self.0.iter().position(|k| k == key)
    }

    pub fn contains(&self, key: &PublicKey) -> bool {
        self.position(key).is_some()
    }

    /// Hex encodings in script order
    pub fn to_hex(&self) -> Vec<String> {
        self.0.iter().map(public_key_hex).collect()
    }
}

impl TryFrom<Vec<PublicKey>> for PublicKeyTriple {
    type Error = ScriptError;

    fn try_from(keys: Vec<PublicKey>) -> Result<Self, Self::Error> {
        Self::from_ordered(keys)
    }
}

impl From<PublicKeyTriple> for Vec<PublicKey> {
    fn from(triple: PublicKeyTriple) -> Self {
        triple.0.to_vec()
    }
}

// =============================================================================
// Threshold Script
// =============================================================================

/// The 2-of-3 redeem script and everything derived from it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ThresholdScriptRepr", into = "ThresholdScriptRepr")]
pub struct ThresholdScript {
    keys: PublicKeyTriple,
    network: Network,
    redeem_script: Vec<u8>,
    script_pubkey: Vec<u8>,
    address: String,
}

/// Persisted form; everything except the keys and network is recomputed
#[derive(Serialize, Deserialize)]
struct ThresholdScriptRepr {
    keys: PublicKeyTriple,
    network: Network,
    address: String,
}

impl TryFrom<ThresholdScriptRepr> for ThresholdScript {
    type Error = ScriptError;

    fn try_from(repr: ThresholdScriptRepr) -> Result<Self, Self::Error> {
        let script = ThresholdScript::new(repr.keys, repr.network);
        if script.address != repr.address {
            return Err(ScriptError::InvalidAddress(format!(
                "stored address {} does not match derived {}",
                repr.address, script.address
            )));
        }
        Ok(script)
    }
}

impl From<ThresholdScript> for ThresholdScriptRepr {
    fn from(script: ThresholdScript) -> Self {
        Self {
            keys: script.keys,
            network: script.network,
            address: script.address,
        }
    }
}

impl ThresholdScript {
    /// Build the script for an already canonical triple
    pub fn new(keys: PublicKeyTriple, network: Network) -> Self {
        // OP_2 <K1> <K2> <K3> OP_3 OP_CHECKMULTISIG
        let mut redeem_script = vec![small_int(THRESHOLD as u8)];
        for key in keys.keys() {
            push_data(&mut redeem_script, &key.serialize());
        }
        redeem_script.push(small_int(TOTAL_KEYS as u8));
        redeem_script.push(OP_CHECKMULTISIG);

        let p2sh = Address::p2sh(hash160(&redeem_script), network);

        Self {
            keys,
            network,
            script_pubkey: p2sh.script_pubkey(),
            address: p2sh.to_string(),
            redeem_script,
        }
    }

    pub fn keys(&self) -> &PublicKeyTriple {
        &self.keys
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// The redeem script revealed when spending
    pub fn redeem_script(&self) -> &[u8] {
        &self.redeem_script
    }

    /// `OP_HASH160 <hash160(redeem)> OP_EQUAL`
    pub fn script_pubkey(&self) -> &[u8] {
        &self.script_pubkey
    }

    /// P2SH receiving address
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Check that `script_sig` unlocks this script for an input whose
    /// digest is `digest`
    pub fn verify_spend(&self, script_sig: &[u8], digest: &[u8; 32]) -> Result<(), ScriptError> {
        super::interpreter::verify_multisig_spend(self, script_sig, digest)
    }

    /// Description like "2-of-3"
    pub fn description(&self) -> String {
        format!("{}-of-{}", THRESHOLD, TOTAL_KEYS)
    }
}

/// Derive the threshold script from raw key encodings
///
/// Fails with [`ScriptError::InvalidKeyCount`] unless exactly three distinct
/// keys are given and with [`ScriptError::InvalidKeyEncoding`] if any is not
/// a compressed curve point.
pub fn derive<K: AsRef<[u8]>>(keys: &[K], network: Network) -> Result<ThresholdScript, ScriptError> {
    let triple = PublicKeyTriple::canonical(keys)?;
    Ok(ThresholdScript::new(triple, network))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::script::opcodes::{OP_2, OP_3};

    fn sample_keys() -> Vec<Vec<u8>> {
        (1..=3u8)
            .map(|i| {
                let mut secret = [0u8; 32];
                secret[31] = i;
                let kp = KeyPair::from_private_key_hex(&hex::encode(secret)).unwrap();
                kp.public_key.serialize().to_vec()
            })
            .collect()
    }

    #[test]
    fn test_derive_is_deterministic() {
        let keys = sample_keys();
        let a = derive(&keys, Network::Mainnet).unwrap();
        let b = derive(&keys, Network::Mainnet).unwrap();

        assert_eq!(a.redeem_script(), b.redeem_script());
        assert_eq!(a.address(), b.address());
        assert!(a.address().starts_with('3'));
    }

    #[test]
    fn test_input_order_does_not_matter_at_creation() {
        let keys = sample_keys();
        let mut reversed = keys.clone();
        reversed.reverse();

        let a = derive(&keys, Network::Testnet).unwrap();
        let b = derive(&reversed, Network::Testnet).unwrap();
        assert_eq!(a.address(), b.address());
        assert!(a.address().starts_with('2'));
    }

    #[test]
    fn test_redeem_script_layout() {
        let script = derive(&sample_keys(), Network::Mainnet).unwrap();
        let redeem = script.redeem_script();

        assert_eq!(redeem.len(), 105);
        assert_eq!(redeem[0], OP_2);
        assert_eq!(redeem[103], OP_3);
        assert_eq!(redeem[104], OP_CHECKMULTISIG);

        // Keys appear in lexicographic order
        let k: Vec<&[u8]> = (0..3).map(|i| &redeem[2 + i * 34..2 + i * 34 + 33]).collect();
        assert!(k[0] < k[1] && k[1] < k[2]);
    }

    #[test]
    fn test_invalid_key_count() {
        let keys = sample_keys();
        assert!(matches!(
            derive(&keys[..2], Network::Mainnet),
            Err(ScriptError::InvalidKeyCount(2))
        ));

        let dup = vec![keys[0].clone(), keys[0].clone(), keys[1].clone()];
        assert!(matches!(
            derive(&dup, Network::Mainnet),
            Err(ScriptError::InvalidKeyCount(_))
        ));
    }

    #[test]
    fn test_invalid_key_encoding() {
        let mut keys = sample_keys();
        keys[1] = vec![0x05; 33];
        assert!(matches!(
            derive(&keys, Network::Mainnet),
            Err(ScriptError::InvalidKeyEncoding { index: 1, .. })
        ));
    }

    #[test]
    fn test_persisted_triple_is_not_reordered() {
        let triple = PublicKeyTriple::canonical(&sample_keys()).unwrap();
        let json = serde_json::to_string(&triple).unwrap();
        let loaded: PublicKeyTriple = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, triple);

        let mut keys: Vec<PublicKey> = triple.keys().to_vec();
        keys.swap(0, 2);
        let json = serde_json::to_string(&keys).unwrap();
        assert!(serde_json::from_str::<PublicKeyTriple>(&json).is_err());
    }

    #[test]
    fn test_script_serde_checks_address() {
        let script = derive(&sample_keys(), Network::Regtest).unwrap();
        let json = serde_json::to_string(&script).unwrap();
        let loaded: ThresholdScript = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded, script);

        let tampered = json.replace(script.address(), "2N1111111111111111111111111111111");
        assert!(serde_json::from_str::<ThresholdScript>(&tampered).is_err());
    }
}
