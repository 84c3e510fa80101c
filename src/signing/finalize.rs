//! Assembly of the spendable transaction
//!
//! Each input gets `OP_0 <sig> <sig> <redeem>` with the two signatures in
//! the order their keys appear in the redeem script. `OP_CHECKMULTISIG`
//! only walks forward through the keys, so any other order fails.

use super::partial::{PartialSignature, SignatureSet};
use super::AggregationError;
use crate::device::AuthorityId;
use crate::encoding::{hex_bytes, hex_bytes_vec};
use crate::script::interpreter::SIGHASH_ALL;
use crate::script::opcodes::{push_data, OP_0};
use crate::script::THRESHOLD;
use crate::tx::{compute_digest, Txid, UnsignedTransaction};
use serde::{Deserialize, Serialize};

/// Fully signed transaction, ready to broadcast
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedTransaction {
    unsigned: UnsignedTransaction,
    #[serde(with = "hex_bytes_vec")]
    script_sigs: Vec<Vec<u8>>,
    /// Authorities whose signatures were used, per input, in script order
    signers: Vec<Vec<AuthorityId>>,
    #[serde(with = "hex_bytes")]
    raw: Vec<u8>,
    txid: Txid,
}

impl FinalizedTransaction {
    pub fn unsigned(&self) -> &UnsignedTransaction {
        &self.unsigned
    }

    pub fn script_sigs(&self) -> &[Vec<u8>] {
        &self.script_sigs
    }

    pub fn signers(&self, input_index: usize) -> Option<&[AuthorityId]> {
        self.signers.get(input_index).map(|s| s.as_slice())
    }

    /// Signers of every input; enough to rebuild this exact transaction
    pub fn signer_sets(&self) -> &[Vec<AuthorityId>] {
        &self.signers
    }

    /// Network serialization
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn raw_hex(&self) -> String {
        hex::encode(&self.raw)
    }

    pub fn txid(&self) -> Txid {
        self.txid
    }
}

/// Finalize using, for every input, the two signatures whose keys come
/// first in script order
pub fn finalize(
    tx: &UnsignedTransaction,
    sets: &[SignatureSet],
) -> Result<FinalizedTransaction, AggregationError> {
    assemble(tx, sets, |_, _| true)
}

/// Finalize using only signatures from `authorities`
pub fn finalize_with(
    tx: &UnsignedTransaction,
    sets: &[SignatureSet],
    authorities: [AuthorityId; THRESHOLD],
) -> Result<FinalizedTransaction, AggregationError> {
    assemble(tx, sets, |_, p| authorities.contains(&p.authority))
}

/// Rebuild a finalization from the signers recorded for each input
pub fn finalize_as(
    tx: &UnsignedTransaction,
    sets: &[SignatureSet],
    signers: &[Vec<AuthorityId>],
) -> Result<FinalizedTransaction, AggregationError> {
    if signers.len() != tx.inputs().len() {
        return Err(AggregationError::InputIndexOutOfRange {
            index: signers.len(),
            inputs: tx.inputs().len(),
        });
    }
    assemble(tx, sets, |index, p| signers[index].contains(&p.authority))
}

fn assemble(
    tx: &UnsignedTransaction,
    sets: &[SignatureSet],
    allowed: impl Fn(usize, &PartialSignature) -> bool,
) -> Result<FinalizedTransaction, AggregationError> {
    if sets.len() != tx.inputs().len() {
        return Err(AggregationError::InputIndexOutOfRange {
            index: sets.len(),
            inputs: tx.inputs().len(),
        });
    }

    let mut script_sigs = Vec::with_capacity(sets.len());
    let mut signers = Vec::with_capacity(sets.len());

    for (index, (input, set)) in tx.inputs().iter().zip(sets).enumerate() {
        let chosen: Vec<&PartialSignature> = set
            .ordered_for(&input.script)
            .into_iter()
            .filter(|p| allowed(index, p))
            .take(THRESHOLD)
            .collect();

        if chosen.len() < THRESHOLD {
            return Err(AggregationError::InsufficientSignatures {
                input: index,
                have: chosen.len(),
                need: THRESHOLD,
            });
        }

        let mut script_sig = vec![OP_0];
        for partial in &chosen {
            let mut with_type = partial.signature.clone();
            with_type.push(SIGHASH_ALL);
            push_data(&mut script_sig, &with_type);
        }
        push_data(&mut script_sig, input.script.redeem_script());

        // Self-check: the assembled input must satisfy its own script
        let digest = compute_digest(tx, index)?;
        input
            .script
            .verify_spend(&script_sig, digest.as_bytes())
            .map_err(|e| {
                log::error!("Input {} failed script verification after assembly: {}", index, e);
                AggregationError::SpendVerification {
                    input: index,
                    reason: e.to_string(),
                }
            })?;

        signers.push(chosen.iter().map(|p| p.authority).collect());
        script_sigs.push(script_sig);
    }

    let refs: Vec<&[u8]> = script_sigs.iter().map(|s| s.as_slice()).collect();
    let raw = tx.encode(&refs);
    let txid = Txid::from_raw_tx(&raw);

    Ok(FinalizedTransaction {
        unsigned: tx.clone(),
        script_sigs,
        signers,
        raw,
        txid,
    })
}
