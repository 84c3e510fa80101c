//! Deterministic input selection
//!
//! Candidates are ordered by value descending, then txid ascending, then
//! vout ascending. The smallest number of inputs is found by taking the `k`
//! largest for increasing `k`: fee depends only on the input count, and the
//! `k` largest outputs have the greatest sum of any `k`-subset, so if any
//! subset of size `k` covers the target this one does.

use super::fee::{FeePolicy, FeeRate, TxSize};
use super::transaction::{Utxo, TxOutput};
use super::BuildError;
use std::cmp::Ordering;
use std::collections::HashSet;

/// Result of input selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Chosen inputs in canonical order
    pub inputs: Vec<Utxo>,
    /// Change value, if an output back to the wallet is warranted
    pub change: Option<u64>,
    /// Fee actually paid (includes absorbed dust change)
    pub fee: u64,
}

/// Canonical candidate order
pub fn canonical_order(a: &Utxo, b: &Utxo) -> Ordering {
    b.value
        .cmp(&a.value)
        .then_with(|| a.outpoint.txid.cmp(&b.outpoint.txid))
        .then_with(|| a.outpoint.vout.cmp(&b.outpoint.vout))
}

/// Pick inputs covering `outputs` plus fee at `rate`
///
/// `change_script_len` is the length of the script a change output would
/// pay to. Duplicate outpoints in `utxos` are ignored.
pub fn select_inputs(
    utxos: &[Utxo],
    outputs: &[TxOutput],
    rate: FeeRate,
    policy: &FeePolicy,
    change_script_len: usize,
) -> Result<Selection, BuildError> {
    policy.validate_rate(rate)?;

    let mut seen = HashSet::new();
    let mut candidates: Vec<Utxo> = utxos
        .iter()
        .filter(|u| seen.insert(u.outpoint))
        .cloned()
        .collect();
    candidates.sort_by(canonical_order);

    let target: u64 = outputs.iter().map(|o| o.value).sum();
    let output_lens: Vec<usize> = outputs.iter().map(|o| o.script_pubkey.len()).collect();
    let with_change_lens: Vec<usize> = output_lens
        .iter()
        .copied()
        .chain(std::iter::once(change_script_len))
        .collect();

    let mut available = 0u64;
    for count in 1..=candidates.len() {
        available = available.saturating_add(candidates[count - 1].value);

        let fee_no_change =
            policy.estimate_fee(TxSize::estimate(count, output_lens.iter().copied()), rate)?;
        if available < target.saturating_add(fee_no_change) {
            continue;
        }

        let fee_with_change =
            policy.estimate_fee(TxSize::estimate(count, with_change_lens.iter().copied()), rate)?;
        let change = available
            .checked_sub(target.saturating_add(fee_with_change))
            .filter(|c| *c >= policy.dust_limit);

        let fee = match change {
            Some(c) => available - target - c,
            None => available - target,
        };

        return Ok(Selection {
            inputs: candidates[..count].to_vec(),
            change,
            fee,
        });
    }

    let required = target.saturating_add(policy.estimate_fee(
        TxSize::estimate(candidates.len().max(1), output_lens.iter().copied()),
        rate,
    )?);

    Err(BuildError::InsufficientFunds {
        available,
        required,
    })
}
