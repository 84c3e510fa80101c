//! Transaction construction for a threshold wallet

use super::fee::{FeePolicy, FeeRate, TxSize};
use super::selection::select_inputs;
use super::transaction::{TxInput, TxOutput, UnsignedTransaction, Utxo, SEQUENCE_FINAL};
use super::BuildError;
use crate::script::ThresholdScript;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Progress of a single transaction through building and signing
///
/// A signing session only exists for a built template, so
/// `SignatureAggregator::stage` starts at `Built`; `Draft` names the time
/// before `create_transaction` succeeds and is never reported by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuilderStage {
    /// Outputs chosen, no template yet
    Draft,
    /// Template frozen, no signatures
    Built,
    PartiallySigned(usize),
    Finalized,
    Submitted,
}

impl fmt::Display for BuilderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuilderStage::Draft => write!(f, "draft"),
            BuilderStage::Built => write!(f, "built"),
            BuilderStage::PartiallySigned(n) => write!(f, "partially signed ({})", n),
            BuilderStage::Finalized => write!(f, "finalized"),
            BuilderStage::Submitted => write!(f, "submitted"),
        }
    }
}

/// Builds unsigned transactions spending outputs locked to one threshold
/// script
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    script: ThresholdScript,
    policy: FeePolicy,
}

impl TransactionBuilder {
    pub fn new(script: ThresholdScript, policy: FeePolicy) -> Self {
        Self { script, policy }
    }

    pub fn script(&self) -> &ThresholdScript {
        &self.script
    }

    pub fn policy(&self) -> &FeePolicy {
        &self.policy
    }

    /// Fee for a transaction of `size` at `rate`
    pub fn estimate_fee(&self, size: TxSize, rate: FeeRate) -> Result<u64, BuildError> {
        Ok(self.policy.estimate_fee(size, rate)?)
    }

    /// Select inputs from `utxos` and build the template
    ///
    /// UTXOs not locked to this wallet's script are skipped. Change goes back
    /// to the wallet's own script and is appended after the caller's outputs.
    pub fn create_transaction(
        &self,
        utxos: &[Utxo],
        outputs: Vec<TxOutput>,
        fee_rate: FeeRate,
    ) -> Result<UnsignedTransaction, BuildError> {
        if outputs.is_empty() {
            return Err(BuildError::NoOutputs);
        }
        if let Some(pos) = outputs.iter().position(|o| o.value == 0) {
            return Err(BuildError::InvalidTemplate(format!("output {} has zero value", pos)));
        }

        let spendable: Vec<Utxo> = utxos
            .iter()
            .filter(|u| {
                let ours = u.script_pubkey == self.script.script_pubkey();
                if !ours {
                    log::warn!("Skipping UTXO {} not locked to {}", u.outpoint, self.script.address());
                }
                ours
            })
            .cloned()
            .collect();

        let selection = select_inputs(
            &spendable,
            &outputs,
            fee_rate,
            &self.policy,
            self.script.script_pubkey().len(),
        )?;

        let inputs: Vec<TxInput> = selection
            .inputs
            .iter()
            .map(|u| TxInput {
                previous_output: u.outpoint,
                value: u.value,
                script: self.script.clone(),
                sequence: SEQUENCE_FINAL,
            })
            .collect();

        let mut outputs = outputs;
        if let Some(change) = selection.change {
            outputs.push(TxOutput {
                value: change,
                script_pubkey: self.script.script_pubkey().to_vec(),
            });
        }

        let tx = UnsignedTransaction::new(inputs, outputs, selection.fee)?;
        log::info!(
            "Built transaction {} with {} input(s), {} output(s), fee {} sat",
            tx.template_id(),
            tx.inputs().len(),
            tx.outputs().len(),
            tx.fee()
        );
        Ok(tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx::transaction::tests::sample_script;
    use crate::tx::transaction::{OutPoint, Txid};

    fn wallet_utxo(script: &ThresholdScript, seed: u8, value: u64) -> Utxo {
        Utxo {
            outpoint: OutPoint {
                txid: Txid::from_internal([seed; 32]),
                vout: 0,
            },
            value,
            script_pubkey: script.script_pubkey().to_vec(),
        }
    }

    fn pay(value: u64) -> Vec<TxOutput> {
        vec![TxOutput {
            value,
            script_pubkey: vec![0x76; 25],
        }]
    }

    #[test]
    fn test_create_without_change() {
        let script = sample_script();
        let builder = TransactionBuilder::new(script.clone(), FeePolicy::default());

        let tx = builder
            .create_transaction(&[wallet_utxo(&script, 1, 100_000)], pay(95_000), FeeRate::from_sat_per_vb(14))
            .unwrap();

        assert_eq!(tx.fee(), 5_000);
        assert_eq!(tx.outputs().len(), 1);
        assert_eq!(tx.total_input(), tx.total_output() + tx.fee());
    }

    #[test]
    fn test_create_with_change() {
        let script = sample_script();
        let builder = TransactionBuilder::new(script.clone(), FeePolicy::default());

        let tx = builder
            .create_transaction(&[wallet_utxo(&script, 1, 200_000)], pay(95_000), FeeRate::from_sat_per_vb(10))
            .unwrap();

        assert_eq!(tx.outputs().len(), 2);
        assert_eq!(tx.outputs()[1].script_pubkey, script.script_pubkey());
        // 375 vbytes at 10 sat/vB
        assert_eq!(tx.fee(), 3_750);
        assert_eq!(tx.total_input(), tx.total_output() + tx.fee());
    }

    #[test]
    fn test_foreign_utxos_ignored() {
        let script = sample_script();
        let other = sample_script();
        let builder = TransactionBuilder::new(script, FeePolicy::default());

        let result = builder.create_transaction(
            &[wallet_utxo(&other, 1, 1_000_000)],
            pay(10_000),
            FeeRate::from_sat_per_vb(1),
        );
        assert!(matches!(result, Err(BuildError::InsufficientFunds { available: 0, .. })));
    }

    #[test]
    fn test_no_outputs() {
        let script = sample_script();
        let builder = TransactionBuilder::new(script.clone(), FeePolicy::default());
        let result = builder.create_transaction(&[wallet_utxo(&script, 1, 10_000)], vec![], FeeRate::from_sat_per_vb(1));
        assert!(matches!(result, Err(BuildError::NoOutputs)));
    }

    #[test]
    fn test_same_utxos_same_transaction() {
        let script = sample_script();
        let builder = TransactionBuilder::new(script.clone(), FeePolicy::default());
        let mut utxos = vec![
            wallet_utxo(&script, 3, 40_000),
            wallet_utxo(&script, 1, 40_000),
            wallet_utxo(&script, 2, 70_000),
        ];

        let a = builder.create_transaction(&utxos, pay(90_000), FeeRate::from_sat_per_vb(5)).unwrap();
        utxos.reverse();
        let b = builder.create_transaction(&utxos, pay(90_000), FeeRate::from_sat_per_vb(5)).unwrap();

        assert_eq!(a, b);
        assert_eq!(a.inputs()[1].previous_output.txid, Txid::from_internal([1; 32]));
    }
}
