//! Transaction construction
//!
//! Input selection, fee arithmetic, the immutable unsigned template and the
//! one function that computes signing digests.

pub mod builder;
pub mod fee;
pub mod selection;
pub mod sighash;
pub mod transaction;

pub use builder::{BuilderStage, TransactionBuilder};
pub use fee::{FeeError, FeePolicy, FeeRate, TxSize};
pub use selection::{select_inputs, Selection};
pub use sighash::{compute_digest, SigningDigest};
pub use transaction::{OutPoint, TxInput, TxOutput, Txid, UnsignedTransaction, Utxo};

use crate::error::ErrorCategory;
use crate::script::ScriptError;
use thiserror::Error;

/// Errors from building a transaction
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("Insufficient funds: available {available} sat, required {required} sat")]
    InsufficientFunds { available: u64, required: u64 },
    #[error("Fee error: {0}")]
    Fee(#[from] FeeError),
    #[error("Transaction has no outputs")]
    NoOutputs,
    #[error("Invalid transaction template: {0}")]
    InvalidTemplate(String),
    #[error("Script error: {0}")]
    Script(#[from] ScriptError),
    #[error("Input index {index} out of range ({inputs} inputs)")]
    InputIndexOutOfRange { index: usize, inputs: usize },
}

impl BuildError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            BuildError::InsufficientFunds { .. } => ErrorCategory::Resource,
            _ => ErrorCategory::Validation,
        }
    }
}
