//! Persistence of wallets, signing proposals and transaction records
//!
//! Wallet records are written once. Transaction records may only be
//! replaced by a record whose event log extends the stored one.

pub mod memory;
pub mod persistence;
pub mod proposal;

pub use memory::MemoryStore;
pub use persistence::{JsonStore, StorageConfig};
pub use proposal::SigningProposal;

use crate::error::ErrorCategory;
use crate::monitor::TransactionRecord;
use crate::signing::FinalizedTransaction;
use crate::tx::Txid;
use crate::wallet::WalletRecord;
use std::io;
use thiserror::Error;

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Already exists: {0}")]
    AlreadyExists(String),
    #[error("Event log of {0} would be rewritten")]
    LogRewrite(Txid),
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl StorageError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            StorageError::IoError(_) => ErrorCategory::Resource,
            StorageError::NotFound(_) | StorageError::AlreadyExists(_) => ErrorCategory::Validation,
            StorageError::SerializationError(_)
            | StorageError::LogRewrite(_)
            | StorageError::InvalidData(_) => ErrorCategory::Integrity,
        }
    }
}

pub trait WalletStore: Send + Sync {
    /// Store a new wallet; fails if the name is taken
    fn create_wallet(&self, wallet: &WalletRecord) -> Result<(), StorageError>;

    fn load_wallet(&self, name: &str) -> Result<WalletRecord, StorageError>;

    fn list_wallets(&self) -> Result<Vec<String>, StorageError>;
}

pub trait ProposalStore: Send + Sync {
    /// Insert or replace a proposal
    fn save_proposal(&self, proposal: &SigningProposal) -> Result<(), StorageError>;

    fn load_proposal(&self, id: &str) -> Result<SigningProposal, StorageError>;
}

pub trait TransactionStore: Send + Sync {
    /// Store finalized bytes under their txid; storing the same
    /// transaction again is a no-op
    fn save_finalized(&self, tx: &FinalizedTransaction) -> Result<(), StorageError>;

    fn load_finalized(&self, txid: &Txid) -> Result<FinalizedTransaction, StorageError>;

    /// Store a record, rejecting any write that drops or alters logged
    /// events
    fn save_record(&self, record: &TransactionRecord) -> Result<(), StorageError>;

    fn load_record(&self, txid: &Txid) -> Result<TransactionRecord, StorageError>;
}

/// Shared write checks for transaction records
pub(crate) fn check_record_update(
    stored: Option<&TransactionRecord>,
    incoming: &TransactionRecord,
) -> Result<(), StorageError> {
    match stored {
        Some(old) if !incoming.events().extends(old.events()) => {
            log::error!("Refusing to rewrite event log of {}", incoming.txid());
            Err(StorageError::LogRewrite(incoming.txid()))
        }
        _ => Ok(()),
    }
}

/// Shared write check for finalized transactions
pub(crate) fn check_finalized_update(
    stored: Option<&FinalizedTransaction>,
    incoming: &FinalizedTransaction,
) -> Result<bool, StorageError> {
    match stored {
        None => Ok(true),
        Some(old) if old.raw() == incoming.raw() => Ok(false),
        Some(_) => Err(StorageError::AlreadyExists(incoming.txid().to_string())),
    }
}
