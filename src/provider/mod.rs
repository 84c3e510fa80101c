//! External chain collaborators
//!
//! The core reaches the Bitcoin network only through these traits: listing
//! unspent outputs, submitting raw transactions, reading transaction status
//! and (optionally) a fee-rate estimate.

pub mod esplora;
pub mod memory;

pub use esplora::EsploraClient;
pub use memory::{InMemoryChain, ScriptedStatusProvider};

use crate::error::ErrorCategory;
use crate::tx::{FeeRate, Txid, Utxo};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported by providers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Rejected by network: {0}")]
    Rejected(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ProviderError::Network(_) => ErrorCategory::Network,
            ProviderError::NotFound(_) => ErrorCategory::Resource,
            ProviderError::Rejected(_) => ErrorCategory::Validation,
            ProviderError::InvalidResponse(_) => ErrorCategory::Integrity,
        }
    }
}

/// Status of a transaction as seen by a block explorer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TxStatus {
    pub in_mempool: bool,
    pub confirmations: u32,
    pub block_height: Option<u64>,
}

impl TxStatus {
    pub fn mempool() -> Self {
        Self {
            in_mempool: true,
            confirmations: 0,
            block_height: None,
        }
    }

    pub fn confirmed(confirmations: u32) -> Self {
        Self {
            in_mempool: false,
            confirmations,
            block_height: None,
        }
    }
}

#[async_trait]
pub trait UtxoProvider: Send + Sync {
    async fn list_unspent(&self, address: &str) -> Result<Vec<Utxo>, ProviderError>;
}

#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Submit serialized transaction bytes, returning the txid the network
    /// reports
    async fn submit(&self, raw: &[u8]) -> Result<Txid, ProviderError>;
}

#[async_trait]
pub trait StatusProvider: Send + Sync {
    async fn get_status(&self, txid: &Txid) -> Result<TxStatus, ProviderError>;
}

#[async_trait]
pub trait FeeRateSource: Send + Sync {
    /// Rate expected to confirm within `target_blocks`
    async fn fee_rate(&self, target_blocks: u16) -> Result<FeeRate, ProviderError>;
}

/// Fee source returning one configured rate
#[derive(Debug, Clone, Copy)]
pub struct FixedFeeRate(pub FeeRate);

#[async_trait]
impl FeeRateSource for FixedFeeRate {
    async fn fee_rate(&self, _target_blocks: u16) -> Result<FeeRate, ProviderError> {
        Ok(self.0)
    }
}
