//! Barq: a 2-of-3 Bitcoin multisig coordinator in Rust
//!
//! This crate coordinates spending from a P2SH 2-of-3 multisig address whose
//! keys live on heterogeneous signers:
//! - Deterministic redeem script and address derivation
//! - Unsigned transaction construction with fee estimation and change
//! - Hardware and software signing devices behind one trait
//! - Concurrent signature collection, verification and finalization
//! - Broadcast and confirmation tracking with an append-only event log
//! - JSON persistence for wallets, proposals and lifecycle records
//!
//! # Example
//!
//! ```rust
//! use barq_multisig::crypto::KeyPair;
//! use barq_multisig::script::{derive, Network};
//!
//! let keys: Vec<Vec<u8>> = (0..3)
//!     .map(|_| KeyPair::generate().public_key.serialize().to_vec())
//!     .collect();
//! let script = derive(&keys, Network::Testnet).unwrap();
//! assert!(script.address().starts_with('2'));
//! ```

pub mod cli;
pub mod config;
pub mod crypto;
pub mod device;
pub mod encoding;
pub mod error;
pub mod monitor;
pub mod provider;
pub mod script;
pub mod signing;
pub mod storage;
pub mod tx;
pub mod wallet;

#[cfg(test)]
mod scenarios;

// Re-export commonly used types
pub use config::Config;
pub use crypto::KeyPair;
pub use device::{AuthorityId, AuthorityKeys, DeviceError, SigningDevice};
pub use error::ErrorCategory;
pub use monitor::{LifecycleMonitor, LifecycleState, TransactionRecord};
pub use script::{derive, Network, ThresholdScript};
pub use signing::{FinalizedTransaction, PartialSignature, SignatureAggregator, SigningCoordinator};
pub use tx::{FeeRate, TransactionBuilder, UnsignedTransaction};
pub use wallet::WalletRecord;
