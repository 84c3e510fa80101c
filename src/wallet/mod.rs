//! Wallet records binding authorities to the threshold script

pub mod wallet;

pub use wallet::{WalletError, WalletRecord};
