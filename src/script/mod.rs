//! Threshold script model
//!
//! Builds the 2-of-3 `OP_CHECKMULTISIG` redeem script from three ordered
//! public keys and derives the P2SH receiving address. Everything here is
//! pure: identical inputs always produce byte-identical output.
//!
//! # Example
//!
//! ```ignore
//! use barq_multisig::script::{derive, Network};
//!
//! let script = derive(&[key_a, key_b, key_c], Network::Testnet)?;
//! println!("Deposit address: {}", script.address());
//! ```

pub mod address;
pub mod interpreter;
pub mod opcodes;
pub mod threshold;

pub use address::{Address, AddressKind, Network};
pub use interpreter::verify_multisig_spend;
pub use threshold::{derive, PublicKeyTriple, ScriptError, ThresholdScript, THRESHOLD, TOTAL_KEYS};
