//! Cryptographic utilities for the wallet
//!
//! This module provides:
//! - SHA-256, double SHA-256 and HASH160 digests
//! - Base58Check encoding used for addresses
//! - ECDSA key handling and DER signatures (secp256k1)

pub mod hash;
pub mod keys;

pub use hash::{base58check_decode, base58check_encode, double_sha256, hash160, sha256, sha256_hex};
pub use keys::{
    parse_public_key, public_key_hex, sign_digest, verify_digest, KeyError, KeyPair,
};
