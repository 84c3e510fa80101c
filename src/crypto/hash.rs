//! Hashing utilities
//!
//! Provides the SHA-256 based digests Bitcoin uses for transaction ids,
//! signature hashes and script hashes, plus Base58Check.

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors produced while decoding Base58Check strings
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Base58Error {
    #[error("Invalid base58 encoding")]
    InvalidEncoding,
    #[error("Payload too short: {0} bytes")]
    TooShort(usize),
    #[error("Checksum mismatch")]
    BadChecksum,
}

/// Computes SHA-256 hash of the input data
pub fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// Computes SHA-256 hash and returns it as a hex string
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Computes double SHA-256 hash (SHA-256 of SHA-256)
/// Used for transaction ids and legacy signature hashes
pub fn double_sha256(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    second.into()
}

/// RIPEMD160(SHA256(data)), the hash committed to by P2SH and P2PKH scripts
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let mut ripemd = Ripemd160::new();
    ripemd.update(Sha256::digest(data));
    ripemd.finalize().into()
}

/// Base58Check encode `version || payload || checksum`
pub fn base58check_encode(version: u8, payload: &[u8]) -> String {
    let mut bytes = Vec::with_capacity(1 + payload.len() + 4);
    bytes.push(version);
    bytes.extend_from_slice(payload);

    // Checksum is the first 4 bytes of double SHA256
    let checksum = double_sha256(&bytes);
    bytes.extend_from_slice(&checksum[..4]);

    bs58::encode(bytes).into_string()
}

/// Decode a Base58Check string into `(version, payload)`
pub fn base58check_decode(encoded: &str) -> Result<(u8, Vec<u8>), Base58Error> {
    let bytes = bs58::decode(encoded)
        .into_vec()
        .map_err(|_| Base58Error::InvalidEncoding)?;

    if bytes.len() < 5 {
        return Err(Base58Error::TooShort(bytes.len()));
    }

    let (body, checksum) = bytes.split_at(bytes.len() - 4);
    if double_sha256(body)[..4] != *checksum {
        return Err(Base58Error::BadChecksum);
    }

    Ok((body[0], body[1..].to_vec()))
}
