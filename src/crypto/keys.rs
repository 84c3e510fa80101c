//! ECDSA key management
//!
//! Key pairs, public-key parsing and DER signatures over 32-byte digests
//! using the secp256k1 curve.

use rand::rngs::OsRng;
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use thiserror::Error;

/// Length of a compressed SEC1 public key
pub const COMPRESSED_KEY_LEN: usize = 33;

/// Errors that can occur during key operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("Invalid private key")]
    InvalidPrivateKey,
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),
    #[error("Invalid signature encoding")]
    InvalidSignature,
    #[error("Digest must be 32 bytes, got {0}")]
    InvalidDigest(usize),
}

/// A key pair consisting of a private key and its corresponding public key
#[derive(Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key_hex())
            .finish_non_exhaustive()
    }
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret_key, public_key) = secp.generate_keypair(&mut OsRng);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create a key pair from an existing secret key
    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let secp = Secp256k1::new();
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create a key pair from a hex-encoded private key
    pub fn from_private_key_hex(hex_key: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_key.trim()).map_err(|_| KeyError::InvalidPrivateKey)?;
        let secret_key =
            SecretKey::from_slice(&bytes).map_err(|_| KeyError::InvalidPrivateKey)?;
        Ok(Self::from_secret_key(secret_key))
    }

    /// Get the public key as a hex string (compressed format)
    pub fn public_key_hex(&self) -> String {
        public_key_hex(&self.public_key)
    }

    /// Sign a 32-byte digest, returning a DER-encoded low-S signature
    pub fn sign(&self, digest: &[u8]) -> Result<Vec<u8>, KeyError> {
        sign_digest(&self.secret_key, digest)
    }
}

/// Hex encoding of a compressed public key
pub fn public_key_hex(public_key: &PublicKey) -> String {
    hex::encode(public_key.serialize())
}

/// Parse a compressed public key, rejecting anything that is not a valid
/// 33-byte curve point encoding
pub fn parse_public_key(bytes: &[u8]) -> Result<PublicKey, KeyError> {
    if bytes.len() != COMPRESSED_KEY_LEN {
        return Err(KeyError::InvalidPublicKey(format!(
            "expected {} bytes, got {}",
            COMPRESSED_KEY_LEN,
            bytes.len()
        )));
    }
    PublicKey::from_slice(bytes).map_err(|e| KeyError::InvalidPublicKey(e.to_string()))
}

/// Sign a 32-byte digest with a secret key (RFC 6979 nonces, DER output)
pub fn sign_digest(secret_key: &SecretKey, digest: &[u8]) -> Result<Vec<u8>, KeyError> {
    let secp = Secp256k1::signing_only();
    let message =
        Message::from_digest_slice(digest).map_err(|_| KeyError::InvalidDigest(digest.len()))?;
    let signature = secp.sign_ecdsa(&message, secret_key);
    Ok(signature.serialize_der().to_vec())
}

/// Verify a DER signature over a 32-byte digest
///
/// Returns `Ok(false)` for a well-formed signature that does not verify and
/// `Err` when the inputs cannot be parsed at all. High-S signatures fail.
pub fn verify_digest(
    public_key: &PublicKey,
    digest: &[u8],
    signature_der: &[u8],
) -> Result<bool, KeyError> {
    let secp = Secp256k1::verification_only();
    let message =
        Message::from_digest_slice(digest).map_err(|_| KeyError::InvalidDigest(digest.len()))?;
    let signature = Signature::from_der(signature_der).map_err(|_| KeyError::InvalidSignature)?;

    Ok(secp.verify_ecdsa(&message, &signature, public_key).is_ok())
}
