//! Networks and Base58Check addresses
//!
//! Destination addresses are parsed into their output script; the wallet's
//! own address is always P2SH.

use super::opcodes::{OP_CHECKSIG, OP_DUP, OP_EQUAL, OP_EQUALVERIFY, OP_HASH160};
use super::threshold::ScriptError;
use crate::crypto::{base58check_decode, base58check_encode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Bitcoin network the wallet operates on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    #[default]
    Testnet,
    Regtest,
}

impl Network {
    /// Version byte of P2PKH addresses
    pub fn p2pkh_version(&self) -> u8 {
        match self {
            Network::Mainnet => 0x00,
            Network::Testnet | Network::Regtest => 0x6f,
        }
    }

    /// Version byte of P2SH addresses (`3...` on mainnet, `2...` elsewhere)
    pub fn p2sh_version(&self) -> u8 {
        match self {
            Network::Mainnet => 0x05,
            Network::Testnet | Network::Regtest => 0xc4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Regtest => "regtest",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = ScriptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" | "main" | "bitcoin" => Ok(Network::Mainnet),
            "testnet" | "test" => Ok(Network::Testnet),
            "regtest" => Ok(Network::Regtest),
            other => Err(ScriptError::InvalidAddress(format!("unknown network '{}'", other))),
        }
    }
}

/// Kind of payment an address commits to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressKind {
    /// Pay to public key hash
    P2pkh,
    /// Pay to script hash
    P2sh,
}

/// A decoded Base58Check address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub network: Network,
    pub kind: AddressKind,
    pub hash: [u8; 20],
}

impl Address {
    /// P2SH address committing to a script hash
    pub fn p2sh(hash: [u8; 20], network: Network) -> Self {
        Self {
            network,
            kind: AddressKind::P2sh,
            hash,
        }
    }

    /// Parse an address, requiring it to belong to `network`
    ///
    /// Regtest shares testnet version bytes, so either is accepted for both.
    pub fn parse(encoded: &str, network: Network) -> Result<Self, ScriptError> {
        let (version, payload) = base58check_decode(encoded)
            .map_err(|e| ScriptError::InvalidAddress(format!("{}: {}", encoded, e)))?;

        if payload.len() != 20 {
            return Err(ScriptError::InvalidAddress(format!(
                "{}: payload is {} bytes",
                encoded,
                payload.len()
            )));
        }

        let kind = if version == network.p2pkh_version() {
            AddressKind::P2pkh
        } else if version == network.p2sh_version() {
            AddressKind::P2sh
        } else {
            return Err(ScriptError::UnsupportedAddressVersion(version));
        };

        let mut hash = [0u8; 20];
        hash.copy_from_slice(&payload);

        Ok(Self {
            network,
            kind,
            hash,
        })
    }

    /// The output script paying to this address
    pub fn script_pubkey(&self) -> Vec<u8> {
        match self.kind {
            AddressKind::P2pkh => {
                let mut script = vec![OP_DUP, OP_HASH160, 20];
                script.extend_from_slice(&self.hash);
                script.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
                script
            }
            AddressKind::P2sh => {
                let mut script = vec![OP_HASH160, 20];
                script.extend_from_slice(&self.hash);
                script.push(OP_EQUAL);
                script
            }
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let version = match self.kind {
            AddressKind::P2pkh => self.network.p2pkh_version(),
            AddressKind::P2sh => self.network.p2sh_version(),
        };
        f.write_str(&base58check_encode(version, &self.hash))
    }
}
