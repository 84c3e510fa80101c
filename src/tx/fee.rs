//! Fee arithmetic
//!
//! Rates are held in satoshis per 1000 virtual bytes so sub-sat/vB rates
//! survive without floating point. Sizes are worst-case estimates for a
//! fully signed 2-of-3 P2SH spend, so the fee never ends up below the rate
//! the caller asked for.

use crate::encoding::varint_len;
use crate::error::ErrorCategory;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Outpoint (36) + scriptSig length (3) + scriptSig (256) + sequence (4)
///
/// scriptSig: `OP_0` + 2 × (push + 72-byte DER + sighash byte) +
/// `OP_PUSHDATA1 <105>` + the 105-byte redeem script.
pub const MULTISIG_INPUT_VSIZE: usize = 36 + 3 + 256 + 4;

/// Version (4) + locktime (4)
const TX_OVERHEAD: usize = 8;

/// Default sanity ceiling (sat/vB)
pub const DEFAULT_MAX_FEE_RATE: u64 = 1_000;

/// Default dust threshold for change outputs (satoshis)
pub const DEFAULT_DUST_LIMIT: u64 = 546;

// =============================================================================
// Errors
// =============================================================================

/// Fee calculation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeeError {
    #[error("Invalid fee rate {rate}: must be positive and at most {ceiling}")]
    InvalidFeeRate { rate: FeeRate, ceiling: FeeRate },
    #[error("Fee overflow for size {0} vbytes")]
    Overflow(usize),
}

impl FeeError {
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::Validation
    }
}

// =============================================================================
// Fee Rate
// =============================================================================

/// Fee rate in satoshis per 1000 virtual bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FeeRate(u64);

impl FeeRate {
    pub const ZERO: FeeRate = FeeRate(0);

    /// Create from satoshis per virtual byte
    pub fn from_sat_per_vb(rate: u64) -> Self {
        Self(rate.saturating_mul(1000))
    }

    /// Create from satoshis per 1000 virtual bytes
    pub fn from_sat_per_kvb(rate: u64) -> Self {
        Self(rate)
    }

    /// Create from a fractional sat/vB value (block explorer estimates)
    pub fn from_sat_per_vb_f64(rate: f64) -> Self {
        if rate.is_finite() && rate > 0.0 {
            Self((rate * 1000.0).ceil() as u64)
        } else {
            Self::ZERO
        }
    }

    pub fn as_sat_per_kvb(&self) -> u64 {
        self.0
    }

    pub fn as_sat_per_vb_f64(&self) -> f64 {
        self.0 as f64 / 1000.0
    }
}

impl fmt::Display for FeeRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3} sat/vB", self.as_sat_per_vb_f64())
    }
}

// =============================================================================
// Size Estimation
// =============================================================================

/// Estimated virtual size of a signed transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TxSize(pub usize);

impl TxSize {
    /// Size of a signed transaction spending `inputs` threshold outputs and
    /// paying to outputs with the given script lengths
    pub fn estimate(inputs: usize, output_script_lens: impl IntoIterator<Item = usize>) -> Self {
        let mut outputs = 0usize;
        let mut output_bytes = 0usize;
        for len in output_script_lens {
            outputs += 1;
            output_bytes += 8 + varint_len(len as u64) + len;
        }

        Self(
            TX_OVERHEAD
                + varint_len(inputs as u64)
                + inputs * MULTISIG_INPUT_VSIZE
                + varint_len(outputs as u64)
                + output_bytes,
        )
    }

    pub fn vbytes(&self) -> usize {
        self.0
    }
}

// =============================================================================
// Fee Policy
// =============================================================================

/// Fee limits applied to every transaction the wallet builds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeePolicy {
    /// Sanity ceiling; guards against a misplaced decimal in configuration
    pub max_fee_rate: FeeRate,
    /// Change below this is added to the fee instead of creating an output
    pub dust_limit: u64,
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self {
            max_fee_rate: FeeRate::from_sat_per_vb(DEFAULT_MAX_FEE_RATE),
            dust_limit: DEFAULT_DUST_LIMIT,
        }
    }
}

impl FeePolicy {
    /// Reject zero rates and rates above the ceiling
    pub fn validate_rate(&self, rate: FeeRate) -> Result<(), FeeError> {
        if rate == FeeRate::ZERO || rate > self.max_fee_rate {
            return Err(FeeError::InvalidFeeRate {
                rate,
                ceiling: self.max_fee_rate,
            });
        }
        Ok(())
    }

    /// Fee for `size` at `rate`, rounded up to the next satoshi
    pub fn estimate_fee(&self, size: TxSize, rate: FeeRate) -> Result<u64, FeeError> {
        self.validate_rate(rate)?;

        let millis = (size.0 as u64)
            .checked_mul(rate.0)
            .ok_or(FeeError::Overflow(size.0))?;
        Ok(millis.div_ceil(1000))
    }
}
