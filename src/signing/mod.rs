//! Signature collection, finalization and device orchestration

pub mod aggregator;
pub mod coordinator;
pub mod finalize;
pub mod partial;

pub use aggregator::SignatureAggregator;
pub use coordinator::{SigningCoordinator, SigningError};
pub use finalize::{finalize, finalize_as, finalize_with, FinalizedTransaction};
pub use partial::{Insert, PartialSignature, SignatureSet};

use crate::device::AuthorityId;
use crate::error::ErrorCategory;
use crate::provider::ProviderError;
use crate::tx::BuildError;
use thiserror::Error;

/// Errors from collecting signatures and finalizing
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AggregationError {
    #[error("Input index {index} out of range ({inputs} inputs)")]
    InputIndexOutOfRange { index: usize, inputs: usize },
    #[error("Authority {0} is not part of this wallet")]
    UnknownAuthority(AuthorityId),
    #[error("Signature for input {input} from {authority} carries a key not bound to that authority")]
    AuthorityKeyMismatch { input: usize, authority: AuthorityId },
    #[error("Key of {authority} does not appear in the script of input {input}")]
    AuthorityNotInScript { input: usize, authority: AuthorityId },
    #[error("Invalid signature for input {input} from {authority}")]
    InvalidSignature { input: usize, authority: AuthorityId },
    #[error("Conflicting signature for input {input} from {authority}")]
    DuplicateAuthorityConflict { input: usize, authority: AuthorityId },
    #[error("Insufficient signatures for input {input}: have {have}, need {need}")]
    InsufficientSignatures { input: usize, have: usize, need: usize },
    #[error("Assembled input {input} does not satisfy its script: {reason}")]
    SpendVerification { input: usize, reason: String },
    #[error("Finalized transaction belongs to a different template")]
    TemplateMismatch,
    #[error("Build error: {0}")]
    Build(#[from] BuildError),
    #[error("Broadcast failed: {0}")]
    Broadcast(#[from] ProviderError),
}

impl AggregationError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            AggregationError::InputIndexOutOfRange { .. } | AggregationError::UnknownAuthority(_) => {
                ErrorCategory::Validation
            }
            AggregationError::InsufficientSignatures { .. } => ErrorCategory::Resource,
            AggregationError::Build(e) => e.category(),
            AggregationError::Broadcast(e) => e.category(),
            _ => ErrorCategory::Integrity,
        }
    }
}
