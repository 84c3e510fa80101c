//! Signing session for one unsigned transaction
//!
//! Digests are computed once when the session starts. Signature checks run
//! without any lock held; only the duplicate check and the insert happen
//! inside the per-input mutex, so two submissions for the same input are
//! serialized while different inputs proceed independently.

use super::finalize::{self, FinalizedTransaction};
use super::partial::{Insert, PartialSignature, SignatureSet};
use super::AggregationError;
use crate::device::{AuthorityId, AuthorityKeys, SignRequest};
use crate::provider::Broadcaster;
use crate::script::THRESHOLD;
use crate::tx::{compute_digest, BuilderStage, SigningDigest, Txid, UnsignedTransaction};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct SignatureAggregator {
    tx: Arc<UnsignedTransaction>,
    template_id: String,
    authorities: AuthorityKeys,
    digests: Vec<SigningDigest>,
    sets: Vec<Mutex<SignatureSet>>,
    finalized: Mutex<Option<Arc<FinalizedTransaction>>>,
    submitted: Mutex<Option<Txid>>,
}

impl SignatureAggregator {
    /// Start a session; every authority key must appear in every input's
    /// script
    pub fn new(tx: UnsignedTransaction, authorities: AuthorityKeys) -> Result<Self, AggregationError> {
        for (index, input) in tx.inputs().iter().enumerate() {
            for (authority, key) in &authorities {
                if !input.script.keys().contains(key) {
                    return Err(AggregationError::AuthorityNotInScript {
                        input: index,
                        authority: *authority,
                    });
                }
            }
        }

        let digests = (0..tx.inputs().len())
            .map(|i| compute_digest(&tx, i))
            .collect::<Result<Vec<_>, _>>()?;
        let sets = (0..tx.inputs().len())
            .map(|_| Mutex::new(SignatureSet::new()))
            .collect();

        Ok(Self {
            template_id: tx.template_id(),
            tx: Arc::new(tx),
            authorities,
            digests,
            sets,
            finalized: Mutex::new(None),
            submitted: Mutex::new(None),
        })
    }

    /// Rebuild a session from stored signatures, verifying each again
    pub fn restore(
        tx: UnsignedTransaction,
        authorities: AuthorityKeys,
        partials: impl IntoIterator<Item = PartialSignature>,
    ) -> Result<Self, AggregationError> {
        let session = Self::new(tx, authorities)?;
        let mut restored = 0;
        for partial in partials {
            if session.collect_signature(partial)? == Insert::Added {
                restored += 1;
            }
        }
        log::info!("Restored {} signature(s) for {}", restored, session.template_id);
        Ok(session)
    }

    pub fn transaction(&self) -> &Arc<UnsignedTransaction> {
        &self.tx
    }

    pub fn template_id(&self) -> &str {
        &self.template_id
    }

    pub fn authorities(&self) -> &AuthorityKeys {
        &self.authorities
    }

    pub fn digest(&self, input_index: usize) -> Result<SigningDigest, AggregationError> {
        self.digests
            .get(input_index)
            .copied()
            .ok_or(AggregationError::InputIndexOutOfRange {
                index: input_index,
                inputs: self.digests.len(),
            })
    }

    /// Request to hand to a device for `input_index`
    pub fn sign_request(&self, input_index: usize) -> Result<SignRequest, AggregationError> {
        Ok(SignRequest {
            template_id: self.template_id.clone(),
            input_index,
            digest: self.digest(input_index)?,
        })
    }

    /// Verify a partial signature and add it to its input's set
    pub fn collect_signature(&self, partial: PartialSignature) -> Result<Insert, AggregationError> {
        let input = partial.input_index;
        let authority = partial.authority;
        let digest = self.digest(input)?;

        let expected = self
            .authorities
            .get(&authority)
            .ok_or(AggregationError::UnknownAuthority(authority))?;
        if partial.public_key != *expected {
            log::error!(
                "Rejected signature for input {} from {}: key not bound to authority",
                input,
                authority
            );
            return Err(AggregationError::AuthorityKeyMismatch { input, authority });
        }

        if !partial.verify(&digest) {
            log::error!(
                "Rejected invalid signature for input {} from {} (digest {})",
                input,
                authority,
                digest
            );
            return Err(AggregationError::InvalidSignature { input, authority });
        }

        let outcome = lock(&self.sets[input]).insert(partial);
        match &outcome {
            Ok(Insert::Added) => {
                log::info!("Accepted signature for input {} from {}", input, authority)
            }
            Ok(Insert::AlreadyPresent) => {
                log::debug!("Signature for input {} from {} already present", input, authority)
            }
            Err(e) => log::error!("{}", e),
        }

        if matches!(outcome, Ok(Insert::Added)) && lock(&self.finalized).is_some() {
            log::info!("Signature from {} arrived after finalization; output unchanged", authority);
        }
        outcome
    }

    /// Snapshot of one input's signatures
    pub fn signature_set(&self, input_index: usize) -> Result<SignatureSet, AggregationError> {
        self.sets
            .get(input_index)
            .map(|set| lock(set).clone())
            .ok_or(AggregationError::InputIndexOutOfRange {
                index: input_index,
                inputs: self.sets.len(),
            })
    }

    pub fn signature_sets(&self) -> Vec<SignatureSet> {
        self.sets.iter().map(|set| lock(set).clone()).collect()
    }

    /// Every accepted signature, input by input
    pub fn partial_signatures(&self) -> Vec<PartialSignature> {
        self.signature_sets()
            .into_iter()
            .flat_map(|set| set.iter().cloned().collect::<Vec<_>>())
            .collect()
    }

    /// Whether `authority` has signed every input
    pub fn signed_by(&self, authority: AuthorityId) -> bool {
        self.sets.iter().all(|set| lock(set).get(authority).is_some())
    }

    /// Whether every input has enough signatures
    pub fn is_complete(&self) -> bool {
        self.sets.iter().all(|set| lock(set).len() >= THRESHOLD)
    }

    pub fn stage(&self) -> BuilderStage {
        if lock(&self.submitted).is_some() {
            return BuilderStage::Submitted;
        }
        if lock(&self.finalized).is_some() {
            return BuilderStage::Finalized;
        }

        let count: usize = self.sets.iter().map(|set| lock(set).len()).sum();
        if count == 0 {
            BuilderStage::Built
        } else {
            BuilderStage::PartiallySigned(count)
        }
    }

    /// Produce the finalized transaction
    ///
    /// The first successful call fixes the result; later calls return the
    /// same value even if more signatures have arrived since.
    pub fn finalize(&self) -> Result<Arc<FinalizedTransaction>, AggregationError> {
        let mut slot = lock(&self.finalized);
        if let Some(done) = slot.as_ref() {
            return Ok(Arc::clone(done));
        }

        let finalized = Arc::new(finalize::finalize(&self.tx, &self.signature_sets())?);
        log::info!(
            "Finalized {} as txid {} ({} bytes)",
            self.template_id,
            finalized.txid(),
            finalized.raw().len()
        );
        *slot = Some(Arc::clone(&finalized));
        Ok(finalized)
    }

    /// Build a new finalized value from a chosen pair of authorities
    pub fn finalize_with(
        &self,
        authorities: [AuthorityId; THRESHOLD],
    ) -> Result<FinalizedTransaction, AggregationError> {
        finalize::finalize_with(&self.tx, &self.signature_sets(), authorities)
    }

    /// Re-establish a finalization made by an earlier session
    ///
    /// `signers` are the per-input authorities recorded from that
    /// finalization. The rebuilt value becomes what [`finalize`](Self::finalize)
    /// returns, so signatures collected since cannot change it. If this
    /// session already finalized, its value is kept.
    pub fn restore_finalized(
        &self,
        signers: &[Vec<AuthorityId>],
    ) -> Result<Arc<FinalizedTransaction>, AggregationError> {
        let mut slot = lock(&self.finalized);
        if let Some(done) = slot.as_ref() {
            return Ok(Arc::clone(done));
        }

        let finalized = Arc::new(finalize::finalize_as(&self.tx, &self.signature_sets(), signers)?);
        log::debug!("Restored finalization of {} as {}", self.template_id, finalized.txid());
        *slot = Some(Arc::clone(&finalized));
        Ok(finalized)
    }

    pub fn finalized(&self) -> Option<Arc<FinalizedTransaction>> {
        lock(&self.finalized).clone()
    }

    /// Submit through `broadcaster`
    ///
    /// A network failure leaves the session unchanged; the call can be
    /// repeated with the same transaction.
    pub async fn broadcast(
        &self,
        finalized: &FinalizedTransaction,
        broadcaster: &dyn Broadcaster,
    ) -> Result<Txid, AggregationError> {
        if finalized.unsigned() != self.tx.as_ref() {
            return Err(AggregationError::TemplateMismatch);
        }

        let reported = broadcaster.submit(finalized.raw()).await.map_err(|e| {
            log::warn!("Broadcast of {} failed: {}", finalized.txid(), e);
            e
        })?;
        if reported != finalized.txid() {
            log::warn!(
                "Broadcaster reported txid {} for {}",
                reported,
                finalized.txid()
            );
        }

        *lock(&self.submitted) = Some(finalized.txid());
        log::info!("Broadcast {}", finalized.txid());
        Ok(finalized.txid())
    }
}

impl std::fmt::Debug for SignatureAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureAggregator")
            .field("template_id", &self.template_id)
            .field("stage", &self.stage())
            .finish_non_exhaustive()
    }
}
