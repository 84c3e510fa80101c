//! Persisted signing session
//!
//! Lets signatures be collected over several invocations: the unsigned
//! template plus every signature accepted so far.

use crate::device::{AuthorityId, AuthorityKeys};
use crate::signing::{AggregationError, PartialSignature, SignatureAggregator};
use crate::tx::UnsignedTransaction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningProposal {
    /// Template id of the unsigned transaction
    pub id: String,
    pub wallet: String,
    pub unsigned: UnsignedTransaction,
    pub signatures: Vec<PartialSignature>,
    /// Per-input signers of the finalized transaction, once there is one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalized_signers: Option<Vec<Vec<AuthorityId>>>,
    pub created_at: DateTime<Utc>,
}

impl SigningProposal {
    pub fn new(wallet: &str, unsigned: UnsignedTransaction) -> Self {
        Self {
            id: unsigned.template_id(),
            wallet: wallet.to_string(),
            unsigned,
            signatures: Vec::new(),
            finalized_signers: None,
            created_at: Utc::now(),
        }
    }

    /// Rebuild the signing session, verifying every stored signature
    ///
    /// A proposal that was already finalized resumes finalized with the
    /// same signers, so the transaction it produces never changes.
    pub fn resume(&self, authorities: AuthorityKeys) -> Result<SignatureAggregator, AggregationError> {
        let session = SignatureAggregator::restore(self.unsigned.clone(), authorities, self.signatures.clone())?;
        if let Some(signers) = &self.finalized_signers {
            session.restore_finalized(signers)?;
        }
        Ok(session)
    }

    /// Copy the session's accepted signatures and finalization back into
    /// the proposal
    pub fn update_from(&mut self, session: &SignatureAggregator) {
        self.signatures = session.partial_signatures();
        if let Some(finalized) = session.finalized() {
            self.finalized_signers = Some(finalized.signer_sets().to_vec());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::script::Network;
    use crate::signing::Insert;
    use crate::tx::transaction::tests::sample_input;
    use crate::tx::TxOutput;
    use crate::wallet::WalletRecord;
    use std::collections::BTreeMap;

    struct Setup {
        keys: BTreeMap<AuthorityId, KeyPair>,
        wallet: WalletRecord,
    }

    impl Setup {
        fn new() -> Self {
            let keys: BTreeMap<AuthorityId, KeyPair> =
                AuthorityId::ALL.iter().map(|a| (*a, KeyPair::generate())).collect();
            let authorities: AuthorityKeys = keys.iter().map(|(a, k)| (*a, k.public_key)).collect();
            let wallet = WalletRecord::create("vault", authorities, Network::Regtest).unwrap();
            Self { keys, wallet }
        }

        fn proposal(&self) -> SigningProposal {
            let tx = UnsignedTransaction::new(
                vec![
                    sample_input(self.wallet.script(), 1, 60_000),
                    sample_input(self.wallet.script(), 2, 40_000),
                ],
                vec![TxOutput {
                    value: 95_000,
                    script_pubkey: vec![0x76; 25],
                }],
                5_000,
            )
            .unwrap();
            SigningProposal::new(&self.wallet.name, tx)
        }

        fn resume(&self, proposal: &SigningProposal) -> SignatureAggregator {
            proposal.resume(self.wallet.authorities().clone()).unwrap()
        }

        fn sign_all(&self, session: &SignatureAggregator, authority: AuthorityId) {
            let key = &self.keys[&authority];
            for input in 0..session.transaction().inputs().len() {
                let digest = session.digest(input).unwrap();
                let partial =
                    PartialSignature::new(authority, input, key.sign(digest.as_bytes()).unwrap(), key.public_key);
                assert_eq!(session.collect_signature(partial).unwrap(), Insert::Added);
            }
        }
    }

    // Stored and loaded again, as between two CLI invocations
    fn reload(proposal: &SigningProposal) -> SigningProposal {
        serde_json::from_str(&serde_json::to_string(proposal).unwrap()).unwrap()
    }

    #[test]
    fn test_late_signature_after_resume_keeps_finalized_output() {
        let setup = Setup::new();
        let first = setup.wallet.authority_at(0).unwrap();
        let second = setup.wallet.authority_at(1).unwrap();
        let third = setup.wallet.authority_at(2).unwrap();

        // Two authorities that are not first in script order sign
        let mut proposal = setup.proposal();
        let session = setup.resume(&proposal);
        setup.sign_all(&session, second);
        setup.sign_all(&session, third);
        proposal.update_from(&session);
        let mut proposal = reload(&proposal);

        // Finalize
        let session = setup.resume(&proposal);
        let finalized = session.finalize().unwrap();
        proposal.update_from(&session);
        let mut proposal = reload(&proposal);
        assert_eq!(
            proposal.finalized_signers,
            Some(vec![vec![second, third], vec![second, third]])
        );

        // The first-in-order authority signs late
        let session = setup.resume(&proposal);
        setup.sign_all(&session, first);
        proposal.update_from(&session);
        let proposal = reload(&proposal);
        assert_eq!(proposal.signatures.len(), 6);

        // Broadcast resumes and finalizes again
        let session = setup.resume(&proposal);
        let again = session.finalize().unwrap();
        assert_eq!(again.txid(), finalized.txid());
        assert_eq!(again.raw(), finalized.raw());
    }

    #[test]
    fn test_unfinalized_proposal_resumes_open() {
        let setup = Setup::new();
        let mut proposal = setup.proposal();
        let session = setup.resume(&proposal);
        for authority in AuthorityId::ALL {
            setup.sign_all(&session, authority);
        }
        proposal.update_from(&session);

        let json = serde_json::to_string(&proposal).unwrap();
        assert!(!json.contains("finalized_signers"));

        let session = setup.resume(&reload(&proposal));
        assert!(session.finalized().is_none());

        let finalized = session.finalize().unwrap();
        let first = setup.wallet.authority_at(0).unwrap();
        let second = setup.wallet.authority_at(1).unwrap();
        assert_eq!(finalized.signers(0), Some(&[first, second][..]));
    }
}
