//! End-to-end flows across wallet, builder, devices, aggregator and monitor

use crate::crypto::{base58check_encode, hash160, KeyPair};
use crate::device::simulated::{SimBehavior, SimulatedTransport};
use crate::device::{AuthorityId, AuthorityKeys, HardwareDevice, SigningDevice, SoftwareSigner};
use crate::monitor::{LifecycleMonitor, LifecycleState, MonitorConfig, TransactionRecord};
use crate::provider::{InMemoryChain, ScriptedStatusProvider, TxStatus, UtxoProvider};
use crate::script::{derive, Network};
use crate::signing::{AggregationError, Insert, PartialSignature, SignatureAggregator, SigningCoordinator};
use crate::tx::{
    BuildError, BuilderStage, FeePolicy, FeeRate, OutPoint, TransactionBuilder, TxOutput, TxSize, Txid,
    UnsignedTransaction, Utxo,
};
use crate::wallet::WalletRecord;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const NETWORK: Network = Network::Regtest;

struct Signers {
    hardware_a: KeyPair,
    hardware_b: KeyPair,
    software: KeyPair,
}

impl Signers {
    fn generate() -> Self {
        Self {
            hardware_a: KeyPair::generate(),
            hardware_b: KeyPair::generate(),
            software: KeyPair::generate(),
        }
    }

    fn authorities(&self) -> AuthorityKeys {
        [
            (AuthorityId::HardwareA, self.hardware_a.public_key),
            (AuthorityId::HardwareB, self.hardware_b.public_key),
            (AuthorityId::SoftwareKey, self.software.public_key),
        ]
        .into_iter()
        .collect()
    }

    fn key(&self, authority: AuthorityId) -> &KeyPair {
        match authority {
            AuthorityId::HardwareA => &self.hardware_a,
            AuthorityId::HardwareB => &self.hardware_b,
            AuthorityId::SoftwareKey => &self.software,
        }
    }

    fn sign(&self, session: &SignatureAggregator, authority: AuthorityId, input: usize) -> PartialSignature {
        let key = self.key(authority);
        let digest = session.digest(input).unwrap();
        PartialSignature::new(authority, input, key.sign(digest.as_bytes()).unwrap(), key.public_key)
    }
}

fn payee() -> String {
    let key = KeyPair::generate().public_key.serialize();
    base58check_encode(NETWORK.p2pkh_version(), &hash160(&key))
}

fn funding(wallet: &WalletRecord, seed: u8, value: u64) -> Utxo {
    Utxo {
        outpoint: OutPoint {
            txid: Txid::from_internal([seed; 32]),
            vout: 0,
        },
        value,
        script_pubkey: wallet.script().script_pubkey().to_vec(),
    }
}

// Rate at which a one-input, one-P2PKH-output spend costs exactly 5,000
fn five_thousand_rate() -> FeeRate {
    FeeRate::from_sat_per_kvb(14_577)
}

fn spend_95k(wallet: &WalletRecord) -> UnsignedTransaction {
    let builder = TransactionBuilder::new(wallet.script().clone(), FeePolicy::default());
    let output = TxOutput::to_address(&payee(), 95_000, NETWORK).unwrap();
    builder
        .create_transaction(&[funding(wallet, 1, 100_000)], vec![output], five_thousand_rate())
        .unwrap()
}

#[test]
fn test_derive_is_deterministic() {
    let keys: Vec<Vec<u8>> = (0..3)
        .map(|_| KeyPair::generate().public_key.serialize().to_vec())
        .collect();

    let first = derive(&keys, NETWORK).unwrap();
    let second = derive(&keys, NETWORK).unwrap();
    assert_eq!(first.redeem_script(), second.redeem_script());
    assert_eq!(first.address(), second.address());

    let mut reversed = keys.clone();
    reversed.reverse();
    assert_eq!(derive(&reversed, NETWORK).unwrap().address(), first.address());
}

#[test]
fn test_two_of_three_spend() {
    let signers = Signers::generate();
    let wallet = WalletRecord::create("savings", signers.authorities(), NETWORK).unwrap();

    let policy = FeePolicy::default();
    assert_eq!(policy.estimate_fee(TxSize::estimate(1, [25]), five_thousand_rate()).unwrap(), 5_000);

    let tx = spend_95k(&wallet);
    assert_eq!(tx.fee(), 5_000);
    assert_eq!(tx.outputs().len(), 1);

    let session = SignatureAggregator::new(tx, wallet.authorities().clone()).unwrap();
    session
        .collect_signature(signers.sign(&session, AuthorityId::HardwareB, 0))
        .unwrap();
    session
        .collect_signature(signers.sign(&session, AuthorityId::SoftwareKey, 0))
        .unwrap();

    let finalized = session.finalize().unwrap();
    let digest = session.digest(0).unwrap();
    wallet
        .script()
        .verify_spend(&finalized.script_sigs()[0], digest.as_bytes())
        .unwrap();

    // Late third signature: stored, output unchanged
    let late = session
        .collect_signature(signers.sign(&session, AuthorityId::HardwareA, 0))
        .unwrap();
    assert_eq!(late, Insert::Added);
    assert_eq!(session.signature_set(0).unwrap().len(), 3);

    let again = session.finalize().unwrap();
    assert!(Arc::ptr_eq(&finalized, &again));
    assert_eq!(again.raw(), finalized.raw());
}

#[test]
fn test_single_signer_cannot_finalize() {
    let signers = Signers::generate();
    let wallet = WalletRecord::create("savings", signers.authorities(), NETWORK).unwrap();
    let session = SignatureAggregator::new(spend_95k(&wallet), wallet.authorities().clone()).unwrap();

    session
        .collect_signature(signers.sign(&session, AuthorityId::HardwareA, 0))
        .unwrap();

    assert!(matches!(
        session.finalize(),
        Err(AggregationError::InsufficientSignatures { input: 0, have: 1, need: 2 })
    ));
    assert_eq!(session.stage(), BuilderStage::PartiallySigned(1));
}

#[test]
fn test_insufficient_funds() {
    let signers = Signers::generate();
    let wallet = WalletRecord::create("savings", signers.authorities(), NETWORK).unwrap();
    let builder = TransactionBuilder::new(wallet.script().clone(), FeePolicy::default());

    let utxos = vec![funding(&wallet, 1, 60_000), funding(&wallet, 2, 40_000)];
    let output = TxOutput::to_address(&payee(), 145_000, NETWORK).unwrap();
    let result = builder.create_transaction(&utxos, vec![output], FeeRate::from_sat_per_vb(10));

    assert!(matches!(
        result,
        Err(BuildError::InsufficientFunds { available: 100_000, required }) if required > 145_000
    ));
}

#[test]
fn test_signature_order_follows_script_for_every_pair() {
    let signers = Signers::generate();
    let wallet = WalletRecord::create("savings", signers.authorities(), NETWORK).unwrap();

    let pairs = [
        [AuthorityId::HardwareA, AuthorityId::HardwareB],
        [AuthorityId::HardwareB, AuthorityId::SoftwareKey],
        [AuthorityId::SoftwareKey, AuthorityId::HardwareA],
    ];
    for pair in pairs {
        let session = SignatureAggregator::new(spend_95k(&wallet), wallet.authorities().clone()).unwrap();
        // Collect in reverse so arrival order never matches script order by accident
        for authority in pair.iter().rev() {
            session.collect_signature(signers.sign(&session, *authority, 0)).unwrap();
        }

        let finalized = session.finalize().unwrap();
        let digest = session.digest(0).unwrap();
        wallet
            .script()
            .verify_spend(&finalized.script_sigs()[0], digest.as_bytes())
            .unwrap();
    }
}

#[tokio::test]
async fn test_devices_sign_and_chain_confirms() {
    let signers = Signers::generate();
    let wallet = WalletRecord::create("ops", signers.authorities(), NETWORK).unwrap();

    let chain = Arc::new(InMemoryChain::new());
    chain.fund(wallet.address(), funding(&wallet, 7, 100_000));

    let builder = TransactionBuilder::new(wallet.script().clone(), FeePolicy::default());
    let utxos = chain.list_unspent(wallet.address()).await.unwrap();
    let output = TxOutput::to_address(&payee(), 95_000, NETWORK).unwrap();
    let tx = builder
        .create_transaction(&utxos, vec![output], five_thousand_rate())
        .unwrap();

    let devices: Vec<Arc<dyn SigningDevice>> = vec![
        Arc::new(
            HardwareDevice::new(
                AuthorityId::HardwareA,
                Arc::new(SimulatedTransport::new(
                    signers.hardware_a.clone(),
                    SimBehavior::ApproveAfter(Duration::from_millis(20)),
                )),
            )
            .with_poll_interval(Duration::from_millis(5)),
        ),
        Arc::new(HardwareDevice::new(
            AuthorityId::HardwareB,
            Arc::new(SimulatedTransport::new(signers.hardware_b.clone(), SimBehavior::Disconnected)),
        )),
        Arc::new(SoftwareSigner::new(signers.software.clone())),
    ];

    let session = SignatureAggregator::new(tx, wallet.authorities().clone()).unwrap();
    let results = SigningCoordinator::new(Duration::from_secs(5))
        .sign_concurrently(&session, &devices, &CancellationToken::new())
        .await;

    let failed: Vec<AuthorityId> = results
        .iter()
        .filter(|(_, r)| r.is_err())
        .map(|(a, _)| *a)
        .collect();
    assert_eq!(failed, vec![AuthorityId::HardwareB]);
    assert!(session.is_complete());

    let finalized = session.finalize().unwrap();
    let mut used = finalized.signers(0).unwrap().to_vec();
    used.sort();
    assert_eq!(used, vec![AuthorityId::HardwareA, AuthorityId::SoftwareKey]);

    let txid = session.broadcast(&finalized, chain.as_ref()).await.unwrap();
    assert_eq!(chain.submitted(), vec![txid]);
}

#[tokio::test]
async fn test_monitor_walks_to_confirmed() {
    let provider = Arc::new(ScriptedStatusProvider::new([
        Ok(TxStatus::mempool()),
        Ok(TxStatus::confirmed(1)),
        Ok(TxStatus::confirmed(3)),
        Ok(TxStatus::confirmed(6)),
    ]));
    let monitor = LifecycleMonitor::new(
        provider,
        MonitorConfig {
            poll_interval: Duration::from_millis(5),
            confirmation_threshold: 6,
            propagation_timeout: Duration::from_secs(60),
        },
    );

    let mut record = TransactionRecord::new(Txid::from_internal([9; 32]), 6);
    monitor.submitted(&mut record).unwrap();
    let record = monitor.track(record, CancellationToken::new()).await.unwrap();

    let path: Vec<LifecycleState> = std::iter::once(LifecycleState::Created)
        .chain(record.events().iter().map(|e| e.to.clone()))
        .collect();
    assert_eq!(
        path,
        vec![
            LifecycleState::Created,
            LifecycleState::Broadcast,
            LifecycleState::InMempool,
            LifecycleState::Confirming(1),
            LifecycleState::Confirming(3),
            LifecycleState::Confirmed,
        ]
    );
    assert_eq!(record.events().len(), 5);
}
