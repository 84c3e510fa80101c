//! CLI commands for the multisig wallet
//!
//! Implements all command handlers for the CLI interface.

use crate::config::Config;
use crate::crypto::{base58check_encode, hash160, parse_public_key, public_key_hex, KeyPair};
use crate::device::simulated::{SimBehavior, SimulatedTransport};
use crate::device::{AuthorityId, AuthorityKeys, DeviceRegistry, HardwareDevice, SigningDevice, SoftwareSigner};
use crate::monitor::{LifecycleMonitor, MonitorConfig, TransactionRecord};
use crate::provider::{Broadcaster, FeeRateSource, FixedFeeRate, InMemoryChain, StatusProvider, UtxoProvider};
use crate::script::Network;
use crate::signing::{PartialSignature, SignatureAggregator, SigningCoordinator};
use crate::storage::{JsonStore, ProposalStore, SigningProposal, StorageConfig, TransactionStore, WalletStore};
use crate::tx::{FeeRate, OutPoint, TransactionBuilder, TxOutput, Txid, Utxo};
use crate::wallet::WalletRecord;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use secp256k1::PublicKey;
use tokio_util::sync::CancellationToken;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Application state
pub struct AppState {
    pub config: Config,
    pub store: Arc<JsonStore>,
}

impl AppState {
    /// Initialize application state
    pub fn new(config: Config) -> CliResult<Self> {
        let store = JsonStore::new(StorageConfig {
            data_dir: config.wallet_dir.clone(),
        })?;
        Ok(Self {
            config,
            store: Arc::new(store),
        })
    }

    fn load_session(&self, proposal_id: &str) -> CliResult<(WalletRecord, SigningProposal, SignatureAggregator)> {
        let proposal = self.store.load_proposal(proposal_id)?;
        let wallet = self.store.load_wallet(&proposal.wallet)?;
        let session = proposal.resume(wallet.authorities().clone())?;
        Ok((wallet, proposal, session))
    }
}

// =============================================================================
// Wallet Commands
// =============================================================================

/// Create a wallet from one public key per authority
pub fn cmd_wallet_create(
    state: &AppState,
    name: &str,
    hardware_a: &str,
    hardware_b: &str,
    software_key: &str,
) -> CliResult<()> {
    let mut keys = AuthorityKeys::new();
    keys.insert(AuthorityId::HardwareA, parse_key_arg(hardware_a)?);
    keys.insert(AuthorityId::HardwareB, parse_key_arg(hardware_b)?);
    keys.insert(AuthorityId::SoftwareKey, parse_key_arg(software_key)?);

    let wallet = WalletRecord::create(name, keys, state.config.network)?;
    state.store.create_wallet(&wallet)?;

    println!("✅ Wallet created!");
    print_wallet(&wallet);
    Ok(())
}

/// Show a stored wallet
pub fn cmd_wallet_show(state: &AppState, name: &str) -> CliResult<()> {
    let wallet = state.store.load_wallet(name)?;
    print_wallet(&wallet);
    Ok(())
}

/// List stored wallets
pub fn cmd_wallet_list(state: &AppState) -> CliResult<()> {
    let names = state.store.list_wallets()?;
    if names.is_empty() {
        println!("📭 No wallets found");
        return Ok(());
    }

    println!("📋 Wallets ({}):", names.len());
    for name in names {
        let wallet = state.store.load_wallet(&name)?;
        println!("   {} → {}", name, wallet.address());
    }
    Ok(())
}

fn parse_key_arg(hex_key: &str) -> CliResult<PublicKey> {
    let bytes = hex::decode(hex_key.trim())?;
    Ok(parse_public_key(&bytes)?)
}

fn print_wallet(wallet: &WalletRecord) {
    println!("   📛 Name: {}", wallet.name);
    println!("   🌐 Network: {}", wallet.network());
    println!("   🔐 Policy: {}", wallet.script().description());
    println!("   📬 Address: {}", wallet.address());
    println!("   🕐 Created: {}", wallet.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    println!("   🔑 Keys (script order):");
    for (position, key) in wallet.script().keys().keys().iter().enumerate() {
        let authority = wallet
            .authority_at(position)
            .map(|a| a.to_string())
            .unwrap_or_else(|| "?".into());
        println!("      {}. {} ({})", position + 1, public_key_hex(key), authority);
    }
}

// =============================================================================
// Transaction Commands
// =============================================================================

/// Build an unsigned transaction paying `amount` to `to`
pub async fn cmd_tx_create(
    state: &AppState,
    wallet_name: &str,
    to: &str,
    amount: u64,
    fee_rate: Option<f64>,
) -> CliResult<()> {
    let wallet = state.store.load_wallet(wallet_name)?;
    let client = state.config.esplora();
    let rate = match fee_rate {
        Some(rate) => FeeRate::from_sat_per_vb_f64(rate),
        None => resolve_fee_rate(&client, state.config.default_fee_rate()).await,
    };
    println!("⛽ Fee rate: {}", rate);

    let utxos = client.list_unspent(wallet.address()).await?;
    println!("🔎 Found {} UTXO(s) for {}", utxos.len(), wallet.address());

    let builder = TransactionBuilder::new(wallet.script().clone(), state.config.fee_policy());
    let output = TxOutput::to_address(to, amount, wallet.network())?;
    let tx = builder.create_transaction(&utxos, vec![output], rate)?;

    let proposal = SigningProposal::new(&wallet.name, tx);
    state.store.save_proposal(&proposal)?;

    println!("✅ Transaction created!");
    print_proposal(&proposal);
    Ok(())
}

/// Rate for confirmation within six blocks, or `fallback` when the source
/// is unavailable
async fn resolve_fee_rate(source: &dyn FeeRateSource, fallback: FeeRate) -> FeeRate {
    match source.fee_rate(6).await {
        Ok(rate) => rate,
        Err(e) => {
            log::warn!("Fee estimate unavailable ({}), using {}", e, fallback);
            fallback
        }
    }
}

/// Show a proposal with its digests and collected signatures
pub fn cmd_tx_show(state: &AppState, proposal_id: &str) -> CliResult<()> {
    let (_, proposal, session) = state.load_session(proposal_id)?;
    print_proposal(&proposal);
    println!("   📍 Stage: {}", session.stage());
    for input in 0..proposal.unsigned.inputs().len() {
        let set = session.signature_set(input)?;
        let signers: Vec<String> = set.authorities().map(|a| a.to_string()).collect();
        println!(
            "   ✍️  Input {}: digest {} signed by [{}]",
            input,
            session.digest(input)?,
            signers.join(", ")
        );
    }
    Ok(())
}

fn print_proposal(proposal: &SigningProposal) {
    let tx = &proposal.unsigned;
    println!("   🆔 Proposal: {}", proposal.id);
    println!("   👛 Wallet: {}", proposal.wallet);
    println!("   📥 Inputs: {} ({} sat)", tx.inputs().len(), tx.total_input());
    for output in tx.outputs() {
        println!("   📤 Output: {} sat → {}", output.value, hex::encode(&output.script_pubkey));
    }
    println!("   💸 Fee: {} sat", tx.fee());
}

/// Sign every input with the software key read from `key_env`
pub async fn cmd_tx_sign(state: &AppState, proposal_id: &str, key_env: &str) -> CliResult<()> {
    let secret = std::env::var(key_env)
        .map_err(|_| format!("environment variable {} is not set", key_env))?;
    let signer: Arc<dyn SigningDevice> = Arc::new(SoftwareSigner::from_private_key_hex(&secret)?);

    let (wallet, mut proposal, session) = state.load_session(proposal_id)?;
    let mut registry = DeviceRegistry::new();
    registry.register(signer.clone());
    registry.check_identities(wallet.authorities())?;

    let coordinator = SigningCoordinator::new(state.config.signing_timeout());
    let added = coordinator
        .sign_with(&session, signer, &CancellationToken::new())
        .await?;

    proposal.update_from(&session);
    state.store.save_proposal(&proposal)?;
    println!("✅ Added {} signature(s); stage: {}", added, session.stage());
    Ok(())
}

/// Import partial signatures produced elsewhere (JSON array)
pub fn cmd_tx_import(state: &AppState, proposal_id: &str, file: &Path) -> CliResult<()> {
    let partials: Vec<PartialSignature> = serde_json::from_str(&fs::read_to_string(file)?)?;
    let (_, mut proposal, session) = state.load_session(proposal_id)?;

    for partial in partials {
        let authority = partial.authority;
        let input = partial.input_index;
        session.collect_signature(partial)?;
        println!("   ✍️  Accepted signature from {} for input {}", authority, input);
    }

    proposal.update_from(&session);
    state.store.save_proposal(&proposal)?;
    println!("✅ Stage: {}", session.stage());
    Ok(())
}

/// Assemble the signed transaction and store it
pub fn cmd_tx_finalize(state: &AppState, proposal_id: &str) -> CliResult<()> {
    let (_, mut proposal, session) = state.load_session(proposal_id)?;
    let finalized = session.finalize()?;
    state.store.save_finalized(&finalized)?;
    proposal.update_from(&session);
    state.store.save_proposal(&proposal)?;

    println!("✅ Transaction finalized!");
    println!("   🆔 Txid: {}", finalized.txid());
    println!("   📦 Size: {} bytes", finalized.raw().len());
    println!("   🧾 Raw: {}", finalized.raw_hex());
    Ok(())
}

/// Broadcast a finalized proposal and start its lifecycle record
pub async fn cmd_tx_broadcast(state: &AppState, proposal_id: &str) -> CliResult<()> {
    let (_, mut proposal, session) = state.load_session(proposal_id)?;
    let finalized = session.finalize()?;
    state.store.save_finalized(&finalized)?;
    proposal.update_from(&session);
    state.store.save_proposal(&proposal)?;

    let client = state.config.esplora();
    let txid = session.broadcast(&finalized, &client).await?;

    let monitor = LifecycleMonitor::new(Arc::new(client), state.config.monitor_config())
        .with_store(state.store.clone());
    let mut record = TransactionRecord::new(txid, state.config.monitor.confirmation_threshold);
    monitor.submitted(&mut record)?;

    println!("📡 Broadcast {}", txid);
    Ok(())
}

/// Poll until confirmed, failed or interrupted with Ctrl-C
pub async fn cmd_tx_track(state: &AppState, txid: &str) -> CliResult<()> {
    let txid: Txid = txid.parse()?;
    let record = state.store.load_record(&txid)?;

    let monitor = LifecycleMonitor::new(Arc::new(state.config.esplora()), state.config.monitor_config())
        .with_store(state.store.clone());

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let record = monitor.track(record, cancel).await?;
    print_record(&record);
    Ok(())
}

/// Show the stored lifecycle record
pub fn cmd_tx_status(state: &AppState, txid: &str) -> CliResult<()> {
    let txid: Txid = txid.parse()?;
    print_record(&state.store.load_record(&txid)?);
    Ok(())
}

fn print_record(record: &TransactionRecord) {
    println!("   🆔 Txid: {}", record.txid());
    println!("   📍 State: {}", record.state());
    for event in record.events().iter() {
        println!(
            "      {} {} → {}",
            event.at.format("%H:%M:%S"),
            event.from,
            event.to
        );
    }
}

// =============================================================================
// Demo
// =============================================================================

/// End-to-end run against simulated devices and an in-memory chain
pub async fn cmd_demo(network: Network) -> CliResult<()> {
    println!("🧪 Running 2-of-3 demo on {}", network);

    let keys = [KeyPair::generate(), KeyPair::generate(), KeyPair::generate()];
    let authorities: AuthorityKeys = AuthorityId::ALL
        .iter()
        .zip(keys.iter())
        .map(|(a, k)| (*a, k.public_key))
        .collect();
    let wallet = WalletRecord::create("demo", authorities, network)?;
    println!("   📬 Address: {}", wallet.address());

    let chain = Arc::new(InMemoryChain::new());
    chain.fund(
        wallet.address(),
        Utxo {
            outpoint: OutPoint {
                txid: Txid::from_raw_tx(b"demo funding"),
                vout: 0,
            },
            value: 100_000,
            script_pubkey: wallet.script().script_pubkey().to_vec(),
        },
    );

    let builder = TransactionBuilder::new(wallet.script().clone(), Default::default());
    let utxos = chain.list_unspent(wallet.address()).await?;
    let payee = KeyPair::generate().public_key.serialize();
    let payee = base58check_encode(network.p2pkh_version(), &hash160(&payee));
    let destination = TxOutput::to_address(&payee, 95_000, network)?;
    let rate = resolve_fee_rate(&FixedFeeRate(FeeRate::from_sat_per_vb(14)), FeeRate::from_sat_per_vb(10)).await;
    let tx = builder.create_transaction(&utxos, vec![destination], rate)?;
    println!("   💸 Fee: {} sat", tx.fee());

    let [ka, kb, _] = keys;
    let devices: Vec<Arc<dyn SigningDevice>> = vec![
        Arc::new(HardwareDevice::new(
            AuthorityId::HardwareA,
            Arc::new(SimulatedTransport::new(ka, SimBehavior::ApproveAfter(Duration::from_millis(200)))),
        )),
        Arc::new(HardwareDevice::new(
            AuthorityId::HardwareB,
            Arc::new(SimulatedTransport::new(kb, SimBehavior::Approve)),
        )),
    ];

    let session = SignatureAggregator::new(tx, wallet.authorities().clone())?;
    let coordinator = SigningCoordinator::new(Duration::from_secs(10));
    for (authority, result) in coordinator
        .sign_concurrently(&session, &devices, &CancellationToken::new())
        .await
    {
        match result {
            Ok(n) => println!("   ✍️  {} signed {} input(s)", authority, n),
            Err(e) => println!("   ❌ {} failed: {}", authority, e),
        }
    }

    let finalized = session.finalize()?;
    let txid = session.broadcast(&finalized, chain.as_ref() as &dyn Broadcaster).await?;
    println!("   📡 Broadcast {}", txid);

    let monitor = Arc::new(LifecycleMonitor::new(
        chain.clone() as Arc<dyn StatusProvider>,
        MonitorConfig {
            poll_interval: Duration::from_millis(100),
            ..MonitorConfig::default()
        },
    ));
    let mut record = TransactionRecord::new(txid, monitor.config().confirmation_threshold);
    monitor.submitted(&mut record)?;

    let handle = monitor.spawn(record, CancellationToken::new());
    for _ in 0..monitor.config().confirmation_threshold {
        tokio::time::sleep(Duration::from_millis(150)).await;
        chain.mine(1);
    }

    let record = handle.await??;
    print_record(&record);
    Ok(())
}
