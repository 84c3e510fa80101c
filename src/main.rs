//! Barq CLI Application
//!
//! Command-line interface for the 2-of-3 multisig coordinator.

use barq_multisig::cli::{self, AppState};
use barq_multisig::config::Config;
use barq_multisig::script::Network;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "barq")]
#[command(author = "Darshan")]
#[command(version = "0.1.0")]
#[command(about = "2-of-3 Bitcoin multisig coordinator for hardware and software signers", long_about = None)]
struct Cli {
    /// Configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Data directory, overrides the configured wallet directory
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Wallet operations
    Wallet {
        #[command(subcommand)]
        action: WalletCommands,
    },

    /// Transaction operations
    Tx {
        #[command(subcommand)]
        action: TxCommands,
    },

    /// Run an end-to-end flow with simulated devices
    Demo {
        /// Network used for addresses
        #[arg(short, long, default_value = "regtest")]
        network: Network,
    },
}

#[derive(Subcommand)]
enum WalletCommands {
    /// Create a wallet from three compressed public keys (hex)
    Create {
        /// Wallet name
        #[arg(short, long)]
        name: String,

        #[arg(long)]
        hardware_a: String,

        #[arg(long)]
        hardware_b: String,

        #[arg(long)]
        software_key: String,
    },

    /// Show a wallet
    Show {
        /// Wallet name
        name: String,
    },

    /// List all wallets
    List,
}

#[derive(Subcommand)]
enum TxCommands {
    /// Build an unsigned transaction
    Create {
        /// Wallet to spend from
        #[arg(short, long)]
        wallet: String,

        /// Recipient address
        #[arg(short, long)]
        to: String,

        /// Amount in satoshis
        #[arg(short, long)]
        amount: u64,

        /// Fee rate in sat/vB
        #[arg(short, long)]
        fee_rate: Option<f64>,
    },

    /// Show a proposal and its signatures
    Show {
        /// Proposal id
        id: String,
    },

    /// Sign with the software key
    Sign {
        /// Proposal id
        id: String,

        /// Environment variable holding the private key (hex)
        #[arg(long, default_value = "BARQ_SOFTWARE_KEY")]
        key_env: String,
    },

    /// Import partial signatures from a JSON file
    Import {
        /// Proposal id
        id: String,

        /// File containing a JSON array of partial signatures
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Assemble the signed transaction
    Finalize {
        /// Proposal id
        id: String,
    },

    /// Finalize if needed and submit to the network
    Broadcast {
        /// Proposal id
        id: String,
    },

    /// Follow a broadcast transaction until it confirms
    Track {
        /// Transaction id
        txid: String,
    },

    /// Show the stored lifecycle of a transaction
    Status {
        /// Transaction id
        txid: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.wallet_dir = dir;
    }
    if let Some(level) = cli.log_level {
        config.log_level = level.to_lowercase();
    }
    config.validate()?;

    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.log_level.as_str()))
        .init();

    let rt = tokio::runtime::Runtime::new()?;

    if let Commands::Demo { network } = cli.command {
        return rt.block_on(cli::cmd_demo(network));
    }

    let state = AppState::new(config)?;

    match cli.command {
        Commands::Demo { .. } => unreachable!(),

        Commands::Wallet { action } => match action {
            WalletCommands::Create {
                name,
                hardware_a,
                hardware_b,
                software_key,
            } => cli::cmd_wallet_create(&state, &name, &hardware_a, &hardware_b, &software_key)?,
            WalletCommands::Show { name } => cli::cmd_wallet_show(&state, &name)?,
            WalletCommands::List => cli::cmd_wallet_list(&state)?,
        },

        Commands::Tx { action } => match action {
            TxCommands::Create {
                wallet,
                to,
                amount,
                fee_rate,
            } => rt.block_on(cli::cmd_tx_create(&state, &wallet, &to, amount, fee_rate))?,
            TxCommands::Show { id } => cli::cmd_tx_show(&state, &id)?,
            TxCommands::Sign { id, key_env } => rt.block_on(cli::cmd_tx_sign(&state, &id, &key_env))?,
            TxCommands::Import { id, file } => cli::cmd_tx_import(&state, &id, &file)?,
            TxCommands::Finalize { id } => cli::cmd_tx_finalize(&state, &id)?,
            TxCommands::Broadcast { id } => rt.block_on(cli::cmd_tx_broadcast(&state, &id))?,
            TxCommands::Track { txid } => rt.block_on(cli::cmd_tx_track(&state, &txid))?,
            TxCommands::Status { txid } => cli::cmd_tx_status(&state, &txid)?,
        },
    }

    Ok(())
}
