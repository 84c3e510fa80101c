//! JSON file persistence
//!
//! One file per object under a data directory. Writes go to a temporary
//! file first and are moved into place with an atomic rename.

use super::{
    check_finalized_update, check_record_update, ProposalStore, SigningProposal, StorageError,
    TransactionStore, WalletStore,
};
use crate::monitor::TransactionRecord;
use crate::signing::FinalizedTransaction;
use crate::tx::Txid;
use crate::wallet::WalletRecord;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const WALLETS_DIR: &str = "wallets";
const PROPOSALS_DIR: &str = "proposals";
const TRANSACTIONS_DIR: &str = "transactions";
const RECORDS_DIR: &str = "records";

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".barq"),
        }
    }
}

/// File-backed store
pub struct JsonStore {
    config: StorageConfig,
    // Serializes check-then-write sequences within this process
    write_lock: Mutex<()>,
}

impl JsonStore {
    /// Create a new store, creating its directories
    pub fn new(config: StorageConfig) -> Result<Self, StorageError> {
        for dir in [WALLETS_DIR, PROPOSALS_DIR, TRANSACTIONS_DIR, RECORDS_DIR] {
            fs::create_dir_all(config.data_dir.join(dir))?;
        }
        Ok(Self {
            config,
            write_lock: Mutex::new(()),
        })
    }

    /// Create with default configuration
    pub fn with_defaults() -> Result<Self, StorageError> {
        Self::new(StorageConfig::default())
    }

    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    fn path(&self, dir: &str, name: &str) -> Result<PathBuf, StorageError> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
            && !name.starts_with('.');
        if !valid {
            return Err(StorageError::InvalidData(format!("invalid object name {:?}", name)));
        }
        Ok(self.config.data_dir.join(dir).join(format!("{}.json", name)))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Write `value` to `path` via a temporary file and rename
fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let temp_path = path.with_extension("tmp");
    let file = fs::File::create(&temp_path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    drop(writer);

    fs::rename(&temp_path, path)?;
    Ok(())
}

/// Read a JSON object, `Ok(None)` if the file does not exist
fn read_optional<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StorageError> {
    if !path.exists() {
        return Ok(None);
    }
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);
    Ok(Some(serde_json::from_reader(reader)?))
}

fn read_required<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T, StorageError> {
    read_optional(path)?.ok_or_else(|| StorageError::NotFound(what.to_string()))
}

impl WalletStore for JsonStore {
    fn create_wallet(&self, wallet: &WalletRecord) -> Result<(), StorageError> {
        let path = self.path(WALLETS_DIR, &wallet.name)?;
        let _guard = self.lock();
        if path.exists() {
            return Err(StorageError::AlreadyExists(format!("wallet {}", wallet.name)));
        }
        write_atomic(&path, wallet)?;
        log::info!("Saved wallet {} to {}", wallet.name, path.display());
        Ok(())
    }

    fn load_wallet(&self, name: &str) -> Result<WalletRecord, StorageError> {
        let wallet: WalletRecord = read_required(&self.path(WALLETS_DIR, name)?, &format!("wallet {}", name))?;
        wallet
            .validate()
            .map_err(|e| StorageError::InvalidData(format!("wallet {}: {}", name, e)))?;
        Ok(wallet)
    }

    fn list_wallets(&self) -> Result<Vec<String>, StorageError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(self.config.data_dir.join(WALLETS_DIR))? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

impl ProposalStore for JsonStore {
    fn save_proposal(&self, proposal: &SigningProposal) -> Result<(), StorageError> {
        let path = self.path(PROPOSALS_DIR, &proposal.id)?;
        let _guard = self.lock();
        write_atomic(&path, proposal)
    }

    fn load_proposal(&self, id: &str) -> Result<SigningProposal, StorageError> {
        read_required(&self.path(PROPOSALS_DIR, id)?, &format!("proposal {}", id))
    }
}

impl TransactionStore for JsonStore {
    fn save_finalized(&self, tx: &FinalizedTransaction) -> Result<(), StorageError> {
        let path = self.path(TRANSACTIONS_DIR, &tx.txid().to_string())?;
        let _guard = self.lock();
        let stored: Option<FinalizedTransaction> = read_optional(&path)?;
        if check_finalized_update(stored.as_ref(), tx)? {
            write_atomic(&path, tx)?;
        }
        Ok(())
    }

    fn load_finalized(&self, txid: &Txid) -> Result<FinalizedTransaction, StorageError> {
        read_required(
            &self.path(TRANSACTIONS_DIR, &txid.to_string())?,
            &format!("transaction {}", txid),
        )
    }

    fn save_record(&self, record: &TransactionRecord) -> Result<(), StorageError> {
        let path = self.path(RECORDS_DIR, &record.txid().to_string())?;
        let _guard = self.lock();
        let stored: Option<TransactionRecord> = read_optional(&path)?;
        check_record_update(stored.as_ref(), record)?;
        write_atomic(&path, record)
    }

    fn load_record(&self, txid: &Txid) -> Result<TransactionRecord, StorageError> {
        read_required(
            &self.path(RECORDS_DIR, &txid.to_string())?,
            &format!("record {}", txid),
        )
    }
}
