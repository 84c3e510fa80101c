//! In-memory store for tests

use super::{
    check_finalized_update, check_record_update, ProposalStore, SigningProposal, StorageError,
    TransactionStore, WalletStore,
};
use crate::monitor::TransactionRecord;
use crate::signing::FinalizedTransaction;
use crate::tx::Txid;
use crate::wallet::WalletRecord;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct Tables {
    wallets: HashMap<String, WalletRecord>,
    proposals: HashMap<String, SigningProposal>,
    finalized: HashMap<Txid, FinalizedTransaction>,
    records: HashMap<Txid, TransactionRecord>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl WalletStore for MemoryStore {
    fn create_wallet(&self, wallet: &WalletRecord) -> Result<(), StorageError> {
        let mut tables = self.tables();
        if tables.wallets.contains_key(&wallet.name) {
            return Err(StorageError::AlreadyExists(format!("wallet {}", wallet.name)));
        }
        tables.wallets.insert(wallet.name.clone(), wallet.clone());
        Ok(())
    }

    fn load_wallet(&self, name: &str) -> Result<WalletRecord, StorageError> {
        self.tables()
            .wallets
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("wallet {}", name)))
    }

    fn list_wallets(&self) -> Result<Vec<String>, StorageError> {
        let mut names: Vec<String> = self.tables().wallets.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

impl ProposalStore for MemoryStore {
    fn save_proposal(&self, proposal: &SigningProposal) -> Result<(), StorageError> {
        self.tables()
            .proposals
            .insert(proposal.id.clone(), proposal.clone());
        Ok(())
    }

    fn load_proposal(&self, id: &str) -> Result<SigningProposal, StorageError> {
        self.tables()
            .proposals
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("proposal {}", id)))
    }
}

impl TransactionStore for MemoryStore {
    fn save_finalized(&self, tx: &FinalizedTransaction) -> Result<(), StorageError> {
        let mut tables = self.tables();
        if check_finalized_update(tables.finalized.get(&tx.txid()), tx)? {
            tables.finalized.insert(tx.txid(), tx.clone());
        }
        Ok(())
    }

    fn load_finalized(&self, txid: &Txid) -> Result<FinalizedTransaction, StorageError> {
        self.tables()
            .finalized
            .get(txid)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("transaction {}", txid)))
    }

    fn save_record(&self, record: &TransactionRecord) -> Result<(), StorageError> {
        let mut tables = self.tables();
        check_record_update(tables.records.get(&record.txid()), record)?;
        tables.records.insert(record.txid(), record.clone());
        Ok(())
    }

    fn load_record(&self, txid: &Txid) -> Result<TransactionRecord, StorageError> {
        self.tables()
            .records
            .get(txid)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("record {}", txid)))
    }
}
