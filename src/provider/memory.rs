//! In-process providers for tests and demos

use super::{Broadcaster, ProviderError, StatusProvider, TxStatus, UtxoProvider};
use crate::tx::{Txid, Utxo};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct ChainState {
    utxos: HashMap<String, Vec<Utxo>>,
    transactions: HashMap<Txid, TxStatus>,
    submitted: Vec<Txid>,
    failing_submissions: usize,
    reject_reason: Option<String>,
}

/// Toy chain: funded addresses, a mempool and block confirmations
#[derive(Debug, Default)]
pub struct InMemoryChain {
    state: Mutex<ChainState>,
}

impl InMemoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ChainState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an unspent output for `address`
    pub fn fund(&self, address: &str, utxo: Utxo) {
        self.state()
            .utxos
            .entry(address.to_string())
            .or_default()
            .push(utxo);
    }

    /// Make the next `n` submissions fail with a network error
    pub fn fail_next_submissions(&self, n: usize) {
        self.state().failing_submissions = n;
    }

    /// Reject every following submission
    pub fn reject_submissions(&self, reason: &str) {
        self.state().reject_reason = Some(reason.to_string());
    }

    /// Txids accepted so far, in submission order (repeats included)
    pub fn submitted(&self) -> Vec<Txid> {
        self.state().submitted.clone()
    }

    /// Mine `blocks` blocks, confirming everything in the mempool
    pub fn mine(&self, blocks: u32) {
        for status in self.state().transactions.values_mut() {
            status.in_mempool = false;
            status.confirmations = status.confirmations.saturating_add(blocks);
        }
    }
}

#[async_trait]
impl UtxoProvider for InMemoryChain {
    async fn list_unspent(&self, address: &str) -> Result<Vec<Utxo>, ProviderError> {
        Ok(self.state().utxos.get(address).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl Broadcaster for InMemoryChain {
    async fn submit(&self, raw: &[u8]) -> Result<Txid, ProviderError> {
        let mut state = self.state();
        if state.failing_submissions > 0 {
            state.failing_submissions -= 1;
            return Err(ProviderError::Network("connection reset".into()));
        }
        if let Some(reason) = &state.reject_reason {
            return Err(ProviderError::Rejected(reason.clone()));
        }

        let txid = Txid::from_raw_tx(raw);
        state.transactions.entry(txid).or_insert_with(TxStatus::mempool);
        state.submitted.push(txid);
        Ok(txid)
    }
}

#[async_trait]
impl StatusProvider for InMemoryChain {
    async fn get_status(&self, txid: &Txid) -> Result<TxStatus, ProviderError> {
        self.state()
            .transactions
            .get(txid)
            .copied()
            .ok_or_else(|| ProviderError::NotFound(txid.to_string()))
    }
}

/// Status provider replaying a fixed sequence of responses
///
/// Once the script runs out the last response repeats.
#[derive(Debug)]
pub struct ScriptedStatusProvider {
    responses: Mutex<VecDeque<Result<TxStatus, ProviderError>>>,
    last: Mutex<Option<Result<TxStatus, ProviderError>>>,
    calls: Mutex<usize>,
}

impl ScriptedStatusProvider {
    pub fn new(responses: impl IntoIterator<Item = Result<TxStatus, ProviderError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            last: Mutex::new(None),
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl StatusProvider for ScriptedStatusProvider {
    async fn get_status(&self, txid: &Txid) -> Result<TxStatus, ProviderError> {
        *self.calls.lock().unwrap_or_else(PoisonError::into_inner) += 1;

        let next = self
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(response) = next {
            *last = Some(response);
        }
        last.clone()
            .unwrap_or_else(|| Err(ProviderError::NotFound(txid.to_string())))
    }
}
