//! Transaction record and its append-only event log

use super::state::{next_state, LifecycleState, Observation};
use crate::tx::Txid;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One state transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub txid: Txid,
    /// Position in the log, starting at 0
    pub sequence: u64,
    pub at: DateTime<Utc>,
    pub from: LifecycleState,
    pub to: LifecycleState,
    /// What the provider reported that caused the transition
    pub observation: Observation,
}

/// Ordered transition history; can only be extended
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventLog(Vec<LifecycleEvent>);

impl EventLog {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LifecycleEvent> {
        self.0.iter()
    }

    pub fn last(&self) -> Option<&LifecycleEvent> {
        self.0.last()
    }

    /// Whether `earlier` is a prefix of this log
    pub fn extends(&self, earlier: &EventLog) -> bool {
        earlier.len() <= self.len() && self.0[..earlier.len()] == earlier.0[..]
    }

    fn push(&mut self, event: LifecycleEvent) {
        self.0.push(event);
    }
}

/// Lifecycle of one broadcast transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    txid: Txid,
    state: LifecycleState,
    confirmation_threshold: u32,
    created_at: DateTime<Utc>,
    events: EventLog,
}

impl TransactionRecord {
    pub fn new(txid: Txid, confirmation_threshold: u32) -> Self {
        Self {
            txid,
            state: LifecycleState::Created,
            confirmation_threshold,
            created_at: Utc::now(),
            events: EventLog::default(),
        }
    }

    pub fn txid(&self) -> Txid {
        self.txid
    }

    pub fn state(&self) -> &LifecycleState {
        &self.state
    }

    pub fn confirmation_threshold(&self) -> u32 {
        self.confirmation_threshold
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Feed one observation through the transition function
    ///
    /// Returns the appended event when the state moved.
    pub fn apply(&mut self, observation: Observation) -> Option<&LifecycleEvent> {
        let next = next_state(&self.state, &observation, self.confirmation_threshold)?;

        log::info!("Transaction {}: {} -> {}", self.txid, self.state, next);
        let event = LifecycleEvent {
            txid: self.txid,
            sequence: self.events.len() as u64,
            at: Utc::now(),
            from: std::mem::replace(&mut self.state, next.clone()),
            to: next,
            observation,
        };
        self.events.push(event);
        self.events.last()
    }
}
