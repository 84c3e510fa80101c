//! Polling loop driving transaction records
//!
//! One loop per txid. Each tick asks the status provider, turns the answer
//! into an [`Observation`] and hands it to [`TransactionRecord::apply`].
//! Cancelling stops future polls; events already logged stay.

use super::record::{LifecycleEvent, TransactionRecord};
use super::state::{LifecycleState, Observation};
use crate::error::ErrorCategory;
use crate::provider::{ProviderError, StatusProvider};
use crate::storage::{StorageError, TransactionStore};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Default depth at which a transaction counts as confirmed
pub const DEFAULT_CONFIRMATION_THRESHOLD: u32 = 6;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Status provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl MonitorError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            MonitorError::Provider(e) => e.category(),
            MonitorError::Storage(e) => e.category(),
        }
    }
}

/// Polling settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    pub poll_interval: Duration,
    pub confirmation_threshold: u32,
    /// How long a broadcast transaction may stay unseen before it is
    /// declared not propagated
    pub propagation_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            confirmation_threshold: DEFAULT_CONFIRMATION_THRESHOLD,
            propagation_timeout: Duration::from_secs(30 * 60),
        }
    }
}

pub struct LifecycleMonitor {
    provider: Arc<dyn StatusProvider>,
    store: Option<Arc<dyn TransactionStore>>,
    config: MonitorConfig,
    events: broadcast::Sender<LifecycleEvent>,
}

impl LifecycleMonitor {
    pub fn new(provider: Arc<dyn StatusProvider>, config: MonitorConfig) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            provider,
            store: None,
            config,
            events,
        }
    }

    /// Persist the record after every transition
    pub fn with_store(mut self, store: Arc<dyn TransactionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Receive every event produced by this monitor
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    /// Record for a transaction the broadcaster just accepted
    pub fn submitted(&self, record: &mut TransactionRecord) -> Result<(), MonitorError> {
        self.observe(record, Observation::Submitted)
    }

    /// Apply an observation, then persist and publish the event if any
    pub fn observe(&self, record: &mut TransactionRecord, observation: Observation) -> Result<(), MonitorError> {
        let Some(event) = record.apply(observation).cloned() else {
            return Ok(());
        };

        if let Some(store) = &self.store {
            store.save_record(record)?;
        }
        // No subscribers is fine
        let _ = self.events.send(event);
        Ok(())
    }

    /// Poll the provider once
    ///
    /// `since` is when tracking began; it bounds the propagation window.
    /// While the record is still `Created` or `Broadcast`, any poll that
    /// does not move it forward counts against that window, whatever the
    /// provider answered.
    pub async fn poll_once(&self, record: &mut TransactionRecord, since: Instant) -> Result<(), MonitorError> {
        let observation = match self.provider.get_status(&record.txid()).await {
            Ok(status) => Observation::Status(status),
            Err(ProviderError::NotFound(_)) => Observation::NotFound,
            Err(ProviderError::Rejected(reason)) => Observation::Rejected(reason),
            Err(e) => {
                self.check_propagation(record, since)?;
                return Err(e.into());
            }
        };

        let before = record.events().len();
        self.observe(record, observation)?;
        if record.events().len() == before {
            self.check_propagation(record, since)?;
        }
        Ok(())
    }

    fn check_propagation(&self, record: &mut TransactionRecord, since: Instant) -> Result<(), MonitorError> {
        let waiting = matches!(record.state(), LifecycleState::Created | LifecycleState::Broadcast);
        if waiting && since.elapsed() >= self.config.propagation_timeout {
            log::warn!(
                "{} not seen in the mempool after {:?}",
                record.txid(),
                self.config.propagation_timeout
            );
            self.observe(record, Observation::PropagationTimeout)?;
        }
        Ok(())
    }

    /// Poll until the record reaches a terminal state or `cancel` fires
    ///
    /// Network errors are logged and polling continues; other errors end
    /// the loop.
    pub async fn track(
        &self,
        mut record: TransactionRecord,
        cancel: CancellationToken,
    ) -> Result<TransactionRecord, MonitorError> {
        let since = Instant::now();
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        log::info!("Tracking {} from state {}", record.txid(), record.state());

        while !record.state().is_terminal() {
            tokio::select! {
                _ = cancel.cancelled() => {
                    log::info!("Stopped tracking {} at {}", record.txid(), record.state());
                    return Ok(record);
                }
                _ = ticker.tick() => {}
            }

            match self.poll_once(&mut record, since).await {
                Ok(()) => {}
                Err(e) if e.category().is_retryable() => {
                    log::warn!("Status poll for {} failed: {}", record.txid(), e);
                }
                Err(e) => {
                    log::error!("Tracking {} aborted: {}", record.txid(), e);
                    return Err(e);
                }
            }
        }

        log::info!("Transaction {} reached {}", record.txid(), record.state());
        Ok(record)
    }

    /// Run [`track`](Self::track) on its own task
    pub fn spawn(
        self: &Arc<Self>,
        record: TransactionRecord,
        cancel: CancellationToken,
    ) -> JoinHandle<Result<TransactionRecord, MonitorError>> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move { monitor.track(record, cancel).await })
    }
}
