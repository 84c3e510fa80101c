//! Lifecycle monitoring of broadcast transactions

pub mod record;
pub mod state;
pub mod tracker;

pub use record::{EventLog, LifecycleEvent, TransactionRecord};
pub use state::{next_state, FailureReason, LifecycleState, Observation};
pub use tracker::{LifecycleMonitor, MonitorConfig, MonitorError, DEFAULT_CONFIRMATION_THRESHOLD};
