//! Lifecycle states and the observations that drive them

use crate::provider::TxStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a transaction will not confirm
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// The network refused the transaction
    Rejected(String),
    /// Never seen in any mempool within the propagation window
    NotPropagated,
}

/// Where a broadcast transaction stands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    Created,
    Broadcast,
    InMempool,
    /// Mined, with the given depth, below the confirmation threshold
    Confirming(u32),
    Confirmed,
    Failed(FailureReason),
}

impl LifecycleState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Confirmed | LifecycleState::Failed(_))
    }

    /// Position along the forward path; `None` for failures
    pub(crate) fn progress(&self) -> Option<(u8, u32)> {
        match self {
            LifecycleState::Created => Some((0, 0)),
            LifecycleState::Broadcast => Some((1, 0)),
            LifecycleState::InMempool => Some((2, 0)),
            LifecycleState::Confirming(depth) => Some((3, *depth)),
            LifecycleState::Confirmed => Some((4, 0)),
            LifecycleState::Failed(_) => None,
        }
    }

    pub fn confirmations(&self) -> Option<u32> {
        match self {
            LifecycleState::Confirming(depth) => Some(*depth),
            _ => None,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Created => write!(f, "created"),
            LifecycleState::Broadcast => write!(f, "broadcast"),
            LifecycleState::InMempool => write!(f, "in mempool"),
            LifecycleState::Confirming(depth) => write!(f, "confirming ({})", depth),
            LifecycleState::Confirmed => write!(f, "confirmed"),
            LifecycleState::Failed(FailureReason::Rejected(reason)) => {
                write!(f, "failed: rejected ({})", reason)
            }
            LifecycleState::Failed(FailureReason::NotPropagated) => write!(f, "failed: not propagated"),
        }
    }
}

/// Input to the transition function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Observation {
    /// The broadcaster accepted the transaction
    Submitted,
    /// Status reported by the provider
    Status(TxStatus),
    /// Provider does not know the transaction (yet)
    NotFound,
    /// The network rejected the transaction
    Rejected(String),
    /// The propagation window closed without a mempool sighting
    PropagationTimeout,
}

/// The state `observation` leads to from `current`, or `None` when it
/// changes nothing
///
/// Only forward moves are produced. A status that implies an earlier
/// position than the current one is stale and ignored.
pub fn next_state(
    current: &LifecycleState,
    observation: &Observation,
    confirmation_threshold: u32,
) -> Option<LifecycleState> {
    if current.is_terminal() {
        return None;
    }

    let candidate = match observation {
        Observation::Submitted => LifecycleState::Broadcast,
        Observation::Status(status) => {
            if status.confirmations >= confirmation_threshold.max(1) {
                LifecycleState::Confirmed
            } else if status.confirmations > 0 {
                LifecycleState::Confirming(status.confirmations)
            } else if status.in_mempool {
                LifecycleState::InMempool
            } else {
                return None;
            }
        }
        Observation::NotFound => return None,
        Observation::Rejected(reason) => {
            return Some(LifecycleState::Failed(FailureReason::Rejected(reason.clone())))
        }
        Observation::PropagationTimeout => {
            return match current {
                LifecycleState::Created | LifecycleState::Broadcast => {
                    Some(LifecycleState::Failed(FailureReason::NotPropagated))
                }
                _ => None,
            }
        }
    };

    match (current.progress(), candidate.progress()) {
        (Some(from), Some(to)) if to > from => Some(candidate),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_only() {
        let confirming = LifecycleState::Confirming(3);
        assert_eq!(next_state(&confirming, &Observation::Status(TxStatus::mempool()), 6), None);
        assert_eq!(next_state(&confirming, &Observation::Status(TxStatus::confirmed(2)), 6), None);
        assert_eq!(next_state(&confirming, &Observation::Status(TxStatus::confirmed(3)), 6), None);
        assert_eq!(
            next_state(&confirming, &Observation::Status(TxStatus::confirmed(4)), 6),
            Some(LifecycleState::Confirming(4))
        );
        assert_eq!(
            next_state(&confirming, &Observation::Status(TxStatus::confirmed(9)), 6),
            Some(LifecycleState::Confirmed)
        );
    }

    #[test]
    fn test_terminal_states_absorb() {
        for obs in [
            Observation::Status(TxStatus::mempool()),
            Observation::Rejected("late".into()),
            Observation::PropagationTimeout,
        ] {
            assert_eq!(next_state(&LifecycleState::Confirmed, &obs, 6), None);
        }
    }

    #[test]
    fn test_failures() {
        assert_eq!(
            next_state(&LifecycleState::InMempool, &Observation::Rejected("conflict".into()), 6),
            Some(LifecycleState::Failed(FailureReason::Rejected("conflict".into())))
        );
        assert_eq!(
            next_state(&LifecycleState::Broadcast, &Observation::PropagationTimeout, 6),
            Some(LifecycleState::Failed(FailureReason::NotPropagated))
        );
        // Already seen in a mempool: the window no longer applies
        assert_eq!(next_state(&LifecycleState::InMempool, &Observation::PropagationTimeout, 6), None);
    }
}
