//! Drives signing devices against a [`SignatureAggregator`]
//!
//! Each device call runs on a blocking thread under a deadline and a child
//! of the caller's cancellation token. The aggregator is only touched after
//! a call returns, so a cancelled or timed-out call leaves it unchanged.

use super::aggregator::SignatureAggregator;
use super::partial::Insert;
use super::AggregationError;
use crate::device::{AuthorityId, DeviceError, SignContext, SigningDevice};
use crate::error::ErrorCategory;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Default time a person has to confirm on a device
pub const DEFAULT_SIGNING_TIMEOUT: Duration = Duration::from_secs(120);

/// Extra time given to a device to notice its own deadline
const DEADLINE_GRACE: Duration = Duration::from_millis(500);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SigningError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error(transparent)]
    Aggregation(#[from] AggregationError),
    #[error("Signing task for {authority} failed: {reason}")]
    Task { authority: AuthorityId, reason: String },
}

impl SigningError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SigningError::Device(e) => e.category(),
            SigningError::Aggregation(e) => e.category(),
            SigningError::Task { .. } => ErrorCategory::Device,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SigningCoordinator {
    timeout: Duration,
}

impl Default for SigningCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_SIGNING_TIMEOUT)
    }
}

impl SigningCoordinator {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sign every input with one device
    ///
    /// Returns the number of newly accepted signatures. A signature that
    /// fails verification is reported as [`DeviceError::SigningFailed`].
    pub async fn sign_with(
        &self,
        aggregator: &SignatureAggregator,
        device: Arc<dyn SigningDevice>,
        cancel: &CancellationToken,
    ) -> Result<usize, SigningError> {
        let authority = device.authority();
        let mut added = 0;

        for input in 0..aggregator.transaction().inputs().len() {
            if aggregator
                .signature_set(input)?
                .get(authority)
                .is_some()
            {
                log::debug!("{} already signed input {}", authority, input);
                continue;
            }

            let request = aggregator.sign_request(input)?;
            let ctx = SignContext::new(cancel.child_token(), self.timeout);
            let call_token = ctx.token().clone();

            let dev = Arc::clone(&device);
            let handle = tokio::task::spawn_blocking(move || dev.sign(&request, &ctx));

            let joined = tokio::select! {
                joined = tokio::time::timeout(self.timeout + DEADLINE_GRACE, handle) => joined,
                _ = cancel.cancelled() => {
                    call_token.cancel();
                    log::warn!("Signing with {} cancelled at input {}", authority, input);
                    return Err(DeviceError::Cancelled(authority).into());
                }
            };

            let partial = match joined {
                Ok(Ok(result)) => result?,
                Ok(Err(join_err)) => {
                    return Err(SigningError::Task {
                        authority,
                        reason: join_err.to_string(),
                    })
                }
                Err(_) => {
                    call_token.cancel();
                    log::warn!("{} ignored its deadline at input {}", authority, input);
                    return Err(DeviceError::Timeout {
                        authority,
                        after: self.timeout,
                    }
                    .into());
                }
            };

            if partial.authority != authority || partial.input_index != input {
                return Err(DeviceError::SigningFailed {
                    authority,
                    reason: format!(
                        "device answered for {} input {}",
                        partial.authority, partial.input_index
                    ),
                }
                .into());
            }

            match aggregator.collect_signature(partial) {
                Ok(Insert::Added) => added += 1,
                Ok(Insert::AlreadyPresent) => {}
                Err(AggregationError::InvalidSignature { input, authority }) => {
                    return Err(DeviceError::SigningFailed {
                        authority,
                        reason: format!("signature for input {} does not verify", input),
                    }
                    .into());
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(added)
    }

    /// Run several devices at once; one result per device, in the given
    /// order
    pub async fn sign_concurrently(
        &self,
        aggregator: &SignatureAggregator,
        devices: &[Arc<dyn SigningDevice>],
        cancel: &CancellationToken,
    ) -> Vec<(AuthorityId, Result<usize, SigningError>)> {
        let tasks = devices.iter().map(|device| {
            let device = Arc::clone(device);
            async move {
                let authority = device.authority();
                (authority, self.sign_with(aggregator, device, cancel).await)
            }
        });
        join_all(tasks).await
    }
}
