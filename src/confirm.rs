//! Settlement tracking for broadcast operations.

use std::{sync::Arc, time::Duration};

use tracing::trace;

use crate::{binding::PendingOperation, error::Error, transport::{Settlement, Transport}};

/// Default interval between settlement polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Observes pending operations until the ledger reports them settled.
///
/// Polling failures surface to the caller; nothing is retried and nothing
/// is re-broadcast. Dropping a [`wait`](Self::wait) future is the
/// cooperative cancellation path: the broadcast itself is unaffected and
/// the caller may `wait` again on the same [`PendingOperation`].
pub struct ConfirmationTracker<P> {
    transport: Arc<P>,
    poll_interval: Duration,
    timeout: Option<Duration>,
}

impl<P: Transport> ConfirmationTracker<P> {
    pub fn new(transport: Arc<P>) -> Self {
        Self {
            transport,
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Bounds every [`wait`](Self::wait) on this tracker. On expiry the
    /// wait fails with [`Error::Cancelled`]; the operation may still settle
    /// later.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Blocks the calling task until the operation reaches a terminal
    /// position. Returns the settlement only when the ledger marked it
    /// successful; a settled failure yields [`Error::ExecutionFailed`]
    /// carrying the raw receipt.
    pub async fn wait(&self, pending: &PendingOperation) -> Result<Settlement, Error> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.poll(pending))
                .await
                .map_err(|_| Error::Cancelled)?,
            None => self.poll(pending).await,
        }
    }

    async fn poll(&self, pending: &PendingOperation) -> Result<Settlement, Error> {
        loop {
            if let Some(settlement) = self.transport.get_settlement(pending.id()).await? {
                return if settlement.status.is_success() {
                    Ok(settlement)
                } else {
                    Err(Error::ExecutionFailed(Box::new(settlement)))
                };
            }
            trace!(operation = %pending.id(), "operation still pending");
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
