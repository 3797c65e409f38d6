//! The live-watch background task.
//!
//! One task per active watch. It multiplexes three events: a new raw log
//! arrived, the transport subscription reported a terminal error, and the
//! caller requested cancellation. Terminal states are `Closed` (caller
//! cancellation, sink closure or natural transport end) and `Failed`
//! (transport or decode error); nothing transitions out of them, and every
//! path releases the subscription exactly once.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{
    error::Error,
    event::{EventRecord, Occurrence},
    transport::LogSubscription,
};

pub(crate) fn spawn<E: EventRecord>(
    subscription: LogSubscription,
    sink: mpsc::Sender<Occurrence<E>>,
) -> WatchHandle {
    let (cancel_tx, cancel_rx) = oneshot::channel();
    let task = tokio::spawn(run::<E>(subscription, sink, cancel_rx));
    WatchHandle {
        cancel: Some(cancel_tx),
        task: Some(task),
    }
}

/// Caller's handle to one live watch task.
pub struct WatchHandle {
    cancel: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Result<(), Error>>>,
}

impl WatchHandle {
    /// Requests cancellation. The task unsubscribes from the transport and
    /// stops delivering; a delivery in flight is abandoned rather than
    /// awaited. Idempotent, and a no-op after the task already finished.
    pub fn close(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }

    /// Waits for the task's terminal state: `Ok` for `Closed`, the
    /// transport or decode error for `Failed`.
    pub async fn join(mut self) -> Result<(), Error> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        match task.await {
            Ok(result) => result,
            Err(join_error) if join_error.is_panic() => {
                std::panic::resume_unwind(join_error.into_panic())
            }
            Err(_) => Err(Error::Cancelled),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run<E: EventRecord>(
    mut subscription: LogSubscription,
    sink: mpsc::Sender<Occurrence<E>>,
    mut cancel: oneshot::Receiver<()>,
) -> Result<(), Error> {
    loop {
        tokio::select! {
            _ = &mut cancel => {
                subscription.handle.unsubscribe();
                debug!(event = E::EVENT, "watch cancelled");
                return Ok(());
            }
            cause = &mut subscription.failure => {
                subscription.handle.unsubscribe();
                return match cause {
                    Ok(error) => {
                        warn!(event = E::EVENT, %error, "subscription failed");
                        Err(error)
                    }
                    // Failure channel dropped without a value: the
                    // subscription ended naturally.
                    Err(_) => Ok(()),
                };
            }
            log = subscription.logs.recv() => {
                let Some(raw) = log else {
                    subscription.handle.unsubscribe();
                    // The channel can close before the failure arm gets
                    // polled; check for a terminal cause either way.
                    return match subscription.failure.try_recv() {
                        Ok(error) => {
                            warn!(event = E::EVENT, %error, "subscription failed");
                            Err(error)
                        }
                        Err(_) => {
                            debug!(event = E::EVENT, "subscription ended");
                            Ok(())
                        }
                    };
                };
                let occurrence = match E::decode(&raw) {
                    Ok(event) => Occurrence::new(event, raw),
                    Err(cause) => {
                        // One undecodable occurrence poisons the watch;
                        // skipping it would hide a descriptor mismatch.
                        subscription.handle.unsubscribe();
                        warn!(event = E::EVENT, error = %cause, "undecodable log, watch failed");
                        return Err(Error::Decoding(cause));
                    }
                };
                // A slow or abandoned consumer must not pin this task:
                // delivery races against cancellation and against the
                // subscription dying under it.
                tokio::select! {
                    _ = &mut cancel => {
                        subscription.handle.unsubscribe();
                        debug!(event = E::EVENT, "watch cancelled mid-delivery");
                        return Ok(());
                    }
                    cause = &mut subscription.failure => {
                        subscription.handle.unsubscribe();
                        return match cause {
                            Ok(error) => {
                                warn!(event = E::EVENT, %error, "subscription failed mid-delivery");
                                Err(error)
                            }
                            Err(_) => Ok(()),
                        };
                    }
                    sent = sink.send(occurrence) => {
                        if sent.is_err() {
                            subscription.handle.unsubscribe();
                            debug!(event = E::EVENT, "sink dropped, watch closed");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}
