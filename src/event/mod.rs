//! Event retrieval and subscription.
//!
//! An [`EventSource`] serves one bound instance's logs in two modes over
//! the same conceptual sequence: [`EventSource::filter`] replays a bounded
//! range of past occurrences, [`EventSource::stream`] and
//! [`EventSource::watch`] ride the live feed. Both decode raw log
//! envelopes into one typed [`EventRecord`] shape and keep ledger order.
//!
//! The pull side is [`EventIterator`]; the push side is a caller-supplied
//! sink driven by a background task, held by a [`WatchHandle`].

mod iter;
mod watch;

use std::sync::Arc;

use alloy::primitives::{Address, TxHash};
use tokio::sync::mpsc;
use tracing::debug;

pub use iter::EventIterator;
pub use watch::WatchHandle;

use crate::{
    codec::CodecError,
    descriptor::InterfaceDescriptor,
    error::Error,
    transport::{BlockRange, LogQuery, RawLog, Topic, Transport},
};

/// One typed event shape: its entry name in the interface descriptor and
/// the decoding of a raw log envelope into it.
///
/// Implementations are mechanical, one per event kind; everything generic
/// lives in [`EventSource`] and [`EventIterator`].
pub trait EventRecord: Sized + Send + 'static {
    /// Name of the event entry in the descriptor.
    const EVENT: &'static str;

    /// Decodes the event fields from a raw log envelope.
    fn decode(raw: &RawLog) -> Result<Self, CodecError>;
}

/// A decoded event occurrence together with its raw log envelope.
/// Immutable once decoded.
#[derive(Clone, Debug)]
pub struct Occurrence<E> {
    event: E,
    raw: RawLog,
}

impl<E> Occurrence<E> {
    pub(crate) fn new(event: E, raw: RawLog) -> Self {
        Self { event, raw }
    }

    pub fn event(&self) -> &E {
        &self.event
    }

    pub fn into_event(self) -> E {
        self.event
    }

    /// The raw log envelope the occurrence was decoded from.
    pub fn raw(&self) -> &RawLog {
        &self.raw
    }

    pub fn block(&self) -> u64 {
        self.raw.block
    }

    pub fn tx_hash(&self) -> TxHash {
        self.raw.tx_hash
    }

    pub fn tx_index(&self) -> u64 {
        self.raw.tx_index
    }

    pub fn log_index(&self) -> u64 {
        self.raw.log_index
    }
}

/// Event-side view of a binding: retrieval and subscription for one bound
/// instance, generic over the event shape.
pub struct EventSource<P> {
    address: Address,
    descriptor: Arc<InterfaceDescriptor>,
    transport: Arc<P>,
}

impl<P: Transport> EventSource<P> {
    pub(crate) fn new(
        address: Address,
        descriptor: Arc<InterfaceDescriptor>,
        transport: Arc<P>,
    ) -> Self {
        Self {
            address,
            descriptor,
            transport,
        }
    }

    /// Replays past occurrences of `E` over `range`, in ledger order
    /// (block, then intra-block emission sequence), as a pull iterator.
    ///
    /// The retrieval itself is bounded and happens here; each log is
    /// decoded on [`EventIterator::advance`], and a decode failure moves
    /// the iterator to its permanent failure state rather than skipping
    /// the record.
    pub async fn filter<E: EventRecord>(
        &self,
        range: BlockRange,
        topics: Vec<Topic>,
    ) -> Result<EventIterator<E>, Error> {
        let query = self.query_for::<E>(range, topics)?;
        let logs = self.transport.filter_logs(&query).await?;
        debug!(event = E::EVENT, logs = logs.len(), "replaying history");
        Ok(EventIterator::replay(logs))
    }

    /// Opens a live subscription for future occurrences of `E` and exposes
    /// it behind the same pull contract as [`filter`](Self::filter).
    pub async fn stream<E: EventRecord>(&self, topics: Vec<Topic>) -> Result<EventIterator<E>, Error> {
        let query = self.query_for::<E>(BlockRange::live(), topics)?;
        let subscription = self.transport.subscribe_logs(&query).await?;
        Ok(EventIterator::live(subscription))
    }

    /// Opens a live subscription for future occurrences of `E` and spawns
    /// one background task that decodes and forwards them to `sink`.
    ///
    /// The task ends on caller cancellation ([`WatchHandle::close`] or
    /// drop), on sink closure, on subscription failure, or on the first
    /// decode failure; every exit path releases the subscription exactly
    /// once. [`WatchHandle::join`] surfaces the terminal result.
    pub async fn watch<E: EventRecord>(
        &self,
        topics: Vec<Topic>,
        sink: mpsc::Sender<Occurrence<E>>,
    ) -> Result<WatchHandle, Error> {
        let query = self.query_for::<E>(BlockRange::live(), topics)?;
        let subscription = self.transport.subscribe_logs(&query).await?;
        debug!(event = E::EVENT, "watch started");
        Ok(watch::spawn(subscription, sink))
    }

    fn query_for<E: EventRecord>(
        &self,
        range: BlockRange,
        topics: Vec<Topic>,
    ) -> Result<LogQuery, Error> {
        let entry = self.descriptor.event(E::EVENT)?;
        if topics.len() > entry.indexed_count() {
            return Err(Error::Encoding(CodecError::new(format!(
                "`{}` has {} indexed fields, got {} topic filters",
                E::EVENT,
                entry.indexed_count(),
                topics.len()
            ))));
        }
        Ok(LogQuery {
            address: self.address,
            selector: entry.selector(),
            topics,
            range,
        })
    }
}
