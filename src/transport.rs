//! The transport boundary: everything this layer asks of a remote node.
//!
//! A [`Transport`] sends read-only calls, broadcasts operations, reports
//! settlements and serves logs, both as bounded history
//! ([`Transport::filter_logs`]) and as a standing push subscription
//! ([`Transport::subscribe_logs`]). Retry policy, signing, fees and nonce
//! management all live behind this trait, not in front of it.

use alloy::primitives::{Address, B256, Bytes, TxHash};
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::error::Error;

/// Ledger-assigned identifier of a broadcast operation.
pub type OperationId = B256;

/// Point in ledger time a read-only call executes against.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Position {
    /// The tip of the ledger at the time the node serves the call.
    #[default]
    Latest,
    /// A specific block.
    Block(u64),
}

/// Inclusive block range of a log retrieval. An open `to` means "and
/// continue forever" for subscriptions, "up to the tip" for history.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockRange {
    pub from: u64,
    pub to: Option<u64>,
}

impl BlockRange {
    pub fn new(from: u64, to: u64) -> Self {
        Self { from, to: Some(to) }
    }

    pub fn from_block(from: u64) -> Self {
        Self { from, to: None }
    }

    /// The range a live subscription covers: from now on.
    pub fn live() -> Self {
        Self::from_block(0)
    }

    pub fn contains(&self, block: u64) -> bool {
        block >= self.from && self.to.is_none_or(|to| block <= to)
    }
}

/// Raw log envelope as delivered by the node: the emitting program's
/// address, the event selector, indexed field values, the unindexed
/// payload, and the producing position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawLog {
    pub address: Address,
    pub selector: B256,
    /// Indexed field values, in field order.
    pub topics: Vec<B256>,
    /// Opaque payload holding the unindexed fields.
    pub data: Bytes,
    pub block: u64,
    pub tx_hash: TxHash,
    pub tx_index: u64,
    pub log_index: u64,
}

/// Equality filter over one indexed event field.
///
/// `OneOf` is a disjunction: the field matches if its actual value is a
/// member of the set. An empty set matches nothing. Fields combine
/// conjunctively across a query's topic list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Topic {
    Any,
    OneOf(Vec<B256>),
}

impl Topic {
    pub fn one(value: B256) -> Self {
        Self::OneOf(vec![value])
    }

    pub fn matches(&self, actual: &B256) -> bool {
        match self {
            Topic::Any => true,
            Topic::OneOf(accepted) => accepted.contains(actual),
        }
    }
}

/// A log retrieval or subscription request: one program address, one event
/// selector, per-indexed-field topic filters and a block range.
#[derive(Clone, Debug)]
pub struct LogQuery {
    pub address: Address,
    pub selector: B256,
    /// Aligned with the event's indexed fields; missing trailing entries
    /// match anything.
    pub topics: Vec<Topic>,
    pub range: BlockRange,
}

impl LogQuery {
    /// The one shared definition of the matching semantics, used by
    /// transports and tests alike.
    pub fn matches(&self, log: &RawLog) -> bool {
        if log.address != self.address
            || log.selector != self.selector
            || !self.range.contains(log.block)
        {
            return false;
        }
        if self.topics.len() > log.topics.len() {
            return false;
        }
        self.topics
            .iter()
            .zip(&log.topics)
            .all(|(topic, actual)| topic.matches(actual))
    }
}

/// Whether the ledger executed a settled operation successfully.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SettleStatus {
    Succeeded,
    Failed,
}

impl SettleStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, SettleStatus::Succeeded)
    }
}

/// Terminal report of a broadcast operation. Produced once; never mutated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settlement {
    pub operation: OperationId,
    pub status: SettleStatus,
    /// Ledger-assigned sequence position.
    pub block: u64,
    pub index: u64,
    /// Raw receipt data, carried for caller-side diagnosis.
    pub receipt: Bytes,
}

impl Settlement {
    pub fn succeeded(operation: OperationId, block: u64, index: u64, receipt: Bytes) -> Self {
        Self {
            operation,
            status: SettleStatus::Succeeded,
            block,
            index,
            receipt,
        }
    }

    pub fn failed(operation: OperationId, block: u64, index: u64, receipt: Bytes) -> Self {
        Self {
            operation,
            status: SettleStatus::Failed,
            block,
            index,
            receipt,
        }
    }
}

/// Releases one transport subscription, exactly once.
///
/// Safe to call any number of times and fired on drop, so a subscription
/// is never leaked and never released twice whichever close path wins.
pub struct SubscriptionHandle {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl SubscriptionHandle {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    pub fn unsubscribe(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("released", &self.release.is_none())
            .finish()
    }
}

/// A standing log subscription.
///
/// The transport delivers matching logs on `logs` and, if the subscription
/// dies, reports the terminal cause on `failure` before closing `logs`.
/// Logs already queued are still readable after the channel closes. A
/// `logs` channel that closes without a `failure` value is a natural end.
pub struct LogSubscription {
    pub logs: mpsc::Receiver<RawLog>,
    pub failure: oneshot::Receiver<Error>,
    pub handle: SubscriptionHandle,
}

/// A remote node, at the boundary this layer consumes it.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Executes a read-only call at the given position and returns the raw
    /// response payload.
    async fn call(&self, address: Address, payload: Bytes, at: Position) -> Result<Bytes, Error>;

    /// Broadcasts a state-changing operation, returning as soon as the node
    /// accepts it. [`Error::Rejected`] when the node refuses pre-broadcast.
    async fn send_transaction(&self, address: Address, payload: Bytes)
    -> Result<OperationId, Error>;

    /// Terminal report for a broadcast operation, `None` while pending.
    async fn get_settlement(&self, id: OperationId) -> Result<Option<Settlement>, Error>;

    /// One bounded retrieval of matching logs, in ledger order: block, then
    /// intra-block emission sequence. Never reordered.
    async fn filter_logs(&self, query: &LogQuery) -> Result<Vec<RawLog>, Error>;

    /// Opens a standing subscription for matching logs from the point of
    /// subscription onward.
    async fn subscribe_logs(&self, query: &LogQuery) -> Result<LogSubscription, Error>;
}
