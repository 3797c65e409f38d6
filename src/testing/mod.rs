//! In-memory testing environment.
//!
//! [`MockLedger`] is a [`Transport`] over an in-memory log history,
//! staged call responses and settlements, with live subscription fan-out
//! and counters for requests and subscription releases. [`TextCodec`] is a
//! line-format [`Codec`] over a small [`Value`] enum. Together with
//! [`vault_descriptor`] and the sample event records they exercise every
//! binding path without a node.
//!
//! See `./tests` for usage.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, Ordering},
};

use alloy::primitives::{Address, B256, Bytes, TxHash, U256, keccak256};
use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};

use crate::{
    codec::{Codec, CodecError},
    descriptor::{InterfaceDescriptor, ParamShape},
    error::Error,
    event::EventRecord,
    transport::{
        LogQuery, LogSubscription, OperationId, Position, RawLog, Settlement, SubscriptionHandle,
        Transport,
    },
};

const SUBSCRIPTION_BUFFER: usize = 64;

/// Typed value representation of [`TextCodec`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Uint(u64),
    Word(B256),
    Addr(Address),
    Text(String),
}

impl Value {
    fn type_tag(&self) -> &'static str {
        match self {
            Value::Uint(_) => "uint64",
            Value::Word(_) => "bytes32",
            Value::Addr(_) => "address",
            Value::Text(_) => "string",
        }
    }

    fn render(&self) -> String {
        match self {
            Value::Uint(n) => n.to_string(),
            Value::Word(w) => w.to_string(),
            Value::Addr(a) => a.to_string(),
            Value::Text(s) => s.clone(),
        }
    }

    fn parse(type_tag: &str, text: &str) -> Result<Self, CodecError> {
        match type_tag {
            "uint64" => text
                .parse()
                .map(Value::Uint)
                .map_err(|_| CodecError::new(format!("`{text}` is not a uint64"))),
            "bytes32" => text
                .parse()
                .map(Value::Word)
                .map_err(|_| CodecError::new(format!("`{text}` is not a bytes32"))),
            "address" => text
                .parse()
                .map(Value::Addr)
                .map_err(|_| CodecError::new(format!("`{text}` is not an address"))),
            "string" => Ok(Value::Text(text.to_string())),
            other => Err(CodecError::new(format!("unsupported type tag `{other}`"))),
        }
    }
}

/// Codec rendering values as a `|`-separated text payload. Shape checks are
/// real (arity and type tags); the encoding itself is only for tests.
pub struct TextCodec;

impl Codec for TextCodec {
    type Value = Value;

    fn encode(&self, shapes: &[ParamShape], args: &[Value]) -> Result<Bytes, CodecError> {
        if shapes.len() != args.len() {
            return Err(CodecError::new(format!(
                "expected {} arguments, got {}",
                shapes.len(),
                args.len()
            )));
        }
        let mut parts = Vec::with_capacity(args.len());
        for (shape, arg) in shapes.iter().zip(args) {
            if shape.type_tag() != arg.type_tag() {
                return Err(CodecError::new(format!(
                    "argument `{}` expects {}, got {}",
                    shape.name(),
                    shape.type_tag(),
                    arg.type_tag()
                )));
            }
            parts.push(arg.render());
        }
        Ok(Bytes::from(parts.join("|").into_bytes()))
    }

    fn decode(&self, shapes: &[ParamShape], data: &[u8]) -> Result<Vec<Value>, CodecError> {
        let text = std::str::from_utf8(data)
            .map_err(|_| CodecError::new("payload is not valid UTF-8"))?;
        let parts: Vec<&str> = if text.is_empty() {
            Vec::new()
        } else {
            text.split('|').collect()
        };
        if parts.len() != shapes.len() {
            return Err(CodecError::new(format!(
                "expected {} values, got {}",
                shapes.len(),
                parts.len()
            )));
        }
        shapes
            .iter()
            .zip(parts)
            .map(|(shape, part)| Value::parse(shape.type_tag(), part))
            .collect()
    }
}

struct LiveSub {
    query: LogQuery,
    logs: mpsc::Sender<RawLog>,
    failure: Option<oneshot::Sender<Error>>,
}

#[derive(Default)]
struct LedgerInner {
    requests: AtomicU64,
    responses: DashMap<(Address, Bytes, Position), Bytes>,
    rejections: DashMap<Bytes, String>,
    broadcasts: DashMap<OperationId, (Address, Bytes)>,
    settlements: DashMap<OperationId, Settlement>,
    history: Mutex<Vec<RawLog>>,
    subscriptions: DashMap<u64, LiveSub>,
    next_operation: AtomicU64,
    next_subscription: AtomicU64,
    released: AtomicU64,
}

/// In-memory transport with staged responses and a log history.
#[derive(Clone, Default)]
pub struct MockLedger {
    inner: Arc<LedgerInner>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages the response for a call with this exact payload at the latest
    /// ledger position.
    pub fn stage_call(&self, address: Address, payload: Bytes, response: Bytes) {
        self.stage_call_at(address, payload, Position::Latest, response);
    }

    /// Stages the response for a call with this exact payload at one
    /// specific position. A call at any other position misses.
    pub fn stage_call_at(&self, address: Address, payload: Bytes, at: Position, response: Bytes) {
        self.inner.responses.insert((address, payload, at), response);
    }

    /// Makes the node refuse this exact payload pre-broadcast.
    pub fn reject(&self, payload: Bytes, reason: &str) {
        self.inner.rejections.insert(payload, reason.to_string());
    }

    /// Records a settlement; a pending `wait` picks it up on its next poll.
    pub fn settle(&self, settlement: Settlement) {
        self.inner.settlements.insert(settlement.operation, settlement);
    }

    /// Appends a log to the history and fans it out to matching live
    /// subscriptions.
    pub async fn push_log(&self, log: RawLog) {
        self.inner.history.lock().unwrap().push(log.clone());
        let targets: Vec<mpsc::Sender<RawLog>> = self
            .inner
            .subscriptions
            .iter()
            .filter(|sub| sub.value().query.matches(&log))
            .map(|sub| sub.value().logs.clone())
            .collect();
        for target in targets {
            let _ = target.send(log.clone()).await;
        }
    }

    /// Terminates every live subscription with a transport error.
    pub fn fail_subscriptions(&self, reason: &str) {
        let ids: Vec<u64> = self.inner.subscriptions.iter().map(|e| *e.key()).collect();
        for id in ids {
            if let Some((_, mut sub)) = self.inner.subscriptions.remove(&id) {
                if let Some(failure) = sub.failure.take() {
                    let _ = failure.send(Error::Transport(reason.to_string()));
                }
                // Dropping the sub closes its log channel; buffered logs
                // stay readable on the receiver side.
            }
        }
    }

    /// Ends every live subscription without an error (natural termination).
    pub fn end_subscriptions(&self) {
        self.inner.subscriptions.clear();
    }

    /// Total transport requests served, across all methods.
    pub fn request_count(&self) -> u64 {
        self.inner.requests.load(Ordering::Relaxed)
    }

    /// How many subscription handles have been released.
    pub fn release_count(&self) -> u64 {
        self.inner.released.load(Ordering::Relaxed)
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.len()
    }

    /// The broadcast payload of an accepted operation.
    pub fn broadcast(&self, id: OperationId) -> Option<(Address, Bytes)> {
        self.inner.broadcasts.get(&id).map(|entry| entry.clone())
    }

    fn count_request(&self) {
        self.inner.requests.fetch_add(1, Ordering::Relaxed);
    }
}

#[async_trait]
impl Transport for MockLedger {
    async fn call(&self, address: Address, payload: Bytes, at: Position) -> Result<Bytes, Error> {
        self.count_request();
        self.inner
            .responses
            .get(&(address, payload, at))
            .map(|response| response.clone())
            .ok_or_else(|| Error::Transport("no staged response for call".to_string()))
    }

    async fn send_transaction(
        &self,
        address: Address,
        payload: Bytes,
    ) -> Result<OperationId, Error> {
        self.count_request();
        if let Some(reason) = self.inner.rejections.get(&payload) {
            return Err(Error::Rejected(reason.clone()));
        }
        let seq = self.inner.next_operation.fetch_add(1, Ordering::Relaxed) + 1;
        let id = B256::from(U256::from(seq));
        self.inner.broadcasts.insert(id, (address, payload));
        Ok(id)
    }

    async fn get_settlement(&self, id: OperationId) -> Result<Option<Settlement>, Error> {
        self.count_request();
        Ok(self.inner.settlements.get(&id).map(|s| s.clone()))
    }

    async fn filter_logs(&self, query: &LogQuery) -> Result<Vec<RawLog>, Error> {
        self.count_request();
        Ok(self
            .inner
            .history
            .lock()
            .unwrap()
            .iter()
            .filter(|log| query.matches(log))
            .cloned()
            .collect())
    }

    async fn subscribe_logs(&self, query: &LogQuery) -> Result<LogSubscription, Error> {
        self.count_request();
        let (log_tx, log_rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let (failure_tx, failure_rx) = oneshot::channel();
        let id = self.inner.next_subscription.fetch_add(1, Ordering::Relaxed);
        self.inner.subscriptions.insert(
            id,
            LiveSub {
                query: query.clone(),
                logs: log_tx,
                failure: Some(failure_tx),
            },
        );
        let inner = Arc::clone(&self.inner);
        let handle = SubscriptionHandle::new(move || {
            inner.subscriptions.remove(&id);
            inner.released.fetch_add(1, Ordering::Relaxed);
        });
        Ok(LogSubscription {
            logs: log_rx,
            failure: failure_rx,
            handle,
        })
    }
}

/// Sample interface used throughout the tests: a collateral vault exposing
/// two queries, two mutations and two event shapes.
pub fn vault_descriptor() -> InterfaceDescriptor {
    InterfaceDescriptor::parse(
        "program CollateralVault\n\
         query lockedOf(address owner) -> (uint64)\n\
         query totalLocked() -> (uint64)\n\
         mutate lock(address owner, uint64 amount)\n\
         mutate unlock(address owner, uint64 amount)\n\
         event ValueChanged(uint64 indexed id, uint64 value)\n\
         event CollateralLocked(address indexed owner, uint64 amount, bytes32 indexed ref)\n",
    )
    .expect("static interface text")
}

/// Encodes a call payload the way a bound [`crate::binding::Caller`] or
/// [`crate::binding::Transactor`] would, for staging and rejection keys.
pub fn encode_call(descriptor: &InterfaceDescriptor, name: &str, args: &[Value]) -> Bytes {
    let entry = descriptor.entry(name).expect("known entry");
    TextCodec.encode(entry.inputs(), args).expect("encodable args")
}

/// Encodes a query response payload for staging.
pub fn encode_result(descriptor: &InterfaceDescriptor, name: &str, values: &[Value]) -> Bytes {
    let entry = descriptor.entry(name).expect("known entry");
    TextCodec
        .encode(entry.outputs(), values)
        .expect("encodable results")
}

/// Indexed field value of a numeric id.
pub fn word(value: u64) -> B256 {
    B256::from(U256::from(value))
}

fn synthetic_tx_hash(block: u64, tx_index: u64) -> TxHash {
    let mut seed = [0u8; 16];
    seed[..8].copy_from_slice(&block.to_be_bytes());
    seed[8..].copy_from_slice(&tx_index.to_be_bytes());
    keccak256(seed)
}

/// `ValueChanged(uint64 indexed id, uint64 value)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValueChanged {
    pub id: u64,
    pub value: u64,
}

impl EventRecord for ValueChanged {
    const EVENT: &'static str = "ValueChanged";

    fn decode(raw: &RawLog) -> Result<Self, CodecError> {
        Ok(Self {
            id: topic_u64(raw, 0)?,
            value: data_u64(raw)?,
        })
    }
}

/// `CollateralLocked(address indexed owner, uint64 amount, bytes32 indexed ref)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollateralLocked {
    pub owner: Address,
    pub amount: u64,
    pub reference: B256,
}

impl EventRecord for CollateralLocked {
    const EVENT: &'static str = "CollateralLocked";

    fn decode(raw: &RawLog) -> Result<Self, CodecError> {
        Ok(Self {
            owner: Address::from_word(topic(raw, 0)?),
            amount: data_u64(raw)?,
            reference: topic(raw, 1)?,
        })
    }
}

/// Builds a well-formed `ValueChanged` raw log.
pub fn value_changed_log(
    descriptor: &InterfaceDescriptor,
    address: Address,
    block: u64,
    tx_index: u64,
    log_index: u64,
    id: u64,
    value: u64,
) -> RawLog {
    let entry = descriptor.entry(ValueChanged::EVENT).expect("known event");
    RawLog {
        address,
        selector: entry.selector(),
        topics: vec![word(id)],
        data: Bytes::copy_from_slice(&value.to_be_bytes()),
        block,
        tx_hash: synthetic_tx_hash(block, tx_index),
        tx_index,
        log_index,
    }
}

/// Builds a `ValueChanged` raw log whose payload does not decode.
pub fn malformed_value_changed_log(
    descriptor: &InterfaceDescriptor,
    address: Address,
    block: u64,
    tx_index: u64,
    log_index: u64,
    id: u64,
) -> RawLog {
    let mut log = value_changed_log(descriptor, address, block, tx_index, log_index, id, 0);
    log.data = Bytes::copy_from_slice(&[0xde, 0xad, 0xbe]);
    log
}

/// Builds a well-formed `CollateralLocked` raw log.
pub fn collateral_locked_log(
    descriptor: &InterfaceDescriptor,
    address: Address,
    block: u64,
    tx_index: u64,
    log_index: u64,
    owner: Address,
    amount: u64,
    reference: B256,
) -> RawLog {
    let entry = descriptor
        .entry(CollateralLocked::EVENT)
        .expect("known event");
    RawLog {
        address,
        selector: entry.selector(),
        topics: vec![owner.into_word(), reference],
        data: Bytes::copy_from_slice(&amount.to_be_bytes()),
        block,
        tx_hash: synthetic_tx_hash(block, tx_index),
        tx_index,
        log_index,
    }
}

fn topic(raw: &RawLog, position: usize) -> Result<B256, CodecError> {
    raw.topics
        .get(position)
        .copied()
        .ok_or_else(|| CodecError::new(format!("missing indexed field {position}")))
}

fn topic_u64(raw: &RawLog, position: usize) -> Result<u64, CodecError> {
    let value = U256::from_be_bytes(topic(raw, position)?.0);
    u64::try_from(value)
        .map_err(|_| CodecError::new(format!("indexed field {position} overflows u64")))
}

fn data_u64(raw: &RawLog) -> Result<u64, CodecError> {
    let bytes: [u8; 8] = raw
        .data
        .as_ref()
        .try_into()
        .map_err(|_| CodecError::new("payload is not a u64"))?;
    Ok(u64::from_be_bytes(bytes))
}
