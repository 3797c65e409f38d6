//! Client-side bindings for programs deployed on an append-only ledger.
//!
//! # Overview
//!
//! [`bind`] pairs a deployed instance's address with its parsed
//! [`descriptor::InterfaceDescriptor`], a [`transport::Transport`] handle
//! and a [`codec::Codec`]. The resulting [`binding::Binding`] derives
//! narrow capability views without re-parsing anything:
//!
//! * [`binding::Caller`] executes read-only queries at a chosen point in
//!   ledger time.
//! * [`binding::Transactor`] broadcasts state-changing operations and
//!   hands back a [`binding::PendingOperation`];
//!   [`confirm::ConfirmationTracker`] waits for its settlement and
//!   classifies the outcome.
//! * [`event::EventSource`] replays past event occurrences as a pull
//!   [`event::EventIterator`] or delivers future ones live, either behind
//!   the same iterator or pushed to a sink by a background watch task.
//!
//! Wire encoding and the node protocol are collaborators behind the
//! [`codec::Codec`] and [`transport::Transport`] traits; this layer
//! classifies and forwards their failures ([`Error`]) and never retries.
//!
//! See `./tests` for end-to-end examples against the in-memory
//! [`testing::MockLedger`].
//!
//! # Limitations/follow-ups
//!
//! * Failed settlements carry their raw receipt on
//!   [`Error::ExecutionFailed`]; structured revert-reason decoding is the
//!   caller's concern for now.

pub mod binding;
pub mod codec;
pub mod confirm;
pub mod descriptor;
pub mod error;
pub mod event;
pub mod testing;
pub mod transport;

pub use binding::{Binding, Caller, PendingOperation, Transactor, bind, bind_shared};
pub use codec::{Codec, CodecError};
pub use confirm::ConfirmationTracker;
pub use descriptor::{Entry, EntryKind, InterfaceDescriptor, ParamShape};
pub use error::Error;
pub use event::{EventIterator, EventRecord, EventSource, Occurrence, WatchHandle};
pub use transport::{
    BlockRange, LogQuery, LogSubscription, OperationId, Position, RawLog, Settlement,
    SettleStatus, SubscriptionHandle, Topic, Transport,
};
