//! Binding a deployed program instance to its interface.
//!
//! [`bind`] pairs an address with an [`InterfaceDescriptor`], a transport
//! handle and a codec. The resulting [`Binding`] manufactures the narrow
//! capability views on demand: [`Caller`] for queries, [`Transactor`] for
//! state-changing operations, [`EventSource`](crate::event::EventSource)
//! for logs, and a [`ConfirmationTracker`] for settlement waits. All of it
//! is purely local construction; nothing here touches the network.

use std::sync::Arc;

use alloy::primitives::Address;
use tracing::debug;

use crate::{
    codec::Codec,
    confirm::ConfirmationTracker,
    descriptor::InterfaceDescriptor,
    error::Error,
    event::EventSource,
    transport::{OperationId, Position, Transport},
};

/// Binds one deployed instance to its descriptor, transport and codec.
///
/// Validation here is static: the descriptor has already been checked at
/// construction, so the only rejected input is the zero address. No network
/// traffic.
pub fn bind<P: Transport, C: Codec>(
    address: Address,
    descriptor: InterfaceDescriptor,
    transport: P,
    codec: C,
) -> Result<Binding<P, C>, Error> {
    bind_shared(
        address,
        Arc::new(descriptor),
        Arc::new(transport),
        Arc::new(codec),
    )
}

/// Like [`bind`], for callers sharing one descriptor, transport or codec
/// across many instances of the same program kind.
pub fn bind_shared<P: Transport, C: Codec>(
    address: Address,
    descriptor: Arc<InterfaceDescriptor>,
    transport: Arc<P>,
    codec: Arc<C>,
) -> Result<Binding<P, C>, Error> {
    if address == Address::ZERO {
        return Err(Error::Binding("cannot bind the zero address".to_string()));
    }
    Ok(Binding {
        address,
        descriptor,
        transport,
        codec,
    })
}

/// One deployed program instance, bound. Owns nothing mutable; share it
/// freely across tasks.
pub struct Binding<P, C> {
    address: Address,
    descriptor: Arc<InterfaceDescriptor>,
    transport: Arc<P>,
    codec: Arc<C>,
}

impl<P, C> Clone for Binding<P, C> {
    fn clone(&self) -> Self {
        Self {
            address: self.address,
            descriptor: Arc::clone(&self.descriptor),
            transport: Arc::clone(&self.transport),
            codec: Arc::clone(&self.codec),
        }
    }
}

impl<P: Transport, C: Codec> Binding<P, C> {
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn descriptor(&self) -> &InterfaceDescriptor {
        &self.descriptor
    }

    /// Read-side view: executes queries.
    pub fn caller(&self) -> Caller<P, C> {
        Caller {
            address: self.address,
            descriptor: Arc::clone(&self.descriptor),
            transport: Arc::clone(&self.transport),
            codec: Arc::clone(&self.codec),
        }
    }

    /// Write-side view: submits state-changing operations.
    pub fn transactor(&self) -> Transactor<P, C> {
        Transactor {
            address: self.address,
            descriptor: Arc::clone(&self.descriptor),
            transport: Arc::clone(&self.transport),
            codec: Arc::clone(&self.codec),
        }
    }

    /// Event-side view: retrieves and streams the instance's logs.
    pub fn events(&self) -> EventSource<P> {
        EventSource::new(
            self.address,
            Arc::clone(&self.descriptor),
            Arc::clone(&self.transport),
        )
    }

    /// A settlement tracker sharing this binding's transport handle.
    pub fn tracker(&self) -> ConfirmationTracker<P> {
        ConfirmationTracker::new(Arc::clone(&self.transport))
    }
}

/// Executes read-only invocations. No observable side effects; safe to
/// retry freely.
pub struct Caller<P, C: Codec> {
    address: Address,
    descriptor: Arc<InterfaceDescriptor>,
    transport: Arc<P>,
    codec: Arc<C>,
}

impl<P: Transport, C: Codec> Caller<P, C> {
    /// Calls a query entry at the latest ledger position.
    pub async fn call(&self, name: &str, args: &[C::Value]) -> Result<Vec<C::Value>, Error> {
        self.call_at(name, args, Position::Latest).await
    }

    /// Calls a query entry at a caller-specified point in ledger time.
    pub async fn call_at(
        &self,
        name: &str,
        args: &[C::Value],
        at: Position,
    ) -> Result<Vec<C::Value>, Error> {
        let entry = self.descriptor.query(name)?;
        let payload = self
            .codec
            .encode(entry.inputs(), args)
            .map_err(Error::Encoding)?;
        let response = self.transport.call(self.address, payload, at).await?;
        self.codec
            .decode(entry.outputs(), &response)
            .map_err(Error::Decoding)
    }
}

/// Submits state-changing invocations. Returns as soon as the transport
/// accepts the broadcast; settlement is tracked separately so many
/// operations can be in flight and confirmed independently.
pub struct Transactor<P, C: Codec> {
    address: Address,
    descriptor: Arc<InterfaceDescriptor>,
    transport: Arc<P>,
    codec: Arc<C>,
}

impl<P: Transport, C: Codec> Transactor<P, C> {
    pub async fn submit(&self, name: &str, args: &[C::Value]) -> Result<PendingOperation, Error> {
        let entry = self.descriptor.mutation(name)?;
        let payload = self
            .codec
            .encode(entry.inputs(), args)
            .map_err(Error::Encoding)?;
        let id = self.transport.send_transaction(self.address, payload).await?;
        debug!(operation = %id, entry = name, "operation broadcast");
        Ok(PendingOperation {
            id,
            entry: entry.name().to_string(),
            address: self.address,
        })
    }
}

/// A broadcast operation awaiting settlement. A value: created by
/// [`Transactor::submit`], consumed by
/// [`ConfirmationTracker::wait`](crate::confirm::ConfirmationTracker::wait),
/// never mutated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingOperation {
    id: OperationId,
    entry: String,
    address: Address,
}

impl PendingOperation {
    pub fn id(&self) -> OperationId {
        self.id
    }

    /// Name of the mutate entry that produced the operation.
    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn address(&self) -> Address {
        self.address
    }
}
