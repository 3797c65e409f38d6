//! The codec boundary: typed values in, opaque byte payloads out.
//!
//! Wire encoding is not implemented here. A [`Codec`] turns caller-supplied
//! values into the byte payloads the transport carries, and transport
//! responses back into values, checked against the parameter shapes of an
//! interface entry. [`crate::testing::TextCodec`] is the in-memory
//! implementation used by the test environment.

use alloy::primitives::Bytes;

use crate::descriptor::ParamShape;

/// Shape mismatch between values and the descriptor they are checked
/// against. The direction (encode vs decode) is assigned by the view that
/// invoked the codec.
#[derive(Clone, Debug, thiserror::Error)]
#[error("{0}")]
pub struct CodecError(String);

impl CodecError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Encodes and decodes call payloads against descriptor shapes.
pub trait Codec: Send + Sync + 'static {
    /// The typed value representation callers work with.
    type Value: Send + Sync + 'static;

    /// Encodes `args` against `shapes` into an opaque payload. Arity or
    /// type-tag mismatches fail; nothing is sent over the wire here.
    fn encode(&self, shapes: &[ParamShape], args: &[Self::Value]) -> Result<Bytes, CodecError>;

    /// Decodes an opaque payload into values of the given `shapes`.
    fn decode(&self, shapes: &[ParamShape], data: &[u8]) -> Result<Vec<Self::Value>, CodecError>;
}
