use crate::{codec::CodecError, transport::Settlement};

/// Error returned by bindings and their derived views.
///
/// This layer classifies and forwards; it never retries. Every variant
/// carries enough raw context (receipt, codec message, transport message)
/// for the caller to diagnose without re-querying the node.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Static descriptor validation failed. Surfaced at construction, never
    /// later.
    #[error("descriptor validation failed: {0}")]
    Binding(String),

    /// Caller-supplied arguments do not match the descriptor shapes.
    #[error("argument encoding failed: {0}")]
    Encoding(CodecError),

    /// Transport-returned data does not match the descriptor shapes.
    #[error("response decoding failed: {0}")]
    Decoding(CodecError),

    /// Network or node-level failure. Retry policy belongs to the caller or
    /// the transport, not here.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The node refused the operation before broadcasting it.
    #[error("operation rejected before broadcast: {0}")]
    Rejected(String),

    /// The operation was broadcast and settled, but the ledger marked it
    /// unsuccessful. Carries the full settlement with its raw receipt.
    #[error("operation {} settled with failure status", .0.operation)]
    ExecutionFailed(Box<Settlement>),

    /// A wait or watch was cancelled or timed out by the caller. The
    /// underlying broadcast is unaffected and may still settle.
    #[error("cancelled before the operation settled")]
    Cancelled,
}

impl Error {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// The failed settlement, when the error is [`Error::ExecutionFailed`].
    pub fn settlement(&self) -> Option<&Settlement> {
        match self {
            Error::ExecutionFailed(settlement) => Some(settlement),
            _ => None,
        }
    }
}
