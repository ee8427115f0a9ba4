//! The chain's error taxonomy: a single closed enum, in the style of the engine's own
//! `NetworkSendError`/`NetworkTrySendError`, rather than string errors or a boxed `dyn Error` at
//! every call site. Every fallible chain operation (operator dispatch, output emission, chain
//! construction) returns a [`ChainResult`].

use thiserror::Error;

/// A raw failure surfaced by user operator code (or anything it calls), boxed so the chain
/// doesn't need to know its concrete type. Operators return this from their own methods; the
/// output sink that invoked them is what turns it into a [`ChainError::ChainedOperator`].
pub type OperatorError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type ChainResult<T = ()> = Result<T, ChainError>;

#[derive(Debug, Error)]
pub enum ChainError {
    /// An operator's `processElement`/`processWatermark`/`processLatencyMarker`/`close`/`endInput`
    /// raised an error while invoked from its upstream sink. Wraps whatever that call returned —
    /// which, for an operator several hops downstream of the failure's origin, may itself be a
    /// `ChainedOperator` from a previous hop. That nesting is intentional: every chaining output
    /// along the path wraps once, so the final error traces the exact call path.
    #[error("exception in chained operator `{operator}`")]
    ChainedOperator {
        operator: String,
        #[source]
        source: OperatorError,
    },

    /// A side-output emission reached a chaining sink whose bound tag shares an id with the
    /// emitted tag but not its element type — two distinct `OutputTag`s were declared with the
    /// same name. See `ErasedOutputTag` for why this can only be caught here, not at tag
    /// construction time.
    #[error(
        "side output tag `{tag_id}` rejected a record: multiple OutputTags with different types but identical names"
    )]
    SideOutputTypeMismatch { tag_id: String },

    /// A network writer output failed to enqueue, flush, or broadcast an event. Fatal to the
    /// task; never retried at this layer.
    #[error("network writer output failed: {0}")]
    Output(#[source] OutputWriteError),

    /// Raised while assembling the chain, before it is usable. The chain builder closes every
    /// network writer output already created before propagating this.
    #[error("failed to build operator chain: {0}")]
    Build(String),
}

impl ChainError {
    pub fn chained_operator(operator: impl Into<String>, source: impl Into<OperatorError>) -> Self {
        ChainError::ChainedOperator {
            operator: operator.into(),
            source: source.into(),
        }
    }

    pub fn side_output_type_mismatch(tag_id: impl Into<String>) -> Self {
        ChainError::SideOutputTypeMismatch {
            tag_id: tag_id.into(),
        }
    }

    pub fn build(message: impl Into<String>) -> Self {
        ChainError::Build(message.into())
    }
}

impl From<OutputWriteError> for ChainError {
    fn from(value: OutputWriteError) -> Self {
        ChainError::Output(value)
    }
}

/// The narrow failure mode a [`crate::output::network::RecordWriter`] can report.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct OutputWriteError(pub String);

impl OutputWriteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
