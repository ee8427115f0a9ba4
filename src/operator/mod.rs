//! Operators: black-box processing units wired into the chain.
//!
//! Concrete operator logic is authored against [`TypedOperator`], which is strongly typed in its
//! element types; the chain itself stores operators behind the type-erased [`StreamOperator`]
//! trait object, via the [`Erase`] adapter. Optional capabilities ([`BoundedOneInput`],
//! [`BoundedMultiInput`], [`TwoInputOperator`]) are exposed through capability-query methods
//! rather than deep inheritance, per the redesign note in the specification.

mod erase;
mod typed;

pub use erase::{Erase, OperatorHandle};
pub use typed::{TypedOperator, TypedOutput};

use crate::error::OperatorError;
use crate::metrics::MetricGroup;
use crate::record::ErasedRecord;
use crate::watermark::{LatencyMarker, Watermark};

pub type OpResult<T = ()> = Result<T, OperatorError>;

/// Whether an operator's head position expects one or two inputs. Only the head operator's kind
/// matters to the chain controller's end-of-input state machine (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    One,
    Two,
}

/// The capability set every chained operator implements.
pub trait StreamOperator {
    fn process_element(&mut self, record: ErasedRecord) -> OpResult<()>;

    fn process_watermark(&mut self, watermark: Watermark) -> OpResult<()>;

    fn process_latency_marker(&mut self, marker: LatencyMarker) -> OpResult<()>;

    /// Set the key context for the record about to be processed. A no-op for operators that
    /// don't key their state.
    fn set_key_context_element(&mut self, record: &ErasedRecord);

    fn close(&mut self) -> OpResult<()>;

    /// Hook invoked before a checkpoint barrier is broadcast. Most operators have nothing to do
    /// here; the default is a no-op.
    fn prepare_snapshot_pre_barrier(&mut self, _checkpoint_id: u64) -> OpResult<()> {
        Ok(())
    }

    fn metric_group(&self) -> &MetricGroup;

    fn display_name(&self) -> &str;

    fn input_kind(&self) -> InputKind {
        InputKind::One
    }

    fn as_bounded_one_input(&mut self) -> Option<&mut dyn BoundedOneInput> {
        None
    }

    fn as_bounded_multi_input(&mut self) -> Option<&mut dyn BoundedMultiInput> {
        None
    }

    fn as_two_input(&mut self) -> Option<&mut dyn TwoInputOperator> {
        None
    }
}

/// Declares that an operator accepts a single `endInput()` signal once its one input has ended.
pub trait BoundedOneInput {
    fn end_input(&mut self) -> OpResult<()>;
}

/// Declares that an operator accepts per-input `endInput(id)` signals, used by a two-input head
/// that needs to react as each of its inputs ends independently.
pub trait BoundedMultiInput {
    fn end_input(&mut self, input_id: usize) -> OpResult<()>;
}

/// Declares that an operator accepts a second input stream. The chain controller never calls
/// `process_element2` itself (the task's second input reader does); it only uses this capability
/// query to recognize a two-input head for the end-of-input state machine.
pub trait TwoInputOperator {
    fn process_element2(&mut self, record: ErasedRecord) -> OpResult<()>;
    fn process_watermark2(&mut self, watermark: Watermark) -> OpResult<()>;
}
