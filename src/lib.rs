//! `taskchain` assembles a parallel task's chained stream operators into one execution unit.
//!
//! A task's input reader feeds records into the [`chain::OperatorChain`]'s entry point; each
//! operator writes into its own configured [`output::OutputSink`] (chaining into the next
//! operator, fanning out to several, or handing off to a network writer). The chain also carries
//! watermarks, stream-status toggles, latency markers, checkpoint barriers and cancel markers,
//! and end-of-input signals, and owns the lifecycle of the task's network writer outputs.
//!
//! Concrete operators are authored against [`operator::TypedOperator`]; [`operator::Erase`]
//! bridges a typed operator into the chain's homogeneous, type-erased storage. A
//! [`chain::ChainBuilder`] assembles a [`chain::OperatorChain`] from a [`config::StreamConfig`]
//! tree and an [`chain::OperatorFactory`].

pub mod chain;
pub mod config;
pub mod error;
pub mod metrics;
pub mod operator;
pub mod output;
pub mod output_tag;
pub mod record;
pub mod test_support;
pub mod watermark;

pub use chain::{ChainBuilder, ContainingTask, OperatorChain, OperatorFactory};
pub use config::{InputSelection, OutputSelector, StreamConfig, StreamEdge};
pub use error::{ChainError, ChainResult, OperatorError, OutputWriteError};
pub use operator::{
    BoundedMultiInput, BoundedOneInput, Erase, InputKind, OperatorHandle, StreamOperator, TwoInputOperator,
    TypedOperator, TypedOutput,
};
pub use output::OutputSink;
pub use output_tag::{ErasedOutputTag, OutputTag};
pub use record::{ErasedRecord, ErasedValue, StreamRecord, Timestamp};
pub use watermark::{LatencyMarker, StreamStatus, Watermark};
