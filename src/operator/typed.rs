//! The strongly-typed authoring surface. Operator implementations are written against
//! [`TypedOperator`]; [`super::Erase`] is the only place a concrete implementation touches
//! [`crate::record::ErasedRecord`].

use crate::error::{ChainError, OperatorError};
use crate::operator::{InputKind, OpResult};
use crate::output::OutputSink;
use crate::output_tag::OutputTag;
use crate::record::StreamRecord;
use crate::watermark::{LatencyMarker, Watermark};

/// A typed view over the operator's erased output sink, handed to every [`TypedOperator`] method
/// that may emit. Each call erases its argument at the last possible moment.
pub struct TypedOutput<'a, Out> {
    sink: &'a mut dyn OutputSink,
    _marker: std::marker::PhantomData<Out>,
}

impl<'a, Out: Send + 'static> TypedOutput<'a, Out> {
    pub(crate) fn new(sink: &'a mut dyn OutputSink) -> Self {
        Self {
            sink,
            _marker: std::marker::PhantomData,
        }
    }

    fn lift(err: ChainError) -> OperatorError {
        Box::new(err)
    }

    pub fn collect(&mut self, record: StreamRecord<Out>) -> OpResult<()> {
        self.sink.collect(record.erase()).map_err(Self::lift)
    }

    pub fn collect_tagged<T: Send + 'static>(
        &mut self,
        tag: &OutputTag<T>,
        record: StreamRecord<T>,
    ) -> OpResult<()> {
        self.sink
            .collect_tagged(&tag.erase(), record.erase())
            .map_err(Self::lift)
    }

    pub fn emit_watermark(&mut self, watermark: Watermark) -> OpResult<()> {
        self.sink.emit_watermark(watermark).map_err(Self::lift)
    }

    pub fn emit_latency_marker(&mut self, marker: LatencyMarker) -> OpResult<()> {
        self.sink.emit_latency_marker(marker).map_err(Self::lift)
    }
}

/// Author-facing operator contract. `In2` defaults to `()` for single-input operators; a
/// two-input operator sets it to its second element type and overrides
/// [`TypedOperator::supports_two_input`].
pub trait TypedOperator<In, Out, In2 = ()> {
    fn process_element(&mut self, record: StreamRecord<In>, out: &mut TypedOutput<'_, Out>) -> OpResult<()>;

    /// Default forwards the watermark unchanged; override for an operator that holds back event
    /// time (e.g. a windowing operator).
    fn process_watermark(&mut self, watermark: Watermark, out: &mut TypedOutput<'_, Out>) -> OpResult<()> {
        out.emit_watermark(watermark)
    }

    fn process_latency_marker(&mut self, marker: LatencyMarker, out: &mut TypedOutput<'_, Out>) -> OpResult<()> {
        out.emit_latency_marker(marker)
    }

    fn set_key_context_element(&mut self, _value: &In) {}

    fn close(&mut self, _out: &mut TypedOutput<'_, Out>) -> OpResult<()> {
        Ok(())
    }

    fn prepare_snapshot_pre_barrier(&mut self, _checkpoint_id: u64) -> OpResult<()> {
        Ok(())
    }

    fn display_name(&self) -> &str;

    fn input_kind(&self) -> InputKind {
        InputKind::One
    }

    fn supports_bounded_one_input(&self) -> bool {
        false
    }

    fn end_input(&mut self, _out: &mut TypedOutput<'_, Out>) -> OpResult<()> {
        Ok(())
    }

    fn supports_bounded_multi_input(&self) -> bool {
        false
    }

    fn end_input_multi(&mut self, _input_id: usize, _out: &mut TypedOutput<'_, Out>) -> OpResult<()> {
        Ok(())
    }

    fn supports_two_input(&self) -> bool {
        false
    }

    fn process_element2(&mut self, _record: StreamRecord<In2>, _out: &mut TypedOutput<'_, Out>) -> OpResult<()> {
        Ok(())
    }

    fn process_watermark2(&mut self, watermark: Watermark, out: &mut TypedOutput<'_, Out>) -> OpResult<()> {
        out.emit_watermark(watermark)
    }
}
