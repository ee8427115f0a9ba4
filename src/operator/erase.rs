//! The erasure adapter: wraps a [`TypedOperator`] so it can sit in the chain's homogeneous
//! `dyn StreamOperator` storage.

use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::metrics::MetricGroup;
use crate::operator::{
    BoundedMultiInput, BoundedOneInput, InputKind, OpResult, StreamOperator, TwoInputOperator,
};
use crate::output::OutputSink;
use crate::record::ErasedRecord;
use crate::watermark::{LatencyMarker, Watermark};

use super::typed::{TypedOperator, TypedOutput};

/// A handle to an operator already installed in the chain. `Rc<RefCell<_>>` rather than a plain
/// reference because a chaining output and the chain controller's flat operator list both need a
/// live handle to the same operator, and the chain never leaves the single task thread that owns
/// it (see `DESIGN.md` for the single-threaded justification for not requiring `Send`/`Sync`
/// here).
pub type OperatorHandle = Rc<RefCell<dyn StreamOperator>>;

/// Bridges a [`TypedOperator<In, Out, In2>`] into [`StreamOperator`]. Holds the operator's own
/// output sink internally, the way the reference engine's operators hold `this.output`, so the
/// erased `process_element`/etc. signatures never take an output parameter.
pub struct Erase<In, Out, O, In2 = ()> {
    inner: O,
    output: Box<dyn OutputSink>,
    metrics: MetricGroup,
    _marker: PhantomData<fn(In, In2) -> Out>,
}

impl<In, Out, O, In2> Erase<In, Out, O, In2>
where
    O: TypedOperator<In, Out, In2>,
{
    pub fn new(inner: O, output: Box<dyn OutputSink>) -> Self {
        Self {
            inner,
            output,
            metrics: MetricGroup::new(),
            _marker: PhantomData,
        }
    }

    fn typed_output(&mut self) -> TypedOutput<'_, Out>
    where
        Out: Send + 'static,
    {
        TypedOutput::new(&mut *self.output)
    }
}

fn downcast_mismatch(expected: &str) -> crate::error::OperatorError {
    format!("process_element invoked with a value that does not downcast to `{expected}`").into()
}

impl<In, Out, O, In2> StreamOperator for Erase<In, Out, O, In2>
where
    In: Send + 'static,
    Out: Send + 'static,
    In2: Send + 'static,
    O: TypedOperator<In, Out, In2>,
{
    fn process_element(&mut self, record: ErasedRecord) -> OpResult<()> {
        let typed = record
            .downcast::<In>()
            .map_err(|_| downcast_mismatch(std::any::type_name::<In>()))?;
        self.inner.set_key_context_element(typed.value());
        let mut out = self.typed_output();
        self.inner.process_element(typed, &mut out)
    }

    fn process_watermark(&mut self, watermark: Watermark) -> OpResult<()> {
        let mut out = self.typed_output();
        let result = self.inner.process_watermark(watermark, &mut out);
        // `self.output`'s own gauge is updated by the sink unconditionally (even while stream
        // status is idle and forwarding is suppressed, §4.2), so reading it back here is what
        // keeps `currentOutputWatermark` (§6) honest for this operator regardless of the outcome.
        self.metrics.current_output_watermark.set(self.output.watermark_gauge());
        result
    }

    fn process_latency_marker(&mut self, marker: LatencyMarker) -> OpResult<()> {
        let mut out = self.typed_output();
        self.inner.process_latency_marker(marker, &mut out)
    }

    fn set_key_context_element(&mut self, record: &ErasedRecord) {
        if let Some(value) = record.value().downcast_ref::<In>() {
            self.inner.set_key_context_element(value);
        }
    }

    fn close(&mut self) -> OpResult<()> {
        let mut out = self.typed_output();
        self.inner.close(&mut out)
    }

    fn prepare_snapshot_pre_barrier(&mut self, checkpoint_id: u64) -> OpResult<()> {
        self.inner.prepare_snapshot_pre_barrier(checkpoint_id)
    }

    fn metric_group(&self) -> &MetricGroup {
        &self.metrics
    }

    fn display_name(&self) -> &str {
        self.inner.display_name()
    }

    fn input_kind(&self) -> InputKind {
        self.inner.input_kind()
    }

    fn as_bounded_one_input(&mut self) -> Option<&mut dyn BoundedOneInput> {
        if self.inner.supports_bounded_one_input() {
            Some(self)
        } else {
            None
        }
    }

    fn as_bounded_multi_input(&mut self) -> Option<&mut dyn BoundedMultiInput> {
        if self.inner.supports_bounded_multi_input() {
            Some(self)
        } else {
            None
        }
    }

    fn as_two_input(&mut self) -> Option<&mut dyn TwoInputOperator> {
        if self.inner.supports_two_input() {
            Some(self)
        } else {
            None
        }
    }
}

impl<In, Out, O, In2> BoundedOneInput for Erase<In, Out, O, In2>
where
    In: Send + 'static,
    Out: Send + 'static,
    In2: Send + 'static,
    O: TypedOperator<In, Out, In2>,
{
    fn end_input(&mut self) -> OpResult<()> {
        let mut out = self.typed_output();
        self.inner.end_input(&mut out)
    }
}

impl<In, Out, O, In2> BoundedMultiInput for Erase<In, Out, O, In2>
where
    In: Send + 'static,
    Out: Send + 'static,
    In2: Send + 'static,
    O: TypedOperator<In, Out, In2>,
{
    fn end_input(&mut self, input_id: usize) -> OpResult<()> {
        let mut out = self.typed_output();
        self.inner.end_input_multi(input_id, &mut out)
    }
}

impl<In, Out, O, In2> TwoInputOperator for Erase<In, Out, O, In2>
where
    In: Send + 'static,
    Out: Send + 'static,
    In2: Send + 'static,
    O: TypedOperator<In, Out, In2>,
{
    fn process_element2(&mut self, record: ErasedRecord) -> OpResult<()> {
        let typed = record
            .downcast::<In2>()
            .map_err(|_| downcast_mismatch(std::any::type_name::<In2>()))?;
        let mut out = self.typed_output();
        self.inner.process_element2(typed, &mut out)
    }

    fn process_watermark2(&mut self, watermark: Watermark) -> OpResult<()> {
        let mut out = self.typed_output();
        self.inner.process_watermark2(watermark, &mut out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::StreamRecord;

    struct Increment;

    impl TypedOperator<i32, i32> for Increment {
        fn process_element(&mut self, record: StreamRecord<i32>, out: &mut TypedOutput<'_, i32>) -> OpResult<()> {
            out.collect(record.map(|v| v + 1))
        }

        fn display_name(&self) -> &str {
            "increment"
        }
    }

    struct RecordingSink {
        received: Rc<RefCell<Vec<i32>>>,
    }

    impl OutputSink for RecordingSink {
        fn collect(&mut self, record: ErasedRecord) -> crate::error::ChainResult<()> {
            let value = *record.into_value().downcast::<i32>().unwrap();
            self.received.borrow_mut().push(value);
            Ok(())
        }

        fn collect_tagged(
            &mut self,
            _tag: &crate::output_tag::ErasedOutputTag,
            _record: ErasedRecord,
        ) -> crate::error::ChainResult<()> {
            Ok(())
        }

        fn emit_watermark(&mut self, _watermark: Watermark) -> crate::error::ChainResult<()> {
            Ok(())
        }

        fn emit_latency_marker(&mut self, _marker: LatencyMarker) -> crate::error::ChainResult<()> {
            Ok(())
        }

        fn close(&mut self) -> crate::error::ChainResult<()> {
            Ok(())
        }

        fn watermark_gauge(&self) -> crate::record::Timestamp {
            crate::record::NO_WATERMARK
        }
    }

    #[test]
    fn erased_operator_downcasts_and_forwards() {
        let received = Rc::new(RefCell::new(Vec::new()));
        let sink = RecordingSink {
            received: received.clone(),
        };
        let mut op = Erase::new(Increment, Box::new(sink));
        op.process_element(StreamRecord::new(41i32).erase()).unwrap();
        assert_eq!(*received.borrow(), vec![42]);
    }

    #[test]
    fn process_element_with_wrong_type_reports_mismatch() {
        let received = Rc::new(RefCell::new(Vec::new()));
        let sink = RecordingSink { received };
        let mut op = Erase::new(Increment, Box::new(sink));
        let err = op
            .process_element(StreamRecord::new("not an i32".to_string()).erase())
            .unwrap_err();
        assert!(err.to_string().contains("i32"));
    }

    #[derive(Default)]
    struct SinkOperator {
        metrics: MetricGroup,
    }

    impl StreamOperator for SinkOperator {
        fn process_element(&mut self, _record: ErasedRecord) -> OpResult<()> {
            Ok(())
        }
        fn process_watermark(&mut self, _watermark: Watermark) -> OpResult<()> {
            Ok(())
        }
        fn process_latency_marker(&mut self, _marker: LatencyMarker) -> OpResult<()> {
            Ok(())
        }
        fn set_key_context_element(&mut self, _record: &ErasedRecord) {}
        fn close(&mut self) -> OpResult<()> {
            Ok(())
        }
        fn metric_group(&self) -> &MetricGroup {
            &self.metrics
        }
        fn display_name(&self) -> &str {
            "sink"
        }
        fn input_kind(&self) -> InputKind {
            InputKind::One
        }
    }

    #[test]
    fn process_watermark_mirrors_the_output_sinks_gauge_into_current_output_watermark() {
        use crate::output::chaining::ChainingOutput;
        use crate::watermark::StreamStatus;
        use std::cell::Cell;

        let downstream: Rc<RefCell<dyn StreamOperator>> = Rc::new(RefCell::new(SinkOperator::default()));
        let status = Rc::new(Cell::new(StreamStatus::Active));
        let chaining = ChainingOutput::new(downstream, None, status);
        let mut op = Erase::new(Increment, Box::new(chaining));

        op.process_watermark(Watermark::new(77)).unwrap();
        assert_eq!(op.metric_group().current_output_watermark.get(), 77);
    }
}
