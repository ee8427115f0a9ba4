//! Fake operators, sinks, and a minimal [`OperatorFactory`]/[`ContainingTask`] pair, in the style
//! of the reference engine's own `crate::test::FakeOperator` fixtures. Used by this crate's own
//! unit tests and available to integration tests under `tests/`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::chain::{ContainingTask, OperatorFactory};
use crate::config::{OutputSelector, StreamEdge};
use crate::error::ChainResult;
use crate::operator::{Erase, InputKind, OpResult, OperatorHandle, TypedOperator, TypedOutput};
use crate::output::OutputSink;
use crate::output_tag::ErasedOutputTag;
use crate::record::{CloneSerializer, ErasedSerializer, StreamRecord, TypeSerializerAdapter};
use crate::watermark::{LatencyMarker, Watermark};

/// Adds one to every `i32` it receives and forwards it.
pub struct IncrementOperator {
    name: String,
}

impl IncrementOperator {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl TypedOperator<i32, i32> for IncrementOperator {
    fn process_element(&mut self, record: StreamRecord<i32>, out: &mut TypedOutput<'_, i32>) -> OpResult<()> {
        out.collect(record.map(|v| v + 1))
    }

    fn display_name(&self) -> &str {
        &self.name
    }
}

/// Forwards every `i32` it receives unchanged. Used as a head operator in tests where the
/// interesting behavior lives downstream.
pub struct IdentityOperator {
    name: String,
}

impl IdentityOperator {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl TypedOperator<i32, i32> for IdentityOperator {
    fn process_element(&mut self, record: StreamRecord<i32>, out: &mut TypedOutput<'_, i32>) -> OpResult<()> {
        out.collect(record)
    }

    fn display_name(&self) -> &str {
        &self.name
    }
}

/// An operator that records whether `endInput` has been invoked, for exercising
/// [`BoundedOneInput`] through the erasure layer.
pub struct BoundedSink {
    name: String,
    pub end_input_calls: Rc<RefCell<usize>>,
}

impl BoundedSink {
    pub fn new(name: impl Into<String>, end_input_calls: Rc<RefCell<usize>>) -> Self {
        Self {
            name: name.into(),
            end_input_calls,
        }
    }
}

impl TypedOperator<i32, i32> for BoundedSink {
    fn process_element(&mut self, record: StreamRecord<i32>, out: &mut TypedOutput<'_, i32>) -> OpResult<()> {
        out.collect(record)
    }

    fn display_name(&self) -> &str {
        &self.name
    }

    fn supports_bounded_one_input(&self) -> bool {
        true
    }

    fn end_input(&mut self, _out: &mut TypedOutput<'_, i32>) -> OpResult<()> {
        *self.end_input_calls.borrow_mut() += 1;
        Ok(())
    }
}

/// A two-input head that records which input ids it has been told ended, via
/// [`BoundedMultiInput`].
pub struct TwoInputHead {
    name: String,
    pub ended_inputs: Rc<RefCell<Vec<usize>>>,
}

impl TwoInputHead {
    pub fn new(name: impl Into<String>, ended_inputs: Rc<RefCell<Vec<usize>>>) -> Self {
        Self {
            name: name.into(),
            ended_inputs,
        }
    }
}

impl TypedOperator<i32, i32, i32> for TwoInputHead {
    fn process_element(&mut self, record: StreamRecord<i32>, out: &mut TypedOutput<'_, i32>) -> OpResult<()> {
        out.collect(record)
    }

    fn display_name(&self) -> &str {
        &self.name
    }

    fn input_kind(&self) -> InputKind {
        InputKind::Two
    }

    fn supports_bounded_multi_input(&self) -> bool {
        true
    }

    fn end_input_multi(&mut self, input_id: usize, _out: &mut TypedOutput<'_, i32>) -> OpResult<()> {
        self.ended_inputs.borrow_mut().push(input_id);
        Ok(())
    }

    fn supports_two_input(&self) -> bool {
        true
    }

    fn process_element2(&mut self, record: StreamRecord<i32>, out: &mut TypedOutput<'_, i32>) -> OpResult<()> {
        out.collect(record)
    }
}

/// A terminal sink recording everything it has received, standing in for a network writer output
/// in tests that only care about the chain's in-process behavior.
#[derive(Default)]
pub struct RecordingSink {
    pub main: Vec<i32>,
    pub tagged: Vec<(String, i32)>,
    pub watermarks: Vec<i64>,
    pub latency_markers: usize,
    pub closed: bool,
}

pub type SharedRecordingSink = Rc<RefCell<RecordingSink>>;

pub struct RecordingOutputSink(pub SharedRecordingSink);

impl OutputSink for RecordingOutputSink {
    fn collect(&mut self, record: crate::record::ErasedRecord) -> ChainResult<()> {
        let value = *record.downcast::<i32>().map_err(|_| {
            crate::error::ChainError::build("recording sink received a non-i32 value")
        })?.value();
        self.0.borrow_mut().main.push(value);
        Ok(())
    }

    fn collect_tagged(&mut self, tag: &ErasedOutputTag, record: crate::record::ErasedRecord) -> ChainResult<()> {
        let value = *record.downcast::<i32>().map_err(|_| {
            crate::error::ChainError::build("recording sink received a non-i32 tagged value")
        })?.value();
        self.0.borrow_mut().tagged.push((tag.id().to_string(), value));
        Ok(())
    }

    fn emit_watermark(&mut self, watermark: Watermark) -> ChainResult<()> {
        self.0.borrow_mut().watermarks.push(watermark.timestamp());
        Ok(())
    }

    fn emit_latency_marker(&mut self, _marker: LatencyMarker) -> ChainResult<()> {
        self.0.borrow_mut().latency_markers += 1;
        Ok(())
    }

    fn close(&mut self) -> ChainResult<()> {
        self.0.borrow_mut().closed = true;
        Ok(())
    }

    fn watermark_gauge(&self) -> crate::record::Timestamp {
        self.0.borrow().watermarks.last().copied().unwrap_or(crate::record::NO_WATERMARK)
    }
}

/// A [`ContainingTask`] exposing a fixed object-reuse flag.
pub struct FixedReuseTask(pub bool);

impl ContainingTask for FixedReuseTask {
    fn is_object_reuse_enabled(&self) -> bool {
        self.0
    }
}

type Constructor = Box<dyn Fn(Box<dyn OutputSink>) -> OperatorHandle>;

/// An [`OperatorFactory`] built from a table of operator-id -> constructor closures, each
/// producing an [`Erase`]-wrapped operator. Every edge uses a plain `Clone`-based serializer
/// (sufficient for the `i32` element type every fixture in this module uses) and no output
/// selectors unless explicitly registered.
#[derive(Default)]
pub struct TestFactory {
    operators: RefCell<HashMap<String, Constructor>>,
    tags: RefCell<HashMap<(String, String), ErasedOutputTag>>,
    selectors: RefCell<HashMap<String, Vec<String>>>,
}

impl TestFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, operator_id: impl Into<String>, ctor: Constructor) {
        self.operators.borrow_mut().insert(operator_id.into(), ctor);
    }

    pub fn register_increment(&self, operator_id: impl Into<String>) {
        let id = operator_id.into();
        let name = id.clone();
        self.register(
            id,
            Box::new(move |output| -> OperatorHandle { Rc::new(RefCell::new(Erase::new(IncrementOperator::new(name.clone()), output))) }),
        );
    }

    pub fn register_identity(&self, operator_id: impl Into<String>) {
        let id = operator_id.into();
        let name = id.clone();
        self.register(
            id,
            Box::new(move |output| -> OperatorHandle { Rc::new(RefCell::new(Erase::new(IdentityOperator::new(name.clone()), output))) }),
        );
    }

    pub fn register_tag(&self, source_operator_id: impl Into<String>, target_operator_id: impl Into<String>, tag: ErasedOutputTag) {
        self.tags
            .borrow_mut()
            .insert((source_operator_id.into(), target_operator_id.into()), tag);
    }
}

impl OperatorFactory for TestFactory {
    fn create(&self, operator_id: &str, output: Box<dyn OutputSink>) -> ChainResult<OperatorHandle> {
        let operators = self.operators.borrow();
        let ctor = operators
            .get(operator_id)
            .ok_or_else(|| crate::error::ChainError::build(format!("no constructor registered for `{operator_id}`")))?;
        Ok(ctor(output))
    }

    fn edge_serializer(&self, _edge: &StreamEdge) -> Box<dyn ErasedSerializer> {
        Box::new(TypeSerializerAdapter::new(CloneSerializer))
    }

    fn operator_output_serializer(&self, _operator_id: &str) -> Box<dyn ErasedSerializer> {
        Box::new(TypeSerializerAdapter::new(CloneSerializer))
    }

    fn output_selectors(&self, operator_id: &str) -> Vec<Box<dyn OutputSelector>> {
        let selectors = self.selectors.borrow();
        match selectors.get(operator_id) {
            Some(names) => vec![Box::new(FixedSelector(names.clone()))],
            None => Vec::new(),
        }
    }

    fn output_tag_for_edge(&self, edge: &StreamEdge) -> Option<ErasedOutputTag> {
        self.tags
            .borrow()
            .get(&(edge.source_operator_id.clone(), edge.target_operator_id.clone()))
            .cloned()
    }
}

struct FixedSelector(Vec<String>);

impl OutputSelector for FixedSelector {
    fn select(&self, _record: &crate::record::ErasedRecord) -> Vec<String> {
        self.0.clone()
    }
}
