//! Bottom-up chain construction from a [`StreamConfig`] tree (§4.6).

use std::rc::Rc;
use std::vec::IntoIter;

use crate::config::{OutputSelector, StreamConfig, StreamEdge};
use crate::error::{ChainError, ChainResult};
use crate::operator::OperatorHandle;
use crate::output::broadcasting::{BroadcastingOutput, CopyingBroadcastingOutput};
use crate::output::chaining::{ChainingOutput, CopyingChainingOutput};
use crate::output::directed::{CopyingDirectedOutput, DirectedOutput};
use crate::output::network::{NetworkOutputHandle, NetworkSinkRef, NetworkWriterOutput, RecordWriter};
use crate::output::{OutputSink, StatusHandle};
use crate::output_tag::ErasedOutputTag;
use crate::record::ErasedSerializer;
use crate::watermark::StreamStatus;

use super::controller::OperatorChain;

/// What the builder needs from the surrounding task, per the external-interfaces section: a
/// single flag, since the chain only cares whether object reuse is enabled.
pub trait ContainingTask {
    fn is_object_reuse_enabled(&self) -> bool;
}

/// Instantiates concrete operators and supplies the per-operator data the builder cannot invent
/// on its own (concrete element types are erased by this point, so only the factory — which
/// authored the operators — still knows them).
pub trait OperatorFactory {
    fn create(&self, operator_id: &str, output: Box<dyn OutputSink>) -> ChainResult<OperatorHandle>;

    /// The serializer to use when a chaining output feeding the far end of `edge` must produce a
    /// defensive copy (object reuse disabled).
    fn edge_serializer(&self, edge: &StreamEdge) -> Box<dyn ErasedSerializer>;

    /// The serializer to use when `operator_id`'s own fan-out (broadcasting/directed) must
    /// produce copies for every recipient but the last.
    fn operator_output_serializer(&self, operator_id: &str) -> Box<dyn ErasedSerializer>;

    /// Output selectors configured for `operator_id`, in declaration order. Empty when the
    /// operator has none.
    fn output_selectors(&self, operator_id: &str) -> Vec<Box<dyn OutputSelector>>;

    /// The erased side-output tag `edge` carries, if any. `StreamEdge` itself only carries the
    /// tag's id (plain config data); the factory is what still holds the concrete `OutputTag<T>`
    /// that id was minted from.
    fn output_tag_for_edge(&self, edge: &StreamEdge) -> Option<ErasedOutputTag>;
}

/// Wires operators and outputs bottom-up from a `StreamConfig` tree rooted at the task's head
/// operator.
///
/// `record_writers` is consumed positionally, in the order this builder's recursion encounters
/// the tree's non-chained out-edges (a depth-first walk: a producer's own non-chained edges
/// before it descends into its chained children). That coupling mirrors the reference engine's
/// own fragile positional pairing between out-edges and writers — documented here rather than
/// hidden, per the open question this resolves.
pub struct ChainBuilder<'a> {
    task: &'a dyn ContainingTask,
    factory: &'a dyn OperatorFactory,
    status: StatusHandle,
    record_writers: IntoIter<Box<dyn RecordWriter>>,
    created_network_outputs: Vec<NetworkOutputHandle>,
    operators: Vec<OperatorHandle>,
}

impl<'a> ChainBuilder<'a> {
    pub fn new(task: &'a dyn ContainingTask, factory: &'a dyn OperatorFactory, record_writers: Vec<Box<dyn RecordWriter>>) -> Self {
        Self {
            task,
            factory,
            status: Rc::new(std::cell::Cell::new(StreamStatus::Active)),
            record_writers: record_writers.into_iter(),
            created_network_outputs: Vec::new(),
            operators: Vec::new(),
        }
    }

    pub fn build(mut self, root: &StreamConfig) -> ChainResult<OperatorChain> {
        match self.try_build(root) {
            Ok((entry, head)) => {
                self.operators.push(head);
                Ok(OperatorChain::new(
                    self.operators,
                    self.created_network_outputs,
                    entry,
                    self.status,
                ))
            }
            Err(err) => {
                for handle in &self.created_network_outputs {
                    if let Err(close_err) = handle.borrow_mut().close() {
                        tracing::warn!(%close_err, "failed to close network writer output during construction cleanup");
                    }
                }
                Err(err)
            }
        }
    }

    fn try_build(&mut self, root: &StreamConfig) -> ChainResult<(Box<dyn OutputSink>, OperatorHandle)> {
        let wrapped_output = self.build_operator_output(root)?;
        tracing::debug!(operator_id = %root.operator_id, "instantiating head operator");
        let head = self.factory.create(&root.operator_id, wrapped_output)?;
        let entry: Box<dyn OutputSink> = Box::new(ChainingOutput::new(head.clone(), None, self.status.clone()));
        Ok((entry, head))
    }

    /// Resolves `config`'s own out-edges into the single sink it should be instantiated against
    /// (step 1-4 of §4.6). Does not instantiate `config`'s own operator — the caller does that
    /// once this returns.
    fn build_operator_output(&mut self, config: &StreamConfig) -> ChainResult<Box<dyn OutputSink>> {
        let mut sinks: Vec<(StreamEdge, Box<dyn OutputSink>)> = Vec::with_capacity(
            config.non_chained_outputs.len() + config.chained_outputs.len(),
        );

        for edge in &config.non_chained_outputs {
            let writer = self.record_writers.next().ok_or_else(|| {
                ChainError::build("not enough record writers supplied for the task's non-chained out-edges")
            })?;
            let tag = self.factory.output_tag_for_edge(edge);
            tracing::debug!(source = %edge.source_operator_id, target = %edge.target_operator_id, "creating network writer output");
            let output = NetworkWriterOutput::new(writer, tag, self.status.clone());
            let handle: NetworkOutputHandle = Rc::new(std::cell::RefCell::new(output));
            self.created_network_outputs.push(handle.clone());
            sinks.push((edge.clone(), Box::new(NetworkSinkRef(handle))));
        }

        for edge in &config.chained_outputs {
            let child_config = config.chained_config_for(&edge.target_operator_id).ok_or_else(|| {
                ChainError::build(format!(
                    "no chained config found for target operator `{}`",
                    edge.target_operator_id
                ))
            })?;
            let child_sink = self.build_chained_child(edge, child_config)?;
            sinks.push((edge.clone(), child_sink));
        }

        let selectors = self.factory.output_selectors(&config.operator_id);
        let reuse_enabled = self.task.is_object_reuse_enabled();

        if selectors.is_empty() {
            if sinks.len() == 1 {
                return Ok(sinks.pop().expect("checked len == 1").1);
            }
            let plain: Vec<Box<dyn OutputSink>> = sinks.into_iter().map(|(_, sink)| sink).collect();
            let copier = self.factory.operator_output_serializer(&config.operator_id);
            return Ok(if reuse_enabled {
                Box::new(BroadcastingOutput::new(plain, self.status.clone(), copier))
            } else {
                Box::new(CopyingBroadcastingOutput::new(plain, self.status.clone(), copier))
            });
        }

        let named: Vec<(String, Box<dyn OutputSink>)> = sinks
            .into_iter()
            .map(|(edge, sink)| (edge.selected_name.unwrap_or_default(), sink))
            .collect();
        let copier = self.factory.operator_output_serializer(&config.operator_id);
        Ok(if reuse_enabled {
            Box::new(DirectedOutput::new(named, selectors, self.status.clone(), copier))
        } else {
            Box::new(CopyingDirectedOutput::new(named, selectors, self.status.clone(), copier))
        })
    }

    fn build_chained_child(&mut self, edge: &StreamEdge, child_config: &StreamConfig) -> ChainResult<Box<dyn OutputSink>> {
        let wrapped_output = self.build_operator_output(child_config)?;
        tracing::debug!(operator_id = %child_config.operator_id, "instantiating chained operator");
        let operator = self.factory.create(&child_config.operator_id, wrapped_output)?;
        self.operators.push(operator.clone());

        let tag = self.factory.output_tag_for_edge(edge);
        if self.task.is_object_reuse_enabled() {
            Ok(Box::new(ChainingOutput::new(operator, tag, self.status.clone())))
        } else {
            let serializer = self.factory.edge_serializer(edge);
            Ok(Box::new(CopyingChainingOutput::new(operator, tag, self.status.clone(), serializer)))
        }
    }
}
