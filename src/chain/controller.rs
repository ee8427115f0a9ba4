//! The chain controller (§4.7): owns the assembled graph and drives its lifecycle.

use crate::config::InputSelection;
use crate::error::{ChainError, ChainResult};
use crate::operator::{InputKind, OperatorHandle};
use crate::output::network::NetworkOutputHandle;
use crate::output::{OutputSink, StatusHandle};
use crate::record::Timestamp;
use crate::watermark::StreamStatus;

/// Owns every operator and every network writer output produced by a [`super::ChainBuilder`].
/// `all_operators` is reverse-topological: index `len - 1` is the head, index `0` a deepest leaf.
pub struct OperatorChain {
    all_operators: Vec<OperatorHandle>,
    stream_outputs: Vec<NetworkOutputHandle>,
    chain_entry_point: Box<dyn OutputSink>,
    status: StatusHandle,
    finished_inputs: InputSelection,
    all_inputs_finished: bool,
}

impl OperatorChain {
    pub(crate) fn new(
        all_operators: Vec<OperatorHandle>,
        stream_outputs: Vec<NetworkOutputHandle>,
        chain_entry_point: Box<dyn OutputSink>,
        status: StatusHandle,
    ) -> Self {
        Self {
            all_operators,
            stream_outputs,
            chain_entry_point,
            status,
            finished_inputs: InputSelection::none(),
            all_inputs_finished: false,
        }
    }

    /// Accessor used by the task's input reader to feed records into the head operator.
    pub fn chain_entry_point(&mut self) -> &mut dyn OutputSink {
        self.chain_entry_point.as_mut()
    }

    pub fn broadcast_checkpoint_barrier(&mut self, checkpoint_id: u64, timestamp: Timestamp) -> ChainResult<()> {
        tracing::debug!(checkpoint_id, "broadcasting checkpoint barrier");
        for output in &self.stream_outputs {
            output.borrow_mut().broadcast_checkpoint_barrier(checkpoint_id, timestamp)?;
        }
        Ok(())
    }

    pub fn broadcast_checkpoint_cancel_marker(&mut self, checkpoint_id: u64) -> ChainResult<()> {
        tracing::debug!(checkpoint_id, "broadcasting checkpoint cancel marker");
        for output in &self.stream_outputs {
            output.borrow_mut().broadcast_checkpoint_cancel_marker(checkpoint_id)?;
        }
        Ok(())
    }

    /// Invokes each operator's pre-barrier hook head-to-tail (highest index first).
    pub fn prepare_snapshot_pre_barrier(&mut self, checkpoint_id: u64) -> ChainResult<()> {
        for operator in self.all_operators.iter().rev() {
            let name = operator.borrow().display_name().to_string();
            operator
                .borrow_mut()
                .prepare_snapshot_pre_barrier(checkpoint_id)
                .map_err(|source| ChainError::chained_operator(name, source))?;
        }
        Ok(())
    }

    /// Drives the end-of-input state machine (§4.7) for `input_id` (1-based).
    pub fn end_input(&mut self, input_id: usize) -> ChainResult<()> {
        if self.all_inputs_finished {
            return Ok(());
        }
        let head = self
            .all_operators
            .last()
            .expect("an assembled chain always has at least a head operator")
            .clone();
        let head_kind = head.borrow().input_kind();

        match head_kind {
            InputKind::Two => {
                if self.finished_inputs.contains(input_id) {
                    return Ok(());
                }
                let head_name = head.borrow().display_name().to_string();
                {
                    let mut head_mut = head.borrow_mut();
                    if let Some(multi) = head_mut.as_bounded_multi_input() {
                        multi
                            .end_input(input_id)
                            .map_err(|source| ChainError::chained_operator(head_name, source))?;
                    }
                }
                self.finished_inputs = self.finished_inputs.with(input_id);
                if self.finished_inputs.is_all_selected(2) {
                    self.all_inputs_finished = true;
                    self.finalize_end_input()?;
                }
            }
            InputKind::One => {
                self.finished_inputs = InputSelection::ALL;
                self.all_inputs_finished = true;
                self.finalize_end_input()?;
            }
        }
        Ok(())
    }

    /// All inputs have ended: walk the chain head-to-tail invoking `BoundedOneInput::end_input`
    /// on whichever operators declare that capability. Head-to-tail because an operator may still
    /// emit records downstream while finalizing.
    fn finalize_end_input(&mut self) -> ChainResult<()> {
        tracing::info!("end of input reached, finalizing chain");
        for operator in self.all_operators.iter().rev() {
            let name = operator.borrow().display_name().to_string();
            let mut op = operator.borrow_mut();
            if let Some(bounded) = op.as_bounded_one_input() {
                bounded
                    .end_input()
                    .map_err(|source| ChainError::chained_operator(name, source))?;
            }
        }
        Ok(())
    }

    pub fn flush_outputs(&mut self) -> ChainResult<()> {
        for output in &self.stream_outputs {
            output.borrow_mut().flush()?;
        }
        Ok(())
    }

    /// Closes every network writer output. Never throws: a failure to close one output is logged
    /// and the rest are still attempted.
    pub fn release_outputs(&mut self) {
        for output in &self.stream_outputs {
            if let Err(err) = output.borrow_mut().close() {
                tracing::warn!(%err, "failed to close network writer output during release");
            }
        }
    }

    pub fn toggle_stream_status(&mut self, status: StreamStatus) -> ChainResult<()> {
        if self.status.get() == status {
            return Ok(());
        }
        self.status.set(status);
        tracing::info!(?status, "stream status toggled");
        for output in &self.stream_outputs {
            output.borrow_mut().emit_stream_status(status)?;
        }
        Ok(())
    }

    pub fn stream_status(&self) -> StreamStatus {
        self.status.get()
    }

    pub fn all_operators(&self) -> &[OperatorHandle] {
        &self.all_operators
    }

    pub fn stream_outputs(&self) -> &[NetworkOutputHandle] {
        &self.stream_outputs
    }

    pub fn head_operator(&self) -> OperatorHandle {
        self.all_operators
            .last()
            .expect("an assembled chain always has at least a head operator")
            .clone()
    }

    pub fn chain_length(&self) -> usize {
        self.all_operators.len()
    }
}
