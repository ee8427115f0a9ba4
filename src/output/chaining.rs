//! The chaining output (§4.2): invokes the next operator in-process.

use crate::error::ChainResult;
use crate::metrics::WatermarkGauge;
use crate::operator::OperatorHandle;
use crate::output_tag::ErasedOutputTag;
use crate::record::{ErasedRecord, ErasedSerializer, Timestamp};
use crate::watermark::{LatencyMarker, Watermark};

use super::{status_allows_watermark, OutputSink, StatusHandle};

/// Binds to one downstream operator and, optionally, the side-output tag it carries records for.
/// A producer with both a main-stream successor and one or more side-output successors holds one
/// `ChainingOutput` per successor; `output_tag` is what tells each one which emits are theirs.
pub struct ChainingOutput {
    downstream: OperatorHandle,
    output_tag: Option<ErasedOutputTag>,
    status: StatusHandle,
    gauge: WatermarkGauge,
}

impl ChainingOutput {
    pub fn new(downstream: OperatorHandle, output_tag: Option<ErasedOutputTag>, status: StatusHandle) -> Self {
        Self {
            downstream,
            output_tag,
            status,
            gauge: WatermarkGauge::new(),
        }
    }

    fn forward(&mut self, record: ErasedRecord) -> ChainResult<()> {
        {
            let op = self.downstream.borrow();
            op.metric_group().num_records_in.inc();
        }
        let mut op = self.downstream.borrow_mut();
        op.set_key_context_element(&record);
        op.process_element(record)
            .map_err(|source| crate::error::ChainError::chained_operator(op.display_name(), source))
    }

    fn forward_watermark(&mut self, watermark: Watermark) -> ChainResult<()> {
        self.gauge.set(watermark.timestamp());
        {
            let op = self.downstream.borrow();
            op.metric_group().current_input_watermark.set(watermark.timestamp());
        }
        if status_allows_watermark(&self.status) {
            let mut op = self.downstream.borrow_mut();
            op.process_watermark(watermark)
                .map_err(|source| crate::error::ChainError::chained_operator(op.display_name(), source))?;
        }
        Ok(())
    }
}

impl OutputSink for ChainingOutput {
    fn collect(&mut self, record: ErasedRecord) -> ChainResult<()> {
        if self.output_tag.is_some() {
            // This sink only forwards its bound side output; `collect` without a tag means main.
            return Ok(());
        }
        self.forward(record)
    }

    fn collect_tagged(&mut self, tag: &ErasedOutputTag, record: ErasedRecord) -> ChainResult<()> {
        match &self.output_tag {
            Some(bound) if bound.same_id(tag) && bound.same_type(tag) => self.forward(record),
            Some(bound) if bound.same_id(tag) => {
                Err(crate::error::ChainError::side_output_type_mismatch(tag.id()))
            }
            _ => Ok(()),
        }
    }

    fn emit_watermark(&mut self, watermark: Watermark) -> ChainResult<()> {
        self.forward_watermark(watermark)
    }

    fn emit_latency_marker(&mut self, marker: LatencyMarker) -> ChainResult<()> {
        let mut op = self.downstream.borrow_mut();
        op.process_latency_marker(marker)
            .map_err(|source| crate::error::ChainError::chained_operator(op.display_name(), source))
    }

    fn close(&mut self) -> ChainResult<()> {
        let mut op = self.downstream.borrow_mut();
        op.close()
            .map_err(|source| crate::error::ChainError::chained_operator(op.display_name(), source))
    }

    fn watermark_gauge(&self) -> Timestamp {
        self.gauge.get()
    }
}

/// Identical contract to [`ChainingOutput`], but hands the downstream operator a deep copy
/// produced through `serializer` instead of the original value. Selected by the chain builder
/// when object reuse is disabled.
pub struct CopyingChainingOutput {
    inner: ChainingOutput,
    serializer: Box<dyn ErasedSerializer>,
}

impl CopyingChainingOutput {
    pub fn new(
        downstream: OperatorHandle,
        output_tag: Option<ErasedOutputTag>,
        status: StatusHandle,
        serializer: Box<dyn ErasedSerializer>,
    ) -> Self {
        Self {
            inner: ChainingOutput::new(downstream, output_tag, status),
            serializer,
        }
    }
}

impl OutputSink for CopyingChainingOutput {
    fn collect(&mut self, record: ErasedRecord) -> ChainResult<()> {
        if self.inner.output_tag.is_some() {
            return Ok(());
        }
        let copy = record.deep_copy_erased(self.serializer.as_ref());
        self.inner.forward(copy)
    }

    fn collect_tagged(&mut self, tag: &ErasedOutputTag, record: ErasedRecord) -> ChainResult<()> {
        match &self.inner.output_tag {
            Some(bound) if bound.same_id(tag) && bound.same_type(tag) => {
                let copy = record.deep_copy_erased(self.serializer.as_ref());
                self.inner.forward(copy)
            }
            Some(bound) if bound.same_id(tag) => {
                Err(crate::error::ChainError::side_output_type_mismatch(tag.id()))
            }
            _ => Ok(()),
        }
    }

    fn emit_watermark(&mut self, watermark: Watermark) -> ChainResult<()> {
        self.inner.forward_watermark(watermark)
    }

    fn emit_latency_marker(&mut self, marker: LatencyMarker) -> ChainResult<()> {
        self.inner.emit_latency_marker(marker)
    }

    fn close(&mut self) -> ChainResult<()> {
        self.inner.close()
    }

    fn watermark_gauge(&self) -> Timestamp {
        self.inner.watermark_gauge()
    }
}
