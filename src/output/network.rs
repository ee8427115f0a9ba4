//! The network writer output (§4.5): the terminal sink handing records to another task.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{ChainResult, OutputWriteError};
use crate::metrics::WatermarkGauge;
use crate::output_tag::ErasedOutputTag;
use crate::record::{ErasedRecord, Timestamp};
use crate::watermark::{LatencyMarker, StreamStatus, Watermark};

use super::{status_allows_watermark, OutputSink, StatusHandle};

/// A non-record control event broadcast to every downstream channel a writer owns.
#[derive(Debug, Clone, PartialEq)]
pub enum BroadcastEvent {
    Watermark(Watermark),
    LatencyMarker(LatencyMarker),
    StreamStatus(StreamStatus),
    CheckpointBarrier { checkpoint_id: u64, timestamp: Timestamp },
    CheckpointCancelMarker { checkpoint_id: u64 },
}

/// The narrow contract this crate needs from the surrounding network layer: enqueue a record
/// (optionally tagged for a side output), broadcast a control event, flush batched output, and
/// release resources. Serialization onto the wire is the writer's own concern; this crate only
/// ever passes it an [`ErasedRecord`].
pub trait RecordWriter: Send {
    fn emit(&mut self, tag: Option<&ErasedOutputTag>, record: ErasedRecord) -> Result<(), OutputWriteError>;
    fn broadcast_event(&mut self, event: BroadcastEvent) -> Result<(), OutputWriteError>;
    fn flush(&mut self) -> Result<(), OutputWriteError>;
    fn close(&mut self) -> Result<(), OutputWriteError>;
}

/// Terminal chain sink wrapping a [`RecordWriter`]. Owned by the chain controller in
/// `streamOutputs` order; also reachable as an ordinary [`OutputSink`] from inside a chaining,
/// broadcasting, or directed output via [`NetworkSinkRef`].
pub struct NetworkWriterOutput {
    writer: Box<dyn RecordWriter>,
    output_tag: Option<ErasedOutputTag>,
    status: StatusHandle,
    gauge: WatermarkGauge,
}

impl NetworkWriterOutput {
    pub fn new(writer: Box<dyn RecordWriter>, output_tag: Option<ErasedOutputTag>, status: StatusHandle) -> Self {
        Self {
            writer,
            output_tag,
            status,
            gauge: WatermarkGauge::new(),
        }
    }

    pub fn flush(&mut self) -> ChainResult<()> {
        self.writer.flush().map_err(Into::into)
    }

    pub fn broadcast_checkpoint_barrier(&mut self, checkpoint_id: u64, timestamp: Timestamp) -> ChainResult<()> {
        self.writer
            .broadcast_event(BroadcastEvent::CheckpointBarrier { checkpoint_id, timestamp })
            .map_err(Into::into)
    }

    pub fn broadcast_checkpoint_cancel_marker(&mut self, checkpoint_id: u64) -> ChainResult<()> {
        self.writer
            .broadcast_event(BroadcastEvent::CheckpointCancelMarker { checkpoint_id })
            .map_err(Into::into)
    }

    pub fn emit_stream_status(&mut self, status: StreamStatus) -> ChainResult<()> {
        self.writer
            .broadcast_event(BroadcastEvent::StreamStatus(status))
            .map_err(Into::into)
    }
}

impl OutputSink for NetworkWriterOutput {
    fn collect(&mut self, record: ErasedRecord) -> ChainResult<()> {
        if self.output_tag.is_some() {
            return Ok(());
        }
        self.writer.emit(None, record).map_err(Into::into)
    }

    fn collect_tagged(&mut self, tag: &ErasedOutputTag, record: ErasedRecord) -> ChainResult<()> {
        match &self.output_tag {
            Some(bound) if bound.same_id(tag) && bound.same_type(tag) => {
                self.writer.emit(Some(bound), record).map_err(Into::into)
            }
            Some(bound) if bound.same_id(tag) => {
                Err(crate::error::ChainError::side_output_type_mismatch(tag.id()))
            }
            _ => Ok(()),
        }
    }

    fn emit_watermark(&mut self, watermark: Watermark) -> ChainResult<()> {
        self.gauge.set(watermark.timestamp());
        if status_allows_watermark(&self.status) {
            self.writer
                .broadcast_event(BroadcastEvent::Watermark(watermark))
                .map_err(Into::into)?;
        }
        Ok(())
    }

    fn emit_latency_marker(&mut self, marker: LatencyMarker) -> ChainResult<()> {
        self.writer
            .broadcast_event(BroadcastEvent::LatencyMarker(marker))
            .map_err(Into::into)
    }

    fn close(&mut self) -> ChainResult<()> {
        self.writer.close().map_err(Into::into)
    }

    fn watermark_gauge(&self) -> Timestamp {
        self.gauge.get()
    }
}

pub type NetworkOutputHandle = Rc<RefCell<NetworkWriterOutput>>;

/// A shared handle to a [`NetworkWriterOutput`], usable as an ordinary [`OutputSink`] from inside
/// a chaining/broadcasting/directed output while the chain controller retains its own handle to
/// the same instance for `flushOutputs`/`releaseOutputs`/checkpoint broadcast.
pub struct NetworkSinkRef(pub NetworkOutputHandle);

impl OutputSink for NetworkSinkRef {
    fn collect(&mut self, record: ErasedRecord) -> ChainResult<()> {
        self.0.borrow_mut().collect(record)
    }

    fn collect_tagged(&mut self, tag: &ErasedOutputTag, record: ErasedRecord) -> ChainResult<()> {
        self.0.borrow_mut().collect_tagged(tag, record)
    }

    fn emit_watermark(&mut self, watermark: Watermark) -> ChainResult<()> {
        self.0.borrow_mut().emit_watermark(watermark)
    }

    fn emit_latency_marker(&mut self, marker: LatencyMarker) -> ChainResult<()> {
        self.0.borrow_mut().emit_latency_marker(marker)
    }

    fn close(&mut self) -> ChainResult<()> {
        self.0.borrow_mut().close()
    }

    fn watermark_gauge(&self) -> Timestamp {
        self.0.borrow().watermark_gauge()
    }
}

/// A demo [`RecordWriter`] backed by an in-process [`flume`] channel, standing in for the real
/// network layer. Useful for tests and for exercising the chain without a cluster.
pub struct FlumeRecordWriter {
    records: flume::Sender<(Option<String>, ErasedRecord)>,
    events: flume::Sender<BroadcastEvent>,
}

impl FlumeRecordWriter {
    pub fn new(records: flume::Sender<(Option<String>, ErasedRecord)>, events: flume::Sender<BroadcastEvent>) -> Self {
        Self { records, events }
    }
}

impl RecordWriter for FlumeRecordWriter {
    fn emit(&mut self, tag: Option<&ErasedOutputTag>, record: ErasedRecord) -> Result<(), OutputWriteError> {
        self.records
            .send((tag.map(|t| t.id().to_string()), record))
            .map_err(|_| OutputWriteError::new("flume record channel disconnected"))
    }

    fn broadcast_event(&mut self, event: BroadcastEvent) -> Result<(), OutputWriteError> {
        self.events
            .send(event)
            .map_err(|_| OutputWriteError::new("flume event channel disconnected"))
    }

    fn flush(&mut self) -> Result<(), OutputWriteError> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), OutputWriteError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::record::StreamRecord;
    use crate::watermark::StreamStatus;

    fn writer_pair() -> (FlumeRecordWriter, flume::Receiver<(Option<String>, ErasedRecord)>, flume::Receiver<BroadcastEvent>) {
        let (record_tx, record_rx) = flume::unbounded();
        let (event_tx, event_rx) = flume::unbounded();
        (FlumeRecordWriter::new(record_tx, event_tx), record_rx, event_rx)
    }

    #[test]
    fn untagged_collect_enqueues_with_no_tag() {
        let (writer, record_rx, _events) = writer_pair();
        let status: StatusHandle = Rc::new(Cell::new(StreamStatus::Active));
        let mut sink = NetworkWriterOutput::new(Box::new(writer), None, status);
        sink.collect(StreamRecord::new(1i32).erase()).unwrap();
        let (tag, record) = record_rx.try_recv().unwrap();
        assert!(tag.is_none());
        assert_eq!(*record.downcast::<i32>().unwrap().value(), 1);
    }

    #[test]
    fn watermark_broadcasts_event_when_active() {
        let (writer, _records, event_rx) = writer_pair();
        let status: StatusHandle = Rc::new(Cell::new(StreamStatus::Active));
        let mut sink = NetworkWriterOutput::new(Box::new(writer), None, status);
        sink.emit_watermark(Watermark::new(10)).unwrap();
        assert_eq!(event_rx.try_recv().unwrap(), BroadcastEvent::Watermark(Watermark::new(10)));
    }

    #[test]
    fn checkpoint_barrier_is_broadcast_as_an_event() {
        let (writer, _records, event_rx) = writer_pair();
        let status: StatusHandle = Rc::new(Cell::new(StreamStatus::Active));
        let mut sink = NetworkWriterOutput::new(Box::new(writer), None, status);
        sink.broadcast_checkpoint_barrier(7, 100).unwrap();
        assert_eq!(
            event_rx.try_recv().unwrap(),
            BroadcastEvent::CheckpointBarrier {
                checkpoint_id: 7,
                timestamp: 100
            }
        );
    }
}
