//! The output sink interface (§4.1) and the status-aware gating every sink variant shares.

pub mod broadcasting;
pub mod chaining;
pub mod directed;
pub mod network;

use std::cell::Cell;
use std::rc::Rc;

use crate::error::ChainResult;
use crate::output_tag::ErasedOutputTag;
use crate::record::{ErasedRecord, Timestamp};
use crate::watermark::{LatencyMarker, StreamStatus, Watermark};

/// A shared, non-owning handle to the chain controller's current stream status. Every sink reads
/// through one of these rather than owning the status itself — the controller is the sole writer
/// (see `DESIGN.md` for why `Rc<Cell<_>>` rather than a trait-object back-reference).
pub type StatusHandle = Rc<Cell<StreamStatus>>;

/// Uniform emitter for records (main + side-tagged), watermarks, latency markers, and stream
/// status. Implemented by every sink variant the chain builder can produce.
pub trait OutputSink {
    /// Emit to the main stream.
    fn collect(&mut self, record: ErasedRecord) -> ChainResult<()>;

    /// Emit to a side-output stream.
    fn collect_tagged(&mut self, tag: &ErasedOutputTag, record: ErasedRecord) -> ChainResult<()>;

    /// Propagate event-time progress.
    fn emit_watermark(&mut self, watermark: Watermark) -> ChainResult<()>;

    /// Propagate a latency probe.
    fn emit_latency_marker(&mut self, marker: LatencyMarker) -> ChainResult<()>;

    /// End-of-stream for this sink.
    fn close(&mut self) -> ChainResult<()>;

    /// The timestamp of the last watermark this sink processed, for metrics. Updated regardless
    /// of whether the watermark was actually forwarded (stream status may have suppressed it).
    fn watermark_gauge(&self) -> Timestamp;
}

/// Whether watermark forwarding should happen right now, given the sink's shared status handle.
/// The gauge update always happens; only the forwarding call is gated.
pub(crate) fn status_allows_watermark(status: &StatusHandle) -> bool {
    status.get().is_active()
}
