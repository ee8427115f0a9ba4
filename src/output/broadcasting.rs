//! The broadcasting output (§4.3): fan-out to N downstream sinks.
//!
//! Flink's non-copying broadcast hands every recipient the very same object reference; Rust's
//! exclusive ownership of `ErasedValue` makes that literal sharing impossible, so both variants
//! here produce a copy for every recipient but the last — the plain variant via a cheap
//! `Clone`-backed [`crate::record::ErasedSerializer`] the builder installs, the copying variant
//! via the edge's configured serializer. See `DESIGN.md` for why this collapses two Java-level
//! behaviors into one Rust-level mechanism while preserving the observable invariant (Testable
//! Property #2: exactly N-1 copies, the Nth recipient gets the original).

use nanorand::{Rng, WyRand};

use crate::error::ChainResult;
use crate::metrics::WatermarkGauge;
use crate::output_tag::ErasedOutputTag;
use crate::record::{ErasedRecord, ErasedSerializer, Timestamp};
use crate::watermark::{LatencyMarker, Watermark};

use super::{status_allows_watermark, OutputSink, StatusHandle};

fn fan_out<F>(sinks: &mut [Box<dyn OutputSink>], record: ErasedRecord, copy: &dyn ErasedSerializer, emit: F) -> ChainResult<()>
where
    F: Fn(&mut dyn OutputSink, ErasedRecord) -> ChainResult<()>,
{
    let Some((last, rest)) = sinks.split_last_mut() else {
        return Ok(());
    };
    for sink in rest {
        let copy = record.deep_copy_erased(copy);
        emit(sink.as_mut(), copy)?;
    }
    emit(last.as_mut(), record)
}

/// Fans a record out to every configured sink. Used when a producer has no output selectors and
/// either zero or at least two successors (the single-successor case bypasses this wrapper
/// entirely in the chain builder, §4.6).
pub struct BroadcastingOutput {
    sinks: Vec<Box<dyn OutputSink>>,
    status: StatusHandle,
    gauge: WatermarkGauge,
    copier: Box<dyn ErasedSerializer>,
    rng: WyRand,
}

impl BroadcastingOutput {
    pub fn new(sinks: Vec<Box<dyn OutputSink>>, status: StatusHandle, copier: Box<dyn ErasedSerializer>) -> Self {
        Self {
            sinks,
            status,
            gauge: WatermarkGauge::new(),
            copier,
            rng: WyRand::new(),
        }
    }

    fn pick_latency_sink(&mut self) -> Option<&mut Box<dyn OutputSink>> {
        match self.sinks.len() {
            0 => None,
            1 => self.sinks.first_mut(),
            n => {
                let index = self.rng.generate_range(0..n as u64) as usize;
                self.sinks.get_mut(index)
            }
        }
    }
}

impl OutputSink for BroadcastingOutput {
    fn collect(&mut self, record: ErasedRecord) -> ChainResult<()> {
        fan_out(&mut self.sinks, record, self.copier.as_ref(), |sink, record| {
            sink.collect(record)
        })
    }

    fn collect_tagged(&mut self, tag: &ErasedOutputTag, record: ErasedRecord) -> ChainResult<()> {
        fan_out(&mut self.sinks, record, self.copier.as_ref(), |sink, record| {
            sink.collect_tagged(tag, record)
        })
    }

    fn emit_watermark(&mut self, watermark: Watermark) -> ChainResult<()> {
        self.gauge.set(watermark.timestamp());
        if status_allows_watermark(&self.status) {
            for sink in &mut self.sinks {
                sink.emit_watermark(watermark)?;
            }
        }
        Ok(())
    }

    fn emit_latency_marker(&mut self, marker: LatencyMarker) -> ChainResult<()> {
        if let Some(sink) = self.pick_latency_sink() {
            sink.emit_latency_marker(marker)
        } else {
            Ok(())
        }
    }

    fn close(&mut self) -> ChainResult<()> {
        for sink in &mut self.sinks {
            sink.close()?;
        }
        Ok(())
    }

    fn watermark_gauge(&self) -> Timestamp {
        self.gauge.get()
    }
}

/// Same fan-out contract as [`BroadcastingOutput`], built by the chain builder when object reuse
/// is disabled so that `copier` is the edge's configured defensive serializer rather than the
/// default clone-based one.
pub struct CopyingBroadcastingOutput {
    inner: BroadcastingOutput,
}

impl CopyingBroadcastingOutput {
    pub fn new(sinks: Vec<Box<dyn OutputSink>>, status: StatusHandle, copier: Box<dyn ErasedSerializer>) -> Self {
        Self {
            inner: BroadcastingOutput::new(sinks, status, copier),
        }
    }
}

impl OutputSink for CopyingBroadcastingOutput {
    fn collect(&mut self, record: ErasedRecord) -> ChainResult<()> {
        self.inner.collect(record)
    }

    fn collect_tagged(&mut self, tag: &ErasedOutputTag, record: ErasedRecord) -> ChainResult<()> {
        self.inner.collect_tagged(tag, record)
    }

    fn emit_watermark(&mut self, watermark: Watermark) -> ChainResult<()> {
        self.inner.emit_watermark(watermark)
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

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::record::{CloneSerializer, StreamRecord, TypeSerializerAdapter};
    use crate::watermark::StreamStatus;

    struct CountingSink {
        count: Rc<Cell<usize>>,
    }

    impl OutputSink for CountingSink {
        fn collect(&mut self, _record: ErasedRecord) -> ChainResult<()> {
            self.count.set(self.count.get() + 1);
            Ok(())
        }
        fn collect_tagged(&mut self, _tag: &ErasedOutputTag, _record: ErasedRecord) -> ChainResult<()> {
            Ok(())
        }
        fn emit_watermark(&mut self, _watermark: Watermark) -> ChainResult<()> {
            Ok(())
        }
        fn emit_latency_marker(&mut self, _marker: LatencyMarker) -> ChainResult<()> {
            self.count.set(self.count.get() + 1);
            Ok(())
        }
        fn close(&mut self) -> ChainResult<()> {
            Ok(())
        }
        fn watermark_gauge(&self) -> Timestamp {
            crate::record::NO_WATERMARK
        }
    }

    fn active_status() -> StatusHandle {
        Rc::new(Cell::new(StreamStatus::Active))
    }

    #[test]
    fn zero_sinks_collect_is_a_no_op() {
        let copier = Box::new(TypeSerializerAdapter::new(CloneSerializer));
        let mut output = BroadcastingOutput::new(Vec::new(), active_status(), copier);
        output.collect(StreamRecord::new(1i32).erase()).unwrap();
    }

    #[test]
    fn every_sink_receives_the_record() {
        let counts: Vec<_> = (0..3).map(|_| Rc::new(Cell::new(0usize))).collect();
        let sinks: Vec<Box<dyn OutputSink>> = counts
            .iter()
            .cloned()
            .map(|count| Box::new(CountingSink { count }) as Box<dyn OutputSink>)
            .collect();
        let copier = Box::new(TypeSerializerAdapter::new(CloneSerializer));
        let mut output = BroadcastingOutput::new(sinks, active_status(), copier);
        output.collect(StreamRecord::new(1i32).erase()).unwrap();
        for count in &counts {
            assert_eq!(count.get(), 1);
        }
    }

    struct CountingCopySerializer {
        copies: Rc<Cell<usize>>,
    }

    impl ErasedSerializer for CountingCopySerializer {
        fn copy(&self, value: &crate::record::ErasedValue) -> crate::record::ErasedValue {
            self.copies.set(self.copies.get() + 1);
            let v = value.downcast_ref::<i32>().expect("test value is i32");
            Box::new(*v)
        }
    }

    #[test]
    fn three_sinks_produce_exactly_two_copies_and_the_last_gets_the_original() {
        let copies = Rc::new(Cell::new(0usize));
        let sinks: Vec<Box<dyn OutputSink>> = (0..3)
            .map(|_| Box::new(CountingSink { count: Rc::new(Cell::new(0)) }) as Box<dyn OutputSink>)
            .collect();
        let copier = Box::new(CountingCopySerializer { copies: copies.clone() });
        let mut output = BroadcastingOutput::new(sinks, active_status(), copier);
        output.collect(StreamRecord::new(1i32).erase()).unwrap();
        assert_eq!(copies.get(), 2);
    }

    #[test]
    fn latency_marker_with_zero_sinks_drops() {
        let copier = Box::new(TypeSerializerAdapter::new(CloneSerializer));
        let mut output = BroadcastingOutput::new(Vec::new(), active_status(), copier);
        output
            .emit_latency_marker(LatencyMarker::new(0, "src", 0))
            .unwrap();
    }

    #[test]
    fn latency_marker_with_one_sink_forwards_to_it() {
        let count = Rc::new(Cell::new(0usize));
        let sinks: Vec<Box<dyn OutputSink>> = vec![Box::new(CountingSink { count: count.clone() })];
        let copier = Box::new(TypeSerializerAdapter::new(CloneSerializer));
        let mut output = BroadcastingOutput::new(sinks, active_status(), copier);
        output
            .emit_latency_marker(LatencyMarker::new(0, "src", 0))
            .unwrap();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn idle_status_suppresses_watermark_but_updates_gauge() {
        let status = Rc::new(Cell::new(StreamStatus::Idle));
        let count = Rc::new(Cell::new(0usize));
        let sinks: Vec<Box<dyn OutputSink>> = vec![Box::new(CountingSink { count })];
        let copier = Box::new(TypeSerializerAdapter::new(CloneSerializer));
        let mut output = BroadcastingOutput::new(sinks, status, copier);
        output.emit_watermark(Watermark::new(55)).unwrap();
        assert_eq!(output.watermark_gauge(), 55);
    }
}
