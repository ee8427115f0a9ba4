//! The directed output (§4.4): fan-out driven by user output selectors rather than "every sink".

use std::collections::HashSet;

use nanorand::{Rng, WyRand};

use crate::config::OutputSelector;
use crate::error::ChainResult;
use crate::metrics::WatermarkGauge;
use crate::output_tag::ErasedOutputTag;
use crate::record::{ErasedRecord, ErasedSerializer, Timestamp};
use crate::watermark::{LatencyMarker, Watermark};

use super::{status_allows_watermark, OutputSink, StatusHandle};

/// Routes records to the subset of sinks whose declared name is selected by at least one of the
/// producer's output selectors. Selectors run in declaration order; a sink already notified by an
/// earlier selector's output is not notified again by a later one (first match wins, per
/// `DESIGN.md`'s resolution of the open question on directed-output dedup).
pub struct DirectedOutput {
    sinks: Vec<(String, Box<dyn OutputSink>)>,
    selectors: Vec<Box<dyn OutputSelector>>,
    status: StatusHandle,
    gauge: WatermarkGauge,
    copier: Box<dyn ErasedSerializer>,
    rng: WyRand,
}

impl DirectedOutput {
    pub fn new(
        sinks: Vec<(String, Box<dyn OutputSink>)>,
        selectors: Vec<Box<dyn OutputSelector>>,
        status: StatusHandle,
        copier: Box<dyn ErasedSerializer>,
    ) -> Self {
        Self {
            sinks,
            selectors,
            status,
            gauge: WatermarkGauge::new(),
            copier,
            rng: WyRand::new(),
        }
    }

    /// Sink indices selected for `record`, in first-match order, each appearing at most once.
    fn targets(&self, record: &ErasedRecord) -> Vec<usize> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        for selector in &self.selectors {
            for name in selector.select(record) {
                if let Some(idx) = self.sinks.iter().position(|(sink_name, _)| *sink_name == name) {
                    if seen.insert(idx) {
                        order.push(idx);
                    }
                }
            }
        }
        order
    }

    fn dispatch<F>(&mut self, targets: Vec<usize>, record: ErasedRecord, emit: F) -> ChainResult<()>
    where
        F: Fn(&mut dyn OutputSink, ErasedRecord) -> ChainResult<()>,
    {
        let Some((&last, rest)) = targets.split_last() else {
            return Ok(());
        };
        for &idx in rest {
            let copy = record.deep_copy_erased(self.copier.as_ref());
            emit(self.sinks[idx].1.as_mut(), copy)?;
        }
        emit(self.sinks[last].1.as_mut(), record)
    }

    fn pick_latency_sink(&mut self) -> Option<&mut Box<dyn OutputSink>> {
        match self.sinks.len() {
            0 => None,
            1 => self.sinks.first_mut().map(|(_, sink)| sink),
            n => {
                let index = self.rng.generate_range(0..n as u64) as usize;
                self.sinks.get_mut(index).map(|(_, sink)| sink)
            }
        }
    }
}

impl OutputSink for DirectedOutput {
    fn collect(&mut self, record: ErasedRecord) -> ChainResult<()> {
        let targets = self.targets(&record);
        self.dispatch(targets, record, |sink, record| sink.collect(record))
    }

    fn collect_tagged(&mut self, tag: &ErasedOutputTag, record: ErasedRecord) -> ChainResult<()> {
        let targets = self.targets(&record);
        self.dispatch(targets, record, |sink, record| sink.collect_tagged(tag, record))
    }

    fn emit_watermark(&mut self, watermark: Watermark) -> ChainResult<()> {
        self.gauge.set(watermark.timestamp());
        if status_allows_watermark(&self.status) {
            for (_, sink) in &mut self.sinks {
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
        for (_, sink) in &mut self.sinks {
            sink.close()?;
        }
        Ok(())
    }

    fn watermark_gauge(&self) -> Timestamp {
        self.gauge.get()
    }
}

/// Same selector-driven routing as [`DirectedOutput`], built with a defensive (rather than cheap
/// clone-based) `ErasedSerializer` when object reuse is disabled.
pub struct CopyingDirectedOutput {
    inner: DirectedOutput,
}

impl CopyingDirectedOutput {
    pub fn new(
        sinks: Vec<(String, Box<dyn OutputSink>)>,
        selectors: Vec<Box<dyn OutputSelector>>,
        status: StatusHandle,
        copier: Box<dyn ErasedSerializer>,
    ) -> Self {
        Self {
            inner: DirectedOutput::new(sinks, selectors, status, copier),
        }
    }
}

impl OutputSink for CopyingDirectedOutput {
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
