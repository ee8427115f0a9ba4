//! Per-operator metrics: a `numRecordsIn` counter and the input/output watermark gauges named in
//! the external interface. Counters/gauges are plain atomics so a metrics system on another
//! thread can read them without taking a lock; the task thread is still the only writer.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use crate::record::{Timestamp, NO_WATERMARK};

#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Tracks the last watermark timestamp observed at some point in the chain.
#[derive(Debug)]
pub struct WatermarkGauge(AtomicI64);

impl Default for WatermarkGauge {
    fn default() -> Self {
        Self(AtomicI64::new(NO_WATERMARK))
    }
}

impl WatermarkGauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, timestamp: Timestamp) {
        self.0.store(timestamp, Ordering::Relaxed);
    }

    pub fn get(&self) -> Timestamp {
        self.0.load(Ordering::Relaxed)
    }
}

/// The metric group registered for a single chained operator: how many records it has consumed,
/// and the watermark last seen feeding it / last seen leaving it.
#[derive(Debug, Default)]
pub struct MetricGroup {
    pub num_records_in: Counter,
    pub current_input_watermark: WatermarkGauge,
    pub current_output_watermark: WatermarkGauge,
}

impl MetricGroup {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_starts_at_zero_and_increments() {
        let counter = Counter::new();
        assert_eq!(counter.get(), 0);
        counter.inc();
        counter.inc();
        assert_eq!(counter.get(), 2);
    }

    #[test]
    fn gauge_starts_unset() {
        let gauge = WatermarkGauge::new();
        assert_eq!(gauge.get(), NO_WATERMARK);
        gauge.set(100);
        assert_eq!(gauge.get(), 100);
    }
}
