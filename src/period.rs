//! Per-period aggregates: one of the two slots a `TimeHistogram` swaps between.
use std::sync::atomic::{AtomicU64, Ordering::{Acquire, Relaxed, Release}};

use serde::Serialize;

use super::*;

/// Count, high count, sum and max of the samples seen during one period.
///
/// Every field has exactly one writer at any moment (the producer while
/// the slot is active, the ticker while it is being reset), so updates are
/// relaxed load/store pairs rather than read-modify-write instructions.
/// The histogram supplies all exclusivity; this type has none of its own.
///
/// `count` is stored last with `Release` and loaded first with `Acquire`,
/// so a reader that sees N samples also sees everything the first N
/// samples wrote. Writers call `record_high` and `update_max` before
/// `record`.
#[derive(Debug, Default)]
pub struct PeriodAccumulator {
    count: AtomicU64,
    high_count: AtomicU64,
    sum: AtomicF64,
    max: AtomicF64,
}

/// A plain copy of a `PeriodAccumulator`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
pub struct PeriodStats {
    pub count: u64,
    pub high_count: u64,
    pub sum: f64,
    pub max: f64,
}

impl PeriodAccumulator {
    pub fn reset(&self) {
        self.count.store(0, Relaxed);
        self.high_count.store(0, Relaxed);
        self.sum.store(0., Relaxed);
        self.max.store(0., Relaxed);
    }

    /// Adds one sample to the sum and publishes it in the count.
    #[inline]
    pub fn record(&self, dt: f64) {
        self.sum.add(dt, Relaxed);
        self.count.store(self.count.load(Relaxed) + 1, Release);
    }

    #[inline]
    pub fn record_high(&self) {
        self.high_count.store(self.high_count.load(Relaxed) + 1, Relaxed);
    }

    #[inline]
    pub fn update_max(&self, dt: f64) {
        self.max.raise(dt, Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Acquire)
    }

    pub fn high_count(&self) -> u64 {
        self.high_count.load(Relaxed)
    }

    pub fn sum(&self) -> f64 {
        self.sum.load(Relaxed)
    }

    pub fn max(&self) -> f64 {
        self.max.load(Relaxed)
    }

    /// Copies the fields. A sample still being written can show up in
    /// `high_count` before `count`; it is clipped so `high_count <= count`.
    pub fn stats(&self) -> PeriodStats {
        let count = self.count();
        PeriodStats {
            count,
            high_count: self.high_count().min(count),
            sum: self.sum(),
            max: self.max(),
        }
    }
}

impl PeriodStats {
    /// Mean sample, or `None` for an empty period.
    pub fn average(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum / self.count as f64)
        }
    }

    /// Samples that fell below the noise floor.
    pub fn low_count(&self) -> u64 {
        self.count.saturating_sub(self.high_count)
    }
}

#[test]
fn accumulates() {
    let p = PeriodAccumulator::default();
    p.record(0.5);
    p.record_high();
    p.update_max(1.5);
    p.record(1.5);
    p.update_max(0.5);

    let stats = p.stats();
    assert_eq!(stats.count, 2);
    assert_eq!(stats.high_count, 1);
    assert_eq!(stats.sum, 2.0);
    assert_eq!(stats.max, 1.5);
    assert_eq!(stats.average(), Some(1.0));
    assert_eq!(stats.low_count(), 1);
}

#[test]
fn reset_zeroes_everything() {
    let p = PeriodAccumulator::default();
    p.record(3.0);
    p.record_high();
    p.update_max(3.0);
    p.reset();
    assert_eq!(p.stats(), PeriodStats::default());
    p.reset();
    assert_eq!(p.stats(), PeriodStats::default());
}

#[test]
fn empty_period_has_no_average() {
    assert_eq!(PeriodStats::default().average(), None);
}

#[test]
fn high_count_in_flight_is_clipped() {
    let p = PeriodAccumulator::default();
    p.record_high();
    p.record(20e-6);
    // second sample has bumped high_count but not yet count
    p.record_high();

    let stats = p.stats();
    assert_eq!(stats.count, 1);
    assert_eq!(stats.high_count, 1);

    p.record(30e-6);
    assert_eq!(p.stats().high_count, 2);
}
