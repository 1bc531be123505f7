use std::fmt::{self, Debug};
use std::sync::atomic::{fence, AtomicU64, AtomicUsize};
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release, SeqCst};

use crossbeam_utils::CachePadded;
use tracing::{debug, trace};

use super::*;

/// A latency histogram fed by one producer and read by one reporter.
///
/// The producer calls [`add`](TimeHistogram::add) for every observed
/// event. The reporter calls [`period_tick`](TimeHistogram::period_tick)
/// at whatever cadence it likes and reads the period that tick closed,
/// along with lifetime aggregates and the bucket table.
///
/// Samples land in one of two period slots. `period_tick` zeroes the idle
/// slot, flips the producer onto it, and folds the slot just closed into
/// the lifetime state, so readers only ever look at a slot the producer
/// has left. A producer that read the index just before the flip may
/// still finish one sample in the closed slot; the next tick adds such
/// late samples to the lifetime totals before zeroing the slot.
///
/// # Preconditions
///
/// At most one thread may call `add` and at most one thread may call
/// `period_tick`, `reset` or the readers at a time. Nothing checks this:
/// a second producer silently loses updates.
pub struct TimeHistogram {
    config: HistogramConfig,
    active: CachePadded<AtomicUsize>,
    slots: [PeriodAccumulator; 2],
    buckets: [AtomicU64; CELLS],
    maxima: MaxWindow,
    total_count: AtomicU64,
    total_high_count: AtomicU64,
    lifetime_max: AtomicF64,
    average: AtomicF64,
    // what the last fold took from the slot that is now read-side
    folded_count: AtomicU64,
    folded_high_count: AtomicU64,
}

impl Default for TimeHistogram {
    fn default() -> TimeHistogram {
        TimeHistogram::with_valid_config(HistogramConfig::default())
    }
}

impl Debug for TimeHistogram {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "TimeHistogram[count: {}, high: {}, max: {:?}s, avg: {:?}s, buckets: ",
            self.total_count(),
            self.total_high_count(),
            self.lifetime_max(),
            self.average_latency(),
        )?;

        for (key, count) in self.buckets() {
            write!(f, "({} -> {}) ", key, count)?;
        }

        f.write_str("]")
    }
}

impl TimeHistogram {
    /// Builds an empty histogram, rejecting an unusable config.
    pub fn new(config: HistogramConfig) -> crate::Result<TimeHistogram> {
        config.validate()?;
        Ok(TimeHistogram::with_valid_config(config))
    }

    fn with_valid_config(config: HistogramConfig) -> TimeHistogram {
        debug!(
            noise_floor = config.noise_floor,
            warmup_threshold = config.warmup_threshold,
            "creating time histogram"
        );
        TimeHistogram {
            config,
            active: CachePadded::new(AtomicUsize::new(0)),
            slots: [PeriodAccumulator::default(), PeriodAccumulator::default()],
            buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            maxima: MaxWindow::default(),
            total_count: AtomicU64::new(0),
            total_high_count: AtomicU64::new(0),
            lifetime_max: AtomicF64::zero(),
            average: AtomicF64::zero(),
            folded_count: AtomicU64::new(0),
            folded_high_count: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &HistogramConfig {
        &self.config
    }

    /// Drops every sample and aggregate, keeping the config.
    ///
    /// Must not race with `add`; a sample recorded during a reset may
    /// survive it in part.
    pub fn reset(&self) {
        for slot in &self.slots {
            slot.reset();
        }
        self.active.store(0, Release);
        for cell in &self.buckets {
            cell.store(0, Relaxed);
        }
        self.maxima.clear();
        self.total_count.store(0, Relaxed);
        self.total_high_count.store(0, Relaxed);
        self.lifetime_max.store(0., Relaxed);
        self.average.store(0., Relaxed);
        self.folded_count.store(0, Relaxed);
        self.folded_high_count.store(0, Relaxed);
        debug!("time histogram reset");
    }

    /// Records one sample of `dt` seconds. Returns whether it landed in
    /// the bucket table.
    ///
    /// Every finite sample counts toward the period count and sum; NaN
    /// and infinite samples are dropped. Samples below the noise floor
    /// stop there; the rest count as high and are bucketed if they fit in
    /// the table.
    #[inline]
    pub fn add(&self, dt: f64) -> bool {
        if cfg!(feature = "bypass") || !dt.is_finite() {
            return false;
        }

        let slot = &self.slots[self.active.load(Acquire)];

        let warmup = self.config.warmup_threshold;
        if warmup == 0 || self.total_count.load(Relaxed) > warmup {
            slot.update_max(dt);
        }

        let high = dt >= self.config.noise_floor;
        if high {
            slot.record_high();
        }
        // publishes the sample; must come after the other slot writes
        slot.record(dt);

        if !high {
            return false;
        }

        match BucketIndex::locate(dt) {
            Some(idx) => {
                let cell = &self.buckets[idx.flat()];
                cell.store(cell.load(Relaxed) + 1, Relaxed);
                true
            }
            None => false,
        }
    }

    /// Closes the current period, unless it saw no samples.
    pub fn period_tick(&self) {
        // the ticker is the only writer of `active`
        let current = self.active.load(Relaxed);
        let closing = &self.slots[current];

        if closing.count() == 0 {
            trace!("empty period, keeping previous values");
            return;
        }

        let next = current ^ 1;
        self.absorb_late_samples(&self.slots[next]);
        self.slots[next].reset();
        // the reset must be visible before the producer can see the flip
        fence(SeqCst);
        self.active.store(next, Release);
        fence(SeqCst);

        let closed = closing.stats();
        self.folded_count.store(closed.count, Relaxed);
        self.folded_high_count.store(closed.high_count, Relaxed);
        self.maxima.push(closed.max);

        if let Some(period_avg) = closed.average() {
            let smoothed = self.average.load(Relaxed);
            self.average.store(0.5 * smoothed + 0.5 * period_avg, Relaxed);
        }

        self.total_count
            .store(self.total_count.load(Relaxed) + closed.count, Relaxed);
        self.total_high_count.store(
            self.total_high_count.load(Relaxed) + closed.high_count,
            Relaxed,
        );
        self.lifetime_max.raise(closed.max, Relaxed);

        trace!(
            count = closed.count,
            high_count = closed.high_count,
            max = closed.max,
            "folded period"
        );
    }

    /// Adds whatever landed in `slot` after it was folded.
    fn absorb_late_samples(&self, slot: &PeriodAccumulator) {
        let late = slot.stats();
        let count = late.count.saturating_sub(self.folded_count.load(Relaxed));
        let high_count = late
            .high_count
            .saturating_sub(self.folded_high_count.load(Relaxed));
        if count == 0 && high_count == 0 {
            return;
        }

        self.total_count
            .store(self.total_count.load(Relaxed) + count, Relaxed);
        self.total_high_count
            .store(self.total_high_count.load(Relaxed) + high_count, Relaxed);
        self.lifetime_max.raise(late.max, Relaxed);
        trace!(count, high_count, "absorbed late samples");
    }

    fn read_slot(&self) -> &PeriodAccumulator {
        &self.slots[self.active.load(Acquire) ^ 1]
    }

    fn write_slot(&self) -> &PeriodAccumulator {
        &self.slots[self.active.load(Acquire)]
    }

    /// The most recently closed period.
    pub fn closed_period(&self) -> PeriodStats {
        self.read_slot().stats()
    }

    /// Low-pass filtered mean latency in seconds, halving the weight of
    /// older periods at every tick.
    pub fn average_latency(&self) -> f64 {
        self.average.load(Relaxed)
    }

    pub fn lifetime_max(&self) -> f64 {
        self.lifetime_max.load(Relaxed)
    }

    pub fn last_period_max(&self) -> f64 {
        self.read_slot().max()
    }

    pub fn total_count(&self) -> u64 {
        self.total_count.load(Relaxed)
    }

    pub fn total_high_count(&self) -> u64 {
        self.total_high_count.load(Relaxed)
    }

    /// Maxima of the last `MAX_WINDOW` closed periods, oldest first.
    pub fn recent_maxima(&self) -> RecentMaxima<'_> {
        self.maxima.recent()
    }

    pub fn bucket_count(&self, idx: BucketIndex) -> u64 {
        self.buckets[idx.flat()].load(Relaxed)
    }

    /// Non-empty cells as `(key, count)`, ascending by key.
    pub fn buckets(&self) -> impl Iterator<Item = (u32, u64)> + '_ {
        self.buckets.iter().enumerate().filter_map(|(flat, cell)| {
            let count = cell.load(Relaxed);
            if count == 0 {
                return None;
            }
            BucketIndex::from_flat(flat).map(|idx| (idx.key(), count))
        })
    }

    /// Samples below the noise floor, lifetime plus the open period.
    ///
    /// The open period is included because it would otherwise stay
    /// invisible until the next tick.
    pub fn below_floor_count(&self) -> u64 {
        let lifetime = self.total_count().saturating_sub(self.total_high_count());
        lifetime + self.write_slot().stats().low_count()
    }
}


#[cfg(test)]
fn open_slot(h: &TimeHistogram) -> PeriodStats {
    h.write_slot().stats()
}

#[test]
#[cfg(not(feature = "bypass"))]
fn concrete_scenario() {
    let h = TimeHistogram::default();
    for _ in 0..3 {
        assert!(!h.add(5e-6));
    }
    assert!(h.add(150e-6));

    let open = open_slot(&h);
    assert_eq!(open.count, 4);
    assert_eq!(open.high_count, 1);
    // nothing folded yet, so max tracking has not started
    assert_eq!(open.max, 0.);

    let idx = BucketIndex::locate(150e-6).unwrap();
    assert_eq!(h.buckets().collect::<Vec<_>>(), vec![(idx.key(), 1)]);

    h.period_tick();
    let closed = h.closed_period();
    assert_eq!(closed.count, 4);
    assert_eq!(closed.high_count, 1);
    assert_eq!(closed.max, 0.);
    assert_eq!(h.total_count(), 4);
    assert_eq!(h.total_high_count(), 1);
}

#[test]
#[cfg(not(feature = "bypass"))]
fn warmup_gate_is_strictly_greater() {
    let h = TimeHistogram::default();
    for _ in 0..10 {
        h.add(20e-6);
    }
    h.period_tick();
    assert_eq!(h.total_count(), 10);

    // 10 folded samples is not more than the threshold of 10
    h.add(300e-6);
    h.period_tick();
    assert_eq!(h.last_period_max(), 0.);
    assert_eq!(h.lifetime_max(), 0.);
    assert_eq!(h.total_count(), 11);

    h.add(400e-6);
    h.period_tick();
    assert_eq!(h.last_period_max(), 400e-6);
    assert_eq!(h.lifetime_max(), 400e-6);
}

#[test]
#[cfg(not(feature = "bypass"))]
fn no_warmup_tracks_immediately() {
    let h = TimeHistogram::new(HistogramConfig::default().with_warmup_threshold(0)).unwrap();
    h.add(42e-6);
    h.add(7e-6);
    h.period_tick();
    assert_eq!(h.last_period_max(), 42e-6);
}

#[test]
#[cfg(not(feature = "bypass"))]
fn below_floor_excluded() {
    let h = TimeHistogram::default();
    assert!(!h.add(9.99e-6));
    let open = open_slot(&h);
    assert_eq!(open.count, 1);
    assert_eq!(open.high_count, 0);
    assert_eq!(h.buckets().count(), 0);
    assert_eq!(h.below_floor_count(), 1);
}

#[test]
#[cfg(not(feature = "bypass"))]
fn large_samples_only_aggregate() {
    let h = TimeHistogram::default();
    assert!(!h.add(2.0));
    assert!(!h.add(1e300));
    let open = open_slot(&h);
    assert_eq!(open.count, 2);
    assert_eq!(open.high_count, 2);
    assert_eq!(h.buckets().count(), 0);
}

#[test]
#[cfg(not(feature = "bypass"))]
fn non_finite_samples_dropped() {
    let h = TimeHistogram::default();
    assert!(!h.add(f64::INFINITY));
    assert!(!h.add(f64::NEG_INFINITY));
    assert!(!h.add(f64::NAN));
    assert_eq!(open_slot(&h), PeriodStats::default());

    h.add(100e-6);
    h.period_tick();
    for _ in 0..50 {
        h.add(f64::INFINITY);
        h.add(100e-6);
        h.period_tick();
    }
    assert!(h.average_latency().is_finite());
    assert!((h.average_latency() - 100e-6).abs() < 1e-12);
}

#[test]
#[cfg(not(feature = "bypass"))]
fn idle_tick_is_noop() {
    let h = TimeHistogram::new(HistogramConfig::default().with_warmup_threshold(0)).unwrap();
    h.add(120e-6);
    h.period_tick();

    let before = (
        h.total_count(),
        h.average_latency(),
        h.closed_period(),
        h.recent_maxima().collect::<Vec<_>>(),
    );
    h.period_tick();
    h.period_tick();
    let after = (
        h.total_count(),
        h.average_latency(),
        h.closed_period(),
        h.recent_maxima().collect::<Vec<_>>(),
    );
    assert_eq!(before, after);
}

#[test]
#[cfg(not(feature = "bypass"))]
fn tick_isolates_slots() {
    let h = TimeHistogram::default();
    h.add(50e-6);
    h.add(60e-6);
    h.period_tick();
    h.add(70e-6);

    let closed = h.closed_period();
    assert_eq!(closed.count, 2);
    assert_eq!(closed.sum, 50e-6 + 60e-6);
    assert_eq!(open_slot(&h).count, 1);
}

#[test]
#[cfg(not(feature = "bypass"))]
fn sample_torn_by_tick_is_not_below_floor() {
    let h = TimeHistogram::default();
    h.add(30e-6);

    // a producer that read the old index is halfway through a high sample
    let stale = &h.slots[h.active.load(Relaxed)];
    stale.record_high();
    h.period_tick();

    assert_eq!(h.total_count(), 1);
    assert_eq!(h.total_high_count(), 1);
    assert!(!h.snapshot().buckets.contains_key(&BELOW_FLOOR_KEY));
    assert_eq!(h.below_floor_count(), 0);

    // it finishes after the fold, then the producer moves on
    stale.record(40e-6);
    h.add(50e-6);
    h.period_tick();

    assert_eq!(h.total_count(), 3);
    assert_eq!(h.total_high_count(), 3);
    assert!(!h.snapshot().buckets.contains_key(&BELOW_FLOOR_KEY));
}

#[test]
#[cfg(not(feature = "bypass"))]
fn late_low_sample_is_counted() {
    let h = TimeHistogram::default();
    h.add(30e-6);
    h.period_tick();

    let closed = &h.slots[h.active.load(Relaxed) ^ 1];
    closed.record(2e-6);
    assert_eq!(h.total_count(), 1);

    h.add(30e-6);
    h.period_tick();
    assert_eq!(h.total_count(), 3);
    assert_eq!(h.total_high_count(), 2);
    assert_eq!(h.snapshot().buckets[&BELOW_FLOOR_KEY], 1);
}

#[test]
#[cfg(not(feature = "bypass"))]
fn smoothing_halves() {
    let h = TimeHistogram::default();
    h.add(100e-6);
    h.period_tick();
    assert_eq!(h.average_latency(), 50e-6);
    h.add(100e-6);
    h.period_tick();
    assert!((h.average_latency() - 75e-6).abs() < 1e-12);
}

#[test]
#[cfg(not(feature = "bypass"))]
fn reset_clears() {
    let h = TimeHistogram::new(HistogramConfig::default().with_warmup_threshold(0)).unwrap();
    for _ in 0..5 {
        h.add(33e-6);
        h.add(1e-6);
        h.period_tick();
    }
    h.reset();
    h.reset();

    assert_eq!(h.total_count(), 0);
    assert_eq!(h.total_high_count(), 0);
    assert_eq!(h.lifetime_max(), 0.);
    assert_eq!(h.average_latency(), 0.);
    assert_eq!(h.closed_period(), PeriodStats::default());
    assert_eq!(h.buckets().count(), 0);
    assert_eq!(h.below_floor_count(), 0);
    assert!(h.recent_maxima().all(|m| m == 0.));

    h.add(33e-6);
    h.period_tick();
    assert_eq!(h.total_count(), 1);
}

#[test]
#[cfg(not(feature = "bypass"))]
fn bucket_count_reads_one_cell() {
    let h = TimeHistogram::default();
    h.add(155e-6);
    assert_eq!(h.bucket_count(BucketIndex::new(1, 4).unwrap()), 1);
    assert_eq!(h.bucket_count(BucketIndex::new(0, 4).unwrap()), 0);
    assert!(BucketIndex::new(0, 14).is_none());
}

#[test]
#[cfg(not(feature = "bypass"))]
fn debug_lists_buckets() {
    let h = TimeHistogram::default();
    h.add(155e-6);
    let s = format!("{:?}", h);
    assert!(s.starts_with("TimeHistogram["));
    assert!(s.contains("(150 -> 1)"));
}
