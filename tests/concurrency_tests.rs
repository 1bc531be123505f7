#![cfg(not(feature = "bypass"))]

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use timehisto::TimeHistogram;

const SAMPLES: u64 = 200_000;

#[test]
fn producer_and_reporter() {
    let h = TimeHistogram::default();
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        s.spawn(|| {
            for i in 0..SAMPLES {
                // 11µs .. 489µs, always bucketed
                let dt = (11 + (i % 479)) as f64 * 1e-6;
                assert!(h.add(dt));
            }
            done.store(true, Ordering::Release);
        });

        let mut last_total = 0;
        while !done.load(Ordering::Acquire) {
            h.period_tick();

            let closed = h.closed_period();
            assert!(closed.high_count <= closed.count);
            assert!(closed.count <= SAMPLES);

            let total = h.total_count();
            assert!(total >= last_total);
            last_total = total;

            let snap = h.snapshot();
            assert!(snap.lifetime_max <= 490e-6);
            assert!(!snap.buckets.contains_key(&0));
            let _ = h.recent_report(true);
        }
    });

    // only the producer writes the bucket table
    let bucketed: u64 = h.buckets().map(|(_, count)| count).sum();
    assert_eq!(bucketed, SAMPLES);

    // one more period so both slots have been folded after the producer stopped
    h.add(50e-6);
    h.period_tick();
    assert_eq!(h.total_count(), SAMPLES + 1);
    assert_eq!(h.total_high_count(), SAMPLES + 1);
    assert_eq!(h.below_floor_count(), 0);
    assert!(!h.snapshot().buckets.contains_key(&0));
}
