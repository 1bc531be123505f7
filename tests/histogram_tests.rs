#![cfg(not(feature = "bypass"))]

use proptest::prelude::*;
use timehisto::{BucketIndex, HistogramConfig, TimeHistogram, CELLS, MAX_WINDOW};

fn cells(h: &TimeHistogram) -> Vec<u64> {
    (0..CELLS)
        .map(|flat| h.bucket_count(BucketIndex::from_flat(flat).unwrap()))
        .collect()
}

proptest! {
    #[test]
    fn sample_lands_in_exactly_one_cell(dt in 10e-6f64..499e-6) {
        let h = TimeHistogram::default();
        h.add(0.000_2);
        let before = cells(&h);

        let idx = BucketIndex::locate(dt).unwrap();
        prop_assert!(h.add(dt));

        let after = cells(&h);
        for flat in 0..CELLS {
            let delta = after[flat] - before[flat];
            prop_assert_eq!(delta, if flat == idx.flat() { 1 } else { 0 });
        }
    }

    #[test]
    fn below_floor_only_counts(dt in 0f64..10e-6) {
        let h = TimeHistogram::default();
        prop_assert!(!h.add(dt));
        prop_assert_eq!(h.buckets().count(), 0);
        prop_assert_eq!(h.below_floor_count(), 1);

        h.period_tick();
        let closed = h.closed_period();
        prop_assert_eq!(closed.count, 1);
        prop_assert_eq!(closed.high_count, 0);
    }

    #[test]
    fn average_converges(c in 10e-6f64..1e-3) {
        let h = TimeHistogram::default();
        for _ in 0..60 {
            for _ in 0..4 {
                h.add(c);
            }
            h.period_tick();
        }
        prop_assert!((h.average_latency() - c).abs() <= c * 1e-9);
    }

    #[test]
    fn high_never_exceeds_count(samples in prop::collection::vec(0f64..2e-3, 1..200)) {
        let h = TimeHistogram::default();
        for (i, dt) in samples.iter().enumerate() {
            h.add(*dt);
            if i % 17 == 0 {
                h.period_tick();
            }
        }
        h.period_tick();

        let closed = h.closed_period();
        prop_assert!(closed.high_count <= closed.count);
        prop_assert!(h.total_high_count() <= h.total_count());
        prop_assert_eq!(h.total_count(), samples.len() as u64);
    }
}

#[test]
fn window_tracks_recent_periods() {
    let h = TimeHistogram::new(HistogramConfig::default().with_warmup_threshold(0)).unwrap();
    for i in 1..=(MAX_WINDOW + 3) {
        h.add(i as f64 * 1e-5);
        h.period_tick();
    }

    let maxima: Vec<f64> = h.recent_maxima().collect();
    assert_eq!(maxima.len(), MAX_WINDOW);
    assert_eq!(*maxima.last().unwrap(), (MAX_WINDOW + 3) as f64 * 1e-5);
    assert_eq!(maxima[0], 4. * 1e-5);
    assert_eq!(h.lifetime_max(), (MAX_WINDOW + 3) as f64 * 1e-5);
}

#[test]
fn rejects_invalid_config() {
    assert!(TimeHistogram::new(HistogramConfig::default().with_noise_floor(-1.)).is_err());
    assert!(TimeHistogram::new(HistogramConfig::default().with_noise_floor(f64::NAN)).is_err());
}

#[test]
fn reset_then_snapshot_is_empty() {
    let h = TimeHistogram::default();
    for i in 0..100u32 {
        h.add(f64::from(i) * 3e-6);
        if i % 10 == 0 {
            h.period_tick();
        }
    }
    h.reset();

    let snap = h.snapshot();
    assert_eq!(snap.lifetime_max, 0.);
    assert_eq!(snap.last_period_max, 0.);
    assert_eq!(snap.average, 0.);
    assert!(snap.buckets.is_empty());
    assert_eq!(h.total_count(), 0);
}

#[test]
fn config_from_json() {
    let config: HistogramConfig =
        serde_json::from_str(r#"{"noise_floor": 0.00002, "warmup_threshold": 3}"#).unwrap();
    let h = TimeHistogram::new(config).unwrap();
    assert!(!h.add(15e-6));
    assert_eq!(h.full_report().min_usec, 20);
}
