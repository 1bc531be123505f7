//! Read-side views of a `TimeHistogram` and their serialized shapes.
//!
//! `Snapshot` is the shared view. `FullReport` carries every lifetime field
//! and the whole bucket table for occasional dumps. `RecentReport` is the
//! small shape for frequent pollers, with the bucket table optional.
use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use super::*;

/// Truncating seconds to microseconds conversion used by every report.
/// Out-of-range values saturate.
pub fn usec(seconds: f64) -> u32 {
    (seconds * 1_000_000.) as u32
}

/// Aggregates and bucket counts as seen by the reader.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub lifetime_max: f64,
    pub last_period_max: f64,
    pub average: f64,
    /// Non-empty buckets by key, plus key 0 for samples below the noise
    /// floor when there are any.
    pub buckets: BTreeMap<u32, u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BucketEntry {
    pub key: u32,
    pub val: u64,
}

/// Every lifetime field and the full bucket table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FullReport {
    pub min_usec: u32,
    pub max_usec: u32,
    pub high_count: u64,
    pub count: u64,
    pub s_avg: f64,
    pub s_max: u32,
    pub recent_max_usec: Vec<u32>,
    pub histogram: Vec<BucketEntry>,
    /// Only used by the textual dump.
    #[serde(skip)]
    pub last_period: PeriodStats,
}

/// The last period's max, lifetime max and average, for frequent pollers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentReport {
    pub total_max: u32,
    pub last_max: u32,
    pub average: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub histogram: Option<BTreeMap<String, u64>>,
}

impl TimeHistogram {
    /// Reads aggregates from the closed period and lifetime state.
    pub fn snapshot(&self) -> Snapshot {
        self.collect_snapshot(true)
    }

    fn collect_snapshot(&self, with_buckets: bool) -> Snapshot {
        let mut buckets = BTreeMap::new();
        if with_buckets {
            buckets.extend(self.buckets());
            if self.total_count() != self.total_high_count() {
                buckets.insert(BELOW_FLOOR_KEY, self.below_floor_count());
            }
        }

        Snapshot {
            lifetime_max: self.lifetime_max(),
            last_period_max: self.last_period_max(),
            average: self.average_latency(),
            buckets,
        }
    }

    pub fn full_report(&self) -> FullReport {
        let snapshot = self.snapshot();
        let histogram = snapshot
            .buckets
            .iter()
            .filter(|(key, _)| **key != BELOW_FLOOR_KEY)
            .map(|(key, val)| BucketEntry { key: *key, val: *val })
            .collect();

        FullReport {
            min_usec: usec(self.config().noise_floor),
            max_usec: usec(snapshot.lifetime_max),
            high_count: self.total_high_count(),
            count: self.total_count(),
            s_avg: snapshot.average,
            s_max: usec(snapshot.last_period_max),
            recent_max_usec: self.recent_maxima().map(usec).collect(),
            histogram,
            last_period: self.closed_period(),
        }
    }

    /// Skips the bucket table unless `with_histogram` is set.
    pub fn recent_report(&self, with_histogram: bool) -> RecentReport {
        let snapshot = self.collect_snapshot(with_histogram);
        let histogram = if with_histogram {
            Some(
                snapshot
                    .buckets
                    .iter()
                    .map(|(key, val)| (key.to_string(), *val))
                    .collect(),
            )
        } else {
            None
        };

        RecentReport {
            total_max: usec(snapshot.lifetime_max),
            last_max: usec(snapshot.last_period_max),
            average: snapshot.average,
            histogram,
        }
    }
}

impl Snapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl FullReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl RecentReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl fmt::Display for FullReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let high_pct = if self.last_period.count == 0 {
            0.
        } else {
            100. * self.last_period.high_count as f64 / self.last_period.count as f64
        };

        writeln!(f, " min_delta  : {} usec", self.min_usec)?;
        writeln!(f, " cnt        : {}", self.last_period.count)?;
        writeln!(f, " high_cnt   : {}", self.last_period.high_count)?;
        writeln!(f, " max_d_time : {} usec", self.max_usec)?;
        writeln!(f, " sliding_average    : {:.0} usec", self.s_avg * 1_000_000.)?;
        writeln!(f, " percent    : {:.1} %", high_pct)?;
        writeln!(f, " histogram")?;
        writeln!(f, " -----------")?;
        for entry in &self.histogram {
            writeln!(f, " h[{}]  :  {}", entry.key, entry.val)?;
        }
        Ok(())
    }
}

#[cfg(test)]
fn scenario() -> TimeHistogram {
    let h = TimeHistogram::default();
    for _ in 0..3 {
        h.add(5e-6);
    }
    h.add(150e-6);
    h.period_tick();
    h
}

#[test]
fn usec_truncates() {
    assert_eq!(usec(10e-6), 10);
    assert_eq!(usec(1.5e-6), 1);
    assert_eq!(usec(-1.), 0);
    assert_eq!(usec(1e12), u32::MAX);
}

#[test]
#[cfg(not(feature = "bypass"))]
fn snapshot_adds_below_floor_bucket() {
    let h = scenario();
    let snap = h.snapshot();
    let key = BucketIndex::locate(150e-6).unwrap().key();

    let expected: BTreeMap<u32, u64> = vec![(0, 3), (key, 1)].into_iter().collect();
    assert_eq!(snap.buckets, expected);

    // open-period samples below the floor show up before the next tick
    h.add(1e-6);
    assert_eq!(h.snapshot().buckets[&BELOW_FLOOR_KEY], 4);
}

#[test]
#[cfg(not(feature = "bypass"))]
fn no_below_floor_bucket_when_all_high() {
    let h = TimeHistogram::default();
    h.add(55e-6);
    h.period_tick();
    let snap = h.snapshot();
    assert!(!snap.buckets.contains_key(&BELOW_FLOOR_KEY));
    assert_eq!(snap.buckets.len(), 1);
}

#[test]
#[cfg(not(feature = "bypass"))]
fn full_report_json_shape() {
    let h = scenario();
    let report = h.full_report();
    assert_eq!(report.min_usec, 10);
    assert_eq!(report.count, 4);
    assert_eq!(report.high_count, 1);
    assert_eq!(report.recent_max_usec.len(), MAX_WINDOW);
    assert!(report.histogram.iter().all(|e| e.key != BELOW_FLOOR_KEY));
    assert_eq!(report.histogram.len(), 1);

    let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    let obj = value.as_object().unwrap();
    for field in &[
        "min_usec",
        "max_usec",
        "high_count",
        "count",
        "s_avg",
        "s_max",
        "recent_max_usec",
        "histogram",
    ] {
        assert!(obj.contains_key(*field), "missing {}", field);
    }
    assert!(!obj.contains_key("last_period"));
    assert_eq!(value["histogram"][0]["val"], 1);
}

#[test]
#[cfg(not(feature = "bypass"))]
fn recent_report_histogram_optional() {
    let h = scenario();

    let light = h.recent_report(false);
    assert!(light.histogram.is_none());
    let json = light.to_json().unwrap();
    assert!(!json.contains("histogram"));

    let heavy = h.recent_report(true);
    let hist = heavy.histogram.unwrap();
    assert_eq!(hist["0"], 3);
    assert_eq!(hist.len(), 2);
}

#[test]
#[cfg(not(feature = "bypass"))]
fn text_dump() {
    let h = TimeHistogram::default();
    h.add(155e-6);
    h.add(1e-6);
    h.period_tick();
    let text = h.full_report().to_string();
    assert!(text.contains(" cnt        : 2"));
    assert!(text.contains(" high_cnt   : 1"));
    assert!(text.contains(" percent    : 50.0 %"));
    assert!(text.contains(" h[150]  :  1"));
}

#[test]
#[cfg(not(feature = "bypass"))]
fn text_dump_of_empty_histogram() {
    let text = TimeHistogram::default().full_report().to_string();
    assert!(text.contains(" percent    : 0.0 %"));
}

#[test]
#[cfg(not(feature = "bypass"))]
fn infinite_sample_keeps_average_serializable() {
    let h = TimeHistogram::default();
    h.add(f64::INFINITY);
    h.add(100e-6);
    h.period_tick();

    let report = h.full_report();
    assert_eq!(report.count, 1);
    let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert!(value["s_avg"].is_f64());
}
