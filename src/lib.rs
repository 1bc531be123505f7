//! A latency histogram for a hot path that must not be slowed down by the
//! code reporting on it.
//!
//! One producer thread feeds samples with [`TimeHistogram::add`]; one
//! reporting thread closes periods with [`TimeHistogram::period_tick`] and
//! reads the closed period, the lifetime aggregates and a coarse bucket
//! table. No locks are taken on either side.
//!
//! ```
//! use timehisto::TimeHistogram;
//!
//! let h = TimeHistogram::default();
//! h.add(0.000_155);
//! h.add(0.000_002);
//! h.period_tick();
//!
//! let snap = h.snapshot();
//! assert_eq!(snap.buckets.get(&150), Some(&1));
//! ```
use atomic::AtomicF64;

pub use bucket::{BucketIndex, BELOW_FLOOR_KEY, CELLS, DECADES, SUB_BUCKETS};
pub use config::HistogramConfig;
pub use error::{Error, Result};
pub use histo::TimeHistogram;
pub use period::{PeriodAccumulator, PeriodStats};
pub use snapshot::{usec, BucketEntry, FullReport, RecentReport, Snapshot};
pub use window::{MaxWindow, RecentMaxima, MAX_WINDOW};

mod atomic;
mod bucket;
mod config;
mod error;
mod histo;
mod period;
mod snapshot;
mod window;
