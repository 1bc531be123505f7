//! Placement of samples in the decade/sub-bucket table.
//!
//! A sample is scaled to whole 10µs units and split into a decade (units / 10)
//! and a sub-bucket (units % 10, shifted down by one when non-zero). The
//! shift means two consecutive units share the first sub-bucket of every
//! decade but the first, and the last sub-bucket is never produced. Report
//! consumers key on the resulting values, so the mapping is kept as is.

/// Number of decades in the table.
pub const DECADES: usize = 5;

/// Linear subdivisions of one decade.
pub const SUB_BUCKETS: usize = 10;

/// Total cells in the flat table.
pub const CELLS: usize = DECADES * SUB_BUCKETS;

/// Samples are in seconds; buckets work in 10µs units.
const UNITS_PER_SECOND: f64 = 100_000.;

/// Report key of the synthetic bucket holding samples below the noise floor.
pub const BELOW_FLOOR_KEY: u32 = 0;

/// Coordinates of one cell of the bucket table. Always in range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BucketIndex {
    decade: usize,
    sub: usize,
}

impl BucketIndex {
    pub fn new(decade: usize, sub: usize) -> Option<BucketIndex> {
        if decade >= DECADES || sub >= SUB_BUCKETS {
            return None;
        }
        Some(BucketIndex { decade, sub })
    }

    pub fn decade(self) -> usize {
        self.decade
    }

    pub fn sub(self) -> usize {
        self.sub
    }

    /// Finds the cell for a sample of `dt` seconds, or `None` if the
    /// sample is outside the table (negative, not finite, or too large).
    pub fn locate(dt: f64) -> Option<BucketIndex> {
        if !dt.is_finite() || dt < 0. {
            return None;
        }

        // float to int casts saturate, so huge samples fall out below
        let units = (dt * UNITS_PER_SECOND) as u32 as usize;
        let decade = units / 10;
        let mut sub = units % 10;
        if sub > 0 {
            sub -= 1;
        }

        BucketIndex::new(decade, sub)
    }

    pub fn from_flat(flat: usize) -> Option<BucketIndex> {
        if flat >= CELLS {
            return None;
        }
        Some(BucketIndex {
            decade: flat / SUB_BUCKETS,
            sub: flat % SUB_BUCKETS,
        })
    }

    #[inline]
    pub fn flat(self) -> usize {
        self.decade * SUB_BUCKETS + self.sub
    }

    /// Report key: the bin's upper bound in microseconds.
    pub fn key(self) -> u32 {
        10 * self.flat() as u32 + 10
    }
}

#[test]
fn decade_and_sub() {
    assert_eq!(
        BucketIndex::locate(155e-6),
        Some(BucketIndex { decade: 1, sub: 4 })
    );
    assert_eq!(BucketIndex::locate(155e-6).map(BucketIndex::key), Some(150));
    assert_eq!(
        BucketIndex::locate(12e-6),
        Some(BucketIndex { decade: 0, sub: 0 })
    );
    assert_eq!(
        BucketIndex::locate(495e-6),
        Some(BucketIndex { decade: 4, sub: 8 })
    );
}

#[test]
fn boundary_quirk() {
    // 100µs and 110µs share a cell; the last sub-bucket stays empty
    let a = BucketIndex::locate(100e-6).unwrap();
    let b = BucketIndex::locate(115e-6).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.key(), 110);

    for us in 0..500u32 {
        let idx = BucketIndex::locate(f64::from(us) * 1e-6 + 0.5e-6).unwrap();
        assert_ne!(idx.sub, SUB_BUCKETS - 1);
        assert_ne!(idx.key(), 200);
    }
}

#[test]
fn out_of_range() {
    assert_eq!(BucketIndex::locate(500e-6), None);
    assert_eq!(BucketIndex::locate(1.0), None);
    assert_eq!(BucketIndex::locate(1e300), None);
    assert_eq!(BucketIndex::locate(-1e-6), None);
    assert_eq!(BucketIndex::locate(f64::NAN), None);
    assert_eq!(BucketIndex::locate(f64::INFINITY), None);
}

#[test]
fn flat_roundtrip() {
    assert_eq!(BucketIndex::from_flat(CELLS), None);
    let idx = BucketIndex::from_flat(23).unwrap();
    assert_eq!(idx, BucketIndex { decade: 2, sub: 3 });
    assert_eq!(idx.flat(), 23);
    assert_eq!(idx.key(), 240);
}

#[test]
fn rejects_out_of_range_coordinates() {
    assert_eq!(BucketIndex::new(0, SUB_BUCKETS), None);
    assert_eq!(BucketIndex::new(0, 14), None);
    assert_eq!(BucketIndex::new(DECADES, 0), None);
    assert_eq!(BucketIndex::new(usize::MAX, 0), None);

    let idx = BucketIndex::new(DECADES - 1, SUB_BUCKETS - 1).unwrap();
    assert_eq!(idx.flat(), CELLS - 1);
    assert_eq!((idx.decade(), idx.sub()), (DECADES - 1, SUB_BUCKETS - 1));
}
