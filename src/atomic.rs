//! An `f64` cell readable from other threads, written by one thread at a time.
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub const fn zero() -> AtomicF64 {
        // 0.0_f64 has an all-zero bit pattern
        AtomicF64(AtomicU64::new(0))
    }

    #[inline]
    pub fn load(&self, order: Ordering) -> f64 {
        f64::from_bits(self.0.load(order))
    }

    #[inline]
    pub fn store(&self, value: f64, order: Ordering) {
        self.0.store(value.to_bits(), order)
    }

    /// Adds `delta`. Not a read-modify-write instruction: concurrent
    /// writers lose updates.
    #[inline]
    pub fn add(&self, delta: f64, order: Ordering) {
        let current = self.load(Ordering::Relaxed);
        self.store(current + delta, order)
    }

    /// Raises the stored value to `value` if it is larger. Same single
    /// writer caveat as `add`.
    #[inline]
    pub fn raise(&self, value: f64, order: Ordering) {
        if value > self.load(Ordering::Relaxed) {
            self.store(value, order)
        }
    }
}

#[test]
fn zero_is_zero() {
    assert_eq!(AtomicF64::zero().load(Ordering::Relaxed), 0.);
    assert_eq!(AtomicF64::default().load(Ordering::Relaxed), 0.);
}

#[test]
fn add_and_raise() {
    let a = AtomicF64::zero();
    a.add(1.5, Ordering::Relaxed);
    a.add(2.0, Ordering::Relaxed);
    assert_eq!(a.load(Ordering::Relaxed), 3.5);

    a.raise(1.0, Ordering::Relaxed);
    assert_eq!(a.load(Ordering::Relaxed), 3.5);
    a.raise(7.25, Ordering::Relaxed);
    assert_eq!(a.load(Ordering::Relaxed), 7.25);
    a.raise(f64::NAN, Ordering::Relaxed);
    assert_eq!(a.load(Ordering::Relaxed), 7.25);
}
