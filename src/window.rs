//! A fixed ring of per-period maxima.
use std::sync::atomic::{AtomicUsize, Ordering::{Acquire, Relaxed, Release}};

use super::*;

/// How many closed periods the window remembers.
pub const MAX_WINDOW: usize = 14;

/// The last `MAX_WINDOW` period maxima, written by the ticker only.
#[derive(Debug, Default)]
pub struct MaxWindow {
    slots: [AtomicF64; MAX_WINDOW],
    cursor: AtomicUsize,
}

impl MaxWindow {
    /// Overwrites the oldest entry.
    pub fn push(&self, max: f64) {
        let cursor = self.cursor.load(Relaxed);
        self.slots[cursor].store(max, Relaxed);
        self.cursor.store((cursor + 1) % MAX_WINDOW, Release);
    }

    pub fn clear(&self) {
        for slot in &self.slots {
            slot.store(0., Relaxed);
        }
        self.cursor.store(0, Release);
    }

    /// Oldest to newest, always `MAX_WINDOW` long. Unfilled entries read
    /// as zero.
    pub fn recent(&self) -> RecentMaxima<'_> {
        RecentMaxima {
            window: self,
            start: self.cursor.load(Acquire),
            taken: 0,
        }
    }
}

/// Lazy view over a `MaxWindow`, see `MaxWindow::recent`.
///
/// Each value is read when yielded, so a tick that lands mid-iteration
/// shows through. Collect it right away if the sequence must be stable.
#[derive(Debug, Clone)]
pub struct RecentMaxima<'a> {
    window: &'a MaxWindow,
    start: usize,
    taken: usize,
}

impl<'a> Iterator for RecentMaxima<'a> {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        if self.taken == MAX_WINDOW {
            return None;
        }
        let idx = (self.start + self.taken) % MAX_WINDOW;
        self.taken += 1;
        Some(self.window.slots[idx].load(Relaxed))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = MAX_WINDOW - self.taken;
        (left, Some(left))
    }
}

impl<'a> ExactSizeIterator for RecentMaxima<'a> {}

#[test]
fn newest_last() {
    let w = MaxWindow::default();
    w.push(1.);
    w.push(2.);
    w.push(3.);

    let v: Vec<f64> = w.recent().collect();
    assert_eq!(v.len(), MAX_WINDOW);
    assert_eq!(&v[MAX_WINDOW - 3..], &[1., 2., 3.]);
    assert!(v[..MAX_WINDOW - 3].iter().all(|m| *m == 0.));
}

#[test]
fn wraps() {
    let w = MaxWindow::default();
    for i in 0..MAX_WINDOW + 4 {
        w.push(i as f64);
    }
    let v: Vec<f64> = w.recent().collect();
    let expected: Vec<f64> = (4..MAX_WINDOW + 4).map(|i| i as f64).collect();
    assert_eq!(v, expected);

    // restartable
    let again: Vec<f64> = w.recent().collect();
    assert_eq!(again, expected);
    assert_eq!(w.recent().len(), MAX_WINDOW);
}

#[test]
fn clear_empties() {
    let w = MaxWindow::default();
    w.push(9.);
    w.clear();
    assert!(w.recent().all(|m| m == 0.));
}
