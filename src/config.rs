use serde::{Deserialize, Serialize};

use super::*;

/// Construction-time settings of a `TimeHistogram`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistogramConfig {
    /// Smallest sample, in seconds, that counts as high and gets bucketed.
    pub noise_floor: f64,
    /// Lifetime samples that must be folded before period maxima are
    /// tracked. Zero tracks from the first sample.
    pub warmup_threshold: u64,
}

impl Default for HistogramConfig {
    fn default() -> HistogramConfig {
        HistogramConfig {
            noise_floor: 10e-6,
            warmup_threshold: 10,
        }
    }
}

impl HistogramConfig {
    pub fn with_noise_floor(mut self, seconds: f64) -> HistogramConfig {
        self.noise_floor = seconds;
        self
    }

    pub fn with_warmup_threshold(mut self, samples: u64) -> HistogramConfig {
        self.warmup_threshold = samples;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.noise_floor.is_finite() || self.noise_floor < 0. {
            return Err(Error::InvalidNoiseFloor(self.noise_floor));
        }
        Ok(())
    }
}

#[test]
fn defaults() {
    let c = HistogramConfig::default();
    assert_eq!(c.noise_floor, 10e-6);
    assert_eq!(c.warmup_threshold, 10);
    assert!(c.validate().is_ok());
}

#[test]
fn rejects_bad_noise_floor() {
    for bad in &[-1e-6, f64::NAN, f64::INFINITY] {
        let c = HistogramConfig::default().with_noise_floor(*bad);
        match c.validate() {
            Err(Error::InvalidNoiseFloor(_)) => {}
            other => panic!("expected InvalidNoiseFloor, got {:?}", other),
        }
    }
    assert!(HistogramConfig::default().with_noise_floor(0.).validate().is_ok());
}

#[test]
fn partial_json() {
    let c: HistogramConfig = serde_json::from_str(r#"{"warmup_threshold": 0}"#).unwrap();
    assert_eq!(c, HistogramConfig::default().with_warmup_threshold(0));
}
