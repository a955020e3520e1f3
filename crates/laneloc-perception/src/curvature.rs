//! Curvature Classifier.
//!
//! Keeps a short history of recent estimates and labels the road ahead as
//! straight, a left curve or a right curve. The newest estimate is excluded
//! from the trailing window: a curve shows up as a persistent heading error
//! with a matching lateral drift, not as a single-frame spike.

use std::collections::VecDeque;

use laneloc_types::CurvatureLabel;
use laneloc_types::config::CurvatureConfig;

/// One past `(d, phi)` estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseSample {
    pub d: f64,
    pub phi: f64,
}

/// Bounded history of estimates, newest first.
#[derive(Debug, Clone, Default)]
pub struct CurvatureHistory {
    samples: VecDeque<PoseSample>,
    capacity: usize,
}

impl CurvatureHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record the newest estimate, evicting the oldest when full.
    pub fn push(&mut self, sample: PoseSample) {
        if self.capacity == 0 {
            return;
        }
        self.samples.push_front(sample);
        self.samples.truncate(self.capacity);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Change the capacity, dropping the oldest samples if it shrinks.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.samples.truncate(capacity);
    }

    /// Samples `1..=trail_len`, skipping the newest.
    pub fn trailing(&self, trail_len: usize) -> impl Iterator<Item = &PoseSample> {
        self.samples.iter().skip(1).take(trail_len)
    }

    /// Classify the trailing window.
    pub fn classify(&self, cfg: &CurvatureConfig) -> (CurvatureLabel, f64) {
        let window: Vec<PoseSample> = self.trailing(cfg.trail_len).copied().collect();
        if window.is_empty() {
            return (CurvatureLabel::Straight, 0.0);
        }
        let mut phis: Vec<f64> = window.iter().map(|s| s.phi).collect();
        let mean_d = window.iter().map(|s| s.d).sum::<f64>() / window.len() as f64;
        classify(median(&mut phis), mean_d, cfg)
    }
}

/// Label a trailing `(median phi, mean d)` pair.
///
/// The thresholds are strict: a value exactly on a threshold is straight.
pub fn classify(median_phi: f64, mean_d: f64, cfg: &CurvatureConfig) -> (CurvatureLabel, f64) {
    if median_phi < -cfg.phi_threshold && mean_d > cfg.d_threshold {
        (CurvatureLabel::LeftCurve, cfg.left_curvature)
    } else if median_phi > cfg.phi_threshold && mean_d < -cfg.d_threshold {
        (CurvatureLabel::RightCurve, cfg.right_curvature)
    } else {
        (CurvatureLabel::Straight, 0.0)
    }
}

/// Median of `values`; the mean of the middle pair for even lengths.
fn median(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) * 0.5
    }
}
