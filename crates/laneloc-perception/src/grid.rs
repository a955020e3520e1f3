//! Discretised `(d, phi)` belief.
//!
//! [`GridBelief`] stores one non-negative weight per cell in row-major order
//! (row = d bin, column = phi bin). Every cell is addressed by the centre of
//! its bin; [`GridAxis::index_of`] maps a continuous value back onto a bin,
//! saturating at the grid edges.
//!
//! # Example
//!
//! ```rust
//! use laneloc_perception::grid::{GridAxis, GridBelief};
//! use laneloc_types::config::{AxisConfig, PriorConfig};
//!
//! let d = GridAxis::new(&AxisConfig { min: -0.2, max: 0.2, delta: 0.1 }).unwrap();
//! let phi = GridAxis::new(&AxisConfig { min: -1.0, max: 1.0, delta: 0.5 }).unwrap();
//! let belief = GridBelief::from_prior(d, phi, &PriorConfig::Uniform);
//!
//! assert_eq!(belief.shape(), (4, 4));
//! assert!((belief.total_mass() - 1.0).abs() < 1e-12);
//! ```

use laneloc_types::LaneError;
use laneloc_types::config::{AxisConfig, MAX_AXIS_BINS, PriorConfig};

// ────────────────────────────────────────────────────────────────────────────
// GridAxis
// ────────────────────────────────────────────────────────────────────────────

/// One axis of the belief grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridAxis {
    min: f64,
    max: f64,
    delta: f64,
    bins: usize,
}

impl GridAxis {
    /// Build an axis from its configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LaneError::InvalidConfiguration`] when the bounds are not
    /// finite, `min >= max`, `delta <= 0`, or the axis would need more than
    /// [`MAX_AXIS_BINS`] bins.
    pub fn new(cfg: &AxisConfig) -> Result<Self, LaneError> {
        if !cfg.min.is_finite() || !cfg.max.is_finite() || !cfg.delta.is_finite() {
            return Err(LaneError::InvalidConfiguration(
                "grid axis bounds must be finite".to_string(),
            ));
        }
        if cfg.min >= cfg.max || cfg.delta <= 0.0 {
            return Err(LaneError::InvalidConfiguration(format!(
                "grid axis [{}, {}] with resolution {} is malformed",
                cfg.min, cfg.max, cfg.delta
            )));
        }
        let span = (cfg.max - cfg.min) / cfg.delta;
        if !span.is_finite() || span > MAX_AXIS_BINS as f64 + 1.0 {
            return Err(LaneError::InvalidConfiguration(format!(
                "grid axis resolution {} gives more than {MAX_AXIS_BINS} bins",
                cfg.delta
            )));
        }
        let bins = cfg.bins();
        if bins > MAX_AXIS_BINS {
            return Err(LaneError::InvalidConfiguration(format!(
                "grid axis needs {bins} bins, limit is {MAX_AXIS_BINS}"
            )));
        }
        Ok(Self {
            min: cfg.min,
            max: cfg.max,
            delta: cfg.delta,
            bins,
        })
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn delta(&self) -> f64 {
        self.delta
    }

    /// Value at the centre of bin `index`.
    pub fn center(&self, index: usize) -> f64 {
        self.min + (index as f64 + 0.5) * self.delta
    }

    /// Bin containing `value`, clamped to the first/last bin.
    pub fn index_of(&self, value: f64) -> usize {
        let raw = ((value - self.min) / self.delta).floor();
        if raw.is_nan() || raw < 0.0 {
            0
        } else {
            (raw as usize).min(self.bins - 1)
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Cell summaries
// ────────────────────────────────────────────────────────────────────────────

/// The globally most probable cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaxCell {
    pub weight: f64,
    pub d_index: usize,
    pub phi_index: usize,
    pub d: f64,
    pub phi: f64,
}

/// A local maximum of the belief.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub d: f64,
    pub phi: f64,
    pub mass: f64,
}

// ────────────────────────────────────────────────────────────────────────────
// GridBelief
// ────────────────────────────────────────────────────────────────────────────

/// Probability mass over the discretised `(d, phi)` pose space.
#[derive(Debug, Clone, PartialEq)]
pub struct GridBelief {
    d_axis: GridAxis,
    phi_axis: GridAxis,
    cells: Vec<f64>,
}

impl GridBelief {
    /// A normalised belief seeded from `prior`.
    ///
    /// A Gaussian prior whose mass lies entirely outside the grid (every
    /// cell underflows to zero) falls back to uniform.
    pub fn from_prior(d_axis: GridAxis, phi_axis: GridAxis, prior: &PriorConfig) -> Self {
        let n = d_axis.bins() * phi_axis.bins();
        let mut belief = Self {
            d_axis,
            phi_axis,
            cells: vec![1.0; n],
        };
        if let PriorConfig::Gaussian {
            mean_d,
            mean_phi,
            sigma_d,
            sigma_phi,
        } = *prior
        {
            for i in 0..d_axis.bins() {
                let zd = (d_axis.center(i) - mean_d) / sigma_d;
                for j in 0..phi_axis.bins() {
                    let zp = (phi_axis.center(j) - mean_phi) / sigma_phi;
                    belief.cells[i * phi_axis.bins() + j] = (-0.5 * (zd * zd + zp * zp)).exp();
                }
            }
        }
        if belief.normalize().is_err() {
            belief.cells.fill(1.0 / n as f64);
        }
        belief
    }

    pub fn d_axis(&self) -> &GridAxis {
        &self.d_axis
    }

    pub fn phi_axis(&self) -> &GridAxis {
        &self.phi_axis
    }

    /// `(d bins, phi bins)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.d_axis.bins(), self.phi_axis.bins())
    }

    /// Flat row-major index of cell `(d_index, phi_index)`.
    pub fn flat_index(&self, d_index: usize, phi_index: usize) -> usize {
        d_index * self.phi_axis.bins() + phi_index
    }

    pub fn get(&self, d_index: usize, phi_index: usize) -> f64 {
        self.cells[self.flat_index(d_index, phi_index)]
    }

    /// Row-major cell weights.
    pub fn cells(&self) -> &[f64] {
        &self.cells
    }

    pub(crate) fn cells_mut(&mut self) -> &mut [f64] {
        &mut self.cells
    }

    pub(crate) fn replace_cells(&mut self, cells: Vec<f64>) {
        debug_assert_eq!(cells.len(), self.cells.len());
        self.cells = cells;
    }

    pub fn total_mass(&self) -> f64 {
        self.cells.iter().sum()
    }

    /// Scale every cell so that the weights sum to one.
    ///
    /// # Errors
    ///
    /// Returns [`LaneError::DegenerateBelief`] when the total mass is not
    /// finite, not positive, or subnormal. The cells are left untouched so
    /// the caller can reseed them.
    pub fn normalize(&mut self) -> Result<(), LaneError> {
        let total = self.total_mass();
        if !total.is_finite() || total < f64::MIN_POSITIVE {
            return Err(LaneError::DegenerateBelief { total_mass: total });
        }
        for c in &mut self.cells {
            *c /= total;
        }
        Ok(())
    }

    /// Shannon entropy in nats. Lower means a more concentrated belief.
    pub fn entropy(&self) -> f64 {
        -self
            .cells
            .iter()
            .filter(|&&p| p > 0.0)
            .map(|&p| p * p.ln())
            .sum::<f64>()
    }

    /// The most probable cell; ties go to the lowest flat index.
    pub fn max_cell(&self) -> MaxCell {
        let mut best = 0;
        for (k, &w) in self.cells.iter().enumerate() {
            if w > self.cells[best] {
                best = k;
            }
        }
        let d_index = best / self.phi_axis.bins();
        let phi_index = best % self.phi_axis.bins();
        MaxCell {
            weight: self.cells[best],
            d_index,
            phi_index,
            d: self.d_axis.center(d_index),
            phi: self.phi_axis.center(phi_index),
        }
    }

    /// Up to `k` cells that are at least as heavy as all eight neighbours,
    /// heaviest first.
    pub fn local_maxima(&self, k: usize) -> Vec<Candidate> {
        let (nd, np) = self.shape();
        let mut found: Vec<(usize, f64)> = Vec::new();
        for i in 0..nd {
            for j in 0..np {
                let w = self.get(i, j);
                if w <= 0.0 {
                    continue;
                }
                let is_peak = neighbours(i, nd)
                    .flat_map(|ni| neighbours(j, np).map(move |nj| (ni, nj)))
                    .filter(|&(ni, nj)| (ni, nj) != (i, j))
                    .all(|(ni, nj)| self.get(ni, nj) <= w);
                if is_peak {
                    found.push((self.flat_index(i, j), w));
                }
            }
        }
        found.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        found
            .into_iter()
            .take(k)
            .map(|(idx, mass)| Candidate {
                d: self.d_axis.center(idx / np),
                phi: self.phi_axis.center(idx % np),
                mass,
            })
            .collect()
    }

    /// Render the belief as mono8 intensities scaled to the peak cell.
    pub fn to_intensity_image(&self) -> Vec<u8> {
        let peak = self.cells.iter().copied().fold(0.0_f64, f64::max);
        if !(peak > 0.0) || !peak.is_finite() {
            return vec![0; self.cells.len()];
        }
        self.cells
            .iter()
            .map(|&p| (255.0 * (p / peak)).round().clamp(0.0, 255.0) as u8)
            .collect()
    }
}

fn neighbours(center: usize, len: usize) -> impl Iterator<Item = usize> {
    center.saturating_sub(1)..(center + 2).min(len)
}
