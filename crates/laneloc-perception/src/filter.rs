//! Lane filter interface and the histogram implementation.
//!
//! [`LaneFilter`] is the seam the runtime drives: predict with the commanded
//! motion, update with the latest segments, read the estimate. Every variant
//! keeps its belief normalised after each step and reseeds from the prior
//! when the belief collapses, so callers never observe a degenerate belief.
//!
//! # Example
//!
//! ```rust
//! use laneloc_perception::filter::{LaneFilter, LaneFilterImpl};
//! use laneloc_perception::observation::SensingRange;
//! use laneloc_types::LaneFilterConfig;
//!
//! let config = LaneFilterConfig::default();
//! let mut filter = LaneFilterImpl::from_config(&config).unwrap();
//!
//! filter.predict(0.1, 0.2, 0.0);
//! let report = filter.update(&[], &SensingRange::from(&config.observation));
//! assert_eq!(report.retained, 0);
//! assert!((filter.belief().total_mass() - 1.0).abs() < 1e-9);
//! ```

use laneloc_types::config::{EstimateConfig, FilterKind};
use laneloc_types::{LaneError, LaneFilterConfig, Segment};
use tracing::{debug, warn};

use crate::estimate::{self, Estimate};
use crate::grid::{GridAxis, GridBelief};
use crate::motion::{self, PredictReport};
use crate::observation::{self, SensingRange, UpdateReport};

/// Operations every lane filter variant provides.
pub trait LaneFilter: Send {
    /// Advance the belief by `dt` seconds of motion at `(v, w)`.
    fn predict(&mut self, dt: f64, v: f64, w: f64) -> PredictReport;

    /// Fold the usable segments of one frame into the belief.
    fn update(&mut self, segments: &[Segment], range: &SensingRange) -> UpdateReport;

    fn estimate(&self, cfg: &EstimateConfig) -> Estimate;

    /// Mass of the most probable cell.
    fn max_mass(&self) -> f64;

    fn belief(&self) -> &GridBelief;

    /// Reseed the belief from the configured prior.
    fn reset(&mut self);
}

// ────────────────────────────────────────────────────────────────────────────
// HistogramFilter
// ────────────────────────────────────────────────────────────────────────────

/// Bayes filter over a fixed `(d, phi)` histogram.
#[derive(Debug, Clone)]
pub struct HistogramFilter {
    config: LaneFilterConfig,
    prior: GridBelief,
    belief: GridBelief,
}

impl HistogramFilter {
    /// # Errors
    ///
    /// Returns [`LaneError::InvalidConfiguration`] when `config` fails
    /// validation.
    pub fn new(config: &LaneFilterConfig) -> Result<Self, LaneError> {
        config.validate()?;
        let d_axis = GridAxis::new(&config.grid.d)?;
        let phi_axis = GridAxis::new(&config.grid.phi)?;
        let prior = GridBelief::from_prior(d_axis, phi_axis, &config.prior);
        debug!(
            d_bins = d_axis.bins(),
            phi_bins = phi_axis.bins(),
            "histogram filter initialised"
        );
        Ok(Self {
            config: *config,
            belief: prior.clone(),
            prior,
        })
    }

    pub fn config(&self) -> &LaneFilterConfig {
        &self.config
    }

    /// Swap the noise, observation and readout parameters while keeping the
    /// current belief. Grid and prior changes need a fresh filter.
    ///
    /// # Errors
    ///
    /// Returns [`LaneError::InvalidConfiguration`] when `config` fails
    /// validation, or changes the grid or the prior.
    pub fn retune(&mut self, config: &LaneFilterConfig) -> Result<(), LaneError> {
        config.validate()?;
        if config.grid != self.config.grid || config.prior != self.config.prior {
            return Err(LaneError::InvalidConfiguration(
                "grid or prior changed; rebuild the filter".to_string(),
            ));
        }
        self.config = *config;
        Ok(())
    }

    /// Normalise the belief, reseeding from the prior if it has collapsed.
    /// Returns `true` when a reseed happened.
    fn renormalize(&mut self, stage: &str) -> bool {
        match self.belief.normalize() {
            Ok(()) => false,
            Err(err) => {
                warn!(stage, error = %err, "belief collapsed; reseeding from prior");
                self.belief = self.prior.clone();
                true
            }
        }
    }
}

impl LaneFilter for HistogramFilter {
    fn predict(&mut self, dt: f64, v: f64, w: f64) -> PredictReport {
        let mut report = motion::predict(&mut self.belief, &self.config.process_noise, dt, v, w);
        if report.applied {
            report.recovered = self.renormalize("predict");
        }
        report
    }

    fn update(&mut self, segments: &[Segment], range: &SensingRange) -> UpdateReport {
        let (retained, discarded) =
            observation::apply_segments(&mut self.belief, segments, range, &self.config.observation);
        let recovered = retained > 0 && self.renormalize("update");
        UpdateReport {
            retained,
            discarded,
            recovered,
        }
    }

    fn estimate(&self, cfg: &EstimateConfig) -> Estimate {
        estimate::extract(&self.belief, cfg)
    }

    fn max_mass(&self) -> f64 {
        self.belief.max_cell().weight
    }

    fn belief(&self) -> &GridBelief {
        &self.belief
    }

    fn reset(&mut self) {
        self.belief = self.prior.clone();
    }
}

// ────────────────────────────────────────────────────────────────────────────
// LaneFilterImpl
// ────────────────────────────────────────────────────────────────────────────

/// Closed set of filter variants, selected by [`FilterKind`].
#[derive(Debug, Clone)]
pub enum LaneFilterImpl {
    Histogram(HistogramFilter),
}

impl LaneFilterImpl {
    /// Build the variant named by `config.filter`.
    ///
    /// # Errors
    ///
    /// Returns [`LaneError::InvalidConfiguration`] when `config` is invalid.
    pub fn from_config(config: &LaneFilterConfig) -> Result<Self, LaneError> {
        match config.filter {
            FilterKind::Histogram => Ok(Self::Histogram(HistogramFilter::new(config)?)),
        }
    }

    pub fn config(&self) -> &LaneFilterConfig {
        match self {
            Self::Histogram(f) => f.config(),
        }
    }

    /// See [`HistogramFilter::retune`].
    ///
    /// # Errors
    ///
    /// Fails when `config` is invalid or needs a rebuild.
    pub fn retune(&mut self, config: &LaneFilterConfig) -> Result<(), LaneError> {
        if config.filter != self.config().filter {
            return Err(LaneError::InvalidConfiguration(
                "filter kind changed; rebuild the filter".to_string(),
            ));
        }
        match self {
            Self::Histogram(f) => f.retune(config),
        }
    }
}

impl LaneFilter for LaneFilterImpl {
    fn predict(&mut self, dt: f64, v: f64, w: f64) -> PredictReport {
        match self {
            Self::Histogram(f) => f.predict(dt, v, w),
        }
    }

    fn update(&mut self, segments: &[Segment], range: &SensingRange) -> UpdateReport {
        match self {
            Self::Histogram(f) => f.update(segments, range),
        }
    }

    fn estimate(&self, cfg: &EstimateConfig) -> Estimate {
        match self {
            Self::Histogram(f) => f.estimate(cfg),
        }
    }

    fn max_mass(&self) -> f64 {
        match self {
            Self::Histogram(f) => f.max_mass(),
        }
    }

    fn belief(&self) -> &GridBelief {
        match self {
            Self::Histogram(f) => f.belief(),
        }
    }

    fn reset(&mut self) {
        match self {
            Self::Histogram(f) => f.reset(),
        }
    }
}
