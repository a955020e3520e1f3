//! Lane filter configuration tree.
//!
//! Every section carries serde defaults, so a partial TOML/JSON document is
//! completed with the tuned values below. Call
//! [`LaneFilterConfig::validate`] before building a filter from it.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::LaneError;

/// Largest number of bins accepted along one grid axis.
pub const MAX_AXIS_BINS: usize = 4096;

/// Largest number of cells accepted for the whole `(d, phi)` grid.
pub const MAX_GRID_CELLS: usize = 1 << 20;

/// Largest process-noise kernel width, in cells.
pub const MAX_SIGMA_CELLS: f64 = 1_000.0;

/// Tolerance that keeps an exact `(max - min) / delta` division from gaining
/// an extra bin to floating-point noise.
const BIN_COUNT_EPSILON: f64 = 1e-9;

// ────────────────────────────────────────────────────────────────────────────
// Filter selection
// ────────────────────────────────────────────────────────────────────────────

/// Closed set of lane filter implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    /// Discrete Bayes filter over a `(d, phi)` histogram.
    #[default]
    Histogram,
}

// ────────────────────────────────────────────────────────────────────────────
// Sections
// ────────────────────────────────────────────────────────────────────────────

/// One discretised axis of the belief grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AxisConfig {
    pub min: f64,
    pub max: f64,
    /// Bin width.
    pub delta: f64,
}

impl AxisConfig {
    /// Number of bins covering `[min, max)`, at least one.
    ///
    /// Only meaningful for an axis that passed validation.
    pub fn bins(&self) -> usize {
        ((self.max - self.min) / self.delta - BIN_COUNT_EPSILON)
            .ceil()
            .max(1.0) as usize
    }

    fn validate(&self, name: &str) -> Result<(), LaneError> {
        if !self.min.is_finite() || !self.max.is_finite() || !self.delta.is_finite() {
            return Err(invalid(format!("{name} axis bounds must be finite")));
        }
        if self.min >= self.max {
            return Err(invalid(format!(
                "{name} axis min {} must be below max {}",
                self.min, self.max
            )));
        }
        if self.delta <= 0.0 {
            return Err(invalid(format!(
                "{name} axis resolution {} must be positive",
                self.delta
            )));
        }
        let span = (self.max - self.min) / self.delta;
        if !span.is_finite() || span - BIN_COUNT_EPSILON > MAX_AXIS_BINS as f64 {
            return Err(invalid(format!(
                "{name} axis resolution {} gives more than {MAX_AXIS_BINS} bins",
                self.delta
            )));
        }
        Ok(())
    }
}

/// Extent and resolution of the `(d, phi)` grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GridConfig {
    #[serde(default = "default_d_axis")]
    pub d: AxisConfig,
    #[serde(default = "default_phi_axis")]
    pub phi: AxisConfig,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            d: default_d_axis(),
            phi: default_phi_axis(),
        }
    }
}

/// Belief the filter starts from and falls back to after a collapse.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PriorConfig {
    Uniform,
    Gaussian {
        mean_d: f64,
        mean_phi: f64,
        sigma_d: f64,
        sigma_phi: f64,
    },
}

impl Default for PriorConfig {
    fn default() -> Self {
        PriorConfig::Gaussian {
            mean_d: 0.0,
            mean_phi: 0.0,
            sigma_d: 0.1,
            sigma_phi: 0.1,
        }
    }
}

/// Process-noise kernel applied after every motion shift.
///
/// Base widths are expressed in cells and grow with elapsed time and with
/// the magnitude of the commanded turn.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProcessNoiseConfig {
    #[serde(default = "default_sigma_d_cells")]
    pub sigma_d_cells: f64,
    #[serde(default = "default_sigma_phi_cells")]
    pub sigma_phi_cells: f64,
    #[serde(default = "default_growth_per_second")]
    pub growth_per_second: f64,
    #[serde(default = "default_growth_per_radian")]
    pub growth_per_radian: f64,
}

impl Default for ProcessNoiseConfig {
    fn default() -> Self {
        Self {
            sigma_d_cells: default_sigma_d_cells(),
            sigma_phi_cells: default_sigma_phi_cells(),
            growth_per_second: default_growth_per_second(),
            growth_per_radian: default_growth_per_radian(),
        }
    }
}

/// Observation model: lane geometry, likelihood tolerances and trusted range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ObservationConfig {
    /// Lateral tolerance of the segment likelihood (m).
    #[serde(default = "default_obs_sigma_d")]
    pub sigma_d: f64,
    /// Angular tolerance of the segment likelihood (rad).
    #[serde(default = "default_obs_sigma_phi")]
    pub sigma_phi: f64,
    /// Distance between the inner edges of the white and yellow lines (m).
    #[serde(default = "default_lane_width")]
    pub lane_width: f64,
    #[serde(default = "default_line_width_white")]
    pub line_width_white: f64,
    #[serde(default = "default_line_width_yellow")]
    pub line_width_yellow: f64,
    /// Segments closer than this are ignored (m).
    #[serde(default = "default_range_min")]
    pub range_min: f64,
    /// Segments farther than this are ignored (m).
    #[serde(default = "default_range_max")]
    pub range_max: f64,
}

impl Default for ObservationConfig {
    fn default() -> Self {
        Self {
            sigma_d: default_obs_sigma_d(),
            sigma_phi: default_obs_sigma_phi(),
            lane_width: default_lane_width(),
            line_width_white: default_line_width_white(),
            line_width_yellow: default_line_width_yellow(),
            range_min: default_range_min(),
            range_max: default_range_max(),
        }
    }
}

/// Point-estimate extraction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EstimateConfig {
    /// Peak mass the belief must exceed for the vehicle to count as in lane.
    #[serde(default = "default_min_max")]
    pub min_max: f64,
    /// Number of ranked local maxima reported alongside the mode.
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,
}

impl Default for EstimateConfig {
    fn default() -> Self {
        Self {
            min_max: default_min_max(),
            max_candidates: default_max_candidates(),
        }
    }
}

/// Road-shape heuristic parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CurvatureConfig {
    /// Estimates kept, including the current one.
    #[serde(default = "default_history_len")]
    pub history_len: usize,
    /// Past estimates (current excluded) the classification looks at.
    #[serde(default = "default_trail_len")]
    pub trail_len: usize,
    #[serde(default = "default_phi_threshold")]
    pub phi_threshold: f64,
    #[serde(default = "default_d_threshold")]
    pub d_threshold: f64,
    /// Nominal curvature reported for a left curve.
    #[serde(default = "default_left_curvature")]
    pub left_curvature: f64,
    /// Nominal curvature reported for a right curve.
    #[serde(default = "default_right_curvature")]
    pub right_curvature: f64,
}

impl Default for CurvatureConfig {
    fn default() -> Self {
        Self {
            history_len: default_history_len(),
            trail_len: default_trail_len(),
            phi_threshold: default_phi_threshold(),
            d_threshold: default_d_threshold(),
            left_curvature: default_left_curvature(),
            right_curvature: default_right_curvature(),
        }
    }
}

/// Handling of the asynchronously received velocity command.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MotionConfig {
    /// Commands older than this are treated as zero velocity. `0` disables
    /// the check.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: default_stale_after_secs(),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Root
// ────────────────────────────────────────────────────────────────────────────

/// Complete lane filter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct LaneFilterConfig {
    #[serde(default)]
    pub filter: FilterKind,
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub prior: PriorConfig,
    #[serde(default)]
    pub process_noise: ProcessNoiseConfig,
    #[serde(default)]
    pub observation: ObservationConfig,
    #[serde(default)]
    pub estimate: EstimateConfig,
    #[serde(default)]
    pub curvature: CurvatureConfig,
    #[serde(default)]
    pub motion: MotionConfig,
}

impl LaneFilterConfig {
    /// Check every section for values the filter cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`LaneError::InvalidConfiguration`] naming the first offending
    /// field.
    pub fn validate(&self) -> Result<(), LaneError> {
        self.grid.d.validate("d")?;
        self.grid.phi.validate("phi")?;
        let cells = self
            .grid
            .d
            .bins()
            .checked_mul(self.grid.phi.bins())
            .filter(|&n| n <= MAX_GRID_CELLS);
        if cells.is_none() {
            return Err(invalid(format!(
                "grid of {} x {} bins exceeds {MAX_GRID_CELLS} cells",
                self.grid.d.bins(),
                self.grid.phi.bins()
            )));
        }

        if let PriorConfig::Gaussian {
            mean_d,
            mean_phi,
            sigma_d,
            sigma_phi,
        } = self.prior
        {
            if !mean_d.is_finite() || !mean_phi.is_finite() {
                return Err(invalid("prior mean must be finite"));
            }
            require_positive("prior.sigma_d", sigma_d)?;
            require_positive("prior.sigma_phi", sigma_phi)?;
        }

        let noise = &self.process_noise;
        require_non_negative("process_noise.sigma_d_cells", noise.sigma_d_cells)?;
        require_non_negative("process_noise.sigma_phi_cells", noise.sigma_phi_cells)?;
        for (name, sigma) in [
            ("process_noise.sigma_d_cells", noise.sigma_d_cells),
            ("process_noise.sigma_phi_cells", noise.sigma_phi_cells),
        ] {
            if sigma > MAX_SIGMA_CELLS {
                return Err(invalid(format!(
                    "{name} {sigma} exceeds {MAX_SIGMA_CELLS} cells"
                )));
            }
        }
        require_non_negative("process_noise.growth_per_second", noise.growth_per_second)?;
        require_non_negative("process_noise.growth_per_radian", noise.growth_per_radian)?;

        let obs = &self.observation;
        require_positive("observation.sigma_d", obs.sigma_d)?;
        require_positive("observation.sigma_phi", obs.sigma_phi)?;
        require_positive("observation.lane_width", obs.lane_width)?;
        require_non_negative("observation.line_width_white", obs.line_width_white)?;
        require_non_negative("observation.line_width_yellow", obs.line_width_yellow)?;
        require_non_negative("observation.range_min", obs.range_min)?;
        require_non_negative("observation.range_max", obs.range_max)?;
        if obs.range_min > obs.range_max {
            return Err(invalid(format!(
                "observation.range_min {} exceeds range_max {}",
                obs.range_min, obs.range_max
            )));
        }

        let est = &self.estimate;
        if !(0.0..1.0).contains(&est.min_max) {
            return Err(invalid(format!(
                "estimate.min_max {} must lie in [0, 1)",
                est.min_max
            )));
        }

        let curv = &self.curvature;
        if curv.history_len == 0 {
            return Err(invalid("curvature.history_len must be at least 1"));
        }
        if curv.trail_len >= curv.history_len {
            return Err(invalid(format!(
                "curvature.trail_len {} must be smaller than history_len {}",
                curv.trail_len, curv.history_len
            )));
        }
        require_non_negative("curvature.phi_threshold", curv.phi_threshold)?;
        require_non_negative("curvature.d_threshold", curv.d_threshold)?;
        if !curv.left_curvature.is_finite() || !curv.right_curvature.is_finite() {
            return Err(invalid("nominal curvatures must be finite"));
        }

        require_non_negative("motion.stale_after_secs", self.motion.stale_after_secs)?;
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

fn invalid(msg: impl Into<String>) -> LaneError {
    LaneError::InvalidConfiguration(msg.into())
}

fn require_positive(name: &str, value: f64) -> Result<(), LaneError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(format!("{name} must be positive, got {value}")))
    }
}

fn require_non_negative(name: &str, value: f64) -> Result<(), LaneError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(format!("{name} must be non-negative, got {value}")))
    }
}

fn default_d_axis() -> AxisConfig {
    AxisConfig {
        min: -0.15,
        max: 0.3,
        delta: 0.02,
    }
}
fn default_phi_axis() -> AxisConfig {
    AxisConfig {
        min: -1.5,
        max: 1.5,
        delta: 0.1,
    }
}
fn default_sigma_d_cells() -> f64 {
    1.0
}
fn default_sigma_phi_cells() -> f64 {
    2.0
}
fn default_growth_per_second() -> f64 {
    0.5
}
fn default_growth_per_radian() -> f64 {
    1.0
}
fn default_obs_sigma_d() -> f64 {
    0.05
}
fn default_obs_sigma_phi() -> f64 {
    0.2
}
fn default_lane_width() -> f64 {
    0.23
}
fn default_line_width_white() -> f64 {
    0.05
}
fn default_line_width_yellow() -> f64 {
    0.025
}
fn default_range_min() -> f64 {
    0.6
}
fn default_range_max() -> f64 {
    1.2
}
fn default_min_max() -> f64 {
    0.1
}
fn default_max_candidates() -> usize {
    5
}
fn default_history_len() -> usize {
    6
}
fn default_trail_len() -> usize {
    2
}
fn default_phi_threshold() -> f64 {
    0.2
}
fn default_d_threshold() -> f64 {
    0.03
}
fn default_left_curvature() -> f64 {
    0.025
}
fn default_right_curvature() -> f64 {
    0.054
}
fn default_stale_after_secs() -> f64 {
    1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(LaneFilterConfig::default().validate().is_ok());
    }

    #[test]
    fn inverted_axis_is_rejected() {
        let mut cfg = LaneFilterConfig::default();
        cfg.grid.d.min = 0.5;
        cfg.grid.d.max = 0.5;
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, LaneError::InvalidConfiguration(ref m) if m.contains("d axis")));
    }

    #[test]
    fn non_positive_resolution_is_rejected() {
        let mut cfg = LaneFilterConfig::default();
        cfg.grid.phi.delta = 0.0;
        assert!(matches!(
            cfg.validate(),
            Err(LaneError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn oversized_axis_is_rejected() {
        let mut cfg = LaneFilterConfig::default();
        cfg.grid.d.delta = 1e-9;
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, LaneError::InvalidConfiguration(ref m) if m.contains("d axis")));

        let mut cfg = LaneFilterConfig::default();
        cfg.grid.phi.delta = f64::MIN_POSITIVE;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn axis_at_the_bin_limit_is_accepted() {
        let mut cfg = LaneFilterConfig::default();
        cfg.grid.d = AxisConfig {
            min: 0.0,
            max: MAX_AXIS_BINS as f64,
            delta: 1.0,
        };
        cfg.grid.phi = AxisConfig {
            min: 0.0,
            max: 1.0,
            delta: 1.0,
        };
        assert_eq!(cfg.grid.d.bins(), MAX_AXIS_BINS);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn oversized_grid_is_rejected_even_when_each_axis_fits() {
        let mut cfg = LaneFilterConfig::default();
        let axis = AxisConfig {
            min: 0.0,
            max: MAX_AXIS_BINS as f64,
            delta: 1.0,
        };
        cfg.grid.d = axis;
        cfg.grid.phi = axis;
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, LaneError::InvalidConfiguration(ref m) if m.contains("cells")));
    }

    #[test]
    fn huge_process_noise_is_rejected() {
        let mut cfg = LaneFilterConfig::default();
        cfg.process_noise.sigma_d_cells = 1e300;
        assert!(cfg.validate().is_err());

        let mut cfg = LaneFilterConfig::default();
        cfg.process_noise.sigma_phi_cells = MAX_SIGMA_CELLS * 2.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn bin_count_ignores_division_noise() {
        let axis = AxisConfig {
            min: -1.5,
            max: 1.5,
            delta: 0.1,
        };
        assert_eq!(axis.bins(), 30);
    }

    #[test]
    fn non_finite_bounds_are_rejected() {
        let mut cfg = LaneFilterConfig::default();
        cfg.grid.d.max = f64::NAN;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn crossed_sensing_range_is_rejected() {
        let mut cfg = LaneFilterConfig::default();
        cfg.observation.range_min = 2.0;
        cfg.observation.range_max = 1.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn trail_must_fit_in_history() {
        let mut cfg = LaneFilterConfig::default();
        cfg.curvature.trail_len = cfg.curvature.history_len;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn min_max_outside_unit_interval_is_rejected() {
        let mut cfg = LaneFilterConfig::default();
        cfg.estimate.min_max = 1.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_json_is_completed_with_defaults() {
        let json = r#"{"observation":{"range_min":0.1},"prior":{"type":"uniform"}}"#;
        let cfg: LaneFilterConfig = serde_json::from_str(json).unwrap();
        assert!((cfg.observation.range_min - 0.1).abs() < 1e-12);
        assert!((cfg.observation.range_max - 1.2).abs() < 1e-12);
        assert_eq!(cfg.prior, PriorConfig::Uniform);
        assert_eq!(cfg.filter, FilterKind::Histogram);
        assert_eq!(cfg.curvature.history_len, 6);
    }

    #[test]
    fn schema_lists_top_level_sections() {
        let schema = schemars::schema_for!(LaneFilterConfig);
        let json = serde_json::to_string(&schema).unwrap();
        assert!(json.contains("observation"));
        assert!(json.contains("curvature"));
    }
}
