//! Estimate Extractor.
//!
//! Reads the published pose off a normalised belief: the centre of the most
//! probable cell, whether that cell is confident enough to count as "in
//! lane", and the ranked local maxima that may seed alternate hypotheses.

use laneloc_types::config::EstimateConfig;

use crate::grid::{Candidate, GridBelief};

#[derive(Debug, Clone, PartialEq)]
pub struct Estimate {
    pub d: f64,
    pub phi: f64,
    pub max_mass: f64,
    /// `max_mass` strictly exceeds the configured threshold.
    pub in_lane: bool,
    /// Local maxima, heaviest first. The first entry is the global maximum.
    pub candidates: Vec<Candidate>,
}

/// Extract the current estimate from a normalised `belief`.
pub fn extract(belief: &GridBelief, cfg: &EstimateConfig) -> Estimate {
    let max = belief.max_cell();
    Estimate {
        d: max.d,
        phi: max.phi,
        max_mass: max.weight,
        in_lane: max.weight > cfg.min_max,
        candidates: belief.local_maxima(cfg.max_candidates),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::GridAxis;
    use laneloc_types::config::{AxisConfig, PriorConfig};

    fn belief_with_peak(peak: f64) -> GridBelief {
        let d = GridAxis::new(&AxisConfig { min: 0.0, max: 1.0, delta: 0.25 }).unwrap();
        let phi = GridAxis::new(&AxisConfig { min: 0.0, max: 1.0, delta: 0.25 }).unwrap();
        let mut b = GridBelief::from_prior(d, phi, &PriorConfig::Uniform);
        let rest = (1.0 - peak) / 15.0;
        let mut cells = vec![rest; 16];
        cells[b.flat_index(1, 2)] = peak;
        b.replace_cells(cells);
        b
    }

    fn cfg(min_max: f64) -> EstimateConfig {
        EstimateConfig {
            min_max,
            ..EstimateConfig::default()
        }
    }

    #[test]
    fn estimate_is_centre_of_max_cell() {
        let e = extract(&belief_with_peak(0.4), &cfg(0.1));
        assert!((e.d - 0.375).abs() < 1e-12);
        assert!((e.phi - 0.625).abs() < 1e-12);
        assert!((e.max_mass - 0.4).abs() < 1e-12);
        assert!(e.in_lane);
        assert!((e.candidates[0].mass - 0.4).abs() < 1e-12);
        assert!(e.candidates.len() <= EstimateConfig::default().max_candidates);
    }

    #[test]
    fn in_lane_threshold_is_strict() {
        let eps = 1e-6;
        assert!(extract(&belief_with_peak(0.3 + eps), &cfg(0.3)).in_lane);
        assert!(!extract(&belief_with_peak(0.3 - eps), &cfg(0.3)).in_lane);
    }

    #[test]
    fn candidate_count_is_bounded() {
        let mut b = belief_with_peak(0.4);
        let mut cells = vec![0.0; 16];
        for (k, idx) in [0, 3, 12, 15].into_iter().enumerate() {
            cells[idx] = 0.1 + k as f64 * 0.05;
        }
        b.replace_cells(cells);
        let e = extract(&b, &EstimateConfig { min_max: 0.1, max_candidates: 2 });
        assert_eq!(e.candidates.len(), 2);
        assert!(e.candidates[0].mass >= e.candidates[1].mass);
        assert!((e.candidates[0].mass - e.max_mass).abs() < 1e-12);
    }
}
