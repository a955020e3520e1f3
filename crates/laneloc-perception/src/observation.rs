//! Observation Updater.
//!
//! Each retained [`Segment`] is turned into the `(d, phi)` pose a vehicle
//! would need to have for that segment to be the observed edge of a lane
//! boundary. For a grid cell, the lateral residual `d_cell - d_implied` is the
//! perpendicular distance between the observed edge and the edge expected at
//! that cell, and `phi_cell - phi_implied` is the angular deviation. Both are
//! scored with a Gaussian tolerance and multiplied into the belief.
//!
//! # Edge conventions
//!
//! The front-end orients every segment so that the painted edge it lies on
//! can be recovered from the direction of travel along it:
//!
//! | Colour | `p1 → p2` | Edge |
//! |---|---|---|
//! | white | backwards (`p1.x > p2.x`) | outer (right) edge |
//! | white | forwards | inner edge |
//! | yellow | forwards (`p2.x > p1.x`) | outer (left) edge |
//! | yellow | backwards | inner edge |

use laneloc_types::config::ObservationConfig;
use laneloc_types::{Segment, SegmentColor};

use crate::grid::GridBelief;

/// Distance band within which segments are trusted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensingRange {
    pub min: f64,
    pub max: f64,
}

impl SensingRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, distance: f64) -> bool {
        distance >= self.min && distance <= self.max
    }
}

impl From<&ObservationConfig> for SensingRange {
    fn from(cfg: &ObservationConfig) -> Self {
        Self::new(cfg.range_min, cfg.range_max)
    }
}

/// Pose implied by a single segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImpliedPose {
    pub d: f64,
    pub phi: f64,
}

/// Outcome of one update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateReport {
    /// Segments that contributed a likelihood.
    pub retained: usize,
    /// Segments rejected by colour, position or range.
    pub discarded: usize,
    /// The posterior collapsed and the belief was reseeded from the prior.
    pub recovered: bool,
}

/// `true` when `segment` may be used as a lane-boundary observation.
pub fn is_usable(segment: &Segment, range: &SensingRange) -> bool {
    if segment.color == SegmentColor::Red {
        return false;
    }
    let [p1, p2] = segment.points;
    if p1.x < 0.0 || p2.x < 0.0 {
        return false;
    }
    let length = segment.length();
    if !length.is_finite() || length <= 0.0 {
        return false;
    }
    range.contains(segment.range())
}

/// The `(d, phi)` pose under which `segment` is the expected boundary edge.
///
/// Returns `None` for stop-line and zero-length segments.
pub fn implied_pose(segment: &Segment, cfg: &ObservationConfig) -> Option<ImpliedPose> {
    let [p1, p2] = segment.points;
    let length = segment.length();
    if length.is_nan() || length <= 0.0 {
        return None;
    }
    let tx = (p2.x - p1.x) / length;
    let ty = (p2.y - p1.y) / length;
    let (nx, ny) = (-ty, tx);
    let mid = segment.midpoint();
    let d_seg = nx * mid.x + ny * mid.y;
    let phi_seg = ty.clamp(-1.0, 1.0).asin();

    let half_lane = cfg.lane_width * 0.5;
    let pose = match segment.color {
        SegmentColor::White => {
            let (d, phi) = if p1.x > p2.x {
                (d_seg - cfg.line_width_white, phi_seg)
            } else {
                (-d_seg, -phi_seg)
            };
            ImpliedPose {
                d: d - half_lane,
                phi,
            }
        }
        SegmentColor::Yellow => {
            let (d, phi) = if p2.x > p1.x {
                (d_seg - cfg.line_width_yellow, -phi_seg)
            } else {
                (-d_seg, phi_seg)
            };
            ImpliedPose {
                d: half_lane - d,
                phi,
            }
        }
        SegmentColor::Red => return None,
    };
    Some(pose)
}

/// Multiply the likelihood of every usable segment into `belief`.
///
/// Returns the number of segments retained and discarded. The belief is not
/// renormalised here; an empty retained set leaves it bit-for-bit unchanged.
pub fn apply_segments(
    belief: &mut GridBelief,
    segments: &[Segment],
    range: &SensingRange,
    cfg: &ObservationConfig,
) -> (usize, usize) {
    let implied: Vec<ImpliedPose> = segments
        .iter()
        .filter(|s| is_usable(s, range))
        .filter_map(|s| implied_pose(s, cfg))
        .collect();
    let discarded = segments.len() - implied.len();
    if implied.is_empty() {
        return (0, discarded);
    }

    let d_axis = *belief.d_axis();
    let phi_axis = *belief.phi_axis();
    let (nd, np) = belief.shape();
    let cells = belief.cells_mut();

    for pose in &implied {
        for i in 0..nd {
            let zd = (d_axis.center(i) - pose.d) / cfg.sigma_d;
            for j in 0..np {
                let zp = (phi_axis.center(j) - pose.phi) / cfg.sigma_phi;
                cells[i * np + j] *= (-0.5 * (zd * zd + zp * zp)).exp();
            }
        }
    }
    (implied.len(), discarded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use laneloc_types::Point2;

    fn cfg() -> ObservationConfig {
        ObservationConfig::default()
    }

    fn seg(p1: (f64, f64), p2: (f64, f64), color: SegmentColor) -> Segment {
        Segment::new(Point2::new(p1.0, p1.1), Point2::new(p2.0, p2.1), color)
    }

    // Vehicle centred (d = 0) and aligned (phi = 0) with a 0.23 m lane:
    // white inner edge at y = -0.115, outer edge at y = -0.165,
    // yellow inner edge at y = +0.115, outer edge at y = +0.14.

    #[test]
    fn white_inner_edge_implies_centred_pose() {
        let p = implied_pose(&seg((0.2, -0.115), (0.4, -0.115), SegmentColor::White), &cfg()).unwrap();
        assert!(p.d.abs() < 1e-9, "d = {}", p.d);
        assert!(p.phi.abs() < 1e-9);
    }

    #[test]
    fn white_outer_edge_implies_centred_pose() {
        let p = implied_pose(&seg((0.4, -0.165), (0.2, -0.165), SegmentColor::White), &cfg()).unwrap();
        assert!(p.d.abs() < 1e-9, "d = {}", p.d);
        assert!(p.phi.abs() < 1e-9);
    }

    #[test]
    fn yellow_inner_edge_implies_centred_pose() {
        let p = implied_pose(&seg((0.4, 0.115), (0.2, 0.115), SegmentColor::Yellow), &cfg()).unwrap();
        assert!(p.d.abs() < 1e-9, "d = {}", p.d);
        assert!(p.phi.abs() < 1e-9);
    }

    #[test]
    fn yellow_outer_edge_implies_centred_pose() {
        let p = implied_pose(&seg((0.2, 0.14), (0.4, 0.14), SegmentColor::Yellow), &cfg()).unwrap();
        assert!(p.d.abs() < 1e-9, "d = {}", p.d);
    }

    #[test]
    fn lateral_shift_is_recovered() {
        // Vehicle 0.05 m left of centre: the white inner edge appears 0.05 m
        // further to the right.
        let p = implied_pose(&seg((0.2, -0.165), (0.4, -0.165), SegmentColor::White), &cfg()).unwrap();
        assert!((p.d - 0.05).abs() < 1e-9, "d = {}", p.d);
    }

    #[test]
    fn heading_is_recovered_from_segment_direction() {
        // Vehicle yawed left by 0.1 rad: lane lines appear rotated by -0.1.
        let phi = 0.1_f64;
        let (s, c) = (-phi).sin_cos();
        let white = seg((0.3, -0.2), (0.3 + 0.2 * c, -0.2 + 0.2 * s), SegmentColor::White);
        let p = implied_pose(&white, &cfg()).unwrap();
        assert!((p.phi - phi).abs() < 1e-9, "phi = {}", p.phi);

        let yellow = seg((0.3 + 0.2 * c, 0.1 + 0.2 * s), (0.3, 0.1), SegmentColor::Yellow);
        let p = implied_pose(&yellow, &cfg()).unwrap();
        assert!((p.phi - phi).abs() < 1e-9, "phi = {}", p.phi);
    }

    #[test]
    fn red_and_degenerate_segments_imply_nothing() {
        assert!(implied_pose(&seg((0.2, 0.0), (0.4, 0.0), SegmentColor::Red), &cfg()).is_none());
        assert!(implied_pose(&seg((0.2, 0.0), (0.2, 0.0), SegmentColor::White), &cfg()).is_none());
    }

    #[test]
    fn usability_filters_range_colour_and_position() {
        let range = SensingRange::new(0.6, 1.2);
        assert!(is_usable(&seg((0.7, -0.1), (0.9, -0.1), SegmentColor::White), &range));
        assert!(!is_usable(&seg((0.1, -0.1), (0.2, -0.1), SegmentColor::White), &range));
        assert!(!is_usable(&seg((1.5, -0.1), (1.7, -0.1), SegmentColor::Yellow), &range));
        assert!(!is_usable(&seg((0.7, -0.1), (0.9, -0.1), SegmentColor::Red), &range));
        assert!(!is_usable(&seg((-0.9, -0.1), (-0.7, -0.1), SegmentColor::White), &range));
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let range = SensingRange::new(0.5, 1.0);
        assert!(range.contains(0.5));
        assert!(range.contains(1.0));
        assert!(!range.contains(1.0 + 1e-9));
    }
}
