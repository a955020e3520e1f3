//! `laneloc-types` – shared vocabulary of the lane localisation stack.
//!
//! Every crate in the workspace speaks in terms of the messages defined here:
//! inbound [`SegmentBatch`]es and [`VelocityCommand`]s, outbound
//! [`LanePose`], [`BeliefImage`] and [`FilterDiagnostics`], the [`Event`]
//! envelope routed over the bus, the [`LaneError`] type, and the
//! [`config::LaneFilterConfig`] tree.

pub mod config;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use config::LaneFilterConfig;

// ────────────────────────────────────────────────────────────────────────────
// Inbound messages
// ────────────────────────────────────────────────────────────────────────────

/// A point in the vehicle's ground frame (metres).
///
/// `x` points forward, `y` points to the vehicle's left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance from the vehicle origin.
    pub fn norm(self) -> f64 {
        self.x.hypot(self.y)
    }
}

/// Colour tag assigned to a segment by the vision front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentColor {
    /// Right lane boundary.
    White,
    /// Dashed centre line (left boundary of the ego lane).
    Yellow,
    /// Stop line; never used for lateral localisation.
    Red,
}

/// A detected line piece projected onto the ground plane.
///
/// The order of `points` is significant: the front-end orients every segment
/// so that the painted edge it belongs to (inner or outer) can be recovered
/// from the direction of travel along it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub points: [Point2; 2],
    pub color: SegmentColor,
}

impl Segment {
    pub fn new(p1: Point2, p2: Point2, color: SegmentColor) -> Self {
        Self {
            points: [p1, p2],
            color,
        }
    }

    pub fn midpoint(&self) -> Point2 {
        let [a, b] = self.points;
        Point2::new((a.x + b.x) * 0.5, (a.y + b.y) * 0.5)
    }

    pub fn length(&self) -> f64 {
        let [a, b] = self.points;
        (b.x - a.x).hypot(b.y - a.y)
    }

    /// Distance of the segment midpoint from the vehicle origin.
    pub fn range(&self) -> f64 {
        self.midpoint().norm()
    }
}

/// All segments extracted from one camera frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentBatch {
    /// Capture time of the image the segments came from.
    pub stamp: DateTime<Utc>,
    #[serde(default)]
    pub segments: Vec<Segment>,
}

/// Commanded body velocity of the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VelocityCommand {
    pub stamp: DateTime<Utc>,
    /// Linear speed (m/s).
    pub v: f64,
    /// Angular rate (rad/s), counter-clockwise positive.
    pub omega: f64,
}

// ────────────────────────────────────────────────────────────────────────────
// Outbound messages
// ────────────────────────────────────────────────────────────────────────────

/// Shape of the road segment the vehicle is currently driving on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurvatureLabel {
    Straight,
    LeftCurve,
    RightCurve,
}

impl std::fmt::Display for CurvatureLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CurvatureLabel::Straight => write!(f, "straight"),
            CurvatureLabel::LeftCurve => write!(f, "left curve"),
            CurvatureLabel::RightCurve => write!(f, "right curve"),
        }
    }
}

/// Health of the estimate carried by a [`LanePose`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaneStatus {
    Normal,
    /// The belief collapsed during this cycle and was reseeded from the prior.
    Recovered,
}

/// Published pose of the vehicle relative to the lane centreline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LanePose {
    /// Capture time of the segment batch that triggered the cycle.
    pub stamp: DateTime<Utc>,
    /// Signed lateral offset (m), positive to the left of the centreline.
    pub d: f64,
    /// Heading error (rad) relative to the lane tangent.
    pub phi: f64,
    pub in_lane: bool,
    pub curvature: f64,
    pub curvature_label: CurvatureLabel,
    pub status: LaneStatus,
}

/// Normalised belief rendered as a mono8 intensity map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeliefImage {
    pub stamp: DateTime<Utc>,
    /// Number of phi bins.
    pub width: u32,
    /// Number of d bins.
    pub height: u32,
    /// Row-major intensities, one byte per cell.
    pub data: Vec<u8>,
}

/// Per-cycle confidence figures, published for observability only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterDiagnostics {
    pub stamp: DateTime<Utc>,
    /// Shannon entropy of the belief (nats).
    pub entropy: f64,
    /// Mass of the most probable cell.
    pub max_mass: f64,
    pub retained_segments: usize,
    pub consecutive_recoveries: u32,
}

// ────────────────────────────────────────────────────────────────────────────
// Event envelope
// ────────────────────────────────────────────────────────────────────────────

/// Unified event wrapper for the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "laneloc-middleware::ws"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Wrap `payload` in a fresh envelope stamped now.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that can be routed over the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    SegmentList(SegmentBatch),
    VelocityCommand(VelocityCommand),
    /// Enables or suspends lane filtering.
    Switch { enabled: bool },
    Configuration(Box<LaneFilterConfig>),
    LanePose(LanePose),
    InLane { stamp: DateTime<Utc>, in_lane: bool },
    BeliefImage(BeliefImage),
    Diagnostics(FilterDiagnostics),
    Fault { component: String, message: String },
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Error type shared by every crate in the workspace.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LaneError {
    #[error("Degenerate belief: total mass {total_mass}")]
    DegenerateBelief { total_mass: f64 },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Stale motion state: command is {age_secs:.3}s old (limit {limit_secs:.3}s)")]
    StaleMotionState { age_secs: f64, limit_secs: f64 },

    #[error("Channel Error: {0}")]
    Channel(String),

    #[error("Serialization Error: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn segment_geometry_helpers() {
        let seg = Segment::new(
            Point2::new(0.6, -0.2),
            Point2::new(1.0, -0.2),
            SegmentColor::White,
        );
        let mid = seg.midpoint();
        assert!((mid.x - 0.8).abs() < 1e-12);
        assert!((mid.y + 0.2).abs() < 1e-12);
        assert!((seg.length() - 0.4).abs() < 1e-12);
        assert!((seg.range() - 0.8f64.hypot(0.2)).abs() < 1e-12);
    }

    #[test]
    fn segment_color_uses_lowercase_tags() {
        let json = serde_json::to_string(&SegmentColor::Yellow).unwrap();
        assert_eq!(json, "\"yellow\"");
        let back: SegmentColor = serde_json::from_str("\"white\"").unwrap();
        assert_eq!(back, SegmentColor::White);
    }

    #[test]
    fn segment_batch_without_segments_field_is_empty() {
        let json = r#"{"stamp":"2023-11-14T22:13:20Z"}"#;
        let batch: SegmentBatch = serde_json::from_str(json).unwrap();
        assert!(batch.segments.is_empty());
        assert_eq!(batch.stamp, stamp());
    }

    #[test]
    fn event_payload_is_tagged_by_kind() {
        let event = Event::new(
            "laneloc-runtime::node",
            EventPayload::InLane {
                stamp: stamp(),
                in_lane: true,
            },
        );
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"kind\":\"in_lane\""));
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, event.id);
        assert!(matches!(back.payload, EventPayload::InLane { in_lane: true, .. }));
    }

    #[test]
    fn switch_payload_parses_from_json() {
        let payload: EventPayload =
            serde_json::from_str(r#"{"kind":"switch","data":{"enabled":false}}"#).unwrap();
        assert!(matches!(payload, EventPayload::Switch { enabled: false }));
    }

    #[test]
    fn curvature_label_display() {
        assert_eq!(CurvatureLabel::LeftCurve.to_string(), "left curve");
        assert_eq!(CurvatureLabel::RightCurve.to_string(), "right curve");
        assert_eq!(CurvatureLabel::Straight.to_string(), "straight");
    }

    #[test]
    fn lane_error_display() {
        let err = LaneError::DegenerateBelief { total_mass: 0.0 };
        assert!(err.to_string().contains("Degenerate belief"));

        let err2 = LaneError::StaleMotionState {
            age_secs: 2.5,
            limit_secs: 1.0,
        };
        assert!(err2.to_string().contains("2.500"));
    }
}
