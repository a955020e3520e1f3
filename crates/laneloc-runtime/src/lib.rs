//! `laneloc-runtime` – runs the lane filter against live traffic.
//!
//! # Modules
//!
//! - [`node`] – [`LaneFilterNode`][node::LaneFilterNode]: the per-cycle
//!   orchestrator (enable gate, clock accounting, degenerate-recovery
//!   bookkeeping, reconfiguration) and its async bus loop.
//! - [`motion_state`] – [`MotionState`][motion_state::MotionState]: latest
//!   velocity command with a staleness bound.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: initialises
//!   the global `tracing` subscriber with an optional OTLP span exporter.
//!   Set `OTEL_EXPORTER_OTLP_ENDPOINT` to enable live trace export.

use chrono::TimeDelta;

pub mod motion_state;
pub mod node;
pub mod telemetry;

pub use motion_state::MotionState;
pub use node::{CycleOutput, LaneFilterNode, Reconfigured};
pub use telemetry::{TracerProviderGuard, init_tracing};

/// Seconds in `delta`, at nanosecond resolution where it fits.
pub(crate) fn secs(delta: TimeDelta) -> f64 {
    match delta.num_nanoseconds() {
        Some(ns) => ns as f64 / 1e9,
        None => delta.num_milliseconds() as f64 / 1e3,
    }
}
