//! `laneloc-perception` – the lane filter core.
//!
//! Maintains a probability distribution over the vehicle's pose relative to
//! its lane, `(d, phi)`, and turns motion commands and detected line
//! segments into a pose estimate. Everything here is synchronous and
//! allocation-light; the runtime crate owns timing and I/O.
//!
//! # Modules
//!
//! - [`grid`] – [`GridBelief`][grid::GridBelief]: the discretised belief,
//!   normalisation, entropy and peak extraction.
//! - [`motion`] – [`predict`][motion::predict]: unicycle shift plus Gaussian
//!   process noise with saturating edges.
//! - [`observation`] – [`apply_segments`][observation::apply_segments]:
//!   per-segment implied pose and Gaussian likelihood.
//! - [`estimate`] – [`extract`][estimate::extract]: max cell, in-lane flag and
//!   ranked candidates.
//! - [`curvature`] – [`CurvatureHistory`][curvature::CurvatureHistory]:
//!   straight / left / right classification over recent estimates.
//! - [`filter`] – [`LaneFilter`][filter::LaneFilter] and its
//!   [`LaneFilterImpl`][filter::LaneFilterImpl] variants.

pub mod curvature;
pub mod estimate;
pub mod filter;
pub mod grid;
pub mod motion;
pub mod observation;
