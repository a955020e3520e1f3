//! Motion Predictor.
//!
//! Advances a [`GridBelief`] over an interval `dt` for a vehicle driving with
//! linear speed `v` and angular rate `w`, using a unicycle model expressed in
//! the lane frame:
//!
//! ```text
//! d'   = d + v · dt · sin(phi)
//! phi' = phi + w · dt
//! ```
//!
//! Each cell's mass is moved to the cell containing `(d', phi')` and the
//! shifted belief is blurred with a separable Gaussian kernel whose width
//! grows with `dt` and `|w|`.
//!
//! Mass that would land outside the grid is clipped to the boundary cell
//! instead of being dropped or wrapped. This is a known approximation: it
//! assumes the vehicle never leaves the representable range within one
//! cycle, and keeps the belief from leaking mass at the edges.

use laneloc_types::config::ProcessNoiseConfig;

use crate::grid::GridBelief;

/// Kernel half-width in standard deviations.
const KERNEL_TRUNCATE_SIGMAS: f64 = 4.0;

/// What a call to [`predict`] did to the belief.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictReport {
    /// `false` when the inputs made the step a no-op.
    pub applied: bool,
    pub delta_phi: f64,
    /// Kernel widths (in cells) used for the blur.
    pub sigma_d_cells: f64,
    pub sigma_phi_cells: f64,
    /// Set by the filter when the shifted belief had to be reseeded.
    pub recovered: bool,
}

impl PredictReport {
    fn skipped() -> Self {
        Self {
            applied: false,
            delta_phi: 0.0,
            sigma_d_cells: 0.0,
            sigma_phi_cells: 0.0,
            recovered: false,
        }
    }
}

/// Shift and blur `belief` for one motion step.
///
/// Non-finite or non-positive `dt`, and non-finite `v` or `w`, leave the
/// belief untouched. The result is not renormalised here: shifting and the
/// edge-folding blur both conserve mass, and the caller owns the degenerate
/// recovery policy.
pub fn predict(
    belief: &mut GridBelief,
    noise: &ProcessNoiseConfig,
    dt: f64,
    v: f64,
    w: f64,
) -> PredictReport {
    if !dt.is_finite() || dt <= 0.0 || !v.is_finite() || !w.is_finite() {
        return PredictReport::skipped();
    }

    let d_axis = *belief.d_axis();
    let phi_axis = *belief.phi_axis();
    let (nd, np) = belief.shape();
    let delta_phi = w * dt;

    let mut shifted = vec![0.0; nd * np];
    for i in 0..nd {
        let d = d_axis.center(i);
        for j in 0..np {
            let mass = belief.get(i, j);
            if mass <= 0.0 {
                continue;
            }
            let phi = phi_axis.center(j);
            let i_new = d_axis.index_of(d + v * dt * phi.sin());
            let j_new = phi_axis.index_of(phi + delta_phi);
            shifted[i_new * np + j_new] += mass;
        }
    }

    let growth = 1.0 + noise.growth_per_second * dt;
    let sigma_d_cells = noise.sigma_d_cells * growth;
    let sigma_phi_cells =
        noise.sigma_phi_cells * (growth + noise.growth_per_radian * w.abs() * dt);

    if let Some(kernel) = gaussian_kernel(sigma_d_cells, nd - 1) {
        shifted = convolve_rows(&shifted, nd, np, &kernel);
    }
    if let Some(kernel) = gaussian_kernel(sigma_phi_cells, np - 1) {
        shifted = convolve_cols(&shifted, nd, np, &kernel);
    }

    belief.replace_cells(shifted);

    PredictReport {
        applied: true,
        delta_phi,
        sigma_d_cells,
        sigma_phi_cells,
        recovered: false,
    }
}

/// Normalised, truncated 1-D Gaussian, centre tap at index `radius`.
///
/// The radius never exceeds `max_radius`: on an axis of `n` cells a tap more
/// than `n - 1` cells away always lands past the edge.
fn gaussian_kernel(sigma: f64, max_radius: usize) -> Option<Vec<f64>> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return None;
    }
    let radius = (KERNEL_TRUNCATE_SIGMAS * sigma).ceil().min(max_radius as f64) as isize;
    let mut taps: Vec<f64> = (-radius..=radius)
        .map(|k| {
            let z = k as f64 / sigma;
            (-0.5 * z * z).exp()
        })
        .collect();
    let sum: f64 = taps.iter().sum();
    for t in &mut taps {
        *t /= sum;
    }
    Some(taps)
}

/// Blur along the d axis. Taps past the edge deposit into the edge row.
fn convolve_rows(src: &[f64], nd: usize, np: usize, kernel: &[f64]) -> Vec<f64> {
    let radius = (kernel.len() / 2) as isize;
    let mut out = vec![0.0; src.len()];
    for i in 0..nd {
        for j in 0..np {
            let mass = src[i * np + j];
            if mass == 0.0 {
                continue;
            }
            for (k, &tap) in kernel.iter().enumerate() {
                let target = clamp_index(i as isize + k as isize - radius, nd);
                out[target * np + j] += mass * tap;
            }
        }
    }
    out
}

/// Blur along the phi axis. Taps past the edge deposit into the edge column.
fn convolve_cols(src: &[f64], nd: usize, np: usize, kernel: &[f64]) -> Vec<f64> {
    let radius = (kernel.len() / 2) as isize;
    let mut out = vec![0.0; src.len()];
    for i in 0..nd {
        for j in 0..np {
            let mass = src[i * np + j];
            if mass == 0.0 {
                continue;
            }
            for (k, &tap) in kernel.iter().enumerate() {
                let target = clamp_index(j as isize + k as isize - radius, np);
                out[i * np + target] += mass * tap;
            }
        }
    }
    out
}

fn clamp_index(index: isize, len: usize) -> usize {
    index.clamp(0, len as isize - 1) as usize
}
