//! Raw moments of a binned drop size distribution.

use ndarray::{ArrayView2, Axis};

/// The `m`th moment at each timestep, `Σ D^m N(D) dD` over the bins.
///
/// `nd` has shape (`num_times`, `num_bins`) and `diameter` and `spread` both
/// have length `num_bins`. Any real `m` is allowed; `m = 0` is the total
/// number concentration.
pub fn moment(nd: ArrayView2<'_, f64>, diameter: &[f64], spread: &[f64], m: f64) -> Vec<f64> {
    let weights: Vec<f64> = diameter
        .iter()
        .zip(spread)
        .map(|(d, dd)| d.powf(m) * dd)
        .collect();

    nd.axis_iter(Axis(0))
        .map(|row| row.iter().zip(&weights).map(|(n, w)| n * w).sum())
        .collect()
}
