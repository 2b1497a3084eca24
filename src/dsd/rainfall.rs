//! Rain rate from the drop size distribution.

use ndarray::{ArrayView2, Axis};
use std::f64::consts::PI;

/// Fall speed assigned to the smallest bin, in m/s.
const SMALLEST_BIN_VELOCITY: f64 = 0.5;

/// Terminal fall velocity in m/s for each diameter (mm).
///
/// Uses `v(D) = 9.65 - 10.3 exp(-0.6 D)` except for the first bin, which is
/// fixed at 0.5 m/s.
pub fn terminal_velocity(diameter: &[f64]) -> Vec<f64> {
    diameter
        .iter()
        .enumerate()
        .map(|(i, d)| {
            if i == 0 {
                SMALLEST_BIN_VELOCITY
            } else {
                9.65 - 10.3 * f64::exp(-0.6 * d)
            }
        })
        .collect()
}

/// Rain rate in mm/h at each timestep.
///
/// `R = 0.6π × 10⁻³ Σ v(D) N(D) D³ dD` for diameters in mm and `nd` in
/// m⁻³ mm⁻¹.
pub fn rain_rate(nd: ArrayView2<'_, f64>, diameter: &[f64], spread: &[f64]) -> Vec<f64> {
    let velocity = terminal_velocity(diameter);
    let weights: Vec<f64> = velocity
        .iter()
        .zip(diameter)
        .zip(spread)
        .map(|((v, d), dd)| v * d.powi(3) * dd)
        .collect();

    nd.axis_iter(Axis(0))
        .map(|row| {
            let sum: f64 = row.iter().zip(&weights).map(|(n, w)| n * w).sum();
            0.6 * PI * 1e-3 * sum
        })
        .collect()
}
