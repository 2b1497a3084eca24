//! Polarimetric radar parameters from a scattering table and a drop size
//! distribution.

use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use ndarray::{ArrayView2, Axis};
use rayon::prelude::*;

use crate::error::DsdError;
use crate::scattering::{Geometry, ScatteringTable, KW_SQR};

/// Simulated radar parameters, each with one value per timestep.
///
/// A timestep with no drops has `Zh = -inf`, a non-finite `Zdr`, and zero
/// `Kdp` and `Ai`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RadarParameters {
    /// Horizontal reflectivity factor in dBZ.
    pub zh: Vec<f64>,
    /// Differential reflectivity in dB.
    pub zdr: Vec<f64>,
    /// Specific differential phase in °/km.
    pub kdp: Vec<f64>,
    /// Specific attenuation (horizontal) in dB/km.
    pub ai: Vec<f64>,
}

impl RadarParameters {
    /// Number of timesteps.
    pub fn len(&self) -> usize {
        self.zh.len()
    }

    /// Whether there are no timesteps.
    pub fn is_empty(&self) -> bool {
        self.zh.is_empty()
    }
}

/// A binned size distribution: `values[i]` applies to diameters in
/// `(edges[i], edges[i+1]]` and the distribution is zero outside the bins.
#[derive(Debug, Clone, Copy)]
pub struct BinnedPsd<'a> {
    edges: &'a [f64],
    values: &'a [f64],
}

impl<'a> BinnedPsd<'a> {
    /// `edges` must have one more element than `values`.
    pub fn new(edges: &'a [f64], values: &'a [f64]) -> Result<Self, DsdError> {
        if edges.len() != values.len() + 1 {
            return Err(DsdError::InconsistentInputs);
        }
        Ok(Self { edges, values })
    }

    /// Concentration at `diameter`.
    pub fn value(&self, diameter: f64) -> f64 {
        let upper = self.edges.partition_point(|&edge| edge < diameter);
        if upper == 0 || upper > self.values.len() {
            0.
        } else {
            self.values[upper - 1]
        }
    }
}

/// Shared progress of a radar parameter run.
#[derive(Debug, Default)]
pub struct Progress {
    completed: AtomicUsize,
    cancelled: AtomicBool,
}

impl Progress {
    /// No timesteps completed and not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of timesteps finished so far.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    /// Ask the run to stop. The run then fails with [`DsdError::Cancelled`].
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Whether the run was asked to stop.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Compute the radar parameters at every timestep.
///
/// `nd` has shape (`num_times`, `num_bins`) and `bin_edges` has length
/// `num_bins+1`. Timesteps are processed in parallel on the current rayon
/// thread pool, and `progress` is updated as each one finishes. Either every
/// timestep is returned or none are.
pub fn radar_parameters(
    table: &ScatteringTable,
    bin_edges: &[f64],
    nd: ArrayView2<'_, f64>,
    progress: &Progress,
) -> Result<RadarParameters, DsdError> {
    if bin_edges.len() != nd.ncols() + 1 {
        return Err(DsdError::InconsistentInputs);
    }

    let mut results = Vec::new();
    (0..nd.nrows())
        .into_par_iter()
        .map(|t| -> Result<_, DsdError> {
            if progress.is_cancelled() {
                return Err(DsdError::Cancelled);
            }
            let view = nd.index_axis(Axis(0), t);
            let row = view.as_standard_layout();
            let psd = BinnedPsd::new(bin_edges, row.as_slice().ok_or(DsdError::NotContiguous)?)?;
            Ok(timestep(table, &psd))
        })
        .inspect(|_| {
            progress.completed.fetch_add(1, Ordering::Relaxed);
        })
        .collect_into_vec(&mut results);

    let mut output = RadarParameters {
        zh: Vec::with_capacity(results.len()),
        zdr: Vec::with_capacity(results.len()),
        kdp: Vec::with_capacity(results.len()),
        ai: Vec::with_capacity(results.len()),
    };
    results
        .into_iter()
        .try_for_each(|result| -> Result<_, DsdError> {
            let (zh, zdr, kdp, ai) = result?;
            output.zh.push(zh);
            output.zdr.push(zdr);
            output.kdp.push(kdp);
            output.ai.push(ai);
            Ok(())
        })?;

    Ok(output)
}

/// Radar parameters (`Zh`, `Zdr`, `Kdp`, `Ai`) for a single distribution.
fn timestep(table: &ScatteringTable, psd: &BinnedPsd<'_>) -> (f64, f64, f64, f64) {
    let wavelength = table.wavelength();

    let back = table.integrate(Geometry::Backscatter, |d| psd.value(d));
    // Radar cross section is 4π|S|², reflectivity in mm⁶ m⁻³
    let refl = wavelength.powi(4) / (PI.powi(5) * KW_SQR) * 4. * PI * back.power_hh;
    let zh = 10. * refl.log10();
    let zdr = 10. * (back.power_hh / back.power_vv).log10();

    let forward = table.integrate(Geometry::ForwardScatter, |d| psd.value(d));
    let kdp = 1e-3 * (180. / PI) * wavelength * (forward.s_hh - forward.s_vv).re;
    let ai = 8.686e-3 * wavelength * forward.s_hh.im;

    (zh, zdr, kdp, ai)
}
