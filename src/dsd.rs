//! Drop size distribution time series and the quantities derived from it.

mod moments;
mod radar;
mod rainfall;

#[cfg(test)]
mod tests;

pub use self::moments::moment;
pub use self::radar::{radar_parameters, BinnedPsd, Progress, RadarParameters};
pub use self::rainfall::{rain_rate, terminal_velocity};

use log::{debug, info};
use ndarray::{Array2, ArrayView2};

use crate::error::{DsdError, FitError};
use crate::fit::{self, CurveFit, FitResult, LevenbergMarquardt, Moment};
use crate::scattering::{RayleighSpheroid, ScatteringConfig, ScatteringTable, TableCache};

/// Largest allowed difference between a bin width and its edges, relative
/// to the width (or absolute for widths under 1 mm).
const SPREAD_TOLERANCE: f64 = 1e-4;

/// Drop size distributions over time, with the radar parameters and rain
/// rate derived from them.
///
/// The time axis is shared by every time series: `nd` has one row per
/// timestep and one column per diameter bin.
#[derive(Debug, Clone)]
pub struct DropSizeDistribution {
    /// Timestamps, length `num_times`.
    time: Vec<f64>,
    /// Concentration in m⁻³ mm⁻¹, shape (`num_times`, `num_bins`).
    nd: Array2<f64>,
    /// Bin widths in mm, length `num_bins`.
    spread: Vec<f64>,
    /// Bin edges in mm, length `num_bins+1`.
    bin_edges: Vec<f64>,
    /// Bin center diameters in mm, length `num_bins`.
    diameter: Vec<f64>,
    /// Measured fall velocity in m/s, length `num_bins`.
    velocity: Option<Vec<f64>>,
    /// Rain rate in mm/h, length `num_times`.
    rain_rate: Option<Vec<f64>>,
    /// Reflectivity reported by the instrument, length `num_times`.
    z: Option<Vec<f64>>,
    /// Particle counts reported by the instrument, length `num_times`.
    num_particles: Option<Vec<f64>>,
    /// Simulated radar parameters, once calculated.
    radar: Option<RadarParameters>,
}

impl DropSizeDistribution {
    /// Check and assemble the inputs.
    ///
    /// At least one of `bin_edges` and `diameter` is needed. If only the
    /// diameters are given, the edges are rebuilt from the diameters and
    /// `spread`; if only the edges are given, the diameters are the bin
    /// midpoints. Given edges must agree with `spread`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        time: Vec<f64>,
        nd: Array2<f64>,
        spread: Vec<f64>,
        rain_rate: Option<Vec<f64>>,
        velocity: Option<Vec<f64>>,
        z: Option<Vec<f64>>,
        num_particles: Option<Vec<f64>>,
        bin_edges: Option<Vec<f64>>,
        diameter: Option<Vec<f64>>,
    ) -> Result<Self, DsdError> {
        let num_times = time.len();
        let num_bins = spread.len();

        if nd.dim() != (num_times, num_bins) {
            return Err(DsdError::InconsistentInputs);
        }
        if nd.iter().any(|&n| n < 0.) {
            return Err(DsdError::NegativeConcentration);
        }

        let (bin_edges, diameter) = match (bin_edges, diameter) {
            (Some(edges), Some(diameter)) => (edges, diameter),
            (Some(edges), None) => {
                let diameter = edges.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect();
                (edges, diameter)
            }
            (None, Some(diameter)) => {
                let start = match (diameter.first(), spread.first()) {
                    (Some(d), Some(s)) => d - 0.5 * s,
                    _ => 0.,
                };
                let mut edges = Vec::with_capacity(num_bins + 1);
                edges.push(start);
                for s in &spread {
                    edges.push(edges[edges.len() - 1] + s);
                }
                (edges, diameter)
            }
            (None, None) => return Err(DsdError::MissingBinGeometry),
        };

        if bin_edges.len() != num_bins + 1 || diameter.len() != num_bins {
            return Err(DsdError::InconsistentInputs);
        }
        if !bin_edges.windows(2).all(|w| w[0] < w[1]) {
            return Err(DsdError::BinEdgesNotIncreasing);
        }
        let spread_matches = bin_edges
            .windows(2)
            .zip(&spread)
            .all(|(w, s)| (w[1] - w[0] - s).abs() <= SPREAD_TOLERANCE * s.abs().max(1.));
        if !spread_matches {
            return Err(DsdError::InconsistentInputs);
        }

        let per_time = [&rain_rate, &z, &num_particles];
        if per_time
            .iter()
            .any(|series| series.as_ref().is_some_and(|s| s.len() != num_times))
        {
            return Err(DsdError::InconsistentInputs);
        }
        if velocity.as_ref().is_some_and(|v| v.len() != num_bins) {
            return Err(DsdError::InconsistentInputs);
        }
        let nd = if nd.is_standard_layout() {
            nd
        } else {
            nd.as_standard_layout().into_owned()
        };
        debug!("drop size distribution has {num_times} timesteps and {num_bins} bins");

        Ok(Self {
            time,
            nd,
            spread,
            bin_edges,
            diameter,
            velocity,
            rain_rate,
            z,
            num_particles,
            radar: None,
        })
    }

    /// Timestamps.
    pub fn time(&self) -> &[f64] {
        &self.time
    }

    /// Number of timesteps.
    pub fn num_times(&self) -> usize {
        self.time.len()
    }

    /// Concentration per timestep and bin, in m⁻³ mm⁻¹.
    pub fn nd(&self) -> ArrayView2<'_, f64> {
        self.nd.view()
    }

    /// Bin widths in mm.
    pub fn spread(&self) -> &[f64] {
        &self.spread
    }

    /// Bin edges in mm.
    pub fn bin_edges(&self) -> &[f64] {
        &self.bin_edges
    }

    /// Bin center diameters in mm.
    pub fn diameter(&self) -> &[f64] {
        &self.diameter
    }

    /// Measured fall velocities, if given.
    pub fn velocity(&self) -> Option<&[f64]> {
        self.velocity.as_deref()
    }

    /// Rain rate in mm/h, if given or calculated.
    pub fn rain_rate(&self) -> Option<&[f64]> {
        self.rain_rate.as_deref()
    }

    /// Instrument reflectivity, if given.
    pub fn z(&self) -> Option<&[f64]> {
        self.z.as_deref()
    }

    /// Instrument particle counts, if given.
    pub fn num_particles(&self) -> Option<&[f64]> {
        self.num_particles.as_deref()
    }

    /// Simulated radar parameters, if calculated.
    pub fn radar_parameters(&self) -> Option<&RadarParameters> {
        self.radar.as_ref()
    }

    /// The `m`th moment of the distribution at each timestep.
    pub fn moment(&self, m: f64) -> Vec<f64> {
        moment(self.nd.view(), &self.diameter, &self.spread, m)
    }

    /// Estimate the rain rate from the distribution, replacing any rain rate
    /// that was given.
    pub fn calculate_rain_rate(&mut self) -> &[f64] {
        let rain_rate = rain_rate(self.nd.view(), &self.diameter, &self.spread);
        self.rain_rate.insert(rain_rate)
    }

    /// Calculate radar parameters with the default scattering setup at
    /// `wavelength` (mm), using the process-wide table cache.
    pub fn calc_radar_parameters(&mut self, wavelength: f64) -> Result<&RadarParameters, DsdError> {
        let config = ScatteringConfig::new(wavelength)?;
        let table = TableCache::global().get_or_build(&config, &RayleighSpheroid)?;
        self.calc_radar_parameters_with_table(&table, None)
    }

    /// Calculate radar parameters from an existing scattering table.
    ///
    /// The number of worker threads is controlled by `num_threads`, or `None`
    /// to automatically choose the number of threads.
    pub fn calc_radar_parameters_with_table(
        &mut self,
        table: &ScatteringTable,
        num_threads: Option<usize>,
    ) -> Result<&RadarParameters, DsdError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads.unwrap_or(0))
            .build()
            .map_err(|e| DsdError::ThreadPool(e.to_string()))?;

        info!(
            "Calculating radar parameters for {} timesteps at {} mm",
            self.num_times(),
            table.wavelength()
        );
        let progress = Progress::new();
        let parameters =
            pool.install(|| radar_parameters(table, &self.bin_edges, self.nd.view(), &progress))?;

        Ok(&*self.radar.insert(parameters))
    }

    /// Store radar parameters computed elsewhere, e.g. with a custom
    /// progress handler.
    pub fn set_radar_parameters(&mut self, parameters: RadarParameters) -> Result<(), DsdError> {
        if parameters.len() != self.num_times() {
            return Err(DsdError::InconsistentInputs);
        }
        self.radar = Some(parameters);
        Ok(())
    }

    /// Fit `R = a Kdp^b`.
    pub fn calc_r_kdp_relationship(&self) -> Result<FitResult, FitError> {
        self.calc_r_kdp_relationship_with(&LevenbergMarquardt::default())
    }

    /// Fit `R = a Kdp^b` with the given fitting routine.
    pub fn calc_r_kdp_relationship_with(&self, fitter: &dyn CurveFit) -> Result<FitResult, FitError> {
        let (radar, rain_rate) = self.fit_inputs()?;
        fit::fit_r_kdp(fitter, &radar.kdp, rain_rate)
    }

    /// Fit `R = a Zh^b`, where `Zh` is in linear units.
    pub fn calc_r_zh_relationship(&self) -> Result<FitResult, FitError> {
        self.calc_r_zh_relationship_with(&LevenbergMarquardt::default())
    }

    /// Fit `R = a Zh^b` with the given fitting routine.
    pub fn calc_r_zh_relationship_with(&self, fitter: &dyn CurveFit) -> Result<FitResult, FitError> {
        let (radar, rain_rate) = self.fit_inputs()?;
        fit::fit_r_zh(fitter, &radar.zh, rain_rate)
    }

    /// Fit a multi-parameter rainfall relationship,
    /// `R = a Zh^b Zdr^c Kdp^d` with `Zh` and `Zdr` in linear units, using
    /// the selected `moments`. The radar parameters are used at whatever band
    /// they were simulated at.
    pub fn calc_rainfall_relationship(&self, moments: &[Moment]) -> Result<FitResult, FitError> {
        self.calc_rainfall_relationship_with(moments, &LevenbergMarquardt::default())
    }

    /// [`Self::calc_rainfall_relationship`] with the given fitting routine.
    pub fn calc_rainfall_relationship_with(
        &self,
        moments: &[Moment],
        fitter: &dyn CurveFit,
    ) -> Result<FitResult, FitError> {
        let (radar, rain_rate) = self.fit_inputs()?;
        fit::fit_rainfall_relationship(fitter, radar, rain_rate, moments)
    }

    fn fit_inputs(&self) -> Result<(&RadarParameters, &[f64]), FitError> {
        let rain_rate = self.rain_rate.as_deref().ok_or(FitError::MissingRainRate)?;
        let radar = self.radar.as_ref().ok_or(FitError::MissingRadarParameters)?;
        Ok((radar, rain_rate))
    }
}
