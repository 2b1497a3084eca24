//! Python interface.

use std::time::Duration;

use log::{info, warn};
use numpy::{PyArray1, PyArray2, PyReadonlyArray1, PyReadonlyArray2, ToPyArray};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::dsd::{radar_parameters, DropSizeDistribution, Progress};
use crate::error::{DsdError, FitError};
use crate::fit::{FitResult, Moment};
use crate::scattering::{RadarBand, RayleighSpheroid, ScatteringConfig, TableCache};

impl From<DsdError> for PyErr {
    fn from(e: DsdError) -> Self {
        PyValueError::new_err(e.to_string())
    }
}

type PyFit<'py> = (Bound<'py, PyArray1<f64>>, Bound<'py, PyArray2<f64>>);

/// Convert a fit into `(popt, pcov)`, or `None` with a warning if the fit
/// couldn't be done.
fn fit_to_py(py: Python<'_>, fit: Result<FitResult, FitError>) -> Option<PyFit<'_>> {
    match fit {
        Ok(fit) => Some((
            fit.params.as_slice().to_pyarray(py),
            fit.covariance.to_pyarray(py),
        )),
        Err(e) => {
            warn!("{e}");
            None
        }
    }
}

/// Drop size distributions over time. See the Rust
/// `dsd_radar::DropSizeDistribution` for details.
///
/// `nd` has shape (`num_times`, `num_bins`); `time`, `rain_rate`, `z` and
/// `num_particles` have shape (`num_times`, ); `spread`, `velocity` and
/// `diameter` have shape (`num_bins`, ) and `bin_edges` has shape
/// (`num_bins+1`, ).
#[pyclass(name = "DropSizeDistribution")]
struct PyDropSizeDistribution {
    inner: DropSizeDistribution,
}

#[pymethods]
impl PyDropSizeDistribution {
    #[new]
    #[pyo3(signature = (time, nd, spread, rain_rate=None, velocity=None, z=None, num_particles=None, bin_edges=None, diameter=None))]
    #[allow(clippy::too_many_arguments)]
    fn new(
        time: PyReadonlyArray1<'_, f64>,
        nd: PyReadonlyArray2<'_, f64>,
        spread: PyReadonlyArray1<'_, f64>,
        rain_rate: Option<PyReadonlyArray1<'_, f64>>,
        velocity: Option<PyReadonlyArray1<'_, f64>>,
        z: Option<PyReadonlyArray1<'_, f64>>,
        num_particles: Option<PyReadonlyArray1<'_, f64>>,
        bin_edges: Option<PyReadonlyArray1<'_, f64>>,
        diameter: Option<PyReadonlyArray1<'_, f64>>,
    ) -> PyResult<Self> {
        let to_vec = |a: Option<PyReadonlyArray1<'_, f64>>| a.map(|a| a.as_array().to_vec());

        let inner = DropSizeDistribution::new(
            time.as_array().to_vec(),
            nd.as_array().to_owned(),
            spread.as_array().to_vec(),
            to_vec(rain_rate),
            to_vec(velocity),
            to_vec(z),
            to_vec(num_particles),
            to_vec(bin_edges),
            to_vec(diameter),
        )?;
        Ok(Self { inner })
    }

    #[getter]
    fn time<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<f64>> {
        self.inner.time().to_pyarray(py)
    }

    #[getter(Nd)]
    fn nd<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray2<f64>> {
        self.inner.nd().to_pyarray(py)
    }

    #[getter]
    fn spread<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<f64>> {
        self.inner.spread().to_pyarray(py)
    }

    #[getter]
    fn bin_edges<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<f64>> {
        self.inner.bin_edges().to_pyarray(py)
    }

    #[getter]
    fn diameter<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<f64>> {
        self.inner.diameter().to_pyarray(py)
    }

    #[getter]
    fn velocity<'py>(&self, py: Python<'py>) -> Option<Bound<'py, PyArray1<f64>>> {
        self.inner.velocity().map(|v| v.to_pyarray(py))
    }

    #[getter]
    fn rain_rate<'py>(&self, py: Python<'py>) -> Option<Bound<'py, PyArray1<f64>>> {
        self.inner.rain_rate().map(|r| r.to_pyarray(py))
    }

    #[getter(Z)]
    fn z<'py>(&self, py: Python<'py>) -> Option<Bound<'py, PyArray1<f64>>> {
        self.inner.z().map(|z| z.to_pyarray(py))
    }

    #[getter]
    fn num_particles<'py>(&self, py: Python<'py>) -> Option<Bound<'py, PyArray1<f64>>> {
        self.inner.num_particles().map(|n| n.to_pyarray(py))
    }

    #[getter(Zh)]
    fn zh<'py>(&self, py: Python<'py>) -> Option<Bound<'py, PyArray1<f64>>> {
        self.inner.radar_parameters().map(|r| r.zh.to_pyarray(py))
    }

    #[getter(Zdr)]
    fn zdr<'py>(&self, py: Python<'py>) -> Option<Bound<'py, PyArray1<f64>>> {
        self.inner.radar_parameters().map(|r| r.zdr.to_pyarray(py))
    }

    #[getter(Kdp)]
    fn kdp<'py>(&self, py: Python<'py>) -> Option<Bound<'py, PyArray1<f64>>> {
        self.inner.radar_parameters().map(|r| r.kdp.to_pyarray(py))
    }

    #[getter(Ai)]
    fn ai<'py>(&self, py: Python<'py>) -> Option<Bound<'py, PyArray1<f64>>> {
        self.inner.radar_parameters().map(|r| r.ai.to_pyarray(py))
    }

    /// The `m`th moment of the distribution at each timestep.
    fn moment<'py>(&self, py: Python<'py>, m: f64) -> Bound<'py, PyArray1<f64>> {
        self.inner.moment(m).to_pyarray(py)
    }

    /// Estimate the rain rate, replacing any rain rate given.
    #[pyo3(name = "calculate_RR")]
    fn calculate_rr(&mut self) {
        self.inner.calculate_rain_rate();
    }

    /// Simulate `Zh`, `Zdr`, `Kdp` and `Ai` at `wavelength` in mm, with water
    /// at 10 °C and Beard and Chuang drop shapes.
    ///
    /// The number of worker threads is controlled by `num_threads`. It must
    /// be a positive integer, or `None` to automatically choose the number of
    /// threads.
    #[pyo3(signature = (wavelength=RadarBand::X.wavelength(), num_threads=None))]
    fn calc_radar_parameters(
        &mut self,
        py: Python<'_>,
        wavelength: f64,
        num_threads: Option<usize>,
    ) -> PyResult<()> {
        let config = ScatteringConfig::new(wavelength)?;
        let table =
            py.allow_threads(|| TableCache::global().get_or_build(&config, &RayleighSpheroid))?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads.unwrap_or(0))
            .build()
            .map_err(|e| PyValueError::new_err(e.to_string()))?;

        let num_times = self.inner.num_times();
        let bin_edges = self.inner.bin_edges();
        let nd = self.inner.nd();
        let progress = Progress::new();
        let mut result = None;

        info!("Calculating radar parameters for {num_times} timesteps at {wavelength} mm");

        pool.in_place_scope(|s| -> Result<(), PyErr> {
            s.spawn(|_| {
                result = Some(radar_parameters(&table, bin_edges, nd, &progress));
            });

            // The work is done in the thread pool, but back here in the main
            // thread, handle progress reporting and checking for early
            // cancellation
            while !progress.is_cancelled() {
                if let Err(e) = py.check_signals() {
                    progress.cancel();
                    return Err(e);
                }

                let num_completed = progress.completed();
                let percent = num_completed as f32 / num_times.max(1) as f32 * 100.;
                info!("Completed {num_completed}/{num_times} timesteps ({percent:0.2}%)");

                if num_completed == num_times {
                    break;
                }

                py.allow_threads(|| {
                    std::thread::sleep(Duration::from_secs(1));
                });
            }

            Ok(())
        })?;

        let parameters = result.ok_or(DsdError::Cancelled)??;
        self.inner.set_radar_parameters(parameters)?;
        Ok(())
    }

    /// Power-law fit `R = a Kdp^b`. Returns `(popt, pcov)`, or `None` if the
    /// fit can't be done.
    #[pyo3(name = "calc_R_kdp_relationship")]
    fn calc_r_kdp_relationship<'py>(&self, py: Python<'py>) -> Option<PyFit<'py>> {
        fit_to_py(py, self.inner.calc_r_kdp_relationship())
    }

    /// Power-law fit `R = a Zh^b` with `Zh` in linear units. Returns
    /// `(popt, pcov)`, or `None` if the fit can't be done.
    #[pyo3(name = "calc_R_Zh_relationship")]
    fn calc_r_zh_relationship<'py>(&self, py: Python<'py>) -> Option<PyFit<'py>> {
        fit_to_py(py, self.inner.calc_r_zh_relationship())
    }

    /// Multi-parameter rainfall relationship. `moments` is a list drawn from
    /// `'reflectivity'`, `'differential_reflectivity'` and
    /// `'specific_differential_phase'`; 1 or 3 of them are supported.
    /// Returns `(popt, pcov)` with `popt = (a, b, c, d)`, or `None` if the
    /// fit can't be done.
    #[pyo3(signature = (moments=None))]
    fn calc_rainfall_relationship<'py>(
        &self,
        py: Python<'py>,
        moments: Option<Vec<String>>,
    ) -> Option<PyFit<'py>> {
        let moments: Result<Vec<Moment>, _> = moments
            .unwrap_or_default()
            .iter()
            .map(|m| m.parse::<Moment>())
            .collect();
        match moments {
            Ok(moments) => fit_to_py(py, self.inner.calc_rainfall_relationship(&moments)),
            Err(e) => {
                warn!("{e}");
                None
            }
        }
    }
}

/// A Python module implemented in Rust.
#[pymodule]
fn dsd_radar(m: &Bound<'_, PyModule>) -> PyResult<()> {
    pyo3_log::init();

    m.add_class::<PyDropSizeDistribution>()?;
    Ok(())
}
