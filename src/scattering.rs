//! Orientation- and shape-averaged scattering lookup tables.
//!
//! A [`ScatteringTable`] is built once per radar band and microphysics setup
//! and then shared read-only by every timestep. Building one is the most
//! expensive step in the pipeline, so tables are memoized in a
//! [`TableCache`].

mod orientation;
mod rayleigh;
mod refractive;
mod shape;


pub use self::orientation::CantingDistribution;
pub use self::rayleigh::RayleighSpheroid;
pub use self::refractive::{LiquidWater, RefractiveIndex};
pub use self::shape::{AxisRatio, AxisRatioModel, MIN_AXIS_RATIO};

use std::collections::HashMap;
use std::fmt::Debug;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use log::{debug, info};
use num_complex::Complex64;
use rayon::prelude::*;

use crate::error::DsdError;

/// Radar dielectric factor `|K|²` of water used to normalize reflectivity.
pub const KW_SQR: f64 = 0.93;

/// Supported radar bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RadarBand {
    /// S band, 111.0 mm
    S,
    /// C band, 53.5 mm
    C,
    /// X band, 33.3 mm
    X,
    /// Ku band, 22.0 mm
    Ku,
    /// Ka band, 8.43 mm
    Ka,
    /// W band, 3.19 mm
    W,
}

impl RadarBand {
    /// All supported bands, from longest to shortest wavelength.
    pub const ALL: [RadarBand; 6] = [
        RadarBand::S,
        RadarBand::C,
        RadarBand::X,
        RadarBand::Ku,
        RadarBand::Ka,
        RadarBand::W,
    ];

    /// Wavelength in mm.
    pub fn wavelength(self) -> f64 {
        match self {
            RadarBand::S => 111.0,
            RadarBand::C => 53.5,
            RadarBand::X => 33.3,
            RadarBand::Ku => 22.0,
            RadarBand::Ka => 8.43,
            RadarBand::W => 3.19,
        }
    }

    /// Look up the band for a wavelength in mm. Only the exact band
    /// wavelengths are accepted.
    pub fn from_wavelength(wavelength: f64) -> Result<Self, DsdError> {
        Self::ALL
            .into_iter()
            .find(|band| (band.wavelength() - wavelength).abs() < 1e-9)
            .ok_or(DsdError::UnsupportedWavelength(wavelength))
    }
}

/// Viewing geometry for horizontally-incident radiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Geometry {
    /// Monostatic radar backscatter
    Backscatter,
    /// Forward scattering, used for propagation effects
    ForwardScatter,
}

/// Microphysics and radar setup for a scattering table.
#[derive(Debug, Clone)]
pub struct ScatteringConfig {
    band: RadarBand,
    refractive_index: Arc<dyn RefractiveIndex>,
    axis_ratio: Arc<dyn AxisRatio>,
    canting: CantingDistribution,
    /// Maximum drop diameter in mm.
    max_diameter: f64,
    /// Number of diameters in the table.
    num_points: NonZeroUsize,
}

impl Default for ScatteringConfig {
    /// X band, water at 10 °C, Beard and Chuang drop shapes, 20° canting and
    /// drops up to 10 mm.
    fn default() -> Self {
        Self {
            band: RadarBand::X,
            refractive_index: Arc::new(LiquidWater::default()),
            axis_ratio: Arc::new(AxisRatioModel::BeardChuang),
            canting: CantingDistribution::Gaussian { std_dev: 20.0 },
            max_diameter: 10.0,
            num_points: NonZeroUsize::new(1024).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

impl ScatteringConfig {
    /// The default setup at a different wavelength (in mm).
    pub fn new(wavelength: f64) -> Result<Self, DsdError> {
        Ok(Self {
            band: RadarBand::from_wavelength(wavelength)?,
            ..Self::default()
        })
    }

    /// Use a different radar band.
    pub fn with_band(mut self, band: RadarBand) -> Self {
        self.band = band;
        self
    }

    /// Use a different refractive index model.
    pub fn with_refractive_index(mut self, refractive_index: Arc<dyn RefractiveIndex>) -> Self {
        self.refractive_index = refractive_index;
        self
    }

    /// Use a different drop shape model.
    pub fn with_axis_ratio(mut self, axis_ratio: Arc<dyn AxisRatio>) -> Self {
        self.axis_ratio = axis_ratio;
        self
    }

    /// Use a Gaussian canting angle distribution with this standard deviation
    /// in degrees.
    pub fn with_canting_std_dev(mut self, std_dev: f64) -> Result<Self, DsdError> {
        self.canting = CantingDistribution::gaussian(std_dev)?;
        Ok(self)
    }

    /// Set the largest diameter (mm) in the table.
    pub fn with_max_diameter(mut self, max_diameter: f64) -> Result<Self, DsdError> {
        if !(max_diameter.is_finite() && max_diameter > 0.) {
            return Err(DsdError::InvalidMaxDiameter(max_diameter));
        }
        self.max_diameter = max_diameter;
        Ok(self)
    }

    /// Set the number of diameters in the table.
    pub fn with_num_points(mut self, num_points: NonZeroUsize) -> Self {
        self.num_points = num_points;
        self
    }

    /// The radar band.
    pub fn band(&self) -> RadarBand {
        self.band
    }

    /// The canting angle distribution.
    pub fn canting(&self) -> CantingDistribution {
        self.canting
    }

    /// Maximum diameter in mm.
    pub fn max_diameter(&self) -> f64 {
        self.max_diameter
    }

    /// The memoization key for this configuration.
    pub fn key(&self) -> TableKey {
        let m = self.refractive_index.refractive_index(self.band);
        TableKey {
            band: self.band,
            refractive_index: (m.re.to_bits(), m.im.to_bits()),
            axis_ratio: self.axis_ratio.name().to_owned(),
            canting: self.canting.key(),
            max_diameter: self.max_diameter.to_bits(),
            num_points: self.num_points.get(),
        }
    }
}

/// A single particle as seen by a [`ScatteringEngine`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    /// Radar wavelength in mm.
    pub wavelength: f64,
    /// Complex refractive index, with a positive imaginary part for
    /// absorbing media.
    pub refractive_index: Complex64,
    /// Volume-equivalent diameter in mm.
    pub diameter: f64,
    /// Horizontal over vertical dimension; 1 for a sphere, larger than 1 for
    /// an oblate drop.
    pub shape: f64,
}

/// Orientation-averaged scattering response of one particle, or of a whole
/// distribution once integrated.
///
/// Amplitudes are in mm and powers in mm². For a distribution (see
/// [`ScatteringTable::integrate`]) these are per m³ of air.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScatteringSample {
    /// Mean co-polar amplitude, horizontal polarization.
    pub s_hh: Complex64,
    /// Mean co-polar amplitude, vertical polarization.
    pub s_vv: Complex64,
    /// Mean of `|S_hh|²`.
    pub power_hh: f64,
    /// Mean of `|S_vv|²`.
    pub power_vv: f64,
}

impl ScatteringSample {
    fn scaled(&self, w: f64) -> Self {
        Self {
            s_hh: self.s_hh * w,
            s_vv: self.s_vv * w,
            power_hh: self.power_hh * w,
            power_vv: self.power_vv * w,
        }
    }

    fn accumulate(&mut self, rhs: &Self) {
        self.s_hh += rhs.s_hh;
        self.s_vv += rhs.s_vv;
        self.power_hh += rhs.power_hh;
        self.power_vv += rhs.power_vv;
    }
}

/// Something that can compute the scattering of a single drop.
pub trait ScatteringEngine: Debug + Send + Sync {
    /// Identifies the engine in a [`TableKey`].
    fn name(&self) -> &str;

    /// Scattering by `particle` in the given geometry, averaged over the
    /// canting angle distribution.
    fn sample(
        &self,
        particle: &Particle,
        geometry: Geometry,
        canting: &CantingDistribution,
    ) -> ScatteringSample;
}

/// Identifies one scattering table configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableKey {
    band: RadarBand,
    refractive_index: (u64, u64),
    axis_ratio: String,
    canting: u64,
    max_diameter: u64,
    num_points: usize,
}

/// Precomputed scattering for one setup, over a regular diameter grid.
///
/// There is no way to modify a table once it's built.
#[derive(Debug)]
pub struct ScatteringTable {
    band: RadarBand,
    refractive_index: Complex64,
    canting: CantingDistribution,
    max_diameter: f64,
    axis_ratio: String,
    /// Diameters in mm: `max_diameter / num_points` to `max_diameter`.
    diameters: Vec<f64>,
    /// Horizontal over vertical dimension at each diameter.
    shapes: Vec<f64>,
    backscatter: Vec<ScatteringSample>,
    forward: Vec<ScatteringSample>,
}

impl ScatteringTable {
    /// Run the scattering engine over every diameter and both geometries.
    pub fn build(config: &ScatteringConfig, engine: &dyn ScatteringEngine) -> Result<Self, DsdError> {
        if !(config.max_diameter.is_finite() && config.max_diameter > 0.) {
            return Err(DsdError::InvalidMaxDiameter(config.max_diameter));
        }

        let num_points = config.num_points.get();
        let wavelength = config.band.wavelength();
        let refractive_index = config.refractive_index.refractive_index(config.band);

        info!(
            "Building {} scattering table at {wavelength} mm ({num_points} diameters up to {} mm)",
            engine.name(),
            config.max_diameter
        );

        let step = config.max_diameter / num_points as f64;
        let diameters: Vec<f64> = (1..=num_points).map(|i| i as f64 * step).collect();
        let shapes = diameters
            .iter()
            .map(|&d| {
                let ratio = config.axis_ratio.axis_ratio(d);
                if ratio.is_finite() && ratio > 0. {
                    Ok(1.0 / ratio)
                } else {
                    Err(DsdError::InvalidAxisRatio {
                        diameter: d,
                        ratio,
                    })
                }
            })
            .collect::<Result<Vec<f64>, _>>()?;

        let sample_all = |geometry: Geometry| -> Vec<ScatteringSample> {
            let mut samples = Vec::new();
            diameters
                .par_iter()
                .zip(&shapes)
                .map(|(&diameter, &shape)| {
                    let particle = Particle {
                        wavelength,
                        refractive_index,
                        diameter,
                        shape,
                    };
                    engine.sample(&particle, geometry, &config.canting)
                })
                .collect_into_vec(&mut samples);
            samples
        };
        let backscatter = sample_all(Geometry::Backscatter);
        let forward = sample_all(Geometry::ForwardScatter);

        debug!("scattering table complete");

        Ok(Self {
            band: config.band,
            refractive_index,
            canting: config.canting,
            max_diameter: config.max_diameter,
            axis_ratio: config.axis_ratio.name().to_owned(),
            diameters,
            shapes,
            backscatter,
            forward,
        })
    }

    /// The radar band.
    pub fn band(&self) -> RadarBand {
        self.band
    }

    /// Radar wavelength in mm.
    pub fn wavelength(&self) -> f64 {
        self.band.wavelength()
    }

    /// Refractive index of the drops.
    pub fn refractive_index(&self) -> Complex64 {
        self.refractive_index
    }

    /// Canting angle distribution the table was averaged over.
    pub fn canting(&self) -> CantingDistribution {
        self.canting
    }

    /// Largest diameter in mm.
    pub fn max_diameter(&self) -> f64 {
        self.max_diameter
    }

    /// Name of the drop shape model.
    pub fn axis_ratio_model(&self) -> &str {
        &self.axis_ratio
    }

    /// Diameter grid in mm.
    pub fn diameters(&self) -> &[f64] {
        &self.diameters
    }

    /// Horizontal over vertical dimension on the diameter grid.
    pub fn shapes(&self) -> &[f64] {
        &self.shapes
    }

    /// Per-diameter samples for a geometry.
    pub fn samples(&self, geometry: Geometry) -> &[ScatteringSample] {
        match geometry {
            Geometry::Backscatter => &self.backscatter,
            Geometry::ForwardScatter => &self.forward,
        }
    }

    /// Integrate the tabulated response over a size distribution `psd`
    /// (mm⁻¹ m⁻³, as a function of diameter in mm) with the trapezoidal rule.
    pub fn integrate(&self, geometry: Geometry, psd: impl Fn(f64) -> f64) -> ScatteringSample {
        let samples = self.samples(geometry);
        let weighted: Vec<ScatteringSample> = self
            .diameters
            .iter()
            .zip(samples)
            .map(|(&d, sample)| sample.scaled(psd(d)))
            .collect();

        let mut total = ScatteringSample::default();
        for (i, pair) in weighted.windows(2).enumerate() {
            let dd = self.diameters[i + 1] - self.diameters[i];
            let mut trapezoid = pair[0];
            trapezoid.accumulate(&pair[1]);
            total.accumulate(&trapezoid.scaled(0.5 * dd));
        }
        total
    }
}

/// Memoized scattering tables, shared between threads.
#[derive(Debug, Default)]
pub struct TableCache {
    tables: Mutex<HashMap<(String, TableKey), Arc<ScatteringTable>>>,
}

impl TableCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache.
    pub fn global() -> &'static TableCache {
        static CACHE: OnceLock<TableCache> = OnceLock::new();
        CACHE.get_or_init(TableCache::new)
    }

    /// Fetch the table for `config`, building it if it isn't cached yet.
    ///
    /// No lock is held while a table is built, so this can be called from
    /// inside rayon jobs. Two threads asking for the same new table may both
    /// build it, but only the first one stored is ever handed out.
    pub fn get_or_build(
        &self,
        config: &ScatteringConfig,
        engine: &dyn ScatteringEngine,
    ) -> Result<Arc<ScatteringTable>, DsdError> {
        let key = (engine.name().to_owned(), config.key());
        if let Some(table) = self.lock().get(&key) {
            debug!("using cached scattering table for {:?}", config.band);
            return Ok(Arc::clone(table));
        }

        let table = Arc::new(ScatteringTable::build(config, engine)?);
        Ok(Arc::clone(self.lock().entry(key).or_insert(table)))
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<(String, TableKey), Arc<ScatteringTable>>> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of tables held.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no tables have been built yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
