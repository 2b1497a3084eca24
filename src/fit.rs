//! Power-law rainfall relationships fit to simulated radar parameters.
//!
//! Every fit first filters out timesteps where the rain rate or one of the
//! regressors is non-positive or non-finite, so that zero-concentration
//! timesteps (with `Zh = -inf`) never reach the optimizer.

mod levenberg_marquardt;


pub use self::levenberg_marquardt::LevenbergMarquardt;

use self::levenberg_marquardt::solve_least_squares;

use std::collections::BTreeSet;
use std::fmt::Debug;

use log::{debug, warn};
use nalgebra::{DMatrix, DVector};
use ndarray::{Array2, ArrayView1, ArrayView2};
use smallvec::SmallVec;

use crate::dsd::RadarParameters;
use crate::error::FitError;

/// Radar parameters that can enter a rainfall relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Moment {
    /// Horizontal reflectivity, `Zh`
    Reflectivity,
    /// Differential reflectivity, `Zdr`
    DifferentialReflectivity,
    /// Specific differential phase, `Kdp`
    SpecificDifferentialPhase,
}

impl Moment {
    /// Name of the moment.
    pub fn name(self) -> &'static str {
        match self {
            Moment::Reflectivity => "reflectivity",
            Moment::DifferentialReflectivity => "differential_reflectivity",
            Moment::SpecificDifferentialPhase => "specific_differential_phase",
        }
    }
}

impl std::str::FromStr for Moment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reflectivity" => Ok(Moment::Reflectivity),
            "differential_reflectivity" => Ok(Moment::DifferentialReflectivity),
            "specific_differential_phase" => Ok(Moment::SpecificDifferentialPhase),
            _ => Err(format!("unknown moment: {s}")),
        }
    }
}

/// Best-fit parameters and their covariance.
#[derive(Debug, Clone, PartialEq)]
pub struct FitResult {
    /// Best-fit parameters.
    pub params: SmallVec<[f64; 4]>,
    /// Covariance of the parameters, (`num_params`, `num_params`).
    pub covariance: Array2<f64>,
}

/// A model `y = f(x; p)` with one or more independent variables per
/// observation.
pub trait FitModel: Debug {
    /// Number of parameters.
    fn num_params(&self) -> usize;

    /// Model value for the independent variables `x` of one observation.
    fn value(&self, x: ArrayView1<'_, f64>, params: &[f64]) -> f64;

    /// Derivatives of the model value with respect to each parameter.
    fn gradient(&self, x: ArrayView1<'_, f64>, params: &[f64], gradient: &mut [f64]);
}

/// A nonlinear least squares routine.
pub trait CurveFit: Debug {
    /// Fit `model` to observations `y`, where row `i` of `x` holds the
    /// independent variables of `y[i]`, starting from `initial`.
    fn fit(
        &self,
        model: &dyn FitModel,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        initial: &[f64],
    ) -> Result<FitResult, FitError>;
}

/// `y = a x₁^b₁ x₂^b₂ …` with parameters `[a, b₁, b₂, …]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerLaw {
    num_vars: usize,
}

impl PowerLaw {
    /// A power law in `num_vars` independent variables.
    pub fn new(num_vars: usize) -> Self {
        Self { num_vars }
    }
}

impl FitModel for PowerLaw {
    fn num_params(&self) -> usize {
        self.num_vars + 1
    }

    fn value(&self, x: ArrayView1<'_, f64>, params: &[f64]) -> f64 {
        x.iter()
            .zip(&params[1..])
            .fold(params[0], |acc, (x, b)| acc * x.powf(*b))
    }

    fn gradient(&self, x: ArrayView1<'_, f64>, params: &[f64], gradient: &mut [f64]) {
        let product: f64 = x.iter().zip(&params[1..]).map(|(x, b)| x.powf(*b)).product();
        gradient[0] = product;
        for (g, x) in gradient[1..].iter_mut().zip(x) {
            *g = params[0] * product * x.ln();
        }
    }
}

/// Convert from dB to linear units.
pub fn idb(db: f64) -> f64 {
    10f64.powf(0.1 * db)
}

/// Indices where both `kdp` and `rain_rate` are positive and finite.
pub fn positivity_filter(kdp: &[f64], rain_rate: &[f64]) -> Vec<usize> {
    kdp.iter()
        .zip(rain_rate)
        .enumerate()
        .filter(|(_, (&k, &r))| is_positive(k) && is_positive(r))
        .map(|(i, _)| i)
        .collect()
}

fn is_positive(x: f64) -> bool {
    x.is_finite() && x > 0.
}

/// Fit `R = a Kdp^b`.
pub fn fit_r_kdp(fitter: &dyn CurveFit, kdp: &[f64], rain_rate: &[f64]) -> Result<FitResult, FitError> {
    let keep = positivity_filter(kdp, rain_rate);
    let x: Vec<f64> = keep.iter().map(|&i| kdp[i]).collect();
    let y: Vec<f64> = keep.iter().map(|&i| rain_rate[i]).collect();
    fit_power_law(fitter, &[x], &y)
}

/// Fit `R = a Zh^b` where `zh` is in dBZ and the fit is in linear units.
pub fn fit_r_zh(fitter: &dyn CurveFit, zh: &[f64], rain_rate: &[f64]) -> Result<FitResult, FitError> {
    let keep: Vec<usize> = zh
        .iter()
        .zip(rain_rate)
        .enumerate()
        .filter(|(_, (&z, &r))| z.is_finite() && is_positive(r))
        .map(|(i, _)| i)
        .collect();
    let x: Vec<f64> = keep.iter().map(|&i| idb(zh[i])).collect();
    let y: Vec<f64> = keep.iter().map(|&i| rain_rate[i]).collect();
    fit_power_law(fitter, &[x], &y)
}

/// Fit `R = a Zh^b Zdr^c Kdp^d` (`Zh`, `Zdr` in linear units) using the
/// selected moments.
///
/// Exactly 1 or 3 distinct moments must be selected. The returned parameters
/// are always `[a, b, c, d]`; the exponent of a moment that wasn't selected
/// is reported as 1 with `NaN` covariance, since it doesn't enter the fit.
pub fn fit_rainfall_relationship(
    fitter: &dyn CurveFit,
    radar: &RadarParameters,
    rain_rate: &[f64],
    moments: &[Moment],
) -> Result<FitResult, FitError> {
    let selected: BTreeSet<Moment> = moments.iter().copied().collect();
    match selected.len() {
        0 => return Err(FitError::NoMoments),
        1 | 3 => {}
        n => return Err(FitError::UnsupportedMomentCount(n)),
    }
    if radar.len() != rain_rate.len() {
        return Err(FitError::MissingRadarParameters);
    }

    // Linear-unit regressor for timestep `t`, or None if it must be filtered
    let regressor = |moment: Moment, t: usize| -> Option<f64> {
        match moment {
            Moment::Reflectivity => Some(radar.zh[t]).filter(|z| z.is_finite()).map(idb),
            Moment::DifferentialReflectivity => {
                Some(radar.zdr[t]).filter(|z| z.is_finite()).map(idb)
            }
            Moment::SpecificDifferentialPhase => Some(radar.kdp[t]).filter(|&k| is_positive(k)),
        }
    };

    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); selected.len()];
    let mut y = Vec::new();
    for (t, &r) in rain_rate.iter().enumerate() {
        if !is_positive(r) {
            continue;
        }
        let row: Option<SmallVec<[f64; 3]>> = selected.iter().map(|&m| regressor(m, t)).collect();
        if let Some(row) = row {
            for (column, value) in columns.iter_mut().zip(row) {
                column.push(value);
            }
            y.push(r);
        }
    }

    let names: Vec<&str> = selected.iter().map(|m| m.name()).collect();
    debug!("fitting rainfall relationship with {names:?} over {} points", y.len());
    let fit = fit_power_law(fitter, &columns, &y)?;

    // Spread the fitted parameters into [a, b, c, d]
    let positions: SmallVec<[usize; 4]> = std::iter::once(0)
        .chain(selected.iter().map(|m| match m {
            Moment::Reflectivity => 1,
            Moment::DifferentialReflectivity => 2,
            Moment::SpecificDifferentialPhase => 3,
        }))
        .collect();

    let mut params: SmallVec<[f64; 4]> = SmallVec::from_slice(&[1.; 4]);
    let mut covariance = Array2::from_elem((4, 4), f64::NAN);
    for (i, &pi) in positions.iter().enumerate() {
        params[pi] = fit.params[i];
        for (j, &pj) in positions.iter().enumerate() {
            covariance[[pi, pj]] = fit.covariance[[i, j]];
        }
    }

    Ok(FitResult { params, covariance })
}

/// Fit `y = a Π x_k^b_k` where `columns[k]` holds `x_k`. All values must
/// already be positive and finite.
fn fit_power_law(
    fitter: &dyn CurveFit,
    columns: &[Vec<f64>],
    y: &[f64],
) -> Result<FitResult, FitError> {
    let model = PowerLaw::new(columns.len());
    if y.is_empty() {
        warn!("no points left to fit after filtering");
        return Err(FitError::EmptySelection);
    }

    let x = Array2::from_shape_fn((y.len(), columns.len()), |(i, k)| columns[k][i]);
    let initial = log_linear_guess(x.view(), y)
        .unwrap_or_else(|| SmallVec::from_elem(1., model.num_params()));

    let result = fitter.fit(&model, x.view(), ArrayView1::from(y), &initial);
    match &result {
        Ok(fit) => debug!("power law fit: {:?}", fit.params),
        Err(e) => warn!("power law fit failed: {e}"),
    }
    result
}

/// Starting point from ordinary least squares on `ln y = ln a + Σ b_k ln x_k`.
fn log_linear_guess(x: ArrayView2<'_, f64>, y: &[f64]) -> Option<SmallVec<[f64; 4]>> {
    let (n, k) = x.dim();
    if n < k + 1 {
        return None;
    }

    let design = DMatrix::from_fn(n, k + 1, |i, j| if j == 0 { 1. } else { x[[i, j - 1]].ln() });
    let target = DVector::from_iterator(n, y.iter().map(|y| y.ln()));

    let solution = solve_least_squares(design, &target).ok()?;

    let mut guess: SmallVec<[f64; 4]> = solution.iter().copied().collect();
    guess[0] = guess[0].exp();
    Some(guess)
}
