//! Levenberg-Marquardt nonlinear least squares.

use log::{debug, warn};
use nalgebra::{DMatrix, DVector};
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

use super::{CurveFit, FitModel, FitResult};
use crate::error::FitError;

/// Damped Gauss-Newton with Marquardt's diagonal scaling. Each step is an
/// SVD least squares solve of the damped system.
///
/// The covariance is `(JᵀJ)⁻¹ SSR / (n - p)`, using the pseudo-inverse when
/// `JᵀJ` is rank deficient. With as many points as parameters the covariance
/// can't be estimated and is filled with `+inf`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevenbergMarquardt {
    /// Maximum number of accepted steps.
    pub max_iterations: usize,
    /// Relative tolerance on the parameter step.
    pub xtol: f64,
    /// Relative tolerance on the reduction of the sum of squares.
    pub ftol: f64,
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            xtol: 1e-12,
            ftol: 1e-12,
        }
    }
}

impl CurveFit for LevenbergMarquardt {
    fn fit(
        &self,
        model: &dyn FitModel,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        initial: &[f64],
    ) -> Result<FitResult, FitError> {
        let n = y.len();
        let p = model.num_params();
        if n == 0 {
            return Err(FitError::EmptySelection);
        }
        if n < p {
            return Err(FitError::TooFewPoints {
                points: n,
                parameters: p,
            });
        }
        if x.nrows() != n || initial.len() != p {
            return Err(FitError::Singular);
        }

        let residuals = |params: &DVector<f64>| -> DVector<f64> {
            DVector::from_iterator(
                n,
                x.axis_iter(Axis(0))
                    .zip(y)
                    .map(|(row, y)| y - model.value(row, params.as_slice())),
            )
        };
        let jacobian = |params: &DVector<f64>| -> DMatrix<f64> {
            let mut jac = DMatrix::zeros(n, p);
            let mut gradient = vec![0.; p];
            for (i, row) in x.axis_iter(Axis(0)).enumerate() {
                model.gradient(row, params.as_slice(), &mut gradient);
                for (j, g) in gradient.iter().enumerate() {
                    jac[(i, j)] = *g;
                }
            }
            jac
        };

        let mut params = DVector::from_column_slice(initial);
        let mut r = residuals(&params);
        let mut cost = r.norm_squared();
        if !cost.is_finite() {
            return Err(FitError::NoConvergence);
        }

        let mut lambda: f64 = 1e-3;
        let mut converged = cost == 0.;
        let mut iterations = 0;
        while !converged && iterations < self.max_iterations {
            iterations += 1;
            let jac = jacobian(&params);
            let scale: Vec<f64> = (0..p)
                .map(|j| jac.column(j).norm_squared().max(1e-12).sqrt())
                .collect();

            // Steps solve [J; √λ D] δ = [r; 0] in the least squares sense
            let mut augmented = DMatrix::<f64>::zeros(n + p, p);
            augmented.rows_mut(0, n).copy_from(&jac);
            let mut rhs = DVector::<f64>::zeros(n + p);
            rhs.rows_mut(0, n).copy_from(&r);

            let mut stepped = false;
            while lambda < 1e16 {
                for (j, d) in scale.iter().enumerate() {
                    augmented[(n + j, j)] = lambda.sqrt() * d;
                }
                let Ok(delta) = solve_least_squares(augmented.clone(), &rhs) else {
                    lambda *= 10.;
                    continue;
                };
                let trial = &params + &delta;
                let trial_r = residuals(&trial);
                let trial_cost = trial_r.norm_squared();

                if trial_cost.is_finite() && trial_cost <= cost {
                    let small_step = delta.norm() <= self.xtol * (params.norm() + self.xtol);
                    let small_reduction = cost - trial_cost <= self.ftol * cost;
                    params = trial;
                    r = trial_r;
                    cost = trial_cost;
                    lambda = (lambda / 10.).max(1e-12);
                    stepped = true;
                    converged = small_step || small_reduction || cost == 0.;
                    break;
                }
                lambda *= 10.;
            }

            // Nothing downhill in any direction: this is the minimum
            if !stepped {
                converged = true;
            }
        }

        if !converged {
            return Err(FitError::NoConvergence);
        }
        debug!("Levenberg-Marquardt finished after {iterations} iterations, SSR = {cost:e}");

        let covariance = covariance(&jacobian(&params), cost, n)?;
        Ok(FitResult {
            params: params.iter().copied().collect(),
            covariance,
        })
    }
}

/// Minimum-norm least squares solution of `a x = b` through the SVD.
pub(super) fn solve_least_squares(
    a: DMatrix<f64>,
    b: &DVector<f64>,
) -> Result<DVector<f64>, FitError> {
    let (rows, cols) = a.shape();
    let svd = a.svd(true, true);
    let tolerance = f64::EPSILON * rows.max(cols) as f64 * svd.singular_values.max();
    let x = svd.solve(b, tolerance).map_err(|_| FitError::Singular)?;
    if x.iter().all(|v| v.is_finite()) {
        Ok(x)
    } else {
        Err(FitError::Singular)
    }
}

/// Parameter covariance from the Jacobian at the solution.
fn covariance(jac: &DMatrix<f64>, cost: f64, n: usize) -> Result<Array2<f64>, FitError> {
    let p = jac.ncols();
    let svd = jac.clone().svd(false, true);
    let v_t = svd.v_t.ok_or(FitError::Singular)?;
    let s_max = svd.singular_values.max();
    let threshold = f64::EPSILON * n.max(p) as f64 * s_max;

    // Pseudo-inverse of JᵀJ, dropping negligible singular values
    let mut pinv = DMatrix::zeros(p, p);
    for (k, &s) in svd.singular_values.iter().enumerate() {
        if s > threshold {
            let v = v_t.row(k).transpose();
            pinv += (&v * v.transpose()) / s.powi(2);
        }
    }

    let scale = if n > p {
        cost / (n - p) as f64
    } else {
        warn!("covariance of the parameters could not be estimated");
        f64::INFINITY
    };

    Ok(Array2::from_shape_fn((p, p), |(i, j)| {
        if scale.is_infinite() {
            f64::INFINITY
        } else {
            pinv[(i, j)] * scale
        }
    }))
}
