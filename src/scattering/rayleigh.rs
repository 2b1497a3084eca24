//! Rayleigh scattering by homogeneous spheroids.
//!
//! Valid while the drops are small compared to the wavelength, which holds
//! well at S band and reasonably at C and X band. Other engines can be used
//! through [`ScatteringEngine`].

use num_complex::Complex64;
use std::f64::consts::PI;

use super::{CantingDistribution, Geometry, Particle, ScatteringEngine, ScatteringSample};

/// Rayleigh approximation for a spheroidal drop, with the radiative
/// reaction correction so that the forward amplitude satisfies the optical
/// theorem.
///
/// In the Rayleigh limit the amplitudes are the same in both geometries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RayleighSpheroid;

impl ScatteringEngine for RayleighSpheroid {
    fn name(&self) -> &str {
        "rayleigh_spheroid"
    }

    fn sample(
        &self,
        particle: &Particle,
        _geometry: Geometry,
        canting: &CantingDistribution,
    ) -> ScatteringSample {
        let k = 2. * PI / particle.wavelength;
        let volume = PI / 6. * particle.diameter.powi(3);
        let eps = particle.refractive_index.powi(2);

        // Depolarization factors along the symmetry axis and across it
        let l_axis = depolarization_factor(1. / particle.shape);
        let l_across = 0.5 * (1. - l_axis);

        let scale = k.powi(2) / (4. * PI);
        let amplitude = |l: f64| -> Complex64 {
            let alpha = volume * (eps - 1.) / (1. + l * (eps - 1.));
            let corrected = alpha / (1. - Complex64::i() * k.powi(3) * alpha / (6. * PI));
            corrected * scale
        };
        // Symmetry axis is vertical for an uncanted drop
        let s_vertical = amplitude(l_axis);
        let s_horizontal = amplitude(l_across);

        canting
            .quadrature()
            .iter()
            .fold(ScatteringSample::default(), |mut acc, &(beta, w)| {
                let (sin2, cos2) = (beta.sin().powi(2), beta.cos().powi(2));
                let s_hh = s_horizontal * cos2 + s_vertical * sin2;
                let s_vv = s_horizontal * sin2 + s_vertical * cos2;

                acc.s_hh += s_hh * w;
                acc.s_vv += s_vv * w;
                acc.power_hh += s_hh.norm_sqr() * w;
                acc.power_vv += s_vv.norm_sqr() * w;
                acc
            })
    }
}

/// Depolarization factor along the symmetry axis of a spheroid with `q`, the
/// ratio of the symmetry semi-axis to the other semi-axes. Oblate spheroids
/// have `q < 1`.
pub(super) fn depolarization_factor(q: f64) -> f64 {
    if (q - 1.).abs() < 1e-6 {
        1. / 3.
    } else if q < 1. {
        let f = (1. / q.powi(2) - 1.).sqrt();
        (1. + f.powi(2)) / f.powi(2) * (1. - f.atan() / f)
    } else {
        let e = (1. - 1. / q.powi(2)).sqrt();
        (1. - e.powi(2)) / e.powi(2) * (0.5 / e * ((1. + e) / (1. - e)).ln() - 1.)
    }
}
