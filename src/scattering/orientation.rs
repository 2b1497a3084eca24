//! Canting angle distributions for orientation averaging.

use smallvec::SmallVec;

use crate::error::DsdError;

/// Number of canting angles in the averaging quadrature.
const NUM_ANGLES: usize = 91;

/// Distribution of the drop canting angle in the polarization plane, measured
/// from vertical.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CantingDistribution {
    /// Zero-mean Gaussian truncated to ±90°, standard deviation in degrees.
    /// A standard deviation of 0 means every drop is aligned.
    Gaussian {
        /// Standard deviation in degrees
        std_dev: f64,
    },
}

impl CantingDistribution {
    /// A Gaussian distribution with the standard deviation in degrees.
    pub fn gaussian(std_dev: f64) -> Result<Self, DsdError> {
        if !(std_dev.is_finite() && std_dev >= 0.) {
            return Err(DsdError::InvalidOrientation(std_dev));
        }
        Ok(Self::Gaussian { std_dev })
    }

    pub(super) fn key(&self) -> u64 {
        match self {
            CantingDistribution::Gaussian { std_dev } => std_dev.to_bits(),
        }
    }

    /// Quadrature over the canting angle, as (angle in radians, weight)
    /// pairs. The weights sum to 1.
    pub fn quadrature(&self) -> SmallVec<[(f64, f64); NUM_ANGLES]> {
        let CantingDistribution::Gaussian { std_dev } = *self;

        if std_dev == 0. {
            let mut nodes = SmallVec::new();
            nodes.push((0., 1.));
            return nodes;
        }

        let step = 180. / (NUM_ANGLES - 1) as f64;
        let mut nodes: SmallVec<[(f64, f64); NUM_ANGLES]> = (0..NUM_ANGLES)
            .map(|i| {
                let beta = -90. + i as f64 * step;
                let w = f64::exp(-0.5 * (beta / std_dev).powi(2));
                (beta.to_radians(), w)
            })
            .collect();

        let total: f64 = nodes.iter().map(|(_, w)| w).sum();
        for (_, w) in &mut nodes {
            *w /= total;
        }
        nodes
    }
}
