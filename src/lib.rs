//! Polarimetric radar parameters and rainfall relationships from drop size
//! distributions.
//!
//! A [`DropSizeDistribution`] holds a time series of binned drop
//! concentrations, e.g. from a disdrometer. From it you can compute moments
//! and a rain rate directly, simulate radar parameters (`Zh`, `Zdr`, `Kdp`,
//! `Ai`) through a [`ScatteringTable`], and fit power-law rainfall
//! relationships to the simulated parameters.
//!
//! NOTE: the `python` feature adds the interface between Rust and Python in
//! the `python` module. The real work happens in the other modules, and they
//! do not use `pyo3`.

pub mod dsd;
pub mod error;
pub mod fit;
pub mod scattering;

#[cfg(feature = "python")]
mod python;

pub use dsd::{DropSizeDistribution, RadarParameters};
pub use error::{DsdError, FitError};
pub use fit::{FitResult, Moment};
pub use scattering::{RadarBand, ScatteringConfig, ScatteringTable, TableCache};
