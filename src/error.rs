//! Error types.

/// Configuration and input errors. These are fatal and are raised before any
/// per-timestep work starts.
#[derive(Debug, Clone, PartialEq)]
pub enum DsdError {
    /// The inputs don't have the expected shape(s)
    InconsistentInputs,
    /// The bin edges are not strictly increasing
    BinEdgesNotIncreasing,
    /// A concentration is negative
    NegativeConcentration,
    /// Neither bin edges nor bin diameters were given
    MissingBinGeometry,
    /// The wavelength (in mm) is not one of the supported radar bands
    UnsupportedWavelength(f64),
    /// The maximum diameter (in mm) is not positive
    InvalidMaxDiameter(f64),
    /// The canting angle standard deviation (in degrees) is invalid
    InvalidOrientation(f64),
    /// A drop shape model gave a non-positive or non-finite axis ratio
    InvalidAxisRatio {
        /// Diameter in mm
        diameter: f64,
        /// The axis ratio returned
        ratio: f64,
    },
    /// An array is not contiguous when it was assumed to be
    NotContiguous,
    /// The operation was aborted early
    Cancelled,
    /// The worker thread pool couldn't be created
    ThreadPool(String),
}

impl std::fmt::Display for DsdError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DsdError::InconsistentInputs => {
                write!(f, "inputs to the drop size distribution have the wrong shape")
            }
            DsdError::BinEdgesNotIncreasing => {
                write!(f, "bin edges must be strictly increasing")
            }
            DsdError::NegativeConcentration => {
                write!(f, "drop concentrations must not be negative")
            }
            DsdError::MissingBinGeometry => {
                write!(f, "either bin edges or bin diameters are required")
            }
            DsdError::UnsupportedWavelength(wl) => {
                write!(f, "unsupported radar wavelength: {wl} mm")
            }
            DsdError::InvalidMaxDiameter(d) => {
                write!(f, "maximum diameter must be positive, got {d} mm")
            }
            DsdError::InvalidOrientation(std) => {
                write!(f, "invalid canting angle standard deviation: {std} degrees")
            }
            DsdError::InvalidAxisRatio { diameter, ratio } => {
                write!(f, "invalid axis ratio {ratio} for a {diameter} mm drop")
            }
            DsdError::NotContiguous => write!(f, "array slice not contiguous in memory"),
            DsdError::Cancelled => write!(f, "operation cancelled early"),
            DsdError::ThreadPool(e) => write!(f, "couldn't build thread pool: {e}"),
        }
    }
}

impl std::error::Error for DsdError {}

/// Reasons a rainfall relationship couldn't be fit. These are not fatal: the
/// caller gets no result, but nothing else is affected.
#[derive(Debug, Clone, PartialEq)]
pub enum FitError {
    /// No rain rate is present; run the rain rate estimator or supply one
    MissingRainRate,
    /// The radar parameters haven't been calculated yet
    MissingRadarParameters,
    /// No moments were selected
    NoMoments,
    /// Only 1 or 3 moments are supported
    UnsupportedMomentCount(usize),
    /// Every timestep was removed by the positivity filter
    EmptySelection,
    /// Fewer points than free parameters
    TooFewPoints {
        /// Number of points that survived filtering
        points: usize,
        /// Number of free parameters in the model
        parameters: usize,
    },
    /// The optimizer didn't converge
    NoConvergence,
    /// The normal equations are singular at the solution
    Singular,
}

impl std::fmt::Display for FitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FitError::MissingRainRate => write!(f, "no rain rate present"),
            FitError::MissingRadarParameters => write!(
                f,
                "no radar parameters present, run calc_radar_parameters first"
            ),
            FitError::NoMoments => write!(f, "no moments selected"),
            FitError::UnsupportedMomentCount(n) => {
                write!(f, "fits with {n} moments are not implemented, use 1 or 3")
            }
            FitError::EmptySelection => {
                write!(f, "no timesteps left to fit after filtering")
            }
            FitError::TooFewPoints { points, parameters } => write!(
                f,
                "{points} points is too few to fit {parameters} parameters"
            ),
            FitError::NoConvergence => write!(f, "fit did not converge"),
            FitError::Singular => write!(f, "fit is singular at the solution"),
        }
    }
}

impl std::error::Error for FitError {}
