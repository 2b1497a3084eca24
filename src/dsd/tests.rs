use std::num::NonZeroUsize;
use std::sync::Arc;

use approx::assert_relative_eq;
use ndarray::{array, Array2, ShapeBuilder};

use super::*;
use crate::scattering::{AxisRatioModel, RadarBand, RayleighSpheroid};

fn three_bins(nd: Array2<f64>) -> DropSizeDistribution {
    let num_times = nd.nrows();
    DropSizeDistribution::new(
        (0..num_times).map(|t| t as f64 * 60.).collect(),
        nd,
        vec![0.5, 0.5, 0.5],
        None,
        None,
        None,
        None,
        None,
        Some(vec![0.5, 1.0, 1.5]),
    )
    .unwrap()
}

fn table(band: RadarBand) -> ScatteringTable {
    let config = ScatteringConfig::default()
        .with_band(band)
        .with_num_points(NonZeroUsize::new(256).unwrap());
    ScatteringTable::build(&config, &RayleighSpheroid).unwrap()
}

#[test]
fn bin_edges_from_diameters() {
    let dsd = three_bins(array![[0., 2., 0.]]);
    assert_eq!(dsd.bin_edges(), &[0.25, 0.75, 1.25, 1.75]);
    assert_eq!(dsd.diameter(), &[0.5, 1.0, 1.5]);
}

#[test]
fn diameters_from_bin_edges() {
    let dsd = DropSizeDistribution::new(
        vec![0.],
        array![[1., 1.]],
        vec![1., 2.],
        None,
        None,
        None,
        None,
        Some(vec![0., 1., 3.]),
        None,
    )
    .unwrap();
    assert_eq!(dsd.diameter(), &[0.5, 2.0]);
}

#[test]
fn invalid_inputs() {
    let new = |nd: Array2<f64>, edges: Option<Vec<f64>>, diameter: Option<Vec<f64>>| {
        DropSizeDistribution::new(
            vec![0.],
            nd,
            vec![0.5, 0.5],
            None,
            None,
            None,
            None,
            edges,
            diameter,
        )
    };

    assert_eq!(
        new(array![[1., 1.]], None, None).unwrap_err(),
        DsdError::MissingBinGeometry
    );
    assert_eq!(
        new(array![[1., 1., 1.]], None, Some(vec![1., 2.])).unwrap_err(),
        DsdError::InconsistentInputs
    );
    assert_eq!(
        new(array![[1., 1.]], Some(vec![0., 1.]), None).unwrap_err(),
        DsdError::InconsistentInputs
    );
    assert_eq!(
        new(array![[1., 1.]], Some(vec![0., 1., 1.]), None).unwrap_err(),
        DsdError::BinEdgesNotIncreasing
    );
    assert_eq!(
        new(array![[1., -1.]], None, Some(vec![1., 2.])).unwrap_err(),
        DsdError::NegativeConcentration
    );

    // Time series must match the time axis
    let bad_rain = DropSizeDistribution::new(
        vec![0.],
        array![[1., 1.]],
        vec![0.5, 0.5],
        Some(vec![1., 2.]),
        None,
        None,
        None,
        None,
        Some(vec![1., 2.]),
    );
    assert_eq!(bad_rain.unwrap_err(), DsdError::InconsistentInputs);
}

#[test]
fn zeroth_moment_is_number_concentration() {
    let dsd = three_bins(array![[0., 2., 0.], [1., 2., 3.], [4., 0., 0.5]]);
    let m0 = dsd.moment(0.);
    for (t, row) in dsd.nd().outer_iter().enumerate() {
        let expected: f64 = row.iter().zip(dsd.spread()).map(|(n, s)| n * s).sum();
        assert_relative_eq!(m0[t], expected);
    }
}

#[test]
fn fractional_and_negative_moments() {
    let dsd = three_bins(array![[1., 2., 3.]]);
    let m = dsd.moment(-1.5);
    let expected = 0.5 * (0.5f64.powf(-1.5) + 2. + 3. * 1.5f64.powf(-1.5));
    assert_relative_eq!(m[0], expected, max_relative = 1e-12);

    let m = dsd.moment(3.5);
    let expected = 0.5 * (0.5f64.powf(3.5) + 2. + 3. * 1.5f64.powf(3.5));
    assert_relative_eq!(m[0], expected, max_relative = 1e-12);
}

#[test]
fn velocity_model() {
    let v = terminal_velocity(&[0.5, 1.0, 1.5]);
    assert_eq!(v[0], 0.5);
    assert_relative_eq!(v[1], 9.65 - 10.3 * f64::exp(-0.6));
    assert_relative_eq!(v[1], 3.997, epsilon = 1e-3);
}

#[test]
fn rain_rate_single_bin() {
    let mut dsd = three_bins(array![[0., 2., 0.]]);
    let expected = 0.6 * std::f64::consts::PI * 1e-3 * (9.65 - 10.3 * f64::exp(-0.6)) * 2. * 0.5;
    let rain_rate = dsd.calculate_rain_rate().to_vec();
    assert_relative_eq!(rain_rate[0], expected, max_relative = 1e-12);
    assert_relative_eq!(rain_rate[0], 0.00755, epsilon = 1e-4);
    assert_eq!(dsd.rain_rate(), Some(rain_rate.as_slice()));
}

#[test]
fn rain_rate_replaces_given_values() {
    let mut dsd = DropSizeDistribution::new(
        vec![0.],
        array![[0., 2., 0.]],
        vec![0.5, 0.5, 0.5],
        Some(vec![99.]),
        None,
        None,
        None,
        None,
        Some(vec![0.5, 1.0, 1.5]),
    )
    .unwrap();
    assert_eq!(dsd.rain_rate(), Some([99.].as_slice()));
    dsd.calculate_rain_rate();
    assert!(dsd.rain_rate().unwrap()[0] < 1.);
}

#[test]
fn rain_rate_increases_with_concentration() {
    let mut previous = 0.;
    for n in [0., 0.5, 1., 10., 100.] {
        let dsd = three_bins(array![[3., 1., n]]);
        let r = rain_rate(dsd.nd(), dsd.diameter(), dsd.spread())[0];
        assert!(r >= previous);
        previous = r;
    }
}

#[test]
fn no_timesteps() {
    let mut dsd = three_bins(Array2::zeros((0, 3)));
    assert!(dsd.moment(3.).is_empty());
    assert!(dsd.calculate_rain_rate().is_empty());

    let table = table(RadarBand::X);
    let radar = dsd.calc_radar_parameters_with_table(&table, Some(1)).unwrap();
    assert!(radar.is_empty());
    assert!(radar.zdr.is_empty() && radar.kdp.is_empty() && radar.ai.is_empty());
}

#[test]
fn radar_parameters_start_unset() {
    let dsd = three_bins(array![[0., 2., 0.]]);
    assert!(dsd.radar_parameters().is_none());
}

#[test]
fn empty_timestep_is_not_clamped() {
    let mut dsd = three_bins(array![[0., 0., 0.], [10., 50., 20.]]);
    let table = table(RadarBand::X);
    let radar = dsd.calc_radar_parameters_with_table(&table, Some(2)).unwrap();

    assert_eq!(radar.zh[0], f64::NEG_INFINITY);
    assert!(!radar.zdr[0].is_finite());
    assert_eq!(radar.kdp[0], 0.);
    assert_eq!(radar.ai[0], 0.);

    assert!(radar.zh[1].is_finite());
    assert!(radar.zdr[1] > 0.);
    assert!(radar.kdp[1] > 0.);
    assert!(radar.ai[1] > 0.);
}

#[test]
fn radar_parameters_are_deterministic() {
    let nd = array![[10., 50., 20.], [0., 5., 1.], [100., 3., 0.]];
    let table = table(RadarBand::C);

    let mut first = three_bins(nd.clone());
    let mut second = three_bins(nd);
    let a = first
        .calc_radar_parameters_with_table(&table, Some(1))
        .unwrap()
        .clone();
    let b = second
        .calc_radar_parameters_with_table(&table, Some(3))
        .unwrap()
        .clone();

    for (x, y) in [(&a.zh, &b.zh), (&a.zdr, &b.zdr), (&a.kdp, &b.kdp), (&a.ai, &b.ai)] {
        let x: Vec<u64> = x.iter().map(|v| v.to_bits()).collect();
        let y: Vec<u64> = y.iter().map(|v| v.to_bits()).collect();
        assert_eq!(x, y);
    }

    // Recomputing in place gives the same answer
    let again = first.calc_radar_parameters_with_table(&table, None).unwrap();
    assert_eq!(*again, a);
}

/// Small spheres in the Rayleigh limit have `Z = |K|²/0.93 ∫ N D⁶ dD`.
#[test]
fn rayleigh_reflectivity() {
    let config = ScatteringConfig::default()
        .with_band(RadarBand::S)
        .with_axis_ratio(Arc::new(AxisRatioModel::Spherical))
        .with_canting_std_dev(0.)
        .unwrap()
        .with_num_points(NonZeroUsize::new(4096).unwrap());
    let table = ScatteringTable::build(&config, &RayleighSpheroid).unwrap();

    let mut dsd = DropSizeDistribution::new(
        vec![0.],
        array![[1000.]],
        vec![0.2],
        None,
        None,
        None,
        None,
        Some(vec![0.4, 0.6]),
        None,
    )
    .unwrap();
    let radar = dsd.calc_radar_parameters_with_table(&table, None).unwrap();

    let eps = table.refractive_index().powi(2);
    let k_sqr = ((eps - 1.) / (eps + 2.)).norm_sqr();
    let moment6 = 1000. * (0.6f64.powi(7) - 0.4f64.powi(7)) / 7.;
    let expected = 10. * (k_sqr / crate::scattering::KW_SQR * moment6).log10();

    assert_relative_eq!(radar.zh[0], expected, epsilon = 0.2);
    assert_relative_eq!(radar.zdr[0], 0., epsilon = 1e-9);
    assert_relative_eq!(radar.kdp[0], 0., epsilon = 1e-9);
}

#[test]
fn unsupported_wavelength() {
    let mut dsd = three_bins(array![[0., 2., 0.]]);
    assert_eq!(
        dsd.calc_radar_parameters(30.0).unwrap_err(),
        DsdError::UnsupportedWavelength(30.0)
    );
    assert!(dsd.radar_parameters().is_none());
}

#[test]
fn set_radar_parameters_checks_length() {
    let mut dsd = three_bins(array![[0., 2., 0.]]);
    assert_eq!(
        dsd.set_radar_parameters(RadarParameters::default()),
        Err(DsdError::InconsistentInputs)
    );
}

#[test]
fn binned_psd() {
    let edges = [0., 1., 2.];
    let values = [3., 4.];
    let psd = BinnedPsd::new(&edges, &values).unwrap();
    assert_eq!(psd.value(0.), 0.);
    assert_eq!(psd.value(0.5), 3.);
    assert_eq!(psd.value(1.), 3.);
    assert_eq!(psd.value(1.5), 4.);
    assert_eq!(psd.value(2.), 4.);
    assert_eq!(psd.value(2.5), 0.);
    assert!(BinnedPsd::new(&edges[..2], &values).is_err());
}

#[test]
fn cancelled_run_returns_nothing() {
    let dsd = three_bins(array![[0., 2., 0.], [1., 1., 1.]]);
    let table = table(RadarBand::X);
    let progress = Progress::new();
    progress.cancel();
    let result = radar_parameters(&table, dsd.bin_edges(), dsd.nd(), &progress);
    assert_eq!(result, Err(DsdError::Cancelled));
}

#[test]
fn spread_must_match_edges() {
    let with_spread = |spread: Vec<f64>| {
        DropSizeDistribution::new(
            vec![0.],
            array![[1., 1.]],
            spread,
            None,
            None,
            None,
            None,
            Some(vec![0., 1., 3.]),
            None,
        )
    };
    assert_eq!(
        with_spread(vec![10., 10.]).unwrap_err(),
        DsdError::InconsistentInputs
    );
    assert_eq!(
        with_spread(vec![1., 1.]).unwrap_err(),
        DsdError::InconsistentInputs
    );

    let dsd = with_spread(vec![1., 2. + 1e-9]).unwrap();
    assert_relative_eq!(dsd.moment(0.)[0], 3., max_relative = 1e-6);
}

#[test]
fn column_major_concentrations() {
    let values = vec![10., 50., 20., 0., 5., 1.];
    let row_major = Array2::from_shape_vec((2, 3), values.clone()).unwrap();
    let mut column_major = Array2::<f64>::zeros((2, 3).f());
    column_major.assign(&row_major);
    assert!(!column_major.is_standard_layout());

    let table = table(RadarBand::C);
    let mut expected = three_bins(row_major);
    let mut dsd = three_bins(column_major);
    assert_eq!(dsd.nd(), expected.nd());

    let radar = dsd.calc_radar_parameters_with_table(&table, Some(2)).unwrap().clone();
    let expected = expected.calc_radar_parameters_with_table(&table, Some(2)).unwrap();
    assert_eq!(&radar, expected);

    // Views in any layout work directly too
    let transposed = Array2::from_shape_vec((3, 2), vec![10., 0., 50., 5., 20., 1.]).unwrap();
    let direct = radar_parameters(
        &table,
        dsd.bin_edges(),
        transposed.t(),
        &Progress::new(),
    )
    .unwrap();
    assert_eq!(&direct, expected);
}
