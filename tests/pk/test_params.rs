//! Parameters derived by `calculate_pk`

use approx::assert_relative_eq;
use sorafenib_pbpk::pk::{calculate_pk, AUCMethod, ConcentrationCurve, PkError, PkOptions, PkWarning};
use sorafenib_pbpk::Quantity;

/// C(t) = dose / volume * exp(-k t), sampled every minute
fn bolus(dose: f64, volume: f64, k: f64, minutes: usize) -> ConcentrationCurve {
    let time: Vec<f64> = (0..=minutes).map(|i| i as f64).collect();
    let concentration = time.iter().map(|t| dose / volume * (-k * t).exp()).collect();
    ConcentrationCurve::new("[Cve_sor]", time, concentration, "min", "mM").unwrap()
}

#[test]
fn mono_exponential_bolus() {
    let (dose, volume, k) = (2.0, 4.0, 0.05);
    let curve = bolus(dose, volume, k, 48);
    let options = PkOptions::default().with_auc_method(AUCMethod::LinUpLogDown);
    let pk = calculate_pk(&curve, &Quantity::new(dose, "mmole"), &options).unwrap();

    assert_relative_eq!(pk.cmax.value, dose / volume);
    assert_eq!(pk.tmax.value, 0.0);
    assert_relative_eq!(pk.kel.as_ref().unwrap().value, k, max_relative = 1e-9);
    assert_relative_eq!(pk.thalf.as_ref().unwrap().value, std::f64::consts::LN_2 / k, max_relative = 1e-9);
    assert_relative_eq!(pk.auc_inf.as_ref().unwrap().value, dose / volume / k, max_relative = 1e-9);
    assert_relative_eq!(pk.cl.as_ref().unwrap().value, volume * k, max_relative = 1e-9);
    assert_relative_eq!(pk.vz.as_ref().unwrap().value, volume, max_relative = 1e-9);
    assert!(pk.warnings.is_empty());

    let terminal = pk.terminal.unwrap();
    // Every sample after Tmax lies on the line
    assert_eq!(terminal.n_points, 48);
    assert_relative_eq!(terminal.r_squared, 1.0, epsilon = 1e-12);
}

#[test]
fn linear_trapezoid_is_close_on_dense_curves() {
    let (dose, volume, k) = (2.0, 4.0, 0.05);
    let pk = calculate_pk(&bolus(dose, volume, k, 200), &Quantity::new(dose, "mmole"), &PkOptions::default())
        .unwrap();
    assert_relative_eq!(pk.cl.unwrap().value, volume * k, max_relative = 1e-3);
}

#[test]
fn oral_profile_peaks_after_zero() {
    // Bateman function with ka = 0.2, k = 0.02
    let (ka, k) = (0.2_f64, 0.02_f64);
    let time: Vec<f64> = (0..=600).map(|i| i as f64).collect();
    let concentration: Vec<f64> = time
        .iter()
        .map(|t| ka / (ka - k) * ((-k * t).exp() - (-ka * t).exp()))
        .collect();
    let curve = ConcentrationCurve::new("C", time, concentration, "min", "mM").unwrap();
    let pk = calculate_pk(&curve, &Quantity::new(1.0, "mmole"), &PkOptions::default()).unwrap();

    let tmax = (ka / k).ln() / (ka - k);
    assert!((pk.tmax.value - tmax).abs() <= 1.0);
    assert_relative_eq!(pk.kel.unwrap().value, k, max_relative = 1e-3);
    assert_eq!(pk.tlast.value, 600.0);
}

#[test]
fn window_restricts_and_rezeroes() {
    // Three identical days; only the last one is analysed
    let day = 1440.0;
    let time: Vec<f64> = (0..=3 * 144).map(|i| i as f64 * 10.0).collect();
    let concentration: Vec<f64> = time
        .iter()
        .map(|t| {
            let local = t % day;
            1.0 + (-0.005 * local).exp() - (-0.05 * local).exp()
        })
        .collect();
    let curve = ConcentrationCurve::new("C", time, concentration, "min", "mM").unwrap();

    let options = PkOptions::default().with_window(2.0 * day, 3.0 * day);
    let pk = calculate_pk(&curve, &Quantity::new(1.0, "mmole"), &options).unwrap();
    let first_day = calculate_pk(
        &curve.window(0.0, day).unwrap(),
        &Quantity::new(1.0, "mmole"),
        &PkOptions::default(),
    )
    .unwrap();

    assert_eq!(pk.tmax.value, first_day.tmax.value);
    assert!(pk.tmax.value < day);
    assert_eq!(pk.tlast.value, day);
}

#[test]
fn invalid_window_is_an_error() {
    let curve = bolus(1.0, 1.0, 0.1, 10);
    let options = PkOptions::default().with_window(5.0, 5.0);
    assert!(matches!(
        calculate_pk(&curve, &Quantity::new(1.0, "mmole"), &options),
        Err(PkError::InvalidWindow { .. })
    ));
    // A window past the last sample
    let options = PkOptions::default().with_window(100.0, 200.0);
    assert!(matches!(
        calculate_pk(&curve, &Quantity::new(1.0, "mmole"), &options),
        Err(PkError::TooFewPoints { .. })
    ));
}

#[test]
fn rising_curve_has_no_terminal_phase() {
    let time: Vec<f64> = (0..10).map(|i| i as f64).collect();
    let concentration: Vec<f64> = time.iter().map(|t| 1.0 - (-0.1 * t).exp()).collect();
    let curve = ConcentrationCurve::new("C", time, concentration, "min", "mM").unwrap();
    let pk = calculate_pk(&curve, &Quantity::new(1.0, "mmole"), &PkOptions::default()).unwrap();

    assert_eq!(pk.tmax.value, 9.0);
    assert!(pk.kel.is_none() && pk.auc_inf.is_none() && pk.cl.is_none() && pk.vz.is_none());
    assert!(pk.auc.value > 0.0);
    assert!(matches!(pk.warnings.as_slice(), [PkWarning::NoTerminalPhase { .. }]));
}

#[test]
fn parameters_serialize_with_units() {
    let pk = calculate_pk(&bolus(1.0, 2.0, 0.1, 30), &Quantity::new(1.0, "mmole"), &PkOptions::default())
        .unwrap();
    let json = serde_json::to_value(&pk).unwrap();
    assert_eq!(json["auc"]["unit"], "mM*min");
    assert_eq!(json["tmax"]["unit"], "min");
    assert_eq!(json["id"], "[Cve_sor]");
}
