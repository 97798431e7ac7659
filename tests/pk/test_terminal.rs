//! Terminal phase selection

use approx::assert_relative_eq;
use sorafenib_pbpk::pk::{calculate_pk, terminal_phase, ConcentrationCurve, PkOptions, TerminalOptions};
use sorafenib_pbpk::Quantity;

/// Fast decline, a secondary peak at t = 22, then a slower log-linear tail
fn recirculation() -> (Vec<f64>, Vec<f64>) {
    let time: Vec<f64> = (0..=60).map(|i| i as f64).collect();
    let concentration = time
        .iter()
        .map(|&t| match t as usize {
            0..=20 => (-0.1 * t).exp(),
            21 => 0.3,
            _ => 0.5 * (-0.03 * (t - 22.0)).exp(),
        })
        .collect();
    (time, concentration)
}

#[test]
fn secondary_peak_starts_the_terminal_phase() {
    let (time, concentration) = recirculation();
    let phase = terminal_phase(&time, &concentration, 0, &TerminalOptions::default()).unwrap();

    assert_relative_eq!(phase.kel, 0.03, max_relative = 1e-9);
    assert_eq!(phase.time_first, 22.0);
    assert_eq!(phase.time_last, 60.0);
    assert_eq!(phase.n_points, 39);
}

#[test]
fn recirculation_keeps_the_first_maximum() {
    let (time, concentration) = recirculation();
    let curve = ConcentrationCurve::new("C", time, concentration, "min", "mM").unwrap();
    let pk = calculate_pk(&curve, &Quantity::new(1.0, "mmole"), &PkOptions::default()).unwrap();
    assert_eq!(pk.tmax.value, 0.0);
    assert_relative_eq!(pk.cmax.value, 1.0);
    assert_relative_eq!(pk.thalf.unwrap().value, std::f64::consts::LN_2 / 0.03, max_relative = 1e-9);
}

#[test]
fn short_tail_is_rejected() {
    let time = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0];
    let concentration = [0.0, 4.0, 1.0, 2.0, 1.0, 0.5];
    let options = TerminalOptions::default();
    // Run from index 3 covers three samples
    assert!(terminal_phase(&time, &concentration, 1, &options).is_ok());

    let strict = TerminalOptions {
        min_points: 4,
        ..TerminalOptions::default()
    };
    let reason = terminal_phase(&time, &concentration, 1, &strict).unwrap_err();
    assert!(reason.contains("3 points"), "{}", reason);
}

#[test]
fn trailing_zeros_are_skipped() {
    let time: Vec<f64> = (0..10).map(|i| i as f64).collect();
    let mut concentration: Vec<f64> = time.iter().map(|t| 8.0 * (-0.2 * t).exp()).collect();
    concentration[8] = 0.0;
    concentration[9] = 0.0;
    let phase = terminal_phase(&time, &concentration, 0, &TerminalOptions::default()).unwrap();
    assert_eq!(phase.time_last, 7.0);
    assert_relative_eq!(phase.kel, 0.2, max_relative = 1e-9);
}

#[test]
fn peak_at_the_end_has_no_tail() {
    let time = [0.0, 1.0, 2.0];
    let concentration = [0.0, 1.0, 2.0];
    assert!(terminal_phase(&time, &concentration, 2, &TerminalOptions::default()).is_err());
    assert!(terminal_phase(&time, &[0.0; 3], 0, &TerminalOptions::default()).is_err());
}
