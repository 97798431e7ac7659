//! AUC rules

use approx::assert_relative_eq;
use sorafenib_pbpk::pk::{auc, auc_cumulative, auc_segment, AUCMethod};

#[test]
fn linear_trapezoidal_by_hand() {
    let times = [0.0, 1.0, 2.0, 4.0, 8.0];
    let concs = [10.0, 8.0, 6.0, 4.0, 2.0];
    // 9 + 7 + 10 + 12
    assert_relative_eq!(auc(&times, &concs, AUCMethod::Linear), 38.0, epsilon = 1e-12);
}

#[test]
fn log_down_is_exact_for_exponential_decay() {
    let k = 0.1;
    let times: Vec<f64> = vec![0.0, 1.0, 2.0, 4.0, 8.0, 12.0, 24.0];
    let concs: Vec<f64> = times.iter().map(|t| 100.0 * (-k * t).exp()).collect();
    let exact = 100.0 / k * (1.0 - (-k * 24.0).exp());

    assert_relative_eq!(auc(&times, &concs, AUCMethod::LinUpLogDown), exact, max_relative = 1e-12);
    // The trapezoid overestimates a convex curve
    assert!(auc(&times, &concs, AUCMethod::Linear) > exact);
}

#[test]
fn rising_segments_are_linear_in_both_methods() {
    assert_relative_eq!(
        auc_segment(0.0, 1.0, 2.0, 3.0, AUCMethod::LinUpLogDown),
        auc_segment(0.0, 1.0, 2.0, 3.0, AUCMethod::Linear)
    );
    // A zero end point cannot be log-interpolated
    assert_relative_eq!(auc_segment(0.0, 4.0, 1.0, 0.0, AUCMethod::LinUpLogDown), 2.0);
    assert_eq!(auc_segment(2.0, 1.0, 1.0, 1.0, AUCMethod::Linear), 0.0);
}

#[test]
fn cumulative_ends_at_the_total() {
    let times = [0.0, 0.5, 1.0, 2.0, 4.0, 8.0];
    let concs = [0.0, 5.0, 8.0, 6.0, 3.0, 1.0];
    for method in [AUCMethod::Linear, AUCMethod::LinUpLogDown] {
        let cumulative = auc_cumulative(&times, &concs, method);
        assert_eq!(cumulative.len(), times.len());
        assert_eq!(cumulative[0], 0.0);
        assert!(cumulative.windows(2).all(|w| w[1] >= w[0]));
        assert_relative_eq!(*cumulative.last().unwrap(), auc(&times, &concs, method), epsilon = 1e-12);
    }
}

#[test]
fn trailing_zeros_are_integrated() {
    let times = [0.0, 1.0, 2.0, 3.0];
    let concs = [2.0, 0.0, 0.0, 0.0];
    assert_relative_eq!(auc(&times, &concs, AUCMethod::Linear), 1.0);
    assert!(auc_cumulative(&[], &[], AUCMethod::Linear).is_empty());
}
