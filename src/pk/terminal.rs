//! Terminal phase selection and log-linear regression
//!
//! Curves with enterohepatic recirculation can show a second peak late in the
//! profile, so "the last N points" may straddle it. The terminal phase is
//! taken from the longest trailing run of strictly decreasing positive
//! concentrations after Tmax:
//!
//! 1. **Run**: walk back from Tlast while each earlier sample is positive,
//!    larger than its successor and after Tmax. Fewer than `min_points`
//!    samples means there is no terminal phase.
//! 2. **Windows**: regress ln(C) on t for every tail window of the run with at
//!    least `min_points` samples. Windows with a non-negative slope or
//!    R² < `min_r_squared` are discarded.
//! 3. **Best fit**: highest adjusted R²; within `r_squared_tolerance` the
//!    window with more points wins.

use serde::{Deserialize, Serialize};

/// Options for terminal phase selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalOptions {
    /// Minimum number of points in the regression (default: 3)
    pub min_points: usize,
    /// Minimum R² to accept (default: 0.9)
    pub min_r_squared: f64,
    /// Tolerance for comparing adjusted R² values (default: 1e-4)
    pub r_squared_tolerance: f64,
}

impl Default for TerminalOptions {
    fn default() -> Self {
        Self {
            min_points: 3,
            min_r_squared: 0.9,
            r_squared_tolerance: 1e-4,
        }
    }
}

/// Selected terminal phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalPhase {
    /// Terminal elimination rate constant: -slope
    pub kel: f64,
    /// Intercept of ln(C) vs time
    pub intercept: f64,
    pub r_squared: f64,
    pub adj_r_squared: f64,
    pub n_points: usize,
    /// First time point used in regression
    pub time_first: f64,
    /// Last time point used in regression
    pub time_last: f64,
}

impl TerminalPhase {
    pub fn half_life(&self) -> f64 {
        std::f64::consts::LN_2 / self.kel
    }
}

/// Select the terminal phase of a curve
///
/// # Arguments
///
/// * `times` - Sample times, strictly increasing
/// * `concentrations` - Concentrations, same length
/// * `tmax_idx` - Index of the first maximum
/// * `options` - Selection options
///
/// # Returns
///
/// The best regression, or the reason why none qualifies.
pub fn terminal_phase(
    times: &[f64],
    concentrations: &[f64],
    tmax_idx: usize,
    options: &TerminalOptions,
) -> Result<TerminalPhase, String> {
    let min_points = options.min_points.max(3);
    let Some(tlast_idx) = concentrations.iter().rposition(|&c| c > 0.0) else {
        return Err("no positive concentration".to_string());
    };
    if tlast_idx <= tmax_idx {
        return Err("no samples after Tmax".to_string());
    }

    let mut first = tlast_idx;
    while first > tmax_idx + 1 && concentrations[first - 1] > concentrations[first] {
        first -= 1;
    }
    let run = tlast_idx - first + 1;
    if run < min_points {
        if run == 1 && concentrations[tlast_idx] >= concentrations[tlast_idx - 1] {
            return Err("concentration is not decreasing at the end of the curve".to_string());
        }
        return Err(format!(
            "trailing decreasing run has {} points, {} required",
            run, min_points
        ));
    }

    let mut best: Option<TerminalPhase> = None;
    for n_points in min_points..=run {
        let start = tlast_idx + 1 - n_points;
        let x = &times[start..=tlast_idx];
        let y: Vec<f64> = concentrations[start..=tlast_idx]
            .iter()
            .map(|c| c.ln())
            .collect();

        let Some((slope, intercept, r_squared)) = linear_regression(x, &y) else {
            continue;
        };
        if slope >= 0.0 || r_squared < options.min_r_squared {
            continue;
        }

        let n = n_points as f64;
        let candidate = TerminalPhase {
            kel: -slope,
            intercept,
            r_squared,
            adj_r_squared: 1.0 - (1.0 - r_squared) * (n - 1.0) / (n - 2.0),
            n_points,
            time_first: x[0],
            time_last: x[x.len() - 1],
        };

        // Priority: highest adj R² within tolerance, then most points
        match &best {
            None => best = Some(candidate),
            Some(current) => {
                let r_diff = candidate.adj_r_squared - current.adj_r_squared;
                if r_diff > options.r_squared_tolerance
                    || (r_diff >= -options.r_squared_tolerance && candidate.n_points > current.n_points)
                {
                    best = Some(candidate);
                }
            }
        }
    }

    best.ok_or_else(|| {
        format!(
            "no log-linear tail window with R² >= {}",
            options.min_r_squared
        )
    })
}

/// Simple linear regression: y = a + b*x
///
/// Returns (slope, intercept, r_squared)
pub(crate) fn linear_regression(x: &[f64], y: &[f64]) -> Option<(f64, f64, f64)> {
    let n = x.len();
    if n < 2 || n != y.len() {
        return None;
    }
    let n_f = n as f64;
    let x_mean = x.iter().sum::<f64>() / n_f;
    let y_mean = y.iter().sum::<f64>() / n_f;

    let mut ss_xy = 0.0;
    let mut ss_xx = 0.0;
    let mut ss_yy = 0.0;
    for (xi, yi) in x.iter().zip(y) {
        let dx = xi - x_mean;
        let dy = yi - y_mean;
        ss_xy += dx * dy;
        ss_xx += dx * dx;
        ss_yy += dy * dy;
    }
    if ss_xx.abs() < 1e-15 {
        return None;
    }

    let slope = ss_xy / ss_xx;
    let intercept = y_mean - slope * x_mean;
    let r_squared = if ss_yy.abs() < 1e-15 {
        1.0
    } else {
        (ss_xy * ss_xy) / (ss_xx * ss_yy)
    };
    Some((slope, intercept, r_squared))
}
