//! Pharmacokinetic parameters of simulated concentration curves
//!
//! [`calculate_pk`] derives non-compartmental parameters from one curve and
//! the administered dose:
//!
//! | Parameter | Description |
//! |-----------|-------------|
//! | Cmax / Tmax | First maximum and its time |
//! | Clast / Tlast | Last positive concentration and its time |
//! | AUC | Area under the curve over the whole window |
//! | AUC∞ | AUC + Clast / kel |
//! | kel | Terminal elimination rate constant |
//! | t½ | ln(2) / kel |
//! | CL | Dose / AUC∞ |
//! | Vz | Dose / (kel × AUC∞) |
//!
//! Negative samples (integrator noise around zero) are clamped to zero for
//! Cmax and AUC and never enter the log regression; their count is reported
//! as a warning. When no terminal phase qualifies, the parameters depending on
//! `kel` are `None` and a [`PkWarning::NoTerminalPhase`] says why.

mod auc;
mod error;
mod terminal;

pub use auc::{auc, auc_cumulative, auc_segment, AUCMethod};
pub use error::PkError;
pub use terminal::{terminal_phase, TerminalOptions, TerminalPhase};

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::simulator::Trajectory;
use crate::units::Quantity;

/// A concentration-time curve of one substance in one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcentrationCurve {
    pub id: String,
    pub time: Vec<f64>,
    pub concentration: Vec<f64>,
    pub time_unit: String,
    pub concentration_unit: String,
}

impl ConcentrationCurve {
    /// Build a curve, checking lengths, finiteness and strictly increasing time
    pub fn new(
        id: &str,
        time: Vec<f64>,
        concentration: Vec<f64>,
        time_unit: &str,
        concentration_unit: &str,
    ) -> Result<Self, PkError> {
        if time.len() != concentration.len() {
            return Err(PkError::LengthMismatch {
                time: time.len(),
                concentration: concentration.len(),
            });
        }
        if time.len() < 2 {
            return Err(PkError::TooFewPoints {
                found: time.len(),
                required: 2,
            });
        }
        for (index, (t, c)) in time.iter().zip(&concentration).enumerate() {
            if !t.is_finite() || !c.is_finite() {
                return Err(PkError::NonFinite { index });
            }
        }
        if let Some(index) = time.windows(2).position(|w| w[1] <= w[0]) {
            return Err(PkError::NotIncreasing { index: index + 1 });
        }
        Ok(ConcentrationCurve {
            id: id.to_string(),
            time,
            concentration,
            time_unit: time_unit.to_string(),
            concentration_unit: concentration_unit.to_string(),
        })
    }

    /// Extract a selection from a simulated trajectory
    pub fn from_trajectory(trajectory: &Trajectory, selection: &str) -> Result<Self, PkError> {
        let missing = || PkError::MissingSelection {
            selection: selection.to_string(),
        };
        let values = trajectory.get(selection).ok_or_else(missing)?;
        let unit = trajectory.unit(selection).ok_or_else(missing)?;
        ConcentrationCurve::new(
            selection,
            trajectory.time.clone(),
            values.to_vec(),
            &trajectory.time_unit,
            unit,
        )
    }

    /// Samples within `[start, end]` with time re-zeroed to `start`
    pub fn window(&self, start: f64, end: f64) -> Result<Self, PkError> {
        if !(start.is_finite() && end.is_finite()) || end <= start {
            return Err(PkError::InvalidWindow { start, end });
        }
        let eps = 1e-9 * end.abs().max(1.0);
        let (time, concentration): (Vec<f64>, Vec<f64>) = self
            .time
            .iter()
            .zip(&self.concentration)
            .filter(|(t, _)| **t >= start - eps && **t <= end + eps)
            .map(|(t, c)| ((t - start).max(0.0), *c))
            .unzip();
        ConcentrationCurve::new(
            &self.id,
            time,
            concentration,
            &self.time_unit,
            &self.concentration_unit,
        )
    }
}

/// Options for [`calculate_pk`]
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PkOptions {
    pub auc_method: AUCMethod,
    /// Restrict to `[start, end]` and re-zero time at `start`
    pub window: Option<(f64, f64)>,
    pub terminal: TerminalOptions,
}

impl PkOptions {
    pub fn with_window(mut self, start: f64, end: f64) -> Self {
        self.window = Some((start, end));
        self
    }

    pub fn with_auc_method(mut self, method: AUCMethod) -> Self {
        self.auc_method = method;
        self
    }
}

/// Issues found while extracting PK parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PkWarning {
    /// Negative samples were clamped to zero
    NegativeSamples { count: usize },
    /// kel and everything derived from it is undefined
    NoTerminalPhase { reason: String },
    /// The curve never rises above zero
    NoExposure,
}

impl fmt::Display for PkWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PkWarning::NegativeSamples { count } => {
                write!(f, "{} negative samples clamped to zero", count)
            }
            PkWarning::NoTerminalPhase { reason } => write!(f, "no terminal phase: {}", reason),
            PkWarning::NoExposure => write!(f, "Cmax ≤ 0"),
        }
    }
}

/// PK parameters of one curve, each with its unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PkParameters {
    pub id: String,
    pub dose: Quantity,
    pub cmax: Quantity,
    pub tmax: Quantity,
    pub clast: Quantity,
    pub tlast: Quantity,
    pub auc: Quantity,
    pub auc_inf: Option<Quantity>,
    pub kel: Option<Quantity>,
    pub thalf: Option<Quantity>,
    pub cl: Option<Quantity>,
    pub vz: Option<Quantity>,
    pub terminal: Option<TerminalPhase>,
    pub warnings: Vec<PkWarning>,
}

/// Calculate PK parameters of a curve for the given dose
///
/// # Arguments
///
/// * `curve` - Concentration-time curve
/// * `dose` - Administered amount of the same substance
/// * `options` - Window, AUC method and terminal phase options
pub fn calculate_pk(
    curve: &ConcentrationCurve,
    dose: &Quantity,
    options: &PkOptions,
) -> Result<PkParameters, PkError> {
    let windowed;
    let curve = match options.window {
        Some((start, end)) => {
            windowed = curve.window(start, end)?;
            &windowed
        }
        None => curve,
    };

    let mut warnings = Vec::new();
    let negative = curve.concentration.iter().filter(|&&c| c < 0.0).count();
    if negative > 0 {
        warnings.push(PkWarning::NegativeSamples { count: negative });
    }
    let times = &curve.time;
    let concs: Vec<f64> = curve.concentration.iter().map(|c| c.max(0.0)).collect();

    // First maximum
    let mut tmax_idx = 0;
    for (i, &c) in concs.iter().enumerate() {
        if c > concs[tmax_idx] {
            tmax_idx = i;
        }
    }
    let cmax = concs[tmax_idx];
    let tlast_idx = concs.iter().rposition(|&c| c > 0.0).unwrap_or(concs.len() - 1);
    let clast = concs[tlast_idx];
    let auc_last = auc(times, &concs, options.auc_method);

    let terminal = if cmax <= 0.0 {
        warnings.push(PkWarning::NoExposure);
        None
    } else {
        match terminal_phase(times, &concs, tmax_idx, &options.terminal) {
            Ok(phase) => Some(phase),
            Err(reason) => {
                warn!(curve = %curve.id, %reason, "no terminal phase");
                warnings.push(PkWarning::NoTerminalPhase { reason });
                None
            }
        }
    };

    let c = &curve.concentration_unit;
    let t = &curve.time_unit;
    let d = &dose.unit;
    let auc_unit = format!("{c}*{t}");
    let kel = terminal.as_ref().map(|phase| phase.kel);
    let auc_inf = kel.map(|k| auc_last + clast / k);

    Ok(PkParameters {
        id: curve.id.clone(),
        dose: dose.clone(),
        cmax: Quantity::new(cmax, c.as_str()),
        tmax: Quantity::new(times[tmax_idx], t.as_str()),
        clast: Quantity::new(clast, c.as_str()),
        tlast: Quantity::new(times[tlast_idx], t.as_str()),
        auc: Quantity::new(auc_last, auc_unit.as_str()),
        auc_inf: auc_inf.map(|v| Quantity::new(v, auc_unit.as_str())),
        kel: kel.map(|k| Quantity::new(k, format!("1/{t}"))),
        thalf: kel.map(|k| Quantity::new(std::f64::consts::LN_2 / k, t.as_str())),
        cl: auc_inf.map(|a| Quantity::new(dose.value / a, format!("{d}/({c}*{t})"))),
        vz: kel
            .zip(auc_inf)
            .map(|(k, a)| Quantity::new(dose.value / (k * a), format!("{d}/({c})"))),
        terminal,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn curve(times: &[f64], concs: &[f64]) -> ConcentrationCurve {
        ConcentrationCurve::new("C", times.to_vec(), concs.to_vec(), "min", "mM").unwrap()
    }

    #[test]
    fn window_rezeroes_time() {
        let c = curve(&[0.0, 10.0, 20.0, 30.0, 40.0], &[0.0, 4.0, 3.0, 2.0, 1.0]);
        let w = c.window(20.0, 40.0).unwrap();
        assert_eq!(w.time, vec![0.0, 10.0, 20.0]);
        assert_eq!(w.concentration, vec![3.0, 2.0, 1.0]);
    }

    #[test]
    fn negative_samples_are_clamped_and_reported() {
        let c = curve(&[0.0, 1.0, 2.0, 3.0], &[-1e-12, 2.0, 1.0, 0.5]);
        let pk = calculate_pk(&c, &Quantity::new(1.0, "mmole"), &PkOptions::default()).unwrap();
        assert_relative_eq!(pk.auc.value, 1.0 + 1.5 + 0.75);
        assert!(pk.warnings.contains(&PkWarning::NegativeSamples { count: 1 }));
    }

    #[test]
    fn units_follow_the_curve() {
        let times: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let concs: Vec<f64> = times.iter().map(|t| (-0.2 * t).exp()).collect();
        let pk = calculate_pk(&curve(&times, &concs), &Quantity::new(2.0, "mmole"), &PkOptions::default())
            .unwrap();
        assert_eq!(pk.auc.unit, "mM*min");
        assert_eq!(pk.kel.unwrap().unit, "1/min");
        assert_eq!(pk.cl.unwrap().unit, "mmole/(mM*min)");
        assert_eq!(pk.vz.unwrap().unit, "mmole/(mM)");
    }

    #[test]
    fn flat_zero_curve() {
        let c = curve(&[0.0, 1.0, 2.0], &[0.0, 0.0, 0.0]);
        let pk = calculate_pk(&c, &Quantity::new(1.0, "mmole"), &PkOptions::default()).unwrap();
        assert_eq!(pk.cmax.value, 0.0);
        assert!(pk.kel.is_none());
        assert!(pk.warnings.contains(&PkWarning::NoExposure));
    }

    #[test]
    fn invalid_curves_are_rejected() {
        assert!(matches!(
            ConcentrationCurve::new("C", vec![0.0, 1.0], vec![1.0], "min", "mM"),
            Err(PkError::LengthMismatch { .. })
        ));
        assert!(matches!(
            ConcentrationCurve::new("C", vec![0.0, 1.0, 1.0], vec![1.0, 1.0, 1.0], "min", "mM"),
            Err(PkError::NotIncreasing { index: 2 })
        ));
    }
}
