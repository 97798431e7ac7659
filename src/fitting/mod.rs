//! Objective functions for parameter fitting
//!
//! A [`FitProblem`] pairs observed curves with simulations of the whole-body
//! model. Given a candidate vector of [`FitParameter`] values it returns
//! weighted residuals or the least-squares cost; the optimizer driving the
//! candidates lives outside this crate. Observed data is reconciled with the
//! simulated units first, including mass to amount conversion by molar mass.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::simulator::{SimulationError, Simulator, TimecourseSim};
use crate::units::{UnitCatalogue, UnitError};

/// Coefficient of variation assumed for observations without a standard deviation
pub const DEFAULT_CV: f64 = 0.5;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    #[error(transparent)]
    Unit(#[from] UnitError),

    #[error("Unknown fit parameter '{pid}'")]
    UnknownParameter { pid: String },

    #[error("Invalid bounds for '{pid}': [{lower}, {upper}] does not contain {start}")]
    InvalidBounds {
        pid: String,
        lower: f64,
        upper: f64,
        start: f64,
    },

    #[error("Value {value} for '{pid}' is outside [{lower}, {upper}]")]
    OutOfBounds {
        pid: String,
        value: f64,
        lower: f64,
        upper: f64,
    },

    #[error("Expected {expected} parameter values, got {found}")]
    WrongLength { expected: usize, found: usize },

    #[error("Observed curve '{id}' is invalid: {message}")]
    InvalidCurve { id: String, message: String },

    #[error("Cannot express '{id}' in {to}: {from} is neither the same quantity nor a mass/amount pair")]
    Incompatible { id: String, from: String, to: String },

    #[error("Simulation for mapping '{mapping}' failed: {source}")]
    Simulation {
        mapping: String,
        source: SimulationError,
    },

    #[error("Mapping '{mapping}' has no simulated '{observable}' at t = {time}")]
    NotSimulated {
        mapping: String,
        observable: String,
        time: f64,
    },
}

// ============================================================================
// Parameters
// ============================================================================

/// A parameter to fit, with start value and bounds in `unit`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitParameter {
    pub pid: String,
    pub start_value: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub unit: String,
}

impl FitParameter {
    pub fn new(pid: &str, start_value: f64, lower_bound: f64, upper_bound: f64, unit: &str) -> Self {
        FitParameter {
            pid: pid.to_string(),
            start_value,
            lower_bound,
            upper_bound,
            unit: unit.to_string(),
        }
    }

    fn check(&self) -> Result<(), FitError> {
        let ordered = self.lower_bound <= self.start_value && self.start_value <= self.upper_bound;
        if !ordered || !self.lower_bound.is_finite() || !self.upper_bound.is_finite() {
            return Err(FitError::InvalidBounds {
                pid: self.pid.clone(),
                lower: self.lower_bound,
                upper: self.upper_bound,
                start: self.start_value,
            });
        }
        Ok(())
    }

    fn contains(&self, value: f64) -> bool {
        value >= self.lower_bound && value <= self.upper_bound
    }
}

/// Dissolution, absorption, hepatic transport and metabolism, renal excretion
pub fn default_parameters() -> Vec<FitParameter> {
    vec![
        FitParameter::new("Ka_dis_sor", 2.0, 0.1, 10.0, "1/hr"),
        FitParameter::new("GU__F_sor_abs", 0.5, 0.4, 0.6, "dimensionless"),
        FitParameter::new("GU__SORABS_Vmax", 0.2, 1e-4, 1e2, "1/min"),
        FitParameter::new("KI__SGEX_k", 0.01, 1e-3, 1.0, "1/min"),
        FitParameter::new("LI__SORIM_Vmax", 1.0, 1e-2, 10.0, "mmole/min/l"),
        FitParameter::new("LI__M2EX_Vmax", 1.0, 1e-2, 10.0, "mmole/min/l"),
        FitParameter::new("LI__SGEX_Vmax", 1.0, 1e-2, 10.0, "mmole/min/l"),
        FitParameter::new("LI__SOR2M2_Vmax", 0.1, 1e-2, 1.0, "mmole/min/l"),
        FitParameter::new("LI__M2GLU_Vmax", 0.1, 1e-2, 1.0, "mmole/min/l"),
    ]
}

// ============================================================================
// Observed data
// ============================================================================

/// A reference curve, usually a study mean with its spread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedCurve {
    pub id: String,
    pub time: Vec<f64>,
    pub value: Vec<f64>,
    pub sd: Option<Vec<f64>>,
    /// Number of subjects behind each point
    pub count: Option<usize>,
    pub time_unit: String,
    pub value_unit: String,
}

impl ObservedCurve {
    pub fn new(
        id: &str,
        time: Vec<f64>,
        value: Vec<f64>,
        time_unit: &str,
        value_unit: &str,
    ) -> Result<Self, FitError> {
        let invalid = |message: String| FitError::InvalidCurve {
            id: id.to_string(),
            message,
        };
        if time.is_empty() {
            return Err(invalid("no observations".to_string()));
        }
        if time.len() != value.len() {
            return Err(invalid(format!(
                "{} times but {} values",
                time.len(),
                value.len()
            )));
        }
        if let Some(i) = time
            .iter()
            .zip(&value)
            .position(|(t, v)| !t.is_finite() || !v.is_finite())
        {
            return Err(invalid(format!("non-finite observation at index {}", i)));
        }
        Ok(ObservedCurve {
            id: id.to_string(),
            time,
            value,
            sd: None,
            count: None,
            time_unit: time_unit.to_string(),
            value_unit: value_unit.to_string(),
        })
    }

    pub fn with_sd(mut self, sd: Vec<f64>) -> Result<Self, FitError> {
        if sd.len() != self.value.len() {
            return Err(FitError::InvalidCurve {
                id: self.id.clone(),
                message: format!("{} standard deviations for {} values", sd.len(), self.value.len()),
            });
        }
        self.sd = Some(sd);
        Ok(self)
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Express the curve in `time_unit` and `value_unit`
    ///
    /// Values of the same kind are converted directly. A mass-based value
    /// (e.g. mg/l) becomes amount-based (mmole/l) by dividing by `molar_mass`
    /// in g/mole, and the other way round by multiplying.
    pub fn to_units(
        &self,
        units: &UnitCatalogue,
        time_unit: &str,
        value_unit: &str,
        molar_mass: Option<f64>,
    ) -> Result<Self, FitError> {
        let time_factor = units.convert(1.0, &self.time_unit, time_unit)?;
        let value_factor = self.value_factor(units, value_unit, molar_mass)?;
        let scale = |v: &Vec<f64>, f: f64| v.iter().map(|x| x * f).collect::<Vec<f64>>();
        Ok(ObservedCurve {
            id: self.id.clone(),
            time: scale(&self.time, time_factor),
            value: scale(&self.value, value_factor),
            sd: self.sd.as_ref().map(|sd| scale(sd, value_factor)),
            count: self.count,
            time_unit: time_unit.to_string(),
            value_unit: value_unit.to_string(),
        })
    }

    fn value_factor(
        &self,
        units: &UnitCatalogue,
        to: &str,
        molar_mass: Option<f64>,
    ) -> Result<f64, FitError> {
        let from = &self.value_unit;
        match units.convert(1.0, from, to) {
            Ok(factor) => return Ok(factor),
            Err(UnitError::Incompatible { .. }) => {}
            Err(err) => return Err(err.into()),
        }
        if let Some(mr) = molar_mass {
            let per_mass = format!("({})/(g_per_mole)", from);
            if let Ok(factor) = units.convert(1.0 / mr, &per_mass, to) {
                return Ok(factor);
            }
            let times_mass = format!("({})*(g_per_mole)", from);
            if let Ok(factor) = units.convert(mr, &times_mass, to) {
                return Ok(factor);
            }
        }
        Err(FitError::Incompatible {
            id: self.id.clone(),
            from: from.clone(),
            to: to.to_string(),
        })
    }

    /// Weight of each point: the reciprocal standard deviation
    ///
    /// Missing or non-positive deviations fall back to [`DEFAULT_CV`] times the
    /// observation, and to 1 when the observation is zero.
    fn weights(&self) -> Vec<f64> {
        (0..self.len())
            .map(|i| {
                let sd = self
                    .sd
                    .as_ref()
                    .map(|sd| sd[i])
                    .filter(|sd| *sd > 0.0)
                    .unwrap_or(DEFAULT_CV * self.value[i].abs());
                if sd > 0.0 {
                    1.0 / sd
                } else {
                    1.0
                }
            })
            .collect()
    }
}

// ============================================================================
// Problem
// ============================================================================

/// Pairing of an observed curve with the simulation that should reproduce it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitMapping {
    pub id: String,
    pub reference: ObservedCurve,
    pub simulation: TimecourseSim,
    /// Selection compared with the reference, e.g. `[Cve_sor]`
    pub observable: String,
    /// Molar mass in g/mole for mass-based references
    pub molar_mass: Option<f64>,
    pub weight: f64,
}

impl FitMapping {
    pub fn new(id: &str, reference: ObservedCurve, simulation: TimecourseSim, observable: &str) -> Self {
        FitMapping {
            id: id.to_string(),
            reference,
            simulation,
            observable: observable.to_string(),
            molar_mass: None,
            weight: 1.0,
        }
    }

    pub fn molar_mass(mut self, mr: f64) -> Self {
        self.molar_mass = Some(mr);
        self
    }

    pub fn weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

/// Residual objective over a set of mappings
pub struct FitProblem<'a> {
    simulator: &'a Simulator,
    units: &'a UnitCatalogue,
    parameters: Vec<FitParameter>,
    mappings: Vec<FitMapping>,
}

impl<'a> FitProblem<'a> {
    /// Check that every parameter exists in the model with bounds around its start
    pub fn new(
        simulator: &'a Simulator,
        units: &'a UnitCatalogue,
        parameters: Vec<FitParameter>,
        mappings: Vec<FitMapping>,
    ) -> Result<Self, FitError> {
        for parameter in &parameters {
            parameter.check()?;
            let unit = simulator
                .unit(&parameter.pid)
                .ok_or_else(|| FitError::UnknownParameter {
                    pid: parameter.pid.clone(),
                })?;
            units.convert(1.0, &parameter.unit, unit)?;
        }
        debug!(
            parameters = parameters.len(),
            mappings = mappings.len(),
            "created fit problem"
        );
        Ok(FitProblem {
            simulator,
            units,
            parameters,
            mappings,
        })
    }

    pub fn parameters(&self) -> &[FitParameter] {
        &self.parameters
    }

    pub fn mappings(&self) -> &[FitMapping] {
        &self.mappings
    }

    pub fn start(&self) -> Vec<f64> {
        self.parameters.iter().map(|p| p.start_value).collect()
    }

    /// Model changes for a candidate, converted to the declared parameter units
    pub fn changes(&self, x: &[f64]) -> Result<BTreeMap<String, f64>, FitError> {
        if x.len() != self.parameters.len() {
            return Err(FitError::WrongLength {
                expected: self.parameters.len(),
                found: x.len(),
            });
        }
        let mut changes = BTreeMap::new();
        for (parameter, &value) in self.parameters.iter().zip(x) {
            if !parameter.contains(value) {
                return Err(FitError::OutOfBounds {
                    pid: parameter.pid.clone(),
                    value,
                    lower: parameter.lower_bound,
                    upper: parameter.upper_bound,
                });
            }
            let unit = self
                .simulator
                .unit(&parameter.pid)
                .ok_or_else(|| FitError::UnknownParameter {
                    pid: parameter.pid.clone(),
                })?;
            changes.insert(
                parameter.pid.clone(),
                self.units.convert(value, &parameter.unit, unit)?,
            );
        }
        Ok(changes)
    }

    /// Weighted residuals of every mapping, concatenated in mapping order
    ///
    /// The residual of an observation is `(sim - obs) / sd * sqrt(count)`
    /// scaled by the mapping weight, with the simulation interpolated
    /// linearly at the observed time.
    pub fn residuals(&self, x: &[f64]) -> Result<Vec<f64>, FitError> {
        let changes = self.changes(x)?;
        let per_mapping: Vec<Vec<f64>> = self
            .mappings
            .par_iter()
            .map(|mapping| self.mapping_residuals(mapping, &changes))
            .collect::<Result<_, _>>()?;
        Ok(per_mapping.into_iter().flatten().collect())
    }

    /// Half the sum of squared residuals
    pub fn cost(&self, x: &[f64]) -> Result<f64, FitError> {
        Ok(0.5 * self.residuals(x)?.iter().map(|r| r * r).sum::<f64>())
    }

    fn mapping_residuals(
        &self,
        mapping: &FitMapping,
        changes: &BTreeMap<String, f64>,
    ) -> Result<Vec<f64>, FitError> {
        let mut simulation = mapping.simulation.clone();
        if let Some(first) = simulation.timecourses.first_mut() {
            first.changes.extend(changes.iter().map(|(k, v)| (k.clone(), *v)));
        }
        simulation.selections = Some(vec![mapping.observable.clone()]);
        let trajectory = self
            .simulator
            .timecourse(&simulation)
            .map_err(|source| FitError::Simulation {
                mapping: mapping.id.clone(),
                source,
            })?;

        let unit = trajectory.unit(&mapping.observable).unwrap_or_default().to_string();
        let reference =
            mapping
                .reference
                .to_units(self.units, &trajectory.time_unit, &unit, mapping.molar_mass)?;
        let scale = mapping.weight * (reference.count.unwrap_or(1) as f64).sqrt();

        reference
            .time
            .iter()
            .zip(&reference.value)
            .zip(reference.weights())
            .map(|((&t, &obs), w)| {
                let sim = trajectory
                    .interpolate(&mapping.observable, t)
                    .ok_or_else(|| FitError::NotSimulated {
                        mapping: mapping.id.clone(),
                        observable: mapping.observable.clone(),
                        time: t,
                    })?;
                Ok((sim - obs) * w * scale)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn mass_concentrations_become_molar() {
        let units = UnitCatalogue::standard();
        let curve = ObservedCurve::new("sor", vec![1.0, 2.0], vec![4.64826, 9.29652], "hr", "mg/l")
            .unwrap()
            .with_sd(vec![0.464826, 0.929652])
            .unwrap();
        let molar = curve.to_units(&units, "min", "mM", Some(464.826)).unwrap();
        assert_relative_eq!(molar.time[1], 120.0);
        assert_relative_eq!(molar.value[0], 0.01, epsilon = 1e-12);
        assert_relative_eq!(molar.sd.unwrap()[1], 0.002, epsilon = 1e-12);
    }

    #[test]
    fn molar_to_mass_uses_the_molar_mass() {
        let units = UnitCatalogue::standard();
        let curve = ObservedCurve::new("sor", vec![0.0], vec![2.0], "min", "µM").unwrap();
        let mass = curve.to_units(&units, "min", "mg/l", Some(500.0)).unwrap();
        assert_relative_eq!(mass.value[0], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn incompatible_without_molar_mass() {
        let units = UnitCatalogue::standard();
        let curve = ObservedCurve::new("sor", vec![0.0], vec![2.0], "min", "mg/l").unwrap();
        assert!(matches!(
            curve.to_units(&units, "min", "mM", None),
            Err(FitError::Incompatible { .. })
        ));
    }

    #[test]
    fn weights_fall_back_to_the_default_cv() {
        let curve = ObservedCurve::new("c", vec![0.0, 1.0, 2.0], vec![4.0, 2.0, 0.0], "min", "mM")
            .unwrap()
            .with_sd(vec![0.5, 0.0, 0.0])
            .unwrap();
        assert_eq!(curve.weights(), vec![2.0, 1.0, 1.0]);
    }

    #[test]
    fn default_parameters_start_inside_their_bounds() {
        for parameter in default_parameters() {
            assert!(parameter.check().is_ok(), "{}", parameter.pid);
        }
    }
}
