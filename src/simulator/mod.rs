//! Deterministic simulation of flat models
//!
//! [`Simulator::new`] validates a [`ModelDefinition`] and compiles it into an
//! ODE system: every identifier gets a slot in a value table, rules, species
//! values and reaction rates become an evaluation program in dependency order,
//! and the state vector holds species amounts followed by rate-rule targets.
//!
//! A [`TimecourseSim`] is a sequence of [`Timecourse`] segments. Each segment
//! applies its changes at its boundary and continues from the end state of the
//! previous one, which is how multi-dose regimens are expressed.

mod compile;
pub mod scan;
pub mod solver;

pub use scan::{logspace, ScanDimension, ScanResult, ScanSim};
pub use solver::{integrate, OdeSystem, SolverOptions};

use std::collections::BTreeMap;
use std::path::Path;

use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::error::PbpkError;
use crate::model::{ModelDefinition, ModelError};
use crate::units::UnitCatalogue;
use compile::{CompiledModel, Rhs, Slot};

/// Errors raised while setting up or integrating a simulation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulationError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("Unknown symbol '{id}'")]
    UnknownSymbol { id: String },

    #[error("'{id}' cannot be changed: {reason}")]
    NotSettable { id: String, reason: String },

    #[error("Value {value} for '{id}' is outside [{lower}, {upper}]")]
    OutOfBounds {
        id: String,
        value: f64,
        lower: f64,
        upper: f64,
    },

    #[error("Value for '{id}' is not finite: {value}")]
    NonFiniteValue { id: String, value: f64 },

    #[error("Invalid timecourse: {message}")]
    InvalidTimecourse { message: String },

    #[error("Unknown selection '{selection}'")]
    UnknownSelection { selection: String },

    #[error("Step size too small at t = {time}")]
    StepSizeTooSmall { time: f64 },

    #[error("Exceeded {steps} steps at t = {time}")]
    MaxSteps { time: f64, steps: usize },

    #[error("Solver failed at t = {time}: {message}")]
    Solver { time: f64, message: String },
}

// ============================================================================
// Timecourses
// ============================================================================

/// One integration segment with changes applied at its start
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timecourse {
    pub start: f64,
    pub end: f64,
    /// Number of output intervals; the segment yields `steps + 1` points
    pub steps: usize,
    #[serde(default)]
    pub changes: BTreeMap<String, f64>,
}

impl Timecourse {
    pub fn new(start: f64, end: f64, steps: usize) -> Self {
        Timecourse {
            start,
            end,
            steps,
            changes: BTreeMap::new(),
        }
    }

    pub fn change(mut self, id: &str, value: f64) -> Self {
        self.changes.insert(id.to_string(), value);
        self
    }

    /// Add every entry of `changes`, overriding existing ones
    pub fn with_changes(mut self, changes: &BTreeMap<String, f64>) -> Self {
        self.changes
            .extend(changes.iter().map(|(k, v)| (k.clone(), *v)));
        self
    }

    fn check(&self) -> Result<(), SimulationError> {
        if !(self.start.is_finite() && self.end.is_finite()) || self.end <= self.start {
            return Err(SimulationError::InvalidTimecourse {
                message: format!("end {} must be after start {}", self.end, self.start),
            });
        }
        if self.steps == 0 {
            return Err(SimulationError::InvalidTimecourse {
                message: "at least one step is required".to_string(),
            });
        }
        Ok(())
    }
}

/// A sequence of segments and the variables to record
///
/// Segment `k + 1` starts where segment `k` ended, in state and in time: its
/// local `[start, end]` is shifted so that it begins at the previous end. The
/// boundary point is reported once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimecourseSim {
    pub timecourses: Vec<Timecourse>,
    /// `None` records every symbol
    #[serde(default)]
    pub selections: Option<Vec<String>>,
}

impl TimecourseSim {
    pub fn new(timecourses: Vec<Timecourse>) -> Self {
        TimecourseSim {
            timecourses,
            selections: None,
        }
    }

    pub fn with_selections(mut self, selections: &[&str]) -> Self {
        self.selections = Some(selections.iter().map(|s| s.to_string()).collect());
        self
    }

    /// Total simulated duration
    pub fn duration(&self) -> f64 {
        self.timecourses.iter().map(|tc| tc.end - tc.start).sum()
    }
}

// ============================================================================
// Trajectory
// ============================================================================

/// A recorded variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub id: String,
    pub unit: String,
    pub values: Vec<f64>,
}

/// Simulation output on a shared time grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub time: Vec<f64>,
    pub time_unit: String,
    pub columns: Vec<Column>,
}

impl Trajectory {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn column(&self, id: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.id == id)
    }

    /// Values of a selection, `time` included
    pub fn get(&self, id: &str) -> Option<&[f64]> {
        if id == "time" {
            return Some(&self.time);
        }
        self.column(id).map(|c| c.values.as_slice())
    }

    pub fn unit(&self, id: &str) -> Option<&str> {
        if id == "time" {
            return Some(&self.time_unit);
        }
        self.column(id).map(|c| c.unit.as_str())
    }

    /// Last recorded value of a selection
    pub fn last(&self, id: &str) -> Option<f64> {
        self.get(id).and_then(|v| v.last().copied())
    }

    /// Linear interpolation of a selection at time `t`
    ///
    /// Returns `None` outside the recorded time range.
    pub fn interpolate(&self, id: &str, t: f64) -> Option<f64> {
        let values = self.get(id)?;
        let first = *self.time.first()?;
        let last = *self.time.last()?;
        if t < first || t > last {
            return None;
        }
        let i = self.time.partition_point(|&x| x < t);
        if i < self.time.len() && self.time[i] == t {
            return Some(values[i]);
        }
        let (t0, t1) = (self.time[i - 1], self.time[i]);
        let (v0, v1) = (values[i - 1], values[i]);
        Some(v0 + (v1 - v0) * (t - t0) / (t1 - t0))
    }

    /// Write as CSV with one column per selection, time first
    pub fn write_csv<W: std::io::Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut writer = csv::Writer::from_writer(writer);
        let mut header = vec!["time".to_string()];
        header.extend(self.columns.iter().map(|c| c.id.clone()));
        writer.write_record(&header)?;
        for (i, t) in self.time.iter().enumerate() {
            let mut record = vec![t.to_string()];
            record.extend(self.columns.iter().map(|c| c.values[i].to_string()));
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn to_csv_file(&self, path: impl AsRef<Path>) -> Result<(), PbpkError> {
        let file = std::fs::File::create(path)?;
        self.write_csv(file)?;
        Ok(())
    }
}

// ============================================================================
// Simulator
// ============================================================================

/// What a selection reads from the evaluated model
#[derive(Debug, Clone)]
enum Selector {
    Value(usize),
    Amount(usize),
    Concentration(usize),
}

/// A compiled model ready for repeated simulation
///
/// The simulator is immutable and `Sync`; every run works on its own copy of
/// the value table and state, so independent runs can execute in parallel.
#[derive(Debug, Clone)]
pub struct Simulator {
    compiled: CompiledModel,
    options: SolverOptions,
}

impl Simulator {
    pub fn new(
        model: &ModelDefinition,
        units: &UnitCatalogue,
        options: SolverOptions,
    ) -> Result<Self, SimulationError> {
        model.validate(units)?;
        let compiled = CompiledModel::compile(model)?;
        debug!(
            model = %model.id,
            symbols = compiled.len(),
            states = compiled.state_len(),
            "compiled model"
        );
        Ok(Simulator { compiled, options })
    }

    pub fn options(&self) -> &SolverOptions {
        &self.options
    }

    /// Identifiers of every symbol
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.compiled.ids()
    }

    /// Declared unit of a symbol
    pub fn unit(&self, id: &str) -> Option<&str> {
        self.compiled.lookup(id).map(|slot| self.compiled.unit(slot))
    }

    /// Value of every symbol at the initial state after applying `changes`
    ///
    /// Species report the value seen by rate laws (concentration or amount),
    /// reactions their initial rate.
    pub fn snapshot(
        &self,
        changes: &BTreeMap<String, f64>,
    ) -> Result<BTreeMap<String, f64>, SimulationError> {
        let (values, _) = self.compiled.initial(changes)?;
        Ok(self
            .compiled
            .ids()
            .zip(values.iter())
            .map(|(id, v)| (id.to_string(), *v))
            .collect())
    }

    /// Run a single segment
    pub fn simulate(&self, timecourse: &Timecourse) -> Result<Trajectory, SimulationError> {
        self.timecourse(&TimecourseSim::new(vec![timecourse.clone()]))
    }

    /// Run a sequence of segments
    pub fn timecourse(&self, sim: &TimecourseSim) -> Result<Trajectory, SimulationError> {
        let Some(first) = sim.timecourses.first() else {
            return Err(SimulationError::InvalidTimecourse {
                message: "no timecourse segments".to_string(),
            });
        };
        for tc in &sim.timecourses {
            tc.check()?;
        }

        let selectors = self.selectors(sim.selections.as_deref())?;
        let mut trajectory = Trajectory {
            time: Vec::new(),
            time_unit: self.compiled.units().time.clone(),
            columns: selectors
                .iter()
                .map(|(id, s)| Column {
                    id: id.clone(),
                    unit: self.selection_unit(s),
                    values: Vec::new(),
                })
                .collect(),
        };

        let (mut values, mut state) = self.compiled.initial(&first.changes)?;
        let mut offset = first.start;
        for (k, tc) in sim.timecourses.iter().enumerate() {
            if k > 0 {
                self.compiled.apply(&tc.changes, &mut values, &mut state)?;
            }

            let dt = (tc.end - tc.start) / tc.steps as f64;
            // Later segments already reported their first point as the previous end
            let skip = usize::from(k > 0);
            let times: Vec<f64> = (skip..=tc.steps).map(|i| tc.start + dt * i as f64).collect();
            let rhs = Rhs::new(&self.compiled, values.clone());
            let segment = state.clone();
            let steps = integrate(rhs, &self.options, tc.start, &segment, &times, |t, y| {
                state.copy_from(y);
                self.compiled.evaluate(&state, &mut values);
                trajectory.time.push(offset + (t - tc.start));
                for (column, (_, selector)) in trajectory.columns.iter_mut().zip(&selectors) {
                    column.values.push(self.read(selector, &state, &values));
                }
            })?;
            debug!(segment = k, steps, "integrated segment");
            offset += tc.end - tc.start;
        }
        Ok(trajectory)
    }

    /// Resolve selections; `time` is always recorded and skipped here
    fn selectors(
        &self,
        selections: Option<&[String]>,
    ) -> Result<Vec<(String, Selector)>, SimulationError> {
        let mut selectors = Vec::new();
        match selections {
            None => {
                for (slot, id) in self.compiled.ids().enumerate() {
                    let selector = match self.compiled.slot(slot) {
                        Slot::Species { .. } => Selector::Amount(slot),
                        _ => Selector::Value(slot),
                    };
                    selectors.push((id.to_string(), selector));
                }
            }
            Some(selections) => {
                for selection in selections.iter().filter(|s| s.as_str() != "time") {
                    let unknown = || SimulationError::UnknownSelection {
                        selection: selection.clone(),
                    };
                    let selector = match selection.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
                        Some(id) => {
                            let slot = self.compiled.lookup(id).ok_or_else(unknown)?;
                            match self.compiled.slot(slot) {
                                Slot::Species { .. } => Selector::Concentration(slot),
                                _ => return Err(unknown()),
                            }
                        }
                        None => {
                            let slot = self.compiled.lookup(selection).ok_or_else(unknown)?;
                            match self.compiled.slot(slot) {
                                Slot::Species { .. } => Selector::Amount(slot),
                                _ => Selector::Value(slot),
                            }
                        }
                    };
                    selectors.push((selection.clone(), selector));
                }
            }
        }
        Ok(selectors)
    }

    fn read(&self, selector: &Selector, state: &DVector<f64>, values: &[f64]) -> f64 {
        match *selector {
            Selector::Value(slot) => values[slot],
            Selector::Amount(slot) | Selector::Concentration(slot) => {
                let Slot::Species {
                    state: i,
                    compartment,
                    ..
                } = *self.compiled.slot(slot)
                else {
                    return values[slot];
                };
                match selector {
                    Selector::Amount(_) => state[i],
                    _ => state[i] / values[compartment],
                }
            }
        }
    }

    fn selection_unit(&self, selector: &Selector) -> String {
        match *selector {
            Selector::Value(slot) => self.compiled.unit(slot).to_string(),
            Selector::Amount(slot) => self.compiled.substance_unit(slot).to_string(),
            Selector::Concentration(slot) => match *self.compiled.slot(slot) {
                Slot::Species { compartment, .. } => format!(
                    "{}/{}",
                    self.compiled.substance_unit(slot),
                    self.compiled.unit(compartment)
                ),
                _ => self.compiled.unit(slot).to_string(),
            },
        }
    }
}
