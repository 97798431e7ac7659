//! Parameter scans
//!
//! A [`ScanSim`] runs one timecourse simulation for every point of the
//! cartesian product of its dimensions. Points are independent and run in
//! parallel; each yields its own result, so one failing point does not stop
//! the others.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{SimulationError, Simulator, TimecourseSim, Trajectory};

/// Values to scan for one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanDimension {
    pub id: String,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSim {
    pub simulation: TimecourseSim,
    pub dimensions: Vec<ScanDimension>,
}

/// Outcome of one scan point
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub point: BTreeMap<String, f64>,
    pub result: Result<Trajectory, SimulationError>,
}

impl ScanSim {
    pub fn new(simulation: TimecourseSim) -> Self {
        ScanSim {
            simulation,
            dimensions: Vec::new(),
        }
    }

    pub fn dimension(mut self, id: &str, values: Vec<f64>) -> Self {
        self.dimensions.push(ScanDimension {
            id: id.to_string(),
            values,
        });
        self
    }

    /// Every combination of dimension values, last dimension varying fastest
    pub fn points(&self) -> Vec<BTreeMap<String, f64>> {
        let mut points = vec![BTreeMap::new()];
        for dimension in &self.dimensions {
            points = points
                .into_iter()
                .flat_map(|point| {
                    dimension.values.iter().map(move |v| {
                        let mut point = point.clone();
                        point.insert(dimension.id.clone(), *v);
                        point
                    })
                })
                .collect();
        }
        points
    }

    /// The simulation of every point, scan values applied with the first segment
    pub fn simulations(&self) -> Vec<(BTreeMap<String, f64>, TimecourseSim)> {
        self.points()
            .into_iter()
            .map(|point| {
                let mut simulation = self.simulation.clone();
                if let Some(first) = simulation.timecourses.first_mut() {
                    first
                        .changes
                        .extend(point.iter().map(|(k, v)| (k.clone(), *v)));
                }
                (point, simulation)
            })
            .collect()
    }
}

impl Simulator {
    /// Run every point of a scan
    pub fn scan(&self, scan: &ScanSim) -> Vec<ScanResult> {
        scan.simulations()
            .into_par_iter()
            .map(|(point, simulation)| {
                let result = self.timecourse(&simulation);
                ScanResult { point, result }
            })
            .collect()
    }
}

/// `n` values spaced evenly on a log10 scale between `10^start` and `10^end`
pub fn logspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![10f64.powf(start)],
        _ => (0..n)
            .map(|i| 10f64.powf(start + (end - start) * i as f64 / (n - 1) as f64))
            .collect(),
    }
}
