//! Simulation experiments on the whole-body model
//!
//! An experiment is a named group of [`Scenario`]s. Each scenario is either a
//! single timecourse simulation or a parameter scan; both run on the same
//! compiled whole-body model with the fitted [`default_changes`] applied in
//! the first segment. The [`ExperimentRunner`] executes scenarios in parallel,
//! derives sorafenib PK from venous plasma and writes the results.
//!
//! | Experiment | Scenarios |
//! |------------|-----------|
//! | [`dose_dependency`] | 100 to 3200 mg, single dose and 11 daily doses |
//! | [`hepatic_impairment`] | 11 daily doses of 200 mg per cirrhosis cohort |
//! | [`renal_impairment`] | 11 daily doses of 200 mg per renal cohort |
//! | [`renal_scan`] | renal function scanned over 0.1 to 10 for every cohort pair |

mod runner;

pub use runner::{run, ExperimentRunner, PkRecord, RunOutput, ScenarioOutcome, PK_SELECTION};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::simulator::{logspace, ScanSim, Timecourse, TimecourseSim};

/// Minutes per day; every dosing segment spans one day
pub const DAY: f64 = 24.0 * 60.0;

/// Oral doses of the dose-dependency experiment in mg
pub const DOSES: [f64; 6] = [100.0, 200.0, 400.0, 800.0, 1600.0, 3200.0];

/// Cirrhosis cohorts as (key, `f_cirrhosis`)
pub const CIRRHOSIS: [(&str, f64); 4] = [
    ("Control", 0.0),
    ("Mild", 0.3994897959183674),
    ("Moderate", 0.6979591836734694),
    ("Severe", 0.8127551020408164),
];

/// Renal cohorts as (key, `f_renal_function`), relative to a GFR of 101 ml/min
pub const RENAL: [(&str, f64); 4] = [
    ("Normal", 1.0),
    ("Mild", 69.5 / 101.0),
    ("Moderate", 32.5 / 101.0),
    ("Severe", 19.5 / 101.0),
];

/// Variables recorded by every experiment
pub const SELECTIONS: [&str; 12] = [
    "time",
    "[Cve_sor]",
    "[Cve_m2]",
    "[Cve_sg]",
    "Afeces_sor",
    "Aurine_sg",
    "Afeces_sg",
    "Cve_sg_sor",
    "Cve_m2_sor",
    "PODOSE_sor",
    "f_cirrhosis",
    "f_renal_function",
];

/// Fitted parameter values, each in the declared unit of its parameter
///
/// | Parameter | Unit |
/// |-----------|------|
/// | `Ka_dis_sor` | 1/hr |
/// | `GU__F_sor_abs` | dimensionless |
/// | `GU__SORABS_Vmax`, `KI__SGEX_k` | 1/min |
/// | `LI__*_Vmax` | mmole/min/l |
pub fn default_changes() -> BTreeMap<String, f64> {
    [
        ("Ka_dis_sor", 0.6380404886582229),
        ("GU__F_sor_abs", 0.5999999998431342),
        ("GU__SORABS_Vmax", 0.0004564619167017758),
        ("KI__SGEX_k", 0.00100102340272109),
        ("LI__SORIM_Vmax", 0.01000000148281594),
        ("LI__M2EX_Vmax", 0.043035916104154845),
        ("LI__SGEX_Vmax", 4.852607840633812),
        ("LI__SOR2M2_Vmax", 0.010000000008669747),
        ("LI__M2GLU_Vmax", 0.021752867459769464),
    ]
    .into_iter()
    .map(|(id, value)| (id.to_string(), value))
    .collect()
}

/// What a scenario simulates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Run {
    Timecourse(TimecourseSim),
    Scan(ScanSim),
}

/// A named simulation within an experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// Experiment the scenario belongs to; also its output directory
    pub group: String,
    pub id: String,
    pub run: Run,
    /// PK window `[start, end]` in minutes, time re-zeroed at `start`
    pub pk_window: Option<(f64, f64)>,
}

impl Scenario {
    pub fn timecourse(group: &str, id: &str, simulation: TimecourseSim) -> Self {
        Scenario {
            group: group.to_string(),
            id: id.to_string(),
            run: Run::Timecourse(simulation),
            pk_window: None,
        }
    }

    pub fn scan(group: &str, id: &str, scan: ScanSim) -> Self {
        Scenario {
            group: group.to_string(),
            id: id.to_string(),
            run: Run::Scan(scan),
            pk_window: None,
        }
    }

    pub fn with_pk_window(mut self, start: f64, end: f64) -> Self {
        self.pk_window = Some((start, end));
        self
    }

    /// Number of simulations the scenario expands to
    pub fn len(&self) -> usize {
        match &self.run {
            Run::Timecourse(_) => 1,
            Run::Scan(scan) => scan.points().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Scenario builders
// ============================================================================

/// First day: fitted defaults, the dose and any cohort changes
fn first_day(dose: f64, steps: usize, changes: &[(&str, f64)]) -> Timecourse {
    let mut tc = Timecourse::new(0.0, DAY, steps)
        .with_changes(&default_changes())
        .change("PODOSE_sor", dose);
    for (id, value) in changes {
        tc = tc.change(id, *value);
    }
    tc
}

/// First day followed by `days - 1` redosing days
fn daily_doses(dose: f64, days: usize, steps: usize, changes: &[(&str, f64)]) -> TimecourseSim {
    let mut timecourses = vec![first_day(dose, steps, changes)];
    timecourses.extend(
        (1..days).map(|_| Timecourse::new(0.0, DAY, steps).change("PODOSE_sor", dose)),
    );
    TimecourseSim::new(timecourses).with_selections(&SELECTIONS)
}

/// Single and repeated oral doses from 100 to 3200 mg
///
/// The repeated-dose scenarios report PK over the last dosing day.
pub fn dose_dependency() -> Vec<Scenario> {
    let group = "dose_dependency";
    let mut scenarios = Vec::new();
    for dose in DOSES {
        let single = TimecourseSim::new(vec![first_day(dose, 200, &[])]).with_selections(&SELECTIONS);
        scenarios.push(Scenario::timecourse(
            group,
            &format!("sor_po{}_single", dose),
            single,
        ));

        let days = 11;
        scenarios.push(
            Scenario::timecourse(
                group,
                &format!("sor_po{}_multi", dose),
                daily_doses(dose, days, 100, &[]),
            )
            .with_pk_window((days - 1) as f64 * DAY, days as f64 * DAY),
        );
    }
    scenarios
}

/// 200 mg daily for 11 days in every cirrhosis cohort
pub fn hepatic_impairment() -> Vec<Scenario> {
    CIRRHOSIS
        .iter()
        .map(|(key, value)| {
            Scenario::timecourse(
                "hepatic_impairment",
                &format!("sor_po_{}", key),
                daily_doses(200.0, 11, 200, &[("f_cirrhosis", *value)]),
            )
        })
        .collect()
}

/// 200 mg daily for 11 days in every renal cohort
pub fn renal_impairment() -> Vec<Scenario> {
    RENAL
        .iter()
        .map(|(key, value)| {
            Scenario::timecourse(
                "renal_impairment",
                &format!("sor_po_{}", key),
                daily_doses(200.0, 11, 200, &[("f_renal_function", *value)]),
            )
        })
        .collect()
}

/// Renal function scanned over `logspace(-1, 1, 19)` after a single 400 mg dose
///
/// One scan per (cirrhosis, renal) cohort pair; the scanned renal function
/// overrides the cohort value.
pub fn renal_scan() -> Vec<Scenario> {
    let mut scenarios = Vec::new();
    for (cirrhosis, f_cirrhosis) in CIRRHOSIS {
        for (renal, f_renal) in RENAL {
            let simulation = TimecourseSim::new(vec![first_day(
                400.0,
                200,
                &[("f_cirrhosis", f_cirrhosis), ("f_renal_function", f_renal)],
            )])
            .with_selections(&SELECTIONS);
            let scan = ScanSim::new(simulation).dimension("f_renal_function", logspace(-1.0, 1.0, 19));
            scenarios.push(Scenario::scan(
                "renal_scan",
                &format!("scan_renal_{}_{}", cirrhosis, renal),
                scan,
            ));
        }
    }
    scenarios
}

/// Every experiment
pub fn all_scenarios() -> Vec<Scenario> {
    let mut scenarios = dose_dependency();
    scenarios.extend(hepatic_impairment());
    scenarios.extend(renal_impairment());
    scenarios.extend(renal_scan());
    scenarios
}
