use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn, Span};

use super::{Run, Scenario};
use crate::error::PbpkError;
use crate::logger;
use crate::model::ModelDefinition;
use crate::organs::{whole_body, SUBSTANCES};
use crate::pk::{calculate_pk, ConcentrationCurve, PkError, PkOptions, PkParameters};
use crate::settings::Settings;
use crate::simulator::{Simulator, TimecourseSim, Trajectory};
use crate::units::{Quantity, UnitCatalogue, UnitError};

/// Curve the PK parameters are derived from
pub const PK_SELECTION: &str = "[Cve_sor]";

/// One simulation of a scenario with its PK
#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Scanned values; empty for plain timecourses
    pub point: BTreeMap<String, f64>,
    pub trajectory: Trajectory,
    pub pk: PkParameters,
}

/// Every run of a scenario, each succeeding or failing on its own
#[derive(Debug)]
pub struct ScenarioOutcome {
    pub group: String,
    pub id: String,
    pub runs: Vec<Result<RunOutput, PbpkError>>,
}

impl ScenarioOutcome {
    pub fn is_ok(&self) -> bool {
        self.runs.iter().all(|r| r.is_ok())
    }

    pub fn failures(&self) -> usize {
        self.runs.iter().filter(|r| r.is_err()).count()
    }

    pub fn outputs(&self) -> impl Iterator<Item = &RunOutput> {
        self.runs.iter().filter_map(|r| r.as_ref().ok())
    }
}

/// A row of the PK table in reporting units
///
/// Concentrations in µmole/l, times in hr, AUC in mmole/l*hr and clearance in
/// l/min. Values that need a terminal phase are `None` without one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PkRecord {
    pub scenario: String,
    pub point: BTreeMap<String, f64>,
    pub dose: f64,
    pub cmax: f64,
    pub tmax: f64,
    pub auc: f64,
    pub auc_inf: Option<f64>,
    pub kel: Option<f64>,
    pub thalf: Option<f64>,
    pub cl: Option<f64>,
    pub warnings: Vec<String>,
}

impl PkRecord {
    pub fn new(
        scenario: &str,
        point: &BTreeMap<String, f64>,
        pk: &PkParameters,
        units: &UnitCatalogue,
    ) -> Result<Self, UnitError> {
        let convert = |q: &Quantity, to: &str| units.convert(q.value, &q.unit, to);
        let optional = |q: &Option<Quantity>, to: &str| q.as_ref().map(|q| convert(q, to)).transpose();
        Ok(PkRecord {
            scenario: scenario.to_string(),
            point: point.clone(),
            dose: convert(&pk.dose, "mmole")?,
            cmax: convert(&pk.cmax, "µmole/l")?,
            tmax: convert(&pk.tmax, "hr")?,
            auc: convert(&pk.auc, "mmole/l*hr")?,
            auc_inf: optional(&pk.auc_inf, "mmole/l*hr")?,
            kel: optional(&pk.kel, "1/hr")?,
            thalf: optional(&pk.thalf, "hr")?,
            cl: optional(&pk.cl, "l/min")?,
            warnings: pk.warnings.iter().map(|w| w.to_string()).collect(),
        })
    }
}

/// Runs scenarios on one compiled whole-body model
#[derive(Debug, Clone)]
pub struct ExperimentRunner {
    units: UnitCatalogue,
    model: ModelDefinition,
    simulator: Simulator,
    settings: Settings,
}

impl ExperimentRunner {
    /// Build, flatten and compile the whole-body model
    pub fn new(settings: Settings) -> Result<Self, PbpkError> {
        let units = UnitCatalogue::standard();
        let model = whole_body(&units)?;
        let simulator = Simulator::new(&model, &units, settings.solver)?;
        debug!(
            compartments = model.compartments.len(),
            species = model.species.len(),
            reactions = model.reactions.len(),
            "built whole-body model"
        );
        Ok(ExperimentRunner {
            units,
            model,
            simulator,
            settings,
        })
    }

    pub fn model(&self) -> &ModelDefinition {
        &self.model
    }

    pub fn simulator(&self) -> &Simulator {
        &self.simulator
    }

    pub fn units(&self) -> &UnitCatalogue {
        &self.units
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Run every simulation of every scenario
    ///
    /// Scan points are separate jobs. A failing job is reported in its
    /// scenario's outcome and does not affect the other jobs.
    pub fn run_scenarios(&self, scenarios: &[Scenario]) -> Vec<ScenarioOutcome> {
        let jobs: Vec<(usize, BTreeMap<String, f64>, TimecourseSim)> = scenarios
            .iter()
            .enumerate()
            .flat_map(|(k, scenario)| {
                let simulations = match &scenario.run {
                    Run::Timecourse(sim) => vec![(BTreeMap::new(), sim.clone())],
                    Run::Scan(scan) => scan.simulations(),
                };
                simulations
                    .into_iter()
                    .map(move |(point, sim)| (k, point, sim))
            })
            .collect();
        info!(
            "Running {} scenarios with {} simulations",
            scenarios.len(),
            jobs.len()
        );

        let pb = progress_bar(jobs.len() as u64);
        // Worker threads do not inherit the caller's span
        let parent = Span::current();
        let run = |(k, point, sim): &(usize, BTreeMap<String, f64>, TimecourseSim)| {
            let scenario = &scenarios[*k];
            let _span = info_span!(parent: &parent, "scenario", group = %scenario.group, id = %scenario.id)
                .entered();
            let result = self.run_one(scenario, point, sim);
            pb.inc(1);
            (*k, result)
        };
        let results: Vec<(usize, Result<RunOutput, PbpkError>)> = if self.settings.parallel {
            jobs.par_iter().map(run).collect()
        } else {
            jobs.iter().map(run).collect()
        };
        pb.finish_and_clear();

        let mut outcomes: Vec<ScenarioOutcome> = scenarios
            .iter()
            .map(|s| ScenarioOutcome {
                group: s.group.clone(),
                id: s.id.clone(),
                runs: Vec::new(),
            })
            .collect();
        for (k, result) in results {
            if let Err(err) = &result {
                warn!(scenario = %outcomes[k].id, %err, "simulation failed");
            }
            outcomes[k].runs.push(result);
        }
        outcomes
    }

    fn run_one(
        &self,
        scenario: &Scenario,
        point: &BTreeMap<String, f64>,
        sim: &TimecourseSim,
    ) -> Result<RunOutput, PbpkError> {
        let trajectory = self.simulator.timecourse(sim)?;
        let curve = ConcentrationCurve::from_trajectory(&trajectory, PK_SELECTION)?;
        let mut options = PkOptions::default();
        if let Some((start, end)) = scenario.pk_window {
            options = options.with_window(start, end);
        }
        let pk = calculate_pk(&curve, &oral_dose(&trajectory)?, &options)?;
        Ok(RunOutput {
            point: point.clone(),
            trajectory,
            pk,
        })
    }

    /// Write trajectories as CSV and one `pk.json` per experiment group
    pub fn write(&self, outcomes: &[ScenarioOutcome]) -> Result<(), PbpkError> {
        let root = Path::new(&self.settings.output.path);
        let mut tables: BTreeMap<&str, Vec<PkRecord>> = BTreeMap::new();
        for outcome in outcomes {
            let dir = root.join(&outcome.group);
            std::fs::create_dir_all(&dir)?;
            let single = outcome.runs.len() == 1;
            for (i, run) in outcome.runs.iter().enumerate() {
                let Ok(output) = run else { continue };
                let name = if single {
                    format!("{}.csv", outcome.id)
                } else {
                    format!("{}_{}.csv", outcome.id, i)
                };
                output.trajectory.to_csv_file(dir.join(name))?;
                tables.entry(outcome.group.as_str()).or_default().push(PkRecord::new(
                    &outcome.id,
                    &output.point,
                    &output.pk,
                    &self.units,
                )?);
            }
        }
        for (group, records) in tables {
            let path = root.join(group).join("pk.json");
            std::fs::write(&path, serde_json::to_string_pretty(&records)?)?;
            debug!(path = %path.display(), rows = records.len(), "wrote PK table");
        }
        Ok(())
    }
}

/// Administered sorafenib as an amount, read from the dose at the first time point
fn oral_dose(trajectory: &Trajectory) -> Result<Quantity, PkError> {
    let mass = trajectory
        .get("PODOSE_sor")
        .and_then(|v| v.first().copied())
        .ok_or_else(|| PkError::MissingSelection {
            selection: "PODOSE_sor".to_string(),
        })?;
    // mg / (g/mole) = mmole
    Ok(Quantity::new(mass / SUBSTANCES[0].mr, "mmole"))
}

fn progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    let style = ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} simulations")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb
}

/// Run scenarios with the given settings
///
/// Sets up logging, builds the model and, when output is enabled, writes the
/// settings, the flattened model artifact, trajectories and PK tables into
/// `settings.output.path`.
pub fn run(settings: &Settings, scenarios: &[Scenario]) -> Result<Vec<ScenarioOutcome>> {
    let now = Instant::now();
    logger::setup_log(settings)?;
    let _span = info_span!("experiments", output = %settings.output.path).entered();
    info!("Starting sorafenib experiments");

    let runner = ExperimentRunner::new(settings.clone())?;
    info!(
        "Whole-body model has {} species and {} reactions",
        runner.model().species.len(),
        runner.model().reactions.len()
    );

    match settings.output.write {
        true => {
            info!("Output files will be written to {}", settings.output.path);
            settings.write(&settings.output.path)?;
            runner
                .model()
                .write_json(Path::new(&settings.output.path).join("sorafenib_body.json"))?;
        }
        false => {
            info!("Output files will not be written - set `write = true` in the [output] section to enable output files")
        }
    }

    let outcomes = runner.run_scenarios(scenarios);
    if settings.output.write {
        runner.write(&outcomes)?;
    }

    let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
    if failed > 0 {
        warn!("{} of {} scenarios had failing simulations", failed, outcomes.len());
    }
    info!("Experiments complete after {:.2?}", now.elapsed());
    Ok(outcomes)
}
