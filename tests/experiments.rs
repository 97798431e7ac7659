//! Experiment runner: scenario execution, failure isolation and output files

use std::path::PathBuf;

use approx::assert_relative_eq;
use sorafenib_pbpk::experiments::{self, default_changes, ExperimentRunner, PkRecord, Scenario, DAY, SELECTIONS};
use sorafenib_pbpk::simulator::ScanSim;
use sorafenib_pbpk::{PbpkError, Settings, Timecourse, TimecourseSim};

fn settings(name: &str, parallel: bool) -> (Settings, PathBuf) {
    let dir = std::env::temp_dir().join(format!("sorafenib-{}-{}", name, std::process::id()));
    let mut settings = Settings::default();
    settings.output.path = dir.to_string_lossy().to_string();
    settings.parallel = parallel;
    (settings, dir)
}

fn one_day(dose: f64) -> TimecourseSim {
    let tc = Timecourse::new(0.0, DAY, 60)
        .with_changes(&default_changes())
        .change("PODOSE_sor", dose);
    TimecourseSim::new(vec![tc]).with_selections(&SELECTIONS)
}

fn scenarios() -> Vec<Scenario> {
    let cirrhosis = ScanSim::new(one_day(200.0)).dimension("f_cirrhosis", vec![0.0, 2.0]);
    let unselected = TimecourseSim::new(vec![Timecourse::new(0.0, DAY, 10).change("PODOSE_sor", 200.0)])
        .with_selections(&["[Cve_sor]"]);
    vec![
        Scenario::timecourse("dose", "sor_po400", one_day(400.0)),
        Scenario::scan("scan", "cirrhosis", cirrhosis),
        Scenario::timecourse("dose", "no_dose_record", unselected),
    ]
}

#[test]
fn failures_stay_with_their_scenario() {
    let (settings, _) = settings("isolation", false);
    let runner = ExperimentRunner::new(settings).unwrap();
    let outcomes = runner.run_scenarios(&scenarios());

    assert_eq!(outcomes.len(), 3);
    assert!(outcomes[0].is_ok());

    assert_eq!(outcomes[1].runs.len(), 2);
    assert_eq!(outcomes[1].failures(), 1);
    assert!(matches!(outcomes[1].runs[1], Err(PbpkError::Simulation(_))));
    assert_eq!(outcomes[1].outputs().next().unwrap().point["f_cirrhosis"], 0.0);

    // PK needs the administered dose in the trajectory
    assert!(matches!(outcomes[2].runs[0], Err(PbpkError::Pk(_))));
}

#[test]
fn parallel_and_serial_runs_agree() {
    let scenarios = vec![
        Scenario::timecourse("dose", "sor_po200", one_day(200.0)),
        Scenario::timecourse("dose", "sor_po800", one_day(800.0)),
    ];
    let (serial, _) = settings("serial", false);
    let (parallel, _) = settings("parallel", true);
    let a = ExperimentRunner::new(serial).unwrap().run_scenarios(&scenarios);
    let b = ExperimentRunner::new(parallel).unwrap().run_scenarios(&scenarios);

    for (x, y) in a.iter().zip(&b) {
        let (x, y) = (x.outputs().next().unwrap(), y.outputs().next().unwrap());
        assert_eq!(x.trajectory, y.trajectory);
        assert_eq!(x.pk, y.pk);
    }
}

#[test]
fn records_use_reporting_units() {
    let (settings, _) = settings("records", false);
    let runner = ExperimentRunner::new(settings).unwrap();
    let scenario = Scenario::timecourse("dose", "sor_po400", one_day(400.0));
    let outcomes = runner.run_scenarios(std::slice::from_ref(&scenario));
    let output = outcomes[0].outputs().next().unwrap();
    let pk = &output.pk;

    assert_relative_eq!(pk.dose.value, 400.0 / 464.826, max_relative = 1e-12);
    assert_eq!(pk.cmax.unit, "mmole/l");
    assert_eq!(pk.tmax.unit, "min");

    let record = PkRecord::new("sor_po400", &output.point, pk, runner.units()).unwrap();
    assert_relative_eq!(record.cmax, pk.cmax.value * 1000.0, max_relative = 1e-12);
    assert_relative_eq!(record.tmax, pk.tmax.value / 60.0, max_relative = 1e-12);
    assert_relative_eq!(record.auc, pk.auc.value / 60.0, max_relative = 1e-12);
    assert_eq!(record.kel.is_some(), pk.kel.is_some());
}

#[test]
fn last_day_window_is_reported_from_zero() {
    let (settings, _) = settings("window", true);
    let runner = ExperimentRunner::new(settings).unwrap();
    let mut first = default_changes();
    first.insert("PODOSE_sor".to_string(), 400.0);
    let day = |changes: &std::collections::BTreeMap<String, f64>| {
        Timecourse::new(0.0, DAY, 60).with_changes(changes)
    };
    let redose = [("PODOSE_sor".to_string(), 400.0)].into_iter().collect();
    let sim = TimecourseSim::new(vec![day(&first), day(&redose)]).with_selections(&SELECTIONS);
    let scenario = Scenario::timecourse("multi", "two_days", sim).with_pk_window(DAY, 2.0 * DAY);

    let outcomes = runner.run_scenarios(&[scenario]);
    let pk = &outcomes[0].outputs().next().unwrap().pk;
    assert!(pk.tmax.value <= DAY);
    assert_relative_eq!(pk.tlast.value, DAY);
}

#[test]
fn run_writes_artifacts() {
    let (mut settings, dir) = settings("artifacts", true);
    settings.log.level = "warn".to_string();
    let outcomes = experiments::run(&settings, &scenarios()).unwrap();
    assert_eq!(outcomes.len(), 3);

    assert!(dir.join("settings.json").exists());
    assert!(dir.join("sorafenib_body.json").exists());
    assert!(dir.join("run.log").exists());
    assert!(dir.join("dose").join("sor_po400.csv").exists());
    assert!(!dir.join("dose").join("no_dose_record.csv").exists());
    assert!(dir.join("scan").join("cirrhosis_0.csv").exists());
    assert!(!dir.join("scan").join("cirrhosis_1.csv").exists());

    let table = std::fs::read_to_string(dir.join("dose").join("pk.json")).unwrap();
    let records: Vec<PkRecord> = serde_json::from_str(&table).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].scenario, "sor_po400");
    assert_relative_eq!(records[0].dose, 400.0 / 464.826, max_relative = 1e-12);

    let csv = std::fs::read_to_string(dir.join("dose").join("sor_po400.csv")).unwrap();
    let header = csv.lines().next().unwrap();
    assert!(header.starts_with("time,"));
    assert!(header.contains("[Cve_sor]"));
    assert_eq!(csv.lines().count(), 62);

    std::fs::remove_dir_all(&dir).unwrap();
}
