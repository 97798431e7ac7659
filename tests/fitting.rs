//! Residuals and cost of fit problems

use approx::assert_relative_eq;
use sorafenib_pbpk::fitting::{default_parameters, FitError, FitMapping, FitParameter, FitProblem, ObservedCurve};
use sorafenib_pbpk::model::{Compartment, ModelDefinition, Parameter, Reaction, Species};
use sorafenib_pbpk::prelude::*;

/// One litre-scaled pool cleared with first-order rate `k`
fn elimination(units: &UnitCatalogue) -> Simulator {
    let mut m = ModelDefinition::new("elimination", "First-order elimination");
    m.add_compartment(Compartment::new("V", 2.0, "l"));
    m.add_species(Species::concentration("c", "V", 1.0))
        .add_species(Species::amount("sink", "V", 0.0));
    m.add_parameter(Parameter::new("k", 0.1, "per_min"));
    m.add_reaction(
        Reaction::new("ELIM", "c -> sink", "k * V * c")
            .unwrap()
            .compartment("V"),
    );
    Simulator::new(&m, units, SolverOptions::default()).unwrap()
}

fn decay(k: f64, times: &[f64]) -> Vec<f64> {
    times.iter().map(|t| 1000.0 * (-k * t).exp()).collect()
}

fn mapping(id: &str, times: &[f64], values: Vec<f64>, unit: &str) -> FitMapping {
    let reference = ObservedCurve::new(id, times.to_vec(), values, "min", unit).unwrap();
    let sim = TimecourseSim::new(vec![Timecourse::new(0.0, 30.0, 60)]);
    FitMapping::new(id, reference, sim, "[c]")
}

fn k_parameter() -> Vec<FitParameter> {
    vec![FitParameter::new("k", 0.1, 0.01, 1.0, "1/min")]
}

#[test]
fn residuals_vanish_at_the_generating_parameters() {
    let units = UnitCatalogue::standard();
    let simulator = elimination(&units);
    let times = [0.0, 5.0, 10.0, 20.0];
    // 1 mM = 500 mg/l at a molar mass of 500 g/mole
    let mass: Vec<f64> = decay(0.1, &times).iter().map(|c| c / 2.0).collect();
    let mappings = vec![
        mapping("molar", &times, decay(0.1, &times), "µM"),
        mapping("mass", &times, mass, "mg/l").molar_mass(500.0),
    ];
    let problem = FitProblem::new(&simulator, &units, k_parameter(), mappings).unwrap();

    let residuals = problem.residuals(&problem.start()).unwrap();
    assert_eq!(residuals.len(), 8);
    for r in &residuals {
        assert!(r.abs() < 1e-3, "{:?}", residuals);
    }

    let best = problem.cost(&[0.1]).unwrap();
    assert!(problem.cost(&[0.09]).unwrap() > best);
    assert!(problem.cost(&[0.11]).unwrap() > best);
}

#[test]
fn count_and_weight_scale_the_residuals() {
    let units = UnitCatalogue::standard();
    let simulator = elimination(&units);
    let times = [5.0, 10.0];
    // Observations twice the simulated value with sd equal to the value
    let observed: Vec<f64> = decay(0.1, &times).iter().map(|c| 2.0 * c).collect();
    let plain = mapping("plain", &times, observed.clone(), "µM");
    let mut scaled = mapping("scaled", &times, observed.clone(), "µM").weight(3.0);
    scaled.reference = scaled.reference.with_count(4).with_sd(observed).unwrap();

    let problem = FitProblem::new(&simulator, &units, k_parameter(), vec![plain, scaled]).unwrap();
    let r = problem.residuals(&[0.1]).unwrap();
    // (c - 2c) / (0.5 * 2c) = -1 with the default coefficient of variation
    assert_relative_eq!(r[0], -1.0, max_relative = 1e-4);
    // (c - 2c) / 2c * 3 * sqrt(4) = -3
    assert_relative_eq!(r[2], -3.0, max_relative = 1e-4);
}

#[test]
fn candidates_are_checked() {
    let units = UnitCatalogue::standard();
    let simulator = elimination(&units);
    let problem = FitProblem::new(&simulator, &units, k_parameter(), vec![]).unwrap();

    assert_eq!(
        problem.changes(&[0.1, 0.2]).unwrap_err(),
        FitError::WrongLength { expected: 1, found: 2 }
    );
    assert!(matches!(problem.changes(&[2.0]), Err(FitError::OutOfBounds { .. })));
    assert_relative_eq!(problem.changes(&[0.5]).unwrap()["k"], 0.5);
}

#[test]
fn parameters_are_converted_to_model_units() {
    let units = UnitCatalogue::standard();
    let simulator = elimination(&units);
    let parameters = vec![FitParameter::new("k", 6.0, 1.0, 60.0, "1/hr")];
    let problem = FitProblem::new(&simulator, &units, parameters, vec![]).unwrap();
    assert_relative_eq!(problem.changes(&[6.0]).unwrap()["k"], 0.1, max_relative = 1e-12);
}

#[test]
fn invalid_problems_are_rejected() {
    let units = UnitCatalogue::standard();
    let simulator = elimination(&units);
    let unknown = vec![FitParameter::new("kk", 0.1, 0.01, 1.0, "1/min")];
    assert!(matches!(
        FitProblem::new(&simulator, &units, unknown, vec![]),
        Err(FitError::UnknownParameter { ref pid }) if pid == "kk"
    ));

    let outside = vec![FitParameter::new("k", 5.0, 0.01, 1.0, "1/min")];
    assert!(matches!(
        FitProblem::new(&simulator, &units, outside, vec![]),
        Err(FitError::InvalidBounds { .. })
    ));

    let wrong_unit = vec![FitParameter::new("k", 0.1, 0.01, 1.0, "mg")];
    assert!(matches!(
        FitProblem::new(&simulator, &units, wrong_unit, vec![]),
        Err(FitError::Unit(_))
    ));
}

#[test]
fn failing_mappings_name_themselves() {
    let units = UnitCatalogue::standard();
    let simulator = elimination(&units);

    let late = mapping("late", &[10.0, 100.0], vec![1.0, 1.0], "µM");
    let problem = FitProblem::new(&simulator, &units, k_parameter(), vec![late]).unwrap();
    assert!(matches!(
        problem.residuals(&[0.1]),
        Err(FitError::NotSimulated { ref mapping, time, .. }) if mapping == "late" && time == 100.0
    ));

    let mut broken = mapping("broken", &[1.0], vec![1.0], "µM");
    broken.simulation = TimecourseSim::new(vec![Timecourse::new(0.0, -1.0, 10)]);
    let problem = FitProblem::new(&simulator, &units, k_parameter(), vec![broken]).unwrap();
    assert!(matches!(
        problem.residuals(&[0.1]),
        Err(FitError::Simulation { ref mapping, .. }) if mapping == "broken"
    ));

    let mass = mapping("mass", &[1.0], vec![1.0], "mg/l");
    let problem = FitProblem::new(&simulator, &units, k_parameter(), vec![mass]).unwrap();
    assert!(matches!(problem.residuals(&[0.1]), Err(FitError::Incompatible { .. })));
}

#[test]
fn default_parameters_exist_in_the_whole_body() {
    let units = UnitCatalogue::standard();
    let model = whole_body(&units).unwrap();
    let simulator = Simulator::new(&model, &units, SolverOptions::default()).unwrap();
    let problem = FitProblem::new(&simulator, &units, default_parameters(), vec![]).unwrap();

    let changes = problem.changes(&problem.start()).unwrap();
    assert_eq!(changes.len(), 9);
    // Dissolution is fitted per hour and simulated per hour
    assert_relative_eq!(changes["Ka_dis_sor"], 2.0);
}
