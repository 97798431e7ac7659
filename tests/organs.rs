//! Organ submodel builders

use std::collections::BTreeMap;

use approx::assert_relative_eq;
use sorafenib_pbpk::model::{ElementKind, ModelError, Parameter, Reaction};
use sorafenib_pbpk::organs::{intestine, kidney, liver};
use sorafenib_pbpk::prelude::*;
use sorafenib_pbpk::SimulationError;

fn port_ids(model: &sorafenib_pbpk::ModelDefinition) -> Vec<&str> {
    model.ports().iter().map(|p| p.id()).collect()
}

#[test]
fn builders_validate_against_the_standard_catalogue() {
    let units = UnitCatalogue::standard();
    for model in [intestine(&units), liver(&units), kidney(&units)] {
        let model = model.unwrap();
        assert!(model.validate(&units).is_ok(), "{}", model.id);
    }
}

#[test]
fn builders_are_pure() {
    let units = UnitCatalogue::standard();
    assert_eq!(intestine(&units).unwrap(), intestine(&units).unwrap());
    assert_eq!(liver(&units).unwrap(), liver(&units).unwrap());
}

#[test]
fn intestine_ports() {
    let units = UnitCatalogue::standard();
    let model = intestine(&units).unwrap();
    let ports = port_ids(&model);
    for id in [
        "Vext", "Vgu", "Vlumen", "Vfeces", "Vstomach", "sor_ext", "sg_ext", "sor_lumen",
        "sg_lumen", "sor_feces", "sg_feces", "PODOSE_sor", "Ka_dis_sor", "Mr_sor",
    ] {
        assert!(ports.contains(&id), "missing port {}", id);
    }
    assert_eq!(ports.len(), 14);
    // Stomach content and kinetics stay private
    assert!(!ports.contains(&"sor_stomach"));
    assert!(!ports.contains(&"SORABS_Vmax"));
}

#[test]
fn liver_and_kidney_ports() {
    let units = UnitCatalogue::standard();
    let liver = liver(&units).unwrap();
    assert_eq!(
        port_ids(&liver),
        vec!["Vext", "Vli", "Vbi", "Vlumen", "sor_ext", "m2_ext", "sg_lumen"]
    );
    let kidney = kidney(&units).unwrap();
    let ports = kidney.ports();
    assert_eq!(ports.len(), 6);
    let f = ports.iter().find(|p| p.id() == "f_renal_function").unwrap();
    assert_eq!(f.kind(), ElementKind::Parameter);
}

#[test]
fn rate_laws_reduce_to_extent_per_time() {
    let units = UnitCatalogue::standard();
    let mut model = kidney(&units).unwrap();
    // Drop the volume factor: the rate becomes a concentration per time
    model.reactions[0] = Reaction::new("SGEX", "sg_ext -> sg_urine", "f_renal_function * SGEX_k * sg_ext")
        .unwrap()
        .compartment("Vki");
    let err = model.validate(&units).unwrap_err();
    assert!(matches!(err, ModelError::UnitMismatch { ref element, .. } if element == "SGEX"));
}

#[test]
fn unknown_unit_is_a_build_error() {
    let units = UnitCatalogue::standard();
    let mut model = liver(&units).unwrap();
    model.add_parameter(Parameter::new("f_MRP2", 1.0, "fortnight"));
    assert!(matches!(model.validate(&units), Err(ModelError::Unit { .. })));
}

fn intestine_fluxes(f_abs: f64, lumen: f64) -> BTreeMap<String, f64> {
    let units = UnitCatalogue::standard();
    let simulator = Simulator::new(&intestine(&units).unwrap(), &units, SolverOptions::default()).unwrap();
    let mut changes = BTreeMap::new();
    changes.insert("F_sor_abs".to_string(), f_abs);
    changes.insert("sor_lumen".to_string(), lumen);
    simulator.snapshot(&changes).unwrap()
}

#[test]
fn absorbed_fraction_splits_the_uptake() {
    for lumen in [1e-4, 0.1, 5.0] {
        let mut previous: Option<(f64, f64)> = None;
        for f_abs in [0.0, 0.2, 0.4, 0.6, 0.8, 1.0] {
            let fluxes = intestine_fluxes(f_abs, lumen);
            let (absorbed, fecal) = (fluxes["SORABS"], fluxes["SOREXC"]);
            assert_relative_eq!(absorbed + fecal, fluxes["absorption_sor"], max_relative = 1e-12);
            if let Some((a, f)) = previous {
                assert!(absorbed > a, "absorption must increase at lumen = {}", lumen);
                assert!(fecal < f, "fecal excretion must decrease at lumen = {}", lumen);
            }
            previous = Some((absorbed, fecal));
        }
    }
}

#[test]
fn absorbed_fraction_is_bounded() {
    let units = UnitCatalogue::standard();
    let simulator = Simulator::new(&intestine(&units).unwrap(), &units, SolverOptions::default()).unwrap();
    let mut changes = BTreeMap::new();
    changes.insert("F_sor_abs".to_string(), 1.5);
    assert!(matches!(
        simulator.snapshot(&changes),
        Err(SimulationError::OutOfBounds { .. })
    ));
}

#[test]
fn glucuronide_shares_the_absorption_kinetics() {
    let units = UnitCatalogue::standard();
    let simulator = Simulator::new(&intestine(&units).unwrap(), &units, SolverOptions::default()).unwrap();
    let mut changes = BTreeMap::new();
    changes.insert("sor_lumen".to_string(), 0.3);
    changes.insert("sg_lumen".to_string(), 0.3);
    let fluxes = simulator.snapshot(&changes).unwrap();
    assert_relative_eq!(fluxes["SORABS"], fluxes["SGABS"]);
    assert_relative_eq!(fluxes["SOREXC"], fluxes["SGEXC"]);
}

#[test]
fn oral_dose_reaches_the_lumen() {
    let units = UnitCatalogue::standard();
    let simulator = Simulator::new(&intestine(&units).unwrap(), &units, SolverOptions::default()).unwrap();
    let tc = Timecourse::new(0.0, 60.0, 60).change("PODOSE_sor", 400.0);
    let sim = TimecourseSim::new(vec![tc]).with_selections(&["PODOSE_sor", "sor_stomach", "sor_lumen"]);
    let trajectory = simulator.timecourse(&sim).unwrap();

    assert_eq!(trajectory.get("PODOSE_sor").unwrap()[0], 400.0);
    // Application is fast compared with an hour
    assert!(trajectory.last("PODOSE_sor").unwrap() < 1e-6);
    let dose = 400.0 / 464.826;
    let end = trajectory.last("sor_stomach").unwrap() + trajectory.last("sor_lumen").unwrap();
    // Absorption only removes drug from the lumen
    assert!(end <= dose * (1.0 + 1e-6));
    assert!(trajectory.last("sor_lumen").unwrap() > 0.0);
}
