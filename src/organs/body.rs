//! Whole-body circulation
//!
//! Arterial blood perfuses gut, kidney, rest of body and the hepatic artery;
//! organ outflows mix in venous blood, pass the lung and return to arterial
//! blood. The gut drains through the portal vein into the liver, and the liver
//! drains through the hepatic vein. A fraction `f_shunts` of both liver
//! inflows bypasses the hepatocytes and goes straight to the hepatic vein.
//!
//! Organ volumes are split into a plasma part (`V<organ>_plasma`) carrying the
//! circulating species and a tissue part (`V<organ>_tissue`) where the organ
//! submodels place their intracellular species.

use crate::model::{
    AssignmentRule, Compartment, CompositeModel, ModelDefinition, ModelError, Parameter, Reaction,
    Species,
};
use crate::units::UnitCatalogue;

use super::{intestine, kidney, liver, INTESTINE, KIDNEY, LIVER};

pub const ID: &str = "sorafenib_body";

/// Added to venous sorafenib in the metabolite ratios so they stay finite before the dose arrives
pub const RATIO_FLOOR: &str = "Cve_ratio_floor";

/// A circulating substance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Substance {
    pub id: &'static str,
    pub name: &'static str,
    /// Molar mass in g/mole
    pub mr: f64,
}

pub const SUBSTANCES: [Substance; 3] = [
    Substance {
        id: "sor",
        name: "sorafenib",
        mr: 464.826,
    },
    Substance {
        id: "m2",
        name: "sorafenib N-oxide (M2)",
        mr: 421.6,
    },
    Substance {
        id: "sg",
        name: "sorafenib glucuronide (SG)",
        mr: 472.6,
    },
];

/// Perfused organs as (id, name)
pub const ORGANS: [(&str, &str); 5] = [
    ("ki", "kidney"),
    ("li", "liver"),
    ("lu", "lung"),
    ("gu", "gut"),
    ("re", "rest of body"),
];

/// Blood pools as (id, name)
pub const BLOOD: [(&str, &str); 4] = [
    ("ar", "arterial blood"),
    ("ve", "venous blood"),
    ("po", "portal vein"),
    ("hv", "hepatic vein"),
];

/// Build the body with the organ submodels embedded and bound
pub fn body(units: &UnitCatalogue) -> Result<CompositeModel, ModelError> {
    let mut composite = CompositeModel::new(circulation()?);
    composite
        .add_submodel(INTESTINE, intestine(units)?)
        .add_submodel(LIVER, liver(units)?)
        .add_submodel(KIDNEY, kidney(units)?);

    let gu = [
        ("Vext", "Vgu_plasma"),
        ("Vgu", "Vgu"),
        ("Vlumen", "Vgulumen"),
        ("Vfeces", "Vfeces"),
        ("Vstomach", "Vstomach"),
        ("sor_ext", "Cgu_plasma_sor"),
        ("sg_ext", "Cgu_plasma_sg"),
        ("sor_lumen", "Clumen_sor"),
        ("sg_lumen", "Clumen_sg"),
        ("sor_feces", "Afeces_sor"),
        ("sg_feces", "Afeces_sg"),
        ("PODOSE_sor", "PODOSE_sor"),
        ("Ka_dis_sor", "Ka_dis_sor"),
        ("Mr_sor", "Mr_sor"),
    ];
    let li = [
        ("Vext", "Vli_plasma"),
        ("Vli", "Vli_tissue"),
        ("Vbi", "Vbi"),
        ("Vlumen", "Vgulumen"),
        ("sor_ext", "Cli_plasma_sor"),
        ("m2_ext", "Cli_plasma_m2"),
        ("sg_lumen", "Clumen_sg"),
    ];
    let ki = [
        ("Vext", "Vki_plasma"),
        ("Vki", "Vki_tissue"),
        ("Vurine", "Vurine"),
        ("sg_ext", "Cki_plasma_sg"),
        ("sg_urine", "Aurine_sg"),
        ("f_renal_function", "f_renal_function"),
    ];
    for (submodel, table) in [(INTESTINE, &gu[..]), (LIVER, &li[..]), (KIDNEY, &ki[..])] {
        for (port, element) in table {
            composite.replace(submodel, port, element);
        }
    }

    // Surface binding errors here rather than on first flatten
    composite.bindings(units)?;
    Ok(composite)
}

/// Build and flatten the whole-body model
pub fn whole_body(units: &UnitCatalogue) -> Result<ModelDefinition, ModelError> {
    body(units)?.flatten(units)
}

// ============================================================================
// Circulation
// ============================================================================

fn circulation() -> Result<ModelDefinition, ModelError> {
    let mut m = ModelDefinition::new(ID, "Sorafenib whole-body PBPK");
    physiology(&mut m)?;
    compartments(&mut m)?;
    m.add_parameter(
        Parameter::new(RATIO_FLOOR, 1e-10, "mM").name("venous sorafenib floor of metabolite ratios"),
    );
    for substance in &SUBSTANCES {
        circulating_species(&mut m, substance)?;
        flows(&mut m, substance.id)?;
    }
    Ok(m)
}

fn rule(m: &mut ModelDefinition, variable: &str, math: &str, unit: &str) -> Result<(), ModelError> {
    m.add_assignment_rule(AssignmentRule::new(variable, math, unit)?);
    Ok(())
}

fn physiology(m: &mut ModelDefinition) -> Result<(), ModelError> {
    m.add_parameter(Parameter::new("BW", 75.0, "kg").name("body weight"))
        .add_parameter(Parameter::new("HEIGHT", 170.0, "cm").name("height"))
        .add_parameter(Parameter::new("HR", 70.0, "per_min").name("heart rate"))
        .add_parameter(Parameter::new("HRrest", 70.0, "per_min").name("heart rate at rest"))
        .add_parameter(Parameter::new("COBW", 1.548, "ml_per_s_kg").name("cardiac output per body weight"))
        .add_parameter(Parameter::new("COHRI", 150.0, "ml").name("increase of cardiac output per heart beat"))
        .add_parameter(Parameter::new("Fblood", 0.02, "dimensionless").name("blood fraction of organ volume"))
        .add_parameter(Parameter::new("HCT", 0.51, "dimensionless").name("hematocrit"))
        .add_parameter(Parameter::new("f_lumen", 0.9, "dimensionless").name("lumen fraction of gut volume"))
        .add_parameter(
            Parameter::new("f_cirrhosis", 0.0, "dimensionless")
                .name("severity of cirrhosis")
                .bounds(0.0, 0.95),
        )
        .add_parameter(Parameter::new("f_shunts", 0.0, "dimensionless").name("fraction of liver blood flow shunted").variable())
        .add_parameter(Parameter::new("f_tissue_loss", 0.0, "dimensionless").name("fraction of lost liver tissue").variable())
        .add_parameter(Parameter::new("f_renal_function", 1.0, "dimensionless").name("renal function scaling"))
        .add_parameter(Parameter::new("BSA", 0.0, "m2").name("body surface area").variable())
        .add_parameter(Parameter::new("CO", 0.0, "ml_per_s").name("cardiac output").variable())
        .add_parameter(Parameter::new("QC", 0.0, "l_per_min").name("cardiac output").variable());

    let fractional_volumes = [
        ("gu", 0.0171),
        ("ki", 0.0044),
        ("li", 0.021),
        ("lu", 0.0076),
        ("ve", 0.0514),
        ("ar", 0.0257),
        ("po", 0.001),
        ("hv", 0.001),
    ];
    for (id, value) in fractional_volumes {
        m.add_parameter(Parameter::new(&format!("FV{id}"), value, "l_per_kg"));
    }
    m.add_parameter(Parameter::new("FVre", 0.0, "l_per_kg").variable());

    for (id, value) in [("gu", 0.18), ("ki", 0.19), ("h", 0.215), ("lu", 1.0)] {
        m.add_parameter(Parameter::new(&format!("FQ{id}"), value, "dimensionless"));
    }
    m.add_parameter(Parameter::new("FQre", 0.0, "dimensionless").variable());
    for id in ["gu", "ki", "h", "ha", "lu", "re", "po"] {
        m.add_parameter(Parameter::new(&format!("Q{id}"), 0.0, "l_per_min").variable());
    }

    rule(m, "FVre", "1 l_per_kg - (FVgu + FVki + FVli + FVlu + FVve + FVar)", "l_per_kg")?;
    rule(m, "FQre", "1 dimensionless - (FQki + FQh)", "dimensionless")?;
    // Haycock formula
    rule(
        m,
        "BSA",
        "0.024265 m2 * power(BW / 1 kg, 0.5378) * power(HEIGHT / 1 cm, 0.3964)",
        "m2",
    )?;
    rule(m, "CO", "BW * COBW + (HR - HRrest) * COHRI / 60 s_per_min", "ml_per_s")?;
    rule(m, "QC", "CO / 1000 ml_per_l * 60 s_per_min", "l_per_min")?;

    rule(m, "Qgu", "QC * FQgu", "l_per_min")?;
    rule(m, "Qki", "QC * FQki", "l_per_min")?;
    rule(m, "Qh", "QC * FQh", "l_per_min")?;
    rule(m, "Qha", "Qh - Qgu", "l_per_min")?;
    rule(m, "Qlu", "QC * FQlu", "l_per_min")?;
    rule(m, "Qre", "QC * FQre", "l_per_min")?;
    rule(m, "Qpo", "Qgu", "l_per_min")?;

    rule(m, "f_shunts", "f_cirrhosis", "dimensionless")?;
    rule(m, "f_tissue_loss", "f_cirrhosis", "dimensionless")?;
    Ok(())
}

fn compartments(m: &mut ModelDefinition) -> Result<(), ModelError> {
    for (id, name) in ORGANS {
        m.add_compartment(Compartment::new(&format!("V{id}"), 1.0, "l").name(name).variable())
            .add_compartment(
                Compartment::new(&format!("V{id}_plasma"), 1.0, "l")
                    .name(&format!("{name} plasma"))
                    .variable(),
            )
            .add_compartment(
                Compartment::new(&format!("V{id}_tissue"), 1.0, "l")
                    .name(&format!("{name} tissue"))
                    .variable(),
            );

        let organ = format!("V{id}");
        rule(m, &organ, &format!("BW * FV{id}"), "l")?;
        rule(
            m,
            &format!("V{id}_plasma"),
            &format!("V{id} * Fblood * (1 dimensionless - HCT)"),
            "l",
        )?;
        let tissue = if id == "li" {
            "Vli * (1 dimensionless - f_tissue_loss) * (1 dimensionless - Fblood)".to_string()
        } else {
            format!("V{id} * (1 dimensionless - Fblood)")
        };
        rule(m, &format!("V{id}_tissue"), &tissue, "l")?;
    }

    for (id, name) in BLOOD {
        m.add_compartment(Compartment::new(&format!("V{id}"), 1.0, "l").name(name).variable());
    }
    // Arterial and venous pools hold the blood not attributed to organs,
    // portal and hepatic veins only their plasma.
    rule(
        m,
        "Var",
        "BW * FVar - FVar / (FVar + FVve) * BW * Fblood * (1 l_per_kg - FVar - FVve)",
        "l",
    )?;
    rule(
        m,
        "Vve",
        "BW * FVve - FVve / (FVar + FVve) * BW * Fblood * (1 l_per_kg - FVar - FVve)",
        "l",
    )?;
    for id in ["po", "hv"] {
        rule(
            m,
            &format!("V{id}"),
            &format!(
                "(1 dimensionless - HCT) * (BW * FV{id} - FV{id} / (FVar + FVve + FVpo + FVhv) * BW * Fblood * (1 l_per_kg - (FVar + FVve + FVpo + FVhv)))"
            ),
            "l",
        )?;
    }

    m.add_compartment(Compartment::new("Vgulumen", 1.0, "l").name("intestinal lumen").variable())
        .add_compartment(Compartment::new("Vstomach", 1.0, "l").name("stomach"))
        .add_compartment(Compartment::new("Vfeces", 1.0, "l").name("feces"))
        .add_compartment(Compartment::new("Vurine", 1.0, "l").name("urine"))
        .add_compartment(Compartment::new("Vbi", 1.0, "l").name("bile"));
    rule(m, "Vgulumen", "f_lumen * Vgu", "l")?;

    m.add_species(Species::concentration("Clumen_sor", "Vgulumen", 0.0).name("sorafenib (lumen)"))
        .add_species(Species::concentration("Clumen_sg", "Vgulumen", 0.0).name("sorafenib glucuronide (lumen)"))
        .add_species(Species::amount("Afeces_sor", "Vfeces", 0.0).name("sorafenib (feces)"))
        .add_species(Species::amount("Afeces_sg", "Vfeces", 0.0).name("sorafenib glucuronide (feces)"))
        .add_species(Species::amount("Aurine_sg", "Vurine", 0.0).name("sorafenib glucuronide (urine)"));

    m.add_parameter(Parameter::new("Ka_dis_sor", 0.6042, "per_hr").name("dissolution rate sorafenib"))
        .add_parameter(
            Parameter::new("PODOSE_sor", 0.0, "mg")
                .name("oral dose sorafenib")
                .variable(),
        );
    Ok(())
}

fn circulating_species(m: &mut ModelDefinition, substance: &Substance) -> Result<(), ModelError> {
    let sid = substance.id;
    m.add_parameter(
        Parameter::new(&format!("Mr_{sid}"), substance.mr, "g_per_mole")
            .name(&format!("molecular weight {}", substance.name)),
    );

    let pools = ORGANS
        .iter()
        .map(|(id, name)| (format!("C{id}_plasma_{sid}"), format!("V{id}_plasma"), *name))
        .chain(
            BLOOD
                .iter()
                .map(|(id, name)| (format!("C{id}_{sid}"), format!("V{id}"), *name)),
        )
        .collect::<Vec<_>>();

    for (species, compartment, name) in pools {
        let suffix = &species[1..];
        m.add_species(
            Species::concentration(&species, &compartment, 0.0)
                .name(&format!("{} ({name})", substance.name)),
        );
        m.add_parameter(Parameter::new(&format!("A{suffix}"), 0.0, "mmole").variable())
            .add_parameter(Parameter::new(&format!("M{suffix}"), 0.0, "mg_per_l").variable());
        rule(m, &format!("A{suffix}"), &format!("{species} * {compartment}"), "mmole")?;
        rule(m, &format!("M{suffix}"), &format!("{species} * Mr_{sid}"), "mg_per_l")?;
    }

    if sid != "sor" {
        let ratio = format!("Cve_{sid}_sor");
        m.add_parameter(
            Parameter::new(&ratio, 0.0, "dimensionless")
                .name(&format!("{} to sorafenib ratio (venous)", substance.name))
                .variable(),
        );
        rule(m, &ratio, &format!("Cve_{sid} / (Cve_sor + {RATIO_FLOOR})"), "dimensionless")?;
    }
    Ok(())
}

/// Convective transport of one substance along the circulation
fn flows(m: &mut ModelDefinition, sid: &str) -> Result<(), ModelError> {
    let plasma = |organ: &str| format!("C{organ}_plasma_{sid}");
    let blood = |pool: &str| format!("C{pool}_{sid}");

    let mut edges: Vec<(String, String, String, String)> = vec![
        ("ve_lu".into(), blood("ve"), plasma("lu"), "Qlu".into()),
        ("lu_ar".into(), plasma("lu"), blood("ar"), "Qlu".into()),
    ];
    for (organ, flow) in [("ki", "Qki"), ("re", "Qre")] {
        edges.push((format!("ar_{organ}"), blood("ar"), plasma(organ), flow.into()));
        edges.push((format!("{organ}_ve"), plasma(organ), blood("ve"), flow.into()));
    }
    edges.extend([
        ("ar_gu".into(), blood("ar"), plasma("gu"), "Qgu".into()),
        ("gu_po".into(), plasma("gu"), blood("po"), "Qgu".into()),
        (
            "arli_li".into(),
            blood("ar"),
            plasma("li"),
            "(1 dimensionless - f_shunts) * Qha".into(),
        ),
        ("arli_hv".into(), blood("ar"), blood("hv"), "f_shunts * Qha".into()),
        (
            "po_li".into(),
            blood("po"),
            plasma("li"),
            "(1 dimensionless - f_shunts) * Qpo".into(),
        ),
        ("po_hv".into(), blood("po"), blood("hv"), "f_shunts * Qpo".into()),
        (
            "li_hv".into(),
            plasma("li"),
            blood("hv"),
            "(1 dimensionless - f_shunts) * (Qpo + Qha)".into(),
        ),
        ("hv_ve".into(), blood("hv"), blood("ve"), "Qh".into()),
    ]);

    for (edge, from, to, flow) in edges {
        let id = format!("Flow_{edge}_{sid}");
        let formula = format!("{flow} * {from}");
        let compartment = m
            .species(&from)
            .map(|s| s.compartment.clone())
            .ok_or_else(|| ModelError::UnknownSpecies {
                reaction: id.clone(),
                species: from.clone(),
            })?;
        m.add_reaction(
            Reaction::new(&id, &format!("{from} -> {to}"), &formula)?
                .name(&format!("flow {edge} {sid}"))
                .compartment(&compartment),
        );
    }
    Ok(())
}
