//! Intestine: oral application, dissolution, absorption and fecal excretion
//!
//! The oral dose `PODOSE_sor` (mg) is released into the stomach by a fast
//! first-order application step, dissolves into the lumen with `Ka_dis_sor`
//! and is taken up across the apical membrane with saturable kinetics. A
//! fraction `F_sor_abs` of the uptake flux reaches the plasma, the remainder
//! is routed to feces.
//!
//! The glucuronide SG arriving in the lumen through bile is handled with the
//! same absorption kinetics and the same absorbed fraction as the parent
//! compound. This is a simplifying assumption of the model, not a measured
//! property of SG.

use crate::model::{
    AssignmentRule, Compartment, ModelDefinition, ModelError, Parameter, RateRule, Reaction,
    Species,
};
use crate::units::UnitCatalogue;

pub const ID: &str = "sorafenib_intestine";

/// Build the intestine submodel
pub fn intestine(units: &UnitCatalogue) -> Result<ModelDefinition, ModelError> {
    let mut m = ModelDefinition::new(ID, "Sorafenib intestine");

    m.add_compartment(Compartment::new("Vext", 1.0, "l").name("plasma").port())
        .add_compartment(Compartment::new("Vgu", 1.2825, "l").name("intestine").port())
        .add_compartment(
            Compartment::new("Vlumen", 1.2825 * 0.9, "l")
                .name("intestinal lumen")
                .variable()
                .port(),
        )
        .add_compartment(Compartment::new("Vfeces", 1.0, "l").name("feces").port())
        .add_compartment(Compartment::new("Vstomach", 1.0, "l").name("stomach").port());

    m.add_species(Species::amount("sor_stomach", "Vstomach", 0.0).name("sorafenib (stomach)"))
        .add_species(Species::concentration("sor_lumen", "Vlumen", 0.0).name("sorafenib (lumen)").port())
        .add_species(Species::concentration("sor_ext", "Vext", 0.0).name("sorafenib (plasma)").port())
        .add_species(Species::amount("sor_feces", "Vfeces", 0.0).name("sorafenib (feces)").port())
        .add_species(Species::concentration("sg_lumen", "Vlumen", 0.0).name("sorafenib glucuronide (lumen)").port())
        .add_species(Species::concentration("sg_ext", "Vext", 0.0).name("sorafenib glucuronide (plasma)").port())
        .add_species(Species::amount("sg_feces", "Vfeces", 0.0).name("sorafenib glucuronide (feces)").port());

    m.add_parameter(
        Parameter::new("F_sor_abs", 0.5, "dimensionless")
            .name("fraction absorbed sorafenib")
            .bounds(0.0, 1.0),
    )
    .add_parameter(Parameter::new("SORABS_Vmax", 0.02, "per_min").name("apical uptake capacity"))
    .add_parameter(Parameter::new("SORABS_Km", 10.0, "mM").name("apical uptake half-saturation"))
    .add_parameter(Parameter::new("f_OATP2B1", 1.0, "dimensionless").name("OATP2B1 activity"))
    .add_parameter(
        Parameter::new("PODOSE_sor", 0.0, "mg")
            .name("oral dose sorafenib")
            .variable()
            .port(),
    )
    .add_parameter(Parameter::new("Ka_application_sor", 1000.0, "per_hr").name("application rate"))
    .add_parameter(Parameter::new("Ka_dis_sor", 2.0, "per_hr").name("dissolution rate").port())
    .add_parameter(Parameter::new("Mr_sor", 464.826, "g_per_mole").name("molecular weight sorafenib").port())
    .add_parameter(Parameter::new("absorption_sor", 0.0, "mmole_per_min").variable())
    .add_parameter(Parameter::new("absorption_sg", 0.0, "mmole_per_min").variable());

    for sid in ["sor", "sg"] {
        m.add_assignment_rule(AssignmentRule::new(
            &format!("absorption_{sid}"),
            &format!("SORABS_Vmax * Vgu * {sid}_lumen / (1 dimensionless + {sid}_lumen / SORABS_Km)"),
            "mmole_per_min",
        )?);
    }

    m.add_reaction(
        Reaction::new(
            "SORABS",
            "sor_lumen -> sor_ext",
            "F_sor_abs * absorption_sor * f_OATP2B1",
        )?
        .name("absorption sorafenib")
        .compartment("Vgu"),
    )
    .add_reaction(
        Reaction::new(
            "SOREXC",
            "sor_lumen -> sor_feces",
            "(1 dimensionless - F_sor_abs) * absorption_sor",
        )?
        .name("excretion sorafenib (feces)")
        .compartment("Vlumen"),
    )
    .add_reaction(
        Reaction::new("SGABS", "sg_lumen -> sg_ext", "F_sor_abs * absorption_sg")?
            .name("absorption sorafenib glucuronide")
            .compartment("Vgu"),
    )
    .add_reaction(
        Reaction::new(
            "SGEXC",
            "sg_lumen -> sg_feces",
            "(1 dimensionless - F_sor_abs) * absorption_sg",
        )?
        .name("excretion sorafenib glucuronide (feces)")
        .compartment("Vlumen"),
    )
    .add_reaction(
        Reaction::new(
            "application_sor",
            "-> sor_stomach",
            "Ka_application_sor / 60 min_per_hr * PODOSE_sor / Mr_sor",
        )?
        .name("application sorafenib")
        .compartment("Vstomach"),
    )
    .add_reaction(
        Reaction::new(
            "dissolution_sor",
            "sor_stomach -> sor_lumen",
            "Ka_dis_sor / 60 min_per_hr * sor_stomach",
        )?
        .name("dissolution sorafenib")
        .compartment("Vgu"),
    );

    // Remaining dose drains as it is applied
    m.add_rate_rule(RateRule::new(
        "PODOSE_sor",
        "-application_sor * Mr_sor",
        "mg_per_min",
    )?);

    m.validate(units)?;
    Ok(m)
}
