//! Kidney: urinary excretion of the glucuronide

use crate::model::{Compartment, ModelDefinition, ModelError, Parameter, Reaction, Species};
use crate::units::UnitCatalogue;

pub const ID: &str = "sorafenib_kidney";

/// Build the kidney submodel
pub fn kidney(units: &UnitCatalogue) -> Result<ModelDefinition, ModelError> {
    let mut m = ModelDefinition::new(ID, "Sorafenib kidney");

    m.add_compartment(Compartment::new("Vext", 1.0, "l").name("plasma").port())
        .add_compartment(Compartment::new("Vki", 0.3, "l").name("kidney").port())
        .add_compartment(Compartment::new("Vurine", 1.0, "l").name("urine").port());

    m.add_species(
        Species::concentration("sg_ext", "Vext", 0.0)
            .name("sorafenib glucuronide (plasma)")
            .port(),
    )
    .add_species(
        Species::amount("sg_urine", "Vurine", 0.0)
            .name("sorafenib glucuronide (urine)")
            .port(),
    );

    m.add_parameter(
        Parameter::new("f_renal_function", 1.0, "dimensionless")
            .name("renal function scaling")
            .port(),
    )
    .add_parameter(Parameter::new("SGEX_k", 0.01, "per_min").name("rate urinary excretion of SG"));

    m.add_reaction(
        Reaction::new(
            "SGEX",
            "sg_ext -> sg_urine",
            "f_renal_function * SGEX_k * Vki * sg_ext",
        )?
        .name("SG urinary excretion (SGEX)")
        .compartment("Vki"),
    );

    m.validate(units)?;
    Ok(m)
}
