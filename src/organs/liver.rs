//! Liver: hepatic uptake, metabolism and biliary excretion
//!
//! Sorafenib enters hepatocytes through a reversible transporter (SORIM),
//! is oxidised to M2 (SOR2M2), and M2 either leaves to plasma (M2EX) or is
//! glucuronidated to SG (M2GLU). SG is exported into bile (SGEX) and bile is
//! emptied into the intestinal lumen at the same rate (SGEHC), closing the
//! enterohepatic loop with the intestine.

use crate::model::{Compartment, ModelDefinition, ModelError, Parameter, Reaction, Species};
use crate::units::UnitCatalogue;

pub const ID: &str = "sorafenib_liver";

/// Build the liver submodel
pub fn liver(units: &UnitCatalogue) -> Result<ModelDefinition, ModelError> {
    let mut m = ModelDefinition::new(ID, "Sorafenib liver");

    m.add_compartment(Compartment::new("Vext", 1.5, "l").name("plasma").port())
        .add_compartment(Compartment::new("Vli", 1.5, "l").name("liver").port())
        .add_compartment(Compartment::new("Vbi", 1.0, "l").name("bile").port())
        .add_compartment(
            Compartment::new("Vlumen", 0.1, "l")
                .name("intestinal lumen")
                .variable()
                .port(),
        );

    m.add_species(Species::concentration("sor_ext", "Vext", 0.0).name("sorafenib (plasma)").port())
        .add_species(Species::concentration("m2_ext", "Vext", 0.0).name("M2 (plasma)").port())
        .add_species(Species::concentration("sor", "Vli", 0.0).name("sorafenib (liver)"))
        .add_species(Species::concentration("m2", "Vli", 0.0).name("M2 (liver)"))
        .add_species(Species::concentration("sg", "Vli", 0.0).name("sorafenib glucuronide (liver)"))
        .add_species(Species::amount("sg_bi", "Vbi", 0.0).name("sorafenib glucuronide (bile)"))
        .add_species(
            Species::concentration("sg_lumen", "Vlumen", 0.0)
                .name("sorafenib glucuronide (lumen)")
                .port(),
        );

    let kinetics = [
        ("SORIM_Vmax", 1.0, "mmole_per_min_l"),
        ("SORIM_Km_sor", 0.1, "mM"),
        ("SOR2M2_Vmax", 0.1, "mmole_per_min_l"),
        ("SOR2M2_Km_sor", 0.1, "mM"),
        ("M2EX_Vmax", 1.0, "mmole_per_min_l"),
        ("M2EX_Km_m2", 0.1, "mM"),
        ("M2GLU_Vmax", 0.1, "mmole_per_min_l"),
        ("M2GLU_Km_m2", 0.1, "mM"),
        ("SGEX_Vmax", 1.0, "mmole_per_min_l"),
        ("SGEX_Km_sg", 0.1, "mM"),
    ];
    for (id, value, unit) in kinetics {
        m.add_parameter(Parameter::new(id, value, unit));
    }

    m.add_reaction(
        Reaction::new(
            "SORIM",
            "sor_ext <-> sor",
            "SORIM_Vmax / SORIM_Km_sor * Vli * (sor_ext - sor) / (1 dimensionless + sor_ext / SORIM_Km_sor + sor / SORIM_Km_sor)",
        )?
        .name("sorafenib import (SORIM)")
        .compartment("Vli"),
    )
    .add_reaction(
        Reaction::new(
            "SOR2M2",
            "sor -> m2",
            "SOR2M2_Vmax / SOR2M2_Km_sor * Vli * sor / (1 dimensionless + sor / SOR2M2_Km_sor)",
        )?
        .name("sorafenib oxidation (SOR2M2)")
        .compartment("Vli"),
    )
    .add_reaction(
        Reaction::new(
            "M2EX",
            "m2 <-> m2_ext",
            "M2EX_Vmax / M2EX_Km_m2 * Vli * (m2 - m2_ext) / (1 dimensionless + m2_ext / M2EX_Km_m2 + m2 / M2EX_Km_m2)",
        )?
        .name("M2 export (M2EX)")
        .compartment("Vli"),
    )
    .add_reaction(
        Reaction::new("M2GLU", "m2 -> sg", "M2GLU_Vmax * Vli * m2 / (m2 + M2GLU_Km_m2)")?
            .name("M2 glucuronidation (M2GLU)")
            .compartment("Vli"),
    )
    .add_reaction(
        Reaction::new("SGEX", "sg -> sg_bi", "SGEX_Vmax * Vli * sg / (sg + SGEX_Km_sg)")?
            .name("SG biliary export (SGEX)")
            .compartment("Vli"),
    )
    .add_reaction(
        Reaction::new("SGEHC", "sg_bi -> sg_lumen", "SGEX")?
            .name("SG enterohepatic circulation (SGEHC)")
            .compartment("Vbi"),
    );

    m.validate(units)?;
    Ok(m)
}
