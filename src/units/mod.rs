//! Units and quantities
//!
//! Every value declared in a model carries a unit identifier that is resolved
//! against a [`UnitCatalogue`]. Units are a [`Dimension`] (integer exponents of
//! mass, length, time and amount) and a scale relative to the SI base units,
//! which is enough to check rate laws and rules at build time and to convert
//! observed data into model units.

mod catalogue;
mod dimension;

pub use catalogue::UnitCatalogue;
pub use dimension::{Dimension, Unit};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from unit lookup, parsing and conversion
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UnitError {
    #[error("Unknown unit '{0}'")]
    UnknownUnit(String),

    #[error("Could not parse unit '{input}': {message}")]
    Parse { input: String, message: String },

    #[error("Cannot convert '{from}' to '{to}': incompatible dimensions")]
    Incompatible { from: String, to: String },
}

/// A value paired with the unit expression it is expressed in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub value: f64,
    pub unit: String,
}

impl Quantity {
    pub fn new(value: f64, unit: impl Into<String>) -> Self {
        Quantity {
            value,
            unit: unit.into(),
        }
    }

    /// Express this quantity in another unit of the same dimension
    pub fn convert(&self, units: &UnitCatalogue, to: &str) -> Result<Quantity, UnitError> {
        Ok(Quantity {
            value: units.convert(self.value, &self.unit, to)?,
            unit: to.to_string(),
        })
    }
}

impl std::fmt::Display for Quantity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}
