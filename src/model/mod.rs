//! Declarative compartmental models
//!
//! A [`ModelDefinition`] is a plain value listing compartments, species,
//! parameters, reactions and rules. Organ builders produce one each; the body
//! assembler embeds them as submodels of a [`CompositeModel`] and binds their
//! ports to body elements. [`CompositeModel::flatten`] resolves the bindings
//! into a single flat definition, which is what the simulator compiles and
//! what gets persisted as the model artifact.

pub mod compose;
pub mod expr;
pub mod io;
mod types;
pub mod validation;

pub use compose::{Binding, CompositeModel, Replacement, Submodel, SEPARATOR};
pub use expr::{Expr, ExprError};
pub use types::*;
pub use validation::Validator;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::units::{UnitCatalogue, UnitError};

/// Build-time errors: everything that can be wrong with a model before it is simulated
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("Invalid expression for '{element}': {source}")]
    Expression { element: String, source: ExprError },

    #[error("Unit error in '{element}': {source}")]
    Unit { element: String, source: UnitError },

    #[error("Invalid equation '{equation}' for reaction '{reaction}'")]
    InvalidEquation { reaction: String, equation: String },

    #[error("Duplicate identifier '{id}'")]
    DuplicateIdentifier { id: String },

    #[error("'{element}' references unknown compartment '{compartment}'")]
    UnknownCompartment { element: String, compartment: String },

    #[error("Reaction '{reaction}' references unknown species '{species}'")]
    UnknownSpecies { reaction: String, species: String },

    #[error("'{element}' references unknown symbol '{symbol}'")]
    UnknownSymbol { element: String, symbol: String },

    #[error("Rule target '{variable}' is not a compartment, species or parameter")]
    InvalidRuleTarget { variable: String },

    #[error("Rule target '{variable}' is declared constant")]
    RuleOnConstant { variable: String },

    #[error("'{variable}' is governed by more than one rule")]
    MultipleRules { variable: String },

    #[error("Unit mismatch in '{element}': expected {expected}, found {found}")]
    UnitMismatch {
        element: String,
        expected: String,
        found: String,
    },

    #[error("Circular dependency between {}", .ids.join(", "))]
    CircularDependency { ids: Vec<String> },

    #[error("Unknown submodel '{submodel}'")]
    UnknownSubmodel { submodel: String },

    #[error("Duplicate submodel '{submodel}'")]
    DuplicateSubmodel { submodel: String },

    #[error("Submodel '{submodel}' has no element '{port}'")]
    UnknownPort { submodel: String, port: String },

    #[error("'{port}' of submodel '{submodel}' is not a port")]
    NotAPort { submodel: String, port: String },

    #[error("Port '{submodel}.{port}' is not bound")]
    UnboundPort { submodel: String, port: String },

    #[error("Port '{submodel}.{port}' is bound more than once")]
    DuplicateBinding { submodel: String, port: String },

    #[error("Port '{submodel}.{port}' is bound to unknown element '{element}'")]
    UnknownBindingTarget {
        submodel: String,
        port: String,
        element: String,
    },

    #[error("Port '{submodel}.{port}' is a {port_kind} and cannot bind to {element_kind} '{element}'")]
    BindingKindMismatch {
        submodel: String,
        port: String,
        port_kind: ElementKind,
        element: String,
        element_kind: ElementKind,
    },

    #[error("Port '{submodel}.{port}' has unit {port_unit} but '{element}' has unit {element_unit}")]
    BindingUnitMismatch {
        submodel: String,
        port: String,
        port_unit: String,
        element: String,
        element_unit: String,
    },

    #[error("Port '{submodel}.{port}' lives in '{expected}' but '{element}' lives in '{found}'")]
    BindingCompartmentMismatch {
        submodel: String,
        port: String,
        element: String,
        expected: String,
        found: String,
    },
}

impl ModelError {
    pub(crate) fn unit(element: &str, source: UnitError) -> Self {
        ModelError::Unit {
            element: element.to_string(),
            source,
        }
    }
}

/// A complete, flat compartmental model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDefinition {
    pub id: String,
    pub name: String,
    pub units: ModelUnits,
    pub compartments: Vec<Compartment>,
    pub species: Vec<Species>,
    pub parameters: Vec<Parameter>,
    pub reactions: Vec<Reaction>,
    pub assignment_rules: Vec<AssignmentRule>,
    pub rate_rules: Vec<RateRule>,
}

impl ModelDefinition {
    pub fn new(id: &str, name: &str) -> Self {
        ModelDefinition {
            id: id.to_string(),
            name: name.to_string(),
            units: ModelUnits::default(),
            compartments: Vec::new(),
            species: Vec::new(),
            parameters: Vec::new(),
            reactions: Vec::new(),
            assignment_rules: Vec::new(),
            rate_rules: Vec::new(),
        }
    }

    pub fn add_compartment(&mut self, compartment: Compartment) -> &mut Self {
        self.compartments.push(compartment);
        self
    }

    pub fn add_species(&mut self, species: Species) -> &mut Self {
        self.species.push(species);
        self
    }

    pub fn add_parameter(&mut self, parameter: Parameter) -> &mut Self {
        self.parameters.push(parameter);
        self
    }

    pub fn add_reaction(&mut self, reaction: Reaction) -> &mut Self {
        self.reactions.push(reaction);
        self
    }

    pub fn add_assignment_rule(&mut self, rule: AssignmentRule) -> &mut Self {
        self.assignment_rules.push(rule);
        self
    }

    pub fn add_rate_rule(&mut self, rule: RateRule) -> &mut Self {
        self.rate_rules.push(rule);
        self
    }

    pub fn compartment(&self, id: &str) -> Option<&Compartment> {
        self.compartments.iter().find(|c| c.id == id)
    }

    pub fn species(&self, id: &str) -> Option<&Species> {
        self.species.iter().find(|s| s.id == id)
    }

    pub fn parameter(&self, id: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.id == id)
    }

    pub fn parameter_mut(&mut self, id: &str) -> Option<&mut Parameter> {
        self.parameters.iter_mut().find(|p| p.id == id)
    }

    pub fn reaction(&self, id: &str) -> Option<&Reaction> {
        self.reactions.iter().find(|r| r.id == id)
    }

    pub fn assignment_rule(&self, variable: &str) -> Option<&AssignmentRule> {
        self.assignment_rules.iter().find(|r| r.variable == variable)
    }

    pub fn rate_rule(&self, variable: &str) -> Option<&RateRule> {
        self.rate_rules.iter().find(|r| r.variable == variable)
    }

    /// Every named element, in declaration order by kind
    pub fn elements(&self) -> impl Iterator<Item = Element<'_>> {
        self.compartments
            .iter()
            .map(Element::Compartment)
            .chain(self.species.iter().map(Element::Species))
            .chain(self.parameters.iter().map(Element::Parameter))
            .chain(self.reactions.iter().map(Element::Reaction))
    }

    pub fn element(&self, id: &str) -> Option<Element<'_>> {
        self.elements().find(|e| e.id() == id)
    }

    /// Elements exported for binding by a parent model
    pub fn ports(&self) -> Vec<Element<'_>> {
        self.elements().filter(|e| e.is_port()).collect()
    }

    /// Run every build-time check against `units`
    pub fn validate(&self, units: &UnitCatalogue) -> Result<(), ModelError> {
        Validator::new(units).validate(self)
    }
}
