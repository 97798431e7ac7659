//! Hierarchical composition and flattening
//!
//! A [`CompositeModel`] embeds complete child models as named submodels. Each
//! child exports ports (elements flagged `port`); the parent lists explicit
//! [`Replacement`]s that bind a child port to one of its own elements. The
//! resolution pass checks the binding table for completeness and unit
//! agreement, and [`CompositeModel::flatten`] produces a single flat
//! [`ModelDefinition`] in which
//!
//! - bound ports disappear and every reference to them points at the parent element
//! - all other child identifiers are prefixed with `<SUBMODEL>__`
//! - child reactions and rules are carried over with rewritten references

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::validation::Validator;
use super::{Element, ElementKind, ModelDefinition, ModelError};
use crate::units::UnitCatalogue;

/// Separator between submodel id and child identifier in flattened ids
pub const SEPARATOR: &str = "__";

/// A child model embedded under an id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submodel {
    pub id: String,
    pub model: ModelDefinition,
}

/// Declaration that `submodel.port` is the parent's `element`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replacement {
    pub submodel: String,
    pub port: String,
    pub element: String,
}

/// A resolved and checked replacement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub submodel: String,
    pub port: String,
    pub element: String,
    pub kind: ElementKind,
}

/// A model with embedded submodels, before flattening
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeModel {
    pub model: ModelDefinition,
    pub submodels: Vec<Submodel>,
    pub replacements: Vec<Replacement>,
}

impl CompositeModel {
    pub fn new(model: ModelDefinition) -> Self {
        CompositeModel {
            model,
            submodels: Vec::new(),
            replacements: Vec::new(),
        }
    }

    pub fn add_submodel(&mut self, id: &str, model: ModelDefinition) -> &mut Self {
        self.submodels.push(Submodel {
            id: id.to_string(),
            model,
        });
        self
    }

    /// Bind `port` of `submodel` to the parent element `element`
    pub fn replace(&mut self, submodel: &str, port: &str, element: &str) -> &mut Self {
        self.replacements.push(Replacement {
            submodel: submodel.to_string(),
            port: port.to_string(),
            element: element.to_string(),
        });
        self
    }

    pub fn submodel(&self, id: &str) -> Option<&Submodel> {
        self.submodels.iter().find(|s| s.id == id)
    }

    /// Resolve the replacement table
    ///
    /// Fails on the first unknown submodel, unknown or non-port child element,
    /// unknown parent element, duplicate binding, kind or unit mismatch, or
    /// species whose compartment is bound elsewhere than the parent species'
    /// compartment. Every port of every submodel must be bound exactly once.
    pub fn bindings(&self, units: &UnitCatalogue) -> Result<Vec<Binding>, ModelError> {
        let mut submodel_ids = HashSet::new();
        for sub in &self.submodels {
            if !submodel_ids.insert(sub.id.as_str()) {
                return Err(ModelError::DuplicateSubmodel {
                    submodel: sub.id.clone(),
                });
            }
        }

        let validator = Validator::new(units);
        let parent_units = validator.symbol_units(&self.model)?;
        let mut child_units = HashMap::new();
        for sub in &self.submodels {
            child_units.insert(sub.id.as_str(), validator.symbol_units(&sub.model)?);
        }

        let mut table: HashMap<(&str, &str), &str> = HashMap::new();
        let mut bindings = Vec::with_capacity(self.replacements.len());
        for r in &self.replacements {
            let sub = self.submodel(&r.submodel).ok_or_else(|| ModelError::UnknownSubmodel {
                submodel: r.submodel.clone(),
            })?;
            let port = sub.model.element(&r.port).ok_or_else(|| ModelError::UnknownPort {
                submodel: r.submodel.clone(),
                port: r.port.clone(),
            })?;
            if !port.is_port() {
                return Err(ModelError::NotAPort {
                    submodel: r.submodel.clone(),
                    port: r.port.clone(),
                });
            }
            if table
                .insert((r.submodel.as_str(), r.port.as_str()), r.element.as_str())
                .is_some()
            {
                return Err(ModelError::DuplicateBinding {
                    submodel: r.submodel.clone(),
                    port: r.port.clone(),
                });
            }
            let target = self.model.element(&r.element).ok_or_else(|| {
                ModelError::UnknownBindingTarget {
                    submodel: r.submodel.clone(),
                    port: r.port.clone(),
                    element: r.element.clone(),
                }
            })?;
            if port.kind() != target.kind() {
                return Err(ModelError::BindingKindMismatch {
                    submodel: r.submodel.clone(),
                    port: r.port.clone(),
                    port_kind: port.kind(),
                    element: r.element.clone(),
                    element_kind: target.kind(),
                });
            }

            let same_mode = match (port, target) {
                (Element::Species(a), Element::Species(b)) => {
                    a.has_only_substance_units == b.has_only_substance_units
                }
                _ => true,
            };
            let port_unit = child_units.get(sub.id.as_str()).and_then(|t| t.get(&r.port));
            let element_unit = parent_units.get(&r.element);
            let same_unit = match (port_unit, element_unit) {
                (Some(a), Some(b)) => a.is_equivalent(b),
                _ => false,
            };
            if !same_mode || !same_unit {
                return Err(ModelError::BindingUnitMismatch {
                    submodel: r.submodel.clone(),
                    port: r.port.clone(),
                    port_unit: describe_unit(&sub.model, port),
                    element: r.element.clone(),
                    element_unit: describe_unit(&self.model, target),
                });
            }

            bindings.push(Binding {
                submodel: r.submodel.clone(),
                port: r.port.clone(),
                element: r.element.clone(),
                kind: port.kind(),
            });
        }

        for sub in &self.submodels {
            for port in sub.model.ports() {
                if !table.contains_key(&(sub.id.as_str(), port.id())) {
                    return Err(ModelError::UnboundPort {
                        submodel: sub.id.clone(),
                        port: port.id().to_string(),
                    });
                }
            }
        }

        // A bound species must end up in the compartment its parent counterpart lives in
        for binding in &bindings {
            let (Some(sub), Some(parent)) = (
                self.submodel(&binding.submodel),
                self.model.species(&binding.element),
            ) else {
                continue;
            };
            let Some(child) = sub.model.species(&binding.port) else {
                continue;
            };
            let resolved = table
                .get(&(sub.id.as_str(), child.compartment.as_str()))
                .map(|c| c.to_string())
                .unwrap_or_else(|| prefixed(&sub.id, &child.compartment));
            if resolved != parent.compartment {
                return Err(ModelError::BindingCompartmentMismatch {
                    submodel: sub.id.clone(),
                    port: binding.port.clone(),
                    element: binding.element.clone(),
                    expected: resolved,
                    found: parent.compartment.clone(),
                });
            }
        }

        Ok(bindings)
    }

    /// Flatten into a single model definition
    pub fn flatten(&self, units: &UnitCatalogue) -> Result<ModelDefinition, ModelError> {
        for sub in &self.submodels {
            sub.model.validate(units)?;
        }
        let bindings = self.bindings(units)?;

        let mut flat = self.model.clone();
        for sub in &self.submodels {
            let bound: HashMap<&str, &str> = bindings
                .iter()
                .filter(|b| b.submodel == sub.id)
                .map(|b| (b.port.as_str(), b.element.as_str()))
                .collect();
            let rename = |id: &str| -> String {
                match bound.get(id) {
                    Some(element) => element.to_string(),
                    None => prefixed(&sub.id, id),
                }
            };
            let model = &sub.model;

            for c in model.compartments.iter().filter(|c| !bound.contains_key(c.id.as_str())) {
                let mut c = c.clone();
                c.id = rename(&c.id);
                c.port = false;
                flat.compartments.push(c);
            }
            for s in model.species.iter().filter(|s| !bound.contains_key(s.id.as_str())) {
                let mut s = s.clone();
                s.id = rename(&s.id);
                s.compartment = rename(&s.compartment);
                s.port = false;
                flat.species.push(s);
            }
            for p in model.parameters.iter().filter(|p| !bound.contains_key(p.id.as_str())) {
                let mut p = p.clone();
                p.id = rename(&p.id);
                p.port = false;
                flat.parameters.push(p);
            }
            for r in &model.reactions {
                let mut r = r.clone();
                r.id = rename(&r.id);
                r.compartment = r.compartment.as_deref().map(|c| rename(c));
                r.reactants = r.reactants.iter().map(|s| rename(s)).collect();
                r.products = r.products.iter().map(|s| rename(s)).collect();
                r.formula = r.formula.rename(&rename);
                flat.reactions.push(r);
            }
            for rule in &model.assignment_rules {
                let mut rule = rule.clone();
                rule.variable = rename(&rule.variable);
                rule.math = rule.math.rename(&rename);
                flat.assignment_rules.push(rule);
            }
            for rule in &model.rate_rules {
                let mut rule = rule.clone();
                rule.variable = rename(&rule.variable);
                rule.math = rule.math.rename(&rename);
                flat.rate_rules.push(rule);
            }
        }

        flat.validate(units)?;
        debug!(
            model = %flat.id,
            submodels = self.submodels.len(),
            bindings = bindings.len(),
            compartments = flat.compartments.len(),
            species = flat.species.len(),
            parameters = flat.parameters.len(),
            reactions = flat.reactions.len(),
            "flattened composite model"
        );
        Ok(flat)
    }
}

fn prefixed(submodel: &str, id: &str) -> String {
    format!("{}{}{}", submodel, SEPARATOR, id)
}

fn describe_unit(model: &ModelDefinition, element: Element<'_>) -> String {
    match element {
        Element::Compartment(c) => c.unit.clone(),
        Element::Parameter(p) => p.unit.clone(),
        Element::Species(s) if s.has_only_substance_units => format!("{} (amount)", s.substance_unit),
        Element::Species(s) => {
            let volume = model
                .compartment(&s.compartment)
                .map(|c| c.unit.as_str())
                .unwrap_or("?");
            format!("{}/{}", s.substance_unit, volume)
        }
        Element::Reaction(_) => model.units.reaction_rate(),
    }
}
