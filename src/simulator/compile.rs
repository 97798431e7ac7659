//! Compilation of a flat model into an evaluable ODE system

use std::collections::{BTreeMap, HashMap};

use nalgebra::DVector;

use super::solver::OdeSystem;
use super::SimulationError;
use crate::model::expr::{BinaryOp, Expr, Function};
use crate::model::validation::{evaluation_order, Derived};
use crate::model::{ModelDefinition, ModelError, ModelUnits};

/// Expression with identifiers resolved to slots
#[derive(Debug, Clone)]
enum Node {
    Const(f64),
    Value(usize),
    Neg(Box<Node>),
    Binary(BinaryOp, Box<Node>, Box<Node>),
    Call(Function, Vec<Node>),
}

impl Node {
    fn compile(expr: &Expr, lookup: &HashMap<String, usize>, element: &str) -> Result<Node, ModelError> {
        let node = match expr {
            // Annotations only carry units, values are already in the declared unit
            Expr::Number { value, .. } => Node::Const(*value),
            Expr::Symbol(id) => Node::Value(*lookup.get(id).ok_or_else(|| {
                ModelError::UnknownSymbol {
                    element: element.to_string(),
                    symbol: id.clone(),
                }
            })?),
            Expr::Neg(inner) => Node::Neg(Box::new(Node::compile(inner, lookup, element)?)),
            Expr::Binary { op, lhs, rhs } => Node::Binary(
                *op,
                Box::new(Node::compile(lhs, lookup, element)?),
                Box::new(Node::compile(rhs, lookup, element)?),
            ),
            Expr::Call { function, args } => Node::Call(
                *function,
                args.iter()
                    .map(|a| Node::compile(a, lookup, element))
                    .collect::<Result<_, _>>()?,
            ),
        };
        Ok(node)
    }

    fn eval(&self, values: &[f64]) -> f64 {
        match self {
            Node::Const(v) => *v,
            Node::Value(slot) => values[*slot],
            Node::Neg(inner) => -inner.eval(values),
            Node::Binary(op, lhs, rhs) => {
                let (a, b) = (lhs.eval(values), rhs.eval(values));
                match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                    BinaryOp::Pow => a.powf(b),
                }
            }
            Node::Call(function, args) => match args.as_slice() {
                [a] => function.apply(&[a.eval(values)]),
                [a, b] => function.apply(&[a.eval(values), b.eval(values)]),
                _ => f64::NAN,
            },
        }
    }
}

/// Role of a value table slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slot {
    /// Constant or otherwise ungoverned value, settable between segments
    Constant,
    Assignment,
    /// Species value seen by expressions, derived from the amount state
    Species {
        state: usize,
        compartment: usize,
        amount_only: bool,
    },
    RateRule {
        state: usize,
    },
    Reaction,
}

#[derive(Debug, Clone)]
enum Instruction {
    Assign { slot: usize, node: Node },
    Species { slot: usize },
    Rate { slot: usize, node: Node },
}

#[derive(Debug, Clone)]
struct CompiledReaction {
    slot: usize,
    reactants: Vec<usize>,
    products: Vec<usize>,
}

#[derive(Debug, Clone)]
pub(crate) struct CompiledModel {
    units: ModelUnits,
    ids: Vec<String>,
    lookup: HashMap<String, usize>,
    slots: Vec<Slot>,
    value_units: Vec<String>,
    defaults: Vec<f64>,
    bounds: Vec<Option<(f64, f64)>>,
    program: Vec<Instruction>,
    /// Slot of the species behind each amount state
    species: Vec<usize>,
    substance_units: Vec<String>,
    /// Target slot and math of each rate rule, states follow the species
    rate_rules: Vec<(usize, Node)>,
    reactions: Vec<CompiledReaction>,
}

impl CompiledModel {
    pub(crate) fn compile(model: &ModelDefinition) -> Result<Self, ModelError> {
        let mut ids = Vec::new();
        let mut slots = Vec::new();
        let mut value_units = Vec::new();
        let mut defaults = Vec::new();
        let mut bounds = Vec::new();

        for c in &model.compartments {
            ids.push(c.id.clone());
            slots.push(Slot::Constant);
            value_units.push(c.unit.clone());
            defaults.push(c.size);
            bounds.push(None);
        }
        let first_species = ids.len();
        for (i, s) in model.species.iter().enumerate() {
            let compartment = model
                .compartments
                .iter()
                .position(|c| c.id == s.compartment)
                .ok_or_else(|| ModelError::UnknownCompartment {
                    element: s.id.clone(),
                    compartment: s.compartment.clone(),
                })?;
            ids.push(s.id.clone());
            slots.push(Slot::Species {
                state: i,
                compartment,
                amount_only: s.has_only_substance_units,
            });
            value_units.push(if s.has_only_substance_units {
                s.substance_unit.clone()
            } else {
                format!("{}/{}", s.substance_unit, model.compartments[compartment].unit)
            });
            defaults.push(s.initial);
            bounds.push(None);
        }
        for p in &model.parameters {
            ids.push(p.id.clone());
            slots.push(Slot::Constant);
            value_units.push(p.unit.clone());
            defaults.push(p.value);
            bounds.push(p.bounds);
        }
        let first_reaction = ids.len();
        for r in &model.reactions {
            ids.push(r.id.clone());
            slots.push(Slot::Reaction);
            value_units.push(model.units.reaction_rate());
            defaults.push(0.0);
            bounds.push(None);
        }
        let lookup: HashMap<String, usize> =
            ids.iter().enumerate().map(|(i, id)| (id.clone(), i)).collect();

        let target = |variable: &str| {
            lookup
                .get(variable)
                .copied()
                .ok_or_else(|| ModelError::InvalidRuleTarget {
                    variable: variable.to_string(),
                })
        };
        for rule in &model.assignment_rules {
            slots[target(&rule.variable)?] = Slot::Assignment;
        }
        let n_species = model.species.len();
        let mut rate_rules = Vec::with_capacity(model.rate_rules.len());
        for (j, rule) in model.rate_rules.iter().enumerate() {
            let slot = target(&rule.variable)?;
            slots[slot] = Slot::RateRule {
                state: n_species + j,
            };
            rate_rules.push((slot, Node::compile(&rule.math, &lookup, &rule.variable)?));
        }

        let mut program = Vec::new();
        for derived in evaluation_order(model)? {
            let instruction = match derived {
                Derived::Assignment(k) => {
                    let rule = &model.assignment_rules[k];
                    Instruction::Assign {
                        slot: target(&rule.variable)?,
                        node: Node::compile(&rule.math, &lookup, &rule.variable)?,
                    }
                }
                Derived::Species(k) => Instruction::Species {
                    slot: first_species + k,
                },
                Derived::Reaction(k) => {
                    let reaction = &model.reactions[k];
                    Instruction::Rate {
                        slot: first_reaction + k,
                        node: Node::compile(&reaction.formula, &lookup, &reaction.id)?,
                    }
                }
            };
            program.push(instruction);
        }

        let species_state = |reaction: &str, id: &String| -> Result<usize, ModelError> {
            model
                .species
                .iter()
                .position(|s| &s.id == id)
                .ok_or_else(|| ModelError::UnknownSpecies {
                    reaction: reaction.to_string(),
                    species: id.clone(),
                })
        };
        let mut reactions = Vec::with_capacity(model.reactions.len());
        for (k, r) in model.reactions.iter().enumerate() {
            reactions.push(CompiledReaction {
                slot: first_reaction + k,
                reactants: r
                    .reactants
                    .iter()
                    .map(|s| species_state(&r.id, s))
                    .collect::<Result<_, _>>()?,
                products: r
                    .products
                    .iter()
                    .map(|s| species_state(&r.id, s))
                    .collect::<Result<_, _>>()?,
            });
        }

        Ok(CompiledModel {
            units: model.units.clone(),
            species: (first_species..first_species + n_species).collect(),
            substance_units: model.species.iter().map(|s| s.substance_unit.clone()).collect(),
            ids,
            lookup,
            slots,
            value_units,
            defaults,
            bounds,
            program,
            rate_rules,
            reactions,
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.ids.len()
    }

    pub(crate) fn state_len(&self) -> usize {
        self.species.len() + self.rate_rules.len()
    }

    pub(crate) fn units(&self) -> &ModelUnits {
        &self.units
    }

    pub(crate) fn ids(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(|s| s.as_str())
    }

    pub(crate) fn lookup(&self, id: &str) -> Option<usize> {
        self.lookup.get(id).copied()
    }

    pub(crate) fn slot(&self, slot: usize) -> &Slot {
        &self.slots[slot]
    }

    /// Unit of the value a slot holds
    pub(crate) fn unit(&self, slot: usize) -> &str {
        &self.value_units[slot]
    }

    /// Substance unit of a species slot, the value unit otherwise
    pub(crate) fn substance_unit(&self, slot: usize) -> &str {
        match self.slots[slot] {
            Slot::Species { state, .. } => &self.substance_units[state],
            _ => &self.value_units[slot],
        }
    }

    /// Value table and state at the start of a simulation
    ///
    /// Constant changes are applied before rules are evaluated, so that
    /// compartment sizes derived from changed parameters scale the initial
    /// amounts. Species and rate-rule changes then override the state.
    pub(crate) fn initial(
        &self,
        changes: &BTreeMap<String, f64>,
    ) -> Result<(Vec<f64>, DVector<f64>), SimulationError> {
        let mut values = self.defaults.clone();
        self.set_constants(changes, &mut values)?;

        // Species slots still hold their declared initial values here
        for instruction in &self.program {
            match instruction {
                Instruction::Assign { slot, node } | Instruction::Rate { slot, node } => {
                    let v = node.eval(&values);
                    values[*slot] = v;
                }
                Instruction::Species { .. } => {}
            }
        }

        let mut state = DVector::zeros(self.state_len());
        for (i, &slot) in self.species.iter().enumerate() {
            if let Slot::Species {
                compartment,
                amount_only,
                ..
            } = self.slots[slot]
            {
                state[i] = if amount_only {
                    values[slot]
                } else {
                    values[slot] * values[compartment]
                };
            }
        }
        let n = self.species.len();
        for (j, (slot, _)) in self.rate_rules.iter().enumerate() {
            state[n + j] = values[*slot];
        }

        self.set_states(changes, &mut values, &mut state)?;
        self.evaluate(&state, &mut values);
        Ok((values, state))
    }

    /// Apply changes at a segment boundary, keeping everything else
    pub(crate) fn apply(
        &self,
        changes: &BTreeMap<String, f64>,
        values: &mut [f64],
        state: &mut DVector<f64>,
    ) -> Result<(), SimulationError> {
        self.set_constants(changes, values)?;
        self.evaluate(state, values);
        self.set_states(changes, values, state)?;
        self.evaluate(state, values);
        Ok(())
    }

    fn set_constants(
        &self,
        changes: &BTreeMap<String, f64>,
        values: &mut [f64],
    ) -> Result<(), SimulationError> {
        for (id, &value) in changes {
            let slot = self
                .lookup(id)
                .ok_or_else(|| SimulationError::UnknownSymbol { id: id.clone() })?;
            if !value.is_finite() {
                return Err(SimulationError::NonFiniteValue {
                    id: id.clone(),
                    value,
                });
            }
            if let Some((lower, upper)) = self.bounds[slot] {
                if value < lower || value > upper {
                    return Err(SimulationError::OutOfBounds {
                        id: id.clone(),
                        value,
                        lower,
                        upper,
                    });
                }
            }
            match self.slots[slot] {
                Slot::Constant => values[slot] = value,
                Slot::Species { .. } | Slot::RateRule { .. } => {}
                Slot::Assignment => {
                    return Err(SimulationError::NotSettable {
                        id: id.clone(),
                        reason: "value is governed by an assignment rule".to_string(),
                    })
                }
                Slot::Reaction => {
                    return Err(SimulationError::NotSettable {
                        id: id.clone(),
                        reason: "reaction rates are derived".to_string(),
                    })
                }
            }
        }
        Ok(())
    }

    /// Concentration species are set as concentrations in the current compartment size
    fn set_states(
        &self,
        changes: &BTreeMap<String, f64>,
        values: &mut [f64],
        state: &mut DVector<f64>,
    ) -> Result<(), SimulationError> {
        for (id, &value) in changes {
            let Some(slot) = self.lookup(id) else {
                return Err(SimulationError::UnknownSymbol { id: id.clone() });
            };
            match self.slots[slot] {
                Slot::Species {
                    state: i,
                    compartment,
                    amount_only,
                } => {
                    state[i] = if amount_only {
                        value
                    } else {
                        value * values[compartment]
                    };
                }
                Slot::RateRule { state: i } => {
                    state[i] = value;
                    values[slot] = value;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Fill every derived slot from the state
    pub(crate) fn evaluate(&self, state: &DVector<f64>, values: &mut [f64]) {
        let n = self.species.len();
        for (j, (slot, _)) in self.rate_rules.iter().enumerate() {
            values[*slot] = state[n + j];
        }
        for instruction in &self.program {
            match instruction {
                Instruction::Assign { slot, node } | Instruction::Rate { slot, node } => {
                    let v = node.eval(values);
                    values[*slot] = v;
                }
                Instruction::Species { slot } => {
                    if let Slot::Species {
                        state: i,
                        compartment,
                        amount_only,
                    } = self.slots[*slot]
                    {
                        values[*slot] = if amount_only {
                            state[i]
                        } else {
                            state[i] / values[compartment]
                        };
                    }
                }
            }
        }
    }

    fn derivatives(&self, state: &DVector<f64>, values: &mut [f64], dy: &mut DVector<f64>) {
        self.evaluate(state, values);
        dy.fill(0.0);
        for reaction in &self.reactions {
            let rate = values[reaction.slot];
            for &s in &reaction.reactants {
                dy[s] -= rate;
            }
            for &s in &reaction.products {
                dy[s] += rate;
            }
        }
        let n = self.species.len();
        for (j, (_, node)) in self.rate_rules.iter().enumerate() {
            dy[n + j] = node.eval(values);
        }
    }
}

/// Right-hand side over one segment's value table
pub(crate) struct Rhs<'a> {
    model: &'a CompiledModel,
    values: Vec<f64>,
}

impl<'a> Rhs<'a> {
    pub(crate) fn new(model: &'a CompiledModel, values: Vec<f64>) -> Self {
        Rhs { model, values }
    }
}

impl OdeSystem for Rhs<'_> {
    fn dimension(&self) -> usize {
        self.model.state_len()
    }

    fn rhs(&mut self, _t: f64, y: &DVector<f64>, dy: &mut DVector<f64>) {
        self.model.derivatives(y, &mut self.values, dy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Compartment, Parameter, RateRule, Reaction, Species};
    use approx::assert_relative_eq;

    fn transfer() -> ModelDefinition {
        let mut m = ModelDefinition::new("transfer", "transfer");
        m.add_compartment(Compartment::new("Va", 2.0, "l"))
            .add_compartment(Compartment::new("Vb", 1.0, "l").variable())
            .add_species(Species::concentration("a", "Va", 3.0))
            .add_species(Species::amount("b", "Vb", 0.0))
            .add_parameter(Parameter::new("k", 0.1, "per_min"))
            .add_parameter(Parameter::new("scale", 2.0, "dimensionless"))
            .add_reaction(Reaction::new("T", "a -> b", "k * Va * a").unwrap())
            .add_rate_rule(RateRule::new("Vb", "0 l_per_min", "l_per_min").unwrap());
        m
    }

    #[test]
    fn initial_amounts_use_compartment_sizes() {
        let compiled = CompiledModel::compile(&transfer()).unwrap();
        let (values, state) = compiled.initial(&BTreeMap::new()).unwrap();
        assert_relative_eq!(state[0], 6.0);
        assert_relative_eq!(state[1], 0.0);
        // Rate-rule compartment is a state after the species
        assert_eq!(compiled.state_len(), 3);
        assert_relative_eq!(values[compiled.lookup("T").unwrap()], 0.1 * 2.0 * 3.0);
    }

    #[test]
    fn changes_set_concentrations_and_constants() {
        let compiled = CompiledModel::compile(&transfer()).unwrap();
        let changes = BTreeMap::from([("a".to_string(), 1.0), ("Va".to_string(), 4.0)]);
        let (_, state) = compiled.initial(&changes).unwrap();
        assert_relative_eq!(state[0], 4.0);
    }

    #[test]
    fn derived_values_are_not_settable() {
        let compiled = CompiledModel::compile(&transfer()).unwrap();
        let changes = BTreeMap::from([("T".to_string(), 1.0)]);
        assert!(matches!(
            compiled.initial(&changes),
            Err(SimulationError::NotSettable { .. })
        ));
        let changes = BTreeMap::from([("nope".to_string(), 1.0)]);
        assert!(matches!(
            compiled.initial(&changes),
            Err(SimulationError::UnknownSymbol { .. })
        ));
    }

    #[test]
    fn derivatives_conserve_transferred_mass() {
        let compiled = CompiledModel::compile(&transfer()).unwrap();
        let (mut values, state) = compiled.initial(&BTreeMap::new()).unwrap();
        let mut dy = DVector::zeros(compiled.state_len());
        compiled.derivatives(&state, &mut values, &mut dy);
        assert_relative_eq!(dy[0], -0.6);
        assert_relative_eq!(dy[1], 0.6);
        assert_relative_eq!(dy[2], 0.0);
    }
}
