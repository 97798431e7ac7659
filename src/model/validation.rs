//! Build-time validation of model definitions
//!
//! Every check runs before a model is simulated, so a malformed model fails
//! with an error naming the offending element instead of producing a
//! trajectory.

use std::collections::{HashMap, HashSet, VecDeque};

use super::expr::{BinaryOp, Expr, ExprError, Function};
use super::{Element, ModelDefinition, ModelError};
use crate::units::{Unit, UnitCatalogue};

/// Validator for model definitions
pub struct Validator<'a> {
    units: &'a UnitCatalogue,
}

impl<'a> Validator<'a> {
    pub fn new(units: &'a UnitCatalogue) -> Self {
        Self { units }
    }

    /// Validate a model definition
    pub fn validate(&self, model: &ModelDefinition) -> Result<(), ModelError> {
        // 1. Every unit identifier resolves
        self.validate_unit_declarations(model)?;

        // 2. Identifiers are unique across all element kinds
        validate_identifiers(model)?;

        // 3. Compartments, species and symbols referenced exist
        validate_references(model)?;

        // 4. Rule targets are variable and governed at most once
        validate_rules(model)?;

        // 5. Rate laws and rules are dimensionally consistent
        self.validate_unit_consistency(model)?;

        // 6. Derived quantities can be evaluated in some order
        evaluation_order(model)?;

        Ok(())
    }

    fn resolve(&self, element: &str, unit: &str) -> Result<Unit, ModelError> {
        self.units
            .parse(unit)
            .map_err(|source| ModelError::unit(element, source))
    }

    fn validate_unit_declarations(&self, model: &ModelDefinition) -> Result<(), ModelError> {
        let u = &model.units;
        for unit in [&u.time, &u.substance, &u.extent, &u.volume, &u.area, &u.length] {
            self.resolve(&model.id, unit)?;
        }
        for c in &model.compartments {
            self.resolve(&c.id, &c.unit)?;
        }
        for s in &model.species {
            self.resolve(&s.id, &s.substance_unit)?;
        }
        for p in &model.parameters {
            self.resolve(&p.id, &p.unit)?;
        }
        for rule in &model.assignment_rules {
            self.resolve(&rule.variable, &rule.unit)?;
        }
        for rule in &model.rate_rules {
            self.resolve(&rule.variable, &rule.unit)?;
        }
        let expressions = model
            .reactions
            .iter()
            .map(|r| (r.id.as_str(), &r.formula))
            .chain(model.assignment_rules.iter().map(|r| (r.variable.as_str(), &r.math)))
            .chain(model.rate_rules.iter().map(|r| (r.variable.as_str(), &r.math)));
        for (element, expr) in expressions {
            for unit in expr.unit_annotations() {
                self.resolve(element, unit)?;
            }
        }
        Ok(())
    }

    /// Unit of the value each identifier stands for inside expressions
    pub fn symbol_units(&self, model: &ModelDefinition) -> Result<HashMap<String, Unit>, ModelError> {
        let mut table = HashMap::new();
        for c in &model.compartments {
            table.insert(c.id.clone(), self.resolve(&c.id, &c.unit)?);
        }
        for s in &model.species {
            let substance = self.resolve(&s.id, &s.substance_unit)?;
            let unit = if s.has_only_substance_units {
                substance
            } else {
                let compartment = model.compartment(&s.compartment).ok_or_else(|| {
                    ModelError::UnknownCompartment {
                        element: s.id.clone(),
                        compartment: s.compartment.clone(),
                    }
                })?;
                substance / self.resolve(&compartment.id, &compartment.unit)?
            };
            table.insert(s.id.clone(), unit);
        }
        for p in &model.parameters {
            table.insert(p.id.clone(), self.resolve(&p.id, &p.unit)?);
        }
        let rate = self.resolve(&model.id, &model.units.reaction_rate())?;
        for r in &model.reactions {
            table.insert(r.id.clone(), rate);
        }
        Ok(table)
    }

    fn validate_unit_consistency(&self, model: &ModelDefinition) -> Result<(), ModelError> {
        let table = self.symbol_units(model)?;
        let rate = self.resolve(&model.id, &model.units.reaction_rate())?;
        let time = self.resolve(&model.id, &model.units.time)?;

        for reaction in &model.reactions {
            let found = self.infer(&reaction.formula, &table, &reaction.id)?;
            expect_equivalent(&reaction.id, &model.units.reaction_rate(), &rate, &found)?;
        }

        for rule in &model.assignment_rules {
            let declared = self.resolve(&rule.variable, &rule.unit)?;
            let found = self.infer(&rule.math, &table, &rule.variable)?;
            expect_equivalent(&rule.variable, &rule.unit, &declared, &found)?;
            if let Some(target) = table.get(&rule.variable) {
                expect_equivalent(&rule.variable, &rule.unit, &declared, target)?;
            }
        }

        for rule in &model.rate_rules {
            let declared = self.resolve(&rule.variable, &rule.unit)?;
            let found = self.infer(&rule.math, &table, &rule.variable)?;
            expect_equivalent(&rule.variable, &rule.unit, &declared, &found)?;
            if let Some(target) = table.get(&rule.variable) {
                let expected = *target / time;
                expect_equivalent(
                    &rule.variable,
                    &format!("{}/{}", rule.unit, model.units.time),
                    &expected,
                    &declared,
                )?;
            }
        }
        Ok(())
    }

    /// Infer the unit of an expression given the units of its symbols
    pub fn infer(
        &self,
        expr: &Expr,
        scope: &HashMap<String, Unit>,
        element: &str,
    ) -> Result<Unit, ModelError> {
        match expr {
            Expr::Number { unit: None, .. } => Ok(Unit::DIMENSIONLESS),
            Expr::Number { unit: Some(unit), .. } => self.resolve(element, unit),
            Expr::Symbol(id) => scope.get(id).copied().ok_or_else(|| ModelError::UnknownSymbol {
                element: element.to_string(),
                symbol: id.clone(),
            }),
            Expr::Neg(inner) => self.infer(inner, scope, element),
            Expr::Binary { op, lhs, rhs } => {
                let l = self.infer(lhs, scope, element)?;
                let r = self.infer(rhs, scope, element)?;
                match op {
                    BinaryOp::Add | BinaryOp::Sub => {
                        expect_equivalent(element, &l.to_string(), &l, &r)?;
                        Ok(l)
                    }
                    BinaryOp::Mul => Ok(l * r),
                    BinaryOp::Div => Ok(l / r),
                    BinaryOp::Pow => power_unit(element, l, r, rhs),
                }
            }
            Expr::Call { function, args } => {
                let units = args
                    .iter()
                    .map(|a| self.infer(a, scope, element))
                    .collect::<Result<Vec<_>, _>>()?;
                match (function, units.as_slice()) {
                    (Function::Power, [base, exponent]) => {
                        power_unit(element, *base, *exponent, &args[1])
                    }
                    (Function::Exp | Function::Ln | Function::Log10, [arg]) => {
                        expect_equivalent(element, "dimensionless", &Unit::DIMENSIONLESS, arg)?;
                        Ok(Unit::DIMENSIONLESS)
                    }
                    (Function::Sqrt, [arg]) => arg.sqrt().ok_or_else(|| ModelError::UnitMismatch {
                        element: element.to_string(),
                        expected: "a unit with even exponents".to_string(),
                        found: arg.to_string(),
                    }),
                    (Function::Abs, [arg]) => Ok(*arg),
                    (Function::Min | Function::Max, [a, b]) => {
                        expect_equivalent(element, &a.to_string(), a, b)?;
                        Ok(*a)
                    }
                    _ => Err(ModelError::Expression {
                        element: element.to_string(),
                        source: ExprError::Arity {
                            name: function.name().to_string(),
                            expected: function.arity(),
                            found: units.len(),
                        },
                    }),
                }
            }
        }
    }
}

fn expect_equivalent(element: &str, label: &str, expected: &Unit, found: &Unit) -> Result<(), ModelError> {
    if expected.is_equivalent(found) {
        Ok(())
    } else {
        Err(ModelError::UnitMismatch {
            element: element.to_string(),
            expected: format!("{} [{}]", label, expected),
            found: found.to_string(),
        })
    }
}

/// `base ^ exponent`: the exponent is dimensionless, and unless the base is
/// dimensionless it must be an integer literal.
fn power_unit(element: &str, base: Unit, exponent: Unit, exponent_expr: &Expr) -> Result<Unit, ModelError> {
    expect_equivalent(element, "dimensionless exponent", &Unit::DIMENSIONLESS, &exponent)?;
    if base.is_equivalent(&Unit::DIMENSIONLESS) {
        return Ok(Unit::DIMENSIONLESS);
    }
    match exponent_expr.literal() {
        Some(n) if n.fract() == 0.0 => Ok(base.powi(n as i32)),
        Some(n) if base.is_dimensionless() => Ok(Unit::new(base.dimension, base.scale.powf(n))),
        _ => Err(ModelError::UnitMismatch {
            element: element.to_string(),
            expected: "a dimensionless base or an integer exponent".to_string(),
            found: base.to_string(),
        }),
    }
}

fn validate_identifiers(model: &ModelDefinition) -> Result<(), ModelError> {
    let mut seen = HashSet::new();
    for element in model.elements() {
        if !seen.insert(element.id()) {
            return Err(ModelError::DuplicateIdentifier {
                id: element.id().to_string(),
            });
        }
    }
    Ok(())
}

fn validate_references(model: &ModelDefinition) -> Result<(), ModelError> {
    let compartments: HashSet<&str> = model.compartments.iter().map(|c| c.id.as_str()).collect();
    let species: HashSet<&str> = model.species.iter().map(|s| s.id.as_str()).collect();
    let symbols: HashSet<&str> = model.elements().map(|e| e.id()).collect();

    for s in &model.species {
        if !compartments.contains(s.compartment.as_str()) {
            return Err(ModelError::UnknownCompartment {
                element: s.id.clone(),
                compartment: s.compartment.clone(),
            });
        }
    }

    for r in &model.reactions {
        if let Some(c) = &r.compartment {
            if !compartments.contains(c.as_str()) {
                return Err(ModelError::UnknownCompartment {
                    element: r.id.clone(),
                    compartment: c.clone(),
                });
            }
        }
        for participant in r.reactants.iter().chain(&r.products) {
            if !species.contains(participant.as_str()) {
                return Err(ModelError::UnknownSpecies {
                    reaction: r.id.clone(),
                    species: participant.clone(),
                });
            }
        }
    }

    let expressions = model
        .reactions
        .iter()
        .map(|r| (r.id.as_str(), &r.formula))
        .chain(model.assignment_rules.iter().map(|r| (r.variable.as_str(), &r.math)))
        .chain(model.rate_rules.iter().map(|r| (r.variable.as_str(), &r.math)));
    for (element, expr) in expressions {
        if let Some(symbol) = expr.symbols().into_iter().find(|s| !symbols.contains(s)) {
            return Err(ModelError::UnknownSymbol {
                element: element.to_string(),
                symbol: symbol.to_string(),
            });
        }
    }
    Ok(())
}

fn validate_rules(model: &ModelDefinition) -> Result<(), ModelError> {
    let mut governed = HashSet::new();
    let targets = model
        .assignment_rules
        .iter()
        .map(|r| r.variable.as_str())
        .chain(model.rate_rules.iter().map(|r| r.variable.as_str()));
    for variable in targets {
        let constant = match model.element(variable) {
            Some(Element::Compartment(c)) => c.constant,
            Some(Element::Parameter(p)) => p.constant,
            _ => {
                return Err(ModelError::InvalidRuleTarget {
                    variable: variable.to_string(),
                })
            }
        };
        if constant {
            return Err(ModelError::RuleOnConstant {
                variable: variable.to_string(),
            });
        }
        if !governed.insert(variable) {
            return Err(ModelError::MultipleRules {
                variable: variable.to_string(),
            });
        }
    }
    Ok(())
}

/// A quantity recomputed from state and constants at every evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Derived {
    /// Index into `assignment_rules`
    Assignment(usize),
    /// Index into `species`: concentration or amount seen by expressions
    Species(usize),
    /// Index into `reactions`: the reaction rate
    Reaction(usize),
}

/// Order in which derived quantities must be evaluated
///
/// Assignment rules, species values and reaction rates may reference each
/// other (a rate law may reference another reaction's rate, a ratio rule may
/// reference concentrations in rule-sized compartments). Kahn's algorithm over
/// that graph, seeded in declaration order, gives a deterministic order.
pub fn evaluation_order(model: &ModelDefinition) -> Result<Vec<Derived>, ModelError> {
    let mut nodes: Vec<(Derived, &str)> = Vec::new();
    nodes.extend(
        model
            .assignment_rules
            .iter()
            .enumerate()
            .map(|(i, r)| (Derived::Assignment(i), r.variable.as_str())),
    );
    nodes.extend(
        model
            .species
            .iter()
            .enumerate()
            .map(|(i, s)| (Derived::Species(i), s.id.as_str())),
    );
    nodes.extend(
        model
            .reactions
            .iter()
            .enumerate()
            .map(|(i, r)| (Derived::Reaction(i), r.id.as_str())),
    );
    let index: HashMap<&str, usize> = nodes.iter().enumerate().map(|(i, (_, id))| (*id, i)).collect();

    // dependents[j] lists nodes that need node j first
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut indegree = vec![0usize; nodes.len()];
    for (i, (node, _)) in nodes.iter().enumerate() {
        let dependencies: Vec<&str> = match node {
            Derived::Assignment(k) => model.assignment_rules[*k].math.symbols().into_iter().collect(),
            Derived::Species(k) => vec![model.species[*k].compartment.as_str()],
            Derived::Reaction(k) => model.reactions[*k].formula.symbols().into_iter().collect(),
        };
        for dependency in dependencies {
            if let Some(&j) = index.get(dependency) {
                dependents[j].push(i);
                indegree[i] += 1;
            }
        }
    }

    let mut queue: VecDeque<usize> = (0..nodes.len()).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(nodes.len());
    while let Some(j) = queue.pop_front() {
        order.push(nodes[j].0);
        for &i in &dependents[j] {
            indegree[i] -= 1;
            if indegree[i] == 0 {
                queue.push_back(i);
            }
        }
    }

    if order.len() != nodes.len() {
        let mut ids: Vec<String> = nodes
            .iter()
            .enumerate()
            .filter(|(i, _)| indegree[*i] > 0)
            .map(|(_, (_, id))| id.to_string())
            .collect();
        ids.sort();
        return Err(ModelError::CircularDependency { ids });
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AssignmentRule, Compartment, Parameter, RateRule, Reaction, Species};

    fn two_pool_model(rate_law: &str) -> ModelDefinition {
        let mut model = ModelDefinition::new("two_pool", "two pools");
        model
            .add_compartment(Compartment::new("V", 1.0, "l"))
            .add_species(Species::concentration("a", "V", 1.0))
            .add_species(Species::amount("b", "V", 0.0))
            .add_parameter(Parameter::new("k", 0.1, "per_min"))
            .add_reaction(Reaction::new("R1", "a -> b", rate_law).unwrap());
        model
    }

    #[test]
    fn consistent_rate_law_passes() {
        let units = UnitCatalogue::standard();
        two_pool_model("k * V * a").validate(&units).unwrap();
    }

    #[test]
    fn inconsistent_rate_law_is_rejected() {
        let units = UnitCatalogue::standard();
        let err = two_pool_model("k * a").validate(&units).unwrap_err();
        assert!(matches!(err, ModelError::UnitMismatch { ref element, .. } if element == "R1"));
    }

    #[test]
    fn adding_a_bare_number_to_a_concentration_is_rejected() {
        let units = UnitCatalogue::standard();
        let err = two_pool_model("k * V * (a + 1)").validate(&units).unwrap_err();
        assert!(matches!(err, ModelError::UnitMismatch { .. }));
        two_pool_model("k * V * (a + 1 mM)").validate(&units).unwrap();
    }

    #[test]
    fn unknown_symbols_and_species_are_named() {
        let units = UnitCatalogue::standard();
        let err = two_pool_model("k2 * V * a").validate(&units).unwrap_err();
        assert_eq!(
            err,
            ModelError::UnknownSymbol {
                element: "R1".to_string(),
                symbol: "k2".to_string()
            }
        );

        let mut model = two_pool_model("k * V * a");
        model.add_reaction(Reaction::new("R2", "b -> c", "k * b").unwrap());
        assert!(matches!(
            model.validate(&units),
            Err(ModelError::UnknownSpecies { ref species, .. }) if species == "c"
        ));
    }

    #[test]
    fn duplicate_identifiers_are_rejected() {
        let units = UnitCatalogue::standard();
        let mut model = two_pool_model("k * V * a");
        model.add_parameter(Parameter::new("a", 1.0, "dimensionless"));
        assert_eq!(
            model.validate(&units),
            Err(ModelError::DuplicateIdentifier { id: "a".to_string() })
        );
    }

    #[test]
    fn element_ids_borrow_from_the_model() {
        let model = two_pool_model("k * V * a");
        let ids: Vec<&str> = model.elements().map(|e| e.id()).collect();
        assert_eq!(ids, ["V", "a", "b", "k", "R1"]);
    }

    #[test]
    fn rules_need_variable_targets() {
        let units = UnitCatalogue::standard();
        let mut model = two_pool_model("k * V * a");
        model.add_assignment_rule(AssignmentRule::new("k", "2 per_min", "per_min").unwrap());
        assert_eq!(
            model.validate(&units),
            Err(ModelError::RuleOnConstant { variable: "k".to_string() })
        );

        let mut model = two_pool_model("k * V * a");
        model.add_parameter(Parameter::new("x", 0.0, "mmole").variable());
        model.add_assignment_rule(AssignmentRule::new("x", "b", "mmole").unwrap());
        model.add_rate_rule(RateRule::new("x", "R1", "mmole_per_min").unwrap());
        assert_eq!(
            model.validate(&units),
            Err(ModelError::MultipleRules { variable: "x".to_string() })
        );
    }

    #[test]
    fn rate_rule_unit_is_target_per_time() {
        let units = UnitCatalogue::standard();
        let mut model = two_pool_model("k * V * a");
        model.add_parameter(Parameter::new("dose", 0.0, "mg").variable());
        model.add_rate_rule(RateRule::new("dose", "-R1", "mmole_per_min").unwrap());
        assert!(matches!(model.validate(&units), Err(ModelError::UnitMismatch { .. })));
    }

    #[test]
    fn circular_rules_are_detected() {
        let units = UnitCatalogue::standard();
        let mut model = two_pool_model("k * V * a");
        model
            .add_parameter(Parameter::new("x", 0.0, "dimensionless").variable())
            .add_parameter(Parameter::new("y", 0.0, "dimensionless").variable())
            .add_assignment_rule(AssignmentRule::new("x", "y + 1", "dimensionless").unwrap())
            .add_assignment_rule(AssignmentRule::new("y", "2 * x", "dimensionless").unwrap());
        assert_eq!(
            model.validate(&units),
            Err(ModelError::CircularDependency {
                ids: vec!["x".to_string(), "y".to_string()]
            })
        );
    }

    #[test]
    fn order_puts_volumes_before_concentrations() {
        let mut model = ModelDefinition::new("ordered", "ordered");
        model
            .add_compartment(Compartment::new("V", 1.0, "l").variable())
            .add_parameter(Parameter::new("BW", 75.0, "kg"))
            .add_parameter(Parameter::new("FV", 0.01, "l_per_kg"))
            .add_species(Species::concentration("c", "V", 0.0))
            .add_assignment_rule(AssignmentRule::new("V", "BW * FV", "l").unwrap());
        let order = evaluation_order(&model).unwrap();
        let rule = order.iter().position(|d| *d == Derived::Assignment(0)).unwrap();
        let species = order.iter().position(|d| *d == Derived::Species(0)).unwrap();
        assert!(rule < species);
        model.validate(&UnitCatalogue::standard()).unwrap();
    }

    #[test]
    fn power_needs_dimensionless_base_or_integer_exponent() {
        let units = UnitCatalogue::standard();
        let mut model = two_pool_model("k * V * a");
        model
            .add_parameter(Parameter::new("BW", 75.0, "kg"))
            .add_parameter(Parameter::new("s", 0.0, "dimensionless").variable())
            .add_assignment_rule(AssignmentRule::new("s", "power(BW, 0.5)", "dimensionless").unwrap());
        assert!(matches!(model.validate(&units), Err(ModelError::UnitMismatch { .. })));

        let mut model = two_pool_model("k * V * a");
        model
            .add_parameter(Parameter::new("BW", 75.0, "kg"))
            .add_parameter(Parameter::new("s", 0.0, "dimensionless").variable())
            .add_assignment_rule(AssignmentRule::new("s", "power(BW/1 kg, 0.5)", "dimensionless").unwrap());
        model.validate(&units).unwrap();
    }
}
