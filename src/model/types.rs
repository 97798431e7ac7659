use serde::{Deserialize, Serialize};

use super::expr::Expr;
use super::ModelError;

/// Units in which the model is expressed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelUnits {
    pub time: String,
    pub substance: String,
    pub extent: String,
    pub volume: String,
    pub area: String,
    pub length: String,
}

impl Default for ModelUnits {
    fn default() -> Self {
        ModelUnits {
            time: "min".to_string(),
            substance: "mmole".to_string(),
            extent: "mmole".to_string(),
            volume: "l".to_string(),
            area: "m2".to_string(),
            length: "m".to_string(),
        }
    }
}

impl ModelUnits {
    /// Unit every reaction rate must reduce to
    pub fn reaction_rate(&self) -> String {
        format!("{}/{}", self.extent, self.time)
    }
}

/// A named physical volume
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Compartment {
    pub id: String,
    pub name: String,
    pub size: f64,
    pub unit: String,
    pub constant: bool,
    #[serde(default)]
    pub port: bool,
}

impl Compartment {
    pub fn new(id: &str, size: f64, unit: &str) -> Self {
        Compartment {
            id: id.to_string(),
            name: id.to_string(),
            size,
            unit: unit.to_string(),
            constant: true,
            port: false,
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Size may change, either through a rule or an override between segments
    pub fn variable(mut self) -> Self {
        self.constant = false;
        self
    }

    pub fn port(mut self) -> Self {
        self.port = true;
        self
    }
}

/// A chemical entity confined to one compartment
///
/// `initial` is a concentration unless `has_only_substance_units` is set, in
/// which case it is an amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Species {
    pub id: String,
    pub name: String,
    pub compartment: String,
    pub initial: f64,
    pub substance_unit: String,
    pub has_only_substance_units: bool,
    #[serde(default)]
    pub port: bool,
}

impl Species {
    pub fn concentration(id: &str, compartment: &str, initial: f64) -> Self {
        Species {
            id: id.to_string(),
            name: id.to_string(),
            compartment: compartment.to_string(),
            initial,
            substance_unit: "mmole".to_string(),
            has_only_substance_units: false,
            port: false,
        }
    }

    pub fn amount(id: &str, compartment: &str, initial: f64) -> Self {
        Species {
            has_only_substance_units: true,
            ..Species::concentration(id, compartment, initial)
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn substance_unit(mut self, unit: &str) -> Self {
        self.substance_unit = unit.to_string();
        self
    }

    pub fn port(mut self) -> Self {
        self.port = true;
        self
    }
}

/// A named scalar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub id: String,
    pub name: String,
    pub value: f64,
    pub unit: String,
    pub constant: bool,
    #[serde(default)]
    pub port: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<(f64, f64)>,
}

impl Parameter {
    pub fn new(id: &str, value: f64, unit: &str) -> Self {
        Parameter {
            id: id.to_string(),
            name: id.to_string(),
            value,
            unit: unit.to_string(),
            constant: true,
            port: false,
            bounds: None,
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn variable(mut self) -> Self {
        self.constant = false;
        self
    }

    pub fn port(mut self) -> Self {
        self.port = true;
        self
    }

    /// Closed interval of admissible values
    pub fn bounds(mut self, lower: f64, upper: f64) -> Self {
        self.bounds = Some((lower, upper));
        self
    }
}

/// A transformation or transport between species with a rate law in extent/time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compartment: Option<String>,
    pub reactants: Vec<String>,
    pub products: Vec<String>,
    pub reversible: bool,
    pub formula: Expr,
}

impl Reaction {
    /// Declare a reaction from an equation such as `sor_ext <-> sor` or `-> sor_stomach`
    pub fn new(id: &str, equation: &str, formula: &str) -> Result<Self, ModelError> {
        let (reactants, products, reversible) = parse_equation(id, equation)?;
        let formula = Expr::parse(formula).map_err(|source| ModelError::Expression {
            element: id.to_string(),
            source,
        })?;
        Ok(Reaction {
            id: id.to_string(),
            name: id.to_string(),
            compartment: None,
            reactants,
            products,
            reversible,
            formula,
        })
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn compartment(mut self, compartment: &str) -> Self {
        self.compartment = Some(compartment.to_string());
        self
    }

    pub fn equation(&self) -> String {
        let arrow = if self.reversible { "<->" } else { "->" };
        format!(
            "{} {} {}",
            self.reactants.join(" + "),
            arrow,
            self.products.join(" + ")
        )
        .trim()
        .to_string()
    }
}

fn parse_equation(id: &str, equation: &str) -> Result<(Vec<String>, Vec<String>, bool), ModelError> {
    let invalid = || ModelError::InvalidEquation {
        reaction: id.to_string(),
        equation: equation.to_string(),
    };
    let (lhs, rhs, reversible) = if let Some((lhs, rhs)) = equation.split_once("<->") {
        (lhs, rhs, true)
    } else if let Some((lhs, rhs)) = equation.split_once("->") {
        (lhs, rhs, false)
    } else {
        return Err(invalid());
    };
    let side = |text: &str| -> Result<Vec<String>, ModelError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }
        text.split('+')
            .map(|s| {
                let s = s.trim();
                let valid = !s.is_empty() && s.chars().all(|c| c.is_alphanumeric() || c == '_');
                if valid {
                    Ok(s.to_string())
                } else {
                    Err(invalid())
                }
            })
            .collect()
    };
    let reactants = side(lhs)?;
    let products = side(rhs)?;
    if reactants.is_empty() && products.is_empty() {
        return Err(invalid());
    }
    Ok((reactants, products, reversible))
}

/// Algebraic rule `variable = math`, evaluated before every derivative evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentRule {
    pub variable: String,
    pub math: Expr,
    pub unit: String,
}

impl AssignmentRule {
    pub fn new(variable: &str, math: &str, unit: &str) -> Result<Self, ModelError> {
        Ok(AssignmentRule {
            variable: variable.to_string(),
            math: parse_rule(variable, math)?,
            unit: unit.to_string(),
        })
    }
}

/// Differential rule `d(variable)/dt = math`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateRule {
    pub variable: String,
    pub math: Expr,
    pub unit: String,
}

impl RateRule {
    pub fn new(variable: &str, math: &str, unit: &str) -> Result<Self, ModelError> {
        Ok(RateRule {
            variable: variable.to_string(),
            math: parse_rule(variable, math)?,
            unit: unit.to_string(),
        })
    }
}

fn parse_rule(variable: &str, math: &str) -> Result<Expr, ModelError> {
    Expr::parse(math).map_err(|source| ModelError::Expression {
        element: variable.to_string(),
        source,
    })
}

/// Kind of a named model element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ElementKind {
    Compartment,
    Species,
    Parameter,
    Reaction,
}

impl std::fmt::Display for ElementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ElementKind::Compartment => "compartment",
            ElementKind::Species => "species",
            ElementKind::Parameter => "parameter",
            ElementKind::Reaction => "reaction",
        };
        write!(f, "{}", name)
    }
}

/// Borrowed view of any named element
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Element<'a> {
    Compartment(&'a Compartment),
    Species(&'a Species),
    Parameter(&'a Parameter),
    Reaction(&'a Reaction),
}

impl<'a> Element<'a> {
    /// Identifier borrowed from the model, not from this handle
    pub fn id(&self) -> &'a str {
        match *self {
            Element::Compartment(c) => &c.id,
            Element::Species(s) => &s.id,
            Element::Parameter(p) => &p.id,
            Element::Reaction(r) => &r.id,
        }
    }

    pub fn kind(&self) -> ElementKind {
        match self {
            Element::Compartment(_) => ElementKind::Compartment,
            Element::Species(_) => ElementKind::Species,
            Element::Parameter(_) => ElementKind::Parameter,
            Element::Reaction(_) => ElementKind::Reaction,
        }
    }

    pub fn is_port(&self) -> bool {
        match self {
            Element::Compartment(c) => c.port,
            Element::Species(s) => s.port,
            Element::Parameter(p) => p.port,
            Element::Reaction(_) => false,
        }
    }
}
