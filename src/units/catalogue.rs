use std::collections::BTreeMap;

use super::{Dimension, Unit, UnitError};

/// Named units available to model declarations
///
/// The catalogue is an immutable value handed to every model builder. Unit
/// identifiers used in compartments, species, parameters, rules and numeric
/// annotations inside expressions are resolved against it.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitCatalogue {
    units: BTreeMap<String, Unit>,
}

impl Default for UnitCatalogue {
    fn default() -> Self {
        Self::standard()
    }
}

impl UnitCatalogue {
    pub fn empty() -> Self {
        UnitCatalogue {
            units: BTreeMap::new(),
        }
    }

    /// Base and derived units used by the sorafenib models
    pub fn standard() -> Self {
        let mut catalogue = UnitCatalogue::empty();
        let volume = Dimension::LENGTH.powi(3);
        let base: [(&str, Dimension, f64); 27] = [
            ("dimensionless", Dimension::DIMENSIONLESS, 1.0),
            ("kg", Dimension::MASS, 1.0),
            ("g", Dimension::MASS, 1e-3),
            ("mg", Dimension::MASS, 1e-6),
            ("µg", Dimension::MASS, 1e-9),
            ("ug", Dimension::MASS, 1e-9),
            ("mole", Dimension::AMOUNT, 1.0),
            ("mmole", Dimension::AMOUNT, 1e-3),
            ("µmole", Dimension::AMOUNT, 1e-6),
            ("umole", Dimension::AMOUNT, 1e-6),
            ("nmole", Dimension::AMOUNT, 1e-9),
            ("m", Dimension::LENGTH, 1.0),
            ("meter", Dimension::LENGTH, 1.0),
            ("cm", Dimension::LENGTH, 1e-2),
            ("m2", Dimension::LENGTH.powi(2), 1.0),
            ("l", volume, 1e-3),
            ("litre", volume, 1e-3),
            ("liter", volume, 1e-3),
            ("ml", volume, 1e-6),
            ("µl", volume, 1e-9),
            ("s", Dimension::TIME, 1.0),
            ("second", Dimension::TIME, 1.0),
            ("min", Dimension::TIME, 60.0),
            ("hr", Dimension::TIME, 3600.0),
            ("hour", Dimension::TIME, 3600.0),
            ("day", Dimension::TIME, 86400.0),
            ("week", Dimension::TIME, 604800.0),
        ];
        for (id, dimension, scale) in base {
            catalogue.insert(id, Unit::new(dimension, scale));
        }

        let derived = [
            ("per_s", "1/s"),
            ("per_min", "1/min"),
            ("per_hr", "1/hr"),
            ("per_day", "1/day"),
            ("mM", "mmole/l"),
            ("µM", "µmole/l"),
            ("uM", "umole/l"),
            ("mmole_per_l", "mmole/l"),
            ("mmole_per_min", "mmole/min"),
            ("mmole_per_hr", "mmole/hr"),
            ("mmole_per_min_l", "mmole/min/l"),
            ("g_per_mole", "g/mole"),
            ("l_per_min", "l/min"),
            ("l_per_hr", "l/hr"),
            ("l_per_kg", "l/kg"),
            ("l_per_ml", "l/ml"),
            ("ml_per_l", "ml/l"),
            ("ml_per_s", "ml/s"),
            ("ml_per_s_kg", "ml/s/kg"),
            ("ml_per_min", "ml/min"),
            ("s_per_min", "s/min"),
            ("min_per_hr", "min/hr"),
            ("min_per_day", "min/day"),
            ("mg_per_l", "mg/l"),
            ("mg_per_min", "mg/min"),
            ("mg_per_hr", "mg/hr"),
            ("mg_per_day", "mg/day"),
            ("mg_per_kg", "mg/kg"),
            ("m2_per_kg", "m2/kg"),
            ("mM_min", "mM*min"),
            ("mmole_per_min_kg", "mmole/min/kg"),
        ];
        for (id, definition) in derived {
            // Definitions above only reference base units inserted earlier.
            if let Ok(unit) = catalogue.parse(definition) {
                catalogue.insert(id, unit);
            }
        }
        catalogue
    }

    pub fn insert(&mut self, id: &str, unit: Unit) {
        self.units.insert(id.to_string(), unit);
    }

    /// Add a unit from a definition such as `mmole/min/l`
    pub fn define(&mut self, id: &str, definition: &str) -> Result<Unit, UnitError> {
        let unit = self.parse(definition)?;
        self.insert(id, unit);
        Ok(unit)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.units.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Result<Unit, UnitError> {
        self.units
            .get(id)
            .copied()
            .ok_or_else(|| UnitError::UnknownUnit(id.to_string()))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.units.keys().map(|k| k.as_str())
    }

    /// Parse a unit expression made of catalogue identifiers, `*`, `/`, `^` and parentheses
    ///
    /// A bare identifier is looked up directly, so identifiers such as `m2` or
    /// `ml_per_s_kg` are accepted as-is.
    pub fn parse(&self, definition: &str) -> Result<Unit, UnitError> {
        let trimmed = definition.trim();
        if let Some(unit) = self.units.get(trimmed) {
            return Ok(*unit);
        }
        let tokens = tokenize(trimmed)?;
        let mut parser = UnitParser {
            catalogue: self,
            tokens: &tokens,
            pos: 0,
            input: trimmed,
        };
        let unit = parser.product()?;
        if parser.pos != tokens.len() {
            return Err(UnitError::Parse {
                input: trimmed.to_string(),
                message: "trailing tokens".to_string(),
            });
        }
        Ok(unit)
    }

    /// Convert `value` from unit expression `from` to unit expression `to`
    pub fn convert(&self, value: f64, from: &str, to: &str) -> Result<f64, UnitError> {
        let source = self.parse(from)?;
        let target = self.parse(to)?;
        source
            .conversion_factor(&target)
            .map(|factor| value * factor)
            .ok_or_else(|| UnitError::Incompatible {
                from: from.to_string(),
                to: to.to_string(),
            })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum UnitToken {
    Ident(String),
    Int(i32),
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<UnitToken>, UnitError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '*' => {
                chars.next();
                tokens.push(UnitToken::Star);
            }
            '/' => {
                chars.next();
                tokens.push(UnitToken::Slash);
            }
            '^' => {
                chars.next();
                tokens.push(UnitToken::Caret);
            }
            '(' => {
                chars.next();
                tokens.push(UnitToken::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(UnitToken::RParen);
            }
            '-' | '0'..='9' => {
                let mut literal = String::new();
                literal.push(c);
                chars.next();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() {
                        literal.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value = literal.parse::<i32>().map_err(|_| UnitError::Parse {
                    input: input.to_string(),
                    message: format!("invalid integer '{}'", literal),
                })?;
                tokens.push(UnitToken::Int(value));
            }
            c if c.is_alphanumeric() || c == '_' => {
                let mut ident = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_alphanumeric() || d == '_' {
                        ident.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(UnitToken::Ident(ident));
            }
            other => {
                return Err(UnitError::Parse {
                    input: input.to_string(),
                    message: format!("unexpected character '{}'", other),
                })
            }
        }
    }
    Ok(tokens)
}

struct UnitParser<'a> {
    catalogue: &'a UnitCatalogue,
    tokens: &'a [UnitToken],
    pos: usize,
    input: &'a str,
}

impl UnitParser<'_> {
    fn error(&self, message: &str) -> UnitError {
        UnitError::Parse {
            input: self.input.to_string(),
            message: message.to_string(),
        }
    }

    fn product(&mut self) -> Result<Unit, UnitError> {
        let mut unit = self.factor()?;
        while let Some(token) = self.tokens.get(self.pos) {
            match token {
                UnitToken::Star => {
                    self.pos += 1;
                    unit = unit * self.factor()?;
                }
                UnitToken::Slash => {
                    self.pos += 1;
                    unit = unit / self.factor()?;
                }
                _ => break,
            }
        }
        Ok(unit)
    }

    fn factor(&mut self) -> Result<Unit, UnitError> {
        let base = match self.tokens.get(self.pos) {
            Some(UnitToken::Ident(id)) => {
                self.pos += 1;
                self.catalogue.get(id)?
            }
            Some(UnitToken::Int(1)) => {
                self.pos += 1;
                Unit::DIMENSIONLESS
            }
            Some(UnitToken::LParen) => {
                self.pos += 1;
                let inner = self.product()?;
                if self.tokens.get(self.pos) != Some(&UnitToken::RParen) {
                    return Err(self.error("missing ')'"));
                }
                self.pos += 1;
                inner
            }
            _ => return Err(self.error("expected unit identifier")),
        };
        if self.tokens.get(self.pos) == Some(&UnitToken::Caret) {
            self.pos += 1;
            match self.tokens.get(self.pos) {
                Some(UnitToken::Int(n)) => {
                    self.pos += 1;
                    return Ok(base.powi(*n));
                }
                _ => return Err(self.error("expected integer exponent")),
            }
        }
        Ok(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_units_are_present() {
        let units = UnitCatalogue::standard();
        let mm = units.get("mM").unwrap();
        assert!(mm.is_equivalent(&units.parse("mmole/l").unwrap()));
        // mM is numerically mole/m^3
        assert!((mm.scale - 1.0).abs() < 1e-12);
        assert!(units.contains("mmole_per_min_l"));
    }

    #[test]
    fn parses_parentheses_and_powers() {
        let units = UnitCatalogue::standard();
        let cl = units.parse("mmole/(mM*min)").unwrap();
        assert!(cl.is_equivalent(&units.get("l_per_min").unwrap()));
        let area = units.parse("m^2").unwrap();
        assert!(area.is_equivalent(&units.get("m2").unwrap()));
        let per_min = units.parse("1/min").unwrap();
        assert!(per_min.is_equivalent(&units.get("per_min").unwrap()));
    }

    #[test]
    fn converts_between_compatible_units() {
        let units = UnitCatalogue::standard();
        assert!((units.convert(2.0, "hr", "min").unwrap() - 120.0).abs() < 1e-12);
        assert!((units.convert(1.548, "ml_per_s_kg", "l/min/kg").unwrap() - 0.09288).abs() < 1e-12);
        assert!(matches!(
            units.convert(1.0, "mg", "mmole"),
            Err(UnitError::Incompatible { .. })
        ));
    }

    #[test]
    fn unknown_identifier_is_reported() {
        let units = UnitCatalogue::standard();
        assert_eq!(
            units.parse("mmole/fortnight"),
            Err(UnitError::UnknownUnit("fortnight".to_string()))
        );
    }
}
