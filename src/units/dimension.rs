use std::fmt;
use std::ops::{Div, Mul};

use serde::{Deserialize, Serialize};

const BASE_SYMBOLS: [&str; 4] = ["kg", "m", "s", "mol"];

/// Integer exponents over the base dimensions mass, length, time and amount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Dimension([i8; 4]);

impl Dimension {
    pub const DIMENSIONLESS: Dimension = Dimension([0, 0, 0, 0]);
    pub const MASS: Dimension = Dimension([1, 0, 0, 0]);
    pub const LENGTH: Dimension = Dimension([0, 1, 0, 0]);
    pub const TIME: Dimension = Dimension([0, 0, 1, 0]);
    pub const AMOUNT: Dimension = Dimension([0, 0, 0, 1]);

    pub fn is_dimensionless(&self) -> bool {
        self.0 == [0; 4]
    }

    pub fn powi(&self, n: i32) -> Dimension {
        let mut exponents = self.0;
        for e in exponents.iter_mut() {
            *e = (*e as i32 * n) as i8;
        }
        Dimension(exponents)
    }

    /// Half of every exponent, `None` if any exponent is odd
    pub fn sqrt(&self) -> Option<Dimension> {
        if self.0.iter().any(|e| e % 2 != 0) {
            return None;
        }
        let mut exponents = self.0;
        for e in exponents.iter_mut() {
            *e /= 2;
        }
        Some(Dimension(exponents))
    }
}

impl Mul for Dimension {
    type Output = Dimension;

    fn mul(self, rhs: Dimension) -> Dimension {
        let mut exponents = self.0;
        for (e, r) in exponents.iter_mut().zip(rhs.0) {
            *e += r;
        }
        Dimension(exponents)
    }
}

impl Div for Dimension {
    type Output = Dimension;

    fn div(self, rhs: Dimension) -> Dimension {
        let mut exponents = self.0;
        for (e, r) in exponents.iter_mut().zip(rhs.0) {
            *e -= r;
        }
        Dimension(exponents)
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dimensionless() {
            return write!(f, "1");
        }
        let parts: Vec<String> = BASE_SYMBOLS
            .iter()
            .zip(self.0)
            .filter(|(_, e)| *e != 0)
            .map(|(symbol, e)| {
                if e == 1 {
                    symbol.to_string()
                } else {
                    format!("{}^{}", symbol, e)
                }
            })
            .collect();
        write!(f, "{}", parts.join("*"))
    }
}

/// A physical unit: a dimension and a scale factor relative to the SI base units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub dimension: Dimension,
    pub scale: f64,
}

impl Unit {
    pub const DIMENSIONLESS: Unit = Unit {
        dimension: Dimension::DIMENSIONLESS,
        scale: 1.0,
    };

    pub fn new(dimension: Dimension, scale: f64) -> Self {
        Unit { dimension, scale }
    }

    pub fn powi(&self, n: i32) -> Unit {
        Unit {
            dimension: self.dimension.powi(n),
            scale: self.scale.powi(n),
        }
    }

    pub fn sqrt(&self) -> Option<Unit> {
        Some(Unit {
            dimension: self.dimension.sqrt()?,
            scale: self.scale.sqrt(),
        })
    }

    /// True when the dimension has no exponents, regardless of the scale (`ml/l` is dimensionless)
    pub fn is_dimensionless(&self) -> bool {
        self.dimension.is_dimensionless()
    }

    /// Same dimension and same scale up to rounding
    pub fn is_equivalent(&self, other: &Unit) -> bool {
        if self.dimension != other.dimension {
            return false;
        }
        let magnitude = self.scale.abs().max(other.scale.abs());
        (self.scale - other.scale).abs() <= 1e-9 * magnitude
    }

    /// Factor that converts a value in `self` into a value in `to`
    pub fn conversion_factor(&self, to: &Unit) -> Option<f64> {
        if self.dimension != to.dimension {
            return None;
        }
        Some(self.scale / to.scale)
    }
}

impl Mul for Unit {
    type Output = Unit;

    fn mul(self, rhs: Unit) -> Unit {
        Unit {
            dimension: self.dimension * rhs.dimension,
            scale: self.scale * rhs.scale,
        }
    }
}

impl Div for Unit {
    type Output = Unit;

    fn div(self, rhs: Unit) -> Unit {
        Unit {
            dimension: self.dimension / rhs.dimension,
            scale: self.scale / rhs.scale,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if (self.scale - 1.0).abs() < 1e-12 {
            write!(f, "{}", self.dimension)
        } else {
            write!(f, "{:e} {}", self.scale, self.dimension)
        }
    }
}
