//! Symbolic math used by rate laws and rules
//!
//! Expressions are written in infix notation, e.g.
//!
//! ```text
//! SORIM_Vmax/SORIM_Km_sor * Vli * (sor_ext - sor)/(1 dimensionless + sor_ext/SORIM_Km_sor + sor/SORIM_Km_sor)
//! ```
//!
//! A number may be followed by a unit identifier (`60 min_per_hr`, `1E-10 mM`),
//! which only matters for unit analysis. Supported operators are `+ - * / ^`
//! and unary minus; supported functions are `power`, `exp`, `ln`, `log10`,
//! `sqrt`, `abs`, `min` and `max`.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Errors from tokenizing and parsing expressions
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    #[error("Empty expression")]
    Empty,

    #[error("Unexpected character '{ch}' at position {pos} in '{input}'")]
    UnexpectedChar { ch: char, pos: usize, input: String },

    #[error("Invalid number '{literal}' in '{input}'")]
    InvalidNumber { literal: String, input: String },

    #[error("Unexpected token '{token}' in '{input}'")]
    UnexpectedToken { token: String, input: String },

    #[error("Unexpected end of expression '{input}'")]
    UnexpectedEnd { input: String },

    #[error("Unknown function '{name}' in '{input}'")]
    UnknownFunction { name: String, input: String },

    #[error("Function '{name}' takes {expected} argument(s), got {found}")]
    Arity {
        name: String,
        expected: usize,
        found: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinaryOp {
    fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "^",
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            BinaryOp::Add | BinaryOp::Sub => 1,
            BinaryOp::Mul | BinaryOp::Div => 2,
            BinaryOp::Pow => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Power,
    Exp,
    Ln,
    Log10,
    Sqrt,
    Abs,
    Min,
    Max,
}

impl Function {
    pub fn from_name(name: &str) -> Option<Function> {
        match name {
            "power" | "pow" => Some(Function::Power),
            "exp" => Some(Function::Exp),
            "ln" | "log" => Some(Function::Ln),
            "log10" => Some(Function::Log10),
            "sqrt" => Some(Function::Sqrt),
            "abs" => Some(Function::Abs),
            "min" => Some(Function::Min),
            "max" => Some(Function::Max),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Function::Power => "power",
            Function::Exp => "exp",
            Function::Ln => "ln",
            Function::Log10 => "log10",
            Function::Sqrt => "sqrt",
            Function::Abs => "abs",
            Function::Min => "min",
            Function::Max => "max",
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            Function::Power | Function::Min | Function::Max => 2,
            _ => 1,
        }
    }

    pub(crate) fn apply(&self, args: &[f64]) -> f64 {
        match (self, args) {
            (Function::Power, [a, b]) => a.powf(*b),
            (Function::Exp, [a]) => a.exp(),
            (Function::Ln, [a]) => a.ln(),
            (Function::Log10, [a]) => a.log10(),
            (Function::Sqrt, [a]) => a.sqrt(),
            (Function::Abs, [a]) => a.abs(),
            (Function::Min, [a, b]) => a.min(*b),
            (Function::Max, [a, b]) => a.max(*b),
            _ => f64::NAN,
        }
    }
}

/// Expression tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number { value: f64, unit: Option<String> },
    Symbol(String),
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call { function: Function, args: Vec<Expr> },
}

impl Expr {
    pub fn parse(input: &str) -> Result<Expr, ExprError> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Err(ExprError::Empty);
        }
        let mut parser = Parser {
            tokens,
            pos: 0,
            input,
        };
        let expr = parser.additive()?;
        match parser.peek() {
            None => Ok(expr),
            Some(token) => Err(ExprError::UnexpectedToken {
                token: token.to_string(),
                input: input.to_string(),
            }),
        }
    }

    pub fn symbol(id: &str) -> Expr {
        Expr::Symbol(id.to_string())
    }

    pub fn number(value: f64) -> Expr {
        Expr::Number { value, unit: None }
    }

    /// Numeric value of a literal, if this is one
    pub fn literal(&self) -> Option<f64> {
        match self {
            Expr::Number { value, .. } => Some(*value),
            Expr::Neg(inner) => inner.literal().map(|v| -v),
            _ => None,
        }
    }

    /// All identifiers referenced by the expression
    pub fn symbols(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_symbols(&mut out);
        out
    }

    fn collect_symbols<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Expr::Number { .. } => {}
            Expr::Symbol(id) => {
                out.insert(id.as_str());
            }
            Expr::Neg(inner) => inner.collect_symbols(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_symbols(out);
                rhs.collect_symbols(out);
            }
            Expr::Call { args, .. } => args.iter().for_each(|a| a.collect_symbols(out)),
        }
    }

    /// Unit identifiers used in numeric annotations
    pub fn unit_annotations(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.visit(&mut |e| {
            if let Expr::Number {
                unit: Some(unit), ..
            } = e
            {
                out.insert(unit.as_str());
            }
        });
        out
    }

    fn visit<'a>(&'a self, f: &mut impl FnMut(&'a Expr)) {
        f(self);
        match self {
            Expr::Neg(inner) => inner.visit(f),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.visit(f);
                rhs.visit(f);
            }
            Expr::Call { args, .. } => args.iter().for_each(|a| a.visit(f)),
            _ => {}
        }
    }

    /// Copy of the expression with every identifier passed through `rename`
    pub fn rename(&self, rename: &impl Fn(&str) -> String) -> Expr {
        match self {
            Expr::Number { .. } => self.clone(),
            Expr::Symbol(id) => Expr::Symbol(rename(id)),
            Expr::Neg(inner) => Expr::Neg(Box::new(inner.rename(rename))),
            Expr::Binary { op, lhs, rhs } => Expr::Binary {
                op: *op,
                lhs: Box::new(lhs.rename(rename)),
                rhs: Box::new(rhs.rename(rename)),
            },
            Expr::Call { function, args } => Expr::Call {
                function: *function,
                args: args.iter().map(|a| a.rename(rename)).collect(),
            },
        }
    }
}

impl FromStr for Expr {
    type Err = ExprError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Expr::parse(s)
    }
}

// ============================================================================
// Tokenizer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Op(char),
    LParen,
    RParen,
    Comma,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Num(v) => write!(f, "{}", v),
            Token::Ident(id) => write!(f, "{}", id),
            Token::Op(c) => write!(f, "{}", c),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Comma => write!(f, ","),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, ExprError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() || c == '.' {
            let start = i;
            while i < chars.len() {
                let d = chars[i];
                let exponent_sign = (d == '+' || d == '-')
                    && i > start
                    && matches!(chars[i - 1], 'e' | 'E');
                let exponent_mark = (d == 'e' || d == 'E')
                    && chars.get(i + 1).is_some_and(|n| {
                        n.is_ascii_digit() || *n == '+' || *n == '-'
                    });
                if d.is_ascii_digit() || d == '.' || exponent_mark || exponent_sign {
                    i += 1;
                } else {
                    break;
                }
            }
            let literal: String = chars[start..i].iter().collect();
            let value = literal
                .parse::<f64>()
                .map_err(|_| ExprError::InvalidNumber {
                    literal: literal.clone(),
                    input: input.to_string(),
                })?;
            tokens.push(Token::Num(value));
        } else if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
        } else {
            let token = match c {
                '+' | '-' | '*' | '/' | '^' => Token::Op(c),
                '(' => Token::LParen,
                ')' => Token::RParen,
                ',' => Token::Comma,
                _ => {
                    return Err(ExprError::UnexpectedChar {
                        ch: c,
                        pos: i,
                        input: input.to_string(),
                    })
                }
            };
            tokens.push(token);
            i += 1;
        }
    }
    Ok(tokens)
}

// ============================================================================
// Recursive-descent parser
// ============================================================================

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    input: &'a str,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn end(&self) -> ExprError {
        ExprError::UnexpectedEnd {
            input: self.input.to_string(),
        }
    }

    fn unexpected(&self, token: &Token) -> ExprError {
        ExprError::UnexpectedToken {
            token: token.to_string(),
            input: self.input.to_string(),
        }
    }

    fn additive(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.multiplicative()?;
        while let Some(Token::Op(c @ ('+' | '-'))) = self.peek() {
            let op = if *c == '+' { BinaryOp::Add } else { BinaryOp::Sub };
            self.pos += 1;
            let rhs = self.multiplicative()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn multiplicative(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.unary()?;
        while let Some(Token::Op(c @ ('*' | '/'))) = self.peek() {
            let op = if *c == '*' { BinaryOp::Mul } else { BinaryOp::Div };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = binary(op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        match self.peek() {
            Some(Token::Op('-')) => {
                self.pos += 1;
                let inner = self.unary()?;
                Ok(match inner {
                    Expr::Number { value, unit } => Expr::Number {
                        value: -value,
                        unit,
                    },
                    other => Expr::Neg(Box::new(other)),
                })
            }
            Some(Token::Op('+')) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<Expr, ExprError> {
        let base = self.primary()?;
        if let Some(Token::Op('^')) = self.peek() {
            self.pos += 1;
            // right associative, binds tighter than a leading minus on the base
            let exponent = self.unary()?;
            return Ok(binary(BinaryOp::Pow, base, exponent));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        let token = self.next().ok_or_else(|| self.end())?;
        match token {
            Token::Num(value) => {
                let unit = match (self.peek(), self.tokens.get(self.pos + 1)) {
                    (Some(Token::Ident(id)), next) if next != Some(&Token::LParen) => {
                        let id = id.clone();
                        self.pos += 1;
                        Some(id)
                    }
                    _ => None,
                };
                Ok(Expr::Number { value, unit })
            }
            Token::Ident(name) => {
                if let Some(Token::LParen) = self.peek() {
                    self.pos += 1;
                    self.call(name)
                } else {
                    Ok(Expr::Symbol(name))
                }
            }
            Token::LParen => {
                let inner = self.additive()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    Some(other) => Err(self.unexpected(&other)),
                    None => Err(self.end()),
                }
            }
            other => Err(self.unexpected(&other)),
        }
    }

    fn call(&mut self, name: String) -> Result<Expr, ExprError> {
        let function = Function::from_name(&name).ok_or_else(|| ExprError::UnknownFunction {
            name: name.clone(),
            input: self.input.to_string(),
        })?;
        let mut args = Vec::new();
        if let Some(Token::RParen) = self.peek() {
            self.pos += 1;
        } else {
            loop {
                args.push(self.additive()?);
                match self.next() {
                    Some(Token::Comma) => continue,
                    Some(Token::RParen) => break,
                    Some(other) => return Err(self.unexpected(&other)),
                    None => return Err(self.end()),
                }
            }
        }
        if args.len() != function.arity() {
            return Err(ExprError::Arity {
                name,
                expected: function.arity(),
                found: args.len(),
            });
        }
        Ok(Expr::Call { function, args })
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

// ============================================================================
// Printing
// ============================================================================

fn fmt_number(f: &mut fmt::Formatter<'_>, value: f64) -> fmt::Result {
    let magnitude = value.abs();
    if magnitude != 0.0 && !(1e-4..1e15).contains(&magnitude) {
        write!(f, "{:e}", value)
    } else {
        write!(f, "{}", value)
    }
}

impl Expr {
    fn needs_parens(&self, parent: BinaryOp, right: bool) -> bool {
        match self {
            Expr::Binary { op, .. } => {
                let (child, outer) = (op.precedence(), parent.precedence());
                child < outer
                    || (child == outer
                        && ((right && matches!(parent, BinaryOp::Sub | BinaryOp::Div))
                            || (parent == BinaryOp::Pow)))
            }
            Expr::Neg(_) => parent == BinaryOp::Pow && !right,
            Expr::Number { value, .. } => parent == BinaryOp::Pow && !right && *value < 0.0,
            _ => false,
        }
    }

    fn fmt_child(&self, f: &mut fmt::Formatter<'_>, parent: BinaryOp, right: bool) -> fmt::Result {
        if self.needs_parens(parent, right) {
            write!(f, "({})", self)
        } else {
            write!(f, "{}", self)
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number { value, unit } => {
                fmt_number(f, *value)?;
                if let Some(unit) = unit {
                    write!(f, " {}", unit)?;
                }
                Ok(())
            }
            Expr::Symbol(id) => write!(f, "{}", id),
            Expr::Neg(inner) => match inner.as_ref() {
                Expr::Binary { .. } => write!(f, "-({})", inner),
                _ => write!(f, "-{}", inner),
            },
            Expr::Binary { op, lhs, rhs } => {
                lhs.fmt_child(f, *op, false)?;
                write!(f, " {} ", op.symbol())?;
                rhs.fmt_child(f, *op, true)
            }
            Expr::Call { function, args } => {
                write!(f, "{}(", function.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

impl Serialize for Expr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Expr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Expr::parse(&text).map_err(de::Error::custom)
    }
}
