//! Numbers and the operator table.
//!
//! The table is the whitelist: a parsed expression can only contain
//! operators that have an entry here.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A numeric value produced by the evaluator.
///
/// Integer arithmetic stays integral while the result fits in an `i64`
/// and the operator allows it; otherwise it is promoted to `Float`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    /// Get the value as `f64`.
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    /// Get the value as `i64` if it is an integer.
    pub fn as_i64(self) -> Option<i64> {
        match self {
            Number::Int(i) => Some(i),
            Number::Float(_) => None,
        }
    }

    pub fn is_int(self) -> bool {
        matches!(self, Number::Int(_))
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        match (*self, *other) {
            (Number::Int(a), Number::Int(b)) => a == b,
            (a, b) => a.as_f64() == b.as_f64(),
        }
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        match (*self, *other) {
            (Number::Int(a), Number::Int(b)) => a.partial_cmp(&b),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}

impl From<i64> for Number {
    fn from(value: i64) -> Self {
        Number::Int(value)
    }
}

impl From<f64> for Number {
    fn from(value: f64) -> Self {
        Number::Float(value)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(i) => write!(f, "{i}"),
            Number::Float(x) if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e16 => {
                write!(f, "{x:.1}")
            }
            Number::Float(x) => write!(f, "{x}"),
        }
    }
}

/// Binary operators recognised by the parser.
///
/// Only some of them have an entry in [`OPERATORS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    BitXor,
    BitAnd,
    BitOr,
    Shl,
    Shr,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "**",
            BinaryOp::BitXor => "^",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
        }
    }
}

/// Unary operators recognised by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Pos,
    Invert,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Pos => "+",
            UnaryOp::Invert => "~",
        }
    }
}

pub type BinaryFn = fn(Number, Number) -> Result<Number>;
pub type UnaryFn = fn(Number) -> Result<Number>;

/// Static mapping from operator kind to numeric function.
#[derive(Debug)]
pub struct OperatorTable {
    binary: &'static [(BinaryOp, BinaryFn)],
    unary: &'static [(UnaryOp, UnaryFn)],
}

impl OperatorTable {
    pub fn binary(&self, op: BinaryOp) -> Option<BinaryFn> {
        self.binary.iter().find(|(k, _)| *k == op).map(|(_, f)| *f)
    }

    pub fn unary(&self, op: UnaryOp) -> Option<UnaryFn> {
        self.unary.iter().find(|(k, _)| *k == op).map(|(_, f)| *f)
    }
}

/// The evaluator's whitelist. `^` is bitwise xor; exponentiation is `**`.
pub static OPERATORS: OperatorTable = OperatorTable {
    binary: &[
        (BinaryOp::Add, add as BinaryFn),
        (BinaryOp::Sub, sub as BinaryFn),
        (BinaryOp::Mul, mul as BinaryFn),
        (BinaryOp::Div, true_div as BinaryFn),
        (BinaryOp::Pow, pow as BinaryFn),
        (BinaryOp::BitXor, xor as BinaryFn),
    ],
    unary: &[(UnaryOp::Neg, neg as UnaryFn)],
};

pub fn add(a: Number, b: Number) -> Result<Number> {
    Ok(match (a, b) {
        (Number::Int(x), Number::Int(y)) => x
            .checked_add(y)
            .map_or(Number::Float(x as f64 + y as f64), Number::Int),
        (x, y) => Number::Float(x.as_f64() + y.as_f64()),
    })
}

pub fn sub(a: Number, b: Number) -> Result<Number> {
    Ok(match (a, b) {
        (Number::Int(x), Number::Int(y)) => x
            .checked_sub(y)
            .map_or(Number::Float(x as f64 - y as f64), Number::Int),
        (x, y) => Number::Float(x.as_f64() - y.as_f64()),
    })
}

pub fn mul(a: Number, b: Number) -> Result<Number> {
    Ok(match (a, b) {
        (Number::Int(x), Number::Int(y)) => x
            .checked_mul(y)
            .map_or(Number::Float(x as f64 * y as f64), Number::Int),
        (x, y) => Number::Float(x.as_f64() * y.as_f64()),
    })
}

/// True division: always a float.
pub fn true_div(a: Number, b: Number) -> Result<Number> {
    if b.as_f64() == 0.0 {
        return Err(Error::Evaluation("division by zero".to_string()));
    }
    Ok(Number::Float(a.as_f64() / b.as_f64()))
}

/// Floor division, rounding toward negative infinity.
pub fn floor_div(a: Number, b: Number) -> Result<Number> {
    match (a, b) {
        (_, b) if b.as_f64() == 0.0 => Err(Error::Evaluation(
            "integer division or modulo by zero".to_string(),
        )),
        (Number::Int(x), Number::Int(y)) => Ok(x
            .checked_div_euclid(y)
            .map(|q| if y < 0 && x.rem_euclid(y) != 0 { q - 1 } else { q })
            .map_or(Number::Float((x as f64 / y as f64).floor()), Number::Int)),
        (x, y) => Ok(Number::Float((x.as_f64() / y.as_f64()).floor())),
    }
}

/// Modulo with the sign of the divisor.
pub fn modulo(a: Number, b: Number) -> Result<Number> {
    match (a, b) {
        (_, b) if b.as_f64() == 0.0 => Err(Error::Evaluation(
            "integer division or modulo by zero".to_string(),
        )),
        (Number::Int(x), Number::Int(y)) => {
            let r = x.wrapping_rem(y);
            Ok(Number::Int(if r != 0 && (r < 0) != (y < 0) { r + y } else { r }))
        }
        (x, y) => {
            let (x, y) = (x.as_f64(), y.as_f64());
            let r = x % y;
            Ok(Number::Float(if r != 0.0 && (r < 0.0) != (y < 0.0) {
                r + y
            } else {
                r
            }))
        }
    }
}

pub fn pow(a: Number, b: Number) -> Result<Number> {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) if y >= 0 => Ok(u32::try_from(y)
            .ok()
            .and_then(|e| x.checked_pow(e))
            .map_or(Number::Float((x as f64).powf(y as f64)), Number::Int)),
        (x, y) => {
            let (x, y) = (x.as_f64(), y.as_f64());
            if x == 0.0 && y < 0.0 {
                return Err(Error::Evaluation(
                    "0.0 cannot be raised to a negative power".to_string(),
                ));
            }
            if x < 0.0 && y.fract() != 0.0 {
                return Err(Error::Evaluation(
                    "negative number cannot be raised to a fractional power".to_string(),
                ));
            }
            Ok(Number::Float(x.powf(y)))
        }
    }
}

pub fn xor(a: Number, b: Number) -> Result<Number> {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => Ok(Number::Int(x ^ y)),
        _ => Err(Error::Evaluation(
            "unsupported operand type(s) for ^: float".to_string(),
        )),
    }
}

pub fn bit_and(a: Number, b: Number) -> Result<Number> {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => Ok(Number::Int(x & y)),
        _ => Err(Error::Evaluation(
            "unsupported operand type(s) for &: float".to_string(),
        )),
    }
}

pub fn bit_or(a: Number, b: Number) -> Result<Number> {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => Ok(Number::Int(x | y)),
        _ => Err(Error::Evaluation(
            "unsupported operand type(s) for |: float".to_string(),
        )),
    }
}

pub fn neg(a: Number) -> Result<Number> {
    Ok(match a {
        Number::Int(x) => x.checked_neg().map_or(Number::Float(-(x as f64)), Number::Int),
        Number::Float(x) => Number::Float(-x),
    })
}
