//! Elementwise operators between tables and scalars.
//!
//! Two tables must have the same number of rows. Columns pair by name when
//! both sides carry the same set of names, otherwise by position, and the
//! left-hand names are kept. A scalar operand is broadcast to every row.

use std::fmt;

use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::expr::{self, Number};

use super::{Column, ColumnData, ColumnKind, Scalar, Table};

/// Comparison used by elementwise operators and by row selection.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Archive,
    RkyvSerialize,
    RkyvDeserialize,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    /// Parse a surface symbol such as `>=`.
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "==" | "=" => CompareOp::Eq,
            "!=" => CompareOp::Ne,
            "<" => CompareOp::Lt,
            "<=" => CompareOp::Le,
            ">" => CompareOp::Gt,
            ">=" => CompareOp::Ge,
            _ => return None,
        })
    }

    /// Whether an ordering (`None` for incomparable values) satisfies the operator.
    pub fn holds(self, ordering: Option<std::cmp::Ordering>) -> bool {
        use std::cmp::Ordering::*;
        match (self, ordering) {
            // Missing values compare unequal to everything.
            (CompareOp::Ne, None) => true,
            (_, None) => false,
            (CompareOp::Eq, Some(o)) => o == Equal,
            (CompareOp::Ne, Some(o)) => o != Equal,
            (CompareOp::Lt, Some(o)) => o == Less,
            (CompareOp::Le, Some(o)) => o != Greater,
            (CompareOp::Gt, Some(o)) => o == Greater,
            (CompareOp::Ge, Some(o)) => o != Less,
        }
    }

    /// Compare two scalars. Numbers compare numerically across kinds; text
    /// compares with text only.
    pub fn test(self, lhs: &Scalar, rhs: &Scalar) -> bool {
        self.holds(scalar_ordering(lhs, rhs))
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

pub(crate) fn scalar_ordering(lhs: &Scalar, rhs: &Scalar) -> Option<std::cmp::Ordering> {
    match (lhs, rhs) {
        (Scalar::Int(a), Scalar::Int(b)) => Some(a.cmp(b)),
        (Scalar::Text(a), Scalar::Text(b)) => Some(a.cmp(b)),
        (Scalar::Text(_), _) | (_, Scalar::Text(_)) => None,
        (a, b) => a.as_f64()?.partial_cmp(&b.as_f64()?),
    }
}

/// Operators available on stored tables.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Archive,
    RkyvSerialize,
    RkyvDeserialize,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ElementwiseOp {
    Add,
    Subtract,
    Multiply,
    TrueDivide,
    FloorDivide,
    Modulo,
    Power,
    BitAnd,
    BitOr,
    BitXor,
    Compare(CompareOp),
}

impl ElementwiseOp {
    /// Stable name used in derived storage keys.
    pub fn name(self) -> &'static str {
        match self {
            ElementwiseOp::Add => "add",
            ElementwiseOp::Subtract => "sub",
            ElementwiseOp::Multiply => "mul",
            ElementwiseOp::TrueDivide => "truediv",
            ElementwiseOp::FloorDivide => "floordiv",
            ElementwiseOp::Modulo => "mod",
            ElementwiseOp::Power => "pow",
            ElementwiseOp::BitAnd => "and",
            ElementwiseOp::BitOr => "or",
            ElementwiseOp::BitXor => "xor",
            ElementwiseOp::Compare(CompareOp::Eq) => "eq",
            ElementwiseOp::Compare(CompareOp::Ne) => "ne",
            ElementwiseOp::Compare(CompareOp::Lt) => "lt",
            ElementwiseOp::Compare(CompareOp::Le) => "le",
            ElementwiseOp::Compare(CompareOp::Gt) => "gt",
            ElementwiseOp::Compare(CompareOp::Ge) => "ge",
        }
    }
}

impl fmt::Display for ElementwiseOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One side of an elementwise operation.
#[derive(Debug, Clone, Copy)]
pub enum Side<'a> {
    Table(&'a Table),
    Scalar(&'a Scalar),
}

/// Apply `op` between two operands. At least one side must be a table.
pub fn elementwise(op: ElementwiseOp, lhs: Side<'_>, rhs: Side<'_>) -> Result<Table> {
    let pairs: Vec<(String, ColumnData, ColumnData)> = match (lhs, rhs) {
        (Side::Table(a), Side::Table(b)) => pair_tables(a, b)?,
        (Side::Table(a), Side::Scalar(s)) => a
            .columns()
            .iter()
            .map(|c| {
                (
                    c.name.clone(),
                    c.data.clone(),
                    ColumnData::repeat(s, c.data.len()),
                )
            })
            .collect(),
        (Side::Scalar(s), Side::Table(b)) => b
            .columns()
            .iter()
            .map(|c| {
                (
                    c.name.clone(),
                    ColumnData::repeat(s, c.data.len()),
                    c.data.clone(),
                )
            })
            .collect(),
        (Side::Scalar(_), Side::Scalar(_)) => {
            return Err(Error::Table(format!(
                "`{op}` needs at least one table operand"
            )));
        }
    };

    let columns = pairs
        .into_iter()
        .map(|(name, a, b)| {
            let data = apply_columns(op, &a, &b).map_err(|e| match e {
                Error::Table(msg) => Error::Table(format!("column `{name}`: {msg}")),
                other => other,
            })?;
            Ok(Column::new(name, data))
        })
        .collect::<Result<Vec<_>>>()?;
    Table::new(columns)
}

fn pair_tables(a: &Table, b: &Table) -> Result<Vec<(String, ColumnData, ColumnData)>> {
    if a.row_count() != b.row_count() {
        return Err(Error::Table(format!(
            "row count mismatch: {} vs {}",
            a.row_count(),
            b.row_count()
        )));
    }
    if a.columns().len() != b.columns().len() {
        return Err(Error::Table(format!(
            "column count mismatch: {} vs {}",
            a.columns().len(),
            b.columns().len()
        )));
    }

    let same_names = a.columns().iter().all(|c| b.column(&c.name).is_some());
    Ok(a.columns()
        .iter()
        .zip(b.columns())
        .map(|(left, by_position)| {
            let right = if same_names {
                b.column(&left.name).unwrap_or(by_position)
            } else {
                by_position
            };
            (left.name.clone(), left.data.clone(), right.data.clone())
        })
        .collect())
}

/// Apply `op` to two columns of equal length.
pub(crate) fn apply_columns(op: ElementwiseOp, a: &ColumnData, b: &ColumnData) -> Result<ColumnData> {
    match op {
        ElementwiseOp::Compare(cmp) => Ok(compare_columns(cmp, a, b)),
        ElementwiseOp::BitAnd | ElementwiseOp::BitOr | ElementwiseOp::BitXor => logical(op, a, b),
        _ => arithmetic(op, a, b),
    }
}

fn compare_columns(cmp: CompareOp, a: &ColumnData, b: &ColumnData) -> ColumnData {
    ColumnData::Bool(
        (0..a.len())
            .map(|row| match (a.get(row), b.get(row)) {
                (Some(x), Some(y)) => cmp.test(&x, &y),
                _ => cmp.holds(None),
            })
            .collect(),
    )
}

fn logical(op: ElementwiseOp, a: &ColumnData, b: &ColumnData) -> Result<ColumnData> {
    if let (ColumnData::Bool(x), ColumnData::Bool(y)) = (a, b) {
        let f: fn(bool, bool) -> bool = match op {
            ElementwiseOp::BitAnd => |p: bool, q: bool| p & q,
            ElementwiseOp::BitOr => |p: bool, q: bool| p | q,
            _ => |p: bool, q: bool| p ^ q,
        };
        return Ok(ColumnData::Bool(
            x.iter().zip(y).map(|(p, q)| f(*p, *q)).collect(),
        ));
    }
    let (Some(x), Some(y)) = (as_ints(a), as_ints(b)) else {
        return Err(Error::Table(format!(
            "`{op}` is not defined for {} and {} columns",
            a.kind(),
            b.kind()
        )));
    };
    let f: fn(i64, i64) -> i64 = match op {
        ElementwiseOp::BitAnd => |p: i64, q: i64| p & q,
        ElementwiseOp::BitOr => |p: i64, q: i64| p | q,
        _ => |p: i64, q: i64| p ^ q,
    };
    Ok(ColumnData::Int(
        x.iter().zip(&y).map(|(p, q)| f(*p, *q)).collect(),
    ))
}

fn as_ints(data: &ColumnData) -> Option<Vec<i64>> {
    match data {
        ColumnData::Int(v) => Some(v.clone()),
        ColumnData::Bool(v) => Some(v.iter().map(|b| i64::from(*b)).collect()),
        _ => None,
    }
}

fn as_floats(data: &ColumnData) -> Option<Vec<f64>> {
    match data {
        ColumnData::Int(v) => Some(v.iter().map(|i| *i as f64).collect()),
        ColumnData::Float(v) => Some(v.clone()),
        ColumnData::Bool(v) => Some(v.iter().map(|b| f64::from(u8::from(*b))).collect()),
        ColumnData::Text(_) => None,
    }
}

fn arithmetic(op: ElementwiseOp, a: &ColumnData, b: &ColumnData) -> Result<ColumnData> {
    if let (ColumnData::Text(x), ColumnData::Text(y)) = (a, b) {
        if op != ElementwiseOp::Add {
            return Err(Error::Table(format!("`{op}` is not defined for text")));
        }
        return Ok(ColumnData::Text(
            x.iter()
                .zip(y)
                .map(|(p, q)| match (p, q) {
                    (Some(p), Some(q)) => Some(format!("{p}{q}")),
                    _ => None,
                })
                .collect(),
        ));
    }
    if a.kind() == ColumnKind::Text || b.kind() == ColumnKind::Text {
        return Err(Error::Table(format!(
            "`{op}` is not defined for {} and {} columns",
            a.kind(),
            b.kind()
        )));
    }

    if op != ElementwiseOp::TrueDivide {
        if let (Some(x), Some(y)) = (as_ints(a), as_ints(b)) {
            if let Some(values) = integer_column(op, &x, &y) {
                return Ok(ColumnData::Int(values));
            }
        }
    }

    let (Some(x), Some(y)) = (as_floats(a), as_floats(b)) else {
        return Err(Error::Table(format!("`{op}` needs numeric columns")));
    };
    Ok(ColumnData::Float(
        x.iter().zip(&y).map(|(p, q)| float_op(op, *p, *q)).collect(),
    ))
}

/// Integer result for every row, or `None` if any row leaves `i64`.
fn integer_column(op: ElementwiseOp, x: &[i64], y: &[i64]) -> Option<Vec<i64>> {
    let f: expr::BinaryFn = match op {
        ElementwiseOp::Add => expr::add,
        ElementwiseOp::Subtract => expr::sub,
        ElementwiseOp::Multiply => expr::mul,
        ElementwiseOp::FloorDivide => expr::floor_div,
        ElementwiseOp::Modulo => expr::modulo,
        ElementwiseOp::Power => expr::pow,
        _ => return None,
    };
    x.iter()
        .zip(y)
        .map(|(p, q)| f(Number::Int(*p), Number::Int(*q)).ok()?.as_i64())
        .collect()
}

fn float_op(op: ElementwiseOp, p: f64, q: f64) -> f64 {
    match op {
        ElementwiseOp::Add => p + q,
        ElementwiseOp::Subtract => p - q,
        ElementwiseOp::Multiply => p * q,
        ElementwiseOp::TrueDivide => p / q,
        ElementwiseOp::FloorDivide => (p / q).floor(),
        ElementwiseOp::Modulo => {
            if q == 0.0 {
                return f64::NAN;
            }
            let r = p % q;
            if r != 0.0 && (r < 0.0) != (q < 0.0) {
                r + q
            } else {
                r
            }
        }
        ElementwiseOp::Power => p.powf(q),
        ElementwiseOp::BitAnd
        | ElementwiseOp::BitOr
        | ElementwiseOp::BitXor
        | ElementwiseOp::Compare(_) => f64::NAN,
    }
}
