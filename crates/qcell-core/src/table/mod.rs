//! In-memory column tables.
//!
//! A [`Table`] is what a stored node materialises into and what a worker
//! builds before persisting. Missing values are `NaN` in float columns and
//! `None` in text columns; integer and boolean columns have no missing
//! values.

pub mod csv;
pub mod elementwise;
pub mod ops;

use std::fmt;
use std::ops::Range;

use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use elementwise::{CompareOp, ElementwiseOp, elementwise};

/// A single cell value.
#[derive(
    Debug, Clone, PartialEq, Archive, RkyvSerialize, RkyvDeserialize, Serialize, Deserialize,
)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// Numeric view. Booleans count as `0`/`1`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(i) => Some(*i as f64),
            Scalar::Float(f) => Some(*f),
            Scalar::Bool(b) => Some(f64::from(u8::from(*b))),
            Scalar::Text(_) => None,
        }
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            Scalar::Int(_) => ColumnKind::Int,
            Scalar::Float(_) => ColumnKind::Float,
            Scalar::Bool(_) => ColumnKind::Bool,
            Scalar::Text(_) => ColumnKind::Text,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Scalar::Int(i) => serde_json::Value::from(*i),
            Scalar::Float(f) => serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Scalar::Bool(b) => serde_json::Value::Bool(*b),
            Scalar::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::Float(x) => write!(f, "{x}"),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

/// The type of a column.
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
pub enum ColumnKind {
    Int,
    Float,
    Bool,
    Text,
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnKind::Int => "int",
            ColumnKind::Float => "float",
            ColumnKind::Bool => "bool",
            ColumnKind::Text => "text",
        };
        f.write_str(name)
    }
}

/// Values of one column.
#[derive(
    Debug, Clone, PartialEq, Archive, RkyvSerialize, RkyvDeserialize, Serialize, Deserialize,
)]
#[serde(tag = "kind", content = "values", rename_all = "lowercase")]
pub enum ColumnData {
    Int(Vec<i64>),
    Float(Vec<f64>),
    Bool(Vec<bool>),
    Text(Vec<Option<String>>),
}

impl ColumnData {
    pub fn empty(kind: ColumnKind) -> Self {
        match kind {
            ColumnKind::Int => ColumnData::Int(Vec::new()),
            ColumnKind::Float => ColumnData::Float(Vec::new()),
            ColumnKind::Bool => ColumnData::Bool(Vec::new()),
            ColumnKind::Text => ColumnData::Text(Vec::new()),
        }
    }

    /// A column holding `len` copies of `value`.
    pub fn repeat(value: &Scalar, len: usize) -> Self {
        match value {
            Scalar::Int(i) => ColumnData::Int(vec![*i; len]),
            Scalar::Float(x) => ColumnData::Float(vec![*x; len]),
            Scalar::Bool(b) => ColumnData::Bool(vec![*b; len]),
            Scalar::Text(s) => ColumnData::Text(vec![Some(s.clone()); len]),
        }
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            ColumnData::Int(_) => ColumnKind::Int,
            ColumnData::Float(_) => ColumnKind::Float,
            ColumnData::Bool(_) => ColumnKind::Bool,
            ColumnData::Text(_) => ColumnKind::Text,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnData::Int(v) => v.len(),
            ColumnData::Float(v) => v.len(),
            ColumnData::Bool(v) => v.len(),
            ColumnData::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at `row`, or `None` when the row is missing or out of range.
    pub fn get(&self, row: usize) -> Option<Scalar> {
        match self {
            ColumnData::Int(v) => v.get(row).map(|i| Scalar::Int(*i)),
            ColumnData::Float(v) => v
                .get(row)
                .filter(|x| !x.is_nan())
                .map(|x| Scalar::Float(*x)),
            ColumnData::Bool(v) => v.get(row).map(|b| Scalar::Bool(*b)),
            ColumnData::Text(v) => v.get(row).cloned().flatten().map(Scalar::Text),
        }
    }

    pub fn is_null(&self, row: usize) -> bool {
        match self {
            ColumnData::Float(v) => v.get(row).is_some_and(|x| x.is_nan()),
            ColumnData::Text(v) => v.get(row).is_some_and(Option::is_none),
            ColumnData::Int(_) | ColumnData::Bool(_) => false,
        }
    }

    pub fn null_count(&self) -> usize {
        match self {
            ColumnData::Float(v) => v.iter().filter(|x| x.is_nan()).count(),
            ColumnData::Text(v) => v.iter().filter(|s| s.is_none()).count(),
            ColumnData::Int(_) | ColumnData::Bool(_) => 0,
        }
    }

    /// Rows in `range`, clamped to the column length.
    pub fn slice(&self, range: Range<usize>) -> Self {
        let end = range.end.min(self.len());
        let start = range.start.min(end);
        match self {
            ColumnData::Int(v) => ColumnData::Int(v[start..end].to_vec()),
            ColumnData::Float(v) => ColumnData::Float(v[start..end].to_vec()),
            ColumnData::Bool(v) => ColumnData::Bool(v[start..end].to_vec()),
            ColumnData::Text(v) => ColumnData::Text(v[start..end].to_vec()),
        }
    }

    /// Rows at `indices`, in that order. Indices must be in range.
    pub fn take(&self, indices: &[usize]) -> Self {
        match self {
            ColumnData::Int(v) => ColumnData::Int(indices.iter().map(|&i| v[i]).collect()),
            ColumnData::Float(v) => ColumnData::Float(indices.iter().map(|&i| v[i]).collect()),
            ColumnData::Bool(v) => ColumnData::Bool(indices.iter().map(|&i| v[i]).collect()),
            ColumnData::Text(v) => {
                ColumnData::Text(indices.iter().map(|&i| v[i].clone()).collect())
            }
        }
    }

    /// Append `other`, which must have the same kind.
    pub fn extend(&mut self, other: ColumnData) -> Result<()> {
        match (self, other) {
            (ColumnData::Int(a), ColumnData::Int(b)) => a.extend(b),
            (ColumnData::Float(a), ColumnData::Float(b)) => a.extend(b),
            (ColumnData::Bool(a), ColumnData::Bool(b)) => a.extend(b),
            (ColumnData::Text(a), ColumnData::Text(b)) => a.extend(b),
            (a, b) => {
                return Err(Error::Table(format!(
                    "cannot append {} values to a {} column",
                    b.kind(),
                    a.kind()
                )));
            }
        }
        Ok(())
    }

    fn cell_json(&self, row: usize) -> serde_json::Value {
        self.get(row)
            .map_or(serde_json::Value::Null, |value| value.to_json())
    }
}

/// A named column.
#[derive(
    Debug, Clone, PartialEq, Archive, RkyvSerialize, RkyvDeserialize, Serialize, Deserialize,
)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

impl Column {
    pub fn new(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// An ordered set of equally long, uniquely named columns.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<Column>,
}

impl Table {
    /// Build a table, checking that names are unique and lengths agree.
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        if let Some(first) = columns.first() {
            let rows = first.data.len();
            for column in &columns {
                if column.data.len() != rows {
                    return Err(Error::Table(format!(
                        "column `{}` has {} rows, expected {}",
                        column.name,
                        column.data.len(),
                        rows
                    )));
                }
            }
        }
        for (i, column) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == column.name) {
                return Err(Error::Table(format!(
                    "duplicate column name `{}`",
                    column.name
                )));
            }
        }
        Ok(Self { columns })
    }

    /// A one-column table.
    pub fn single(name: impl Into<String>, data: ColumnData) -> Self {
        Self {
            columns: vec![Column::new(name, data)],
        }
    }

    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, |c| c.data.len())
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Look up a column, failing with a table error that names it.
    pub fn require(&self, name: &str) -> Result<&Column> {
        self.column(name)
            .ok_or_else(|| Error::Table(format!("no column named `{name}`")))
    }

    /// Apply `f` to every column, keeping names.
    pub fn map_columns(&self, f: impl Fn(&ColumnData) -> Result<ColumnData>) -> Result<Self> {
        let columns = self
            .columns
            .iter()
            .map(|c| Ok(Column::new(c.name.clone(), f(&c.data)?)))
            .collect::<Result<Vec<_>>>()?;
        Table::new(columns)
    }

    pub fn slice(&self, range: Range<usize>) -> Self {
        Self {
            columns: self
                .columns
                .iter()
                .map(|c| Column::new(c.name.clone(), c.data.slice(range.clone())))
                .collect(),
        }
    }

    pub fn take(&self, indices: &[usize]) -> Self {
        Self {
            columns: self
                .columns
                .iter()
                .map(|c| Column::new(c.name.clone(), c.data.take(indices)))
                .collect(),
        }
    }

    /// Rows as JSON objects keyed by column name.
    pub fn to_json(&self) -> serde_json::Value {
        let rows = (0..self.row_count())
            .map(|row| {
                let record = self
                    .columns
                    .iter()
                    .map(|c| (c.name.clone(), c.data.cell_json(row)))
                    .collect::<serde_json::Map<_, _>>();
                serde_json::Value::Object(record)
            })
            .collect();
        serde_json::Value::Array(rows)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cells: Vec<Vec<String>> = (0..self.row_count())
            .map(|row| {
                self.columns
                    .iter()
                    .map(|c| c.data.get(row).map_or("NaN".to_string(), |v| v.to_string()))
                    .collect()
            })
            .collect();
        let widths: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| {
                cells
                    .iter()
                    .map(|r| r[i].len())
                    .chain(std::iter::once(c.name.len()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let header: Vec<String> = self
            .columns
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:>w$}", c.name, w = *w))
            .collect();
        writeln!(f, "{}", header.join("  "))?;
        for row in &cells {
            let line: Vec<String> = row
                .iter()
                .zip(&widths)
                .map(|(v, w)| format!("{:>w$}", v, w = *w))
                .collect();
            writeln!(f, "{}", line.join("  "))?;
        }
        write!(f, "[{} rows x {} columns]", self.row_count(), self.columns.len())
    }
}
