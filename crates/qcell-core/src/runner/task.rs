//! Tasks that can cross the process boundary.
//!
//! A worker cannot receive a closure, so every transformation it can run is
//! a [`TableOp`] variant. Inputs travel as storage keys and scalars; the
//! worker reads them from the store itself.

use std::hash::{Hash, Hasher};
use std::path::Path;
use std::time::Duration;

use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};
use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::storage::{NodeKey, ResultHandle, Store};
use crate::table::elementwise::Side;
use crate::table::{self, CompareOp, ElementwiseOp, Scalar, Table, ops};

/// The transformations a worker can apply.
#[derive(Debug, Clone, PartialEq, Archive, RkyvSerialize, RkyvDeserialize, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TableOp {
    /// Load a CSV file. Takes no inputs.
    ReadCsv { path: String },
    Head { n: u64 },
    Tail { n: u64 },
    Rows { start: u64, end: u64 },
    Columns { names: Vec<String> },
    SortValues { by: Vec<String>, ascending: bool },
    IsNull,
    NotNull,
    /// Keep rows of the first input where the second input (a one-column
    /// boolean table) is true.
    Filter,
    /// Keep rows where `column op value` holds.
    Where {
        column: String,
        op: CompareOp,
        value: Scalar,
    },
    ValueCounts { column: String },
    StrLen,
    StrContains { pattern: String },
    StrStartsWith { prefix: String },
    /// Combine two operands elementwise.
    Elementwise { op: ElementwiseOp },
    /// Sleep, then pass the input through unchanged.
    Delay { millis: u64 },
}

impl TableOp {
    /// Short name for logs and diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            TableOp::ReadCsv { .. } => "read_csv",
            TableOp::Head { .. } => "head",
            TableOp::Tail { .. } => "tail",
            TableOp::Rows { .. } => "rows",
            TableOp::Columns { .. } => "columns",
            TableOp::SortValues { .. } => "sort_values",
            TableOp::IsNull => "isnull",
            TableOp::NotNull => "notnull",
            TableOp::Filter => "filter",
            TableOp::Where { .. } => "where",
            TableOp::ValueCounts { .. } => "value_counts",
            TableOp::StrLen => "str_len",
            TableOp::StrContains { .. } => "str_contains",
            TableOp::StrStartsWith { .. } => "str_startswith",
            TableOp::Elementwise { .. } => "elementwise",
            TableOp::Delay { .. } => "delay",
        }
    }

    fn arity(&self) -> usize {
        match self {
            TableOp::ReadCsv { .. } => 0,
            TableOp::Filter | TableOp::Elementwise { .. } => 2,
            _ => 1,
        }
    }
}

/// An input to a task: a stored table or a literal.
#[derive(Debug, Clone, PartialEq, Archive, RkyvSerialize, RkyvDeserialize, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Stored(NodeKey),
    Scalar(Scalar),
}

impl Operand {
    /// Deterministic identity used to derive result keys.
    pub fn identity(&self) -> u64 {
        let mut hasher = FxHasher::default();
        match self {
            Operand::Stored(key) => {
                0u8.hash(&mut hasher);
                key.hash(&mut hasher);
            }
            Operand::Scalar(scalar) => {
                1u8.hash(&mut hasher);
                match scalar {
                    Scalar::Int(i) => (0u8, *i).hash(&mut hasher),
                    Scalar::Float(f) => (1u8, f.to_bits()).hash(&mut hasher),
                    Scalar::Bool(b) => (2u8, *b).hash(&mut hasher),
                    Scalar::Text(s) => (3u8, s).hash(&mut hasher),
                }
            }
        }
        hasher.finish()
    }
}

impl From<NodeKey> for Operand {
    fn from(key: NodeKey) -> Self {
        Operand::Stored(key)
    }
}

impl From<&ResultHandle> for Operand {
    fn from(handle: &ResultHandle) -> Self {
        Operand::Stored(handle.key().clone())
    }
}

impl From<ResultHandle> for Operand {
    fn from(handle: ResultHandle) -> Self {
        Operand::from(&handle)
    }
}

impl From<Scalar> for Operand {
    fn from(scalar: Scalar) -> Self {
        Operand::Scalar(scalar)
    }
}

impl From<i64> for Operand {
    fn from(value: i64) -> Self {
        Operand::Scalar(Scalar::Int(value))
    }
}

impl From<f64> for Operand {
    fn from(value: f64) -> Self {
        Operand::Scalar(Scalar::Float(value))
    }
}

impl From<bool> for Operand {
    fn from(value: bool) -> Self {
        Operand::Scalar(Scalar::Bool(value))
    }
}

/// One unit of isolated work: an operation, its inputs and where to store
/// the result.
#[derive(Debug, Clone, PartialEq, Archive, RkyvSerialize, RkyvDeserialize, Serialize, Deserialize)]
pub struct IsolatedTask {
    /// Who asked for this, for diagnostics (usually a cell id).
    pub caller: String,
    pub op: TableOp,
    pub inputs: Vec<Operand>,
    /// Key the result is written under.
    pub target: NodeKey,
    /// Result columns to index with zone statistics.
    pub data_columns: Vec<String>,
}

impl IsolatedTask {
    pub fn new(caller: impl Into<String>, op: TableOp, target: NodeKey) -> Self {
        Self {
            caller: caller.into(),
            op,
            inputs: Vec::new(),
            target,
            data_columns: Vec::new(),
        }
    }

    pub fn input(mut self, operand: impl Into<Operand>) -> Self {
        self.inputs.push(operand.into());
        self
    }

    pub fn data_columns(mut self, columns: Vec<String>) -> Self {
        self.data_columns = columns;
        self
    }
}

enum Input {
    Table(Table),
    Scalar(Scalar),
}

impl Input {
    fn side(&self) -> Side<'_> {
        match self {
            Input::Table(t) => Side::Table(t),
            Input::Scalar(s) => Side::Scalar(s),
        }
    }

    fn table(&self, op: &TableOp) -> Result<&Table> {
        match self {
            Input::Table(t) => Ok(t),
            Input::Scalar(_) => Err(Error::Table(format!(
                "`{}` needs a table input, got a scalar",
                op.name()
            ))),
        }
    }
}

/// Apply `task` in the current process and persist the result.
///
/// This is what a worker runs for every `Run` command. Returns the number
/// of rows written.
pub fn execute_task(store: &Store, task: &IsolatedTask) -> Result<usize> {
    let op = &task.op;
    if task.inputs.len() != op.arity() {
        return Err(Error::Table(format!(
            "`{}` expects {} input(s), got {}",
            op.name(),
            op.arity(),
            task.inputs.len()
        )));
    }
    debug!(
        "Executing {} for {} -> {}",
        op.name(),
        task.caller,
        task.target
    );

    let result = match op {
        TableOp::Where {
            column,
            op: cmp,
            value,
        } => {
            // Zone-map assisted when the input is stored with `column` indexed.
            let indexed = match &task.inputs[0] {
                Operand::Stored(key) => store
                    .data_columns(key)?
                    .iter()
                    .any(|c| &c.name == column)
                    .then_some(key),
                Operand::Scalar(_) => None,
            };
            match indexed {
                Some(key) => store.select_where(key, column, *cmp, value)?,
                None => apply(op, &[materialize(store, &task.inputs[0])?])?,
            }
        }
        _ => {
            let inputs = task
                .inputs
                .iter()
                .map(|operand| materialize(store, operand))
                .collect::<Result<Vec<_>>>()?;
            apply(op, &inputs)?
        }
    };

    store.write(&task.target, &result, &task.data_columns)?;
    Ok(result.row_count())
}

fn materialize(store: &Store, operand: &Operand) -> Result<Input> {
    match operand {
        Operand::Stored(key) => Ok(Input::Table(store.read_table(key)?)),
        Operand::Scalar(s) => Ok(Input::Scalar(s.clone())),
    }
}

fn table_input<'a>(op: &TableOp, inputs: &'a [Input], index: usize) -> Result<&'a Table> {
    inputs
        .get(index)
        .ok_or_else(|| Error::Table(format!("`{}` is missing input {index}", op.name())))?
        .table(op)
}

fn apply(op: &TableOp, inputs: &[Input]) -> Result<Table> {
    let first = || table_input(op, inputs, 0);

    match op {
        TableOp::ReadCsv { path } => table::csv::read_csv(Path::new(path)),
        TableOp::Head { n } => Ok(ops::head(first()?, *n as usize)),
        TableOp::Tail { n } => Ok(ops::tail(first()?, *n as usize)),
        TableOp::Rows { start, end } => Ok(ops::rows(first()?, *start as usize, *end as usize)),
        TableOp::Columns { names } => ops::select_columns(first()?, names),
        TableOp::SortValues { by, ascending } => ops::sort_values(first()?, by, *ascending),
        TableOp::IsNull => Ok(ops::is_null(first()?)),
        TableOp::NotNull => Ok(ops::not_null(first()?)),
        TableOp::Filter => ops::filter(first()?, table_input(op, inputs, 1)?),
        TableOp::Where { column, op: cmp, value } => {
            ops::filter_where(first()?, column, *cmp, value)
        }
        TableOp::ValueCounts { column } => ops::value_counts(first()?, column),
        TableOp::StrLen => ops::str_len(first()?),
        TableOp::StrContains { pattern } => ops::str_contains(first()?, pattern),
        TableOp::StrStartsWith { prefix } => ops::str_starts_with(first()?, prefix),
        TableOp::Elementwise { op: ew } => match inputs {
            [lhs, rhs] => table::elementwise(*ew, lhs.side(), rhs.side()),
            _ => Err(Error::Table("`elementwise` needs two operands".to_string())),
        },
        TableOp::Delay { millis } => {
            std::thread::sleep(Duration::from_millis(*millis));
            Ok(first()?.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoreConfig;
    use crate::table::{Column, ColumnData};
    use tempfile::TempDir;

    fn setup() -> (TempDir, Store) {
        let temp = TempDir::new().unwrap();
        let store = Store::open(StoreConfig::new(temp.path()).with_row_group_size(2)).unwrap();
        (temp, store)
    }

    fn put(store: &Store, node: &str, table: &Table) -> NodeKey {
        let key = NodeKey::new("in", node).unwrap();
        store.write(&key, table, &[]).unwrap();
        key
    }

    #[test]
    fn test_elementwise_task() {
        let (_temp, store) = setup();
        let a = put(&store, "a", &Table::single("v", ColumnData::Int(vec![1, 2, 3])));
        let b = put(&store, "b", &Table::single("v", ColumnData::Int(vec![10, 20, 30])));
        let target = NodeKey::new("out", "sum").unwrap();

        let task = IsolatedTask::new(
            "test",
            TableOp::Elementwise {
                op: ElementwiseOp::Add,
            },
            target.clone(),
        )
        .input(a)
        .input(b);
        assert_eq!(execute_task(&store, &task).unwrap(), 3);
        assert_eq!(
            store.read_column(&target, "v").unwrap(),
            ColumnData::Int(vec![11, 22, 33])
        );
    }

    #[test]
    fn test_where_uses_data_column() {
        let (_temp, store) = setup();
        let key = NodeKey::new("in", "n").unwrap();
        let table = Table::single("n", ColumnData::Int((0..10).collect()));
        store.write(&key, &table, &["n".into()]).unwrap();

        let target = NodeKey::new("out", "small").unwrap();
        let task = IsolatedTask::new(
            "test",
            TableOp::Where {
                column: "n".into(),
                op: CompareOp::Lt,
                value: Scalar::Int(3),
            },
            target.clone(),
        )
        .input(key);
        assert_eq!(execute_task(&store, &task).unwrap(), 3);
    }

    #[test]
    fn test_where_without_index_scans() {
        let (_temp, store) = setup();
        let key = put(&store, "n", &Table::single("n", ColumnData::Int((0..10).collect())));
        let task = IsolatedTask::new(
            "test",
            TableOp::Where {
                column: "n".into(),
                op: CompareOp::Ge,
                value: Scalar::Int(8),
            },
            NodeKey::new("out", "big").unwrap(),
        )
        .input(key);
        assert_eq!(execute_task(&store, &task).unwrap(), 2);
    }

    #[test]
    fn test_arity_checked() {
        let (_temp, store) = setup();
        let task = IsolatedTask::new("test", TableOp::Head { n: 1 }, NodeKey::new("o", "h").unwrap());
        assert!(matches!(execute_task(&store, &task), Err(Error::Table(_))));
    }

    #[test]
    fn test_missing_input_leaves_no_result() {
        let (_temp, store) = setup();
        let target = NodeKey::new("o", "h").unwrap();
        let task = IsolatedTask::new("test", TableOp::Head { n: 1 }, target.clone())
            .input(NodeKey::new("in", "ghost").unwrap());
        assert!(matches!(
            execute_task(&store, &task),
            Err(Error::StorageNotFound { .. })
        ));
        assert!(!store.exists(&target));
    }

    #[test]
    fn test_scalar_where_table_expected() {
        let (_temp, store) = setup();
        let task = IsolatedTask::new("test", TableOp::IsNull, NodeKey::new("o", "x").unwrap())
            .input(Scalar::Int(1));
        assert!(execute_task(&store, &task).is_err());
    }

    #[test]
    fn test_filter_task() {
        let (_temp, store) = setup();
        let data = put(
            &store,
            "d",
            &Table::new(vec![Column::new("x", ColumnData::Int(vec![5, 6, 7]))]).unwrap(),
        );
        let mask = put(
            &store,
            "m",
            &Table::single("x", ColumnData::Bool(vec![false, true, true])),
        );
        let target = NodeKey::new("o", "f").unwrap();
        let task = IsolatedTask::new("test", TableOp::Filter, target.clone())
            .input(data)
            .input(mask);
        assert_eq!(execute_task(&store, &task).unwrap(), 2);
        assert_eq!(
            store.read_column(&target, "x").unwrap(),
            ColumnData::Int(vec![6, 7])
        );
    }

    #[test]
    fn test_operand_identity_is_stable() {
        let a = Operand::from(NodeKey::new("f", "n").unwrap());
        let b = Operand::from(NodeKey::new("f", "n").unwrap());
        assert_eq!(a.identity(), b.identity());
        assert_ne!(Operand::from(1i64).identity(), Operand::from(1.0f64).identity());
    }
}
