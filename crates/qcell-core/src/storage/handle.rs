//! Handles to persisted results.

use std::fmt;
use std::ops::Range;

use crate::error::{Error, Result};
use crate::runner::{IsolatedRunner, Operand};
use crate::table::{ColumnData, CompareOp, ElementwiseOp, Scalar, Table};

use super::format::DataColumn;
use super::store::{NodeKey, Store};

/// A reference to a table in the store.
///
/// Holds no data: every read goes to disk, so two reads of an unchanged node
/// return equal tables and a handle stays valid across processes.
#[derive(Debug, Clone)]
pub struct ResultHandle {
    store: Store,
    key: NodeKey,
}

impl ResultHandle {
    /// Open a handle to an existing node.
    pub fn open(store: Store, key: NodeKey) -> Result<Self> {
        if !store.exists(&key) {
            return Err(Error::StorageNotFound {
                file: key.file().to_string(),
                node: key.node().to_string(),
            });
        }
        Ok(Self { store, key })
    }

    /// Persist `table` under `key` and return a handle to it.
    pub fn write(
        store: Store,
        key: NodeKey,
        table: &Table,
        data_columns: &[String],
    ) -> Result<Self> {
        store.write(&key, table, data_columns)?;
        Self::open(store, key)
    }

    pub fn key(&self) -> &NodeKey {
        &self.key
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// The whole table.
    pub fn table(&self) -> Result<Table> {
        self.store.read_table(&self.key)
    }

    /// Rows in `range`, clamped to the table.
    pub fn rows(&self, range: Range<usize>) -> Result<Table> {
        self.store.read_rows(&self.key, range)
    }

    pub fn column(&self, name: &str) -> Result<ColumnData> {
        self.store.read_column(&self.key, name)
    }

    pub fn columns(&self) -> Result<Vec<String>> {
        self.store.columns(&self.key)
    }

    pub fn row_count(&self) -> Result<usize> {
        self.store.row_count(&self.key)
    }

    /// Indexed columns and their per-row-group statistics.
    pub fn data_columns(&self) -> Result<Vec<DataColumn>> {
        self.store.data_columns(&self.key)
    }

    /// Rows where `column op value` holds. `column` must be a data column.
    pub fn select_where(&self, column: &str, op: CompareOp, value: &Scalar) -> Result<Table> {
        self.store.select_where(&self.key, column, op, value)
    }

    /// `{"file": .., "node": ..}`, the form handles take in JSON.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "file": self.key.file(), "node": self.key.node() })
    }

    /// Run `self op rhs` in an isolated worker.
    pub fn binary(
        &self,
        op: ElementwiseOp,
        runner: &IsolatedRunner,
        rhs: impl Into<Operand>,
    ) -> Result<ResultHandle> {
        runner.elementwise(op, Operand::from(self), rhs.into())
    }

    pub fn add(&self, runner: &IsolatedRunner, rhs: impl Into<Operand>) -> Result<ResultHandle> {
        self.binary(ElementwiseOp::Add, runner, rhs)
    }

    pub fn subtract(
        &self,
        runner: &IsolatedRunner,
        rhs: impl Into<Operand>,
    ) -> Result<ResultHandle> {
        self.binary(ElementwiseOp::Subtract, runner, rhs)
    }

    pub fn multiply(
        &self,
        runner: &IsolatedRunner,
        rhs: impl Into<Operand>,
    ) -> Result<ResultHandle> {
        self.binary(ElementwiseOp::Multiply, runner, rhs)
    }

    pub fn true_divide(
        &self,
        runner: &IsolatedRunner,
        rhs: impl Into<Operand>,
    ) -> Result<ResultHandle> {
        self.binary(ElementwiseOp::TrueDivide, runner, rhs)
    }

    pub fn floor_divide(
        &self,
        runner: &IsolatedRunner,
        rhs: impl Into<Operand>,
    ) -> Result<ResultHandle> {
        self.binary(ElementwiseOp::FloorDivide, runner, rhs)
    }

    pub fn modulo(&self, runner: &IsolatedRunner, rhs: impl Into<Operand>) -> Result<ResultHandle> {
        self.binary(ElementwiseOp::Modulo, runner, rhs)
    }

    pub fn power(&self, runner: &IsolatedRunner, rhs: impl Into<Operand>) -> Result<ResultHandle> {
        self.binary(ElementwiseOp::Power, runner, rhs)
    }

    pub fn bit_and(&self, runner: &IsolatedRunner, rhs: impl Into<Operand>) -> Result<ResultHandle> {
        self.binary(ElementwiseOp::BitAnd, runner, rhs)
    }

    pub fn bit_or(&self, runner: &IsolatedRunner, rhs: impl Into<Operand>) -> Result<ResultHandle> {
        self.binary(ElementwiseOp::BitOr, runner, rhs)
    }

    pub fn bit_xor(&self, runner: &IsolatedRunner, rhs: impl Into<Operand>) -> Result<ResultHandle> {
        self.binary(ElementwiseOp::BitXor, runner, rhs)
    }

    pub fn eq(&self, runner: &IsolatedRunner, rhs: impl Into<Operand>) -> Result<ResultHandle> {
        self.binary(ElementwiseOp::Compare(CompareOp::Eq), runner, rhs)
    }

    pub fn ne(&self, runner: &IsolatedRunner, rhs: impl Into<Operand>) -> Result<ResultHandle> {
        self.binary(ElementwiseOp::Compare(CompareOp::Ne), runner, rhs)
    }

    pub fn lt(&self, runner: &IsolatedRunner, rhs: impl Into<Operand>) -> Result<ResultHandle> {
        self.binary(ElementwiseOp::Compare(CompareOp::Lt), runner, rhs)
    }

    pub fn le(&self, runner: &IsolatedRunner, rhs: impl Into<Operand>) -> Result<ResultHandle> {
        self.binary(ElementwiseOp::Compare(CompareOp::Le), runner, rhs)
    }

    pub fn gt(&self, runner: &IsolatedRunner, rhs: impl Into<Operand>) -> Result<ResultHandle> {
        self.binary(ElementwiseOp::Compare(CompareOp::Gt), runner, rhs)
    }

    pub fn ge(&self, runner: &IsolatedRunner, rhs: impl Into<Operand>) -> Result<ResultHandle> {
        self.binary(ElementwiseOp::Compare(CompareOp::Ge), runner, rhs)
    }
}

impl PartialEq for ResultHandle {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.store.root() == other.store.root()
    }
}

impl fmt::Display for ResultHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<table {}>", self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoreConfig;
    use crate::table::Column;
    use tempfile::TempDir;

    fn sample() -> Table {
        Table::new(vec![
            Column::new("id", ColumnData::Int((0..10).collect())),
            Column::new(
                "name",
                ColumnData::Text((0..10).map(|i| Some(format!("n{i}"))).collect()),
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_open_missing_node() {
        let temp = TempDir::new().unwrap();
        let store = Store::open(StoreConfig::new(temp.path())).unwrap();
        let err = ResultHandle::open(store, NodeKey::new("f", "nope").unwrap()).unwrap_err();
        match err {
            Error::StorageNotFound { file, node } => {
                assert_eq!(file, "f");
                assert_eq!(node, "nope");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_reads_are_repeatable() {
        let temp = TempDir::new().unwrap();
        let store = Store::open(StoreConfig::new(temp.path()).with_row_group_size(3)).unwrap();
        let handle = ResultHandle::write(
            store,
            NodeKey::new("f", "t").unwrap(),
            &sample(),
            &["id".to_string()],
        )
        .unwrap();

        assert_eq!(handle.table().unwrap(), handle.table().unwrap());
        assert_eq!(handle.table().unwrap(), sample());
        assert_eq!(handle.rows(2..5).unwrap(), sample().slice(2..5));
        assert_eq!(handle.column("id").unwrap(), ColumnData::Int((0..10).collect()));
        assert_eq!(handle.columns().unwrap(), vec!["id", "name"]);
        assert_eq!(handle.row_count().unwrap(), 10);
        assert_eq!(handle.data_columns().unwrap()[0].name, "id");

        let picked = handle
            .select_where("id", CompareOp::Gt, &Scalar::Int(7))
            .unwrap();
        assert_eq!(picked.row_count(), 2);
    }

    #[test]
    fn test_handle_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let store = Store::open(StoreConfig::new(temp.path())).unwrap();
        let key = NodeKey::new("f", "t").unwrap();
        let written = ResultHandle::write(store, key.clone(), &sample(), &[]).unwrap();

        let reopened = Store::open(StoreConfig::new(temp.path())).unwrap();
        let handle = ResultHandle::open(reopened, key).unwrap();
        assert_eq!(handle, written);
        assert_eq!(handle.table().unwrap(), sample());
        assert_eq!(handle.to_string(), "<table f/t>");
    }

    #[test]
    fn test_failed_write_returns_no_handle() {
        let temp = TempDir::new().unwrap();
        let store = Store::open(StoreConfig::new(temp.path())).unwrap();
        let key = NodeKey::new("f", "t").unwrap();
        // Indexing an unknown column is rejected before anything is written.
        let result = ResultHandle::write(store.clone(), key.clone(), &sample(), &["zzz".into()]);
        assert!(result.is_err());
        assert!(!store.exists(&key));
    }
}
