//! Core engine for qcell, a library of dataflow cells.
//!
//! This crate provides:
//! - A safe evaluator for one-variable arithmetic expressions
//! - A columnar table store with partial reads and zone maps
//! - Isolated execution of table operations in worker processes
//! - The cell model and the cell library a node-graph host drives

pub mod cell;
pub mod cells;
pub mod error;
pub mod expr;
pub mod paths;
pub mod registry;
pub mod runner;
pub mod storage;
pub mod table;

pub use cell::{
    Cell, CellDescriptor, CellInstance, CellState, ProcessContext, ReturnCode, Value, ValueType,
};
pub use error::{Error, Result};
pub use expr::{Expression, Number, eval_str, project};
pub use paths::QcellDirs;
pub use runner::{IsolatedRunner, IsolatedTask, Operand, RunnerConfig, TableOp};
pub use storage::{NodeKey, ResultHandle, Store, StoreConfig};
pub use table::{ColumnData, CompareOp, ElementwiseOp, Scalar, Table};
