//! The cell library.
//!
//! Scalar work happens in-process. Anything that touches a table runs as an
//! [`IsolatedTask`] in a worker and hands a [`ResultHandle`] downstream.

pub mod language;
pub mod logic;
pub mod projection;
pub mod table;
pub mod utility;

use crate::cell::{CellState, ProcessContext, Value};
use crate::error::{Error, Result};
use crate::runner::{IsolatedTask, Operand, TableOp};
use crate::storage::ResultHandle;
use crate::table::ElementwiseOp;

/// Run `op` in a worker, persisting the result under the cell's own key.
pub(crate) fn run_table_op(
    state: &CellState,
    ctx: &ProcessContext,
    op: TableOp,
    inputs: Vec<Operand>,
    data_columns: Vec<String>,
) -> Result<ResultHandle> {
    let mut task = IsolatedTask::new(state.caller(), op, state.result_key()?)
        .data_columns(data_columns);
    task.inputs = inputs;
    ctx.runner().run(task)
}

/// Apply a binary operator to two socket values.
///
/// When either side is a table the operation runs elementwise in a worker;
/// otherwise `scalar` computes it in-process.
pub(crate) fn binary(
    state: &CellState,
    ctx: &ProcessContext,
    a: &Value,
    b: &Value,
    op: ElementwiseOp,
    scalar: impl FnOnce(&Value, &Value) -> Result<Value>,
) -> Result<Value> {
    if a.as_table().is_none() && b.as_table().is_none() {
        return scalar(a, b);
    }
    let operand = |socket: &str, value: &Value| {
        value.to_operand().ok_or_else(|| Error::InvalidSocket {
            socket: socket.to_string(),
            reason: format!("cannot combine {} with a table", value.type_name()),
        })
    };
    let handle = ctx
        .runner()
        .elementwise_as(state.caller(), op, operand("a", a)?, operand("b", b)?)?;
    Ok(Value::Table(handle))
}

/// Text or list of text as column names.
pub(crate) fn names(value: &Value) -> Vec<String> {
    match value {
        Value::Text(name) => vec![name.clone()],
        Value::List(items) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}
