//! Table cells.
//!
//! Each cell turns its inputs into a [`TableOp`], runs it in a worker and
//! outputs the handle of the persisted result. Nothing here materialises a
//! table in the host process; at most the manifest is read.

use std::path::Path;

use crate::cell::{
    Cell, CellDescriptor, CellState, Initial, ProcessContext, SocketSpec, Value, ValueType, boxed,
    column_names, non_negative_int,
};
use crate::error::{Error, Result};
use crate::runner::{IsolatedTask, Operand, TableOp};
use crate::storage::{NodeKey, ResultHandle};
use crate::table::{CompareOp, Scalar};

use super::{names, run_table_op};

/// One-input operation on the table in `socket`, with the result written to
/// `output`.
fn unary(
    state: &mut CellState,
    ctx: &ProcessContext,
    socket: &str,
    op: TableOp,
    output: &str,
    done: &str,
) -> Result<()> {
    let input = state.table(socket)?.clone();
    let handle = run_table_op(state, ctx, op, vec![Operand::from(input)], Vec::new())?;
    state.output(output, handle)?;
    state.set_status(done);
    Ok(())
}

fn int_input(state: &CellState, name: &str) -> Result<u64> {
    match state.inputs.require(name)? {
        Value::Int(n) if *n >= 0 => Ok(*n as u64),
        other => Err(Error::InvalidSocket {
            socket: name.to_string(),
            reason: format!("expected a non-negative integer, got {other}"),
        }),
    }
}

/// Loads a CSV file into the store.
///
/// The result is keyed by the file stem (`data.csv` lands at `data/data`),
/// falling back to the cell's own key when the stem is not a valid key.
#[derive(Default)]
pub struct ReadCsv;

impl Cell for ReadCsv {
    fn process(&mut self, state: &mut CellState, ctx: &ProcessContext) -> Result<()> {
        let csv = state.text("csv")?;
        let path = std::path::absolute(csv)?;
        let path_str = path.to_str().ok_or_else(|| Error::InvalidSocket {
            socket: "csv".to_string(),
            reason: format!("{} is not valid UTF-8", path.display()),
        })?;
        let target = stem_key(&path).or_else(|_| state.result_key())?;
        let data_columns = names(state.input("data_columns")?);

        let task = IsolatedTask::new(
            state.caller(),
            TableOp::ReadCsv {
                path: path_str.to_string(),
            },
            target,
        )
        .data_columns(data_columns);
        let handle = ctx.runner().run(task)?;

        state.output("dataframe", handle)?;
        state.set_status("Data has been read.");
        Ok(())
    }
}

fn stem_key(path: &Path) -> Result<NodeKey> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::InvalidKey(path.display().to_string()))?;
    NodeKey::new(stem, stem)
}

pub static READ_CSV: CellDescriptor = CellDescriptor {
    name: "Read_CSV",
    categories: &["Data", "Query"],
    summary: "Reads a CSV file into a stored table.",
    inputs: &[
        SocketSpec::new("csv", ValueType::Text).required(),
        SocketSpec::new("data_columns", ValueType::List)
            .initial(Initial::EmptyList)
            .validator(column_names),
    ],
    outputs: &[SocketSpec::new("dataframe", ValueType::Table)],
    inflows: &[],
    outflows: &[],
    always_reprocess: false,
    threadsafe: false,
    status: "Give me a csv file!",
    create: boxed::<ReadCsv>,
};

/// First `n` rows.
#[derive(Default)]
pub struct Head;

impl Cell for Head {
    fn process(&mut self, state: &mut CellState, ctx: &ProcessContext) -> Result<()> {
        let n = int_input(state, "n")?;
        unary(state, ctx, "data", TableOp::Head { n }, "dataframe", "Head is ready.")
    }
}

const N_AND_DATA: &[SocketSpec] = &[
    SocketSpec::new("n", ValueType::Int)
        .initial(Initial::Int(5))
        .required()
        .validator(non_negative_int),
    SocketSpec::new("data", ValueType::Table).required(),
];

const DATAFRAME: &[SocketSpec] = &[SocketSpec::new("dataframe", ValueType::Table)];

pub static HEAD: CellDescriptor = CellDescriptor {
    name: "Head",
    categories: &["Data", "Query"],
    summary: "The first n rows of a table.",
    inputs: N_AND_DATA,
    outputs: DATAFRAME,
    inflows: &[],
    outflows: &[],
    always_reprocess: false,
    threadsafe: false,
    status: "I'm ready!",
    create: boxed::<Head>,
};

/// Last `n` rows.
#[derive(Default)]
pub struct Tail;

impl Cell for Tail {
    fn process(&mut self, state: &mut CellState, ctx: &ProcessContext) -> Result<()> {
        let n = int_input(state, "n")?;
        unary(state, ctx, "data", TableOp::Tail { n }, "dataframe", "Tail is ready.")
    }
}

pub static TAIL: CellDescriptor = CellDescriptor {
    name: "Tail",
    categories: &["Data", "Query"],
    summary: "The last n rows of a table.",
    inputs: N_AND_DATA,
    outputs: DATAFRAME,
    inflows: &[],
    outflows: &[],
    always_reprocess: false,
    threadsafe: false,
    status: "I'm ready!",
    create: boxed::<Tail>,
};

/// Rows `start..end` by position. A null `end` means the last row.
#[derive(Default)]
pub struct Iloc;

impl Cell for Iloc {
    fn process(&mut self, state: &mut CellState, ctx: &ProcessContext) -> Result<()> {
        let start = int_input(state, "start")?;
        let end = match state.input("end")? {
            Value::Null => state.table("data")?.row_count()? as u64,
            _ => int_input(state, "end")?,
        };
        unary(
            state,
            ctx,
            "data",
            TableOp::Rows { start, end },
            "dataframe",
            "Rows selected.",
        )
    }
}

pub static ILOC: CellDescriptor = CellDescriptor {
    name: "Iloc",
    categories: &["Data", "Query"],
    summary: "Selects rows by position.",
    inputs: &[
        SocketSpec::new("data", ValueType::Table).required(),
        SocketSpec::new("start", ValueType::Int)
            .initial(Initial::Int(0))
            .required()
            .validator(non_negative_int),
        SocketSpec::new("end", ValueType::Int).validator(non_negative_int),
    ],
    outputs: DATAFRAME,
    inflows: &[],
    outflows: &[],
    always_reprocess: false,
    threadsafe: false,
    status: "I'm ready!",
    create: boxed::<Iloc>,
};

/// A subset of columns.
#[derive(Default)]
pub struct ColumnCell;

impl Cell for ColumnCell {
    fn process(&mut self, state: &mut CellState, ctx: &ProcessContext) -> Result<()> {
        let names = names(state.inputs.require("columns")?);
        if names.is_empty() {
            return Err(Error::InvalidSocket {
                socket: "columns".to_string(),
                reason: "no columns given".to_string(),
            });
        }
        unary(
            state,
            ctx,
            "data",
            TableOp::Columns { names },
            "data",
            "Selected",
        )
    }
}

pub static COLUMN: CellDescriptor = CellDescriptor {
    name: "Column",
    categories: &["Data", "Query"],
    summary: "Selects one column or a list of columns.",
    inputs: &[
        SocketSpec::new("data", ValueType::Table).required(),
        SocketSpec::new("columns", ValueType::Any)
            .initial(Initial::EmptyList)
            .required()
            .validator(column_names),
    ],
    outputs: &[SocketSpec::new("data", ValueType::Table)],
    inflows: &[],
    outflows: &[],
    always_reprocess: false,
    threadsafe: false,
    status: "Ready to select columns!",
    create: boxed::<ColumnCell>,
};

/// Sorts by a list of columns, or by every column when the list is empty.
#[derive(Default)]
pub struct SortValues;

impl Cell for SortValues {
    fn process(&mut self, state: &mut CellState, ctx: &ProcessContext) -> Result<()> {
        let mut by = names(state.input("column_list")?);
        if by.is_empty() {
            by = state.table("data")?.columns()?;
        }
        let ascending = state.input("ascending")?.truthy();
        unary(
            state,
            ctx,
            "data",
            TableOp::SortValues { by, ascending },
            "data",
            "Sorted",
        )
    }
}

pub static SORT_VALUES: CellDescriptor = CellDescriptor {
    name: "Sort_Values",
    categories: &["Data", "Modify"],
    summary: "Sorts rows by column values.",
    inputs: &[
        SocketSpec::new("data", ValueType::Table).required(),
        SocketSpec::new("column_list", ValueType::List)
            .initial(Initial::EmptyList)
            .validator(column_names),
        SocketSpec::new("ascending", ValueType::Bool).initial(Initial::Bool(true)),
    ],
    outputs: &[SocketSpec::new("data", ValueType::Table)],
    inflows: &[],
    outflows: &[],
    always_reprocess: false,
    threadsafe: false,
    status: "Ready to sort.",
    create: boxed::<SortValues>,
};

const SERIES: &[SocketSpec] = &[SocketSpec::new("series", ValueType::Table).required()];
const SERIES_OUT: &[SocketSpec] = &[SocketSpec::new("series", ValueType::Table)];

/// Null mask of every column.
#[derive(Default)]
pub struct IsNull;

impl Cell for IsNull {
    fn process(&mut self, state: &mut CellState, ctx: &ProcessContext) -> Result<()> {
        unary(state, ctx, "series", TableOp::IsNull, "series", "Checked for nulls.")
    }
}

pub static IS_NULL: CellDescriptor = CellDescriptor {
    name: "IsNull",
    categories: &["Data", "Modify"],
    summary: "True where a value is missing.",
    inputs: SERIES,
    outputs: SERIES_OUT,
    inflows: &[],
    outflows: &[],
    always_reprocess: false,
    threadsafe: false,
    status: "Ready to filter for nulls!",
    create: boxed::<IsNull>,
};

/// Inverse of [`IsNull`].
#[derive(Default)]
pub struct NotNull;

impl Cell for NotNull {
    fn process(&mut self, state: &mut CellState, ctx: &ProcessContext) -> Result<()> {
        unary(state, ctx, "series", TableOp::NotNull, "series", "Checked for nulls.")
    }
}

pub static NOT_NULL: CellDescriptor = CellDescriptor {
    name: "NotNull",
    categories: &["Data", "Modify"],
    summary: "True where a value is present.",
    inputs: SERIES,
    outputs: SERIES_OUT,
    inflows: &[],
    outflows: &[],
    always_reprocess: false,
    threadsafe: false,
    status: "Ready to filter for nulls!",
    create: boxed::<NotNull>,
};

fn compare_symbol(value: &Value) -> std::result::Result<(), String> {
    match value.as_str() {
        Some(symbol) if CompareOp::from_symbol(symbol).is_some() => Ok(()),
        _ => Err(format!("{value} is not a comparison operator")),
    }
}

/// Filters rows by a boolean `sieve` table, or by `column op value`.
///
/// With neither, the input passes through unchanged.
#[derive(Default)]
pub struct Select;

impl Cell for Select {
    fn process(&mut self, state: &mut CellState, ctx: &ProcessContext) -> Result<()> {
        let data = state.table("data")?.clone();
        let sieve = state.input("sieve")?.as_table().cloned();
        let column = state.input("column")?.as_str().map(str::to_string);

        let handle = match (sieve, column) {
            (Some(sieve), _) => run_table_op(
                state,
                ctx,
                TableOp::Filter,
                vec![Operand::from(data), Operand::from(sieve)],
                Vec::new(),
            )?,
            (None, Some(column)) => {
                let (op, value) = where_clause(state)?;
                run_table_op(
                    state,
                    ctx,
                    TableOp::Where { column, op, value },
                    vec![Operand::from(data)],
                    Vec::new(),
                )?
            }
            (None, None) => data,
        };

        state.output("dataframe", handle)?;
        state.set_status("Data is filtered.");
        Ok(())
    }
}

fn where_clause(state: &CellState) -> Result<(CompareOp, Scalar)> {
    let symbol = state.text("op")?;
    let op = CompareOp::from_symbol(symbol).ok_or_else(|| Error::InvalidSocket {
        socket: "op".to_string(),
        reason: format!("unknown operator `{symbol}`"),
    })?;
    let value = state.inputs.require("value")?;
    let scalar = value.to_scalar().ok_or_else(|| Error::InvalidSocket {
        socket: "value".to_string(),
        reason: format!("cannot compare a column with {}", value.type_name()),
    })?;
    Ok((op, scalar))
}

pub static SELECT: CellDescriptor = CellDescriptor {
    name: "Select",
    categories: &["Data", "Query"],
    summary: "Filters rows with a boolean sieve or a where clause.",
    inputs: &[
        SocketSpec::new("data", ValueType::Table).required(),
        SocketSpec::new("sieve", ValueType::Table),
        SocketSpec::new("column", ValueType::Text),
        SocketSpec::new("op", ValueType::Text)
            .initial(Initial::Text("=="))
            .validator(compare_symbol),
        SocketSpec::new("value", ValueType::Any),
    ],
    outputs: DATAFRAME,
    inflows: &[],
    outflows: &[],
    always_reprocess: false,
    threadsafe: false,
    status: "Ready to select.",
    create: boxed::<Select>,
};

/// Tally of distinct values in one column, most frequent first.
#[derive(Default)]
pub struct ValueCounts;

impl Cell for ValueCounts {
    fn process(&mut self, state: &mut CellState, ctx: &ProcessContext) -> Result<()> {
        let column = match state.input("column")?.as_str() {
            Some(column) => column.to_string(),
            None => first_column(state.table("series")?)?,
        };
        unary(
            state,
            ctx,
            "series",
            TableOp::ValueCounts { column },
            "series",
            "Series is tallied.",
        )
    }
}

fn first_column(handle: &ResultHandle) -> Result<String> {
    handle
        .columns()?
        .into_iter()
        .next()
        .ok_or_else(|| Error::Table(format!("{handle} has no columns")))
}

pub static VALUE_COUNTS: CellDescriptor = CellDescriptor {
    name: "Value_Counts",
    categories: &["Data", "Modify"],
    summary: "Counts the distinct values of a column.",
    inputs: &[
        SocketSpec::new("series", ValueType::Table).required(),
        SocketSpec::new("column", ValueType::Text),
    ],
    outputs: SERIES_OUT,
    inflows: &[],
    outflows: &[],
    always_reprocess: false,
    threadsafe: false,
    status: "Ready to tally.",
    create: boxed::<ValueCounts>,
};

/// Character length of every text value.
#[derive(Default)]
pub struct StrLen;

impl Cell for StrLen {
    fn process(&mut self, state: &mut CellState, ctx: &ProcessContext) -> Result<()> {
        unary(state, ctx, "series", TableOp::StrLen, "series", "Series is calculated.")
    }
}

pub static STR_LEN: CellDescriptor = CellDescriptor {
    name: "Str_Len",
    categories: &["Data", "Modify", "String"],
    summary: "Length of each text value.",
    inputs: SERIES,
    outputs: SERIES_OUT,
    inflows: &[],
    outflows: &[],
    always_reprocess: false,
    threadsafe: false,
    status: "Ready to len.",
    create: boxed::<StrLen>,
};

const SERIES_AND_SUBSTRING: &[SocketSpec] = &[
    SocketSpec::new("series", ValueType::Table).required(),
    SocketSpec::new("substring", ValueType::Text).required(),
];

/// Whether each text value contains `substring`.
#[derive(Default)]
pub struct StrContains;

impl Cell for StrContains {
    fn process(&mut self, state: &mut CellState, ctx: &ProcessContext) -> Result<()> {
        let pattern = state.text("substring")?.to_string();
        unary(
            state,
            ctx,
            "series",
            TableOp::StrContains { pattern },
            "series",
            "Strings have been searched.",
        )
    }
}

pub static STR_CONTAINS: CellDescriptor = CellDescriptor {
    name: "Str_Contains",
    categories: &["Data", "Modify", "String"],
    summary: "True where the text contains the substring.",
    inputs: SERIES_AND_SUBSTRING,
    outputs: SERIES_OUT,
    inflows: &[],
    outflows: &[],
    always_reprocess: false,
    threadsafe: false,
    status: "Ready to match substring.",
    create: boxed::<StrContains>,
};

/// Whether each text value starts with `substring`.
#[derive(Default)]
pub struct StrStartsWith;

impl Cell for StrStartsWith {
    fn process(&mut self, state: &mut CellState, ctx: &ProcessContext) -> Result<()> {
        let prefix = state.text("substring")?.to_string();
        unary(
            state,
            ctx,
            "series",
            TableOp::StrStartsWith { prefix },
            "series",
            "Strings have been searched.",
        )
    }
}

pub static STR_STARTS_WITH: CellDescriptor = CellDescriptor {
    name: "Str_StartsWith",
    categories: &["Data", "Modify", "String"],
    summary: "True where the text starts with the substring.",
    inputs: SERIES_AND_SUBSTRING,
    outputs: SERIES_OUT,
    inflows: &[],
    outflows: &[],
    always_reprocess: false,
    threadsafe: false,
    status: "Ready to match substring.",
    create: boxed::<StrStartsWith>,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::ReturnCode;
    use crate::cells::testing::context;
    use crate::table::{ColumnData, Table};

    fn stored(ctx: &ProcessContext) -> ResultHandle {
        ResultHandle::write(
            ctx.store().clone(),
            NodeKey::new("t", "v").unwrap(),
            &Table::single("v", ColumnData::Int(vec![3, 1, 2])),
            &[],
        )
        .unwrap()
    }

    #[test]
    fn test_missing_data_stalls() {
        let (_temp, ctx) = context();
        let mut cell = HEAD.instantiate();
        assert_eq!(cell.process(&ctx), ReturnCode::Unknown);
        assert_eq!(cell.status_message(), "missing required input `data`");
    }

    #[test]
    fn test_n_is_validated() {
        let mut cell = HEAD.instantiate();
        assert!(cell.set_input("n", -1i64).is_err());
        assert!(cell.set_input("n", "five").is_err());
        assert_eq!(cell.input("n").unwrap(), &Value::Int(5));
        cell.set_input("n", 2i64).unwrap();
    }

    #[test]
    fn test_select_passes_through_without_clause() {
        let (_temp, ctx) = context();
        let handle = stored(&ctx);
        let mut cell = SELECT.instantiate();
        cell.set_input("data", handle.clone()).unwrap();
        assert_eq!(cell.process(&ctx), ReturnCode::Ok);
        assert_eq!(cell.output("dataframe").unwrap(), &Value::Table(handle));
    }

    #[test]
    fn test_select_rejects_unknown_operator() {
        let mut cell = SELECT.instantiate();
        assert!(cell.set_input("op", "=~").is_err());
        cell.set_input("op", ">=").unwrap();
    }

    #[test]
    fn test_table_ops_need_a_worker() {
        // No worker binary in unit tests: the run fails and the cell quits
        // without having written anything.
        let (_temp, ctx) = context();
        let mut cell = TAIL.instantiate();
        cell.set_input("data", stored(&ctx)).unwrap();
        assert_eq!(cell.process(&ctx), ReturnCode::Quit);
        assert_eq!(cell.output("dataframe").unwrap(), &Value::Null);
        let key = cell.state().result_key().unwrap();
        assert!(!ctx.store().exists(&key));
    }

    #[test]
    fn test_column_requires_names() {
        let (_temp, ctx) = context();
        let mut cell = COLUMN.instantiate();
        cell.set_input("data", stored(&ctx)).unwrap();
        assert!(cell.set_input("columns", 1i64).is_err());
        assert_eq!(cell.process(&ctx), ReturnCode::Quit);
        assert!(cell.status_message().contains("no columns"));
    }

    #[test]
    fn test_read_csv_key_from_stem() {
        let key = stem_key(Path::new("/tmp/sales-2020.csv")).unwrap();
        assert_eq!(key.file(), "sales-2020");
        assert_eq!(key.node(), "sales-2020");
        assert!(stem_key(Path::new("/tmp/bad name.csv")).is_err());
    }
}
