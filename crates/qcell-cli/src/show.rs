//! `show`: read a stored table, or part of it.

use std::ops::Range;
use std::path::Path;

use qcell_core::storage::{NodeKey, ResultHandle, Store, StoreConfig};
use qcell_core::table::{Table, ops};

use crate::colors;

pub fn execute(
    file: &str,
    node: &str,
    store: &Path,
    rows: Option<&str>,
    column: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let store = Store::open(StoreConfig::new(store))?;
    let handle = ResultHandle::open(store, NodeKey::new(file, node)?)?;

    let table = match (rows, column) {
        (Some(rows), _) => {
            let table = handle.rows(parse_range(rows)?)?;
            match column {
                Some(column) => ops::select_columns(&table, &[column.to_string()])?,
                None => table,
            }
        }
        (None, Some(column)) => Table::single(column, handle.column(column)?),
        (None, None) => handle.table()?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&table.to_json())?);
        return Ok(());
    }

    println!("{}{}{}", colors::BOLD, handle, colors::RESET);
    println!("{table}");
    let indexed: Vec<_> = handle.data_columns()?.into_iter().map(|c| c.name).collect();
    println!(
        "{}{} of {} rows; data columns: {}{}",
        colors::DIM,
        table.row_count(),
        handle.row_count()?,
        if indexed.is_empty() { "none".to_string() } else { indexed.join(", ") },
        colors::RESET
    );
    Ok(())
}

/// `a..b`, `a..` or `..b`.
fn parse_range(s: &str) -> anyhow::Result<Range<usize>> {
    let (start, end) = s
        .split_once("..")
        .ok_or_else(|| anyhow::anyhow!("expected a row range like 10..20, got `{s}`"))?;
    let start = if start.is_empty() { 0 } else { start.parse()? };
    let end = if end.is_empty() { usize::MAX } else { end.parse()? };
    anyhow::ensure!(start <= end, "row range {s} is reversed");
    Ok(start..end)
}
