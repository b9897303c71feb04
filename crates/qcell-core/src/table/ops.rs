//! Row and column transformations on in-memory tables.

use std::cmp::Ordering;

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};

use super::elementwise::scalar_ordering;
use super::{Column, ColumnData, CompareOp, Scalar, Table};

/// First `n` rows.
pub fn head(table: &Table, n: usize) -> Table {
    table.slice(0..n)
}

/// Last `n` rows.
pub fn tail(table: &Table, n: usize) -> Table {
    let rows = table.row_count();
    table.slice(rows.saturating_sub(n)..rows)
}

/// Rows `start..end`, clamped to the table.
pub fn rows(table: &Table, start: usize, end: usize) -> Table {
    table.slice(start..end.max(start))
}

/// Keep `names`, in that order.
pub fn select_columns(table: &Table, names: &[String]) -> Result<Table> {
    let columns = names
        .iter()
        .map(|name| table.require(name).cloned())
        .collect::<Result<Vec<_>>>()?;
    Table::new(columns)
}

/// Stable sort by the given columns. Missing values go last.
pub fn sort_values(table: &Table, by: &[String], ascending: bool) -> Result<Table> {
    if by.is_empty() {
        return Err(Error::Table("sort needs at least one column".to_string()));
    }
    let keys = by
        .iter()
        .map(|name| table.require(name).map(|c| &c.data))
        .collect::<Result<Vec<_>>>()?;

    let mut order: Vec<usize> = (0..table.row_count()).collect();
    order.sort_by(|&i, &j| {
        for key in &keys {
            let ordering = match (key.get(i), key.get(j)) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => {
                    let o = scalar_ordering(&a, &b).unwrap_or(Ordering::Equal);
                    if ascending { o } else { o.reverse() }
                }
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
    Ok(table.take(&order))
}

fn null_mask(table: &Table, want_null: bool) -> Table {
    let columns = table
        .columns()
        .iter()
        .map(|c| {
            let mask = (0..c.data.len())
                .map(|row| c.data.is_null(row) == want_null)
                .collect();
            Column::new(c.name.clone(), ColumnData::Bool(mask))
        })
        .collect();
    // Same names and lengths as the input, so this cannot fail.
    Table::new(columns).unwrap_or_default()
}

pub fn is_null(table: &Table) -> Table {
    null_mask(table, true)
}

pub fn not_null(table: &Table) -> Table {
    null_mask(table, false)
}

/// Keep the rows where `mask` is true.
///
/// The mask is a table with one boolean column and the same row count.
pub fn filter(table: &Table, mask: &Table) -> Result<Table> {
    let [column] = mask.columns() else {
        return Err(Error::Table(format!(
            "mask must have exactly one column, got {}",
            mask.columns().len()
        )));
    };
    let ColumnData::Bool(mask) = &column.data else {
        return Err(Error::Table(format!(
            "mask column `{}` is {}, expected bool",
            column.name,
            column.data.kind()
        )));
    };
    if mask.len() != table.row_count() {
        return Err(Error::Table(format!(
            "mask has {} rows, table has {}",
            mask.len(),
            table.row_count()
        )));
    }
    let keep: Vec<usize> = mask
        .iter()
        .enumerate()
        .filter_map(|(i, m)| m.then_some(i))
        .collect();
    Ok(table.take(&keep))
}

/// Keep the rows where `column op value` holds. Full scan.
pub fn filter_where(table: &Table, column: &str, op: CompareOp, value: &Scalar) -> Result<Table> {
    let data = &table.require(column)?.data;
    let keep: Vec<usize> = (0..data.len())
        .filter(|&row| data.get(row).is_some_and(|v| op.test(&v, value)))
        .collect();
    Ok(table.take(&keep))
}

/// Count occurrences of each value in `column`, most frequent first.
///
/// Ties keep first-appearance order. Missing values are not counted.
pub fn value_counts(table: &Table, column: &str) -> Result<Table> {
    let data = &table.require(column)?.data;

    let mut counts: FxHashMap<String, (usize, i64)> = FxHashMap::default();
    for row in 0..data.len() {
        let Some(value) = data.get(row) else {
            continue;
        };
        // Group by a kind-qualified rendering so `1` and `1.0` stay apart.
        let key = format!("{}:{value}", value.kind());
        counts
            .entry(key)
            .and_modify(|(_, n)| *n += 1)
            .or_insert((row, 1));
    }

    let mut groups: Vec<(usize, i64)> = counts.into_values().collect();
    groups.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let first_rows: Vec<usize> = groups.iter().map(|(row, _)| *row).collect();
    Table::new(vec![
        Column::new(column, data.take(&first_rows)),
        Column::new(
            "count",
            ColumnData::Int(groups.iter().map(|(_, n)| *n).collect()),
        ),
    ])
}

fn text_columns(
    table: &Table,
    op: &str,
    f: impl Fn(&[Option<String>]) -> ColumnData,
) -> Result<Table> {
    table.map_columns(|data| match data {
        ColumnData::Text(values) => Ok(f(values)),
        other => Err(Error::Table(format!(
            "`{op}` needs text columns, got {}",
            other.kind()
        ))),
    })
}

/// Character length of every text value.
///
/// A column with missing values becomes float, with `NaN` for the gaps.
pub fn str_len(table: &Table) -> Result<Table> {
    text_columns(table, "str_len", |values| {
        if values.iter().all(Option::is_some) {
            ColumnData::Int(
                values
                    .iter()
                    .map(|v| v.as_deref().map_or(0, |s| s.chars().count() as i64))
                    .collect(),
            )
        } else {
            ColumnData::Float(
                values
                    .iter()
                    .map(|v| v.as_deref().map_or(f64::NAN, |s| s.chars().count() as f64))
                    .collect(),
            )
        }
    })
}

pub fn str_contains(table: &Table, pattern: &str) -> Result<Table> {
    text_columns(table, "str_contains", |values| {
        ColumnData::Bool(
            values
                .iter()
                .map(|v| v.as_deref().is_some_and(|s| s.contains(pattern)))
                .collect(),
        )
    })
}

pub fn str_starts_with(table: &Table, prefix: &str) -> Result<Table> {
    text_columns(table, "str_startswith", |values| {
        ColumnData::Bool(
            values
                .iter()
                .map(|v| v.as_deref().is_some_and(|s| s.starts_with(prefix)))
                .collect(),
        )
    })
}
