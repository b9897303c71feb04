//! The cell registry: every cell a host can instantiate, by name.

use crate::cell::{CellDescriptor, CellInstance};
use crate::cells::{language, logic, projection, table, utility};
use crate::error::{Error, Result};

/// All registered cells.
pub static CELLS: &[&CellDescriptor] = &[
    // Flow control and console
    &utility::START,
    &utility::PRINT,
    &utility::SLEEP,
    &logic::IF,
    // Memory
    &language::VARIABLE,
    &language::TO_LIST,
    &language::LEN,
    // Operators
    &language::ADD,
    &language::SUB,
    &language::MUL,
    &language::DIV,
    &language::INT_DIV,
    &language::POW,
    &logic::EQ,
    &logic::GT,
    &logic::GTE,
    &logic::LT,
    &logic::LTE,
    &logic::BITWISE_OR,
    &logic::BITWISE_AND,
    // Projection
    &projection::AST_COLUMN,
    &projection::NUMPY_COLUMN,
    // Tables
    &table::READ_CSV,
    &table::HEAD,
    &table::TAIL,
    &table::ILOC,
    &table::COLUMN,
    &table::SORT_VALUES,
    &table::IS_NULL,
    &table::NOT_NULL,
    &table::SELECT,
    &table::VALUE_COUNTS,
    &table::STR_LEN,
    &table::STR_CONTAINS,
    &table::STR_STARTS_WITH,
];

/// Find a cell descriptor by name.
pub fn find(name: &str) -> Option<&'static CellDescriptor> {
    CELLS.iter().copied().find(|d| d.name == name)
}

/// Like [`find`], but an unknown name is an error.
pub fn lookup(name: &str) -> Result<&'static CellDescriptor> {
    find(name).ok_or_else(|| Error::CellNotFound(name.to_string()))
}

/// Instantiate a cell by name.
pub fn create(name: &str) -> Result<CellInstance> {
    Ok(lookup(name)?.instantiate())
}

/// Every category used by a registered cell, sorted.
pub fn categories() -> Vec<&'static str> {
    let mut all: Vec<_> = CELLS
        .iter()
        .flat_map(|d| d.categories.iter().copied())
        .collect();
    all.sort_unstable();
    all.dedup();
    all
}

/// Cells listed under `category`.
pub fn in_category(category: &str) -> impl Iterator<Item = &'static CellDescriptor> + '_ {
    CELLS
        .iter()
        .copied()
        .filter(move |d| d.categories.contains(&category))
}
