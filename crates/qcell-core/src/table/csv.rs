//! CSV input with per-column type inference.

use std::io::Read;
use std::path::Path;

use crate::error::{Error, Result};

use super::{Column, ColumnData, Table};

/// Read a CSV file with a header row.
pub fn read_csv(path: &Path) -> Result<Table> {
    let reader = ::csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)?;
    read_records(reader)
}

/// Read CSV text with a header row from any reader.
pub fn read_csv_from<R: Read>(input: R) -> Result<Table> {
    let reader = ::csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(input);
    read_records(reader)
}

fn read_records<R: Read>(mut reader: ::csv::Reader<R>) -> Result<Table> {
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut raw: Vec<Vec<String>> = vec![Vec::new(); headers.len()];

    for (line, record) in reader.records().enumerate() {
        let record = record?;
        if record.len() != headers.len() {
            return Err(Error::Table(format!(
                "record {} has {} fields, expected {}",
                line + 1,
                record.len(),
                headers.len()
            )));
        }
        for (column, field) in raw.iter_mut().zip(record.iter()) {
            column.push(field.to_string());
        }
    }

    let columns = headers
        .into_iter()
        .zip(raw)
        .map(|(name, values)| Column::new(name, infer(&values)))
        .collect();
    Table::new(columns)
}

/// Pick the narrowest kind that every non-empty field parses as.
///
/// Tried in order: integer, float, bool, text. Empty fields are missing,
/// which turns an integer column into a float column.
fn infer(values: &[String]) -> ColumnData {
    let fields: Vec<Option<&str>> = values
        .iter()
        .map(|v| {
            let v = v.trim();
            (!v.is_empty()).then_some(v)
        })
        .collect();
    let has_missing = fields.iter().any(Option::is_none);

    let ints: Option<Vec<i64>> = fields
        .iter()
        .map(|f| f.map_or(Some(0), |s| s.parse().ok()))
        .collect();
    if let Some(ints) = ints {
        if !has_missing {
            return ColumnData::Int(ints);
        }
    }

    let floats: Option<Vec<f64>> = fields
        .iter()
        .map(|f| f.map_or(Some(f64::NAN), |s| s.parse().ok()))
        .collect();
    if let Some(floats) = floats {
        return ColumnData::Float(floats);
    }

    if !has_missing {
        let bools: Option<Vec<bool>> = fields
            .iter()
            .map(|f| match f.map(str::to_ascii_lowercase).as_deref() {
                Some("true") => Some(true),
                Some("false") => Some(false),
                _ => None,
            })
            .collect();
        if let Some(bools) = bools {
            return ColumnData::Bool(bools);
        }
    }

    ColumnData::Text(
        values
            .iter()
            .map(|v| (!v.is_empty()).then(|| v.clone()))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inference() {
        let input = "id,score,ok,name\n1,2.5,true,ann\n2,,False,\n3,4,true,cy\n";
        let table = read_csv_from(input.as_bytes()).unwrap();

        assert_eq!(table.column_names(), vec!["id", "score", "ok", "name"]);
        assert_eq!(
            table.require("id").unwrap().data,
            ColumnData::Int(vec![1, 2, 3])
        );
        match &table.require("score").unwrap().data {
            ColumnData::Float(v) => {
                assert_eq!(v[0], 2.5);
                assert!(v[1].is_nan());
                assert_eq!(v[2], 4.0);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            table.require("ok").unwrap().data,
            ColumnData::Bool(vec![true, false, true])
        );
        assert_eq!(
            table.require("name").unwrap().data,
            ColumnData::Text(vec![Some("ann".into()), None, Some("cy".into())])
        );
    }

    #[test]
    fn test_int_with_gap_is_float() {
        let table = read_csv_from("n,m\n1,a\n,b\n".as_bytes()).unwrap();
        assert_eq!(table.require("n").unwrap().data.kind(), super::super::ColumnKind::Float);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        assert!(read_csv_from("a,b\n1\n".as_bytes()).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = read_csv(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(err, Error::Csv(_)));
    }
}
