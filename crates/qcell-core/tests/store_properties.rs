//! Property tests for partial reads and zone-map selection.

use proptest::prelude::*;
use tempfile::TempDir;

use qcell_core::storage::{NodeKey, Store, StoreConfig};
use qcell_core::table::{Column, ColumnData, CompareOp, Scalar, Table, ops};

fn arb_compare_op() -> impl Strategy<Value = CompareOp> {
    prop::sample::select(vec![
        CompareOp::Eq,
        CompareOp::Ne,
        CompareOp::Lt,
        CompareOp::Le,
        CompareOp::Gt,
        CompareOp::Ge,
    ])
}

fn table(ids: &[i64]) -> Table {
    Table::new(vec![
        Column::new("id", ColumnData::Int(ids.to_vec())),
        Column::new(
            "half",
            ColumnData::Float(ids.iter().map(|i| *i as f64 / 2.0).collect()),
        ),
    ])
    .unwrap()
}

fn stored(ids: &[i64], group: usize) -> (TempDir, Store, NodeKey, Table) {
    let temp = TempDir::new().unwrap();
    let store = Store::open(StoreConfig::new(temp.path()).with_row_group_size(group)).unwrap();
    let key = NodeKey::new("prop", "t").unwrap();
    let table = table(ids);
    store.write(&key, &table, &["id".to_string()]).unwrap();
    (temp, store, key, table)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn row_windows_equal_slices(
        ids in prop::collection::vec(-50i64..50, 0..40),
        group in 1usize..8,
        start in 0usize..45,
        len in 0usize..45,
    ) {
        let (_temp, store, key, table) = stored(&ids, group);
        let end = start + len;
        prop_assert_eq!(store.read_rows(&key, start..end).unwrap(), table.slice(start..end));
        prop_assert_eq!(store.read_column(&key, "half").unwrap(), table.column("half").unwrap().data.clone());
        prop_assert_eq!(store.row_count(&key).unwrap(), ids.len());
    }

    #[test]
    fn select_where_equals_full_scan(
        ids in prop::collection::vec(-50i64..50, 0..40),
        group in 1usize..8,
        op in arb_compare_op(),
        pivot in -60i64..60,
    ) {
        let (_temp, store, key, table) = stored(&ids, group);
        let value = Scalar::Int(pivot);
        prop_assert_eq!(
            store.select_where(&key, "id", op, &value).unwrap(),
            ops::filter_where(&table, "id", op, &value).unwrap()
        );
    }
}
