//! The store: node addressing, atomic writes and partial reads.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter};
use std::ops::Range;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::table::{Column, ColumnData, CompareOp, Scalar, Table};

use super::StoreConfig;
use super::format::{self, ColumnMeta, DataColumn, Manifest};

const NODE_EXT: &str = "qcol";
const LOCK_EXT: &str = "lock";

/// The `(file, node)` address of a stored table.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    Archive,
    RkyvSerialize,
    RkyvDeserialize,
    Serialize,
    Deserialize,
)]
#[serde(try_from = "RawNodeKey")]
pub struct NodeKey {
    file: String,
    node: String,
}

/// Unchecked wire form; decoding goes through [`NodeKey::new`].
#[derive(Deserialize)]
struct RawNodeKey {
    file: String,
    node: String,
}

impl TryFrom<RawNodeKey> for NodeKey {
    type Error = Error;

    fn try_from(raw: RawNodeKey) -> Result<Self> {
        NodeKey::new(raw.file, raw.node)
    }
}

impl NodeKey {
    /// Validate and build a key.
    ///
    /// Both parts must be non-empty and use only `[A-Za-z0-9_.-]`. A leading
    /// `/` on the node is dropped.
    pub fn new(file: impl Into<String>, node: impl Into<String>) -> Result<Self> {
        let file = file.into();
        let node = node.into();
        let node = node.strip_prefix('/').map(str::to_string).unwrap_or(node);
        validate_part(&file)?;
        validate_part(&node)?;
        Ok(Self { file, node })
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn node(&self) -> &str {
        &self.node
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.file, self.node)
    }
}

fn validate_part(part: &str) -> Result<()> {
    if part.is_empty() {
        return Err(Error::InvalidKey("empty key component".to_string()));
    }
    if part.contains("..") {
        return Err(Error::InvalidKey(format!("`{part}` contains `..`")));
    }
    if let Some(c) = part
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')))
    {
        return Err(Error::InvalidKey(format!(
            "`{part}` contains invalid character {c:?}"
        )));
    }
    Ok(())
}

/// A columnar table store rooted at a directory.
///
/// Cheap to clone; all state lives on disk.
#[derive(Debug, Clone)]
pub struct Store {
    config: StoreConfig,
}

impl Store {
    /// Open a store, creating its root directory if needed.
    pub fn open(config: StoreConfig) -> Result<Self> {
        fs::create_dir_all(&config.root)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    pub fn node_path(&self, key: &NodeKey) -> PathBuf {
        self.config
            .root
            .join(&key.file)
            .join(format!("{}.{NODE_EXT}", key.node))
    }

    fn lock_path(&self, key: &NodeKey) -> PathBuf {
        self.config
            .root
            .join(&key.file)
            .join(format!("{}.{LOCK_EXT}", key.node))
    }

    pub fn exists(&self, key: &NodeKey) -> bool {
        self.node_path(key).is_file()
    }

    /// Write `table` under `key`, replacing any previous node.
    ///
    /// The node is written to a temporary file, synced, and renamed into
    /// place under an exclusive lock, so readers see either the old or the
    /// new table. Columns named in `data_columns` get zone statistics.
    pub fn write(&self, key: &NodeKey, table: &Table, data_columns: &[String]) -> Result<()> {
        for name in data_columns {
            table.require(name)?;
        }

        let dir = self.config.root.join(&key.file);
        fs::create_dir_all(&dir)?;

        let tmp = dir.join(format!(".{}.{}.tmp", key.node, uuid::Uuid::new_v4()));
        let result = self.write_tmp(&tmp, table, data_columns).and_then(|()| {
            let lock = OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(self.lock_path(key))?;
            lock.lock_exclusive()?;
            let renamed = fs::rename(&tmp, self.node_path(key));
            let _ = fs2::FileExt::unlock(&lock);
            renamed?;
            sync_dir(&dir);
            Ok(())
        });

        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        } else {
            debug!(
                "Stored {} rows x {} columns at {}",
                table.row_count(),
                table.columns().len(),
                key
            );
        }
        result
    }

    fn write_tmp(&self, path: &Path, table: &Table, data_columns: &[String]) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        let columns: Vec<(String, &ColumnData, bool)> = table
            .columns()
            .iter()
            .map(|c| (c.name.clone(), &c.data, data_columns.contains(&c.name)))
            .collect();
        format::write_node(
            &mut writer,
            &columns,
            table.row_count(),
            self.config.row_group_size,
        )?;
        let file = writer
            .into_inner()
            .map_err(|e| Error::Io(e.into_error()))?;
        file.sync_all()?;
        Ok(())
    }

    fn open_node(&self, key: &NodeKey) -> Result<(BufReader<File>, Manifest, u64)> {
        let file = File::open(self.node_path(key)).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::StorageNotFound {
                    file: key.file.clone(),
                    node: key.node.clone(),
                }
            } else {
                Error::Io(e)
            }
        })?;
        let mut reader = BufReader::new(file);
        let (manifest, data_start) = format::read_manifest(&mut reader)?;
        Ok((reader, manifest, data_start))
    }

    /// Column names in stored order.
    pub fn columns(&self, key: &NodeKey) -> Result<Vec<String>> {
        let (_, manifest, _) = self.open_node(key)?;
        Ok(manifest.columns.iter().map(|c| c.name.clone()).collect())
    }

    pub fn row_count(&self, key: &NodeKey) -> Result<usize> {
        let (_, manifest, _) = self.open_node(key)?;
        Ok(manifest.rows as usize)
    }

    /// Metadata of the columns marked as data columns at write time.
    pub fn data_columns(&self, key: &NodeKey) -> Result<Vec<DataColumn>> {
        let (_, manifest, _) = self.open_node(key)?;
        Ok(manifest
            .columns
            .iter()
            .filter(|c| c.data_column)
            .map(DataColumn::from)
            .collect())
    }

    pub fn read_table(&self, key: &NodeKey) -> Result<Table> {
        self.read_rows(key, 0..usize::MAX)
    }

    /// Rows in `range`, clamped to the table. Only overlapping row groups
    /// are decoded.
    pub fn read_rows(&self, key: &NodeKey, range: Range<usize>) -> Result<Table> {
        let (mut reader, manifest, data_start) = self.open_node(key)?;
        let end = range.end.min(manifest.rows as usize);
        let start = range.start.min(end);

        let columns = manifest
            .columns
            .iter()
            .map(|meta| {
                let mut data = ColumnData::empty(meta.kind);
                let mut group_start = 0usize;
                for chunk in &meta.chunks {
                    let group_end = group_start + chunk.rows as usize;
                    if group_end > start && group_start < end {
                        let part = format::read_chunk(&mut reader, data_start, chunk)?;
                        let lo = start.saturating_sub(group_start);
                        let hi = end.min(group_end) - group_start;
                        data.extend(part.slice(lo..hi))?;
                    }
                    group_start = group_end;
                }
                Ok(Column::new(meta.name.clone(), data))
            })
            .collect::<Result<Vec<_>>>()?;
        Table::new(columns)
    }

    pub fn read_column(&self, key: &NodeKey, name: &str) -> Result<ColumnData> {
        let (mut reader, manifest, data_start) = self.open_node(key)?;
        let meta = require_meta(&manifest, name)?;
        let mut data = ColumnData::empty(meta.kind);
        for chunk in &meta.chunks {
            data.extend(format::read_chunk(&mut reader, data_start, chunk)?)?;
        }
        Ok(data)
    }

    /// Rows where `column op value` holds, skipping row groups whose zone
    /// statistics rule out a match. `column` must be a data column.
    pub fn select_where(
        &self,
        key: &NodeKey,
        column: &str,
        op: CompareOp,
        value: &Scalar,
    ) -> Result<Table> {
        let (mut reader, manifest, data_start) = self.open_node(key)?;
        let meta = require_meta(&manifest, column)?;
        if !meta.data_column {
            return Err(Error::Storage(format!(
                "`{column}` is not a data column of {key}"
            )));
        }

        let mut out: Vec<ColumnData> = manifest
            .columns
            .iter()
            .map(|c| ColumnData::empty(c.kind))
            .collect();
        let mut scanned = 0usize;

        for (group, chunk) in meta.chunks.iter().enumerate() {
            if let Some(stats) = &chunk.stats {
                if !stats.may_match(op, value) {
                    continue;
                }
            }
            scanned += 1;

            let probe = format::read_chunk(&mut reader, data_start, chunk)?;
            let keep: Vec<usize> = (0..probe.len())
                .filter(|&row| probe.get(row).is_some_and(|v| op.test(&v, value)))
                .collect();
            if keep.is_empty() {
                continue;
            }

            for (other, data) in manifest.columns.iter().zip(out.iter_mut()) {
                let part = other.chunks.get(group).ok_or_else(|| {
                    Error::Storage(format!("column `{}` is missing row group {group}", other.name))
                })?;
                let part = format::read_chunk(&mut reader, data_start, part)?;
                data.extend(part.take(&keep))?;
            }
        }

        debug!(
            "Selected on {}.{}: scanned {}/{} row groups",
            key,
            column,
            scanned,
            meta.chunks.len()
        );
        let columns = manifest
            .columns
            .iter()
            .zip(out)
            .map(|(other, data)| Column::new(other.name.clone(), data))
            .collect();
        Table::new(columns)
    }

    /// Delete a node. Returns whether it existed.
    pub fn remove(&self, key: &NodeKey) -> Result<bool> {
        let path = self.node_path(key);
        let existed = match fs::remove_file(&path) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };
        let _ = fs::remove_file(self.lock_path(key));
        Ok(existed)
    }

    /// Node names stored under `file`, sorted.
    pub fn nodes(&self, file: &str) -> Result<Vec<String>> {
        validate_part(file)?;
        let dir = self.config.root.join(file);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut nodes = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == NODE_EXT) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    nodes.push(stem.to_string());
                }
            }
        }
        nodes.sort();
        Ok(nodes)
    }
}

fn require_meta<'m>(manifest: &'m Manifest, name: &str) -> Result<&'m ColumnMeta> {
    manifest
        .column(name)
        .ok_or_else(|| Error::Table(format!("no column named `{name}`")))
}

#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Ok(handle) = File::open(dir) {
        let _ = handle.sync_all();
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::ops;
    use tempfile::TempDir;

    fn store(temp: &TempDir, group: usize) -> Store {
        Store::open(StoreConfig::new(temp.path().join("store")).with_row_group_size(group))
            .unwrap()
    }

    fn numbers(rows: i64) -> Table {
        Table::new(vec![
            Column::new("n", ColumnData::Int((0..rows).collect())),
            Column::new(
                "half",
                ColumnData::Float((0..rows).map(|i| i as f64 / 2.0).collect()),
            ),
            Column::new(
                "label",
                ColumnData::Text((0..rows).map(|i| Some(format!("r{i}"))).collect()),
            ),
        ])
        .unwrap()
    }

    #[test]
    fn test_key_validation() {
        assert!(NodeKey::new("42", "c42").is_ok());
        assert_eq!(NodeKey::new("f", "/node").unwrap().node(), "node");
        assert!(matches!(NodeKey::new("", "n"), Err(Error::InvalidKey(_))));
        assert!(matches!(NodeKey::new("a/b", "n"), Err(Error::InvalidKey(_))));
        assert!(matches!(NodeKey::new("f", ".."), Err(Error::InvalidKey(_))));
        assert!(matches!(NodeKey::new("f", "a b"), Err(Error::InvalidKey(_))));
    }

    #[test]
    fn test_decoded_keys_are_validated() {
        let key: NodeKey = serde_json::from_str(r#"{"file":"f","node":"/n"}"#).unwrap();
        assert_eq!(key, NodeKey::new("f", "n").unwrap());
        assert_eq!(
            serde_json::from_value::<NodeKey>(serde_json::to_value(&key).unwrap()).unwrap(),
            key
        );

        for bad in [
            r#"{"file":"..","node":"n"}"#,
            r#"{"file":"f","node":"../../etc/passwd"}"#,
            r#"{"file":"","node":"n"}"#,
        ] {
            let err = serde_json::from_str::<NodeKey>(bad).unwrap_err();
            assert!(err.to_string().contains("invalid"), "{bad}: {err}");
        }
    }

    #[test]
    fn test_write_and_read_back() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp, 4);
        let key = NodeKey::new("f", "t").unwrap();
        let table = numbers(10);

        store.write(&key, &table, &[]).unwrap();
        assert!(store.exists(&key));
        assert_eq!(store.read_table(&key).unwrap(), table);
        assert_eq!(store.row_count(&key).unwrap(), 10);
        assert_eq!(store.columns(&key).unwrap(), vec!["n", "half", "label"]);
    }

    #[test]
    fn test_partial_reads_match_slices() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp, 3);
        let key = NodeKey::new("f", "t").unwrap();
        let table = numbers(11);
        store.write(&key, &table, &[]).unwrap();

        for (start, end) in [(0, 0), (0, 3), (2, 7), (5, 11), (9, 40), (20, 30)] {
            assert_eq!(
                store.read_rows(&key, start..end).unwrap(),
                table.slice(start..end),
                "rows {start}..{end}"
            );
        }
        assert_eq!(
            store.read_column(&key, "label").unwrap(),
            table.require("label").unwrap().data
        );
    }

    #[test]
    fn test_missing_node() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp, 4);
        let key = NodeKey::new("nope", "c1").unwrap();
        assert!(matches!(
            store.read_table(&key),
            Err(Error::StorageNotFound { .. })
        ));
    }

    #[test]
    fn test_select_where_matches_full_scan() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp, 4);
        let key = NodeKey::new("f", "t").unwrap();
        let table = numbers(20);
        store.write(&key, &table, &["n".into()]).unwrap();

        for (op, value) in [
            (CompareOp::Lt, Scalar::Int(5)),
            (CompareOp::Ge, Scalar::Int(17)),
            (CompareOp::Eq, Scalar::Float(9.0)),
            (CompareOp::Ne, Scalar::Int(3)),
            (CompareOp::Gt, Scalar::Int(100)),
        ] {
            assert_eq!(
                store.select_where(&key, "n", op, &value).unwrap(),
                ops::filter_where(&table, "n", op, &value).unwrap(),
                "n {op} {value}"
            );
        }

        assert!(matches!(
            store.select_where(&key, "half", CompareOp::Lt, &Scalar::Int(1)),
            Err(Error::Storage(_))
        ));
    }

    #[test]
    fn test_data_column_metadata() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp, 8);
        let key = NodeKey::new("f", "t").unwrap();
        store.write(&key, &numbers(10), &["n".into()]).unwrap();

        let meta = store.data_columns(&key).unwrap();
        assert_eq!(meta.len(), 1);
        assert_eq!(meta[0].name, "n");
        assert_eq!(meta[0].row_groups.len(), 2);
        assert_eq!(meta[0].row_groups[1].min, Some(Scalar::Int(8)));

        assert!(store
            .write(&key, &numbers(3), &["missing".into()])
            .is_err());
    }

    #[test]
    fn test_overwrite_and_remove() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp, 4);
        let key = NodeKey::new("f", "t").unwrap();
        store.write(&key, &numbers(5), &[]).unwrap();
        store.write(&key, &numbers(2), &[]).unwrap();
        assert_eq!(store.row_count(&key).unwrap(), 2);
        assert_eq!(store.nodes("f").unwrap(), vec!["t"]);

        assert!(store.remove(&key).unwrap());
        assert!(!store.remove(&key).unwrap());
        assert!(store.nodes("f").unwrap().is_empty());
    }

    #[test]
    fn test_empty_table() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp, 4);
        let key = NodeKey::new("f", "empty").unwrap();
        let table = Table::single("x", ColumnData::Float(Vec::new()));
        store.write(&key, &table, &["x".into()]).unwrap();
        assert_eq!(store.read_table(&key).unwrap(), table);
        assert_eq!(store.row_count(&key).unwrap(), 0);
    }

    #[test]
    fn test_concurrent_writes_to_one_key() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp, 4);
        let key = NodeKey::new("f", "shared").unwrap();

        std::thread::scope(|scope| {
            for rows in 1..=8 {
                let store = store.clone();
                let key = key.clone();
                scope.spawn(move || store.write(&key, &numbers(rows), &[]).unwrap());
            }
        });

        let rows = store.row_count(&key).unwrap();
        assert!((1..=8).contains(&rows));
        assert_eq!(store.read_table(&key).unwrap(), numbers(rows as i64));
        assert_eq!(store.nodes("f").unwrap(), vec!["shared"]);
    }
}
