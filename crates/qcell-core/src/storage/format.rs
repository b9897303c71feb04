//! On-disk node format.
//!
//! ```text
//! +--------------------+-------------------+-----------------+------------------+
//! | magic (8 bytes)    | manifest len (u64) | manifest (rkyv) | column chunks... |
//! +--------------------+-------------------+-----------------+------------------+
//! ```
//!
//! Chunk offsets in the manifest are relative to the first byte after the
//! manifest. Every chunk is one row group of one column, rkyv-encoded as
//! `ColumnData`.

use std::io::{Read, Seek, SeekFrom, Write};

use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::table::elementwise::scalar_ordering;
use crate::table::{ColumnData, ColumnKind, CompareOp, Scalar};

pub(crate) const MAGIC: [u8; 8] = *b"QCOL\x01\0\0\0";

/// Upper bound on a manifest, to fail fast on corrupt headers.
const MAX_MANIFEST_LEN: u64 = 64 * 1024 * 1024;

/// Per-row-group statistics kept for data columns.
#[derive(
    Debug, Clone, PartialEq, Archive, RkyvSerialize, RkyvDeserialize, Serialize, Deserialize,
)]
pub struct ZoneStats {
    /// Smallest non-missing value, if any.
    pub min: Option<Scalar>,
    /// Largest non-missing value, if any.
    pub max: Option<Scalar>,
    /// Number of missing values.
    pub nulls: u64,
}

impl ZoneStats {
    pub(crate) fn compute(data: &ColumnData) -> Self {
        let mut min: Option<Scalar> = None;
        let mut max: Option<Scalar> = None;
        for row in 0..data.len() {
            let Some(value) = data.get(row) else {
                continue;
            };
            let below = min
                .as_ref()
                .is_none_or(|m| scalar_ordering(&value, m) == Some(std::cmp::Ordering::Less));
            let above = max
                .as_ref()
                .is_none_or(|m| scalar_ordering(&value, m) == Some(std::cmp::Ordering::Greater));
            if below {
                min = Some(value.clone());
            }
            if above {
                max = Some(value);
            }
        }
        Self {
            min,
            max,
            nulls: data.null_count() as u64,
        }
    }

    /// Whether any row in the group can satisfy `value_in_row op value`.
    pub fn may_match(&self, op: CompareOp, value: &Scalar) -> bool {
        use std::cmp::Ordering::*;
        let (Some(min), Some(max)) = (&self.min, &self.max) else {
            return false;
        };
        match (scalar_ordering(min, value), scalar_ordering(max, value)) {
            (Some(lo), Some(hi)) => match op {
                CompareOp::Eq => lo != Greater && hi != Less,
                CompareOp::Ne => !(lo == Equal && hi == Equal),
                CompareOp::Lt => lo == Less,
                CompareOp::Le => lo != Greater,
                CompareOp::Gt => hi == Greater,
                CompareOp::Ge => hi != Less,
            },
            // Incomparable kinds only ever satisfy `!=`.
            _ => op == CompareOp::Ne,
        }
    }
}

/// Location of one row group of one column.
#[derive(Debug, Clone, Archive, RkyvSerialize, RkyvDeserialize)]
pub(crate) struct ChunkMeta {
    pub offset: u64,
    pub len: u64,
    pub rows: u64,
    pub stats: Option<ZoneStats>,
}

#[derive(Debug, Clone, Archive, RkyvSerialize, RkyvDeserialize)]
pub(crate) struct ColumnMeta {
    pub name: String,
    pub kind: ColumnKind,
    pub data_column: bool,
    pub chunks: Vec<ChunkMeta>,
}

#[derive(Debug, Clone, Archive, RkyvSerialize, RkyvDeserialize)]
pub(crate) struct Manifest {
    pub rows: u64,
    pub row_group_size: u64,
    pub columns: Vec<ColumnMeta>,
}

impl Manifest {
    pub fn column(&self, name: &str) -> Option<&ColumnMeta> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Metadata of a column indexed for selective reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataColumn {
    pub name: String,
    pub kind: ColumnKind,
    /// One entry per row group, in row order.
    pub row_groups: Vec<ZoneStats>,
}

impl From<&ColumnMeta> for DataColumn {
    fn from(meta: &ColumnMeta) -> Self {
        Self {
            name: meta.name.clone(),
            kind: meta.kind,
            row_groups: meta
                .chunks
                .iter()
                .map(|c| {
                    c.stats.clone().unwrap_or(ZoneStats {
                        min: None,
                        max: None,
                        nulls: 0,
                    })
                })
                .collect(),
        }
    }
}

pub(crate) fn encode<T>(value: &T) -> Result<Vec<u8>>
where
    T: for<'a> RkyvSerialize<
            rkyv::rancor::Strategy<
                rkyv::ser::Serializer<
                    rkyv::util::AlignedVec,
                    rkyv::ser::allocator::ArenaHandle<'a>,
                    rkyv::ser::sharing::Share,
                >,
                rkyv::rancor::Error,
            >,
        >,
{
    rkyv::to_bytes::<rkyv::rancor::Error>(value)
        .map(|v| v.into_vec())
        .map_err(|e| Error::Serialization(e.to_string()))
}

/// Decode an rkyv value read from a node file.
///
/// # Safety
///
/// Uses unchecked deserialization. Node files are only ever written by
/// [`write_node`], under the store's own root.
pub(crate) fn decode<T>(bytes: &[u8]) -> Result<T>
where
    T: Archive,
    T::Archived: RkyvDeserialize<T, rkyv::rancor::Strategy<rkyv::de::Pool, rkyv::rancor::Error>>,
{
    let mut aligned = rkyv::util::AlignedVec::<16>::with_capacity(bytes.len());
    aligned.extend_from_slice(bytes);
    // SAFETY: the bytes come from our own node files and sit in an aligned buffer.
    unsafe { rkyv::from_bytes_unchecked::<T, rkyv::rancor::Error>(&aligned) }
        .map_err(|e: rkyv::rancor::Error| Error::Deserialization(e.to_string()))
}

/// Split every column into row groups and write header, manifest and chunks.
pub(crate) fn write_node<W: Write>(
    writer: &mut W,
    columns: &[(String, &ColumnData, bool)],
    rows: usize,
    row_group_size: usize,
) -> Result<()> {
    let group = row_group_size.max(1);
    let mut metas = Vec::with_capacity(columns.len());
    let mut chunks: Vec<Vec<u8>> = Vec::new();
    let mut offset: u64 = 0;

    for (name, data, data_column) in columns {
        let mut column_chunks = Vec::new();
        let mut start = 0;
        while start < rows {
            let end = (start + group).min(rows);
            let part = data.slice(start..end);
            let bytes = encode(&part)?;
            column_chunks.push(ChunkMeta {
                offset,
                len: bytes.len() as u64,
                rows: (end - start) as u64,
                stats: data_column.then(|| ZoneStats::compute(&part)),
            });
            offset += bytes.len() as u64;
            chunks.push(bytes);
            start = end;
        }
        metas.push(ColumnMeta {
            name: name.clone(),
            kind: data.kind(),
            data_column: *data_column,
            chunks: column_chunks,
        });
    }

    let manifest = Manifest {
        rows: rows as u64,
        row_group_size: group as u64,
        columns: metas,
    };
    let manifest_bytes = encode(&manifest)?;

    writer.write_all(&MAGIC)?;
    writer.write_all(&(manifest_bytes.len() as u64).to_le_bytes())?;
    writer.write_all(&manifest_bytes)?;
    for chunk in &chunks {
        writer.write_all(chunk)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read the manifest and return it with the offset where chunks begin.
pub(crate) fn read_manifest<R: Read>(reader: &mut R) -> Result<(Manifest, u64)> {
    let mut magic = [0u8; 8];
    reader
        .read_exact(&mut magic)
        .map_err(|e| Error::Storage(format!("failed to read node header: {e}")))?;
    if magic != MAGIC {
        return Err(Error::Storage("not a qcell node file".to_string()));
    }

    let mut len_bytes = [0u8; 8];
    reader
        .read_exact(&mut len_bytes)
        .map_err(|e| Error::Storage(format!("failed to read manifest length: {e}")))?;
    let len = u64::from_le_bytes(len_bytes);
    if len > MAX_MANIFEST_LEN {
        return Err(Error::Storage(format!("manifest too large: {len} bytes")));
    }

    let mut bytes = vec![0u8; len as usize];
    reader
        .read_exact(&mut bytes)
        .map_err(|e| Error::Storage(format!("failed to read manifest: {e}")))?;
    let manifest = decode::<Manifest>(&bytes)?;
    Ok((manifest, MAGIC.len() as u64 + 8 + len))
}

/// Read and decode one chunk.
pub(crate) fn read_chunk<R: Read + Seek>(
    reader: &mut R,
    data_start: u64,
    chunk: &ChunkMeta,
) -> Result<ColumnData> {
    reader.seek(SeekFrom::Start(data_start + chunk.offset))?;
    let mut bytes = vec![0u8; chunk.len as usize];
    reader
        .read_exact(&mut bytes)
        .map_err(|e| Error::Storage(format!("truncated column chunk: {e}")))?;
    decode::<ColumnData>(&bytes)
}
