//! Durable columnar table storage.
//!
//! Tables are addressed by a `(file, node)` pair and stored one node per
//! file under the store root:
//!
//! ```text
//! <root>/
//! └── <file>/
//!     ├── <node>.qcol   # header, manifest, column chunks
//!     └── <node>.lock   # held while the node is replaced
//! ```
//!
//! Columns are split into row groups, so row windows, single columns and
//! selections on data columns read only the chunks they need.

mod format;
mod handle;
mod store;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use format::{DataColumn, ZoneStats};
pub use handle::ResultHandle;
pub use store::{NodeKey, Store};

/// Environment variable overriding the default store root.
pub const STORE_DIR_ENV: &str = "QCELL_STORE_DIR";

/// Default number of rows per row group.
pub const DEFAULT_ROW_GROUP_SIZE: usize = 1024;

/// Where and how tables are stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root directory of the store.
    pub root: PathBuf,

    /// Rows per row group for new writes.
    pub row_group_size: usize,
}

impl StoreConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            row_group_size: DEFAULT_ROW_GROUP_SIZE,
        }
    }

    pub fn with_row_group_size(mut self, rows: usize) -> Self {
        self.row_group_size = rows.max(1);
        self
    }
}

impl Default for StoreConfig {
    /// `$QCELL_STORE_DIR`, else the user cache directory, else `./.qcell/store`.
    fn default() -> Self {
        let root = std::env::var_os(STORE_DIR_ENV)
            .map(PathBuf::from)
            .or_else(|| dirs::cache_dir().map(|dir| dir.join("qcell").join("store")))
            .unwrap_or_else(|| PathBuf::from(".qcell").join("store"));
        Self::new(root)
    }
}
