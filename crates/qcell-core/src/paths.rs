//! Working directory layout.
//!
//! Keeps the CLI and tests on the same paths when they run without an
//! explicit store root.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Directory structure for qcell state next to a working directory.
///
/// ```text
/// workdir/
/// .qcell/
/// └── store/   # Persisted tables, one directory per file key
/// ```
#[derive(Debug, Clone)]
pub struct QcellDirs {
    /// The `.qcell` directory itself.
    pub qcell_dir: PathBuf,

    /// Root of the columnar store.
    pub store_dir: PathBuf,
}

impl QcellDirs {
    /// Create the directory structure under `workdir`.
    ///
    /// # Errors
    /// Returns an error if directory creation fails.
    pub fn from_workdir(workdir: &Path) -> Result<Self> {
        let qcell_dir = workdir.join(".qcell");
        let store_dir = qcell_dir.join("store");

        fs::create_dir_all(&store_dir)?;

        Ok(Self {
            qcell_dir,
            store_dir,
        })
    }

    /// Remove every persisted table.
    pub fn clean(&self) -> Result<()> {
        if self.qcell_dir.exists() {
            fs::remove_dir_all(&self.qcell_dir)?;
        }
        fs::create_dir_all(&self.store_dir)?;
        Ok(())
    }
}
