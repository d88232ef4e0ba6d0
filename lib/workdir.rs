//! Scoped work directory owned by one pipeline run.

use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::error::ForgeResult;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Temporary directory holding the source checkout, publish outputs and the
/// staged bundle. Removed when dropped, on success and failure alike.
#[derive(Debug)]
pub struct WorkDir {
    dir: TempDir,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl WorkDir {
    /// Create a fresh work directory under the system temp dir.
    pub fn new() -> ForgeResult<Self> {
        let dir = tempfile::Builder::new().prefix("ext-forge-").tempdir()?;
        tracing::debug!("Created work directory {}", dir.path().display());
        Ok(Self { dir })
    }

    /// Root of the work directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Location of a cloned source tree.
    pub fn source_dir(&self) -> PathBuf {
        self.path().join("source")
    }

    /// Root of per-platform publish outputs.
    pub fn publish_dir(&self) -> PathBuf {
        self.path().join("publish")
    }

    /// Bundle staging directory.
    pub fn bundle_dir(&self) -> PathBuf {
        self.path().join("bundle")
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removed_on_drop() {
        let work = WorkDir::new().unwrap();
        let root = work.path().to_path_buf();
        std::fs::create_dir_all(work.bundle_dir()).unwrap();
        std::fs::write(work.bundle_dir().join("manifest.json"), "{}").unwrap();
        assert!(root.exists());

        drop(work);
        assert!(!root.exists());
    }

    #[test]
    fn test_layout_is_inside_root() {
        let work = WorkDir::new().unwrap();
        assert!(work.source_dir().starts_with(work.path()));
        assert!(work.publish_dir().starts_with(work.path()));
        assert!(work.bundle_dir().starts_with(work.path()));
    }
}
