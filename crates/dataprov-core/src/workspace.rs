//! Process-unique scratch directories for extraction.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::{ProvenanceError, ProvenanceResult};

const SCRATCH_PREFIX: &str = ".dataprov-";

/// Scratch directory removed when dropped or closed.
///
/// Every restore or install gets its own, so concurrent calls never share
/// an extraction path.
#[derive(Debug)]
pub struct ScratchWorkspace {
    dir: TempDir,
}

impl ScratchWorkspace {
    /// Create a fresh workspace inside `parent`.
    pub fn create_in(parent: impl AsRef<Path>) -> ProvenanceResult<Self> {
        let parent = parent.as_ref();
        std::fs::create_dir_all(parent).map_err(|e| ProvenanceError::io(parent, e))?;
        // Absolute so paths inside stay valid for child processes with another cwd.
        let parent = std::fs::canonicalize(parent).map_err(|e| ProvenanceError::io(parent, e))?;
        let dir = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir_in(&parent)
            .map_err(|e| ProvenanceError::io(&parent, e))?;
        debug!(path = %dir.path().display(), "created scratch workspace");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the workspace, reporting removal failures.
    pub fn close(self) -> ProvenanceResult<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close().map_err(|e| {
            warn!(path = %path.display(), error = %e, "failed to remove scratch workspace");
            ProvenanceError::io(&path, e)
        })?;
        debug!(path = %path.display(), "removed scratch workspace");
        Ok(())
    }

    /// Keep the directory on disk and hand its path to the caller.
    pub fn keep(self) -> PathBuf {
        self.dir.keep()
    }
}

/// True for names this module gives scratch directories.
pub fn is_scratch_name(name: &str) -> bool {
    name.starts_with(SCRATCH_PREFIX)
}
