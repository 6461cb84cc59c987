//! Configuration for provenance operations.
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `DATAPROV_HOME` | Tool home directory (default: `~/.dataprov`) |
//! | `DATAPROV_RAW_DATA_DIR` | Raw-data root (default: `$DATAPROV_HOME/raw_data`) |
//! | `DATAPROV_SCRATCH_DIR` | Where scratch workspaces are created (default: next to the archive) |
//! | `DATAPROV_OVERWRITE` | Rewrite an existing archive with the same fingerprint |

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ProvenanceError, ProvenanceResult};

/// Number of fingerprint hex characters used in archive names.
pub const FINGERPRINT_PREFIX_LEN: usize = 7;

/// Provenance configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvenanceConfig {
    /// Tool home directory.
    pub home_dir: PathBuf,

    /// Root under which each dataset keeps its raw data in `<name>/`.
    pub raw_data_dir: PathBuf,

    /// Parent directory for scratch workspaces. `None` places them next to the archive.
    pub scratch_dir: Option<PathBuf>,

    /// Rewrite an archive whose name and fingerprint already exist.
    pub overwrite: bool,

    /// Script extension -> interpreter for executable scripts.
    pub interpreters: BTreeMap<String, String>,
}

fn default_home_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".dataprov")
}

fn default_interpreters() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("py".to_string(), "python3".to_string()),
        ("sh".to_string(), "sh".to_string()),
    ])
}

impl Default for ProvenanceConfig {
    fn default() -> Self {
        Self::with_home(default_home_dir())
    }
}

impl ProvenanceConfig {
    /// Config rooted at `home`, raw data in `home/raw_data`.
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        let home_dir = home.into();
        Self {
            raw_data_dir: home_dir.join("raw_data"),
            home_dir,
            scratch_dir: None,
            overwrite: false,
            interpreters: default_interpreters(),
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let mut config = match std::env::var_os("DATAPROV_HOME") {
            Some(home) => Self::with_home(PathBuf::from(home)),
            None => Self::default(),
        };
        if let Some(raw) = std::env::var_os("DATAPROV_RAW_DATA_DIR") {
            config.raw_data_dir = PathBuf::from(raw);
        }
        config.scratch_dir = std::env::var_os("DATAPROV_SCRATCH_DIR").map(PathBuf::from);
        config.overwrite = std::env::var("DATAPROV_OVERWRITE")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        config
    }

    /// Load config from a YAML file. Missing keys take their defaults.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> ProvenanceResult<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ProvenanceError::io(path, e))?;
        serde_yaml::from_str(&content).map_err(|e| ProvenanceError::Config {
            message: format!("{}: {}", path.display(), e),
        })
    }

    /// Raw-data directory of one dataset.
    pub fn dataset_raw_dir(&self, dataset: &str) -> PathBuf {
        self.raw_data_dir.join(dataset)
    }

    pub fn with_raw_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.raw_data_dir = dir.into();
        self
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Register an interpreter for an executable script extension.
    pub fn with_interpreter(
        mut self,
        extension: impl Into<String>,
        interpreter: impl Into<String>,
    ) -> Self {
        self.interpreters
            .insert(extension.into(), interpreter.into());
        self
    }

    /// Scratch parent for work on `archive`.
    pub(crate) fn scratch_parent(&self, archive: &Path) -> PathBuf {
        match &self.scratch_dir {
            Some(dir) => dir.clone(),
            None => archive
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }
}
