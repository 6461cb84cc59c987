//! Dataset handles and acquisition script definitions.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ProvenanceError, ProvenanceResult};

/// One table an acquisition script produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinition {
    /// Where the raw file is fetched from.
    pub url: String,

    /// Raw file name under the dataset directory. Defaults to the last URL segment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<String>,
}

impl TableDefinition {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            file_name: None,
            delimiter: None,
            columns: Vec::new(),
        }
    }

    /// Raw file name this table reads from.
    pub fn raw_file_name(&self) -> String {
        if let Some(name) = &self.file_name {
            return name.clone();
        }
        let without_query = self
            .url
            .split(['?', '#'])
            .next()
            .unwrap_or(self.url.as_str());
        without_query
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("data")
            .to_string()
    }
}

/// Published definition of an acquisition script.
///
/// Declarative scripts are this structure serialized to JSON or YAML;
/// executable scripts print it when asked to describe themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptDefinition {
    pub name: String,

    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,

    #[serde(default)]
    pub tables: BTreeMap<String, TableDefinition>,
}

impl ScriptDefinition {
    /// Parse a declarative script file; the encoding follows the extension.
    pub fn from_path(path: impl AsRef<Path>) -> ProvenanceResult<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ProvenanceError::io(path, e))?;
        let invalid = |reason: String| ProvenanceError::InvalidScript {
            path: path.to_path_buf(),
            reason,
        };
        match extension(path).as_deref() {
            Some("json") => serde_json::from_str(&content).map_err(|e| invalid(e.to_string())),
            Some("yaml" | "yml") => {
                serde_yaml::from_str(&content).map_err(|e| invalid(e.to_string()))
            }
            _ => Err(ProvenanceError::UnsupportedScriptFormat {
                file_name: file_name_of(path),
            }),
        }
    }
}

/// Identifies one acquisition unit: what is committed and under which name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetHandle {
    /// Stable dataset identifier; names the raw-data directory and the archive.
    pub name: String,
    pub version: String,
    /// Acquisition script on disk.
    pub script_path: PathBuf,
    pub tables: BTreeMap<String, TableDefinition>,
}

impl DatasetHandle {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        script_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            script_path: script_path.into(),
            tables: BTreeMap::new(),
        }
    }

    /// Handle for a declarative script file.
    pub fn from_script(path: impl AsRef<Path>) -> ProvenanceResult<Self> {
        let path = path.as_ref();
        let definition = ScriptDefinition::from_path(path)?;
        Ok(Self {
            name: definition.name,
            version: definition.version,
            script_path: path.to_path_buf(),
            tables: definition.tables,
        })
    }

    pub fn with_table(mut self, name: impl Into<String>, table: TableDefinition) -> Self {
        self.tables.insert(name.into(), table);
        self
    }

    /// File name the script is stored under inside an archive.
    pub fn script_file_name(&self) -> String {
        file_name_of(&self.script_path)
    }

    /// Definition equivalent to this handle, for driving a download.
    pub fn definition(&self) -> ScriptDefinition {
        ScriptDefinition {
            name: self.name.clone(),
            version: self.version.clone(),
            title: None,
            description: None,
            keywords: Vec::new(),
            tables: self.tables.clone(),
        }
    }
}

pub(crate) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Lowercased extension without the dot.
pub(crate) fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}
