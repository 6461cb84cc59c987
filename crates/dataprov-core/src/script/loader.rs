//! Script reconstruction, dispatched on the script file extension.

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

use tracing::debug;

use crate::config::ProvenanceConfig;
use crate::dataset::{extension, file_name_of, ScriptDefinition};
use crate::error::{ProvenanceError, ProvenanceResult};
use crate::script::ScriptObject;

/// Argument an executable script receives when asked for its definition.
pub const DESCRIBE_FLAG: &str = "--describe";

const DECLARATIVE_EXTENSIONS: &[&str] = &["json", "yaml", "yml"];

/// Loads an executable script and returns the definition it publishes.
pub trait ModuleLoader {
    /// `script` has been extracted into `workspace`; anything the loader
    /// writes must stay inside it.
    fn load(&self, script: &Path, workspace: &Path) -> ProvenanceResult<ScriptDefinition>;
}

/// Runs `<interpreter> <script> --describe` and parses stdout as JSON.
#[derive(Debug, Clone)]
pub struct InterpreterLoader {
    interpreter: String,
}

impl InterpreterLoader {
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }
}

impl ModuleLoader for InterpreterLoader {
    fn load(&self, script: &Path, workspace: &Path) -> ProvenanceResult<ScriptDefinition> {
        let failed = |reason: String| ProvenanceError::ScriptLoad {
            path: script.to_path_buf(),
            reason,
        };
        let output = Command::new(&self.interpreter)
            .arg(script)
            .arg(DESCRIBE_FLAG)
            .current_dir(workspace)
            .output()
            .map_err(|e| failed(format!("cannot run {}: {}", self.interpreter, e)))?;
        if !output.status.success() {
            return Err(failed(format!(
                "{} exited with {}: {}",
                self.interpreter,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        serde_json::from_slice(&output.stdout)
            .map_err(|e| failed(format!("published definition is not valid JSON: {}", e)))
    }
}

/// Extension -> loader table for executable scripts.
pub struct ScriptLoaders {
    executables: BTreeMap<String, Box<dyn ModuleLoader>>,
}

impl std::fmt::Debug for ScriptLoaders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptLoaders")
            .field("executables", &self.executables.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ScriptLoaders {
    /// No executable loaders; only declarative scripts resolve.
    pub fn declarative_only() -> Self {
        Self {
            executables: BTreeMap::new(),
        }
    }

    /// Interpreter loaders for every extension in `config.interpreters`.
    pub fn from_config(config: &ProvenanceConfig) -> Self {
        config
            .interpreters
            .iter()
            .fold(Self::declarative_only(), |loaders, (ext, interpreter)| {
                loaders.with_loader(ext.clone(), InterpreterLoader::new(interpreter.clone()))
            })
    }

    /// Register or replace the loader for `extension`.
    pub fn with_loader(
        mut self,
        extension: impl Into<String>,
        loader: impl ModuleLoader + 'static,
    ) -> Self {
        self.executables
            .insert(extension.into().to_ascii_lowercase(), Box::new(loader));
        self
    }

    /// Reconstruct the script at `path`.
    pub fn load(&self, path: &Path, workspace: &Path) -> ProvenanceResult<ScriptObject> {
        let file_name = file_name_of(path);
        let ext = extension(path).unwrap_or_default();

        if DECLARATIVE_EXTENSIONS.contains(&ext.as_str()) {
            debug!(script = %file_name, "loading declarative script");
            return ScriptDefinition::from_path(path).map(ScriptObject::declarative);
        }
        match self.executables.get(&ext) {
            Some(loader) => {
                debug!(script = %file_name, "loading executable script");
                let definition = loader.load(path, workspace)?;
                Ok(ScriptObject::executable(definition, file_name))
            }
            None => Err(ProvenanceError::UnsupportedScriptFormat { file_name }),
        }
    }
}

impl Default for ScriptLoaders {
    fn default() -> Self {
        Self::from_config(&ProvenanceConfig::default())
    }
}
