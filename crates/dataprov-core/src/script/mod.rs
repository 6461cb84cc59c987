//! Reconstructed acquisition scripts.
//!
//! A script is either declarative (a definition file) or executable (code
//! that publishes its definition when loaded). Both install the same way:
//! each table's raw file is taken from the engine's data directory, fetched
//! through the backend only when no archived copy is staged, and loaded
//! into the backend.

mod loader;

pub use loader::{InterpreterLoader, ModuleLoader, ScriptLoaders, DESCRIBE_FLAG};

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::dataset::{ScriptDefinition, TableDefinition};
use crate::engine::{EngineHandle, RegisteredTable, StorageBackend, TableInstall};
use crate::error::{ProvenanceError, ProvenanceResult};

/// Script loaded from a definition file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclarativeScript {
    pub definition: ScriptDefinition,
    installed_into: Option<String>,
}

/// Script loaded by running code that published its definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutableScript {
    pub definition: ScriptDefinition,
    /// File name of the code the definition came from.
    pub source_name: String,
    installed_into: Option<String>,
}

/// Acquisition script in either representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptObject {
    Declarative(DeclarativeScript),
    Executable(ExecutableScript),
}

impl ScriptObject {
    pub fn declarative(definition: ScriptDefinition) -> Self {
        Self::Declarative(DeclarativeScript {
            definition,
            installed_into: None,
        })
    }

    pub fn executable(definition: ScriptDefinition, source_name: impl Into<String>) -> Self {
        Self::Executable(ExecutableScript {
            definition,
            source_name: source_name.into(),
            installed_into: None,
        })
    }

    pub fn definition(&self) -> &ScriptDefinition {
        match self {
            Self::Declarative(s) => &s.definition,
            Self::Executable(s) => &s.definition,
        }
    }

    pub fn name(&self) -> &str {
        &self.definition().name
    }

    pub fn tables(&self) -> &BTreeMap<String, TableDefinition> {
        &self.definition().tables
    }

    pub fn is_executable(&self) -> bool {
        matches!(self, Self::Executable(_))
    }

    /// Backend the last `download` ran against.
    pub fn installed_into(&self) -> Option<&str> {
        match self {
            Self::Declarative(s) => s.installed_into.as_deref(),
            Self::Executable(s) => s.installed_into.as_deref(),
        }
    }

    fn set_installed_into(&mut self, engine: String) {
        match self {
            Self::Declarative(s) => s.installed_into = Some(engine),
            Self::Executable(s) => s.installed_into = Some(engine),
        }
    }

    /// Install every table into `engine`, in table-name order.
    pub fn download<B: StorageBackend>(
        &mut self,
        engine: &mut EngineHandle<B>,
    ) -> ProvenanceResult<()> {
        let definition = self.definition();
        let dataset = definition.name.as_str();
        let data_dir = engine.data_dir(dataset);
        let staged = engine.zipped_data_path.is_some();
        info!(
            dataset,
            engine = engine.name(),
            staged,
            tables = definition.tables.len(),
            "installing dataset"
        );

        for (table, table_def) in &definition.tables {
            let source = data_dir.join(table_def.raw_file_name());
            if !source.is_file() {
                if staged {
                    return Err(ProvenanceError::MissingRawFile {
                        table: table.clone(),
                        path: source,
                    });
                }
                std::fs::create_dir_all(&data_dir)
                    .map_err(|e| ProvenanceError::io(&data_dir, e))?;
                debug!(dataset, table = %table, url = %table_def.url, "fetching raw file");
                engine
                    .backend
                    .fetch(&table_def.url, &source)
                    .map_err(|source| engine_error(engine, source))?;
            }

            engine
                .backend
                .install_table(TableInstall {
                    dataset,
                    table,
                    definition: table_def,
                    source: &source,
                })
                .map_err(|source| engine_error(engine, source))?;
            engine.script_table_registry.register(RegisteredTable {
                dataset: dataset.to_string(),
                table: table.clone(),
                source,
            });
        }

        let name = engine.name().to_string();
        self.set_installed_into(name);
        Ok(())
    }
}

fn engine_error<B: StorageBackend>(
    engine: &EngineHandle<B>,
    source: crate::error::BoxError,
) -> ProvenanceError {
    ProvenanceError::Engine {
        engine: engine.name().to_string(),
        source,
    }
}
