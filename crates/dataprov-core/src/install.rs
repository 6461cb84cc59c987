//! Re-install a committed dataset from its archive.
//!
//! The archive is extracted into a scratch workspace that the engine reads
//! raw data from, so installation never goes back to the network. The
//! workspace is removed whether or not installation succeeds.

use std::path::Path;

use tracing::{info, warn};

use crate::archive::ArchiveReader;
use crate::config::ProvenanceConfig;
use crate::engine::{EngineHandle, StorageBackend};
use crate::error::{ProvenanceError, ProvenanceResult};
use crate::script::ScriptLoaders;
use crate::workspace::ScratchWorkspace;

/// What an install did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub dataset: String,
    pub engine: String,
    /// Installed tables, in installation order.
    pub tables: Vec<String>,
    /// Fingerprint recorded in the archive.
    pub fingerprint: String,
}

/// Installs archives into storage backends.
pub struct Installer<'a> {
    config: &'a ProvenanceConfig,
    loaders: ScriptLoaders,
}

impl<'a> Installer<'a> {
    pub fn new(config: &'a ProvenanceConfig) -> Self {
        Self {
            config,
            loaders: ScriptLoaders::from_config(config),
        }
    }

    /// Replace the script loaders derived from the config.
    pub fn with_loaders(mut self, loaders: ScriptLoaders) -> Self {
        self.loaders = loaders;
        self
    }

    /// Install the dataset in `archive` into `engine`.
    ///
    /// Script and backend failures propagate after the workspace is removed.
    pub fn install<B: StorageBackend>(
        &self,
        archive: &Path,
        engine: &mut EngineHandle<B>,
    ) -> ProvenanceResult<InstallReport> {
        let scratch_parent = self.config.scratch_parent(archive);
        let workspace = ScratchWorkspace::create_in(&scratch_parent)?;
        let previous = engine
            .zipped_data_path
            .replace(workspace.path().to_path_buf());

        let result = self.run(archive, engine, workspace.path(), &scratch_parent);

        engine.zipped_data_path = previous;
        let closed = workspace.close();

        let report = match result {
            Ok(report) => report,
            Err(e) => {
                warn!(archive = %archive.display(), error = %e, "install failed");
                return Err(e);
            }
        };
        closed?;
        info!(
            dataset = %report.dataset,
            engine = %report.engine,
            tables = report.tables.len(),
            "installed committed dataset"
        );
        Ok(report)
    }

    fn run<B: StorageBackend>(
        &self,
        archive: &Path,
        engine: &mut EngineHandle<B>,
        workspace: &Path,
        scratch_parent: &Path,
    ) -> ProvenanceResult<InstallReport> {
        let mut reader = ArchiveReader::open(archive)?;
        reader.extract_all_into(workspace)?;
        let record = reader.record()?;
        let mut script = reader.read_script(&self.loaders, scratch_parent)?;

        engine.reset_registry();
        script.download(engine)?;
        engine
            .backend
            .final_cleanup()
            .map_err(|source| ProvenanceError::Engine {
                engine: engine.name().to_string(),
                source,
            })?;

        Ok(InstallReport {
            dataset: script.name().to_string(),
            engine: engine.name().to_string(),
            tables: engine
                .script_table_registry
                .tables()
                .iter()
                .map(|t| t.table.clone())
                .collect(),
            fingerprint: record.md5,
        })
    }
}

/// Install `archive` into `engine` with loaders from `config`.
pub fn install_committed<B: StorageBackend>(
    archive: impl AsRef<Path>,
    engine: &mut EngineHandle<B>,
    config: &ProvenanceConfig,
) -> ProvenanceResult<InstallReport> {
    Installer::new(config).install(archive.as_ref(), engine)
}
