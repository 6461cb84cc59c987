//! Provenance archives for acquired datasets.
//!
//! A commit records how a dataset was obtained: the acquisition script, the
//! raw data it produced and a provenance record (time, dataset version,
//! environment packages, content fingerprint), packed into one archive
//! named after the dataset and its fingerprint. Installing that archive
//! later replays the script against a storage backend using the archived
//! raw data.
//!
//! # Quick Start
//!
//! ```no_run
//! use dataprov_core::{
//!     commit, install_committed, CommandEnvironment, DatasetHandle, EngineHandle,
//!     ProvenanceConfig, ScriptDownloader, StorageBackend,
//! };
//!
//! # fn example<B: StorageBackend>(backend: B, other: B) -> Result<(), dataprov_core::ProvenanceError> {
//! let config = ProvenanceConfig::from_env();
//! let dataset = DatasetHandle::from_script("scripts/airports.json")?;
//!
//! let mut engine = EngineHandle::new(backend, &config.raw_data_dir);
//! let outcome = commit(
//!     &dataset,
//!     "archives".as_ref(),
//!     &config,
//!     &CommandEnvironment::pip_freeze(),
//!     &mut ScriptDownloader::new(&mut engine),
//!     false,
//! )?;
//! println!("committed {}", outcome.path.display());
//!
//! let mut target = EngineHandle::new(other, &config.raw_data_dir);
//! install_committed(&outcome.path, &mut target, &config)?;
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod config;
pub mod dataset;
pub mod engine;
pub mod environment;
pub mod error;
pub mod hasher;
pub mod install;
pub mod record;
pub mod script;
pub mod workspace;

// Re-export main types
pub use archive::{
    archive_name, check_dataset_name, commit, extract_all, read_script, ArchiveReader,
    ArchiveWriter, CommitOutcome, CommitStatus, Downloader, ScriptDownloader, VerifyReport,
};
pub use config::{ProvenanceConfig, FINGERPRINT_PREFIX_LEN};
pub use dataset::{DatasetHandle, ScriptDefinition, TableDefinition};
pub use engine::{EngineHandle, RegisteredTable, StorageBackend, TableInstall, TableRegistry};
pub use environment::{
    CommandEnvironment, EnvironmentProvider, PackageManifest, StaticEnvironment, TOOL_PACKAGE,
};
pub use error::{BoxError, ProvenanceError, ProvenanceResult};
pub use hasher::{hash_directory, hash_file};
pub use install::{install_committed, InstallReport, Installer};
pub use record::{ProvenanceRecord, RecordBuilder};
pub use script::{InterpreterLoader, ModuleLoader, ScriptLoaders, ScriptObject};
pub use workspace::ScratchWorkspace;
