//! Error types for provenance archiving and restoration.

use std::path::{Path, PathBuf};

/// Boxed error returned by injected collaborators (downloaders, storage backends).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for provenance operations.
pub type ProvenanceResult<T> = Result<T, ProvenanceError>;

/// Errors that can occur while committing, restoring or installing archives.
#[derive(Debug, thiserror::Error)]
pub enum ProvenanceError {
    /// Raw-data directory missing while building a provenance record.
    #[error("no raw data for dataset '{dataset}' at {}", path.display())]
    NoData { dataset: String, path: PathBuf },

    /// Raw data absent and not downloadable under the current flags.
    /// Reported to the user; nothing is written.
    #[error(
        "dataset '{dataset}' unavailable in downloaded datasets; \
         download it or enable force download to commit it"
    )]
    DataUnavailable { dataset: String },

    /// Path to hash does not exist.
    #[error("not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// Archive is not a readable container or lacks a valid metadata entry.
    #[error("corrupt archive {}: {reason}", path.display())]
    CorruptArchive { path: PathBuf, reason: String },

    /// Script file extension has no registered representation.
    #[error("unsupported script format: {file_name}")]
    UnsupportedScriptFormat { file_name: String },

    /// An existing archive shares the name but records a different fingerprint.
    #[error(
        "archive {} already exists for fingerprint {existing}; refusing to replace it with {incoming}",
        path.display()
    )]
    PrefixCollision {
        path: PathBuf,
        existing: String,
        incoming: String,
    },

    /// Path or name that cannot be represented faithfully as an archive entry,
    /// or that would land outside its root.
    #[error("invalid archive entry path: {entry}")]
    InvalidEntryPath { entry: String },

    /// Raw data changed between fingerprinting and packaging.
    #[error(
        "raw data for dataset '{dataset}' changed during commit \
         (recorded {expected}, packaged {actual})"
    )]
    RawDataChanged {
        dataset: String,
        expected: String,
        actual: String,
    },

    /// Table source file not present in the raw data handed to the script.
    #[error("raw file for table '{table}' not found at {}", path.display())]
    MissingRawFile { table: String, path: PathBuf },

    /// Executable script could not publish its definition.
    #[error("failed to load script {}: {reason}", path.display())]
    ScriptLoad { path: PathBuf, reason: String },

    /// Declarative script could not be parsed.
    #[error("invalid script definition {}: {reason}", path.display())]
    InvalidScript { path: PathBuf, reason: String },

    /// Injected downloader failed. Propagated unmodified.
    #[error("download failed for dataset '{dataset}'")]
    Download {
        dataset: String,
        #[source]
        source: BoxError,
    },

    /// Storage backend failed during installation.
    #[error("engine '{engine}' failed")]
    Engine {
        engine: String,
        #[source]
        source: BoxError,
    },

    /// Environment snapshot provider failed.
    #[error("environment snapshot failed: {message}")]
    Environment { message: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Filesystem or archive I/O failure.
    #[error("I/O error at {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ProvenanceError {
    /// Wrap an I/O error with the path it occurred on.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn corrupt(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Self::CorruptArchive {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Map a container-level error from the zip reader.
    ///
    /// Structural problems become `CorruptArchive`; plain I/O stays `Io`.
    pub fn from_zip(path: impl AsRef<Path>, err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(source) => Self::io(path, source),
            other => Self::corrupt(path, other.to_string()),
        }
    }

    /// Returns true when raw data is absent and the commit was aborted cleanly.
    pub fn is_data_unavailable(&self) -> bool {
        matches!(self, Self::DataUnavailable { .. } | Self::NoData { .. })
    }

    /// Returns true if this is a missing path signal from the hasher.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_corrupt_archive(&self) -> bool {
        matches!(self, Self::CorruptArchive { .. })
    }

    /// Suggested exit code for CLI callers.
    pub fn exit_code(&self) -> i32 {
        match self {
            // Nothing to commit: reported, not a crash
            Self::NoData { .. } | Self::DataUnavailable { .. } => 0,
            Self::NotFound { .. } | Self::MissingRawFile { .. } => 2,
            Self::CorruptArchive { .. }
            | Self::InvalidEntryPath { .. }
            | Self::PrefixCollision { .. } => 3,
            Self::UnsupportedScriptFormat { .. }
            | Self::ScriptLoad { .. }
            | Self::InvalidScript { .. } => 4,
            Self::Download { .. } | Self::Engine { .. } => 5,
            Self::Environment { .. } | Self::Config { .. } => 6,
            Self::Io { .. } | Self::RawDataChanged { .. } => 1,
        }
    }
}
