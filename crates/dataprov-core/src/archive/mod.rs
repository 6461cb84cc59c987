//! Provenance archive container.
//!
//! Layout (zip):
//!
//! ```text
//! script/<script_name>      acquisition script, exactly one
//! <dataset>/<relative path> raw-data files, paths relative to the raw-data root
//! metadata.json             provenance record
//! ```
//!
//! Archives are named `<dataset>-<md5[:7]>.zip` and never modified after
//! they are written.

pub mod reader;
pub mod writer;

pub use reader::{extract_all, read_script, ArchiveReader, VerifyReport};
pub use writer::{
    commit, ArchiveWriter, CommitOutcome, CommitStatus, Downloader, ScriptDownloader,
};

use zip::write::SimpleFileOptions;
use zip::CompressionMethod;

use crate::config::FINGERPRINT_PREFIX_LEN;
use crate::error::{ProvenanceError, ProvenanceResult};

/// Canonical entry names inside an archive.
pub mod paths {
    /// Serialized provenance record at the archive root.
    pub const METADATA: &str = "metadata.json";
    /// Directory holding the acquisition script.
    pub const SCRIPT_DIR: &str = "script/";
}

/// Archive file name for a dataset state: a pure function of name and fingerprint.
pub fn archive_name(dataset: &str, fingerprint: &str) -> String {
    let prefix: String = fingerprint.chars().take(FINGERPRINT_PREFIX_LEN).collect();
    format!("{}-{}.zip", dataset, prefix)
}

/// Check that `dataset` can name both an archive file and the top-level
/// raw-data directory inside it.
///
/// Separators and dot names would leave the destination directory; the
/// reserved entry names would shadow the script or the record.
pub fn check_dataset_name(dataset: &str) -> ProvenanceResult<()> {
    let reserved = [paths::SCRIPT_DIR.trim_end_matches('/'), paths::METADATA];
    if dataset.is_empty()
        || dataset == "."
        || dataset == ".."
        || dataset.contains(['/', '\\', '\0'])
        || reserved.contains(&dataset)
    {
        return Err(ProvenanceError::InvalidEntryPath {
            entry: dataset.to_string(),
        });
    }
    Ok(())
}

/// Entry name of the script inside an archive.
pub fn script_entry(script_name: &str) -> String {
    format!("{}{}", paths::SCRIPT_DIR, script_name)
}

/// Fixed timestamp and mode so entry headers do not depend on the host.
fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default())
        .unix_permissions(0o644)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_uses_seven_char_prefix() {
        assert_eq!(
            archive_name("sample-dataset", "3960d3c5bd2bb1d1e4e2e4f4dd8a6c12"),
            "sample-dataset-3960d3c.zip"
        );
        assert_eq!(archive_name("tiny", "ab"), "tiny-ab.zip");
    }

    #[test]
    fn dataset_names_that_escape_or_shadow_are_rejected() {
        for name in ["", ".", "..", "../evil", "a/b", "a\\b", "script", "metadata.json"] {
            let err = check_dataset_name(name).unwrap_err();
            assert!(
                matches!(err, ProvenanceError::InvalidEntryPath { .. }),
                "{name:?}: {err}"
            );
        }
        for name in ["sample-dataset", "bird_size", "scripts", "v1.2"] {
            check_dataset_name(name).unwrap();
        }
    }

    #[test]
    fn script_entry_under_script_dir() {
        assert_eq!(script_entry("sample_dataset.json"), "script/sample_dataset.json");
    }
}
