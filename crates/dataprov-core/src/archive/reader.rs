//! Archive reader: provenance record, script reconstruction, extraction.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use zip::ZipArchive;

use crate::archive::{paths, script_entry};
use crate::config::ProvenanceConfig;
use crate::error::{ProvenanceError, ProvenanceResult};
use crate::hasher;
use crate::record::ProvenanceRecord;
use crate::script::{ScriptLoaders, ScriptObject};
use crate::workspace::ScratchWorkspace;

/// Result of recomputing an archive's fingerprint from its raw-data entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    /// Dataset directory the raw-data entries live under.
    pub dataset: Option<String>,
    /// Fingerprint recorded in `metadata.json`.
    pub expected: String,
    /// Fingerprint of the raw-data entries as stored.
    pub actual: String,
    pub files: usize,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.expected == self.actual
    }
}

/// Read-only view of a provenance archive.
pub struct ArchiveReader {
    path: PathBuf,
    archive: ZipArchive<File>,
}

impl std::fmt::Debug for ArchiveReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveReader")
            .field("path", &self.path)
            .field("entries", &self.archive.len())
            .finish()
    }
}

impl ArchiveReader {
    /// Open an archive. Fails with `CorruptArchive` if it is not a readable zip.
    pub fn open(path: impl AsRef<Path>) -> ProvenanceResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| ProvenanceError::io(&path, e))?;
        let archive = ZipArchive::new(file).map_err(|e| ProvenanceError::from_zip(&path, e))?;
        Ok(Self { path, archive })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Entry names in archive order.
    pub fn entries(&self) -> Vec<String> {
        self.archive.file_names().map(str::to_string).collect()
    }

    /// Parse `metadata.json`.
    pub fn record(&mut self) -> ProvenanceResult<ProvenanceRecord> {
        let data = match self.read_entry(paths::METADATA) {
            Ok(data) => data,
            Err(ProvenanceError::CorruptArchive { .. }) => {
                return Err(ProvenanceError::corrupt(
                    &self.path,
                    format!("missing {}", paths::METADATA),
                ))
            }
            Err(e) => return Err(e),
        };
        ProvenanceRecord::from_json(&data).map_err(|e| {
            ProvenanceError::corrupt(&self.path, format!("unparsable {}: {}", paths::METADATA, e))
        })
    }

    fn read_entry(&mut self, name: &str) -> ProvenanceResult<Vec<u8>> {
        let mut entry = self
            .archive
            .by_name(name)
            .map_err(|e| ProvenanceError::from_zip(&self.path, e))?;
        let mut data = Vec::new();
        entry
            .read_to_end(&mut data)
            .map_err(|e| ProvenanceError::io(&self.path, e))?;
        Ok(data)
    }

    /// Reconstruct the acquisition script.
    ///
    /// Only the script entry is extracted, into a fresh scratch workspace
    /// under `scratch_parent` that is removed before returning on every path.
    pub fn read_script(
        &mut self,
        loaders: &ScriptLoaders,
        scratch_parent: &Path,
    ) -> ProvenanceResult<ScriptObject> {
        let record = self.record()?;
        let workspace = ScratchWorkspace::create_in(scratch_parent)?;

        let loaded = self
            .extract_script_into(&record, workspace.path())
            .and_then(|script| loaders.load(&script, workspace.path()));
        let closed = workspace.close();

        let script = loaded?;
        closed?;
        debug!(archive = %self.path.display(), script = %record.script_name, "restored script");
        Ok(script)
    }

    /// Write `script/<script_name>` below `dir` and return its path.
    fn extract_script_into(
        &mut self,
        record: &ProvenanceRecord,
        dir: &Path,
    ) -> ProvenanceResult<PathBuf> {
        let name = record.script_name.as_str();
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(ProvenanceError::corrupt(
                &self.path,
                format!("invalid script name '{}'", name),
            ));
        }
        let entry = script_entry(name);
        let data = self.read_entry(&entry).map_err(|e| match e {
            ProvenanceError::CorruptArchive { .. } => {
                ProvenanceError::corrupt(&self.path, format!("missing {}", entry))
            }
            other => other,
        })?;

        let script_dir = dir.join(paths::SCRIPT_DIR);
        std::fs::create_dir_all(&script_dir).map_err(|e| ProvenanceError::io(&script_dir, e))?;
        let target = script_dir.join(name);
        std::fs::write(&target, data).map_err(|e| ProvenanceError::io(&target, e))?;
        Ok(target)
    }

    /// Extract every entry below `dir`. Returns the number of files written.
    ///
    /// Entries that would land outside `dir` are rejected.
    pub fn extract_all_into(&mut self, dir: &Path) -> ProvenanceResult<usize> {
        let mut files = 0;
        for index in 0..self.archive.len() {
            let mut entry = self
                .archive
                .by_index(index)
                .map_err(|e| ProvenanceError::from_zip(&self.path, e))?;
            let rel = entry
                .enclosed_name()
                .ok_or_else(|| ProvenanceError::InvalidEntryPath {
                    entry: entry.name().to_string(),
                })?;
            let target = dir.join(rel);
            if entry.is_dir() {
                std::fs::create_dir_all(&target).map_err(|e| ProvenanceError::io(&target, e))?;
                continue;
            }
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent).map_err(|e| ProvenanceError::io(parent, e))?;
            }
            let mut out = File::create(&target).map_err(|e| ProvenanceError::io(&target, e))?;
            std::io::copy(&mut entry, &mut out).map_err(|e| ProvenanceError::io(&target, e))?;
            files += 1;
        }
        debug!(archive = %self.path.display(), files, dir = %dir.display(), "extracted archive");
        Ok(files)
    }

    /// Extract every entry into a new scratch workspace under `scratch_parent`.
    /// The caller owns the workspace and its cleanup.
    pub fn extract_all(&mut self, scratch_parent: &Path) -> ProvenanceResult<ScratchWorkspace> {
        let workspace = ScratchWorkspace::create_in(scratch_parent)?;
        self.extract_all_into(workspace.path())?;
        Ok(workspace)
    }

    /// Recompute the raw-data fingerprint from the stored entries.
    pub fn verify(&mut self) -> ProvenanceResult<VerifyReport> {
        let record = self.record()?;
        let mut dataset: Option<String> = None;
        let mut pairs = Vec::new();

        for index in 0..self.archive.len() {
            let mut entry = self
                .archive
                .by_index(index)
                .map_err(|e| ProvenanceError::from_zip(&self.path, e))?;
            let name = entry.name().to_string();
            if entry.is_dir() || name == paths::METADATA || name.starts_with(paths::SCRIPT_DIR) {
                continue;
            }
            let Some((dir, rel)) = name.split_once('/') else {
                return Err(ProvenanceError::corrupt(
                    &self.path,
                    format!("raw-data entry '{}' outside a dataset directory", name),
                ));
            };
            match &dataset {
                Some(existing) if existing != dir => {
                    return Err(ProvenanceError::corrupt(
                        &self.path,
                        format!("raw data for more than one dataset ('{}', '{}')", existing, dir),
                    ))
                }
                Some(_) => {}
                None => dataset = Some(dir.to_string()),
            }
            let mut data = Vec::new();
            entry
                .read_to_end(&mut data)
                .map_err(|e| ProvenanceError::io(&self.path, e))?;
            pairs.push((rel.to_string(), hasher::hash_bytes(&data)));
        }

        let report = VerifyReport {
            dataset,
            expected: record.md5,
            files: pairs.len(),
            actual: hasher::combine(pairs),
        };
        info!(
            archive = %self.path.display(),
            ok = report.is_ok(),
            files = report.files,
            "verified archive"
        );
        Ok(report)
    }
}

/// Reconstruct the script stored in `archive`.
pub fn read_script(
    archive: impl AsRef<Path>,
    config: &ProvenanceConfig,
) -> ProvenanceResult<ScriptObject> {
    let archive = archive.as_ref();
    ArchiveReader::open(archive)?
        .read_script(&ScriptLoaders::from_config(config), &config.scratch_parent(archive))
}

/// Extract all of `archive` into a new scratch workspace owned by the caller.
pub fn extract_all(
    archive: impl AsRef<Path>,
    config: &ProvenanceConfig,
) -> ProvenanceResult<ScratchWorkspace> {
    let archive = archive.as_ref();
    ArchiveReader::open(archive)?.extract_all(&config.scratch_parent(archive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::entry_options;
    use std::io::Write;
    use zip::ZipWriter;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let mut zip = ZipWriter::new(File::create(path).unwrap());
        for (name, data) in entries {
            zip.start_file(*name, entry_options()).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }

    fn metadata(md5: &str, script: &str) -> Vec<u8> {
        format!(
            r#"{{"md5": "{md5}", "packages": {{}}, "script_name": "{script}", "time": "01/02/2024, 03:04:05", "version": "1.0"}}"#
        )
        .into_bytes()
    }

    #[test]
    fn non_zip_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x-1234567.zip");
        std::fs::write(&path, "definitely not a zip\n".repeat(32)).unwrap();
        let err = ArchiveReader::open(&path).unwrap_err();
        assert!(err.is_corrupt_archive());
    }

    #[test]
    fn unparsable_metadata_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x-1234567.zip");
        write_zip(&path, &[(paths::METADATA, b"{not json")]);
        let err = ArchiveReader::open(&path).unwrap().record().unwrap_err();
        match err {
            ProvenanceError::CorruptArchive { reason, .. } => assert!(reason.contains("unparsable")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_script_entry_is_corrupt_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x-1234567.zip");
        write_zip(&path, &[(paths::METADATA, &metadata("abc", "x.json"))]);
        let scratch = dir.path().join("scratch");

        let err = ArchiveReader::open(&path)
            .unwrap()
            .read_script(&ScriptLoaders::declarative_only(), &scratch)
            .unwrap_err();
        assert!(err.is_corrupt_archive());
        assert_eq!(std::fs::read_dir(&scratch).unwrap().count(), 0);
    }

    #[test]
    fn script_name_with_separator_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x-1234567.zip");
        write_zip(
            &path,
            &[
                ("script/../evil.json", b"{}"),
                (paths::METADATA, &metadata("abc", "../evil.json")),
            ],
        );
        let err = ArchiveReader::open(&path)
            .unwrap()
            .read_script(&ScriptLoaders::declarative_only(), dir.path())
            .unwrap_err();
        assert!(err.is_corrupt_archive());
    }

    #[test]
    fn extraction_rejects_escaping_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x-1234567.zip");
        write_zip(&path, &[("../outside.csv", b"x")]);
        let out = dir.path().join("out");
        std::fs::create_dir_all(&out).unwrap();

        let err = ArchiveReader::open(&path)
            .unwrap()
            .extract_all_into(&out)
            .unwrap_err();
        assert!(matches!(err, ProvenanceError::InvalidEntryPath { .. }));
        assert!(!dir.path().join("outside.csv").exists());
    }

    #[test]
    fn verify_detects_tampered_data() {
        let dir = tempfile::tempdir().unwrap();
        let expected = hasher::combine(vec![("a.csv".into(), hasher::hash_bytes(b"1"))]);

        let good = dir.path().join("good.zip");
        write_zip(
            &good,
            &[
                ("script/d.json", b"{}"),
                ("d/a.csv", b"1"),
                (paths::METADATA, &metadata(&expected, "d.json")),
            ],
        );
        let report = ArchiveReader::open(&good).unwrap().verify().unwrap();
        assert!(report.is_ok());
        assert_eq!(report.dataset.as_deref(), Some("d"));
        assert_eq!(report.files, 1);

        let bad = dir.path().join("bad.zip");
        write_zip(
            &bad,
            &[
                ("script/d.json", b"{}"),
                ("d/a.csv", b"2"),
                (paths::METADATA, &metadata(&expected, "d.json")),
            ],
        );
        assert!(!ArchiveReader::open(&bad).unwrap().verify().unwrap().is_ok());
    }

    #[test]
    fn verify_rejects_mixed_datasets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mixed.zip");
        write_zip(
            &path,
            &[
                ("a/x.csv", b"1"),
                ("b/y.csv", b"2"),
                (paths::METADATA, &metadata("abc", "a.json")),
            ],
        );
        let err = ArchiveReader::open(&path).unwrap().verify().unwrap_err();
        assert!(err.is_corrupt_archive());
    }
}
