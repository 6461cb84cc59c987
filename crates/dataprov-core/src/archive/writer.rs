//! Archive writer: commit a dataset's script, raw data and provenance record.
//!
//! Order within one commit: raw data is materialized, then fingerprinted,
//! then packaged. The archive is staged in a temporary file next to its
//! destination and moved into place, so readers never observe a partial
//! archive.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use zip::ZipWriter;

use crate::archive::reader::ArchiveReader;
use crate::archive::{archive_name, check_dataset_name, entry_options, paths, script_entry};
use crate::config::ProvenanceConfig;
use crate::dataset::DatasetHandle;
use crate::engine::{EngineHandle, StorageBackend};
use crate::environment::EnvironmentProvider;
use crate::error::{BoxError, ProvenanceError, ProvenanceResult};
use crate::hasher;
use crate::record::{ProvenanceRecord, RecordBuilder};
use crate::script::ScriptObject;

/// Materializes a dataset's raw data under its raw-data directory.
pub trait Downloader {
    fn download(&mut self, dataset: &DatasetHandle) -> Result<(), BoxError>;
}

impl<F> Downloader for F
where
    F: FnMut(&DatasetHandle) -> Result<(), BoxError>,
{
    fn download(&mut self, dataset: &DatasetHandle) -> Result<(), BoxError> {
        self(dataset)
    }
}

/// Downloads by running the dataset's table definitions against an engine.
///
/// Tables are fetched into a staging directory next to the dataset's raw
/// data. Only after every table downloaded and the backend cleaned up does
/// the staged tree replace the existing raw data, so a failed re-download
/// leaves the previous copy untouched.
pub struct ScriptDownloader<'e, B> {
    engine: &'e mut EngineHandle<B>,
}

impl<'e, B: StorageBackend> ScriptDownloader<'e, B> {
    pub fn new(engine: &'e mut EngineHandle<B>) -> Self {
        Self { engine }
    }

    fn download_into(&mut self, dataset: &DatasetHandle, root: PathBuf) -> Result<(), BoxError> {
        let live_root = std::mem::replace(&mut self.engine.raw_data_dir, root);
        let staged = self.engine.zipped_data_path.take();
        self.engine.reset_registry();
        let mut script = ScriptObject::declarative(dataset.definition());
        let result = script
            .download(&mut *self.engine)
            .map_err(BoxError::from)
            .and_then(|()| self.engine.backend.final_cleanup());
        self.engine.raw_data_dir = live_root;
        self.engine.zipped_data_path = staged;
        result
    }
}

impl<B: StorageBackend> Downloader for ScriptDownloader<'_, B> {
    fn download(&mut self, dataset: &DatasetHandle) -> Result<(), BoxError> {
        let live_root = self.engine.raw_data_dir.clone();
        std::fs::create_dir_all(&live_root)?;
        let staging = tempfile::Builder::new()
            .prefix(".dataprov-")
            .tempdir_in(&live_root)?;

        self.download_into(dataset, staging.path().to_path_buf())?;

        let fetched = staging.path().join(&dataset.name);
        let raw_dir = live_root.join(&dataset.name);
        let previous = staging.path().join(".previous");
        if raw_dir.exists() {
            std::fs::rename(&raw_dir, &previous)?;
        }
        if fetched.exists() {
            if let Err(e) = std::fs::rename(&fetched, &raw_dir) {
                if previous.exists() {
                    std::fs::rename(&previous, &raw_dir)?;
                }
                return Err(e.into());
            }
        }
        self.engine
            .script_table_registry
            .rebase(staging.path(), &live_root);
        debug!(dataset = %dataset.name, dir = %raw_dir.display(), "replaced raw data");
        staging.close()?;
        Ok(())
    }
}

/// Whether `commit` wrote a new archive or found an identical one in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStatus {
    Written,
    Skipped,
}

/// Result of a successful commit.
#[derive(Debug, Clone)]
pub struct CommitOutcome {
    pub path: PathBuf,
    pub record: ProvenanceRecord,
    pub status: CommitStatus,
    /// SHA-256 of the archive file at `path`.
    pub archive_sha256: String,
}

impl CommitOutcome {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> String {
        crate::dataset::file_name_of(&self.path)
    }
}

/// Commits datasets into provenance archives.
pub struct ArchiveWriter<'a> {
    config: &'a ProvenanceConfig,
    environment: &'a dyn EnvironmentProvider,
}

impl<'a> ArchiveWriter<'a> {
    pub fn new(config: &'a ProvenanceConfig, environment: &'a dyn EnvironmentProvider) -> Self {
        Self {
            config,
            environment,
        }
    }

    /// Package `dataset` into `destination`.
    ///
    /// Downloads only when raw data is missing or `force` is set. Fails with
    /// `DataUnavailable` when raw data is still missing afterwards; no file
    /// is written in that case.
    pub fn commit(
        &self,
        dataset: &DatasetHandle,
        destination: &Path,
        downloader: &mut dyn Downloader,
        force: bool,
    ) -> ProvenanceResult<CommitOutcome> {
        check_dataset_name(&dataset.name)?;
        let raw_root = self.config.dataset_raw_dir(&dataset.name);

        if force || !raw_root.is_dir() {
            info!(dataset = %dataset.name, force, "downloading dataset");
            downloader
                .download(dataset)
                .map_err(|source| ProvenanceError::Download {
                    dataset: dataset.name.clone(),
                    source,
                })?;
        }
        if !raw_root.is_dir() {
            warn!(
                dataset = %dataset.name,
                "dataset unavailable in downloaded datasets; download it or enable force download"
            );
            return Err(ProvenanceError::DataUnavailable {
                dataset: dataset.name.clone(),
            });
        }

        let record = RecordBuilder::new(self.environment).build(dataset, &raw_root)?;
        let name = archive_name(&dataset.name, &record.md5);
        let path = destination.join(&name);

        std::fs::create_dir_all(destination).map_err(|e| ProvenanceError::io(destination, e))?;

        let status = if self.matches_existing(&path, &record)? && !self.config.overwrite {
            info!(archive = %path.display(), "archive for this fingerprint exists, skipping");
            CommitStatus::Skipped
        } else {
            self.write(dataset, &raw_root, &record, destination, &path)?
        };

        let archive_sha256 = sha256_file(&path)?;
        if status == CommitStatus::Written {
            info!(
                dataset = %dataset.name,
                archive = %path.display(),
                md5 = %record.md5,
                sha256 = %archive_sha256,
                "committed dataset"
            );
        }
        Ok(CommitOutcome {
            path,
            record,
            status,
            archive_sha256,
        })
    }

    /// True when an archive at `path` already records this fingerprint.
    ///
    /// An archive under the same name with a different fingerprint is a
    /// prefix collision and is never replaced.
    fn matches_existing(&self, path: &Path, record: &ProvenanceRecord) -> ProvenanceResult<bool> {
        if !path.exists() {
            return Ok(false);
        }
        let existing = match ArchiveReader::open(path).and_then(|mut r| r.record()) {
            Ok(existing) => existing,
            Err(e) if e.is_corrupt_archive() && self.config.overwrite => {
                warn!(archive = %path.display(), error = %e, "replacing unreadable archive");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };
        if existing.md5 != record.md5 {
            return Err(ProvenanceError::PrefixCollision {
                path: path.to_path_buf(),
                existing: existing.md5,
                incoming: record.md5.clone(),
            });
        }
        Ok(true)
    }

    fn write(
        &self,
        dataset: &DatasetHandle,
        raw_root: &Path,
        record: &ProvenanceRecord,
        destination: &Path,
        path: &Path,
    ) -> ProvenanceResult<CommitStatus> {
        let mut staged = tempfile::Builder::new()
            .prefix(".dataprov-")
            .suffix(".zip.partial")
            .tempfile_in(destination)
            .map_err(|e| ProvenanceError::io(destination, e))?;
        let staged_path = staged.path().to_path_buf();

        {
            let mut zip = ZipWriter::new(staged.as_file_mut());
            let zip_err = |e| ProvenanceError::from_zip(&staged_path, e);

            zip.start_file(script_entry(&record.script_name), entry_options())
                .map_err(zip_err)?;
            copy_into(&dataset.script_path, &mut zip)?;

            // The record must describe exactly the bytes that land in the archive.
            let files = hasher::list_files(raw_root)?;
            let mut pairs = Vec::with_capacity(files.len());
            for (rel, abs) in files {
                let entry = format!("{}/{}", dataset.name, rel);
                debug!(entry = %entry, "adding raw file");
                zip.start_file(entry, entry_options()).map_err(zip_err)?;
                let digest = copy_into(&abs, &mut zip)?;
                pairs.push((rel, digest));
            }
            let packaged = hasher::combine(pairs);
            if packaged != record.md5 {
                warn!(
                    dataset = %dataset.name,
                    expected = %record.md5,
                    actual = %packaged,
                    "raw data changed while committing"
                );
                return Err(ProvenanceError::RawDataChanged {
                    dataset: dataset.name.clone(),
                    expected: record.md5.clone(),
                    actual: packaged,
                });
            }

            zip.start_file(paths::METADATA, entry_options())
                .map_err(zip_err)?;
            zip.write_all(&record.to_json_pretty()?)
                .map_err(|e| ProvenanceError::io(&staged_path, e))?;
            zip.finish().map_err(zip_err)?;
        }
        staged
            .as_file()
            .sync_all()
            .map_err(|e| ProvenanceError::io(&staged_path, e))?;

        if self.config.overwrite {
            staged
                .persist(path)
                .map_err(|e| ProvenanceError::io(path, e.error))?;
            return Ok(CommitStatus::Written);
        }
        match staged.persist_noclobber(path) {
            Ok(_) => Ok(CommitStatus::Written),
            // Another commit placed the same name first.
            Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                drop(e.file);
                self.matches_existing(path, record)?;
                Ok(CommitStatus::Skipped)
            }
            Err(e) => Err(ProvenanceError::io(path, e.error)),
        }
    }
}

/// Commit with the given config and environment; see [`ArchiveWriter::commit`].
pub fn commit(
    dataset: &DatasetHandle,
    destination: &Path,
    config: &ProvenanceConfig,
    environment: &dyn EnvironmentProvider,
    downloader: &mut dyn Downloader,
    force: bool,
) -> ProvenanceResult<CommitOutcome> {
    ArchiveWriter::new(config, environment).commit(dataset, destination, downloader, force)
}

/// Copy `source` into `sink`, returning the md5 of the bytes copied.
fn copy_into<W: Write>(source: &Path, sink: &mut W) -> ProvenanceResult<String> {
    let mut file = File::open(source).map_err(|e| ProvenanceError::io(source, e))?;
    let mut context = md5::Context::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|e| ProvenanceError::io(source, e))?;
        if n == 0 {
            break;
        }
        context.consume(&buf[..n]);
        sink.write_all(&buf[..n])
            .map_err(|e| ProvenanceError::io(source, e))?;
    }
    Ok(format!("{:x}", context.finalize()))
}

fn sha256_file(path: &Path) -> ProvenanceResult<String> {
    let mut file = File::open(path).map_err(|e| ProvenanceError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|e| ProvenanceError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
