//! Provenance record (`metadata.json` at the archive root).

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dataset::DatasetHandle;
use crate::environment::{self, EnvironmentProvider, PackageManifest};
use crate::error::{ProvenanceError, ProvenanceResult};
use crate::hasher;

/// Timestamp layout of the `time` field (UTC, second precision).
pub const TIME_FORMAT: &str = "%m/%d/%Y, %H:%M:%S";

/// How a dataset was obtained, captured at commit time.
///
/// Field order is alphabetical so the serialized keys are sorted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    /// Full hex fingerprint of the raw-data directory.
    pub md5: String,

    /// Environment package manifest.
    pub packages: PackageManifest,

    /// File name of the acquisition script, stored under `script/`.
    pub script_name: String,

    /// Commit time, `MM/DD/YYYY, HH:MM:SS` UTC.
    pub time: String,

    /// Dataset version.
    pub version: String,
}

impl ProvenanceRecord {
    /// Serialize with sorted keys and four-space indentation.
    pub fn to_json_pretty(&self) -> ProvenanceResult<Vec<u8>> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser)
            .map_err(|e| ProvenanceError::io("metadata.json", std::io::Error::other(e)))?;
        Ok(buf)
    }

    pub fn from_json(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }

    /// Fingerprint prefix used in the archive name.
    pub fn short_fingerprint(&self, len: usize) -> &str {
        let end = self
            .md5
            .char_indices()
            .nth(len)
            .map(|(i, _)| i)
            .unwrap_or(self.md5.len());
        &self.md5[..end]
    }

    pub fn committed_at(&self) -> Option<DateTime<Utc>> {
        chrono::NaiveDateTime::parse_from_str(&self.time, TIME_FORMAT)
            .ok()
            .map(|naive| naive.and_utc())
    }
}

/// Builds provenance records for a dataset's raw data.
pub struct RecordBuilder<'a> {
    environment: &'a dyn EnvironmentProvider,
}

impl<'a> RecordBuilder<'a> {
    pub fn new(environment: &'a dyn EnvironmentProvider) -> Self {
        Self { environment }
    }

    /// Record for the current state of `raw_root`, timestamped now.
    pub fn build(
        &self,
        dataset: &DatasetHandle,
        raw_root: &Path,
    ) -> ProvenanceResult<ProvenanceRecord> {
        self.build_at(dataset, raw_root, Utc::now())
    }

    pub fn build_at(
        &self,
        dataset: &DatasetHandle,
        raw_root: &Path,
        now: DateTime<Utc>,
    ) -> ProvenanceResult<ProvenanceRecord> {
        let md5 = hasher::hash_directory(raw_root).map_err(|e| match e {
            ProvenanceError::NotFound { path } => ProvenanceError::NoData {
                dataset: dataset.name.clone(),
                path,
            },
            other => other,
        })?;
        let packages = environment::snapshot(self.environment)?;

        Ok(ProvenanceRecord {
            md5,
            packages,
            script_name: dataset.script_file_name(),
            time: now.format(TIME_FORMAT).to_string(),
            version: dataset.version.clone(),
        })
    }
}
