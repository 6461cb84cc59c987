//! Content fingerprints for files and raw-data directory trees.
//!
//! A directory fingerprint is the md5 of the sorted `(relative path, file md5)`
//! pairs, so it depends only on the set of relative paths and their bytes,
//! never on the order the filesystem yields entries in.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{ProvenanceError, ProvenanceResult};

/// Hex md5 of a file's content.
pub fn hash_file(path: impl AsRef<Path>) -> ProvenanceResult<String> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ProvenanceError::NotFound {
            path: path.to_path_buf(),
        },
        _ => ProvenanceError::io(path, e),
    })?;
    Ok(hash_bytes(&data))
}

pub fn hash_bytes(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

/// Fingerprint of every regular file below `root`.
///
/// Fails with `NotFound` when `root` does not exist; callers treat that as
/// "no data yet".
pub fn hash_directory(root: impl AsRef<Path>) -> ProvenanceResult<String> {
    let files = list_files(root)?;
    let mut pairs = Vec::with_capacity(files.len());
    for (rel, abs) in files {
        pairs.push((rel, hash_file(&abs)?));
    }
    Ok(combine(pairs))
}

/// Combine `(relative path, file digest)` pairs into a fingerprint.
///
/// Pairs are sorted by path first; input order never matters.
pub fn combine(mut pairs: Vec<(String, String)>) -> String {
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    let mut buf = Vec::new();
    for (rel, digest) in &pairs {
        // NUL cannot occur in a path, newline ends the fixed-width digest.
        buf.extend_from_slice(rel.as_bytes());
        buf.push(0);
        buf.extend_from_slice(digest.as_bytes());
        buf.push(b'\n');
    }
    hash_bytes(&buf)
}

/// Regular files below `root` as `(POSIX relative path, absolute path)`, sorted by relative path.
///
/// Symlinks are followed, so a linked file contributes its target's bytes
/// under the link's name. Names that are not valid UTF-8 are rejected with
/// `InvalidEntryPath`.
pub fn list_files(root: impl AsRef<Path>) -> ProvenanceResult<Vec<(String, PathBuf)>> {
    let root = root.as_ref();
    if !root.is_dir() {
        return Err(ProvenanceError::NotFound {
            path: root.to_path_buf(),
        });
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            match e.into_io_error() {
                Some(io) => ProvenanceError::io(path, io),
                None => ProvenanceError::io(path, std::io::Error::other("filesystem loop")),
            }
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(|_| ProvenanceError::InvalidEntryPath {
                entry: entry.path().display().to_string(),
            })?;
        files.push((posix_path(rel)?, entry.into_path()));
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

/// Relative path with forward slashes.
pub(crate) fn posix_path(rel: &Path) -> ProvenanceResult<String> {
    let mut parts = Vec::new();
    for component in rel.components() {
        let part = component
            .as_os_str()
            .to_str()
            .ok_or_else(|| ProvenanceError::InvalidEntryPath {
                entry: rel.display().to_string(),
            })?;
        parts.push(part);
    }
    Ok(parts.join("/"))
}
