//! Restore: script reconstruction for both representations, corrupt archives.

mod common;

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use common::{Fixture, ORIGINAL_URL};
use dataprov_core::archive::paths;
use dataprov_core::{
    commit, extract_all, read_script, ArchiveReader, BoxError, DatasetHandle, ModuleLoader,
    ProvenanceError, ProvenanceResult, ScriptDefinition, ScriptLoaders, TableDefinition,
};

fn no_download(_: &DatasetHandle) -> Result<(), BoxError> {
    Ok(())
}

fn seed_raw(fx: &Fixture, dataset: &str) {
    let raw = fx.raw_dir(dataset);
    std::fs::create_dir_all(&raw).unwrap();
    std::fs::write(raw.join("Portal_rodents_19772002.csv"), "recordID\n1\n").unwrap();
}

fn committed(fx: &Fixture, dataset: &DatasetHandle) -> PathBuf {
    commit(
        dataset,
        &fx.archives,
        &fx.config,
        &fx.environment(),
        &mut no_download,
        false,
    )
    .unwrap()
    .path
}

/// Copy of `archive` without `metadata.json`.
fn strip_metadata(archive: &Path, out: &Path) {
    let mut src = zip::ZipArchive::new(std::fs::File::open(archive).unwrap()).unwrap();
    let mut dst = zip::ZipWriter::new(std::fs::File::create(out).unwrap());
    for i in 0..src.len() {
        let mut entry = src.by_index(i).unwrap();
        if entry.name() == paths::METADATA {
            continue;
        }
        let name = entry.name().to_string();
        let mut data = Vec::new();
        entry.read_to_end(&mut data).unwrap();
        dst.start_file(name, zip::write::SimpleFileOptions::default())
            .unwrap();
        dst.write_all(&data).unwrap();
    }
    dst.finish().unwrap();
}

#[test]
fn declarative_round_trip() {
    let fx = Fixture::new();
    let dataset = fx.sample_dataset();
    seed_raw(&fx, "sample-dataset");
    let archive = committed(&fx, &dataset);

    let script = read_script(&archive, &fx.config).unwrap();

    assert!(!script.is_executable());
    assert_eq!(script.name(), "sample-dataset");
    assert_eq!(script.tables(), &dataset.tables);
    assert_eq!(script.tables()["main"].url, ORIGINAL_URL);
    assert_eq!(script.definition().title.as_deref(), Some("Portal rodents sample"));
    assert!(script.installed_into().is_none());
    assert!(fx.scratch_leftovers().is_empty());
}

#[cfg(unix)]
#[test]
fn executable_round_trip() {
    let fx = Fixture::new();
    let path = fx.home.path().join("scripts/bird_size.sh");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(
        &path,
        r#"#!/bin/sh
if [ "$1" = "--describe" ]; then
  cat <<'EOF'
{"name": "bird-size", "version": "2.1",
 "tables": {"species": {"url": "https://example.org/bird/species.csv", "columns": ["id", "genus"]}}}
EOF
  exit 0
fi
exit 2
"#,
    )
    .unwrap();
    let mut species = TableDefinition::new("https://example.org/bird/species.csv");
    species.columns = vec!["id".into(), "genus".into()];
    let dataset = DatasetHandle::new("bird-size", "2.1", &path).with_table("species", species);
    seed_raw(&fx, "bird-size");

    let archive = committed(&fx, &dataset);
    let script = read_script(&archive, &fx.config).unwrap();

    assert!(script.is_executable());
    assert_eq!(script.name(), "bird-size");
    assert_eq!(script.tables(), &dataset.tables);
    assert!(fx.scratch_leftovers().is_empty());
}

/// Loader that checks it runs inside the scratch workspace.
struct ScopedLoader;

impl ModuleLoader for ScopedLoader {
    fn load(&self, script: &Path, workspace: &Path) -> ProvenanceResult<ScriptDefinition> {
        assert!(script.starts_with(workspace));
        let mut definition: ScriptDefinition = serde_json::from_str(
            r#"{"name": "mammal-masses", "version": "1.0", "tables": {}}"#,
        )
        .unwrap();
        definition.keywords.push(std::fs::read_to_string(script).unwrap());
        Ok(definition)
    }
}

#[test]
fn custom_loader_sees_extracted_script() {
    let fx = Fixture::new();
    let path = fx.home.path().join("scripts/mammal_masses.R");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "SCRIPT <- list()").unwrap();
    let dataset = DatasetHandle::new("mammal-masses", "1.0", &path);
    seed_raw(&fx, "mammal-masses");
    let archive = committed(&fx, &dataset);

    let loaders = ScriptLoaders::declarative_only().with_loader("R", ScopedLoader);
    let script = ArchiveReader::open(&archive)
        .unwrap()
        .read_script(&loaders, &fx.archives)
        .unwrap();

    assert!(script.is_executable());
    assert_eq!(script.definition().keywords, vec!["SCRIPT <- list()".to_string()]);
    assert!(fx.scratch_leftovers().is_empty());
}

#[test]
fn unsupported_script_format_cleans_up() {
    let fx = Fixture::new();
    let path = fx.home.path().join("scripts/airports.xlsx");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "binary").unwrap();
    let dataset = DatasetHandle::new("airports", "1.0", &path);
    seed_raw(&fx, "airports");
    let archive = committed(&fx, &dataset);

    let err = read_script(&archive, &fx.config).unwrap_err();
    assert!(matches!(err, ProvenanceError::UnsupportedScriptFormat { ref file_name } if file_name == "airports.xlsx"));
    assert!(fx.scratch_leftovers().is_empty());
}

#[test]
fn missing_metadata_is_corrupt_and_leaves_no_scratch() {
    let fx = Fixture::new();
    let dataset = fx.sample_dataset();
    seed_raw(&fx, "sample-dataset");
    let archive = committed(&fx, &dataset);
    let corrupted = fx.archives.join("sample-dataset-corrupt.zip");
    strip_metadata(&archive, &corrupted);

    let err = read_script(&corrupted, &fx.config).unwrap_err();
    match &err {
        ProvenanceError::CorruptArchive { reason, .. } => assert!(reason.contains("metadata.json")),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.exit_code(), 3);
    assert!(fx.scratch_leftovers().is_empty());
}

#[test]
fn extract_all_restores_layout_for_caller() {
    let fx = Fixture::new();
    let dataset = fx.sample_dataset();
    seed_raw(&fx, "sample-dataset");
    let archive = committed(&fx, &dataset);

    let workspace = extract_all(&archive, &fx.config).unwrap();
    let root = workspace.path().to_path_buf();
    assert!(root.join("script/sample_dataset.json").is_file());
    assert!(root.join(paths::METADATA).is_file());
    assert_eq!(
        std::fs::read_to_string(root.join("sample-dataset/Portal_rodents_19772002.csv")).unwrap(),
        "recordID\n1\n"
    );
    assert_eq!(
        dataprov_core::hash_directory(root.join("sample-dataset")).unwrap(),
        dataprov_core::hash_directory(fx.raw_dir("sample-dataset")).unwrap()
    );

    workspace.close().unwrap();
    assert!(!root.exists());
}

#[test]
fn scratch_dir_from_config_is_used() {
    let fx = Fixture::new();
    let dataset = fx.sample_dataset();
    seed_raw(&fx, "sample-dataset");
    let archive = committed(&fx, &dataset);
    let scratch = fx.home.path().join("scratch");
    let config = fx.config.clone().with_scratch_dir(&scratch);

    let workspace = extract_all(&archive, &config).unwrap();
    assert!(workspace.path().starts_with(std::fs::canonicalize(&scratch).unwrap()));
    drop(workspace);
    assert_eq!(std::fs::read_dir(&scratch).unwrap().count(), 0);
}
