#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use dataprov_core::{
    BoxError, DatasetHandle, ProvenanceConfig, StaticEnvironment, StorageBackend, TableInstall,
};

pub const ORIGINAL_URL: &str =
    "https://example.org/sample-dataset/raw/master/Portal_rodents_19772002.csv";
pub const MODIFIED_URL: &str =
    "https://example.org/sample-dataset/raw/master/modified/Portal_rodents_19772002.csv";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Backend serving fixed content per URL and recording what it installs.
#[derive(Debug, Default)]
pub struct FakeBackend {
    pub remote: BTreeMap<String, String>,
    pub fetched: Vec<String>,
    /// (table, content read from the source file at install time)
    pub installed: Vec<(String, String)>,
    pub sources: Vec<PathBuf>,
    pub cleanups: usize,
    pub fail_install: bool,
}

impl FakeBackend {
    pub fn with_remote() -> Self {
        let mut remote = BTreeMap::new();
        remote.insert(
            ORIGINAL_URL.to_string(),
            "recordID,month,day,year\n1,7,16,1977\n2,7,16,1977\n".to_string(),
        );
        remote.insert(
            MODIFIED_URL.to_string(),
            "recordID,month,day,year\n1,7,16,1977\n2,7,16,1977\n3,7,17,1977\n".to_string(),
        );
        Self {
            remote,
            ..Self::default()
        }
    }
}

impl StorageBackend for FakeBackend {
    fn name(&self) -> &str {
        "fake"
    }

    fn fetch(&mut self, url: &str, destination: &Path) -> Result<(), BoxError> {
        let content = self
            .remote
            .get(url)
            .ok_or_else(|| format!("404 for {url}"))?;
        std::fs::write(destination, content)?;
        self.fetched.push(url.to_string());
        Ok(())
    }

    fn install_table(&mut self, table: TableInstall<'_>) -> Result<(), BoxError> {
        if self.fail_install {
            return Err(format!("cannot create table {}", table.table).into());
        }
        let content = std::fs::read_to_string(table.source)?;
        self.installed.push((table.table.to_string(), content));
        self.sources.push(table.source.to_path_buf());
        Ok(())
    }

    fn final_cleanup(&mut self) -> Result<(), BoxError> {
        self.cleanups += 1;
        Ok(())
    }
}

pub struct Fixture {
    pub home: tempfile::TempDir,
    pub config: ProvenanceConfig,
    pub archives: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        init_tracing();
        let home = tempfile::tempdir().expect("tempdir");
        let config = ProvenanceConfig::with_home(home.path().join("home"));
        let archives = home.path().join("archives");
        std::fs::create_dir_all(&archives).expect("archives dir");
        Self {
            home,
            config,
            archives,
        }
    }

    /// Declarative sample script; returns its handle.
    pub fn sample_dataset(&self) -> DatasetHandle {
        let path = self.home.path().join("scripts/sample_dataset.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            format!(
                r#"{{
    "name": "sample-dataset",
    "title": "Portal rodents sample",
    "version": "1.0.0",
    "tables": {{
        "main": {{"url": "{ORIGINAL_URL}", "delimiter": ","}}
    }}
}}"#
            ),
        )
        .unwrap();
        DatasetHandle::from_script(&path).unwrap()
    }

    pub fn environment(&self) -> StaticEnvironment {
        StaticEnvironment::default()
            .with_package("numpy", "1.26.4")
            .with_package("pandas", "2.2.1")
    }

    pub fn raw_dir(&self, dataset: &str) -> PathBuf {
        self.config.dataset_raw_dir(dataset)
    }

    /// Names of leftover scratch directories next to the archives.
    pub fn scratch_leftovers(&self) -> Vec<String> {
        std::fs::read_dir(&self.archives)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| dataprov_core::workspace::is_scratch_name(name))
            .collect()
    }
}
