//! Storage backend contract and the per-run engine handle.
//!
//! Backends turn raw files into tables and are owned by the caller.
//! [`EngineHandle`] wraps a backend with the state the provenance layer
//! drives: where raw data is read from and which tables the current run
//! has registered.

use std::path::{Path, PathBuf};

use crate::dataset::TableDefinition;
use crate::error::BoxError;

/// One table handed to a backend.
#[derive(Debug, Clone, Copy)]
pub struct TableInstall<'a> {
    pub dataset: &'a str,
    pub table: &'a str,
    pub definition: &'a TableDefinition,
    /// Raw file the table is loaded from.
    pub source: &'a Path,
}

/// Storage/installer backend.
pub trait StorageBackend {
    /// Backend name for logs and errors.
    fn name(&self) -> &str;

    /// Fetch `url` to `destination`. Only called when raw data is not
    /// already available locally.
    fn fetch(&mut self, url: &str, destination: &Path) -> Result<(), BoxError>;

    /// Load one table from its raw file.
    fn install_table(&mut self, table: TableInstall<'_>) -> Result<(), BoxError>;

    /// Flush and release resources once a script has finished.
    fn final_cleanup(&mut self) -> Result<(), BoxError>;
}

/// Table registered by the current run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredTable {
    pub dataset: String,
    pub table: String,
    pub source: PathBuf,
}

/// Tables registered by the current run, in installation order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableRegistry {
    tables: Vec<RegisteredTable>,
}

impl TableRegistry {
    pub fn register(&mut self, table: RegisteredTable) {
        self.tables.retain(|t| !(t.dataset == table.dataset && t.table == table.table));
        self.tables.push(table);
    }

    pub fn contains(&self, dataset: &str, table: &str) -> bool {
        self.tables
            .iter()
            .any(|t| t.dataset == dataset && t.table == table)
    }

    pub fn tables(&self) -> &[RegisteredTable] {
        &self.tables
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Point sources under `from` at the same relative path under `to`.
    pub(crate) fn rebase(&mut self, from: &Path, to: &Path) {
        for table in &mut self.tables {
            if let Ok(rel) = table.source.strip_prefix(from) {
                table.source = to.join(rel);
            }
        }
    }
}

/// A backend plus the bookkeeping one installation run needs.
#[derive(Debug)]
pub struct EngineHandle<B> {
    pub backend: B,

    /// Raw-data root used when nothing is staged in `zipped_data_path`.
    pub raw_data_dir: PathBuf,

    /// Directory holding extracted archive data. When set, scripts read raw
    /// files from here instead of fetching them.
    pub zipped_data_path: Option<PathBuf>,

    /// Tables registered by the current run. Reset before each install.
    pub script_table_registry: TableRegistry,
}

impl<B: StorageBackend> EngineHandle<B> {
    pub fn new(backend: B, raw_data_dir: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            raw_data_dir: raw_data_dir.into(),
            zipped_data_path: None,
            script_table_registry: TableRegistry::default(),
        }
    }

    pub fn name(&self) -> &str {
        self.backend.name()
    }

    /// Forget the tables of any earlier run on this handle.
    pub fn reset_registry(&mut self) {
        self.script_table_registry = TableRegistry::default();
    }

    /// Directory raw files of `dataset` are read from.
    pub fn data_dir(&self, dataset: &str) -> PathBuf {
        self.zipped_data_path
            .as_deref()
            .unwrap_or(&self.raw_data_dir)
            .join(dataset)
    }

    pub fn into_backend(self) -> B {
        self.backend
    }
}
