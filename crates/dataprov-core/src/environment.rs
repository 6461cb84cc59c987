//! Environment snapshot providers.
//!
//! A snapshot is a package-name -> version manifest recorded in each archive.
//! Enumerating packages is environment specific, so the record builder takes
//! any [`EnvironmentProvider`].

use std::collections::BTreeMap;
use std::process::Command;

use tracing::debug;

use crate::error::{ProvenanceError, ProvenanceResult};

/// Name under which this tool records itself in every snapshot.
pub const TOOL_PACKAGE: &str = env!("CARGO_PKG_NAME");

/// Package manifest of the current environment.
pub type PackageManifest = BTreeMap<String, String>;

/// Source of the environment package manifest.
pub trait EnvironmentProvider {
    fn packages(&self) -> ProvenanceResult<PackageManifest>;
}

impl<F> EnvironmentProvider for F
where
    F: Fn() -> PackageManifest,
{
    fn packages(&self) -> ProvenanceResult<PackageManifest> {
        Ok(self())
    }
}

/// Fixed manifest.
#[derive(Debug, Clone, Default)]
pub struct StaticEnvironment(pub PackageManifest);

impl StaticEnvironment {
    pub fn with_package(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.0.insert(name.into(), version.into());
        self
    }
}

impl EnvironmentProvider for StaticEnvironment {
    fn packages(&self) -> ProvenanceResult<PackageManifest> {
        Ok(self.0.clone())
    }
}

/// Runs a package-listing command and parses `name==version` lines.
#[derive(Debug, Clone)]
pub struct CommandEnvironment {
    program: String,
    args: Vec<String>,
}

impl CommandEnvironment {
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// `python3 -m pip freeze --exclude-editable`.
    pub fn pip_freeze() -> Self {
        Self::new("python3", ["-m", "pip", "freeze", "--exclude-editable"])
    }
}

impl Default for CommandEnvironment {
    fn default() -> Self {
        Self::pip_freeze()
    }
}

impl EnvironmentProvider for CommandEnvironment {
    fn packages(&self) -> ProvenanceResult<PackageManifest> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .output()
            .map_err(|e| ProvenanceError::Environment {
                message: format!("failed to run {}: {}", self.program, e),
            })?;
        if !output.status.success() {
            return Err(ProvenanceError::Environment {
                message: format!(
                    "{} exited with {}: {}",
                    self.program,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let packages = parse_requirements(&stdout);
        debug!(program = %self.program, count = packages.len(), "captured package manifest");
        Ok(packages)
    }
}

/// Parse `name==version` lines. Other lines (comments, URLs, editables) are skipped.
pub fn parse_requirements(text: &str) -> PackageManifest {
    text.lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            let (name, version) = line.split_once("==")?;
            let (name, version) = (name.trim(), version.trim());
            (!name.is_empty() && !version.is_empty())
                .then(|| (name.to_string(), version.to_string()))
        })
        .collect()
}

/// Snapshot from `provider` plus this tool's own entry.
pub(crate) fn snapshot(provider: &dyn EnvironmentProvider) -> ProvenanceResult<PackageManifest> {
    let mut packages = provider.packages()?;
    packages
        .entry(TOOL_PACKAGE.to_string())
        .or_insert_with(|| env!("CARGO_PKG_VERSION").to_string());
    Ok(packages)
}
