//! Dependency model: reading, flattening, and rewriting `package.json`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::types::{Dependency, DependencyCategory};

pub const MANIFEST_FILE: &str = "package.json";
pub const LOCKFILE_FILE: &str = "package-lock.json";

pub fn manifest_path(project_root: &Path) -> PathBuf {
    project_root.join(MANIFEST_FILE)
}

pub fn lockfile_path(project_root: &Path) -> PathBuf {
    project_root.join(LOCKFILE_FILE)
}

/// Typed view of a `package.json`.
///
/// Only the four dependency category maps are interpreted; every other
/// top-level field is carried through `extra` untouched so a rewrite does not
/// drop manifest content it does not understand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,
    #[serde(
        rename = "devDependencies",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub dev_dependencies: BTreeMap<String, String>,
    #[serde(
        rename = "peerDependencies",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub peer_dependencies: BTreeMap<String, String>,
    #[serde(
        rename = "optionalDependencies",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub optional_dependencies: BTreeMap<String, String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Manifest {
    /// Parses manifest text.
    ///
    /// # Errors
    ///
    /// Returns the underlying deserialization error for malformed JSON or
    /// non-string version entries.
    pub fn parse(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    /// Reads and parses the manifest at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest at {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("failed to parse manifest at {}", path.display()))
    }

    /// Renders the manifest with stable 2-space indentation and a trailing
    /// newline.
    pub fn to_json_string(&self) -> anyhow::Result<String> {
        let rendered =
            serde_json::to_string_pretty(self).context("failed to serialize manifest")?;
        Ok(format!("{rendered}\n"))
    }

    /// Writes the manifest back to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error when serialization or the write fails.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let rendered = self.to_json_string()?;
        fs::write(path, rendered)
            .with_context(|| format!("failed to write manifest at {}", path.display()))
    }

    pub fn category(&self, category: DependencyCategory) -> &BTreeMap<String, String> {
        match category {
            DependencyCategory::Runtime => &self.dependencies,
            DependencyCategory::Dev => &self.dev_dependencies,
            DependencyCategory::Peer => &self.peer_dependencies,
            DependencyCategory::Optional => &self.optional_dependencies,
        }
    }

    fn category_mut(&mut self, category: DependencyCategory) -> &mut BTreeMap<String, String> {
        match category {
            DependencyCategory::Runtime => &mut self.dependencies,
            DependencyCategory::Dev => &mut self.dev_dependencies,
            DependencyCategory::Peer => &mut self.peer_dependencies,
            DependencyCategory::Optional => &mut self.optional_dependencies,
        }
    }

    /// Flattens all declared dependencies into records, in category order
    /// runtime, dev, peer, optional.
    pub fn flatten(&self) -> Vec<Dependency> {
        let mut records = Vec::new();
        for category in DependencyCategory::ALL {
            for (name, version) in self.category(category) {
                records.push(Dependency {
                    name: name.clone(),
                    version: version.clone(),
                    category,
                });
            }
        }
        records
    }

    /// Sets `name` to version `to` in every category that already declares it.
    ///
    /// A name absent from all categories is a no-op, not an error; the return
    /// value reports whether any entry changed.
    pub fn set_version(&mut self, name: &str, to: &str) -> bool {
        let mut changed = false;
        for category in DependencyCategory::ALL {
            if let Some(entry) = self.category_mut(category).get_mut(name)
                && *entry != to
            {
                *entry = to.to_string();
                changed = true;
            }
        }
        changed
    }
}

#[cfg(test)]
#[path = "manifest_tests.rs"]
mod tests;
