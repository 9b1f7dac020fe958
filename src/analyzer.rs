//! Issue detection over the flattened dependency model.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use semver::Version;
use thiserror::Error;

use crate::manifest::{self, Manifest};
use crate::registry::RegistryClient;
use crate::types::{
    AnalysisReport, AnalysisSummary, Confidence, Dependency, Fix, Issue, IssueKind, VersionChange,
};

#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("no valid package.json found at {path}")]
    ManifestNotFound { path: PathBuf },
}

pub const ECOSYSTEM: &str = "javascript";

/// Walks the dependency model and emits typed issues, consulting the
/// registry for version and deprecation metadata.
pub struct Analyzer {
    registry: RegistryClient,
}

impl Analyzer {
    pub fn new(registry: RegistryClient) -> Self {
        Self { registry }
    }

    /// Whether a parseable manifest exists at the project root. Never errors.
    pub fn detect(project_root: &Path) -> bool {
        let path = manifest::manifest_path(project_root);
        std::fs::read_to_string(&path)
            .ok()
            .is_some_and(|raw| Manifest::parse(&raw).is_ok())
    }

    /// Runs the outdated, deprecation, and conflict passes and aggregates
    /// their issues into one report.
    ///
    /// Per-package registry failures are logged and skipped; analysis always
    /// completes with a best-effort issue list.
    ///
    /// # Errors
    ///
    /// `ManifestNotFound` when no parseable manifest exists at the root.
    pub async fn analyze(&self, project_root: &Path) -> Result<AnalysisReport, AnalyzeError> {
        let path = manifest::manifest_path(project_root);
        let Ok(manifest) = Manifest::load(&path) else {
            return Err(AnalyzeError::ManifestNotFound { path });
        };

        let records = manifest.flatten();
        let mut issues = self.outdated_pass(&records).await;
        issues.extend(self.deprecation_pass(&records).await);
        issues.extend(conflict_pass(&records));

        let summary = AnalysisSummary::from_issues(&issues);
        Ok(AnalysisReport {
            ecosystem: ECOSYSTEM.to_string(),
            issues,
            summary,
        })
    }

    async fn outdated_pass(&self, records: &[Dependency]) -> Vec<Issue> {
        let mut issues = Vec::new();

        // Lookups run sequentially; repeats hit the client's memo cache.
        for record in records {
            let info = match self.registry.fetch_info(&record.name).await {
                Ok(info) => info,
                Err(err) => {
                    tracing::warn!("skipping outdated check for {}: {err}", record.name);
                    continue;
                }
            };

            let (Some(current), Some(latest)) =
                (min_version(&record.version), min_version(&info.latest))
            else {
                tracing::warn!(
                    "could not parse version for {}: current='{}', latest='{}'",
                    record.name,
                    record.version,
                    info.latest
                );
                continue;
            };

            if latest > current {
                let mut issue = Issue::new(
                    IssueKind::Outdated,
                    format!(
                        "Package {} is outdated (current: {}, latest: {})",
                        record.name, record.version, info.latest
                    ),
                    vec![record.clone()],
                );
                issue.fixes.push(Fix {
                    description: format!(
                        "Update {} to latest version ({})",
                        record.name, info.latest
                    ),
                    changes: vec![VersionChange {
                        name: record.name.clone(),
                        from: record.version.clone(),
                        to: info.latest.clone(),
                    }],
                    confidence: Confidence::High,
                });
                issues.push(issue);
            }
        }

        issues
    }

    async fn deprecation_pass(&self, records: &[Dependency]) -> Vec<Issue> {
        let mut issues = Vec::new();

        for record in records {
            let info = match self.registry.fetch_info(&record.name).await {
                Ok(info) => info,
                Err(err) => {
                    tracing::warn!("skipping deprecation check for {}: {err}", record.name);
                    continue;
                }
            };

            // Fix generation for deprecations belongs to the fixer.
            if info.deprecated.is_some() {
                issues.push(Issue::new(
                    IssueKind::Deprecated,
                    format!("Package {} is deprecated", record.name),
                    vec![record.clone()],
                ));
            }
        }

        issues
    }
}

/// Flags names whose later categories declare a different literal range
/// than the first-seen one. Emits one aggregated issue per distinct name,
/// carrying the first-seen record plus every conflicting record in
/// declaration order.
fn conflict_pass(records: &[Dependency]) -> Vec<Issue> {
    let mut first_seen: HashMap<&str, &Dependency> = HashMap::new();
    let mut conflict_order: Vec<&str> = Vec::new();
    let mut conflicts: HashMap<&str, Vec<Dependency>> = HashMap::new();

    for record in records {
        match first_seen.get(record.name.as_str()) {
            None => {
                first_seen.insert(&record.name, record);
            }
            Some(first) if first.version != record.version => {
                let entry = conflicts.entry(&record.name).or_insert_with(|| {
                    conflict_order.push(&record.name);
                    vec![(*first).clone()]
                });
                entry.push(record.clone());
            }
            Some(_) => {}
        }
    }

    conflict_order
        .into_iter()
        .map(|name| {
            let records = conflicts.remove(name).unwrap_or_default();
            let detail = records
                .iter()
                .map(|dep| format!("{}: {}", dep.category.manifest_key(), dep.version))
                .collect::<Vec<_>>()
                .join(", ");
            Issue::new(
                IssueKind::VersionConflict,
                format!("Version conflict detected for {name} ({detail})"),
                records,
            )
        })
        .collect()
}

/// Minimum concrete version admitted by a declared range.
///
/// Handles exact versions and the common single-comparator ranges (`^`, `~`,
/// `>=`, `=`, leading `v`, wildcard and partial forms like `1.2` or `1.x`).
/// Returns `None` for anything it cannot interpret.
pub fn min_version(range: &str) -> Option<Version> {
    let token = range.split_whitespace().next()?;
    if token == "*" || token == "x" || token == "X" {
        return Version::parse("0.0.0").ok();
    }

    let stripped = token
        .trim_start_matches(['^', '~', '=', '>', '<'])
        .trim_start_matches('v');
    if stripped.is_empty() {
        return None;
    }

    if let Ok(version) = Version::parse(stripped) {
        return Some(version);
    }

    // Pad partial forms: "1" -> 1.0.0, "1.2" -> 1.2.0, wildcards to zero.
    let mut parts = stripped.splitn(3, '.');
    let major = parse_segment(parts.next()?)?;
    let minor = parts.next().map_or(Some(0), parse_segment)?;
    let patch = parts.next().map_or(Some(0), parse_segment)?;
    Some(Version::new(major, minor, patch))
}

fn parse_segment(segment: &str) -> Option<u64> {
    match segment {
        "x" | "X" | "*" => Some(0),
        other => other.parse().ok(),
    }
}

#[cfg(test)]
#[path = "analyzer_tests.rs"]
mod tests;
