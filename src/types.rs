use serde::{Deserialize, Serialize};

/// Declaration bucket a dependency was found in.
///
/// The same package name may legitimately appear in several categories,
/// which is one of the conflict sources the analyzer looks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyCategory {
    Runtime,
    Dev,
    Peer,
    Optional,
}

impl DependencyCategory {
    pub const ALL: [DependencyCategory; 4] = [
        DependencyCategory::Runtime,
        DependencyCategory::Dev,
        DependencyCategory::Peer,
        DependencyCategory::Optional,
    ];

    /// Manifest key this category is declared under.
    pub fn manifest_key(self) -> &'static str {
        match self {
            Self::Runtime => "dependencies",
            Self::Dev => "devDependencies",
            Self::Peer => "peerDependencies",
            Self::Optional => "optionalDependencies",
        }
    }
}

/// One declared dependency record, flattened out of the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    /// Declared version range or exact version, as written in the manifest.
    pub version: String,
    pub category: DependencyCategory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IssueKind {
    Outdated,
    Deprecated,
    VersionConflict,
    Abandoned,
}

/// Severity is a rule of the kind, never computed from the records.
pub fn severity_for(kind: IssueKind) -> Severity {
    match kind {
        IssueKind::Outdated => Severity::Medium,
        IssueKind::Deprecated | IssueKind::VersionConflict | IssueKind::Abandoned => Severity::High,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionChange {
    pub name: String,
    pub from: String,
    pub to: String,
}

/// A proposed set of version changes resolving an issue.
///
/// An empty `changes` list is a "manual intervention required" marker, not
/// an actionable patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fix {
    pub description: String,
    pub changes: Vec<VersionChange>,
    pub confidence: Confidence,
}

impl Fix {
    pub fn is_manual(&self) -> bool {
        self.changes.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub kind: IssueKind,
    pub message: String,
    pub severity: Severity,
    pub affected: Vec<Dependency>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fixes: Vec<Fix>,
}

impl Issue {
    /// Builds an issue with the severity implied by its kind.
    pub fn new(kind: IssueKind, message: String, affected: Vec<Dependency>) -> Self {
        Self {
            kind,
            message,
            severity: severity_for(kind),
            affected,
            fixes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub total_issues: usize,
    pub by_severity: SeverityCounts,
}

impl AnalysisSummary {
    /// Pure aggregate over an issue list.
    pub fn from_issues(issues: &[Issue]) -> Self {
        let mut by_severity = SeverityCounts::default();
        for issue in issues {
            match issue.severity {
                Severity::Low => by_severity.low += 1,
                Severity::Medium => by_severity.medium += 1,
                Severity::High => by_severity.high += 1,
            }
        }
        Self {
            total_issues: issues.len(),
            by_severity,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub ecosystem: String,
    pub issues: Vec<Issue>,
    pub summary: AnalysisSummary,
}
