//! Candidate fix generation, decoupled from issue detection so fixes can be
//! regenerated without re-scanning the project.

use crate::analyzer::min_version;
use crate::registry::RegistryClient;
use crate::types::{Confidence, Fix, Issue, IssueKind, VersionChange};

/// Produces ranked candidate fixes for detected issues using registry
/// metadata and deprecation-message heuristics.
pub struct Fixer {
    registry: RegistryClient,
}

impl Fixer {
    pub fn new(registry: RegistryClient) -> Self {
        Self { registry }
    }

    /// Whether this fixer handles the issue's kind. `Abandoned` issues are
    /// generated internally only and not accepted from callers yet.
    pub fn can_fix(issue: &Issue) -> bool {
        matches!(
            issue.kind,
            IssueKind::Outdated | IssueKind::Deprecated | IssueKind::VersionConflict
        )
    }

    /// Generates candidate fixes for one issue.
    ///
    /// Registry failures are logged and yield an empty or partial list; the
    /// registry may also have moved on since analysis, in which case a
    /// no-longer-applicable fix is simply omitted.
    pub async fn generate_fixes(&self, issue: &Issue) -> Vec<Fix> {
        let Some(first) = issue.affected.first() else {
            return Vec::new();
        };

        match issue.kind {
            IssueKind::Outdated => self.resolve_outdated(&first.name, &first.version).await,
            IssueKind::VersionConflict => self.resolve_conflict(issue).await,
            IssueKind::Deprecated => self.resolve_deprecated(&first.name, &first.version).await,
            IssueKind::Abandoned => self.resolve_abandoned(&first.name, &first.version).await,
        }
    }

    async fn resolve_outdated(&self, name: &str, current: &str) -> Vec<Fix> {
        let Some(info) = self.lookup(name).await else {
            return Vec::new();
        };

        // Re-confirm the bump still applies against live registry state.
        if !is_newer(&info.latest, current) {
            return Vec::new();
        }

        vec![Fix {
            description: format!("Update {name} to latest version ({})", info.latest),
            changes: vec![VersionChange {
                name: name.to_string(),
                from: current.to_string(),
                to: info.latest,
            }],
            confidence: Confidence::High,
        }]
    }

    async fn resolve_conflict(&self, issue: &Issue) -> Vec<Fix> {
        let Some(first) = issue.affected.first() else {
            return Vec::new();
        };
        let Some(info) = self.lookup(&first.name).await else {
            return Vec::new();
        };

        if !is_newer(&info.latest, &first.version) {
            return Vec::new();
        }

        // Align every conflicting declaration on the same target version.
        vec![Fix {
            description: format!(
                "Update {} to latest version ({})",
                first.name, info.latest
            ),
            changes: issue
                .affected
                .iter()
                .map(|dep| VersionChange {
                    name: dep.name.clone(),
                    from: dep.version.clone(),
                    to: info.latest.clone(),
                })
                .collect(),
            confidence: Confidence::High,
        }]
    }

    async fn resolve_deprecated(&self, name: &str, current: &str) -> Vec<Fix> {
        let Some(info) = self.lookup(name).await else {
            return Vec::new();
        };
        let Some(notice) = info.deprecated.clone() else {
            return Vec::new();
        };

        if let Some(replacement) = extract_replacement(&notice) {
            let Some(replacement_info) = self.lookup(&replacement).await else {
                return Vec::new();
            };
            return vec![Fix {
                description: format!(
                    "Replace deprecated {name} with {replacement}@{}",
                    replacement_info.latest
                ),
                changes: vec![VersionChange {
                    name: name.to_string(),
                    from: current.to_string(),
                    to: replacement_info.latest,
                }],
                confidence: Confidence::High,
            }];
        }

        let mut fixes = Vec::new();
        if is_newer(&info.latest, current) {
            fixes.push(Fix {
                description: format!("Update {name} to latest version ({})", info.latest),
                changes: vec![VersionChange {
                    name: name.to_string(),
                    from: current.to_string(),
                    to: info.latest,
                }],
                confidence: Confidence::Medium,
            });
        }
        fixes.push(Fix {
            description: format!("Manual intervention required: {notice}"),
            changes: Vec::new(),
            confidence: Confidence::Low,
        });
        fixes
    }

    async fn resolve_abandoned(&self, name: &str, current: &str) -> Vec<Fix> {
        let Some(info) = self.lookup(name).await else {
            return Vec::new();
        };

        let mut fixes = vec![Fix {
            description: format!("Update {name} to latest version ({})", info.latest),
            changes: vec![VersionChange {
                name: name.to_string(),
                from: current.to_string(),
                to: info.latest,
            }],
            confidence: Confidence::Medium,
        }];
        fixes.push(Fix {
            description: format!("Consider finding an actively maintained alternative to {name}"),
            changes: Vec::new(),
            confidence: Confidence::Low,
        });
        fixes
    }

    async fn lookup(&self, name: &str) -> Option<crate::registry::PackageInfo> {
        match self.registry.fetch_info(name).await {
            Ok(info) => Some(info),
            Err(err) => {
                tracing::warn!("fix generation lookup failed for {name}: {err}");
                None
            }
        }
    }
}

fn is_newer(candidate: &str, current: &str) -> bool {
    match (min_version(candidate), min_version(current)) {
        (Some(candidate), Some(current)) => candidate > current,
        _ => false,
    }
}

/// Best-effort scan of a deprecation notice for a named replacement package.
///
/// Recognizes the common phrasings "use X instead", "replaced by X", and
/// "migrate to X", first match wins. Novel phrasing falls through to the
/// generic manual-intervention fix.
pub fn extract_replacement(notice: &str) -> Option<String> {
    const PATTERNS: [&str; 3] = ["use ", "replaced by ", "migrate to "];

    for pattern in PATTERNS {
        let Some(at) = find_at_word_start(notice, pattern) else {
            continue;
        };
        let rest = &notice[at + pattern.len()..];
        let candidate: String = rest
            .chars()
            .take_while(|c| c.is_alphanumeric() || matches!(c, '@' | '/' | '-' | '_'))
            .collect();
        if !candidate.is_empty() {
            return Some(candidate);
        }
    }

    None
}

/// Finds the ASCII `pattern` case-insensitively, only where it starts a word,
/// so "use " does not match inside "because it".
///
/// Matching runs over the original string byte-for-byte; lowercasing the
/// haystack first would shift offsets whenever a non-ASCII character changes
/// length under case folding.
fn find_at_word_start(haystack: &str, pattern: &str) -> Option<usize> {
    let bytes = haystack.as_bytes();
    let window = pattern.len();
    for (at, _) in haystack.char_indices() {
        if at + window > bytes.len() {
            break;
        }
        if !bytes[at..at + window].eq_ignore_ascii_case(pattern.as_bytes()) {
            continue;
        }
        let boundary = haystack[..at]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric());
        if boundary {
            return Some(at);
        }
    }
    None
}

#[cfg(test)]
#[path = "fixer_tests.rs"]
mod tests;
