//! Applies accepted fixes to the real manifest: backup, mutate, reinstall.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;

use crate::config::DepsenseiConfig;
use crate::manifest::{self, Manifest};
use crate::types::Issue;

pub const BACKUP_FILE: &str = "package.json.depsensei.backup";

/// Confirmation (`--force`) is a CLI concern settled before the engine runs;
/// by the time `execute` is called the selection is final.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApplyOptions {
    pub no_backup: bool,
    pub no_install: bool,
}

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("failed to read manifest: {reason}")]
    ManifestFailed { reason: String },
    #[error("failed to back up manifest: {reason}")]
    BackupFailed { reason: String },
    #[error("failed to write manifest: {reason}")]
    WriteFailed { reason: String },
    #[error("dependency install failed: {reason}")]
    InstallFailed { reason: String },
}

#[derive(Debug, Clone, Default)]
pub struct ApplyOutcome {
    pub changes_made: bool,
    pub backup_path: Option<PathBuf>,
    pub installed: bool,
}

/// Mutates the real manifest with the chosen fix per issue.
///
/// Either fully commits (backup, write, optional install) or aborts before
/// any file mutation; a failed install after the write is surfaced but not
/// rolled back, recovery from the backup is a manual step.
pub struct ApplyEngine {
    project_root: PathBuf,
    package_manager: String,
    timeout: Duration,
}

impl ApplyEngine {
    pub fn new(project_root: &Path, config: &DepsenseiConfig) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            package_manager: config.package_manager.clone(),
            timeout: config.command_timeout(),
        }
    }

    pub fn backup_path(&self) -> PathBuf {
        self.project_root.join(BACKUP_FILE)
    }

    /// Applies the chosen fix of every selected issue.
    ///
    /// `choose` resolves which fix to use when an issue carries several
    /// (index into `issue.fixes`, clamped; the first fix is the default).
    /// A fix whose target names are absent applies nothing; the manifest is
    /// rewritten and dependencies reinstalled only when something changed.
    ///
    /// # Errors
    ///
    /// `BackupFailed` aborts before any mutation; `InstallFailed` reports a
    /// failed post-write install without rolling the manifest back.
    pub async fn execute(
        &self,
        selected: &[Issue],
        options: ApplyOptions,
        choose: &dyn Fn(&Issue) -> usize,
    ) -> Result<ApplyOutcome, ApplyError> {
        let mut outcome = ApplyOutcome::default();
        if selected.iter().all(|issue| issue.fixes.is_empty()) {
            return Ok(outcome);
        }

        let manifest_path = manifest::manifest_path(&self.project_root);
        let mut target = Manifest::load(&manifest_path).map_err(|e| ApplyError::ManifestFailed {
            reason: e.to_string(),
        })?;

        if !options.no_backup {
            let backup = self.backup_path();
            fs::copy(&manifest_path, &backup).map_err(|e| ApplyError::BackupFailed {
                reason: format!("{} -> {}: {e}", manifest_path.display(), backup.display()),
            })?;
            tracing::info!("manifest backed up to {}", backup.display());
            outcome.backup_path = Some(backup);
        }

        for issue in selected {
            if issue.fixes.is_empty() {
                continue;
            }
            let index = choose(issue).min(issue.fixes.len() - 1);
            let fix = &issue.fixes[index];
            for change in &fix.changes {
                if target.set_version(&change.name, &change.to) {
                    outcome.changes_made = true;
                }
            }
        }

        if outcome.changes_made {
            target
                .save(&manifest_path)
                .map_err(|e| ApplyError::WriteFailed {
                    reason: e.to_string(),
                })?;
        } else {
            tracing::info!("no changes were made to the manifest");
            return Ok(outcome);
        }

        if !options.no_install {
            self.run_install().await?;
            outcome.installed = true;
        }

        Ok(outcome)
    }

    async fn run_install(&self) -> Result<(), ApplyError> {
        let run = Command::new(&self.package_manager)
            .arg("install")
            .current_dir(&self.project_root)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, run)
            .await
            .map_err(|_| ApplyError::InstallFailed {
                reason: format!("install timed out after {:?}", self.timeout),
            })?
            .map_err(|e| ApplyError::InstallFailed {
                reason: format!("failed to run {} install: {e}", self.package_manager),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ApplyError::InstallFailed {
                reason: if stderr.is_empty() {
                    format!("install exited with {}", output.status)
                } else {
                    stderr.to_string()
                },
            });
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "apply_tests.rs"]
mod tests;
