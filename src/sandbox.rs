//! Disposable validation environment for candidate fixes.
//!
//! A sandbox owns a temporary copy of the manifest (plus lock data when
//! present), pinned to a registry endpoint. Fixes are applied and installed
//! there, never against the real project, and the whole tree is removed on
//! cleanup.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::process::Command;

use crate::config::DepsenseiConfig;
use crate::manifest::{self, Manifest};
use crate::types::Fix;

#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub project_root: PathBuf,
    pub registry_url: String,
    pub timeout: Duration,
    pub package_manager: String,
}

impl SandboxConfig {
    pub fn from_config(project_root: &Path, config: &DepsenseiConfig) -> Self {
        Self {
            project_root: project_root.to_path_buf(),
            registry_url: config.registry_url.clone(),
            timeout: config.command_timeout(),
            package_manager: config.package_manager.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("sandbox setup failed: {reason}")]
    SetupFailed { reason: String },
}

/// Outcome of one sandboxed operation. Failures are captured here, never
/// raised, so a caller can probe many fixes in sequence.
#[derive(Debug, Clone)]
pub struct SandboxResult {
    pub success: bool,
    pub duration: Duration,
    pub output: Option<String>,
    pub error: Option<String>,
}

impl SandboxResult {
    fn failure(error: String, duration: Duration) -> Self {
        Self {
            success: false,
            duration,
            output: None,
            error: Some(error),
        }
    }
}

/// Lifecycle: `create` provisions and installs, `test_fix` /
/// `test_package_versions` may run any number of times, `cleanup` tears the
/// tree down and is safe to call repeatedly.
pub struct SandboxManager {
    config: SandboxConfig,
    work_dir: Option<tempfile::TempDir>,
    has_lockfile: bool,
}

impl SandboxManager {
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            config,
            work_dir: None,
            has_lockfile: false,
        }
    }

    /// Path of the disposable directory, while one exists.
    pub fn work_dir(&self) -> Option<&Path> {
        self.work_dir.as_ref().map(tempfile::TempDir::path)
    }

    /// Provisions the sandbox: temp directory, manifest (and lockfile) copy,
    /// registry pinning, and a full dependency install.
    ///
    /// # Errors
    ///
    /// Any provisioning failure tears the sandbox down and surfaces as
    /// `SetupFailed` with the underlying cause.
    pub async fn create(&mut self) -> Result<(), SandboxError> {
        match self.provision().await {
            Ok(()) => Ok(()),
            Err(reason) => {
                self.cleanup();
                Err(SandboxError::SetupFailed { reason })
            }
        }
    }

    async fn provision(&mut self) -> Result<(), String> {
        let dir = tempfile::Builder::new()
            .prefix("depsensei-")
            .tempdir()
            .map_err(|e| format!("failed to create sandbox directory: {e}"))?;

        let source_manifest = manifest::manifest_path(&self.config.project_root);
        fs::copy(&source_manifest, dir.path().join(manifest::MANIFEST_FILE)).map_err(|e| {
            format!(
                "failed to copy manifest from {}: {e}",
                source_manifest.display()
            )
        })?;

        let source_lockfile = manifest::lockfile_path(&self.config.project_root);
        self.has_lockfile = source_lockfile.exists();
        if self.has_lockfile {
            fs::copy(&source_lockfile, dir.path().join(manifest::LOCKFILE_FILE))
                .map_err(|e| format!("failed to copy lockfile: {e}"))?;
        }

        // Pin the sandbox to the configured registry endpoint.
        fs::write(
            dir.path().join(".npmrc"),
            format!("registry={}\n", self.config.registry_url),
        )
        .map_err(|e| format!("failed to write .npmrc: {e}"))?;

        let sandbox_path = dir.path().to_path_buf();
        self.work_dir = Some(dir);

        let install = self.install_dependencies().await;
        if !install.success {
            return Err(install
                .error
                .unwrap_or_else(|| "dependency install failed".to_string()));
        }

        tracing::debug!("sandbox ready at {}", sandbox_path.display());
        Ok(())
    }

    /// Applies a fix to the sandboxed manifest, reinstalls, and runs the
    /// project's test command when the install succeeds. Overall success is
    /// install success AND test success; failures are captured in the result.
    pub async fn test_fix(&mut self, fix: &Fix) -> SandboxResult {
        let started = Instant::now();
        let Some(dir) = self.work_dir.as_ref().map(|dir| dir.path().to_path_buf()) else {
            return SandboxResult::failure("sandbox has not been created".to_string(), started.elapsed());
        };

        if let Err(err) = apply_fix_to_manifest(&dir, fix) {
            return SandboxResult::failure(err, started.elapsed());
        }

        let install = self.install_dependencies().await;
        if !install.success {
            return SandboxResult {
                duration: started.elapsed(),
                ..install
            };
        }

        let test = self.run_project_tests().await;
        SandboxResult {
            duration: started.elapsed(),
            ..test
        }
    }

    /// Probes candidate versions of one package in caller-supplied order.
    ///
    /// Only the probed package's manifest entry is mutated per attempt; the
    /// original manifest content is restored after every attempt and
    /// unconditionally at the end, so the session stays reusable.
    pub async fn test_package_versions(
        &mut self,
        package: &str,
        versions: &[String],
        test_command: Option<&str>,
    ) -> Vec<(String, SandboxResult)> {
        let Some(dir) = self.work_dir.as_ref().map(|dir| dir.path().to_path_buf()) else {
            return versions
                .iter()
                .map(|version| {
                    (
                        version.clone(),
                        SandboxResult::failure(
                            "sandbox has not been created".to_string(),
                            Duration::ZERO,
                        ),
                    )
                })
                .collect();
        };

        let manifest_path = dir.join(manifest::MANIFEST_FILE);
        let original = match fs::read_to_string(&manifest_path) {
            Ok(raw) => raw,
            Err(e) => {
                let error = format!("failed to read sandbox manifest: {e}");
                return versions
                    .iter()
                    .map(|version| {
                        (
                            version.clone(),
                            SandboxResult::failure(error.clone(), Duration::ZERO),
                        )
                    })
                    .collect();
            }
        };

        let mut results = Vec::with_capacity(versions.len());
        for version in versions {
            let result = self
                .probe_version(&manifest_path, &original, package, version, test_command)
                .await;
            results.push((version.clone(), result));

            if let Err(e) = fs::write(&manifest_path, &original) {
                tracing::warn!("failed to restore sandbox manifest: {e}");
            }
        }

        // Restore is repeated here so a short-circuited loop still leaves the
        // manifest byte-identical to its pre-call state.
        if let Err(e) = fs::write(&manifest_path, &original) {
            tracing::warn!("failed to restore sandbox manifest: {e}");
        }

        results
    }

    async fn probe_version(
        &self,
        manifest_path: &Path,
        original: &str,
        package: &str,
        version: &str,
        test_command: Option<&str>,
    ) -> SandboxResult {
        let started = Instant::now();

        let mut probe = match Manifest::parse(original) {
            Ok(manifest) => manifest,
            Err(e) => {
                return SandboxResult::failure(
                    format!("failed to parse sandbox manifest: {e}"),
                    started.elapsed(),
                );
            }
        };
        probe.set_version(package, version);
        if let Err(e) = probe.save(manifest_path) {
            return SandboxResult::failure(e.to_string(), started.elapsed());
        }

        let spec = format!("{package}@{version}");
        let install = self
            .run_command(&[self.config.package_manager.clone(), "install".to_string(), spec])
            .await;
        if !install.success {
            return SandboxResult {
                duration: started.elapsed(),
                ..install
            };
        }

        match test_command {
            Some(command) => {
                let parts: Vec<String> = command.split_whitespace().map(String::from).collect();
                if parts.is_empty() {
                    return SandboxResult {
                        duration: started.elapsed(),
                        ..install
                    };
                }
                let result = self.run_command(&parts).await;
                SandboxResult {
                    duration: started.elapsed(),
                    ..result
                }
            }
            None => SandboxResult {
                duration: started.elapsed(),
                ..install
            },
        }
    }

    /// Removes the disposable tree. Idempotent; every exit path from the
    /// owning workflow should call it.
    pub fn cleanup(&mut self) {
        if let Some(dir) = self.work_dir.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                tracing::warn!("failed to remove sandbox at {}: {e}", path.display());
            }
        }
    }

    async fn install_dependencies(&self) -> SandboxResult {
        // Clean install when lock data was copied in, mutable install otherwise.
        let subcommand = if self.has_lockfile { "ci" } else { "install" };
        self.run_command(&[
            self.config.package_manager.clone(),
            subcommand.to_string(),
        ])
        .await
    }

    async fn run_project_tests(&self) -> SandboxResult {
        self.run_command(&[self.config.package_manager.clone(), "test".to_string()])
            .await
    }

    async fn run_command(&self, argv: &[String]) -> SandboxResult {
        let started = Instant::now();
        let Some(dir) = self.work_dir() else {
            return SandboxResult::failure(
                "sandbox has not been created".to_string(),
                started.elapsed(),
            );
        };
        let Some((program, args)) = argv.split_first() else {
            return SandboxResult::failure("empty command".to_string(), started.elapsed());
        };

        let outcome = tokio::time::timeout(
            self.config.timeout,
            Command::new(program)
                .args(args)
                .current_dir(dir)
                .kill_on_drop(true)
                .output(),
        )
        .await;

        match outcome {
            Err(_) => SandboxResult::failure(
                format!(
                    "'{}' timed out after {:?}",
                    argv.join(" "),
                    self.config.timeout
                ),
                started.elapsed(),
            ),
            Ok(Err(e)) => SandboxResult::failure(
                format!("failed to run '{}': {e}", argv.join(" ")),
                started.elapsed(),
            ),
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                let success = output.status.success();
                SandboxResult {
                    success,
                    duration: started.elapsed(),
                    output: (!stdout.is_empty()).then_some(stdout),
                    error: (!success).then(|| {
                        if stderr.is_empty() {
                            format!("'{}' exited with {}", argv.join(" "), output.status)
                        } else {
                            stderr
                        }
                    }),
                }
            }
        }
    }
}

impl Drop for SandboxManager {
    fn drop(&mut self) {
        self.cleanup();
    }
}

fn apply_fix_to_manifest(dir: &Path, fix: &Fix) -> Result<(), String> {
    let path = dir.join(manifest::MANIFEST_FILE);
    let mut target = Manifest::load(&path).map_err(|e| e.to_string())?;
    for change in &fix.changes {
        // Absent names are a no-op by contract.
        target.set_version(&change.name, &change.to);
    }
    target.save(&path).map_err(|e| e.to_string())
}

// Exercised with stub package-manager scripts, so unix only.
#[cfg(all(test, unix))]
#[path = "sandbox_tests.rs"]
mod tests;
