//! CLI entrypoint for dependency analysis and fix application.

mod analyzer;
mod apply;
mod config;
mod ecosystems;
mod fixer;
mod manifest;
mod registry;
mod sandbox;
mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::anyhow;
use clap::{Parser, Subcommand};

use apply::{ApplyEngine, ApplyOptions};
use config::DepsenseiConfig;
use ecosystems::{EcosystemCatalog, EcosystemPlugin};
use sandbox::{SandboxConfig, SandboxManager};
use types::Issue;

#[derive(Parser)]
#[command(
    name = "depsensei",
    version,
    about = "Detects and resolves dependency issues in package manifests"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a project's dependency manifest and report issues
    Analyze {
        /// Path to the project directory
        #[arg(default_value = ".")]
        path: PathBuf,
        /// Ecosystem to analyze; defaults to the first registered one
        #[arg(long)]
        ecosystem: Option<String>,
    },
    /// Generate fixes for detected issues and apply them to the manifest
    Fix {
        /// Path to the project directory
        #[arg(default_value = ".")]
        path: PathBuf,
        /// Ecosystem to fix; defaults to the first registered one
        #[arg(long)]
        ecosystem: Option<String>,
        /// Show the planned changes without touching any file
        #[arg(long)]
        dry_run: bool,
        /// Apply without external confirmation
        #[arg(short, long)]
        force: bool,
        /// Skip creating a manifest backup before mutating
        #[arg(long)]
        no_backup: bool,
        /// Skip the dependency install after applying fixes
        #[arg(long)]
        no_install: bool,
        /// Validate each candidate fix in a disposable sandbox first
        #[arg(long)]
        sandbox: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let config = DepsenseiConfig::load()?;
    let catalog = ecosystems::default_catalog(&config);

    match cli.command {
        Commands::Analyze { path, ecosystem } => {
            let plugin = resolve_plugin(&catalog, ecosystem.as_deref())?;
            let report = plugin.analyze(&path).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Fix {
            path,
            ecosystem,
            dry_run,
            force,
            no_backup,
            no_install,
            sandbox,
        } => {
            let plugin = resolve_plugin(&catalog, ecosystem.as_deref())?;
            run_fix(
                plugin,
                &config,
                &path,
                FixFlags {
                    dry_run,
                    force,
                    no_backup,
                    no_install,
                    sandbox,
                },
            )
            .await?;
        }
    }

    Ok(())
}

struct FixFlags {
    dry_run: bool,
    force: bool,
    no_backup: bool,
    no_install: bool,
    sandbox: bool,
}

fn resolve_plugin<'a>(
    catalog: &'a EcosystemCatalog,
    key: Option<&str>,
) -> anyhow::Result<&'a Arc<dyn EcosystemPlugin>> {
    let key = key.unwrap_or_else(|| catalog.default_key());
    catalog.plugin(key).ok_or_else(|| {
        anyhow!(
            "unsupported ecosystem '{}'; supported ecosystems: {}",
            key,
            catalog.keys().join(", ")
        )
    })
}

async fn run_fix(
    plugin: &Arc<dyn EcosystemPlugin>,
    config: &DepsenseiConfig,
    project_root: &Path,
    flags: FixFlags,
) -> anyhow::Result<()> {
    let report = plugin.analyze(project_root).await?;
    if report.issues.is_empty() {
        println!("No issues found.");
        return Ok(());
    }

    // The analyzer attaches fixes opportunistically; fill in the rest here so
    // deprecations and conflicts get their candidates too.
    let mut fixable: Vec<Issue> = Vec::new();
    for mut issue in report.issues {
        if issue.fixes.is_empty() && plugin.can_fix(&issue) {
            issue.fixes = plugin.generate_fixes(&issue).await;
        }
        if issue.fixes.iter().any(|fix| !fix.is_manual()) {
            fixable.push(issue);
        } else {
            println!("No automatic fix for: {}", issue.message);
        }
    }

    if fixable.is_empty() {
        println!("Nothing to apply.");
        return Ok(());
    }

    for issue in &fixable {
        let fix = &issue.fixes[0];
        println!("{} -> {}", issue.message, fix.description);
    }

    if flags.dry_run {
        println!("Dry run: no files were modified.");
        return Ok(());
    }
    if !flags.force {
        // Interactive selection lives outside this binary.
        println!("Re-run with --force to apply these fixes.");
        return Ok(());
    }

    if flags.sandbox {
        fixable = validate_in_sandbox(config, project_root, fixable).await?;
        if fixable.is_empty() {
            println!("No fix passed sandbox validation; nothing applied.");
            return Ok(());
        }
    }

    let engine = ApplyEngine::new(project_root, config);
    let outcome = engine
        .execute(
            &fixable,
            ApplyOptions {
                no_backup: flags.no_backup,
                no_install: flags.no_install,
            },
            &|_| 0,
        )
        .await?;

    if outcome.changes_made {
        println!("Fixes applied successfully.");
        if let Some(backup) = outcome.backup_path {
            println!("Backup saved to: {}", backup.display());
        }
    } else {
        println!("No changes were made to the manifest.");
    }

    Ok(())
}

/// Filters the issue list down to those whose preferred fix installs and
/// tests cleanly in a disposable copy of the project.
async fn validate_in_sandbox(
    config: &DepsenseiConfig,
    project_root: &Path,
    issues: Vec<Issue>,
) -> anyhow::Result<Vec<Issue>> {
    let mut sandbox = SandboxManager::new(SandboxConfig::from_config(project_root, config));
    sandbox.create().await?;

    let mut validated = Vec::new();
    for issue in issues {
        let result = sandbox.test_fix(&issue.fixes[0]).await;
        if result.success {
            println!("Validated in {:?}: {}", result.duration, issue.fixes[0].description);
            validated.push(issue);
        } else {
            println!(
                "Rejected by sandbox: {} ({})",
                issue.fixes[0].description,
                result.error.unwrap_or_else(|| "no diagnostic output".to_string())
            );
        }
    }

    sandbox.cleanup();
    Ok(validated)
}
