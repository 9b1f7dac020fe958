use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

pub const DEFAULT_REGISTRY_URL: &str = "https://registry.npmjs.org";
pub const DEFAULT_REGISTRY_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_PACKAGE_MANAGER: &str = "npm";

/// Runtime configuration, merged from global and project config files.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DepsenseiConfig {
    /// Base URL of the package registry used for metadata lookups.
    pub registry_url: String,
    /// Client-side deadline for a single registry lookup.
    pub registry_timeout_secs: u64,
    /// Deadline for package-manager subprocesses (install, test).
    pub command_timeout_secs: u64,
    /// Package-manager executable used for install/test subprocesses.
    pub package_manager: String,
}

impl Default for DepsenseiConfig {
    fn default() -> Self {
        Self {
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
            registry_timeout_secs: DEFAULT_REGISTRY_TIMEOUT_SECS,
            command_timeout_secs: DEFAULT_COMMAND_TIMEOUT_SECS,
            package_manager: DEFAULT_PACKAGE_MANAGER.to_string(),
        }
    }
}

impl DepsenseiConfig {
    /// Loads the merged configuration from the default global and project paths.
    ///
    /// # Errors
    ///
    /// Returns an error when an existing config file cannot be read or parsed.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_with_paths(global_config_path(), project_config_path())
    }

    fn load_with_paths(global: Option<PathBuf>, project: Option<PathBuf>) -> anyhow::Result<Self> {
        let mut config = Self::default();
        if let Some(path) = global {
            config.merge_from_path(&path)?;
        }
        if let Some(path) = project {
            config.merge_from_path(&path)?;
        }
        if let Ok(url) = env::var("DEPSENSEI_NPM_REGISTRY_BASE_URL") {
            config.registry_url = url;
        }
        Ok(config)
    }

    fn merge_from_path(&mut self, path: &Path) -> anyhow::Result<()> {
        if !path.exists() {
            return Ok(());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file at {}", path.display()))?;
        let overlay: ConfigOverlay = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config file at {}", path.display()))?;

        if let Some(registry_url) = overlay.registry_url {
            self.registry_url = registry_url;
        }
        if let Some(secs) = overlay.registry_timeout_secs {
            self.registry_timeout_secs = secs;
        }
        if let Some(secs) = overlay.command_timeout_secs {
            self.command_timeout_secs = secs;
        }
        if let Some(package_manager) = overlay.package_manager {
            self.package_manager = package_manager;
        }

        Ok(())
    }

    pub fn registry_timeout(&self) -> Duration {
        Duration::from_secs(self.registry_timeout_secs.max(1))
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs.max(1))
    }
}

/// Partial config used when merging file overlays.
#[derive(Debug, Default, Deserialize)]
struct ConfigOverlay {
    registry_url: Option<String>,
    registry_timeout_secs: Option<u64>,
    command_timeout_secs: Option<u64>,
    package_manager: Option<String>,
}

fn global_config_path() -> Option<PathBuf> {
    if let Some(explicit) = env::var_os("DEPSENSEI_CONFIG_GLOBAL_PATH") {
        return Some(PathBuf::from(explicit));
    }

    let home = env::var_os("HOME").or_else(|| env::var_os("USERPROFILE"))?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("depsensei")
            .join("config.toml"),
    )
}

fn project_config_path() -> Option<PathBuf> {
    if let Some(explicit) = env::var_os("DEPSENSEI_CONFIG_PROJECT_PATH") {
        return Some(PathBuf::from(explicit));
    }

    env::current_dir().ok().map(|dir| dir.join(".depsensei.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_temp_path(name: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system time")
            .as_nanos();
        std::env::temp_dir().join(format!("depsensei-{nanos}-{name}"))
    }

    #[test]
    fn defaults_apply_when_no_file_exists() {
        let config = DepsenseiConfig::load_with_paths(
            Some(unique_temp_path("missing-global.toml")),
            Some(unique_temp_path("missing-project.toml")),
        )
        .expect("load config");
        assert_eq!(config.registry_url, DEFAULT_REGISTRY_URL);
        assert_eq!(config.command_timeout_secs, DEFAULT_COMMAND_TIMEOUT_SECS);
        assert_eq!(config.package_manager, DEFAULT_PACKAGE_MANAGER);
    }

    #[test]
    fn project_overlay_wins_over_global() {
        let global = unique_temp_path("global.toml");
        let project = unique_temp_path("project.toml");
        fs::write(&global, "registry_url = \"https://global.example\"\n").expect("write global");
        fs::write(
            &project,
            "registry_url = \"https://project.example\"\ncommand_timeout_secs = 60\n",
        )
        .expect("write project");

        let config = DepsenseiConfig::load_with_paths(Some(global.clone()), Some(project.clone()))
            .expect("load config");
        assert_eq!(config.registry_url, "https://project.example");
        assert_eq!(config.command_timeout_secs, 60);

        let _ = fs::remove_file(global);
        let _ = fs::remove_file(project);
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let path = unique_temp_path("broken.toml");
        fs::write(&path, "registry_url = [not toml").expect("write config");
        let err = DepsenseiConfig::load_with_paths(Some(path.clone()), None)
            .expect_err("expected parse failure");
        assert!(err.to_string().contains("failed to parse config file"));
        let _ = fs::remove_file(path);
    }

    #[test]
    fn timeouts_are_clamped_to_at_least_one_second() {
        let mut config = DepsenseiConfig::default();
        config.registry_timeout_secs = 0;
        config.command_timeout_secs = 0;
        assert_eq!(config.registry_timeout(), Duration::from_secs(1));
        assert_eq!(config.command_timeout(), Duration::from_secs(1));
    }
}
