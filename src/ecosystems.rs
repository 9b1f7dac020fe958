//! Ecosystem plugin catalog.
//!
//! The pipeline is written against this capability set so further
//! manifest-plus-lockfile package managers can slot in without touching the
//! analyzer/fixer core.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::analyzer::{self, AnalyzeError, Analyzer};
use crate::config::DepsenseiConfig;
use crate::fixer::Fixer;
use crate::registry::RegistryClient;
use crate::types::{AnalysisReport, Fix, Issue};

#[async_trait]
pub trait EcosystemPlugin: Send + Sync {
    fn key(&self) -> &'static str;
    /// Whether a parseable manifest for this ecosystem exists at the root.
    fn detect(&self, project_root: &Path) -> bool;
    async fn analyze(&self, project_root: &Path) -> Result<AnalysisReport, AnalyzeError>;
    fn can_fix(&self, issue: &Issue) -> bool;
    async fn generate_fixes(&self, issue: &Issue) -> Vec<Fix>;
}

/// npm-family ecosystem: `package.json` + `package-lock.json`.
pub struct JavascriptPlugin {
    analyzer: Analyzer,
    fixer: Fixer,
}

impl JavascriptPlugin {
    /// Analyzer and fixer share one registry client, so fix generation reuses
    /// the metadata memoized during analysis.
    pub fn new(registry: RegistryClient) -> Self {
        Self {
            analyzer: Analyzer::new(registry.clone()),
            fixer: Fixer::new(registry),
        }
    }
}

#[async_trait]
impl EcosystemPlugin for JavascriptPlugin {
    fn key(&self) -> &'static str {
        analyzer::ECOSYSTEM
    }

    fn detect(&self, project_root: &Path) -> bool {
        Analyzer::detect(project_root)
    }

    async fn analyze(&self, project_root: &Path) -> Result<AnalysisReport, AnalyzeError> {
        self.analyzer.analyze(project_root).await
    }

    fn can_fix(&self, issue: &Issue) -> bool {
        Fixer::can_fix(issue)
    }

    async fn generate_fixes(&self, issue: &Issue) -> Vec<Fix> {
        self.fixer.generate_fixes(issue).await
    }
}

/// Runtime catalog of registered ecosystem plugins, keyed by name.
pub struct EcosystemCatalog {
    plugins_by_key: HashMap<&'static str, Arc<dyn EcosystemPlugin>>,
    keys: Vec<&'static str>,
}

impl EcosystemCatalog {
    pub fn with_plugins(plugins: Vec<Arc<dyn EcosystemPlugin>>) -> Self {
        let keys = plugins.iter().map(|plugin| plugin.key()).collect();
        let plugins_by_key = plugins
            .into_iter()
            .map(|plugin| (plugin.key(), plugin))
            .collect();
        Self {
            plugins_by_key,
            keys,
        }
    }

    pub fn plugin(&self, key: &str) -> Option<&Arc<dyn EcosystemPlugin>> {
        let normalized = key.to_ascii_lowercase();
        self.plugins_by_key.get(normalized.as_str())
    }

    /// Registered ecosystem keys, in registration order.
    pub fn keys(&self) -> &[&'static str] {
        &self.keys
    }

    pub fn default_key(&self) -> &'static str {
        self.keys.first().copied().unwrap_or(analyzer::ECOSYSTEM)
    }
}

/// Builds the catalog of ecosystems wired into this application build.
pub fn default_catalog(config: &DepsenseiConfig) -> EcosystemCatalog {
    let registry = RegistryClient::new(&config.registry_url, config.registry_timeout());
    EcosystemCatalog::with_plugins(vec![Arc::new(JavascriptPlugin::new(registry))])
}
