//! HTTP client for per-package registry metadata, memoized per run.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::RwLock;

/// Metadata for one package, as served by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageInfo {
    /// Version behind the `latest` dist-tag.
    pub latest: String,
    /// Deprecation notice, when the package (or its latest version) carries one.
    pub deprecated: Option<String>,
    /// All published version strings.
    pub versions: Vec<String>,
}

#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    #[error("registry lookup for '{package}' timed out")]
    Timeout { package: String },
    #[error("registry returned status {status} for '{package}'")]
    Unavailable { package: String, status: u16 },
    #[error("registry request for '{package}' failed: {message}")]
    Transport { package: String, message: String },
    #[error("registry returned invalid data for '{package}': {message}")]
    InvalidResponse { package: String, message: String },
}

/// Registry metadata client with a per-run read-through cache.
///
/// Successful lookups are memoized for the client's lifetime and never
/// invalidated mid-run; a run is short enough that staleness is immaterial.
/// Concurrent population of the same key is a benign race, last writer wins
/// with an equivalent value.
#[derive(Clone)]
pub struct RegistryClient {
    http: Client,
    base_url: String,
    cache: Arc<RwLock<HashMap<String, PackageInfo>>>,
}

impl RegistryClient {
    /// Builds a client against `base_url` with a fixed per-request deadline.
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self::with_http_client(http, base_url)
    }

    pub fn with_http_client(http: Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn encode_package_name(package: &str) -> String {
        package.replace('@', "%40").replace('/', "%2f")
    }

    /// Fetches metadata for `package`, serving repeats from the memo cache.
    ///
    /// # Errors
    ///
    /// `Timeout` after the client deadline, `Unavailable` for any non-2xx
    /// status, `InvalidResponse` for unparseable bodies.
    pub async fn fetch_info(&self, package: &str) -> Result<PackageInfo, RegistryError> {
        {
            let cache = self.cache.read().await;
            if let Some(info) = cache.get(package) {
                return Ok(info.clone());
            }
        }

        let url = format!("{}/{}", self.base_url, Self::encode_package_name(package));
        let response = self.http.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                RegistryError::Timeout {
                    package: package.to_string(),
                }
            } else {
                RegistryError::Transport {
                    package: package.to_string(),
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::Unavailable {
                package: package.to_string(),
                status: status.as_u16(),
            });
        }

        let body: NpmPackageResponse =
            response
                .json()
                .await
                .map_err(|e| RegistryError::InvalidResponse {
                    package: package.to_string(),
                    message: format!("failed to parse registry response JSON: {e}"),
                })?;

        let latest = body
            .dist_tags
            .latest
            .ok_or_else(|| RegistryError::InvalidResponse {
                package: package.to_string(),
                message: "missing dist-tags.latest".to_string(),
            })?;

        // The notice may live at the top level or on the latest version entry.
        let deprecated = body.deprecated.or_else(|| {
            body.versions
                .get(&latest)
                .and_then(|metadata| metadata.deprecated.clone())
        });

        let info = PackageInfo {
            latest,
            deprecated,
            versions: body.versions.into_keys().collect(),
        };

        let mut cache = self.cache.write().await;
        cache.insert(package.to_string(), info.clone());

        Ok(info)
    }
}

#[derive(Debug, Deserialize)]
struct NpmPackageResponse {
    #[serde(rename = "dist-tags", default)]
    dist_tags: NpmDistTags,
    deprecated: Option<String>,
    #[serde(default)]
    versions: BTreeMap<String, NpmVersionMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct NpmDistTags {
    latest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NpmVersionMetadata {
    deprecated: Option<String>,
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
