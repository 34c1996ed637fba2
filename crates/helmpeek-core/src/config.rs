//! Fetch configuration
//!
//! Read from `~/.config/helmpeek/config.yaml` when present

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{FetchError, Result};
use crate::version::VersionOrdering;

/// Settings shared by every fetch made through one [`crate::ChartFetcher`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FetchConfig {
    /// Per-request HTTP timeout
    pub timeout_secs: u64,

    /// Redirects followed before giving up
    pub max_redirects: u32,

    /// User-Agent sent to chart repositories
    pub user_agent: String,

    /// Parent directory for workspaces (system temp dir when unset)
    pub workspace_root: Option<PathBuf>,

    /// How "latest" is chosen
    pub version_ordering: VersionOrdering,

    /// Verify SHA-256 digests advertised by the index or manifest
    pub verify_digests: bool,

    /// Registry hosts reached over plain HTTP
    pub insecure_registries: Vec<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_redirects: 10,
            user_agent: format!("helmpeek/{}", env!("CARGO_PKG_VERSION")),
            workspace_root: None,
            version_ordering: VersionOrdering::default(),
            verify_digests: true,
            insecure_registries: Vec::new(),
        }
    }
}

impl FetchConfig {
    /// Load configuration from default location
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| FetchError::Config {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_yaml(&content).map_err(|e| match e {
            FetchError::Config { message, .. } => FetchError::Config {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })
    }

    /// Parse configuration from YAML; an empty document yields defaults
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).map_err(|e| FetchError::Config {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })
    }

    /// Get default configuration path
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("helmpeek").join("config.yaml"))
    }

    /// Whether a registry host should be contacted over plain HTTP
    pub fn is_insecure_registry(&self, registry: &str) -> bool {
        self.insecure_registries.iter().any(|h| h == registry)
    }
}
