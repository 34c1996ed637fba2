//! Repository index types
//!
//! Helm `index.yaml` format. Only `version` and `urls` drive resolution; the
//! remaining fields are carried for callers that want to display them, and a
//! value of the wrong shape in one of them falls back to its default instead
//! of failing the whole index.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

use crate::error::{FetchError, Result};
use crate::version::VersionOrdering;

/// Repository index (Helm-compatible)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryIndex {
    /// API version
    #[serde(default, deserialize_with = "lenient")]
    pub api_version: Option<String>,

    /// When this index was generated
    #[serde(default, deserialize_with = "lenient")]
    pub generated: Option<DateTime<Utc>>,

    /// Chart versions indexed by chart name
    #[serde(default)]
    pub entries: HashMap<String, Vec<ChartEntry>>,
}

impl RepositoryIndex {
    /// Parse index from raw bytes; `url` only labels the error
    pub fn from_slice(bytes: &[u8], url: &str) -> Result<Self> {
        serde_yaml::from_slice(bytes).map_err(|source| FetchError::IndexParse {
            url: url.to_string(),
            source,
        })
    }

    /// Get all versions of a chart
    pub fn get(&self, name: &str) -> Option<&[ChartEntry]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    /// Get a specific version of a chart (exact string match, first hit)
    pub fn get_version(&self, name: &str, version: &str) -> Option<&ChartEntry> {
        self.entries
            .get(name)?
            .iter()
            .find(|e| e.version == version)
    }

    /// Get the latest version of a chart under `ordering`
    pub fn get_latest(&self, name: &str, ordering: VersionOrdering) -> Option<&ChartEntry> {
        let versions = self.entries.get(name)?;
        ordering.latest_by(versions, |e| e.version.as_str())
    }

    /// Select the record for `name`, honoring an explicit version when given
    pub fn select(
        &self,
        name: &str,
        version: Option<&str>,
        ordering: VersionOrdering,
    ) -> Result<&ChartEntry> {
        if !self.entries.contains_key(name) {
            return Err(FetchError::ChartNotFound {
                chart: name.to_string(),
            });
        }

        match version {
            Some(version) => {
                self.get_version(name, version)
                    .ok_or_else(|| FetchError::VersionNotFound {
                        chart: name.to_string(),
                        version: version.to_string(),
                    })
            }
            None => self
                .get_latest(name, ordering)
                .ok_or_else(|| FetchError::NoVersionsAvailable {
                    chart: name.to_string(),
                }),
        }
    }

}

/// One version of a chart in the index
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartEntry {
    /// Chart name
    #[serde(default, deserialize_with = "lenient")]
    pub name: String,

    /// Chart version, compared as written
    #[serde(default)]
    pub version: String,

    /// Application version
    #[serde(default, deserialize_with = "lenient")]
    pub app_version: Option<String>,

    /// Description
    #[serde(default, deserialize_with = "lenient")]
    pub description: Option<String>,

    /// Home URL
    #[serde(default, deserialize_with = "lenient")]
    pub home: Option<String>,

    /// Icon URL
    #[serde(default, deserialize_with = "lenient")]
    pub icon: Option<String>,

    /// Source URLs
    #[serde(default, deserialize_with = "lenient")]
    pub sources: Vec<String>,

    /// Keywords
    #[serde(default, deserialize_with = "lenient")]
    pub keywords: Vec<String>,

    /// URLs to download the chart archive, absolute or relative to the repo
    #[serde(default)]
    pub urls: Vec<String>,

    /// SHA256 digest of the archive
    #[serde(default, deserialize_with = "lenient")]
    pub digest: Option<String>,

    /// Creation timestamp
    #[serde(default, deserialize_with = "lenient")]
    pub created: Option<DateTime<Utc>>,

    /// Deprecated flag
    #[serde(default, deserialize_with = "lenient")]
    pub deprecated: bool,

    /// Chart API version
    #[serde(default, deserialize_with = "lenient")]
    pub api_version: Option<String>,

    /// Chart type (application or library)
    #[serde(default, deserialize_with = "lenient")]
    pub r#type: Option<String>,
}

impl ChartEntry {
    /// Get the primary download URL
    pub fn download_url(&self) -> Option<&str> {
        self.urls.first().map(|s| s.as_str())
    }
}

/// Deserialize `T`, falling back to its default when the value has the wrong shape
fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = serde_yaml::Value::deserialize(deserializer)?;
    Ok(serde_yaml::from_value(value).unwrap_or_default())
}
