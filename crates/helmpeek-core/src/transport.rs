//! Repository transport classification
//!
//! Anything that is not an `http://` or `https://` URL is treated as an OCI
//! registry reference, with or without the `oci://` scheme.

use serde::{Deserialize, Serialize};
use std::fmt;

const OCI_SCHEME: &str = "oci://";

/// How a repository is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Chart repository serving an `index.yaml`
    Http,
    /// OCI-compliant registry
    Oci,
}

impl TransportKind {
    /// Classify a repository URL (case-sensitive prefix match, never fails)
    pub fn classify(url: &str) -> Self {
        if url.starts_with("http://") || url.starts_with("https://") {
            TransportKind::Http
        } else {
            TransportKind::Oci
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Http => f.write_str("http"),
            TransportKind::Oci => f.write_str("oci"),
        }
    }
}

/// Strip at most one leading `oci://`
pub fn normalize_oci_url(url: &str) -> &str {
    url.strip_prefix(OCI_SCHEME).unwrap_or(url)
}

/// A repository URL together with its transport kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryLocator {
    url: String,
    kind: TransportKind,
}

impl RepositoryLocator {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        let kind = TransportKind::classify(&url);
        Self { url, kind }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }
}

/// Registry host and optional namespace parsed from an OCI repository URL
///
/// `oci://ghcr.io/myorg/charts` -> host `ghcr.io`, namespace `myorg/charts`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OciLocation {
    pub registry: String,
    pub namespace: Option<String>,
}

impl OciLocation {
    /// Split a (possibly `oci://`-prefixed) URL on its first `/`
    pub fn parse(url: &str) -> Self {
        let clean = normalize_oci_url(url);
        match clean.split_once('/') {
            Some((registry, rest)) => {
                let rest = rest.trim_end_matches('/');
                Self {
                    registry: registry.to_string(),
                    namespace: (!rest.is_empty()).then(|| rest.to_string()),
                }
            }
            None => Self {
                registry: clean.to_string(),
                namespace: None,
            },
        }
    }

    /// Repository path of a chart inside this location
    pub fn repository_for(&self, chart: &str) -> String {
        match &self.namespace {
            Some(namespace) => format!("{}/{}", namespace, chart),
            None => chart.to_string(),
        }
    }
}
