//! HTTP repository resolution
//!
//! Resolves a chart against a Helm-style repository serving `index.yaml`

use crate::credentials::HttpClient;
use crate::error::{FetchError, Result};
use crate::fetch::ChartIdentity;
use crate::index::RepositoryIndex;
use crate::version::VersionOrdering;

/// Concrete archive location chosen from the index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpArtifact {
    /// Absolute archive URL
    pub download_url: String,
    /// Version string as written in the index
    pub version: String,
    /// Digest advertised by the index record, if any
    pub digest: Option<String>,
}

/// Resolves chart names against an HTTP repository index
pub struct HttpIndexResolver<'a> {
    client: &'a HttpClient,
    ordering: VersionOrdering,
}

impl<'a> HttpIndexResolver<'a> {
    /// Requests go through `client`, including any credentials it carries
    pub fn new(client: &'a HttpClient, ordering: VersionOrdering) -> Self {
        Self { client, ordering }
    }

    /// Fetch and parse `<repository>/index.yaml`
    pub async fn fetch_index(&self, repository_url: &str) -> Result<RepositoryIndex> {
        let url = index_url(repository_url);
        tracing::debug!(url = %url, auth = self.client.has_auth(), "fetching repository index");

        let data = self
            .client
            .get_bytes(&url)
            .await
            .map_err(|source| FetchError::IndexFetch {
                url: url.clone(),
                source,
            })?;

        RepositoryIndex::from_slice(&data, &url)
    }

    /// Resolve a chart name and optional version to a downloadable archive
    pub async fn resolve(&self, repository_url: &str, chart: &ChartIdentity) -> Result<HttpArtifact> {
        let index = self.fetch_index(repository_url).await?;
        let entry = index.select(&chart.name, chart.requested_version(), self.ordering)?;

        let url = entry
            .download_url()
            .ok_or_else(|| FetchError::MissingDownloadUrl {
                chart: chart.name.clone(),
                version: entry.version.clone(),
            })?;

        Ok(HttpArtifact {
            download_url: resolve_download_url(repository_url, url),
            version: entry.version.clone(),
            digest: entry.digest.clone(),
        })
    }
}

/// Index location for a repository (one trailing slash stripped)
pub fn index_url(repository_url: &str) -> String {
    format!("{}/index.yaml", strip_trailing_slash(repository_url))
}

/// Resolve an index URL entry against the repository base when it has no scheme
pub fn resolve_download_url(repository_url: &str, url: &str) -> String {
    if url.contains("://") {
        url.to_string()
    } else {
        format!(
            "{}/{}",
            strip_trailing_slash(repository_url),
            url.trim_start_matches('/')
        )
    }
}

fn strip_trailing_slash(url: &str) -> &str {
    url.strip_suffix('/').unwrap_or(url)
}
