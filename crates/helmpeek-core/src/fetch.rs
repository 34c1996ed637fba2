//! Chart fetch pipeline
//!
//! classify -> resolve -> create workspace -> retrieve -> unpack -> read.
//! The workspace is owned by the pipeline and removed on every exit path.

use std::sync::Arc;

use crate::archive;
use crate::config::FetchConfig;
use crate::credentials::{HttpClient, RepositoryAuth};
use crate::error::{FetchError, Result};
use crate::http::{HttpArtifact, HttpIndexResolver};
use crate::oci::{DistributionConnector, OciArtifact, OciResolver, RegistryConnector};
use crate::reader::{ChartData, read_chart};
use crate::retrieve::{download_to_workspace, write_blob};
use crate::transport::{RepositoryLocator, TransportKind};
use crate::workspace::Workspace;

/// Chart name plus an optional version; no version means latest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartIdentity {
    pub name: String,
    requested_version: Option<String>,
}

impl ChartIdentity {
    /// An empty version string is treated the same as no version
    pub fn new(name: impl Into<String>, version: Option<impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            requested_version: version.map(Into::into).filter(|v: &String| !v.is_empty()),
        }
    }

    pub fn requested_version(&self) -> Option<&str> {
        self.requested_version.as_deref()
    }
}

/// Concrete artifact a fetch resolved to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedArtifact {
    Http(HttpArtifact),
    Oci(OciArtifact),
}

impl ResolvedArtifact {
    pub fn version(&self) -> &str {
        match self {
            ResolvedArtifact::Http(a) => &a.version,
            ResolvedArtifact::Oci(a) => &a.version,
        }
    }

    pub fn transport(&self) -> TransportKind {
        match self {
            ResolvedArtifact::Http(_) => TransportKind::Http,
            ResolvedArtifact::Oci(_) => TransportKind::Oci,
        }
    }
}

/// Result of a fetch together with what it resolved to
#[derive(Debug, Clone)]
pub struct FetchedChart {
    pub artifact: ResolvedArtifact,
    pub data: ChartData,
}

/// Check the inputs required before any resolution happens
pub fn validate(repository_url: &str, chart_name: &str) -> Result<()> {
    if repository_url.trim().is_empty() {
        return Err(FetchError::Validation {
            field: "Repository URL",
        });
    }
    if chart_name.trim().is_empty() {
        return Err(FetchError::Validation {
            field: "Chart name",
        });
    }
    Ok(())
}

/// Fetches charts and reads their metadata and default values
///
/// Each call is independent: it gets its own workspace and shares nothing
/// mutable with concurrent calls apart from the HTTP connection pool.
pub struct ChartFetcher {
    config: FetchConfig,
    http: HttpClient,
    connector: Arc<dyn RegistryConnector>,
}

impl ChartFetcher {
    /// Create a fetcher using `oci-distribution` for registries
    pub fn new(config: FetchConfig) -> Result<Self> {
        let http = HttpClient::new(&config).map_err(|source| FetchError::Client { source })?;
        let connector = Arc::new(DistributionConnector::new(&config));
        Ok(Self {
            config,
            http,
            connector,
        })
    }

    /// Replace the registry connector
    pub fn with_connector(mut self, connector: Arc<dyn RegistryConnector>) -> Self {
        self.connector = connector;
        self
    }

    /// Fetch a chart and return its metadata and values
    pub async fn fetch(
        &self,
        repository_url: &str,
        chart: &ChartIdentity,
        auth: Option<&RepositoryAuth>,
    ) -> Result<ChartData> {
        Ok(self.fetch_detailed(repository_url, chart, auth).await?.data)
    }

    /// Fetch a chart, also reporting the artifact it resolved to
    pub async fn fetch_detailed(
        &self,
        repository_url: &str,
        chart: &ChartIdentity,
        auth: Option<&RepositoryAuth>,
    ) -> Result<FetchedChart> {
        validate(repository_url, &chart.name)?;

        let locator = RepositoryLocator::new(repository_url);
        tracing::debug!(
            url = %locator.url(),
            transport = %locator.kind(),
            chart = %chart.name,
            version = chart.requested_version().unwrap_or("latest"),
            "classified repository"
        );

        let fetched = match locator.kind() {
            TransportKind::Http => self.fetch_http(locator.url(), chart, auth).await?,
            TransportKind::Oci => self.fetch_oci(locator.url(), chart, auth).await?,
        };

        tracing::info!(
            chart = %chart.name,
            version = %fetched.artifact.version(),
            transport = %fetched.artifact.transport(),
            "fetched chart"
        );
        Ok(fetched)
    }

    async fn fetch_http(
        &self,
        repository_url: &str,
        chart: &ChartIdentity,
        auth: Option<&RepositoryAuth>,
    ) -> Result<FetchedChart> {
        let client = self.http.with_auth(auth);
        let artifact = HttpIndexResolver::new(&client, self.config.version_ordering)
            .resolve(repository_url, chart)
            .await?;
        tracing::debug!(
            chart = %chart.name,
            version = %artifact.version,
            url = %artifact.download_url,
            "resolved chart"
        );

        let workspace = self.create_workspace()?;
        let expected = artifact.digest.as_deref().filter(|_| self.config.verify_digests);
        download_to_workspace(&client, &artifact.download_url, &workspace, expected).await?;

        let data = unpack_and_read(workspace).await?;
        Ok(FetchedChart {
            artifact: ResolvedArtifact::Http(artifact),
            data,
        })
    }

    async fn fetch_oci(
        &self,
        repository_url: &str,
        chart: &ChartIdentity,
        auth: Option<&RepositoryAuth>,
    ) -> Result<FetchedChart> {
        let pulled = OciResolver::new(self.connector.as_ref(), self.config.version_ordering)
            .resolve(repository_url, chart, auth)
            .await?;
        let artifact = pulled.artifact;
        tracing::debug!(
            chart = %chart.name,
            version = %artifact.version,
            digest = %artifact.digest,
            "resolved chart"
        );

        let workspace = self.create_workspace()?;
        let locator = format!(
            "{}/{}@{}",
            artifact.registry, artifact.repository, artifact.digest
        );
        let expected = Some(artifact.digest.as_str()).filter(|_| self.config.verify_digests);
        write_blob(&pulled.blob, &locator, &workspace, expected).await?;

        let data = unpack_and_read(workspace).await?;
        Ok(FetchedChart {
            artifact: ResolvedArtifact::Oci(artifact),
            data,
        })
    }

    fn create_workspace(&self) -> Result<Workspace> {
        Workspace::create(self.config.workspace_root.as_deref())
    }
}

/// Unpack and read on the blocking pool; the workspace is dropped there too
async fn unpack_and_read(workspace: Workspace) -> Result<ChartData> {
    tokio::task::spawn_blocking(move || -> Result<ChartData> {
        let chart_dir = archive::unpack(workspace.path())?;
        tracing::debug!(path = %chart_dir.display(), "reading chart files");
        Ok(read_chart(&chart_dir))
    })
    .await
    .map_err(|e| FetchError::Archive {
        source: std::io::Error::other(e),
    })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::fixtures::chart_tgz;
    use crate::error::Stage;
    use crate::oci::testing::FakeRegistry;
    use crate::retrieve::sha256_hex;
    use serde_json::json;
    use std::path::Path;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CHART_YAML: &str = "apiVersion: v2\nname: nginx\nversion: 1.2.0\n";
    const VALUES_YAML: &str = "replicaCount: 2\nservice:\n  port: 80\n";

    fn is_empty_dir(path: &Path) -> bool {
        std::fs::read_dir(path)
            .map(|mut d| d.next().is_none())
            .unwrap_or(false)
    }

    fn config_in(root: &Path) -> FetchConfig {
        FetchConfig {
            workspace_root: Some(root.to_path_buf()),
            ..Default::default()
        }
    }

    async fn serve_chart(archive: Vec<u8>, digest: Option<&str>) -> MockServer {
        let server = MockServer::start().await;
        let digest_line = digest
            .map(|d| format!("      digest: {d}\n"))
            .unwrap_or_default();
        let index = format!(
            "apiVersion: v1\nentries:\n  nginx:\n    - version: \"1.2.0\"\n      urls:\n        - nginx-1.2.0.tgz\n{digest_line}"
        );

        Mock::given(method("GET"))
            .and(path("/index.yaml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(index))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/nginx-1.2.0.tgz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(archive))
            .mount(&server)
            .await;
        server
    }

    #[test]
    fn test_chart_identity_empty_version_is_latest() {
        assert_eq!(ChartIdentity::new("nginx", Some("")).requested_version(), None);
        assert_eq!(
            ChartIdentity::new("nginx", Some("1.0.0")).requested_version(),
            Some("1.0.0")
        );
    }

    #[test]
    fn test_validate() {
        assert!(validate("https://charts.example.com", "nginx").is_ok());

        let err = validate("", "nginx").unwrap_err();
        assert_eq!(err.to_string(), "Repository URL must be specified");
        assert_eq!(err.stage(), Stage::Validate);

        let err = validate("https://charts.example.com", " ").unwrap_err();
        assert_eq!(err.to_string(), "Chart name must be specified");
    }

    #[tokio::test]
    async fn test_fetch_http_end_to_end() {
        let archive = chart_tgz("nginx", Some(CHART_YAML), Some(VALUES_YAML));
        let server = serve_chart(archive, None).await;
        let root = tempfile::tempdir().unwrap();
        let fetcher = ChartFetcher::new(config_in(root.path())).unwrap();

        let fetched = fetcher
            .fetch_detailed(&server.uri(), &ChartIdentity::new("nginx", None::<String>), None)
            .await
            .unwrap();

        match &fetched.artifact {
            ResolvedArtifact::Http(a) => {
                assert_eq!(a.download_url, format!("{}/nginx-1.2.0.tgz", server.uri()));
                assert_eq!(a.version, "1.2.0");
            }
            other => panic!("unexpected artifact: {other:?}"),
        }
        assert_eq!(fetched.data.metadata.as_ref().unwrap()["name"], "nginx");
        assert_eq!(
            fetched.data.values,
            Some(json!({"replicaCount": 2, "service": {"port": 80}}))
        );
        assert!(is_empty_dir(root.path()));
    }

    #[tokio::test]
    async fn test_fetch_partial_chart() {
        let archive = chart_tgz("nginx", None, Some(VALUES_YAML));
        let server = serve_chart(archive, None).await;
        let root = tempfile::tempdir().unwrap();
        let fetcher = ChartFetcher::new(config_in(root.path())).unwrap();

        let data = fetcher
            .fetch(&server.uri(), &ChartIdentity::new("nginx", Some("1.2.0")), None)
            .await
            .unwrap();
        assert!(data.metadata.is_none());
        assert!(data.values.is_some());
    }

    #[tokio::test]
    async fn test_workspace_removed_after_unpack_failure() {
        let server = serve_chart(b"definitely not gzip".to_vec(), None).await;
        let root = tempfile::tempdir().unwrap();
        let fetcher = ChartFetcher::new(config_in(root.path())).unwrap();

        let err = fetcher
            .fetch(&server.uri(), &ChartIdentity::new("nginx", None::<String>), None)
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Stage::Unpack);
        assert!(is_empty_dir(root.path()));
    }

    #[tokio::test]
    async fn test_digest_verification() {
        let archive = chart_tgz("nginx", Some(CHART_YAML), Some(VALUES_YAML));
        let good = sha256_hex(&archive);
        let root = tempfile::tempdir().unwrap();

        let server = serve_chart(archive.clone(), Some(&good)).await;
        let fetcher = ChartFetcher::new(config_in(root.path())).unwrap();
        fetcher
            .fetch(&server.uri(), &ChartIdentity::new("nginx", None::<String>), None)
            .await
            .unwrap();

        let bad = "0".repeat(64);
        let server = serve_chart(archive, Some(&bad)).await;
        let err = fetcher
            .fetch(&server.uri(), &ChartIdentity::new("nginx", None::<String>), None)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::IntegrityCheckFailed { .. }));
        assert_eq!(err.stage(), Stage::Retrieve);
        assert!(is_empty_dir(root.path()));

        let lenient = ChartFetcher::new(FetchConfig {
            verify_digests: false,
            ..config_in(root.path())
        })
        .unwrap();
        lenient
            .fetch(&server.uri(), &ChartIdentity::new("nginx", None::<String>), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_fetch_http_with_auth() {
        let server = MockServer::start().await;
        Mock::given(path("/index.yaml"))
            .and(header("authorization", "Basic dXNlcjpwYXNz"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "entries:\n  nginx:\n    - version: 1.0.0\n      urls: [nginx.tgz]\n",
            ))
            .mount(&server)
            .await;
        Mock::given(path("/index.yaml"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(path("/nginx.tgz"))
            .and(header("authorization", "Basic dXNlcjpwYXNz"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(chart_tgz("nginx", Some(CHART_YAML), None)),
            )
            .mount(&server)
            .await;

        let root = tempfile::tempdir().unwrap();
        let fetcher = ChartFetcher::new(config_in(root.path())).unwrap();
        let chart = ChartIdentity::new("nginx", None::<String>);

        let err = fetcher.fetch(&server.uri(), &chart, None).await.unwrap_err();
        assert!(matches!(err, FetchError::IndexFetch { .. }));

        let auth = RepositoryAuth::new("user", "pass");
        let data = fetcher
            .fetch(&server.uri(), &chart, Some(&auth))
            .await
            .unwrap();
        assert!(data.metadata.is_some());
    }

    #[tokio::test]
    async fn test_fetch_oci_end_to_end() {
        let registry = FakeRegistry::default();
        registry.publish(
            "charts/redis",
            "1.0.0",
            chart_tgz("redis", Some("name: redis\nversion: 1.0.0\n"), None),
        );
        registry.publish(
            "charts/redis",
            "2.0.0",
            chart_tgz("redis", Some("name: redis\nversion: 2.0.0\n"), Some("auth: {}\n")),
        );

        let root = tempfile::tempdir().unwrap();
        let fetcher = ChartFetcher::new(config_in(root.path()))
            .unwrap()
            .with_connector(Arc::new(registry.clone()));

        let fetched = fetcher
            .fetch_detailed(
                "registry.example.com/charts",
                &ChartIdentity::new("redis", None::<String>),
                None,
            )
            .await
            .unwrap();

        assert_eq!(fetched.artifact.version(), "2.0.0");
        assert_eq!(fetched.artifact.transport(), TransportKind::Oci);
        assert_eq!(fetched.data.metadata.unwrap()["version"], "2.0.0");
        assert_eq!(fetched.data.values, Some(json!({"auth": {}})));
        assert!(is_empty_dir(root.path()));
    }

    #[tokio::test]
    async fn test_fetch_oci_corrupt_blob() {
        let registry = FakeRegistry::default();
        let digest = registry.publish("redis", "1.0.0", b"original".to_vec());
        registry
            .state
            .lock()
            .unwrap()
            .blobs
            .insert(digest, b"swapped".to_vec());

        let root = tempfile::tempdir().unwrap();
        let fetcher = ChartFetcher::new(config_in(root.path()))
            .unwrap()
            .with_connector(Arc::new(registry));

        let err = fetcher
            .fetch(
                "oci://registry.example.com",
                &ChartIdentity::new("redis", None::<String>),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::IntegrityCheckFailed { .. }));
        assert!(is_empty_dir(root.path()));
    }

    #[tokio::test]
    async fn test_concurrent_fetches_use_separate_workspaces() {
        let archive = chart_tgz("nginx", Some(CHART_YAML), Some(VALUES_YAML));
        let server = serve_chart(archive, None).await;
        let root = tempfile::tempdir().unwrap();
        let fetcher = ChartFetcher::new(config_in(root.path())).unwrap();
        let chart = ChartIdentity::new("nginx", None::<String>);

        let uri = server.uri();
        let (a, b, c) = futures::join!(
            fetcher.fetch(&uri, &chart, None),
            fetcher.fetch(&uri, &chart, None),
            fetcher.fetch(&uri, &chart, None),
        );
        assert_eq!(a.unwrap(), b.unwrap());
        assert!(c.is_ok());
        assert!(is_empty_dir(root.path()));
    }

    #[tokio::test]
    async fn test_validation_happens_before_network() {
        let fetcher = ChartFetcher::new(FetchConfig::default()).unwrap();
        let err = fetcher
            .fetch("", &ChartIdentity::new("nginx", None::<String>), None)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Validation { .. }));
    }
}
