//! OCI registry resolution
//!
//! The resolver talks to registries only through [`RegistryClient`]; the
//! production implementation is backed by `oci-distribution`.

use async_trait::async_trait;
use oci_distribution::client::{Client, ClientConfig, ClientProtocol};
use oci_distribution::manifest::OciDescriptor;
use oci_distribution::secrets::RegistryAuth;
use oci_distribution::{Reference, RegistryOperation};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::FetchConfig;
use crate::credentials::RepositoryAuth;
use crate::error::{BoxError, FetchError, Result};
use crate::fetch::ChartIdentity;
use crate::transport::OciLocation;
use crate::version::VersionOrdering;

/// Media types for Helm charts in OCI
pub mod media_types {
    /// Helm chart content layer
    pub const HELM_CONTENT: &str = "application/vnd.cncf.helm.chart.content.v1.tar+gzip";
}

/// Failure reported by a registry client
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry request failed")]
    Request(#[source] BoxError),

    #[error("{0}")]
    Message(String),
}

impl RegistryError {
    pub fn request(e: impl std::error::Error + Send + Sync + 'static) -> Self {
        RegistryError::Request(Box::new(e))
    }
}

/// Image manifest, reduced to its layer list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default)]
    pub layers: Vec<Layer>,
}

/// Content descriptor of one manifest layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    pub digest: String,
    #[serde(default)]
    pub media_type: String,
    #[serde(default)]
    pub size: i64,
}

/// Connection to one registry host
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Exchange the credentials given at connect time for pull access
    async fn login(&self, repository: &str) -> std::result::Result<(), RegistryError>;

    /// List all tags of a repository
    async fn list_tags(&self, repository: &str) -> std::result::Result<Vec<String>, RegistryError>;

    /// Fetch the image manifest for a tag
    async fn get_manifest(
        &self,
        repository: &str,
        tag: &str,
    ) -> std::result::Result<Manifest, RegistryError>;

    /// Download a blob by digest
    async fn get_blob(
        &self,
        repository: &str,
        digest: &str,
    ) -> std::result::Result<Vec<u8>, RegistryError>;
}

/// Opens [`RegistryClient`] connections
pub trait RegistryConnector: Send + Sync {
    fn connect(
        &self,
        registry: &str,
        auth: Option<&RepositoryAuth>,
    ) -> std::result::Result<Box<dyn RegistryClient>, RegistryError>;
}

/// Concrete chart artifact in a registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OciArtifact {
    pub registry: String,
    /// Repository path including the chart name
    pub repository: String,
    /// Resolved tag
    pub version: String,
    /// Digest of the first manifest layer
    pub digest: String,
    pub media_type: String,
}

/// Resolved artifact plus the blob pulled for it
#[derive(Debug, Clone)]
pub struct PulledChart {
    pub artifact: OciArtifact,
    pub blob: Vec<u8>,
}

/// Resolves and pulls charts from an OCI registry
pub struct OciResolver<'a> {
    connector: &'a dyn RegistryConnector,
    ordering: VersionOrdering,
}

impl<'a> OciResolver<'a> {
    pub fn new(connector: &'a dyn RegistryConnector, ordering: VersionOrdering) -> Self {
        Self {
            connector,
            ordering,
        }
    }

    /// Resolve a chart to a layer digest and pull that blob
    pub async fn resolve(
        &self,
        repository_url: &str,
        chart: &ChartIdentity,
        auth: Option<&RepositoryAuth>,
    ) -> Result<PulledChart> {
        let location = OciLocation::parse(repository_url);
        let repository = location.repository_for(&chart.name);
        let auth = auth.filter(|a| a.is_complete());

        let client = self
            .connector
            .connect(&location.registry, auth)
            .map_err(|source| FetchError::RegistryAuth {
                registry: location.registry.clone(),
                source,
            })?;

        if auth.is_some() {
            tracing::debug!(registry = %location.registry, "logging in to registry");
            client
                .login(&repository)
                .await
                .map_err(|source| FetchError::RegistryAuth {
                    registry: location.registry.clone(),
                    source,
                })?;
        }

        let tags = client
            .list_tags(&repository)
            .await
            .map_err(|source| FetchError::TagList {
                repository: repository.clone(),
                source,
            })?;
        tracing::debug!(repository = %repository, tags = tags.len(), "listed tags");

        let version = self.select_tag(&chart.name, chart.requested_version(), &tags)?;

        let manifest = client
            .get_manifest(&repository, &version)
            .await
            .map_err(|source| FetchError::ManifestFetch {
                repository: repository.clone(),
                tag: version.clone(),
                source,
            })?;

        let layer = manifest
            .layers
            .into_iter()
            .next()
            .ok_or_else(|| FetchError::EmptyManifest {
                repository: repository.clone(),
                tag: version.clone(),
            })?;

        if layer.media_type != media_types::HELM_CONTENT {
            tracing::debug!(
                media_type = %layer.media_type,
                "first layer is not a Helm chart content layer"
            );
        }

        let blob = client
            .get_blob(&repository, &layer.digest)
            .await
            .map_err(|source| FetchError::BlobFetch {
                repository: repository.clone(),
                digest: layer.digest.clone(),
                source,
            })?;

        Ok(PulledChart {
            artifact: OciArtifact {
                registry: location.registry,
                repository,
                version,
                digest: layer.digest,
                media_type: layer.media_type,
            },
            blob,
        })
    }

    fn select_tag(&self, chart: &str, requested: Option<&str>, tags: &[String]) -> Result<String> {
        match requested {
            Some(version) => {
                if tags.iter().any(|t| t == version) {
                    Ok(version.to_string())
                } else {
                    Err(FetchError::VersionNotFound {
                        chart: chart.to_string(),
                        version: version.to_string(),
                    })
                }
            }
            None => self
                .ordering
                .latest(tags)
                .map(str::to_string)
                .ok_or_else(|| FetchError::NoVersionsAvailable {
                    chart: chart.to_string(),
                }),
        }
    }
}

/// [`RegistryConnector`] backed by `oci-distribution`
#[derive(Debug, Clone)]
pub struct DistributionConnector {
    insecure_registries: Vec<String>,
    timeout: Duration,
    user_agent: &'static str,
}

impl DistributionConnector {
    pub fn new(config: &FetchConfig) -> Self {
        Self {
            insecure_registries: config.insecure_registries.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            // `ClientConfig` only takes a static string; one per fetcher
            user_agent: Box::leak(config.user_agent.clone().into_boxed_str()),
        }
    }

    fn client_config(&self, registry: &str) -> ClientConfig {
        let protocol = if self.insecure_registries.iter().any(|h| h == registry) {
            ClientProtocol::Http
        } else {
            ClientProtocol::Https
        };
        ClientConfig {
            protocol,
            read_timeout: Some(self.timeout),
            connect_timeout: Some(self.timeout),
            user_agent: self.user_agent,
            ..Default::default()
        }
    }
}

impl RegistryConnector for DistributionConnector {
    fn connect(
        &self,
        registry: &str,
        auth: Option<&RepositoryAuth>,
    ) -> std::result::Result<Box<dyn RegistryClient>, RegistryError> {
        if registry.is_empty() {
            return Err(RegistryError::Message("registry host is empty".to_string()));
        }

        let client = Client::new(self.client_config(registry));

        let auth = match auth {
            Some(a) if a.is_complete() => RegistryAuth::Basic(a.username.clone(), a.password.clone()),
            _ => RegistryAuth::Anonymous,
        };

        Ok(Box::new(DistributionClient {
            registry: registry.to_string(),
            client,
            auth,
        }))
    }
}

struct DistributionClient {
    registry: String,
    client: Client,
    auth: RegistryAuth,
}

impl DistributionClient {
    fn tag_reference(&self, repository: &str, tag: &str) -> Reference {
        Reference::with_tag(self.registry.clone(), repository.to_string(), tag.to_string())
    }
}

#[async_trait]
impl RegistryClient for DistributionClient {
    async fn login(&self, repository: &str) -> std::result::Result<(), RegistryError> {
        let reference = self.tag_reference(repository, "latest");
        self.client
            .auth(&reference, &self.auth, RegistryOperation::Pull)
            .await
            .map_err(RegistryError::request)?;
        Ok(())
    }

    async fn list_tags(&self, repository: &str) -> std::result::Result<Vec<String>, RegistryError> {
        let reference = self.tag_reference(repository, "latest");
        let response = self
            .client
            .list_tags(&reference, &self.auth, None, None)
            .await
            .map_err(RegistryError::request)?;
        Ok(response.tags)
    }

    async fn get_manifest(
        &self,
        repository: &str,
        tag: &str,
    ) -> std::result::Result<Manifest, RegistryError> {
        let reference = self.tag_reference(repository, tag);
        let (manifest, _digest) = self
            .client
            .pull_image_manifest(&reference, &self.auth)
            .await
            .map_err(RegistryError::request)?;

        Ok(Manifest {
            layers: manifest
                .layers
                .into_iter()
                .map(|l| Layer {
                    digest: l.digest,
                    media_type: l.media_type,
                    size: l.size,
                })
                .collect(),
        })
    }

    async fn get_blob(
        &self,
        repository: &str,
        digest: &str,
    ) -> std::result::Result<Vec<u8>, RegistryError> {
        let reference = Reference::with_digest(
            self.registry.clone(),
            repository.to_string(),
            digest.to_string(),
        );
        let descriptor = OciDescriptor {
            digest: digest.to_string(),
            media_type: media_types::HELM_CONTENT.to_string(),
            ..Default::default()
        };

        let mut blob = Vec::new();
        self.client
            .pull_blob(&reference, &descriptor, &mut blob)
            .await
            .map_err(RegistryError::request)?;
        Ok(blob)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory registry used by unit tests

    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    pub struct FakeRegistryState {
        pub tags: HashMap<String, Vec<String>>,
        pub manifests: HashMap<(String, String), Manifest>,
        pub blobs: HashMap<String, Vec<u8>>,
        pub accepted_auth: Option<RepositoryAuth>,
        pub connections: Vec<(String, Option<RepositoryAuth>)>,
        pub logins: usize,
    }

    /// Connector whose clients all share one in-memory state
    #[derive(Clone, Default)]
    pub struct FakeRegistry {
        pub state: Arc<Mutex<FakeRegistryState>>,
    }

    impl FakeRegistry {
        /// Publish `blob` as the single layer of `repository:tag`
        pub fn publish(&self, repository: &str, tag: &str, blob: Vec<u8>) -> String {
            let digest = format!("sha256:{}", crate::retrieve::sha256_hex(&blob));
            let mut state = self.state.lock().unwrap();
            state
                .tags
                .entry(repository.to_string())
                .or_default()
                .push(tag.to_string());
            state.manifests.insert(
                (repository.to_string(), tag.to_string()),
                Manifest {
                    layers: vec![Layer {
                        digest: digest.clone(),
                        media_type: media_types::HELM_CONTENT.to_string(),
                        size: blob.len() as i64,
                    }],
                },
            );
            state.blobs.insert(digest.clone(), blob);
            digest
        }
    }

    struct FakeClient {
        auth: Option<RepositoryAuth>,
        state: Arc<Mutex<FakeRegistryState>>,
    }

    impl RegistryConnector for FakeRegistry {
        fn connect(
            &self,
            registry: &str,
            auth: Option<&RepositoryAuth>,
        ) -> std::result::Result<Box<dyn RegistryClient>, RegistryError> {
            self.state
                .lock()
                .unwrap()
                .connections
                .push((registry.to_string(), auth.cloned()));
            Ok(Box::new(FakeClient {
                auth: auth.cloned(),
                state: self.state.clone(),
            }))
        }
    }

    #[async_trait]
    impl RegistryClient for FakeClient {
        async fn login(&self, _repository: &str) -> std::result::Result<(), RegistryError> {
            let mut state = self.state.lock().unwrap();
            state.logins += 1;
            if state.accepted_auth.is_some() && state.accepted_auth != self.auth {
                return Err(RegistryError::Message("unauthorized".to_string()));
            }
            Ok(())
        }

        async fn list_tags(
            &self,
            repository: &str,
        ) -> std::result::Result<Vec<String>, RegistryError> {
            self.state
                .lock()
                .unwrap()
                .tags
                .get(repository)
                .cloned()
                .ok_or_else(|| RegistryError::Message(format!("name unknown: {repository}")))
        }

        async fn get_manifest(
            &self,
            repository: &str,
            tag: &str,
        ) -> std::result::Result<Manifest, RegistryError> {
            self.state
                .lock()
                .unwrap()
                .manifests
                .get(&(repository.to_string(), tag.to_string()))
                .cloned()
                .ok_or_else(|| RegistryError::Message("manifest unknown".to_string()))
        }

        async fn get_blob(
            &self,
            _repository: &str,
            digest: &str,
        ) -> std::result::Result<Vec<u8>, RegistryError> {
            self.state
                .lock()
                .unwrap()
                .blobs
                .get(digest)
                .cloned()
                .ok_or_else(|| RegistryError::Message("blob unknown".to_string()))
        }
    }
}
