//! Repository credentials and the authenticated HTTP client
//!
//! Key security features:
//! - Basic auth is attached only when both username and password are set
//! - Credentials are NEVER sent after a cross-origin redirect
//! - Passwords never appear in `Debug` output

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::config::FetchConfig;
use crate::error::{FetchError, Result};
use crate::transport::TransportKind;

/// Username/password pair for one transport
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryAuth {
    pub username: String,
    pub password: String,
}

impl RepositoryAuth {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Both halves are present
    pub fn is_complete(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }

    /// `Authorization` header value for HTTP basic auth
    pub fn basic_header(&self) -> String {
        let encoded = base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            format!("{}:{}", self.username, self.password),
        );
        format!("Basic {}", encoded)
    }
}

impl fmt::Debug for RepositoryAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryAuth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Stored credential record with one pair per transport
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    /// Username for HTTP chart repositories
    #[serde(default)]
    pub username: String,
    /// Password for HTTP chart repositories
    #[serde(default)]
    pub password: String,
    /// Username for OCI registries
    #[serde(default)]
    pub registry_username: String,
    /// Password for OCI registries
    #[serde(default)]
    pub registry_password: String,
}

/// Environment variables read by [`Credentials::from_env`]
pub mod env_vars {
    pub const USERNAME: &str = "HELMPEEK_USERNAME";
    pub const PASSWORD: &str = "HELMPEEK_PASSWORD";
    pub const REGISTRY_USERNAME: &str = "HELMPEEK_REGISTRY_USERNAME";
    pub const REGISTRY_PASSWORD: &str = "HELMPEEK_REGISTRY_PASSWORD";
}

impl Credentials {
    /// Load from the default file when present, otherwise from the environment
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::from_env()),
        }
    }

    /// Load a credential record from a YAML file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| FetchError::Config {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        serde_yaml::from_str(&content).map_err(|e| FetchError::Config {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Read the credential record from `HELMPEEK_*` environment variables
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).unwrap_or_default();
        Self {
            username: var(env_vars::USERNAME),
            password: var(env_vars::PASSWORD),
            registry_username: var(env_vars::REGISTRY_USERNAME),
            registry_password: var(env_vars::REGISTRY_PASSWORD),
        }
    }

    /// Default credentials file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("helmpeek").join("credentials.yaml"))
    }

    /// Pick the pair matching the transport kind
    pub fn for_transport(&self, kind: TransportKind) -> RepositoryAuth {
        match kind {
            TransportKind::Http => RepositoryAuth::new(&self.username, &self.password),
            TransportKind::Oci => {
                RepositoryAuth::new(&self.registry_username, &self.registry_password)
            }
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("registry_username", &self.registry_username)
            .field("registry_password", &"<redacted>")
            .finish()
    }
}

/// HTTP transport failures
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Authentication required for {url}")]
    AuthRequired { url: String },

    #[error("Access denied to {url}")]
    AccessDenied { url: String },

    #[error("Too many redirects (max {max})")]
    TooManyRedirects { max: u32 },

    #[error("Redirect from {url} without Location header")]
    MissingLocation { url: String },

    #[error("Invalid URL {url}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Network error")]
    Network(#[from] reqwest::Error),
}

/// HTTP client that follows redirects itself so auth never leaks cross-origin
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    auth: Option<RepositoryAuth>,
    max_redirects: u32,
}

impl HttpClient {
    /// Create a client without credentials
    pub fn new(config: &FetchConfig) -> std::result::Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            // Redirects are handled in `get` so credentials can be dropped
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            auth: None,
            max_redirects: config.max_redirects,
        })
    }

    /// Same connection pool, with credentials attached when complete
    pub fn with_auth(&self, auth: Option<&RepositoryAuth>) -> Self {
        Self {
            client: self.client.clone(),
            auth: auth.filter(|a| a.is_complete()).cloned(),
            max_redirects: self.max_redirects,
        }
    }

    /// Whether requests carry basic auth
    pub fn has_auth(&self) -> bool {
        self.auth.is_some()
    }

    /// GET a URL, failing on any non-2xx final status
    pub async fn get(&self, url: &str) -> std::result::Result<reqwest::Response, HttpError> {
        let mut current_url = url.to_string();
        let mut redirects = 0;

        loop {
            let mut request = self.client.get(&current_url);

            // Add auth ONLY if same origin as original URL
            if let Some(auth) = &self.auth {
                if same_origin(url, &current_url) {
                    request = request.header(reqwest::header::AUTHORIZATION, auth.basic_header());
                } else {
                    tracing::warn!(
                        from = %url,
                        to = %current_url,
                        "cross-origin redirect, credentials not forwarded"
                    );
                }
            }

            let response = request.send().await?;
            let status = response.status();

            if status.is_redirection() {
                redirects += 1;
                if redirects > self.max_redirects {
                    return Err(HttpError::TooManyRedirects {
                        max: self.max_redirects,
                    });
                }

                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| HttpError::MissingLocation {
                        url: current_url.clone(),
                    })?;

                let base = parse_url(&current_url)?;
                let next = base.join(location).map_err(|source| HttpError::InvalidUrl {
                    url: location.to_string(),
                    source,
                })?;
                tracing::debug!(from = %current_url, to = %next, "following redirect");
                current_url = next.to_string();
                continue;
            }

            if status == reqwest::StatusCode::UNAUTHORIZED {
                return Err(HttpError::AuthRequired { url: current_url });
            }
            if status == reqwest::StatusCode::FORBIDDEN {
                return Err(HttpError::AccessDenied { url: current_url });
            }
            if !status.is_success() {
                return Err(HttpError::Status {
                    url: current_url,
                    status: status.as_u16(),
                });
            }

            return Ok(response);
        }
    }

    /// Fetch a URL fully into memory
    pub async fn get_bytes(&self, url: &str) -> std::result::Result<Vec<u8>, HttpError> {
        let response = self.get(url).await?;
        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}

fn parse_url(url: &str) -> std::result::Result<Url, HttpError> {
    Url::parse(url).map_err(|source| HttpError::InvalidUrl {
        url: url.to_string(),
        source,
    })
}

/// Check if two URLs are same-origin (for redirect safety)
pub fn same_origin(url1: &str, url2: &str) -> bool {
    match (Url::parse(url1), Url::parse(url2)) {
        (Ok(u1), Ok(u2)) => {
            u1.scheme() == u2.scheme()
                && u1.host() == u2.host()
                && u1.port_or_known_default() == u2.port_or_known_default()
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_same_origin() {
        assert!(same_origin(
            "https://example.com/foo",
            "https://example.com/bar"
        ));
        assert!(same_origin(
            "https://example.com:443/foo",
            "https://example.com/bar"
        ));
        assert!(!same_origin("https://example.com/foo", "https://other.com/bar"));
        assert!(!same_origin("https://example.com/foo", "http://example.com/bar"));
        assert!(!same_origin(
            "https://example.com/foo",
            "https://example.com:8443/bar"
        ));
    }

    #[test]
    fn test_auth_completeness() {
        assert!(RepositoryAuth::new("user", "pass").is_complete());
        assert!(!RepositoryAuth::new("user", "").is_complete());
        assert!(!RepositoryAuth::new("", "pass").is_complete());
    }

    #[test]
    fn test_basic_header() {
        let auth = RepositoryAuth::new("user", "pass");
        assert_eq!(auth.basic_header(), "Basic dXNlcjpwYXNz");
    }

    #[test]
    fn test_debug_redacts_passwords() {
        let creds = Credentials {
            username: "user".to_string(),
            password: "hunter2".to_string(),
            registry_username: "robot".to_string(),
            registry_password: "s3cret".to_string(),
        };
        let rendered = format!("{:?} {:?}", creds, creds.for_transport(TransportKind::Http));
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("robot"));
    }

    #[test]
    fn test_for_transport() {
        let creds: Credentials = serde_yaml::from_str(
            "username: user\npassword: pass\nregistryUsername: robot\nregistryPassword: token\n",
        )
        .unwrap();
        assert_eq!(
            creds.for_transport(TransportKind::Http),
            RepositoryAuth::new("user", "pass")
        );
        assert_eq!(
            creds.for_transport(TransportKind::Oci),
            RepositoryAuth::new("robot", "token")
        );
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("credentials.yaml");
        std::fs::write(&file, "registryUsername: robot\nregistryPassword: token\n").unwrap();

        let creds = Credentials::load_from(&file).unwrap();
        assert!(creds.for_transport(TransportKind::Oci).is_complete());
        assert!(!creds.for_transport(TransportKind::Http).is_complete());

        let missing = Credentials::load_from(&dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(missing, FetchError::Config { .. }));
    }

    #[test]
    fn test_incomplete_auth_is_dropped() {
        let client = HttpClient::new(&FetchConfig::default()).unwrap();
        assert!(!client.with_auth(Some(&RepositoryAuth::new("user", ""))).has_auth());
        assert!(client.with_auth(Some(&RepositoryAuth::new("user", "pass"))).has_auth());
        assert!(!client.with_auth(None).has_auth());
    }

    #[tokio::test]
    async fn test_basic_auth_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/index.yaml"))
            .and(header("authorization", "Basic dXNlcjpwYXNz"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let client = HttpClient::new(&FetchConfig::default())
            .unwrap()
            .with_auth(Some(&RepositoryAuth::new("user", "pass")));
        let body = client
            .get_bytes(&format!("{}/index.yaml", server.uri()))
            .await
            .unwrap();
        assert_eq!(body, b"ok");
    }

    #[tokio::test]
    async fn test_status_errors() {
        let server = MockServer::start().await;
        Mock::given(path("/private"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = HttpClient::new(&FetchConfig::default()).unwrap();
        let err = client
            .get(&format!("{}/private", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::AuthRequired { .. }));

        let err = client
            .get(&format!("{}/missing", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_follows_same_origin_redirect() {
        let server = MockServer::start().await;
        Mock::given(path("/old/index.yaml"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/new/index.yaml"))
            .mount(&server)
            .await;
        Mock::given(path("/new/index.yaml"))
            .and(header("authorization", "Basic dXNlcjpwYXNz"))
            .respond_with(ResponseTemplate::new(200).set_body_string("moved"))
            .mount(&server)
            .await;

        let client = HttpClient::new(&FetchConfig::default())
            .unwrap()
            .with_auth(Some(&RepositoryAuth::new("user", "pass")));
        let body = client
            .get_bytes(&format!("{}/old/index.yaml", server.uri()))
            .await
            .unwrap();
        assert_eq!(body, b"moved");
    }

    #[tokio::test]
    async fn test_redirect_limit() {
        let server = MockServer::start().await;
        Mock::given(path("/loop"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/loop"))
            .mount(&server)
            .await;

        let config = FetchConfig {
            max_redirects: 3,
            ..FetchConfig::default()
        };
        let client = HttpClient::new(&config).unwrap();
        let err = client
            .get(&format!("{}/loop", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::TooManyRedirects { max: 3 }));
    }
}
