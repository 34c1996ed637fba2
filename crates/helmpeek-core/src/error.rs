//! Error types for chart resolution and retrieval

use std::fmt;

use thiserror::Error;

use crate::credentials::HttpError;
use crate::oci::RegistryError;

/// Boxed cause for failures that can originate in more than one layer
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Chart fetch errors
#[derive(Debug, Error)]
pub enum FetchError {
    // ============ Input Errors ============
    #[error("{field} must be specified")]
    Validation { field: &'static str },

    // ============ HTTP Index Errors ============
    #[error("Failed to fetch repository index from {url}")]
    IndexFetch {
        url: String,
        #[source]
        source: HttpError,
    },

    #[error("Failed to parse repository index from {url}")]
    IndexParse {
        url: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Chart \"{chart}\" not found in repository")]
    ChartNotFound { chart: String },

    #[error("Version \"{version}\" of chart \"{chart}\" not found")]
    VersionNotFound { chart: String, version: String },

    #[error("No versions found for chart \"{chart}\"")]
    NoVersionsAvailable { chart: String },

    #[error("Chart \"{chart}\" version {version} has no download URL")]
    MissingDownloadUrl { chart: String, version: String },

    // ============ OCI Errors ============
    #[error("Failed to connect to registry {registry}")]
    RegistryAuth {
        registry: String,
        #[source]
        source: RegistryError,
    },

    #[error("Failed to list tags for {repository}")]
    TagList {
        repository: String,
        #[source]
        source: RegistryError,
    },

    #[error("Failed to fetch manifest for {repository}:{tag}")]
    ManifestFetch {
        repository: String,
        tag: String,
        #[source]
        source: RegistryError,
    },

    #[error("Manifest for {repository}:{tag} has no layers")]
    EmptyManifest { repository: String, tag: String },

    #[error("Failed to fetch blob {digest} from {repository}")]
    BlobFetch {
        repository: String,
        digest: String,
        #[source]
        source: RegistryError,
    },

    // ============ Retrieval Errors ============
    #[error("Failed to create workspace in {root}")]
    Workspace {
        root: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to retrieve chart archive from {locator}")]
    Retrieval {
        locator: String,
        #[source]
        source: BoxError,
    },

    #[error("Integrity check failed for {locator}: expected {expected}, got {actual}")]
    IntegrityCheckFailed {
        locator: String,
        expected: String,
        actual: String,
    },

    // ============ Archive Errors ============
    #[error("Failed to unpack chart archive")]
    Archive {
        #[source]
        source: std::io::Error,
    },

    #[error("Refusing to unpack archive entry {path}: {reason}")]
    UnsafeArchiveEntry { path: String, reason: String },

    #[error("Could not find chart directory in the archive")]
    ChartDirectoryNotFound,

    // ============ Setup Errors ============
    #[error("Failed to initialise HTTP client")]
    Client {
        #[source]
        source: HttpError,
    },

    #[error("Invalid configuration {path}: {message}")]
    Config { path: String, message: String },
}

/// Result type for chart fetch operations
pub type Result<T> = std::result::Result<T, FetchError>;

/// Pipeline stage a [`FetchError`] originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Setup,
    Validate,
    Resolve,
    Workspace,
    Retrieve,
    Unpack,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Setup => "setup",
            Stage::Validate => "validate",
            Stage::Resolve => "resolve",
            Stage::Workspace => "workspace",
            Stage::Retrieve => "retrieve",
            Stage::Unpack => "unpack",
        };
        f.write_str(name)
    }
}

impl FetchError {
    /// The stage of the fetch pipeline that failed
    pub fn stage(&self) -> Stage {
        match self {
            FetchError::Validation { .. } => Stage::Validate,
            FetchError::IndexFetch { .. }
            | FetchError::IndexParse { .. }
            | FetchError::ChartNotFound { .. }
            | FetchError::VersionNotFound { .. }
            | FetchError::NoVersionsAvailable { .. }
            | FetchError::MissingDownloadUrl { .. }
            | FetchError::RegistryAuth { .. }
            | FetchError::TagList { .. }
            | FetchError::ManifestFetch { .. }
            | FetchError::EmptyManifest { .. }
            | FetchError::BlobFetch { .. } => Stage::Resolve,
            FetchError::Workspace { .. } => Stage::Workspace,
            FetchError::Retrieval { .. } | FetchError::IntegrityCheckFailed { .. } => {
                Stage::Retrieve
            }
            FetchError::Archive { .. }
            | FetchError::UnsafeArchiveEntry { .. }
            | FetchError::ChartDirectoryNotFound => Stage::Unpack,
            FetchError::Client { .. } | FetchError::Config { .. } => Stage::Setup,
        }
    }

    /// Render the error together with its chain of causes on one line
    pub fn detailed_message(&self) -> String {
        let mut message = self.to_string();
        let mut cause = std::error::Error::source(self);
        while let Some(err) = cause {
            message.push_str(": ");
            message.push_str(&err.to_string());
            cause = err.source();
        }
        message
    }

    pub(crate) fn retrieval(locator: &str, source: impl Into<BoxError>) -> Self {
        FetchError::Retrieval {
            locator: locator.to_string(),
            source: source.into(),
        }
    }
}
