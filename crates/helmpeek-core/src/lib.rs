//! Helm chart resolution and retrieval
//!
//! Fetches a chart from either kind of Helm repository and reads its
//! `Chart.yaml` and `values.yaml`:
//!
//! - **HTTP repositories**: classic Helm repos serving `index.yaml`
//! - **OCI registries**: charts stored as OCI artifacts (GHCR, Harbor, ECR, ...)
//!
//! ## Example
//!
//! ```rust,no_run
//! use helmpeek_core::{ChartFetcher, ChartIdentity, FetchConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let fetcher = ChartFetcher::new(FetchConfig::load()?)?;
//!
//! let chart = ChartIdentity::new("nginx", None::<String>);
//! let data = fetcher
//!     .fetch("https://charts.bitnami.com/bitnami", &chart, None)
//!     .await?;
//!
//! if let Some(values) = data.values {
//!     println!("{}", serde_json::to_string_pretty(&values)?);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Behaviour Notes
//!
//! - "Latest" is the greatest version string compared lexicographically
//!   (`1.9.0` beats `1.10.0`) unless `versionOrdering: semver` is configured
//! - Credentials are never sent after cross-origin redirects
//! - Every fetch unpacks into its own temporary workspace, removed afterwards
//! - Archives are unpacked strictly; entries escaping the workspace are rejected
//! - A missing or malformed `Chart.yaml`/`values.yaml` is logged, not fatal

pub mod archive;
pub mod config;
pub mod credentials;
pub mod error;
pub mod fetch;
pub mod http;
pub mod index;
pub mod oci;
pub mod reader;
pub mod retrieve;
pub mod transport;
pub mod version;
pub mod workspace;

// Re-exports for convenience
pub use config::FetchConfig;
pub use credentials::{Credentials, HttpClient, HttpError, RepositoryAuth};
pub use error::{FetchError, Result, Stage};
pub use fetch::{ChartFetcher, ChartIdentity, FetchedChart, ResolvedArtifact, validate};
pub use http::{HttpArtifact, HttpIndexResolver};
pub use index::{ChartEntry, RepositoryIndex};
pub use oci::{
    DistributionConnector, Manifest, OciArtifact, OciResolver, RegistryClient, RegistryConnector,
    RegistryError,
};
pub use reader::{ChartData, read_chart};
pub use transport::{OciLocation, RepositoryLocator, TransportKind, normalize_oci_url};
pub use version::VersionOrdering;
pub use workspace::Workspace;
