//! CLI commands

pub mod batch;
pub mod fetch;
pub mod show;

use clap::Args;
use helmpeek_core::{ChartFetcher, ChartIdentity, Credentials, FetchConfig, RepositoryAuth, TransportKind};
use std::path::Path;

use crate::error::Result;

/// Chart selection shared by the single-chart commands
#[derive(Args, Debug, Clone)]
pub struct ChartArgs {
    /// Repository URL (http(s):// index repo, or OCI registry path)
    pub repository_url: String,

    /// Chart name
    pub chart: String,

    /// Chart version (latest when omitted or empty)
    #[arg(long)]
    pub chart_version: Option<String>,

    /// Authenticate with the stored credentials
    #[arg(long)]
    pub auth: bool,
}

impl ChartArgs {
    pub fn identity(&self) -> ChartIdentity {
        ChartIdentity::new(&self.chart, self.chart_version.as_deref())
    }
}

/// Everything a command needs to fetch charts
pub struct Context {
    pub fetcher: ChartFetcher,
    credentials: Credentials,
}

impl Context {
    pub fn new(config_path: Option<&Path>, credentials_path: Option<&Path>) -> Result<Self> {
        let config = match config_path {
            Some(path) => FetchConfig::load_from(path)?,
            None => FetchConfig::load()?,
        };

        let credentials = match credentials_path {
            Some(path) => Credentials::load_from(path)?,
            None => Credentials::load().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "ignoring unreadable credentials file");
                Credentials::from_env()
            }),
        };

        Ok(Self {
            fetcher: ChartFetcher::new(config)?,
            credentials,
        })
    }

    /// Credential pair for `repository_url`, when authentication is requested
    pub fn auth_for(&self, repository_url: &str, use_auth: bool) -> Option<RepositoryAuth> {
        if !use_auth {
            return None;
        }

        let kind = TransportKind::classify(repository_url);
        let auth = self.credentials.for_transport(kind);
        if !auth.is_complete() {
            tracing::warn!(
                transport = %kind,
                "authentication requested but credentials are incomplete, continuing without"
            );
        }
        Some(auth)
    }
}
