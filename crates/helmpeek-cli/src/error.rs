//! CLI error types with exit code handling
//!
//! Library errors are mapped onto a small set of CLI errors, each with its
//! own exit code.

use helmpeek_core::{FetchError, HttpError, Stage};
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Required input missing or malformed
    #[error("Validation failed: {message}")]
    #[diagnostic(code(helmpeek::cli::validation))]
    Validation {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Index, registry or download failure
    #[error("Fetch failed: {message}")]
    #[diagnostic(code(helmpeek::cli::fetch))]
    Fetch {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Chart archive could not be unpacked
    #[error("Archive error: {message}")]
    #[diagnostic(code(helmpeek::cli::archive))]
    Archive { message: String },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(helmpeek::cli::io))]
    Io { message: String },

    /// Internal error (runtime, unexpected failure)
    #[error("Internal error: {message}")]
    #[diagnostic(code(helmpeek::cli::internal))]
    Internal { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Validation { .. } => exit_codes::VALIDATION_ERROR,
            CliError::Fetch { .. } => exit_codes::FETCH_ERROR,
            CliError::Archive { .. } => exit_codes::ARCHIVE_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Internal { .. } => exit_codes::ERROR,
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<FetchError> for CliError {
    fn from(err: FetchError) -> Self {
        let message = err.detailed_message();
        match err.stage() {
            Stage::Validate => CliError::Validation {
                message,
                help: None,
            },
            Stage::Resolve | Stage::Retrieve => CliError::Fetch {
                help: fetch_help(&err),
                message,
            },
            Stage::Unpack => CliError::Archive { message },
            Stage::Workspace | Stage::Setup => CliError::Io { message },
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

fn fetch_help(err: &FetchError) -> Option<String> {
    match err {
        FetchError::VersionNotFound { .. } => {
            Some("Omit --chart-version to fetch the latest version".to_string())
        }
        FetchError::ChartNotFound { .. } => {
            Some("Chart names are case-sensitive; check the repository index".to_string())
        }
        FetchError::IndexFetch {
            source: HttpError::AuthRequired { .. } | HttpError::AccessDenied { .. },
            ..
        }
        | FetchError::RegistryAuth { .. } => Some(
            "Pass --auth and provide credentials with --credentials or HELMPEEK_* variables"
                .to_string(),
        ),
        FetchError::IntegrityCheckFailed { .. } => {
            Some("The repository served content that does not match its digest".to_string())
        }
        _ => None,
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
