//! Archive retrieval into a workspace

use futures::StreamExt;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

use crate::credentials::HttpClient;
use crate::error::{FetchError, Result};
use crate::workspace::Workspace;

/// Stream an archive from `url` into the workspace archive file
///
/// When `expected_digest` is a SHA-256 digest the downloaded bytes are
/// hashed on the fly and compared once the body has been read.
pub async fn download_to_workspace(
    client: &HttpClient,
    url: &str,
    workspace: &Workspace,
    expected_digest: Option<&str>,
) -> Result<PathBuf> {
    tracing::debug!(url = %url, "downloading chart archive");

    let response = client
        .get(url)
        .await
        .map_err(|e| FetchError::retrieval(url, e))?;

    let path = workspace.archive_path();
    let mut file = tokio::fs::File::create(&path)
        .await
        .map_err(|e| FetchError::retrieval(url, e))?;

    let mut hasher = Sha256::new();
    let mut size = 0usize;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| FetchError::retrieval(url, e))?;
        hasher.update(&chunk);
        size += chunk.len();
        file.write_all(&chunk)
            .await
            .map_err(|e| FetchError::retrieval(url, e))?;
    }
    file.flush().await.map_err(|e| FetchError::retrieval(url, e))?;

    tracing::debug!(bytes = size, path = %path.display(), "archive written");

    if let Some(expected) = expected_digest {
        verify(url, expected, &hex::encode(hasher.finalize()))?;
    }

    Ok(path)
}

/// Write an in-memory archive (an OCI blob) into the workspace archive file
pub async fn write_blob(
    blob: &[u8],
    locator: &str,
    workspace: &Workspace,
    expected_digest: Option<&str>,
) -> Result<PathBuf> {
    if let Some(expected) = expected_digest {
        verify(locator, expected, &sha256_hex(blob))?;
    }

    let path = workspace.archive_path();
    tokio::fs::write(&path, blob)
        .await
        .map_err(|e| FetchError::retrieval(locator, e))?;

    tracing::debug!(bytes = blob.len(), path = %path.display(), "archive written");
    Ok(path)
}

/// Lowercase hex SHA-256 of `data`
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn verify(locator: &str, expected: &str, actual_hex: &str) -> Result<()> {
    if !is_sha256(expected) {
        tracing::debug!(digest = %expected, "not a sha256 digest, skipping verification");
        return Ok(());
    }

    if digest_matches(expected, actual_hex) {
        Ok(())
    } else {
        Err(FetchError::IntegrityCheckFailed {
            locator: locator.to_string(),
            expected: expected.to_string(),
            actual: format!("sha256:{actual_hex}"),
        })
    }
}

fn normalize_digest(digest: &str) -> String {
    digest
        .trim()
        .to_lowercase()
        .replace("sha256:", "")
        .replace("sha256-", "")
}

fn is_sha256(digest: &str) -> bool {
    let hex = normalize_digest(digest);
    hex.len() == 64 && hex.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Check if two digests match (with or without the `sha256:` prefix)
pub fn digest_matches(expected: &str, actual: &str) -> bool {
    normalize_digest(expected) == normalize_digest(actual)
}
