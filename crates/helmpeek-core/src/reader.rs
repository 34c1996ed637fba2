//! Chart file reader

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Chart metadata file name
pub const CHART_FILE: &str = "Chart.yaml";

/// Default values file name
pub const VALUES_FILE: &str = "values.yaml";

/// The two documents extracted from a chart, each independently optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<serde_json::Value>,
}

/// Read `Chart.yaml` and `values.yaml` from an unpacked chart directory
///
/// Never fails. A missing, unreadable or malformed file is logged and leaves
/// its field empty without affecting the other one. A file that resolves
/// outside `chart_dir` is treated as unreadable.
pub fn read_chart(chart_dir: &Path) -> ChartData {
    let root = match chart_dir.canonicalize() {
        Ok(root) => root,
        Err(e) => {
            tracing::warn!(path = %chart_dir.display(), error = %e, "chart directory is not readable");
            return ChartData::default();
        }
    };

    ChartData {
        metadata: read_document(&root, CHART_FILE),
        values: read_document(&root, VALUES_FILE),
    }
}

fn read_document(root: &Path, file_name: &str) -> Option<serde_json::Value> {
    let path = root.join(file_name);
    let content = match path
        .canonicalize()
        .and_then(|real| confined(root, real))
        .and_then(std::fs::read_to_string)
    {
        Ok(content) => content,
        Err(e) => {
            tracing::warn!(file = file_name, path = %path.display(), error = %e, "failed to read chart file");
            return None;
        }
    };

    if content.trim().is_empty() {
        return None;
    }

    match serde_yaml::from_str::<serde_json::Value>(&content) {
        Ok(serde_json::Value::Null) => None,
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(file = file_name, path = %path.display(), error = %e, "failed to parse chart file");
            None
        }
    }
}

fn confined(root: &Path, real: PathBuf) -> std::io::Result<PathBuf> {
    if real.starts_with(root) {
        Ok(real)
    } else {
        Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            format!("resolves outside the chart directory to {}", real.display()),
        ))
    }
}
