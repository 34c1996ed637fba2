//! Batch command - run one operation over a list of items

use helmpeek_core::ChartIdentity;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;

use super::Context;
use crate::error::{CliError, Result};
use crate::output::{self, Operation};

/// One input row
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItem {
    #[serde(default)]
    pub repository_url: String,
    #[serde(default)]
    pub chart_name: String,
    #[serde(default)]
    pub chart_version: Option<String>,
    #[serde(default)]
    pub use_authentication: bool,
}

/// Parse a YAML (or JSON) list of items
pub fn parse_items(content: &str) -> Result<Vec<BatchItem>> {
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_yaml::from_str(content).map_err(|e| CliError::Validation {
        message: format!("invalid items file: {e}"),
        help: Some(
            "Expected a list of {repositoryUrl, chartName, chartVersion, useAuthentication}"
                .to_string(),
        ),
    })
}

pub async fn run(
    ctx: &Context,
    items_file: &Path,
    operation: Operation,
    continue_on_fail: bool,
) -> Result<()> {
    let content = std::fs::read_to_string(items_file)?;
    let items = parse_items(&content)?;
    let results = process(ctx, &items, operation, continue_on_fail).await?;

    output::print(&Value::Array(results));
    Ok(())
}

/// Items run one after another; each fetch is independent of the others
pub async fn process(
    ctx: &Context,
    items: &[BatchItem],
    operation: Operation,
    continue_on_fail: bool,
) -> Result<Vec<Value>> {
    let mut results = Vec::with_capacity(items.len());

    for (index, item) in items.iter().enumerate() {
        let chart = ChartIdentity::new(&item.chart_name, item.chart_version.as_deref());
        let auth = ctx.auth_for(&item.repository_url, item.use_authentication);

        match ctx
            .fetcher
            .fetch(&item.repository_url, &chart, auth.as_ref())
            .await
        {
            Ok(data) => results.push(output::success(operation, &data)),
            Err(e) if continue_on_fail => {
                tracing::warn!(item = index, error = %e, "batch item failed");
                results.push(output::failure(&e.detailed_message()));
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(results)
}
