//! Show command - human-readable chart summary

use console::style;
use helmpeek_core::ResolvedArtifact;

use super::{ChartArgs, Context};
use crate::error::{CliError, Result};

pub async fn run(ctx: &Context, args: &ChartArgs, show_values: bool) -> Result<()> {
    let auth = ctx.auth_for(&args.repository_url, args.auth);
    let fetched = ctx
        .fetcher
        .fetch_detailed(&args.repository_url, &args.identity(), auth.as_ref())
        .await?;

    let metadata = fetched.data.metadata.as_ref();
    let field = |key: &str| {
        metadata
            .and_then(|m| m.get(key))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    };

    let name = field("name").unwrap_or_else(|| args.chart.clone());
    println!("{}", style(&name).cyan().bold());
    println!("{}", style("=".repeat(name.len())).dim());
    println!();

    println!("{}: {}", style("Version").bold(), fetched.artifact.version());
    if let Some(app_version) = field("appVersion") {
        println!("{}: {}", style("App Version").bold(), app_version);
    }
    if let Some(description) = field("description") {
        println!("{}: {}", style("Description").bold(), description);
    }

    match &fetched.artifact {
        ResolvedArtifact::Http(a) => {
            println!("{}: {}", style("Source").bold(), a.download_url);
            if let Some(digest) = &a.digest {
                println!("{}: {}", style("Digest").bold(), digest);
            }
        }
        ResolvedArtifact::Oci(a) => {
            println!(
                "{}: oci://{}/{}:{}",
                style("Source").bold(),
                a.registry,
                a.repository,
                a.version
            );
            println!("{}: {}", style("Digest").bold(), a.digest);
        }
    }

    if metadata.is_none() {
        println!("{}", style("Chart.yaml missing or unreadable").yellow());
    }

    if show_values {
        println!();
        println!("{}:", style("Default Values").bold());
        match &fetched.data.values {
            Some(values) => {
                let yaml = serde_yaml::to_string(values)
                    .map_err(|e| CliError::internal(format!("failed to render values: {e}")))?;
                print!("{yaml}");
            }
            None => println!("  {}", style("(none)").dim()),
        }
    }

    Ok(())
}
