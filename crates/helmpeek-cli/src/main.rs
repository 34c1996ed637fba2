//! helmpeek CLI - read a Helm chart's metadata and default values

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod error;
mod exit_codes;
mod output;

use commands::{ChartArgs, Context};
use error::Result;
use output::Operation;

/// Environment variable holding the log filter
const LOG_ENV: &str = "HELMPEEK_LOG";

#[derive(Parser)]
#[command(name = "helmpeek")]
#[command(author = "helmpeek Contributors")]
#[command(version)]
#[command(about = "Read Helm chart metadata and default values from HTTP or OCI repositories", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (default: ~/.config/helmpeek/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Credentials file (default: ~/.config/helmpeek/credentials.yaml, then HELMPEEK_* variables)
    #[arg(long, global = true)]
    credentials: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the chart's default values as JSON
    Values(ChartArgs),

    /// Print the chart's Chart.yaml as JSON
    Metadata(ChartArgs),

    /// Run one operation over a YAML or JSON list of items
    Batch {
        /// Items file
        items_file: PathBuf,

        /// Document to extract from each chart
        #[arg(long, value_enum)]
        operation: Operation,

        /// Report failing items in the output instead of aborting
        #[arg(long)]
        continue_on_fail: bool,
    },

    /// Show a human-readable chart summary
    Show {
        #[command(flatten)]
        chart: ChartArgs,

        /// Also print the default values
        #[arg(long)]
        values: bool,
    },
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let ctx = Context::new(cli.config.as_deref(), cli.credentials.as_deref())?;

    match cli.command {
        Commands::Values(args) => commands::fetch::run(&ctx, Operation::Values, &args).await,
        Commands::Metadata(args) => commands::fetch::run(&ctx, Operation::Metadata, &args).await,
        Commands::Batch {
            items_file,
            operation,
            continue_on_fail,
        } => commands::batch::run(&ctx, &items_file, operation, continue_on_fail).await,
        Commands::Show { chart, values } => commands::show::run(&ctx, &chart, values).await,
    }
}

#[tokio::main]
async fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.debug);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }

    std::process::exit(exit_codes::SUCCESS);
}
