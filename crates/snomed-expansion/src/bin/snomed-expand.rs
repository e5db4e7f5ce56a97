//! SNOMED CT valueset expansion CLI.

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use snomed_expansion::{rf2, DirectoryIndexer, ExpansionService, ServiceConfig, VersionToken};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "snomed-expand", version, about = "Build and query SNOMED CT valueset expansions")]
struct Cli {
    /// JSON service configuration.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// RF2 release directory (falls back to SNOMED_DATA_PATH).
    #[arg(long, global = true)]
    data: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Materialize a valueset catalog and write it to a directory.
    Build {
        /// JSON catalog of valueset definitions.
        #[arg(long)]
        valuesets: PathBuf,
        /// Output directory for .vsb files and the manifest.
        #[arg(long)]
        out: PathBuf,
    },
    /// Expand a rule expression, e.g. "<< 73211009".
    Expand {
        /// Rule text.
        #[arg(long)]
        expr: String,
        /// First member to print.
        #[arg(long, default_value_t = 0)]
        offset: usize,
        /// Members per page.
        #[arg(long, default_value_t = 100)]
        count: usize,
    },
    /// Classify how concept A relates to concept B.
    Subsumes {
        /// Concept A.
        a: u64,
        /// Concept B.
        b: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ServiceConfig::from_file(path)?,
        None => ServiceConfig::default(),
    };
    let data = cli
        .data
        .or_else(|| std::env::var_os("SNOMED_DATA_PATH").map(PathBuf::from))
        .ok_or("no RF2 directory given: pass --data or set SNOMED_DATA_PATH")?;

    let service = ExpansionService::new(config);

    if let Command::Build { valuesets, .. } = &cli.command {
        service.load_catalog(valuesets)?;
    }

    tracing::info!("Loading SNOMED CT release from: {}", data.display());
    let input = tokio::task::spawn_blocking(move || rf2::load_snapshot_input(data)).await??;
    let version = service.load_snapshot(input).await?;
    let at = VersionToken::from(&version);

    match cli.command {
        Command::Build { out, .. } => {
            let indexer = DirectoryIndexer::new(&out);
            let batch = service.publish(&indexer, at).await?;
            println!("{}", indexer.manifest()?);
            if !batch.failed.is_empty() {
                return Err(format!("{} valuesets failed to materialize", batch.failed.len()).into());
            }
        }
        Command::Expand { expr, offset, count } => {
            let expansion = service.expand_expression(&expr, at).await?;
            println!("{}", serde_json::to_string_pretty(&expansion.page(offset, count))?);
        }
        Command::Subsumes { a, b } => {
            println!("{}", service.subsumes(a, b, at)?);
        }
    }

    tracing::debug!("{}", service.stats());
    Ok(())
}
