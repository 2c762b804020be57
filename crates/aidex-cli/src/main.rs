use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use aidex_etl::{EtlConfig, EtlPipeline};
use aidex_storage::{PgAgentStore, StoreError};

#[derive(Debug, Parser)]
#[command(name = "aidex")]
#[command(about = "AI agent directory ETL")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one scraped batch file (csv, json or parquet) through the pipeline.
    Run {
        path: PathBuf,
        /// Origin label recorded on rows that do not already carry one.
        #[arg(long)]
        source: Option<String>,
    },
    /// Load a trusted seed file without the row-dropping clean stage.
    Seed { path: PathBuf },
    /// Apply pending database migrations.
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = EtlConfig::from_env();

    match cli.command {
        Commands::Run { path, source } => {
            if source.is_some() {
                config.source_label = source;
            }
            let store = PgAgentStore::connect(&config.database_url).await?;
            let pipeline = EtlPipeline::new(config, store);
            match pipeline.run_file(&path).await {
                Ok(summary) => println!(
                    "run complete: run_id={} read={} cleaned={} merged={} inserted={} updated={}",
                    summary.run_id,
                    summary.rows_read,
                    summary.rows_cleaned,
                    summary.rows_merged,
                    summary.inserted,
                    summary.updated
                ),
                Err(err) => {
                    if let Some(store_err) = err.downcast_ref::<StoreError>() {
                        if store_err.is_retryable() {
                            warn!("batch rolled back; safe to retry the same file");
                        }
                    }
                    return Err(err);
                }
            }
        }
        Commands::Seed { path } => {
            let store = PgAgentStore::connect(&config.database_url).await?;
            let pipeline = EtlPipeline::new(config, store);
            let summary = pipeline.run_seed_file(&path).await?;
            println!(
                "seed load complete: run_id={} read={} merged={} inserted={} updated={}",
                summary.run_id,
                summary.rows_read,
                summary.rows_merged,
                summary.inserted,
                summary.updated
            );
        }
        Commands::Migrate => {
            let store = PgAgentStore::connect(&config.database_url).await?;
            store.run_migrations().await?;
            println!("migrations applied");
        }
    }

    Ok(())
}
