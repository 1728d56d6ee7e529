use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use skuflow_pipeline::{fetch, load, transform, DbConfig, Orchestrator, PipelineConfig};

mod logging;

#[derive(Debug, Parser)]
#[command(name = "skuflow")]
#[command(about = "Product ETL pipeline: fetch, transform, load")]
struct Cli {
    /// Log level when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Snapshot the product listing endpoint into a raw artifact.
    Fetch,
    /// Flatten the latest raw artifact into a cleaned artifact.
    Transform,
    /// Load the latest cleaned artifact into the products table.
    Load,
    /// Run fetch, transform, load in sequence with retry-on-failure.
    Run,
    /// Run the full pipeline on the configured cron schedule.
    Schedule,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level);
    let config = PipelineConfig::from_env();

    match cli.command {
        Commands::Fetch => {
            let outcome = fetch::run(&config).await?;
            println!(
                "fetch complete: {} records -> {}",
                outcome.records,
                outcome.artifact.display()
            );
        }
        Commands::Transform => {
            let outcome = transform::run(&config).await?;
            println!(
                "transform complete: {} records from {} -> {} ({})",
                outcome.records,
                outcome.source_file,
                outcome.artifact.display(),
                outcome.format.as_str()
            );
        }
        Commands::Load => {
            let db = DbConfig::from_env()?;
            let outcome = load::run(&config, &db).await?;
            println!(
                "load complete: {} inserted of {} attempted from {}",
                outcome.inserted,
                outcome.attempted,
                outcome.artifact.display()
            );
        }
        Commands::Run => {
            let db = DbConfig::from_env()?;
            let summary = Orchestrator::new(config, db).run_once().await?;
            println!(
                "run {} complete: fetched={} cleaned={} inserted={}",
                summary.run_id,
                summary.fetched_records,
                summary.cleaned_records,
                summary.inserted_rows
            );
        }
        Commands::Schedule => {
            let db = DbConfig::from_env()?;
            let orchestrator = Orchestrator::new(config, db);
            match orchestrator.build_scheduler().await? {
                Some(mut sched) => {
                    sched.start().await.context("starting scheduler")?;
                    println!("scheduler running; press Ctrl-C to stop");
                    tokio::signal::ctrl_c().await?;
                    sched.shutdown().await.context("stopping scheduler")?;
                }
                None => {
                    eprintln!("scheduler disabled; set SKUFLOW_SCHEDULER_ENABLED=1 to enable");
                }
            }
        }
    }

    Ok(())
}
