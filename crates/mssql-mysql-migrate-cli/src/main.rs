//! mssql-mysql-migrate CLI - bulk MSSQL to MySQL database copy.

mod progress;

use clap::Parser;
use mssql_mysql_migrate::{format_duration, Config, MigrateError, Orchestrator};
use progress::ProgressTicker;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, Layer, Registry};

#[derive(Parser)]
#[command(name = "mssql-mysql-migrate")]
#[command(about = "Bulk MSSQL to MySQL database copy")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Run the schema-creation phase first: "yes" enables it, anything
    /// else leaves it off
    #[arg(long, default_value = "no")]
    schemas: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Append log lines to this file in addition to the console
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Disable the console progress indicator
    #[arg(long)]
    no_progress: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format, cli.log_file.as_deref())?;

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    if cli.schemas == "yes" {
        config.migration.migrate_schema = true;
    }

    info!("Source: {}", config.source.display_locator());
    info!("Target: {}", config.target.display_url());

    let orchestrator = Orchestrator::new(config).await?;

    let ticker = (!cli.no_progress).then(ProgressTicker::start);
    let result = orchestrator.run().await;
    if let Some(ticker) = ticker {
        ticker.stop().await;
    }
    orchestrator.close().await;

    let result = result?;
    info!(
        "Migration completed: {} tables, {} rows in {}",
        result.summary.tables_succeeded,
        result.summary.rows_copied,
        format_duration(result.data_elapsed)
    );
    println!("Done.");
    Ok(())
}

fn setup_logging(
    verbosity: &str,
    format: &str,
    log_file: Option<&Path>,
) -> Result<(), MigrateError> {
    let level = match verbosity {
        "debug" => LevelFilter::DEBUG,
        "warn" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        _ => LevelFilter::INFO,
    };

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    let console = fmt::layer().with_target(false);
    layers.push(if format == "json" {
        console.json().boxed()
    } else {
        console.boxed()
    });

    if let Some(path) = log_file {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        layers.push(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Arc::new(file))
                .boxed(),
        );
    }

    tracing_subscriber::registry().with(layers).with(level).init();
    Ok(())
}
