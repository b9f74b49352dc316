use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use london_etl::app::ports::{GeocodePort, SourcePort};
use london_etl::app::{PipelineOrchestrator, PipelineSelection, PipelineStatus, RunReport};
use london_etl::config::{Config, DEFAULT_CONFIG_PATH};
use london_etl::domain::{Coordinate, PostcodeKey};
use london_etl::infra::{self, CsvDirectorySource, ReqwestGeocoder};
use london_etl::observability;
use london_etl::pipeline::enrich::GeoEnricher;

#[derive(Parser)]
#[command(name = "london_etl")]
#[command(about = "Postcode enrichment and consolidation for London business and venue data")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipelines and load their tables into the configured sink
    Run {
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        /// Sub-pipelines to run (comma-separated). Available: postcodes, business, venues
        #[arg(long, value_delimiter = ',')]
        only: Option<Vec<String>>,
        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Geocode postcodes and print their coordinates
    Lookup {
        #[arg(required = true)]
        postcodes: Vec<String>,
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
    /// Parse the configuration and print the effective settings
    CheckConfig {
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    Config::load_or_default(path).with_context(|| format!("loading config from {}", path.display()))
}

fn print_report(report: &RunReport) {
    println!("\n📊 Run {} ({} → {})", report.run_id, report.started_at, report.finished_at);
    for outcome in &report.outcomes {
        match &outcome.status {
            PipelineStatus::Completed { receipts, enrichment } => {
                println!("✅ {} ({} ms)", outcome.pipeline, outcome.duration_ms);
                for receipt in receipts {
                    println!(
                        "   {}: {} rows offered, {} written",
                        receipt.table, receipt.rows_offered, receipt.rows_written
                    );
                }
                if let Some(stats) = enrichment {
                    println!(
                        "   postcodes: {} requested, {} resolved, {} absent, {} requests",
                        stats.requested, stats.resolved, stats.absent, stats.outbound_requests
                    );
                    for (kind, count) in &stats.failures {
                        println!("   - {}: {}", kind, count);
                    }
                }
            }
            PipelineStatus::Failed { error, schema_violation } => {
                let kind = if *schema_violation { "schema violation" } else { "failure" };
                println!("❌ {} on {} ({}): {}", outcome.pipeline, outcome.dataset, kind, error);
            }
        }
    }
}

async fn run(config: Config, only: Option<Vec<String>>, json: bool) -> anyhow::Result<bool> {
    let selection = match only {
        Some(names) => PipelineSelection::from_names(&names)?,
        None => PipelineSelection::all(),
    };

    let source: Arc<dyn SourcePort> = Arc::new(CsvDirectorySource::new(&config.datasets.dir));
    let sink = infra::build_sink(&config).context("opening sink")?;
    let geocoder: Arc<dyn GeocodePort> = Arc::new(ReqwestGeocoder::new(
        &config.geocode.base_url,
        config.enricher_settings().timeout,
    )?);

    let orchestrator = PipelineOrchestrator::new(
        source,
        sink,
        geocoder,
        config.enricher_settings(),
        config.pipeline_settings(),
    );
    let report = orchestrator.run(&selection).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    if let Some(metrics) = observability::render() {
        tracing::debug!(metrics = %metrics, "end of run metrics");
    }
    Ok(report.succeeded())
}

async fn lookup(config: Config, postcodes: Vec<String>) -> anyhow::Result<()> {
    let geocoder = Arc::new(ReqwestGeocoder::new(
        &config.geocode.base_url,
        config.enricher_settings().timeout,
    )?);
    let enricher = GeoEnricher::new(geocoder, config.enricher_settings());

    let mut keys = Vec::new();
    for raw in &postcodes {
        match PostcodeKey::parse(raw) {
            Some(key) => keys.push(key),
            None => warn!(postcode = %raw, "skipping empty postcode"),
        }
    }
    let outcome = enricher.enrich(keys).await;
    for (postcode, coordinate) in &outcome.coordinates {
        match coordinate {
            Coordinate::Present(point) => {
                println!("{}\t{}\t{}", postcode, point.latitude, point.longitude)
            }
            Coordinate::Absent => println!("{}\t-\t-", postcode),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, only, json } => {
            let config = load_config(&config)?;
            let guard = observability::init_logging(&config.logging.dir)
                .context("initializing logging")?;
            if let Err(e) = observability::init() {
                warn!("metrics disabled: {}", e);
            }
            info!("starting london_etl run");
            let succeeded = run(config, only, json).await?;
            if !succeeded {
                drop(guard);
                std::process::exit(1);
            }
        }
        Commands::Lookup { postcodes, config } => {
            let config = load_config(&config)?;
            let _guard = observability::init_logging(&config.logging.dir)
                .context("initializing logging")?;
            lookup(config, postcodes).await?;
        }
        Commands::CheckConfig { config } => {
            let config = load_config(&config)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }
    Ok(())
}
