//! provtrust - run a provider trust-scoring batch from JSON inputs
//!
//! Reads provider records (plus optional complaints, exclusions and document
//! extractions), scores every record and writes the batch report as JSON.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use provtrust_common::config::{ConfigResolver, TomlConfig};
use provtrust_common::events::EventBus;
use provtrust_engine::inputs::{self, ExclusionList};
use provtrust_engine::logging;
use provtrust_engine::lookups::{
    CensusGeocoderClient, IdentityRegistry, LookupSet, MedicareBillingClient, NppesRegistryClient,
    StaticBilling, StaticGeocoder, StaticRegistry,
};
use provtrust_engine::validators::ComplaintDirectory;
use provtrust_engine::{BatchContext, BatchRunner};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for provtrust
#[derive(Parser, Debug)]
#[command(name = "provtrust")]
#[command(about = "Provider trust-scoring pipeline")]
#[command(version)]
struct Args {
    /// Provider records (JSON array)
    #[arg(short, long)]
    records: PathBuf,

    /// Member complaints keyed by NPI (JSON object)
    #[arg(long)]
    complaints: Option<PathBuf>,

    /// Excluded NPIs (JSON array)
    #[arg(long)]
    exclusions: Option<PathBuf>,

    /// Document extractions keyed by NPI (JSON object)
    #[arg(long)]
    documents: Option<PathBuf>,

    /// Registry snapshots used instead of the live registry (JSON array)
    #[arg(long)]
    registry: Option<PathBuf>,

    /// Config file (overrides PROVTRUST_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Never call external services
    #[arg(long, env = "PROVTRUST_OFFLINE")]
    offline: bool,

    /// Write the report here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing before anything can log
    let (filter, log_level) = logging::startup_filter();
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let config = ConfigResolver::new(args.config.clone())
        .load()
        .context("Failed to load configuration")?;

    // RUST_LOG wins over the configured level
    log_level
        .apply_configured_level(&config.logging.level)
        .context("Failed to apply configured log level")?;

    info!("Starting provtrust v{}", env!("CARGO_PKG_VERSION"));

    // Step 1: Load inputs
    let records = inputs::load_records(&args.records)
        .with_context(|| format!("Failed to load records from {}", args.records.display()))?;
    inputs::ensure_records(&records)?;

    let complaints = match &args.complaints {
        Some(path) => ComplaintDirectory::load(path)
            .with_context(|| format!("Failed to load complaints from {}", path.display()))?,
        None => ComplaintDirectory::new(),
    };
    let exclusions = match &args.exclusions {
        Some(path) => ExclusionList::load(path)
            .with_context(|| format!("Failed to load exclusions from {}", path.display()))?,
        None => ExclusionList::new(),
    };
    let documents = match &args.documents {
        Some(path) => inputs::load_documents(path)
            .with_context(|| format!("Failed to load documents from {}", path.display()))?,
        None => Default::default(),
    };

    // Step 2: Lookups
    let lookups = build_lookups(&args, &config)?;
    let ctx = BatchContext::new(
        lookups,
        config.pipeline.lookup_timeout(),
        Local::now().date_naive(),
    )
    .with_complaints(complaints)
    .with_exclusions(exclusions)
    .with_documents(documents);

    // Step 3: Run, cancelling unstarted records on Ctrl+C
    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    let events = EventBus::new(config.pipeline.event_capacity);
    let runner = BatchRunner::new(&config.pipeline, config.impact.clone()).with_events(events);
    let report = runner.run(records, &ctx, &cancel).await;

    // Step 4: Write report
    let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            info!("Report written to {}", path.display());
        }
        None => println!("{}", json),
    }

    eprintln!("{}", report.brief);
    Ok(())
}

/// Live HTTP clients, or in-memory sources when offline
///
/// A `--registry` file always replaces the live registry.
fn build_lookups(args: &Args, config: &TomlConfig) -> Result<LookupSet> {
    let timeout = config.pipeline.lookup_timeout();

    let registry: Arc<dyn IdentityRegistry> = match &args.registry {
        Some(path) => Arc::new(
            StaticRegistry::load(path)
                .with_context(|| format!("Failed to load registry from {}", path.display()))?,
        ),
        None if args.offline => {
            warn!("Offline without a registry file: identity checks will be uncertain");
            Arc::new(StaticRegistry::unavailable())
        }
        None => Arc::new(
            NppesRegistryClient::new(&config.endpoints, timeout)
                .context("Failed to create registry client")?,
        ),
    };

    if args.offline {
        info!("Offline mode: address and billing checks will be uncertain");
        return Ok(LookupSet::new(
            registry,
            Arc::new(StaticGeocoder::unavailable()),
            Arc::new(StaticBilling::unavailable()),
        ));
    }

    Ok(LookupSet::new(
        registry,
        Arc::new(
            CensusGeocoderClient::new(&config.endpoints, timeout)
                .context("Failed to create geocoder client")?,
        ),
        Arc::new(
            MedicareBillingClient::new(&config.endpoints, timeout)
                .context("Failed to create billing client")?,
        ),
    ))
}

async fn cancel_on_signal(cancel: CancellationToken) {
    match signal::ctrl_c().await {
        Ok(()) => {
            warn!("Received Ctrl+C, cancelling records not yet started");
            cancel.cancel();
        }
        Err(e) => warn!("Failed to install Ctrl+C handler: {}", e),
    }
}
