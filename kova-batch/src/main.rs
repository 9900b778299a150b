//! kova-batch - Quality-gated batch processing for sensor captures
//!
//! One subcommand per modality processor (`image`, `point-cloud`, `imu`,
//! `gps`, `thermal`) plus the batch engine (`batch`) and a standalone
//! manifest rebuild (`report`). Shared path/logging settings and processing
//! settings both live in `kova.toml`; command-line flags override the file.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kova_batch::config::ProcessingConfig;
use kova_batch::processors::ProcessorRegistry;
use kova_batch::report::ReportBuilder;
use kova_batch::scheduler::BatchScheduler;
use kova_batch::types::{ModalityKind, RawDataRef};
use kova_batch::RunContext;
use kova_common::events::EventBus;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "kova-batch", version, about = "Kova sensor capture batch processor")]
struct Cli {
    /// Configuration file (defaults to the platform kova.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter override (e.g. "debug", "kova_batch=trace")
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the quality-gated batch engine over a dataset root
    Batch {
        /// Dataset root containing capture directories
        #[arg(long)]
        root: Option<PathBuf>,
        /// Checkpoint database path (default: <root>/.kova/checkpoints.db)
        #[arg(long)]
        checkpoint: Option<PathBuf>,
        /// Report manifest output (default: <root>/.kova/report.json)
        #[arg(long)]
        output: Option<PathBuf>,
        /// Worker pool size override
        #[arg(long)]
        workers: Option<usize>,
        /// Per-modality retry limit override
        #[arg(long)]
        retry_limit: Option<u32>,
        /// Acceptance threshold override
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Process a single image payload
    Image { input: PathBuf },
    /// Process a single point cloud payload
    PointCloud { input: PathBuf },
    /// Process a single IMU payload
    Imu { input: PathBuf },
    /// Process a single GPS log
    Gps { input: PathBuf },
    /// Process a single thermal frame
    Thermal { input: PathBuf },

    /// Rebuild the manifest from an existing checkpoint store
    Report {
        /// Checkpoint database path
        #[arg(long)]
        checkpoint: PathBuf,
        /// Manifest output path (stdout if omitted)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .or_else(kova_common::config::default_config_path);
    let toml_config = match &config_path {
        Some(path) => kova_common::config::read_toml_config(path)?,
        None => kova_common::config::TomlConfig::default(),
    };

    init_tracing(cli.log_level.as_deref(), &toml_config.logging.level)?;

    let mut processing = match &config_path {
        Some(path) => ProcessingConfig::from_toml_file(path)?,
        None => ProcessingConfig::default(),
    };

    match cli.command {
        Command::Batch {
            root,
            checkpoint,
            output,
            workers,
            retry_limit,
            threshold,
        } => {
            if let Some(workers) = workers {
                processing.worker_concurrency = workers;
            }
            if let Some(retry_limit) = retry_limit {
                processing.retry_limit = retry_limit;
            }
            if let Some(threshold) = threshold {
                processing.acceptance_threshold = threshold;
            }
            // Configuration errors are fatal at startup
            processing.validate()?;

            let root =
                kova_common::config::resolve_dataset_root(root.as_deref(), &toml_config)?;
            let checkpoint_path = checkpoint
                .or_else(|| toml_config.checkpoint_path.clone())
                .unwrap_or_else(|| kova_batch::db::default_checkpoint_path(&root));
            let output = output.unwrap_or_else(|| root.join(".kova").join("report.json"));

            run_batch(root, checkpoint_path, output, processing).await
        }

        Command::Image { input } => run_single(ModalityKind::Image, input, processing).await,
        Command::PointCloud { input } => {
            run_single(ModalityKind::PointCloud, input, processing).await
        }
        Command::Imu { input } => run_single(ModalityKind::Imu, input, processing).await,
        Command::Gps { input } => run_single(ModalityKind::Gps, input, processing).await,
        Command::Thermal { input } => run_single(ModalityKind::Thermal, input, processing).await,

        Command::Report { checkpoint, output } => run_report(checkpoint, output).await,
    }
}

fn init_tracing(cli_level: Option<&str>, config_level: &str) -> Result<()> {
    let directive = cli_level.unwrap_or(config_level);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directive))
        .context("invalid log filter")?;
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

/// Execute the batch engine with graceful Ctrl-C handling
async fn run_batch(
    root: PathBuf,
    checkpoint_path: PathBuf,
    output: PathBuf,
    processing: ProcessingConfig,
) -> Result<()> {
    tracing::info!("Starting kova-batch {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Dataset root: {}", root.display());
    tracing::info!("Checkpoint store: {}", checkpoint_path.display());

    let db = kova_batch::db::init_checkpoint_pool(&checkpoint_path).await?;
    let event_bus = EventBus::new(100);
    let ctx = RunContext::new(db, event_bus, processing);

    // First Ctrl-C drains gracefully; a second one aborts hard, leaving
    // InProgress checkpoint records for the next run to re-attempt
    let cancel_token = CancellationToken::new();
    let signal_token = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!(
                "Stop requested; draining in-flight captures (Ctrl-C again to abort hard)"
            );
            signal_token.cancel();
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::error!("Hard abort; interrupted captures resume on the next run");
                std::process::exit(130);
            }
        }
    });

    let registry = ProcessorRegistry::with_defaults(&ctx.config);
    let scheduler = BatchScheduler::new(ctx, registry);
    let report = scheduler.run(&root, cancel_token).await?;

    report.write_json(&output)?;
    report.log_summary();
    tracing::info!("Report written to {}", output.display());

    Ok(())
}

/// Run one modality processor against one payload, printing metrics JSON
async fn run_single(
    kind: ModalityKind,
    input: PathBuf,
    processing: ProcessingConfig,
) -> Result<()> {
    processing.validate()?;
    let registry = ProcessorRegistry::with_defaults(&processing);
    let processor = registry
        .get(kind)
        .with_context(|| format!("no processor registered for {}", kind))?;

    let raw = RawDataRef {
        modality: kind,
        path: input,
    };
    let (data, metrics) = tokio::time::timeout(processing.modality_timeout(), processor.process(&raw))
        .await
        .with_context(|| format!("{} processing timed out", kind))??;

    let out = serde_json::json!({
        "modality": kind,
        "data": data,
        "metrics": metrics,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

/// Rebuild the manifest from an existing checkpoint store
async fn run_report(checkpoint: PathBuf, output: Option<PathBuf>) -> Result<()> {
    let db = kova_batch::db::init_checkpoint_pool(&checkpoint).await?;
    let report = ReportBuilder::new(&db)
        .build(Uuid::new_v4(), checkpoint.display().to_string().as_str())
        .await?;

    match output {
        Some(path) => {
            report.write_json(&path)?;
            report.log_summary();
            tracing::info!("Report written to {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}
