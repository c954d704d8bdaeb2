//! sagesync - SAGE synchronization engine
//!
//! Reads slide image records exported from SAGE, grouped by data set and
//! slide code, and reconciles them into the specimen store: one run per
//! invocation.

use anyhow::Result;
use clap::Parser;
use sagesync_common::config::{self, TomlConfig};
use sagesync_common::model::SlideImage;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use sagesync_engine::{SampleDal, SampleSynchronizer};

/// Synchronize SAGE image metadata into the specimen store
#[derive(Parser, Debug)]
#[command(name = "sagesync", version, about)]
struct Args {
    /// JSON export of slide images, grouped by data set and slide code
    #[arg(short, long)]
    input: PathBuf,

    /// Database file path
    #[arg(long)]
    db: Option<String>,

    /// TOML config file
    #[arg(long, default_value = "sagesync.toml")]
    config: PathBuf,

    /// Owner key applied to synchronized entities
    #[arg(long)]
    owner_key: Option<String>,

    /// Pipeline process name recorded on status transitions
    #[arg(long)]
    process: Option<String>,

    /// Order number recorded on status transitions
    #[arg(long)]
    order_no: Option<String>,
}

/// One specimen's worth of input records
#[derive(Debug, Deserialize)]
struct SlideCodeGroup {
    data_set: String,
    slide_code: String,
    images: Vec<SlideImage>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    info!("Starting sagesync");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let toml_config = TomlConfig::load(&args.config)?;
    let db_path = config::resolve_database(args.db.as_deref(), &toml_config);
    let owner_key = config::resolve_owner_key(args.owner_key.as_deref(), &toml_config);
    info!("Database: {}", db_path.display());
    info!("Owner key: {}", owner_key);

    let db_pool = sagesync_common::db::init_database_pool(&db_path).await?;
    let dal = SampleDal::new(db_pool);

    let content = std::fs::read_to_string(&args.input)?;
    let groups: Vec<SlideCodeGroup> = serde_json::from_str(&content)?;
    info!("Loaded {} slide code groups from {}", groups.len(), args.input.display());

    let process = args.process.or(toml_config.process);

    let mut total_created = 0;
    let mut total_updated = 0;
    let mut total_reprocessed = 0;

    for group in &groups {
        let Some(data_set) = dal.get_data_set(&group.data_set).await? else {
            warn!(
                "Unknown data set '{}', skipping slide code {}",
                group.data_set, group.slide_code
            );
            continue;
        };

        // Run-scoped state must not leak across specimens
        let mut engine = SampleSynchronizer::new(dal.clone(), &owner_key);
        if let Some(process) = &process {
            engine.set_process(process);
        }
        if let Some(order_no) = &args.order_no {
            engine.set_order_no(order_no);
        }

        let mut lsms = Vec::with_capacity(group.images.len());
        for slide_image in &group.images {
            lsms.push(engine.create_or_update_lsm(slide_image).await?);
        }

        let sample = engine
            .create_or_update_sample(&group.slide_code, &data_set, &lsms)
            .await?;
        info!(
            "Synchronized {} ({} images, status {})",
            sample.name,
            lsms.len(),
            sample.status
        );

        total_created += engine.num_samples_created();
        total_updated += engine.num_samples_updated();
        total_reprocessed += engine.num_samples_reprocessed();
    }

    info!(
        "Done: {} samples created, {} updated, {} marked for reprocessing",
        total_created, total_updated, total_reprocessed
    );
    Ok(())
}
