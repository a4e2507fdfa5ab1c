pub mod analysis;
pub mod db;
pub mod inference;
pub mod media;
pub mod settings;
pub mod utils;

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use log::{info, warn};

use analysis::{AnalysisController, BatchPipeline};
use db::Database;
use inference::ArkClient;
use media::FfmpegMerger;
use settings::{SettingsStore, API_KEY_ENV};

/// Environment variable naming the settings file.
pub const SETTINGS_ENV: &str = "WORKDAY_SETTINGS";
const DEFAULT_SETTINGS_PATH: &str = "./workday.json";

/// Run the analysis service until Ctrl-C.
pub async fn run() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("Workday analysis starting up...");

    let settings_path = std::env::var_os(SETTINGS_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_PATH));
    let settings = Arc::new(SettingsStore::new(settings_path)?);
    let snapshot = settings.snapshot();

    let database = Database::new(snapshot.database_path.clone())?;

    // Undo batches and segments a crash left mid-flight.
    let (failed_batches, requeued_segments) = database
        .recover_interrupted_work()
        .await
        .context("failed to recover interrupted work")?;
    if failed_batches > 0 || requeued_segments > 0 {
        warn!(
            "Recovered from an interrupted run: {failed_batches} batches marked failed, \
             {requeued_segments} segments re-queued"
        );
    }

    if !snapshot.analysis.debug_mode && snapshot.gateway.resolved_api_key().is_none() {
        warn!("No API key configured and {API_KEY_ENV} is unset; model calls will fail");
    }

    let pipeline = BatchPipeline::new(
        database,
        Arc::new(ArkClient::new(Arc::clone(&settings))),
        Arc::new(FfmpegMerger::default()),
        Arc::clone(&settings),
    );
    let controller = AnalysisController::new(Arc::new(pipeline));
    controller.start().await;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    info!("Shutdown requested");
    controller.stop().await;
    Ok(())
}
