use std::sync::Arc;

use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use super::pipeline::{BatchPipeline, PassReport};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// Poll for pending segments until cancelled. A cycle's errors are logged and
/// never end the loop.
pub async fn analysis_loop(pipeline: Arc<BatchPipeline>, cancel_token: CancellationToken) {
    log_info!("analysis loop started");

    loop {
        match pipeline.run_pass(&cancel_token).await {
            Ok(report) => log_report(&report),
            Err(err) => log_error!("analysis pass failed: {err:#}"),
        }

        if cancel_token.is_cancelled() {
            break;
        }

        match pipeline.sweep_retention().await {
            Ok(report) if !report.files.failed.is_empty() => log_warn!(
                "retention could not delete {} files",
                report.files.failed.len()
            ),
            Ok(_) => {}
            Err(err) => log_error!("retention sweep failed: {err:#}"),
        }

        let interval = Duration::from_secs(pipeline.settings().analysis().check_interval_secs);
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = cancel_token.cancelled() => break,
        }
    }

    log_info!("analysis loop shutting down");
}

pub(crate) fn log_report(report: &PassReport) {
    if report.is_empty() {
        return;
    }
    log_info!(
        "analysis pass finished: {} completed, {} failed{}",
        report.completed(),
        report.failed(),
        if report.cancelled { " (cancelled)" } else { "" }
    );
    for outcome in &report.batches {
        if let Err(err) = &outcome.result {
            log_warn!(
                "batch {:?} ({} segments) failed: {err}",
                outcome.batch_id,
                outcome.segment_count
            );
        }
    }
}
