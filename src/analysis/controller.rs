use std::sync::Arc;

use anyhow::Result;
use log::{info, warn};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use super::loop_worker::{analysis_loop, log_report};
use super::pipeline::{BatchPipeline, ClearReport, PassReport, ReprocessOutcome};

const STOP_TIMEOUT: Duration = Duration::from_secs(5);

struct RunningLoop {
    handle: JoinHandle<()>,
    cancel_token: CancellationToken,
}

/// Start/stop handle around the single background analysis task, plus the
/// manual operations exposed to callers.
pub struct AnalysisController {
    pipeline: Arc<BatchPipeline>,
    running: Mutex<Option<RunningLoop>>,
}

impl AnalysisController {
    pub fn new(pipeline: Arc<BatchPipeline>) -> Self {
        Self {
            pipeline,
            running: Mutex::new(None),
        }
    }

    pub fn pipeline(&self) -> &Arc<BatchPipeline> {
        &self.pipeline
    }

    /// Spawn the loop unless it is already running.
    pub async fn start(&self) {
        let mut running = self.running.lock().await;
        if let Some(existing) = running.as_ref() {
            if !existing.handle.is_finished() {
                warn!("analysis loop already running");
                return;
            }
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(analysis_loop(
            Arc::clone(&self.pipeline),
            cancel_token.clone(),
        ));
        *running = Some(RunningLoop {
            handle,
            cancel_token,
        });
        info!("analysis loop spawned");
    }

    /// Cancel the loop and wait up to five seconds for it to exit. An
    /// in-flight model call is never interrupted; if it outlasts the wait the
    /// task is left to finish on its own.
    pub async fn stop(&self) {
        let Some(RunningLoop {
            handle,
            cancel_token,
        }) = self.running.lock().await.take()
        else {
            warn!("analysis loop not running");
            return;
        };

        cancel_token.cancel();
        match tokio::time::timeout(STOP_TIMEOUT, handle).await {
            Ok(Ok(())) => info!("analysis loop stopped"),
            Ok(Err(err)) => warn!("analysis loop task failed to join: {err}"),
            Err(_) => warn!(
                "analysis loop did not stop within {}s; leaving it to finish",
                STOP_TIMEOUT.as_secs()
            ),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|running| !running.handle.is_finished())
    }

    /// Run one pass now, independent of the loop's own sleep.
    pub async fn trigger_now(&self) -> Result<PassReport> {
        info!("manual analysis pass triggered");
        let report = self.pipeline.run_pass(&CancellationToken::new()).await?;
        log_report(&report);
        Ok(report)
    }

    pub async fn reprocess_day(&self, day: &str) -> ReprocessOutcome {
        self.pipeline.reprocess_day(day).await
    }

    pub async fn clear_all_data(&self, keep_videos: bool) -> Result<ClearReport> {
        self.pipeline.clear_all_data(keep_videos).await
    }
}
