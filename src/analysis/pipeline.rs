use std::{
    future::Future,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{anyhow, Result};
use chrono::{Local, NaiveDate};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use super::{
    clock::{
        clamp_to_batch, format_clock, format_clock_24h, format_duration_mmss, parse_clock_on_date,
    },
    grouping::group_segments,
    prompts::{activity_cards_prompt, transcription_prompt},
    response::{parse_cards, parse_observations, ParsedCard, DEFAULT_CATEGORY},
    retention::{remove_files, sweep_expired_segments, RetentionReport},
};
use crate::{
    db::{
        helpers::local_datetime,
        models::{
            Batch, Observation, ProcessingStatus, RequestType, Segment, TableCounts,
            TimelineCard, UsageRecord,
        },
        Database,
    },
    inference::{Completion, InferenceGateway},
    media::SegmentMerger,
    settings::{AnalysisSettings, SettingsStore},
    utils::logging::preview,
};
use crate::{log_debug, log_error, log_info, log_warn};

const ENABLE_LOGS: bool = true;

/// Sliding-window context for Stage 2. Previous cards are not fed back yet.
const NO_PREVIOUS_CARDS: &str = "[]";

const DEBUG_CARD_TITLE: &str = "[调试模式] 默认活动";
const DEBUG_CARD_SUMMARY: &str = "调试模式下生成的默认活动卡片";

/// Why one batch ended `failed`.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("storage error: {0:#}")]
    Storage(anyhow::Error),
    #[error("merging segments failed: {0:#}")]
    Merge(anyhow::Error),
    #[error("{stage} request failed: {error:#}")]
    Gateway {
        stage: &'static str,
        error: anyhow::Error,
    },
    #[error("transcription produced no observations")]
    EmptyTranscription,
    #[error("synthesis produced no timeline cards")]
    EmptySynthesis,
    #[error("none of the batch's segments are still on record")]
    NoSegments,
}

impl From<anyhow::Error> for BatchError {
    fn from(error: anyhow::Error) -> Self {
        BatchError::Storage(error)
    }
}

#[derive(Debug)]
pub struct BatchOutcome {
    pub batch_id: Option<i64>,
    pub start_ts: i64,
    pub end_ts: i64,
    pub segment_count: usize,
    /// Number of cards persisted, or why the batch failed.
    pub result: Result<usize, BatchError>,
}

impl BatchOutcome {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

/// Every batch attempted by one pass, in processing order.
#[derive(Debug, Default)]
pub struct PassReport {
    pub batches: Vec<BatchOutcome>,
    /// Set when the pass stopped early because of cancellation.
    pub cancelled: bool,
}

impl PassReport {
    pub fn completed(&self) -> usize {
        self.batches.iter().filter(|b| b.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.batches.len() - self.completed()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReprocessOutcome {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClearReport {
    pub deleted: TableCounts,
    pub deleted_files: usize,
    pub failed_files: Vec<String>,
}

/// A card resolved to absolute time, before clamping.
struct CardDraft {
    title: String,
    description: String,
    category: String,
    start_ts: i64,
    end_ts: i64,
}

/// Drives segments through grouping, transcription and synthesis.
///
/// All passes share one guard, so a scheduled cycle, a manual trigger and a
/// reprocess never run concurrently. The guard is independent of the
/// database handle; timeline reads are never blocked by a model call.
pub struct BatchPipeline {
    db: Database,
    gateway: Arc<dyn InferenceGateway>,
    merger: Arc<dyn SegmentMerger>,
    settings: Arc<SettingsStore>,
    pass_guard: Mutex<()>,
}

impl BatchPipeline {
    pub fn new(
        db: Database,
        gateway: Arc<dyn InferenceGateway>,
        merger: Arc<dyn SegmentMerger>,
        settings: Arc<SettingsStore>,
    ) -> Self {
        Self {
            db,
            gateway,
            merger,
            settings,
            pass_guard: Mutex::new(()),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    /// One processing pass: re-run batches reset by a reprocess, then group
    /// and process pending segments. `cancel` is checked between batches.
    pub async fn run_pass(&self, cancel: &CancellationToken) -> Result<PassReport> {
        let _guard = self.pass_guard.lock().await;
        self.run_pass_locked(cancel).await
    }

    async fn run_pass_locked(&self, cancel: &CancellationToken) -> Result<PassReport> {
        let settings = self.settings.analysis();
        let mut report = PassReport::default();

        for batch in self.db.pending_batches().await? {
            if cancel.is_cancelled() {
                report.cancelled = true;
                return Ok(report);
            }
            report.batches.push(self.rerun_batch(&settings, batch).await);
        }

        let pending = self.db.list_pending_segments(settings.pending_limit).await?;
        if pending.is_empty() {
            return Ok(report);
        }
        log_info!("Found {} pending segments", pending.len());

        for group in group_segments(pending, settings.batch_duration_secs()) {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            report.batches.push(self.process_group(&settings, group).await);
        }

        Ok(report)
    }

    async fn process_group(&self, settings: &AnalysisSettings, segments: Vec<Segment>) -> BatchOutcome {
        let Some(batch) = Batch::spanning(&segments, ProcessingStatus::Processing) else {
            return BatchOutcome {
                batch_id: None,
                start_ts: 0,
                end_ts: 0,
                segment_count: 0,
                result: Err(BatchError::NoSegments),
            };
        };
        log_info!(
            "Processing batch {} - {} with {} segments",
            format_clock(batch.start_ts),
            format_clock(batch.end_ts),
            segments.len()
        );

        let batch_id = match self.db.insert_batch(&batch).await {
            Ok(id) => id,
            Err(err) => {
                self.mark_segments(&segments, ProcessingStatus::Failed).await;
                return BatchOutcome {
                    batch_id: None,
                    start_ts: batch.start_ts,
                    end_ts: batch.end_ts,
                    segment_count: segments.len(),
                    result: Err(BatchError::Storage(err)),
                };
            }
        };

        let result = self.analyze(settings, batch_id, &batch, &segments).await;
        self.finish(batch_id, &batch, segments, result).await
    }

    /// Run a `pending` batch again in place with whatever member segments are
    /// still recorded. Its previous observations are replaced.
    async fn rerun_batch(&self, settings: &AnalysisSettings, batch: Batch) -> BatchOutcome {
        let Some(batch_id) = batch.id else {
            return BatchOutcome {
                batch_id: None,
                start_ts: batch.start_ts,
                end_ts: batch.end_ts,
                segment_count: 0,
                result: Err(BatchError::NoSegments),
            };
        };
        log_info!("Re-running batch {batch_id} for {}", batch.day);

        let prepared = async {
            let segments = self.db.segments_in_range(batch.start_ts, batch.end_ts).await?;
            self.db
                .update_batch_status(batch_id, ProcessingStatus::Processing)
                .await?;
            self.db.delete_observations_for_batch(batch_id).await?;
            Ok::<_, anyhow::Error>(segments)
        }
        .await;

        match prepared {
            Ok(segments) if segments.is_empty() => {
                self.finish(batch_id, &batch, segments, Err(BatchError::NoSegments))
                    .await
            }
            Ok(segments) => {
                let result = self.analyze(settings, batch_id, &batch, &segments).await;
                self.finish(batch_id, &batch, segments, result).await
            }
            Err(err) => {
                self.finish(batch_id, &batch, Vec::new(), Err(BatchError::Storage(err)))
                    .await
            }
        }
    }

    /// Persist the terminal status of a batch and its segments.
    async fn finish(
        &self,
        batch_id: i64,
        batch: &Batch,
        segments: Vec<Segment>,
        result: Result<usize, BatchError>,
    ) -> BatchOutcome {
        let status = match &result {
            Ok(cards) => {
                log_info!("Batch {batch_id} completed with {cards} cards");
                ProcessingStatus::Completed
            }
            Err(err) => {
                log_error!("Batch {batch_id} failed: {err}");
                ProcessingStatus::Failed
            }
        };

        if let Err(err) = self.db.update_batch_status(batch_id, status).await {
            log_error!("Failed to mark batch {batch_id} {}: {err:#}", status.as_str());
        }
        self.mark_segments(&segments, status).await;

        BatchOutcome {
            batch_id: Some(batch_id),
            start_ts: batch.start_ts,
            end_ts: batch.end_ts,
            segment_count: segments.len(),
            result,
        }
    }

    async fn mark_segments(&self, segments: &[Segment], status: ProcessingStatus) {
        if segments.is_empty() {
            return;
        }
        let ids: Vec<i64> = segments.iter().map(|s| s.id).collect();
        if let Err(err) = self.db.update_segments_status(&ids, status).await {
            log_error!(
                "Failed to mark {} segments {}: {err:#}",
                ids.len(),
                status.as_str()
            );
        }
    }

    /// Both analysis stages for one batch. Returns the number of cards stored.
    async fn analyze(
        &self,
        settings: &AnalysisSettings,
        batch_id: i64,
        batch: &Batch,
        segments: &[Segment],
    ) -> Result<usize, BatchError> {
        let ids: Vec<i64> = segments.iter().map(|s| s.id).collect();
        self.db
            .update_segments_status(&ids, ProcessingStatus::Processing)
            .await?;

        let video = self.resolve_video(settings, batch, segments).await?;

        let observations = self.transcribe(settings, batch_id, batch, &video).await?;
        if observations.is_empty() {
            return Err(BatchError::EmptyTranscription);
        }
        self.db.insert_observations(&observations).await?;
        log_info!(
            "Stage 1 stored {} observations for batch {batch_id}",
            observations.len()
        );

        let drafts = self
            .synthesize(settings, batch_id, batch, &observations)
            .await?;
        if drafts.is_empty() {
            return Err(BatchError::EmptySynthesis);
        }

        let video_path = video.to_string_lossy().into_owned();
        for draft in &drafts {
            let (start_ts, end_ts) =
                clamp_to_batch(draft.start_ts, draft.end_ts, batch.start_ts, batch.end_ts);
            if (start_ts, end_ts) != (draft.start_ts, draft.end_ts) {
                log_debug!(
                    "Card '{}' adjusted from {}-{} to {}-{}",
                    draft.title,
                    draft.start_ts,
                    draft.end_ts,
                    start_ts,
                    end_ts
                );
            }
            self.db
                .insert_timeline_card(&TimelineCard {
                    id: None,
                    batch_id,
                    title: draft.title.clone(),
                    description: draft.description.clone(),
                    start_ts,
                    end_ts,
                    category: draft.category.clone(),
                    video_path: Some(video_path.clone()),
                })
                .await?;
        }

        Ok(drafts.len())
    }

    /// A lone segment is analysed straight from its file; anything longer is
    /// merged into `<output_dir>/batch_<start>.mp4` first.
    async fn resolve_video(
        &self,
        settings: &AnalysisSettings,
        batch: &Batch,
        segments: &[Segment],
    ) -> Result<PathBuf, BatchError> {
        if let [only] = segments {
            return Ok(only.path().to_path_buf());
        }

        let stamp = local_datetime(batch.start_ts).format("%Y%m%d_%H%M%S");
        let output = settings.output_dir.join(format!("batch_{stamp}.mp4"));
        let paths: Vec<PathBuf> = segments.iter().map(|s| s.path().to_path_buf()).collect();

        self.merger
            .merge(&paths, &output)
            .await
            .map_err(BatchError::Merge)
    }

    async fn transcribe(
        &self,
        settings: &AnalysisSettings,
        batch_id: i64,
        batch: &Batch,
        video: &Path,
    ) -> Result<Vec<Observation>, BatchError> {
        if settings.debug_mode {
            log_info!("Debug mode: canned observation for batch {batch_id}");
            return Ok(vec![Observation {
                id: None,
                batch_id,
                start_ts: batch.start_ts,
                end_ts: batch.end_ts,
                observation: format!(
                    "[调试模式] 默认观察记录 - 批次时间: {} - {}",
                    format_clock_24h(batch.start_ts),
                    format_clock_24h(batch.end_ts)
                ),
            }]);
        }

        let prompt = transcription_prompt(&format_duration_mmss(batch.duration_secs()));
        let completion = self
            .call_gateway(
                settings,
                "transcription",
                self.gateway.transcribe(video, &prompt, &settings.model),
            )
            .await?;
        self.record_usage(settings, batch_id, RequestType::Transcribe, &completion)
            .await;

        match parse_observations(&completion.text, batch.start_ts) {
            Ok(parsed) => Ok(parsed
                .into_iter()
                .map(|item| Observation {
                    id: None,
                    batch_id,
                    start_ts: item.start_ts,
                    end_ts: item.end_ts,
                    observation: item.description,
                })
                .collect()),
            Err(err) => {
                log_warn!(
                    "Unusable transcription for batch {batch_id}: {err}; response: {}",
                    preview(&completion.text, 200)
                );
                Ok(Vec::new())
            }
        }
    }

    async fn synthesize(
        &self,
        settings: &AnalysisSettings,
        batch_id: i64,
        batch: &Batch,
        observations: &[Observation],
    ) -> Result<Vec<CardDraft>, BatchError> {
        if settings.debug_mode {
            log_info!("Debug mode: canned card for batch {batch_id}");
            let span = format!(
                "{} - {}",
                format_clock(batch.start_ts),
                format_clock(batch.end_ts)
            );
            return Ok(vec![CardDraft {
                title: DEBUG_CARD_TITLE.to_string(),
                description: format!(
                    "这是调试模式下自动生成的默认活动卡片，用于测试流程而不消耗 Token。时间范围：{span}"
                ),
                category: DEFAULT_CATEGORY.to_string(),
                start_ts: batch.start_ts,
                end_ts: batch.end_ts,
            }]);
        }

        let prompt = activity_cards_prompt(&format_observations(observations), NO_PREVIOUS_CARDS);
        let completion = self
            .call_gateway(
                settings,
                "synthesis",
                self.gateway.synthesize(&prompt, &settings.model),
            )
            .await?;
        self.record_usage(settings, batch_id, RequestType::GenerateCards, &completion)
            .await;

        let cards = match parse_cards(&completion.text) {
            Ok(cards) => cards,
            Err(err) => {
                log_warn!(
                    "Unusable synthesis for batch {batch_id}: {err}; response: {}",
                    preview(&completion.text, 200)
                );
                return Ok(Vec::new());
            }
        };

        let date = local_datetime(batch.start_ts).date_naive();
        Ok(cards
            .iter()
            .map(|card| card_draft(card, date))
            .collect())
    }

    async fn call_gateway(
        &self,
        settings: &AnalysisSettings,
        stage: &'static str,
        call: impl Future<Output = Result<Completion>>,
    ) -> Result<Completion, BatchError> {
        let limit = Duration::from_secs(settings.request_timeout_secs);
        match tokio::time::timeout(limit, call).await {
            Ok(Ok(completion)) => Ok(completion),
            Ok(Err(error)) => Err(BatchError::Gateway { stage, error }),
            Err(_) => Err(BatchError::Gateway {
                stage,
                error: anyhow!("no answer within {}s", limit.as_secs()),
            }),
        }
    }

    /// Usage bookkeeping never fails a batch.
    async fn record_usage(
        &self,
        settings: &AnalysisSettings,
        batch_id: i64,
        request_type: RequestType,
        completion: &Completion,
    ) {
        let Some(usage) = completion.usage else {
            return;
        };
        let record = UsageRecord {
            request_type,
            model: settings.model.clone(),
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
            batch_id: Some(batch_id),
        };
        if let Err(err) = self.db.record_usage(&record).await {
            log_warn!("Failed to record token usage for batch {batch_id}: {err:#}");
        }
    }

    /// Delete retention-expired segments using the current settings.
    pub async fn sweep_retention(&self) -> Result<RetentionReport> {
        let retention_days = self.settings.analysis().retention_days;
        sweep_expired_segments(&self.db, retention_days, Local::now().timestamp()).await
    }

    /// Drop `day`'s cards and their videos, reset its batches to `pending`,
    /// then run a pass so they are analysed again.
    pub async fn reprocess_day(&self, day: &str) -> ReprocessOutcome {
        if NaiveDate::parse_from_str(day, "%Y-%m-%d").is_err() {
            return ReprocessOutcome {
                success: false,
                message: format!("invalid day '{day}', expected YYYY-MM-DD"),
            };
        }

        let _guard = self.pass_guard.lock().await;
        let reset = match self.reset_day(day).await {
            Ok(count) => count,
            Err(err) => {
                log_error!("Failed to reprocess {day}: {err:#}");
                return ReprocessOutcome {
                    success: false,
                    message: format!("{err:#}"),
                };
            }
        };

        match self.run_pass_locked(&CancellationToken::new()).await {
            Ok(report) => log_info!(
                "Reprocess pass for {day}: {} completed, {} failed",
                report.completed(),
                report.failed()
            ),
            Err(err) => log_error!("Reprocess pass for {day} failed: {err:#}"),
        }

        ReprocessOutcome {
            success: true,
            message: format!("Reprocessing {reset} batches for {day}"),
        }
    }

    async fn reset_day(&self, day: &str) -> Result<usize> {
        let video_paths = self.db.delete_timeline_cards_by_day(day).await?;
        let removal = remove_files(&video_paths).await;
        log_info!(
            "Removed {} cards' videos for {day} ({} failed)",
            removal.deleted,
            removal.failed.len()
        );

        let batches = self.db.list_batches_by_day(day).await?;
        for batch in &batches {
            if let Some(batch_id) = batch.id {
                self.db
                    .update_batch_status(batch_id, ProcessingStatus::Pending)
                    .await?;
            }
        }
        Ok(batches.len())
    }

    /// Wipe every pipeline table (configuration is kept). Unless
    /// `keep_videos`, also delete segment files and merged videos.
    pub async fn clear_all_data(&self, keep_videos: bool) -> Result<ClearReport> {
        let _guard = self.pass_guard.lock().await;
        let cleared = self.db.clear_all_data(!keep_videos).await?;
        let removal = remove_files(&cleared.file_paths).await;
        log_info!(
            "Cleared {} segments, {} batches, {} cards; {} files deleted, {} failed",
            cleared.deleted.segments,
            cleared.deleted.batches,
            cleared.deleted.timeline_cards,
            removal.deleted,
            removal.failed.len()
        );

        Ok(ClearReport {
            deleted: cleared.deleted,
            deleted_files: removal.deleted,
            failed_files: removal.failed,
        })
    }
}

/// `[h:mm AM - h:mm PM]: text` lines fed to Stage 2.
fn format_observations(observations: &[Observation]) -> String {
    observations
        .iter()
        .map(|o| {
            format!(
                "[{} - {}]: {}",
                format_clock(o.start_ts),
                format_clock(o.end_ts),
                o.observation
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Wall-clock text that cannot be read falls back to the current time.
fn clock_or_now(value: &str, date: NaiveDate) -> i64 {
    parse_clock_on_date(value, date).unwrap_or_else(|| {
        log_warn!("Unreadable card time '{value}', using now");
        Local::now().timestamp()
    })
}

fn card_draft(card: &ParsedCard, date: NaiveDate) -> CardDraft {
    CardDraft {
        title: card.title.clone(),
        description: card.description().to_string(),
        category: card.category.clone(),
        start_ts: clock_or_now(&card.start_time, date),
        end_ts: clock_or_now(&card.end_time, date),
    }
}
