use std::sync::Arc;
use std::time::Duration;

use bson::DateTime;
use dubflow_db::models::{TargetLanguage, TaskStatus, Transcription, TranslationStyle};
use dubflow_services::{ObjectStore, TaskStore, TranscriptStore};
use tracing::{error, info};

use crate::collab::MediaSeparator;
use crate::config::SegmenterConfig;
use crate::merge::{MergeEngine, MergeSummary};
use crate::model::{ModelClient, TranscribeRequest};
use crate::segmenter::{SegmenterDriver, SegmenterReport};

/// Delay before the segmenter's first poll, so it doesn't query before the
/// merge engine has written anything.
const SEGMENTER_START_DELAY: Duration = Duration::from_secs(3);

/// Aborts a spawned task when dropped.
///
/// `tokio::spawn` returns a `JoinHandle` whose `Drop` impl detaches (does NOT
/// abort) the task. Aborting an already-finished task is a no-op, so the
/// guard can stay armed for the whole workflow.
struct AbortOnDrop(tokio::task::AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Entry input, one per job.
#[derive(Debug, Clone)]
pub struct WorkflowRequest {
    pub task_id: String,
    pub user_id: String,
    pub original_key: String,
    pub file_type: String,
    pub options: TranslationOptions,
}

#[derive(Debug, Clone, Copy)]
pub struct TranslationOptions {
    pub target_language: TargetLanguage,
    pub style: TranslationStyle,
}

/// What the orchestrator hands back after both tasks complete.
#[derive(Debug)]
pub struct WorkflowOutcome {
    pub transcription_id: String,
    pub total_segments: u32,
    pub processing_time_ms: u64,
    pub segmenter: SegmenterReport,
}

/// Per-job orchestrator: demux, then transcript producer and segmenter
/// concurrently, then terminal status.
///
/// A producer failure aborts the segmenter at its next suspension point; a
/// segmenter failure leaves the transcript rows intact. Either failure marks
/// the task `failed` with the error message persisted; partial outputs are
/// never deleted.
pub struct TranslationWorkflow {
    tasks: Arc<dyn TaskStore>,
    store: Arc<dyn TranscriptStore>,
    objects: Arc<dyn ObjectStore>,
    separator: Arc<dyn MediaSeparator>,
    model: Arc<ModelClient>,
    segmenter_config: SegmenterConfig,
}

impl TranslationWorkflow {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        store: Arc<dyn TranscriptStore>,
        objects: Arc<dyn ObjectStore>,
        separator: Arc<dyn MediaSeparator>,
        model: Arc<ModelClient>,
        segmenter_config: SegmenterConfig,
    ) -> Self {
        Self {
            tasks,
            store,
            objects,
            separator,
            model,
            segmenter_config,
        }
    }

    /// Runs the job to completion. Returns only after both concurrent tasks
    /// finish or one fails terminally.
    pub async fn run(&self, request: WorkflowRequest) -> anyhow::Result<WorkflowOutcome> {
        match self.execute(&request).await {
            Ok(outcome) => {
                self.tasks
                    .set_status(&request.task_id, TaskStatus::Completed, 100)
                    .await?;
                info!(
                    task_id = %request.task_id,
                    transcription_id = %outcome.transcription_id,
                    total_segments = outcome.total_segments,
                    clips = outcome.segmenter.segment_count,
                    "Workflow completed"
                );
                Ok(outcome)
            }
            Err(e) => {
                error!(task_id = %request.task_id, error = %e, "Workflow failed");
                if let Err(mark_err) = self
                    .tasks
                    .mark_failed(&request.task_id, &e.to_string())
                    .await
                {
                    error!(
                        task_id = %request.task_id,
                        error = %mark_err,
                        "Failed to record task failure"
                    );
                }
                Err(e)
            }
        }
    }

    async fn execute(&self, request: &WorkflowRequest) -> anyhow::Result<WorkflowOutcome> {
        // 1. Demux the upload into audio and video tracks.
        self.tasks
            .set_status(&request.task_id, TaskStatus::Separating, 10)
            .await?;
        let media = self
            .separator
            .separate(&request.original_key, &request.file_type)
            .await?;
        self.tasks
            .set_media_keys(&request.task_id, &media.audio_key, &media.video_key)
            .await?;

        // 2. Create the transcription row before streaming starts.
        self.tasks
            .set_status(&request.task_id, TaskStatus::Transcribing, 30)
            .await?;
        let transcription_id = uuid::Uuid::new_v4().to_string();
        self.store
            .create_transcription(Transcription {
                id: None,
                transcription_id: transcription_id.clone(),
                task_id: request.task_id.clone(),
                target_language: request.options.target_language,
                style: request.options.style,
                total_segments: None,
                processing_time_ms: None,
                created_at: DateTime::now(),
            })
            .await?;

        // 3. Transcript producer and segmenter run concurrently; the only
        // shared state between them is the transcript store and object store.
        let output_prefix = format!(
            "users/{}/{}/audio-segments",
            request.user_id, request.task_id
        );
        let driver = SegmenterDriver::new(
            self.store.clone(),
            self.objects.clone(),
            self.segmenter_config.clone(),
            transcription_id.clone(),
            media.audio_key.clone(),
            output_prefix,
        )
        .with_initial_delay(SEGMENTER_START_DELAY);

        let segmenter = tokio::spawn(driver.run());
        // A producer error returns early and drops the guard: cooperative
        // cancellation of the segmenter at its next suspension point, with
        // rows already written staying readable. Aborting after a clean
        // join is a no-op.
        let _segmenter_guard = AbortOnDrop(segmenter.abort_handle());

        let summary = self
            .run_producer(&media.audio_key, &transcription_id, request.options)
            .await?;

        self.tasks
            .set_status(&request.task_id, TaskStatus::Transcribing, 80)
            .await?;

        // 4. Await the segmenter; its failure does not undo the transcript.
        let report = match segmenter.await {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => return Err(e.context("segmenter failed")),
            Err(join_err) => {
                return Err(anyhow::anyhow!("segmenter task aborted: {join_err}"));
            }
        };

        Ok(WorkflowOutcome {
            transcription_id,
            total_segments: summary.total_segments,
            processing_time_ms: summary.processing_time_ms,
            segmenter: report,
        })
    }

    /// C2 → C3: streams model output into the merge engine row by row.
    async fn run_producer(
        &self,
        audio_key: &str,
        transcription_id: &str,
        options: TranslationOptions,
    ) -> anyhow::Result<MergeSummary> {
        let audio = self.objects.get(audio_key).await?;
        let file_name = audio_key.rsplit('/').next().unwrap_or("audio").to_string();
        let mime_type = mime_for_key(audio_key).to_string();

        let mut stream = self
            .model
            .transcribe(TranscribeRequest {
                file: audio,
                file_name,
                mime_type,
                target_language: options.target_language,
                style: options.style,
            })
            .await?;

        let mut merge = MergeEngine::new(
            self.store.clone(),
            transcription_id,
            options.target_language,
        );
        let mut raw_count = 0u32;
        while let Some(raw) = stream.next_segment().await? {
            raw_count += 1;
            merge.push(raw).await?;
        }
        if let Some(reported) = stream.total_segments() {
            if reported != raw_count {
                tracing::warn!(
                    reported,
                    received = raw_count,
                    "Model-reported segment count differs from received"
                );
            }
        }
        merge.finish().await
    }
}

fn mime_for_key(key: &str) -> &'static str {
    match key.rsplit('.').next() {
        Some("wav") => "audio/wav",
        Some("aac") => "audio/aac",
        Some("mp3") => "audio/mpeg",
        Some("flac") => "audio/flac",
        Some("ogg") => "audio/ogg",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_for_key() {
        assert_eq!(mime_for_key("users/u1/t1/audio.wav"), "audio/wav");
        assert_eq!(mime_for_key("users/u1/t1/audio.aac"), "audio/aac");
        assert_eq!(mime_for_key("noext"), "application/octet-stream");
    }
}
