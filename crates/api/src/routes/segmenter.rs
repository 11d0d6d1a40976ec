use std::collections::HashMap;

use axum::{Json, extract::State};
use dubflow_pipeline::SegmenterDriver;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use validator::Validate;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct WatchRequest {
    #[validate(length(min = 1))]
    pub audio_key: String,
    #[validate(length(min = 1))]
    pub transcription_id: String,
    #[validate(length(min = 1))]
    pub output_prefix: String,
    #[serde(default)]
    pub task_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchResponse {
    pub success: bool,
    pub segment_count: u32,
    pub sentence_to_segment_map: HashMap<u32, String>,
    pub stats: WatchStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct WatchStats {
    pub total_polls: u64,
    pub total_sentences_processed: u64,
    pub total_duration: u64,
}

/// Runs the segmenter standalone against an existing transcription, watching
/// the store until the final row lands.
pub async fn watch(
    State(state): State<AppState>,
    Json(body): Json<WatchRequest>,
) -> Result<Json<WatchResponse>, ApiError> {
    body.validate()?;

    info!(
        transcription_id = %body.transcription_id,
        audio_key = %body.audio_key,
        task_id = body.task_id.as_deref().unwrap_or("-"),
        "Segmenter watch requested"
    );

    let driver = SegmenterDriver::new(
        state.transcripts.clone(),
        state.objects.clone(),
        state.segmenter_config.clone(),
        body.transcription_id.clone(),
        body.audio_key.clone(),
        body.output_prefix.clone(),
    );

    match driver.run().await {
        Ok(report) => Ok(Json(WatchResponse {
            success: true,
            segment_count: report.segment_count,
            sentence_to_segment_map: report.sentence_to_segment,
            stats: WatchStats {
                total_polls: report.stats.total_polls,
                total_sentences_processed: report.stats.total_sentences_processed,
                total_duration: report.stats.total_duration_ms,
            },
            error: None,
        })),
        Err(e) => {
            warn!(
                transcription_id = %body.transcription_id,
                error = %e,
                "Segmenter watch failed"
            );
            Ok(Json(WatchResponse {
                success: false,
                segment_count: 0,
                sentence_to_segment_map: HashMap::new(),
                stats: WatchStats::default(),
                error: Some(e.to_string()),
            }))
        }
    }
}
