use axum::{
    Json,
    extract::{Path, Query, State},
};
use dubflow_db::models::{ContentType, TranscriptSegment};
use dubflow_services::SegmentTextField;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::ApiError;
use crate::state::AppState;

const MAX_PAGE_SIZE: u32 = 500;

#[derive(Serialize)]
pub struct TranscriptionResponse {
    pub transcription_id: String,
    pub task_id: String,
    pub target_language: String,
    pub style: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_segments: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<u64>,
}

pub async fn get(
    State(state): State<AppState>,
    Path(transcription_id): Path<String>,
) -> Result<Json<TranscriptionResponse>, ApiError> {
    let transcription = state
        .transcripts
        .read_transcription(&transcription_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Transcription {transcription_id}")))?;

    Ok(Json(TranscriptionResponse {
        transcription_id: transcription.transcription_id,
        task_id: transcription.task_id,
        target_language: transcription.target_language.as_str().to_string(),
        style: transcription.style.as_str().to_string(),
        total_segments: transcription.total_segments,
        processing_time_ms: transcription.processing_time_ms,
    }))
}

#[derive(Deserialize)]
pub struct SegmentQuery {
    /// Return rows with `sequence` strictly greater than this.
    #[serde(default)]
    pub after: u32,
    pub limit: Option<u32>,
}

#[derive(Serialize)]
pub struct SegmentView {
    pub sequence: u32,
    pub start_ms: u64,
    pub end_ms: u64,
    pub content_type: ContentType,
    pub speaker: String,
    pub original: String,
    pub translation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_key: Option<String>,
    pub is_first: bool,
    pub is_last: bool,
}

impl From<TranscriptSegment> for SegmentView {
    fn from(row: TranscriptSegment) -> Self {
        Self {
            sequence: row.sequence,
            start_ms: row.start_ms,
            end_ms: row.end_ms,
            content_type: row.content_type,
            speaker: row.speaker,
            original: row.original,
            translation: row.translation,
            audio_key: row.audio_key,
            is_first: row.is_first,
            is_last: row.is_last,
        }
    }
}

#[derive(Serialize)]
pub struct SegmentListResponse {
    pub segments: Vec<SegmentView>,
}

/// Range read in sequence order, for browsers rendering results as they
/// arrive.
pub async fn list_segments(
    State(state): State<AppState>,
    Path(transcription_id): Path<String>,
    Query(query): Query<SegmentQuery>,
) -> Result<Json<SegmentListResponse>, ApiError> {
    let limit = query.limit.unwrap_or(100).min(MAX_PAGE_SIZE);
    let rows = state
        .transcripts
        .select_after(&transcription_id, query.after, limit)
        .await?;

    Ok(Json(SegmentListResponse {
        segments: rows.into_iter().map(SegmentView::from).collect(),
    }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateSegmentRequest {
    pub field: String,
    #[validate(length(max = 10_000))]
    pub value: String,
}

/// Single-field overwrite of one segment's text.
pub async fn update_segment(
    State(state): State<AppState>,
    Path((transcription_id, sequence)): Path<(String, u32)>,
    Json(body): Json<UpdateSegmentRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    body.validate()?;

    let field = match body.field.as_str() {
        "original" => SegmentTextField::Original,
        "translation" => SegmentTextField::Translation,
        other => {
            return Err(ApiError::BadRequest(format!(
                "Unknown segment field '{other}'"
            )));
        }
    };

    let updated = state
        .transcripts
        .update_segment_text(&transcription_id, sequence, field, &body.value)
        .await?;
    if !updated {
        return Err(ApiError::NotFound(format!(
            "Segment {transcription_id}/{sequence}"
        )));
    }

    Ok(Json(serde_json::json!({ "updated": true })))
}
