use axum::{
    Json,
    extract::{Path, State},
};
use dubflow_db::models::{TargetLanguage, TranslationStyle};
use dubflow_pipeline::{TranslationOptions, WorkflowRequest};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct ProcessTaskRequest {
    #[validate(length(min = 1))]
    pub original_blob_key: String,
    #[validate(length(min = 1))]
    pub file_type: String,
    pub options: ProcessOptions,
}

#[derive(Debug, Deserialize)]
pub struct ProcessOptions {
    pub target_language: TargetLanguage,
    pub style: TranslationStyle,
}

#[derive(Serialize)]
pub struct ProcessTaskResponse {
    pub transcription_id: String,
    pub total_segments: u32,
    pub processing_time_ms: u64,
    pub segment_count: u32,
}

/// Orchestrator entry point: runs the whole job and returns only after both
/// concurrent tasks finish or one fails terminally.
pub async fn process(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    Json(body): Json<ProcessTaskRequest>,
) -> Result<Json<ProcessTaskResponse>, ApiError> {
    body.validate()?;

    let task = state
        .tasks
        .get(&task_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Task {task_id}")))?;

    let request = WorkflowRequest {
        task_id,
        user_id: task.user_id,
        original_key: body.original_blob_key,
        file_type: body.file_type,
        options: TranslationOptions {
            target_language: body.options.target_language,
            style: body.options.style,
        },
    };

    let outcome = state
        .workflow()
        .run(request)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(ProcessTaskResponse {
        transcription_id: outcome.transcription_id,
        total_segments: outcome.total_segments,
        processing_time_ms: outcome.processing_time_ms,
        segment_count: outcome.segmenter.segment_count,
    }))
}

#[derive(Serialize)]
pub struct TaskStatusResponse {
    pub task_id: String,
    pub status: String,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_key: Option<String>,
}

pub async fn get(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskStatusResponse>, ApiError> {
    let task = state
        .tasks
        .get(&task_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Task {task_id}")))?;

    Ok(Json(TaskStatusResponse {
        task_id: task.task_id,
        status: task.status.as_str().to_string(),
        progress: task.progress,
        error_message: task.error_message,
        audio_key: task.audio_key,
        video_key: task.video_key,
    }))
}
