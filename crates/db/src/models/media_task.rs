use bson::{DateTime, oid::ObjectId};
use serde::{Deserialize, Serialize};

/// Lifecycle of a media translation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Created,
    Uploading,
    Uploaded,
    Separating,
    Transcribing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Created => "created",
            TaskStatus::Uploading => "uploading",
            TaskStatus::Uploaded => "uploaded",
            TaskStatus::Separating => "separating",
            TaskStatus::Transcribing => "transcribing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

/// One uploaded video and its translation job state.
///
/// The upload path (pre-signed URLs, multipart assembly) lives outside this
/// service; it creates the row and advances it to `uploaded`. The workflow
/// owns every later transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaTask {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub task_id: String,
    pub user_id: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub progress: u8,
    pub error_message: Option<String>,
    pub file_type: String,
    /// Object-store key of the original upload.
    pub original_key: String,
    /// Separated audio track, set after demux.
    pub audio_key: Option<String>,
    /// Separated video track, set after demux.
    pub video_key: Option<String>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl MediaTask {
    pub const COLLECTION: &'static str = "media_tasks";
}
