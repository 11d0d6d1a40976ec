mod memory;
mod mongo;

pub use memory::{MemoryTaskStore, MemoryTranscriptStore};
pub use mongo::{MongoTaskStore, MongoTranscriptStore};

use async_trait::async_trait;
use dubflow_db::models::{MediaTask, TaskStatus, TranscriptSegment, Transcription};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found")]
    NotFound,
    #[error("Validation: {0}")]
    Validation(String),
    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),
    #[error("BSON serialization error: {0}")]
    BsonSer(#[from] bson::ser::Error),
    #[error("BSON deserialization error: {0}")]
    BsonDe(#[from] bson::de::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Writable text columns on a transcript segment (single-field overwrite).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentTextField {
    Original,
    Translation,
}

impl SegmentTextField {
    pub fn column(&self) -> &'static str {
        match self {
            SegmentTextField::Original => "original",
            SegmentTextField::Translation => "translation",
        }
    }
}

/// Durable, append-ordered transcript table keyed by
/// `(transcription_id, sequence)`.
///
/// A successful `insert_segment` of sequence `k` is visible to any later
/// `select_after` with `min_sequence < k`; `audio_key` updates may lag
/// inserts and readers tolerate null.
#[async_trait]
pub trait TranscriptStore: Send + Sync + 'static {
    async fn create_transcription(&self, transcription: Transcription) -> StoreResult<()>;

    async fn read_transcription(&self, transcription_id: &str)
    -> StoreResult<Option<Transcription>>;

    /// Writes the final segment count and processing duration, once, at
    /// stream end.
    async fn set_totals(
        &self,
        transcription_id: &str,
        total_segments: u32,
        processing_time_ms: u64,
    ) -> StoreResult<()>;

    /// Idempotent by `(transcription_id, sequence)`; re-inserting an existing
    /// pair is a no-op.
    async fn insert_segment(&self, segment: TranscriptSegment) -> StoreResult<()>;

    /// Rows with `sequence > min_sequence`, ascending, at most `limit`.
    async fn select_after(
        &self,
        transcription_id: &str,
        min_sequence: u32,
        limit: u32,
    ) -> StoreResult<Vec<TranscriptSegment>>;

    /// Flags the row as the final one of its transcription.
    async fn mark_last(&self, transcription_id: &str, sequence: u32) -> StoreResult<()>;

    /// Batched, idempotent clip-URL write; affects only rows whose sequence
    /// is in `sequences`. Returns the number of rows matched.
    async fn update_audio_key(
        &self,
        transcription_id: &str,
        sequences: &[u32],
        audio_key: &str,
    ) -> StoreResult<u64>;

    /// Overwrites a single text column on one row. Returns false when the row
    /// does not exist.
    async fn update_segment_text(
        &self,
        transcription_id: &str,
        sequence: u32,
        field: SegmentTextField,
        value: &str,
    ) -> StoreResult<bool>;
}

/// Task rows observed by callers polling job status.
#[async_trait]
pub trait TaskStore: Send + Sync + 'static {
    async fn create(&self, task: MediaTask) -> StoreResult<()>;

    async fn get(&self, task_id: &str) -> StoreResult<Option<MediaTask>>;

    async fn set_status(&self, task_id: &str, status: TaskStatus, progress: u8)
    -> StoreResult<()>;

    /// Records the demuxer outputs on the task row.
    async fn set_media_keys(
        &self,
        task_id: &str,
        audio_key: &str,
        video_key: &str,
    ) -> StoreResult<()>;

    async fn mark_failed(&self, task_id: &str, message: &str) -> StoreResult<()>;
}
