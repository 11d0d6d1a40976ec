use async_trait::async_trait;
use bson::doc;
use dubflow_db::models::{MediaTask, TaskStatus, TranscriptSegment, Transcription};
use futures::TryStreamExt;
use mongodb::{Collection, Database};
use tracing::debug;

use super::{SegmentTextField, StoreError, StoreResult, TaskStore, TranscriptStore};

/// MongoDB-backed transcript store. Uniqueness of
/// `(transcription_id, sequence)` is enforced by the compound index created
/// in `dubflow_db::indexes`.
pub struct MongoTranscriptStore {
    transcriptions: Collection<Transcription>,
    segments: Collection<TranscriptSegment>,
}

impl MongoTranscriptStore {
    pub fn new(db: &Database) -> Self {
        Self {
            transcriptions: db.collection(Transcription::COLLECTION),
            segments: db.collection(TranscriptSegment::COLLECTION),
        }
    }
}

#[async_trait]
impl TranscriptStore for MongoTranscriptStore {
    async fn create_transcription(&self, transcription: Transcription) -> StoreResult<()> {
        self.transcriptions.insert_one(&transcription).await?;
        Ok(())
    }

    async fn read_transcription(
        &self,
        transcription_id: &str,
    ) -> StoreResult<Option<Transcription>> {
        let found = self
            .transcriptions
            .find_one(doc! { "transcription_id": transcription_id })
            .await?;
        Ok(found)
    }

    async fn set_totals(
        &self,
        transcription_id: &str,
        total_segments: u32,
        processing_time_ms: u64,
    ) -> StoreResult<()> {
        let result = self
            .transcriptions
            .update_one(
                doc! { "transcription_id": transcription_id },
                doc! { "$set": {
                    "total_segments": total_segments as i64,
                    "processing_time_ms": processing_time_ms as i64,
                }},
            )
            .await?;
        if result.matched_count == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn insert_segment(&self, segment: TranscriptSegment) -> StoreResult<()> {
        match self.segments.insert_one(&segment).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => {
                // Re-insert of the same (transcription_id, sequence) pair:
                // the row is already durable, treat as success.
                debug!(
                    transcription_id = %segment.transcription_id,
                    sequence = segment.sequence,
                    "Duplicate segment insert ignored"
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn select_after(
        &self,
        transcription_id: &str,
        min_sequence: u32,
        limit: u32,
    ) -> StoreResult<Vec<TranscriptSegment>> {
        let cursor = self
            .segments
            .find(doc! {
                "transcription_id": transcription_id,
                "sequence": { "$gt": min_sequence as i64 },
            })
            .sort(doc! { "sequence": 1 })
            .limit(limit as i64)
            .await?;
        let rows = cursor.try_collect().await?;
        Ok(rows)
    }

    async fn mark_last(&self, transcription_id: &str, sequence: u32) -> StoreResult<()> {
        let result = self
            .segments
            .update_one(
                doc! { "transcription_id": transcription_id, "sequence": sequence as i64 },
                doc! { "$set": { "is_last": true } },
            )
            .await?;
        if result.matched_count == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn update_audio_key(
        &self,
        transcription_id: &str,
        sequences: &[u32],
        audio_key: &str,
    ) -> StoreResult<u64> {
        if sequences.is_empty() {
            return Ok(0);
        }
        let seqs: Vec<i64> = sequences.iter().map(|s| *s as i64).collect();
        let result = self
            .segments
            .update_many(
                doc! {
                    "transcription_id": transcription_id,
                    "sequence": { "$in": seqs },
                },
                doc! { "$set": { "audio_key": audio_key } },
            )
            .await?;
        Ok(result.matched_count)
    }

    async fn update_segment_text(
        &self,
        transcription_id: &str,
        sequence: u32,
        field: SegmentTextField,
        value: &str,
    ) -> StoreResult<bool> {
        let result = self
            .segments
            .update_one(
                doc! { "transcription_id": transcription_id, "sequence": sequence as i64 },
                doc! { "$set": { field.column(): value } },
            )
            .await?;
        Ok(result.matched_count > 0)
    }
}

/// MongoDB-backed task store.
pub struct MongoTaskStore {
    tasks: Collection<MediaTask>,
}

impl MongoTaskStore {
    pub fn new(db: &Database) -> Self {
        Self {
            tasks: db.collection(MediaTask::COLLECTION),
        }
    }
}

#[async_trait]
impl TaskStore for MongoTaskStore {
    async fn create(&self, task: MediaTask) -> StoreResult<()> {
        self.tasks.insert_one(&task).await?;
        Ok(())
    }

    async fn get(&self, task_id: &str) -> StoreResult<Option<MediaTask>> {
        let found = self.tasks.find_one(doc! { "task_id": task_id }).await?;
        Ok(found)
    }

    async fn set_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        progress: u8,
    ) -> StoreResult<()> {
        let result = self
            .tasks
            .update_one(
                doc! { "task_id": task_id },
                doc! { "$set": {
                    "status": status.as_str(),
                    "progress": progress as i32,
                    "updated_at": bson::DateTime::now(),
                }},
            )
            .await?;
        if result.matched_count == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn set_media_keys(
        &self,
        task_id: &str,
        audio_key: &str,
        video_key: &str,
    ) -> StoreResult<()> {
        let result = self
            .tasks
            .update_one(
                doc! { "task_id": task_id },
                doc! { "$set": {
                    "audio_key": audio_key,
                    "video_key": video_key,
                    "updated_at": bson::DateTime::now(),
                }},
            )
            .await?;
        if result.matched_count == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn mark_failed(&self, task_id: &str, message: &str) -> StoreResult<()> {
        let result = self
            .tasks
            .update_one(
                doc! { "task_id": task_id },
                doc! { "$set": {
                    "status": TaskStatus::Failed.as_str(),
                    "error_message": message,
                    "updated_at": bson::DateTime::now(),
                }},
            )
            .await?;
        if result.matched_count == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    if let mongodb::error::ErrorKind::Write(mongodb::error::WriteFailure::WriteError(we)) =
        err.kind.as_ref()
    {
        return we.code == 11000;
    }
    false
}
