use std::collections::BTreeMap;

use async_trait::async_trait;
use dashmap::DashMap;
use dubflow_db::models::{MediaTask, TaskStatus, TranscriptSegment, Transcription};

use super::{SegmentTextField, StoreError, StoreResult, TaskStore, TranscriptStore};

/// In-memory transcript store with the same visibility guarantees as the
/// MongoDB implementation. Used by tests and by local development without a
/// database.
#[derive(Default)]
pub struct MemoryTranscriptStore {
    transcriptions: DashMap<String, Transcription>,
    /// transcription_id -> sequence-ordered rows.
    segments: DashMap<String, BTreeMap<u32, TranscriptSegment>>,
}

impl MemoryTranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// IDs of every transcription created in this store.
    pub fn transcription_ids(&self) -> Vec<String> {
        self.transcriptions.iter().map(|t| t.key().clone()).collect()
    }
}

#[async_trait]
impl TranscriptStore for MemoryTranscriptStore {
    async fn create_transcription(&self, transcription: Transcription) -> StoreResult<()> {
        self.transcriptions
            .insert(transcription.transcription_id.clone(), transcription);
        Ok(())
    }

    async fn read_transcription(
        &self,
        transcription_id: &str,
    ) -> StoreResult<Option<Transcription>> {
        Ok(self
            .transcriptions
            .get(transcription_id)
            .map(|t| t.clone()))
    }

    async fn set_totals(
        &self,
        transcription_id: &str,
        total_segments: u32,
        processing_time_ms: u64,
    ) -> StoreResult<()> {
        let mut entry = self
            .transcriptions
            .get_mut(transcription_id)
            .ok_or(StoreError::NotFound)?;
        entry.total_segments = Some(total_segments);
        entry.processing_time_ms = Some(processing_time_ms);
        Ok(())
    }

    async fn insert_segment(&self, segment: TranscriptSegment) -> StoreResult<()> {
        let mut rows = self
            .segments
            .entry(segment.transcription_id.clone())
            .or_default();
        // Idempotent by (transcription_id, sequence): keep the first write.
        rows.entry(segment.sequence).or_insert(segment);
        Ok(())
    }

    async fn select_after(
        &self,
        transcription_id: &str,
        min_sequence: u32,
        limit: u32,
    ) -> StoreResult<Vec<TranscriptSegment>> {
        let Some(rows) = self.segments.get(transcription_id) else {
            return Ok(Vec::new());
        };
        Ok(rows
            .range(min_sequence.saturating_add(1)..)
            .take(limit as usize)
            .map(|(_, row)| row.clone())
            .collect())
    }

    async fn mark_last(&self, transcription_id: &str, sequence: u32) -> StoreResult<()> {
        let mut rows = self
            .segments
            .get_mut(transcription_id)
            .ok_or(StoreError::NotFound)?;
        let row = rows.get_mut(&sequence).ok_or(StoreError::NotFound)?;
        row.is_last = true;
        Ok(())
    }

    async fn update_audio_key(
        &self,
        transcription_id: &str,
        sequences: &[u32],
        audio_key: &str,
    ) -> StoreResult<u64> {
        let Some(mut rows) = self.segments.get_mut(transcription_id) else {
            return Ok(0);
        };
        let mut matched = 0;
        for sequence in sequences {
            if let Some(row) = rows.get_mut(sequence) {
                row.audio_key = Some(audio_key.to_string());
                matched += 1;
            }
        }
        Ok(matched)
    }

    async fn update_segment_text(
        &self,
        transcription_id: &str,
        sequence: u32,
        field: SegmentTextField,
        value: &str,
    ) -> StoreResult<bool> {
        let Some(mut rows) = self.segments.get_mut(transcription_id) else {
            return Ok(false);
        };
        let Some(row) = rows.get_mut(&sequence) else {
            return Ok(false);
        };
        match field {
            SegmentTextField::Original => row.original = value.to_string(),
            SegmentTextField::Translation => row.translation = value.to_string(),
        }
        Ok(true)
    }
}

/// In-memory task store.
#[derive(Default)]
pub struct MemoryTaskStore {
    tasks: DashMap<String, MediaTask>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn create(&self, task: MediaTask) -> StoreResult<()> {
        self.tasks.insert(task.task_id.clone(), task);
        Ok(())
    }

    async fn get(&self, task_id: &str) -> StoreResult<Option<MediaTask>> {
        Ok(self.tasks.get(task_id).map(|t| t.clone()))
    }

    async fn set_status(
        &self,
        task_id: &str,
        status: TaskStatus,
        progress: u8,
    ) -> StoreResult<()> {
        let mut task = self.tasks.get_mut(task_id).ok_or(StoreError::NotFound)?;
        task.status = status;
        task.progress = progress;
        task.updated_at = bson::DateTime::now();
        Ok(())
    }

    async fn set_media_keys(
        &self,
        task_id: &str,
        audio_key: &str,
        video_key: &str,
    ) -> StoreResult<()> {
        let mut task = self.tasks.get_mut(task_id).ok_or(StoreError::NotFound)?;
        task.audio_key = Some(audio_key.to_string());
        task.video_key = Some(video_key.to_string());
        task.updated_at = bson::DateTime::now();
        Ok(())
    }

    async fn mark_failed(&self, task_id: &str, message: &str) -> StoreResult<()> {
        let mut task = self.tasks.get_mut(task_id).ok_or(StoreError::NotFound)?;
        task.status = TaskStatus::Failed;
        task.error_message = Some(message.to_string());
        task.updated_at = bson::DateTime::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dubflow_db::models::ContentType;

    fn row(id: &str, sequence: u32) -> TranscriptSegment {
        TranscriptSegment {
            id: None,
            transcription_id: id.to_string(),
            sequence,
            start_ms: sequence as u64 * 1000,
            end_ms: sequence as u64 * 1000 + 500,
            content_type: ContentType::Speech,
            speaker: "A".to_string(),
            original: "hi".to_string(),
            translation: "hallo".to_string(),
            audio_key: None,
            is_first: sequence == 1,
            is_last: false,
        }
    }

    #[tokio::test]
    async fn test_insert_is_idempotent() {
        let store = MemoryTranscriptStore::new();
        store.insert_segment(row("t1", 1)).await.unwrap();
        let mut dup = row("t1", 1);
        dup.original = "changed".to_string();
        store.insert_segment(dup).await.unwrap();

        let rows = store.select_after("t1", 0, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].original, "hi");
    }

    #[tokio::test]
    async fn test_select_after_orders_and_limits() {
        let store = MemoryTranscriptStore::new();
        for seq in [3, 1, 2, 4] {
            store.insert_segment(row("t1", seq)).await.unwrap();
        }
        let rows = store.select_after("t1", 1, 2).await.unwrap();
        let sequences: Vec<u32> = rows.iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_update_audio_key_targets_listed_rows() {
        let store = MemoryTranscriptStore::new();
        for seq in 1..=3 {
            store.insert_segment(row("t1", seq)).await.unwrap();
        }
        let matched = store
            .update_audio_key("t1", &[1, 3, 9], "clips/a.wav")
            .await
            .unwrap();
        assert_eq!(matched, 2);

        let rows = store.select_after("t1", 0, 10).await.unwrap();
        assert_eq!(rows[0].audio_key.as_deref(), Some("clips/a.wav"));
        assert_eq!(rows[1].audio_key, None);
        assert_eq!(rows[2].audio_key.as_deref(), Some("clips/a.wav"));
    }
}
