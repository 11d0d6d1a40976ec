use std::sync::Arc;
use std::time::Instant;

use dubflow_db::models::{ContentType, TargetLanguage, TranscriptSegment};
use dubflow_services::TranscriptStore;
use tracing::{debug, info, warn};

use crate::model::RawSegment;

/// Largest silence between two utterances that still allows a merge.
const MERGE_MAX_GAP_MS: u64 = 1_000;
/// A merge requires at least one side shorter than this.
const MERGE_SHORT_UTTERANCE_MS: u64 = 5_000;
/// Hard cap on a merged utterance's combined span.
const MERGE_MAX_COMBINED_MS: u64 = 10_000;

/// Folds raw model segments into coherent utterances and persists them with a
/// densely reassigned 1-based `sequence`.
///
/// At most one group is open at a time. Non-speech segments flush the open
/// group and are themselves dropped from durable output; rows with
/// `end_ms < start_ms` are rejected. Storage errors bubble up and abort the
/// job; rows already written stay visible to the segmenter.
pub struct MergeEngine {
    store: Arc<dyn TranscriptStore>,
    transcription_id: String,
    target_language: TargetLanguage,
    open: Option<MergeGroup>,
    next_sequence: u32,
    last_written: Option<u32>,
    started: Instant,
}

/// The single open buffer: first-segment snapshot plus running end time and
/// concatenated text.
struct MergeGroup {
    start_ms: u64,
    end_ms: u64,
    speaker: String,
    original: String,
    translation: String,
}

impl MergeGroup {
    fn from_raw(raw: &RawSegment) -> Self {
        Self {
            start_ms: raw.start_ms,
            end_ms: raw.end_ms,
            speaker: raw.speaker.clone(),
            original: raw.original.trim().to_string(),
            translation: raw.translation.trim().to_string(),
        }
    }

    /// The four merge predicates: same speaker, gap within bound, at least
    /// one short side, combined span within bound.
    fn can_absorb(&self, raw: &RawSegment) -> bool {
        if raw.speaker != self.speaker {
            return false;
        }
        let gap = raw.start_ms.saturating_sub(self.end_ms);
        if gap > MERGE_MAX_GAP_MS {
            return false;
        }
        let open_duration = self.end_ms.saturating_sub(self.start_ms);
        let curr_duration = raw.end_ms.saturating_sub(raw.start_ms);
        if open_duration >= MERGE_SHORT_UTTERANCE_MS && curr_duration >= MERGE_SHORT_UTTERANCE_MS {
            return false;
        }
        raw.end_ms.saturating_sub(self.start_ms) <= MERGE_MAX_COMBINED_MS
    }

    fn absorb(&mut self, raw: RawSegment, separator: &str) {
        self.end_ms = raw.end_ms;
        self.original = join_text(&self.original, raw.original.trim(), separator);
        self.translation = join_text(&self.translation, raw.translation.trim(), separator);
    }
}

fn join_text(left: &str, right: &str, separator: &str) -> String {
    if left.is_empty() {
        return right.to_string();
    }
    if right.is_empty() {
        return left.to_string();
    }
    format!("{left}{separator}{right}")
}

/// Totals recorded when the stream terminates cleanly.
#[derive(Debug, Clone, Copy)]
pub struct MergeSummary {
    pub total_segments: u32,
    pub processing_time_ms: u64,
}

impl MergeEngine {
    pub fn new(
        store: Arc<dyn TranscriptStore>,
        transcription_id: impl Into<String>,
        target_language: TargetLanguage,
    ) -> Self {
        Self {
            store,
            transcription_id: transcription_id.into(),
            target_language,
            open: None,
            next_sequence: 1,
            last_written: None,
            started: Instant::now(),
        }
    }

    /// Consumes one raw segment in arrival order.
    pub async fn push(&mut self, raw: RawSegment) -> anyhow::Result<()> {
        if raw.end_ms < raw.start_ms {
            warn!(
                transcription_id = %self.transcription_id,
                sequence = raw.sequence,
                start_ms = raw.start_ms,
                end_ms = raw.end_ms,
                "Rejecting segment with inverted time range"
            );
            return Ok(());
        }

        if !raw.content_type.is_speech() {
            self.flush_open().await?;
            debug!(
                content_type = ?raw.content_type,
                "Dropping non-speech segment from durable output"
            );
            return Ok(());
        }

        match self.open.take() {
            None => {
                self.open = Some(MergeGroup::from_raw(&raw));
            }
            Some(mut group) => {
                if group.can_absorb(&raw) {
                    group.absorb(raw, self.target_language.merge_separator());
                    self.open = Some(group);
                } else {
                    self.open = Some(group);
                    self.flush_open().await?;
                    self.open = Some(MergeGroup::from_raw(&raw));
                }
            }
        }
        Ok(())
    }

    /// Flushes the open group, marks the final row, and writes the totals
    /// onto the transcription row.
    pub async fn finish(&mut self) -> anyhow::Result<MergeSummary> {
        self.flush_open().await?;

        if let Some(last) = self.last_written {
            self.store
                .mark_last(&self.transcription_id, last)
                .await?;
        }

        let total_segments = self.next_sequence - 1;
        let processing_time_ms = self.started.elapsed().as_millis() as u64;
        self.store
            .set_totals(&self.transcription_id, total_segments, processing_time_ms)
            .await?;

        info!(
            transcription_id = %self.transcription_id,
            total_segments,
            processing_time_ms,
            "Transcript stream finished"
        );

        Ok(MergeSummary {
            total_segments,
            processing_time_ms,
        })
    }

    async fn flush_open(&mut self) -> anyhow::Result<()> {
        let Some(group) = self.open.take() else {
            return Ok(());
        };

        let sequence = self.next_sequence;
        let row = TranscriptSegment {
            id: None,
            transcription_id: self.transcription_id.clone(),
            sequence,
            start_ms: group.start_ms,
            end_ms: group.end_ms,
            content_type: ContentType::Speech,
            speaker: group.speaker,
            original: group.original,
            translation: group.translation,
            audio_key: None,
            is_first: sequence == 1,
            is_last: false,
        };

        self.store.insert_segment(row).await?;
        self.next_sequence += 1;
        self.last_written = Some(sequence);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::DateTime;
    use dubflow_db::models::{Transcription, TranslationStyle};
    use dubflow_services::MemoryTranscriptStore;

    fn speech(sequence: u32, start_ms: u64, end_ms: u64, speaker: &str, text: &str) -> RawSegment {
        RawSegment {
            sequence,
            start_ms,
            end_ms,
            content_type: ContentType::Speech,
            speaker: speaker.to_string(),
            original: text.to_string(),
            translation: format!("[{text}]"),
        }
    }

    fn non_speech(sequence: u32, start_ms: u64, end_ms: u64) -> RawSegment {
        RawSegment {
            sequence,
            start_ms,
            end_ms,
            content_type: ContentType::NonHumanSounds,
            speaker: "N/A".to_string(),
            original: String::new(),
            translation: String::new(),
        }
    }

    async fn engine(language: TargetLanguage) -> (Arc<MemoryTranscriptStore>, MergeEngine) {
        let store = Arc::new(MemoryTranscriptStore::new());
        store
            .create_transcription(Transcription {
                id: None,
                transcription_id: "t1".to_string(),
                task_id: "task1".to_string(),
                target_language: language,
                style: TranslationStyle::Normal,
                total_segments: None,
                processing_time_ms: None,
                created_at: DateTime::now(),
            })
            .await
            .unwrap();
        let engine = MergeEngine::new(store.clone(), "t1", language);
        (store, engine)
    }

    #[tokio::test]
    async fn test_two_sentences_merge() {
        let (store, mut engine) = engine(TargetLanguage::English).await;
        engine.push(speech(1, 0, 2_000, "A", "Hi.")).await.unwrap();
        engine
            .push(speech(2, 2_500, 4_000, "A", "There."))
            .await
            .unwrap();
        let summary = engine.finish().await.unwrap();

        assert_eq!(summary.total_segments, 1);
        let rows = store.select_after("t1", 0, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sequence, 1);
        assert_eq!(rows[0].start_ms, 0);
        assert_eq!(rows[0].end_ms, 4_000);
        assert_eq!(rows[0].speaker, "A");
        assert_eq!(rows[0].original, "Hi. There.");
        assert!(rows[0].is_first);
        assert!(rows[0].is_last);
    }

    #[tokio::test]
    async fn test_speaker_change_prevents_merge() {
        let (store, mut engine) = engine(TargetLanguage::English).await;
        engine.push(speech(1, 0, 2_000, "A", "Hi.")).await.unwrap();
        engine
            .push(speech(2, 2_500, 4_000, "B", "There."))
            .await
            .unwrap();
        let summary = engine.finish().await.unwrap();

        assert_eq!(summary.total_segments, 2);
        let rows = store.select_after("t1", 0, 10).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!((rows[0].start_ms, rows[0].end_ms), (0, 2_000));
        assert_eq!(rows[0].speaker, "A");
        assert!(rows[0].is_first);
        assert!(!rows[0].is_last);
        assert_eq!((rows[1].start_ms, rows[1].end_ms), (2_500, 4_000));
        assert_eq!(rows[1].speaker, "B");
        assert!(!rows[1].is_first);
        assert!(rows[1].is_last);
    }

    #[tokio::test]
    async fn test_gap_over_one_second_prevents_merge() {
        let (store, mut engine) = engine(TargetLanguage::English).await;
        engine.push(speech(1, 0, 2_000, "A", "Hi.")).await.unwrap();
        engine
            .push(speech(2, 3_001, 4_000, "A", "There."))
            .await
            .unwrap();
        engine.finish().await.unwrap();

        let rows = store.select_after("t1", 0, 10).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_two_long_sides_prevent_merge() {
        let (store, mut engine) = engine(TargetLanguage::English).await;
        // Adjacent, combined span exactly at the cap, but neither side is
        // shorter than 5000 ms.
        engine.push(speech(1, 0, 5_000, "A", "one")).await.unwrap();
        engine
            .push(speech(2, 5_000, 10_000, "A", "two"))
            .await
            .unwrap();
        engine.finish().await.unwrap();

        let rows = store.select_after("t1", 0, 10).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_combined_span_cap_prevents_merge() {
        let (store, mut engine) = engine(TargetLanguage::English).await;
        engine.push(speech(1, 0, 4_000, "A", "one")).await.unwrap();
        // Gap and short-side predicates hold, but combined span is 10_500.
        engine
            .push(speech(2, 4_100, 10_500, "A", "two"))
            .await
            .unwrap();
        engine.finish().await.unwrap();

        let rows = store.select_after("t1", 0, 10).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_chinese_merges_without_separator() {
        let (store, mut engine) = engine(TargetLanguage::Chinese).await;
        engine.push(speech(1, 0, 1_000, "A", "你好")).await.unwrap();
        engine
            .push(speech(2, 1_200, 2_000, "A", "世界"))
            .await
            .unwrap();
        engine.finish().await.unwrap();

        let rows = store.select_after("t1", 0, 10).await.unwrap();
        assert_eq!(rows[0].original, "你好世界");
    }

    #[tokio::test]
    async fn test_non_speech_flushes_and_is_dropped() {
        let (store, mut engine) = engine(TargetLanguage::English).await;
        engine.push(speech(1, 0, 2_000, "A", "Hi.")).await.unwrap();
        engine.push(non_speech(2, 2_100, 2_900)).await.unwrap();
        // Would have merged with the first row, but the group was flushed.
        engine
            .push(speech(3, 3_000, 4_000, "A", "There."))
            .await
            .unwrap();
        let summary = engine.finish().await.unwrap();

        assert_eq!(summary.total_segments, 2);
        let rows = store.select_after("t1", 0, 10).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.content_type == ContentType::Speech));
    }

    #[tokio::test]
    async fn test_inverted_range_is_rejected() {
        let (store, mut engine) = engine(TargetLanguage::English).await;
        engine.push(speech(1, 5_000, 4_000, "A", "bad")).await.unwrap();
        let summary = engine.finish().await.unwrap();

        assert_eq!(summary.total_segments, 0);
        assert!(store.select_after("t1", 0, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_all_gaps_over_bound_yield_one_row_per_input() {
        let (store, mut engine) = engine(TargetLanguage::English).await;
        for i in 0..5u32 {
            let start = i as u64 * 3_000;
            engine
                .push(speech(i + 1, start, start + 1_500, "A", "word"))
                .await
                .unwrap();
        }
        let summary = engine.finish().await.unwrap();

        assert_eq!(summary.total_segments, 5);
        let rows = store.select_after("t1", 0, 10).await.unwrap();
        let sequences: Vec<u32> = rows.iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3, 4, 5]);
        assert!(rows.iter().all(|r| r.original == "word"));
        assert!(rows[4].is_last);
    }

    #[tokio::test]
    async fn test_totals_written_on_finish() {
        let (store, mut engine) = engine(TargetLanguage::English).await;
        engine.push(speech(1, 0, 2_000, "A", "Hi.")).await.unwrap();
        engine.finish().await.unwrap();

        let transcription = store.read_transcription("t1").await.unwrap().unwrap();
        assert_eq!(transcription.total_segments, Some(1));
        assert!(transcription.processing_time_ms.is_some());
    }
}
