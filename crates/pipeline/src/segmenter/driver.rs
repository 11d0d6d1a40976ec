use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dubflow_db::models::TranscriptSegment;
use dubflow_services::{ObjectStore, TranscriptStore};
use tracing::{debug, error, info, warn};

use crate::clip;
use crate::config::SegmenterConfig;
use crate::segmenter::accumulator::{AccumulatorState, SpeakerAccumulator};

const POLL_BATCH_SIZE: u32 = 50;
const POLL_INTERVAL_BUSY: Duration = Duration::from_secs(2);
const POLL_INTERVAL_IDLE: Duration = Duration::from_secs(5);
/// Hard wall-clock ceiling on one watch run.
const WALL_CLOCK_CEILING: Duration = Duration::from_secs(600);
const PRELOAD_ATTEMPTS: u32 = 3;

/// Outcome of one segmenter run.
#[derive(Debug, Default)]
pub struct SegmenterReport {
    /// Number of clips produced.
    pub segment_count: u32,
    /// sequence → clip identity (`sequence_NNNN`) for every sentence whose
    /// `audio_key` was written.
    pub sentence_to_segment: HashMap<u32, String>,
    pub stats: SegmenterStats,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SegmenterStats {
    pub total_polls: u64,
    pub total_sentences_processed: u64,
    pub total_duration_ms: u64,
}

/// Polls the transcript store for newly persisted rows and assembles audio
/// clips through the per-speaker accumulators.
///
/// One logical task per transcription: rows are consumed in strictly
/// increasing `sequence` and never re-processed, clips are dispatched
/// serially, and `audio_key` writes are idempotent.
pub struct SegmenterDriver {
    store: Arc<dyn TranscriptStore>,
    objects: Arc<dyn ObjectStore>,
    config: SegmenterConfig,
    transcription_id: String,
    audio_key: String,
    output_prefix: String,
    initial_delay: Duration,

    audio: Vec<u8>,
    /// Active accumulators keyed by speaker; at most one speaker is live at
    /// a time because speaker changes retire the previous one.
    active: HashMap<String, SpeakerAccumulator>,
    last_seen_sequence: u32,
    clip_count: u32,
    sentence_to_segment: HashMap<u32, String>,
    stats: SegmenterStats,
}

impl SegmenterDriver {
    pub fn new(
        store: Arc<dyn TranscriptStore>,
        objects: Arc<dyn ObjectStore>,
        config: SegmenterConfig,
        transcription_id: impl Into<String>,
        audio_key: impl Into<String>,
        output_prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            objects,
            config,
            transcription_id: transcription_id.into(),
            audio_key: audio_key.into(),
            output_prefix: output_prefix.into(),
            initial_delay: Duration::ZERO,
            audio: Vec::new(),
            active: HashMap::new(),
            last_seen_sequence: 0,
            clip_count: 0,
            sentence_to_segment: HashMap::new(),
            stats: SegmenterStats::default(),
        }
    }

    /// Delay before the first poll (the orchestrator uses this to avoid
    /// querying an empty table).
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub async fn run(mut self) -> anyhow::Result<SegmenterReport> {
        info!(
            transcription_id = %self.transcription_id,
            audio_key = %self.audio_key,
            output_prefix = %self.output_prefix,
            "Segmenter started"
        );

        self.audio = self.preload_audio().await?;

        if !self.initial_delay.is_zero() {
            tokio::time::sleep(self.initial_delay).await;
        }

        let started = Instant::now();
        let deadline = started + WALL_CLOCK_CEILING;
        let mut saw_last = false;

        loop {
            if Instant::now() >= deadline {
                warn!(
                    transcription_id = %self.transcription_id,
                    "Segmenter hit wall-clock ceiling, finalizing with what arrived"
                );
                break;
            }

            let batch = self
                .store
                .select_after(&self.transcription_id, self.last_seen_sequence, POLL_BATCH_SIZE)
                .await?;
            self.stats.total_polls += 1;
            let busy = !batch.is_empty();

            if busy {
                let first_speaker = batch[0].speaker.clone();
                self.preflush_other_speakers(&first_speaker).await?;

                for row in batch {
                    let sequence = row.sequence;
                    if row.is_last {
                        saw_last = true;
                    }
                    self.process_row(row).await?;
                    // Advance only to what was actually observed so a lagging
                    // row would be picked up by a later poll.
                    if sequence > self.last_seen_sequence {
                        self.last_seen_sequence = sequence;
                    }
                }
            }

            if saw_last {
                debug!(
                    transcription_id = %self.transcription_id,
                    last_seen = self.last_seen_sequence,
                    "Final row observed, exiting poll loop"
                );
                break;
            }

            if let Some(transcription) =
                self.store.read_transcription(&self.transcription_id).await?
            {
                let totals_visible = transcription.processing_time_ms.is_some()
                    && transcription
                        .total_segments
                        .is_some_and(|total| self.last_seen_sequence >= total);
                if totals_visible {
                    debug!(
                        transcription_id = %self.transcription_id,
                        "All rows accounted for, exiting poll loop"
                    );
                    break;
                }
            }

            tokio::time::sleep(if busy {
                POLL_INTERVAL_BUSY
            } else {
                POLL_INTERVAL_IDLE
            })
            .await;
        }

        self.finalize_all().await?;
        self.stats.total_duration_ms = started.elapsed().as_millis() as u64;

        info!(
            transcription_id = %self.transcription_id,
            clips = self.clip_count,
            sentences = self.stats.total_sentences_processed,
            polls = self.stats.total_polls,
            "Segmenter finished"
        );

        Ok(SegmenterReport {
            segment_count: self.clip_count,
            sentence_to_segment: self.sentence_to_segment,
            stats: self.stats,
        })
    }

    /// Fetches the source audio once, with bounded linear-backoff retry.
    async fn preload_audio(&self) -> anyhow::Result<Vec<u8>> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.objects.get(&self.audio_key).await {
                Ok(bytes) => {
                    info!(
                        audio_key = %self.audio_key,
                        size = bytes.len(),
                        "Source audio loaded"
                    );
                    return Ok(bytes);
                }
                Err(e) if attempt < PRELOAD_ATTEMPTS => {
                    warn!(
                        audio_key = %self.audio_key,
                        attempt,
                        error = %e,
                        "Audio preload failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_secs(attempt as u64)).await;
                }
                Err(e) => {
                    return Err(anyhow::anyhow!(
                        "Failed to load source audio '{}' after {} attempts: {}",
                        self.audio_key,
                        PRELOAD_ATTEMPTS,
                        e
                    ));
                }
            }
        }
    }

    /// Feeds one persisted row into the accumulators.
    async fn process_row(&mut self, row: TranscriptSegment) -> anyhow::Result<()> {
        if !row.content_type.is_speech() {
            // The merge engine doesn't persist these; skip if one appears.
            debug!(sequence = row.sequence, "Skipping non-speech row");
            return Ok(());
        }
        if row.end_ms < row.start_ms {
            warn!(
                sequence = row.sequence,
                start_ms = row.start_ms,
                end_ms = row.end_ms,
                "Skipping row with inverted time range"
            );
            return Ok(());
        }

        self.stats.total_sentences_processed += 1;

        let Some(mut acc) = self.active.remove(&row.speaker) else {
            // Speaker change: retire whatever is active, then open fresh.
            let speakers: Vec<String> = self.active.keys().cloned().collect();
            for speaker in speakers {
                if let Some(old) = self.active.remove(&speaker) {
                    self.retire(old).await?;
                }
            }
            self.active
                .insert(row.speaker.clone(), SpeakerAccumulator::new(row));
            return Ok(());
        };

        match acc.state {
            AccumulatorState::Reusing => acc.add_reused(row),
            AccumulatorState::Accumulating => {
                acc.add(row, &self.config);
                let total = acc.total_duration_ms(self.config.gap_duration_ms);
                if total >= self.config.max_duration_ms && !acc.in_processing_queue {
                    acc.in_processing_queue = true;
                    debug!(
                        speaker = %acc.speaker,
                        total_duration_ms = total,
                        "Accumulator reached ceiling, dispatching clip"
                    );
                    self.dispatch_clip(&mut acc).await?;
                    acc.state = AccumulatorState::Reusing;
                }
            }
        }

        self.active.insert(acc.speaker.clone(), acc);
        Ok(())
    }

    /// Batch-start sweep: retire accumulators whose speaker differs from the
    /// incoming batch's first speaker.
    async fn preflush_other_speakers(&mut self, first_speaker: &str) -> anyhow::Result<()> {
        let speakers: Vec<String> = self
            .active
            .keys()
            .filter(|s| s.as_str() != first_speaker)
            .cloned()
            .collect();
        for speaker in speakers {
            if let Some(acc) = self.active.remove(&speaker) {
                self.retire(acc).await?;
            }
        }
        Ok(())
    }

    /// Post-loop sweep over every still-active accumulator.
    async fn finalize_all(&mut self) -> anyhow::Result<()> {
        let speakers: Vec<String> = self.active.keys().cloned().collect();
        for speaker in speakers {
            if let Some(acc) = self.active.remove(&speaker) {
                self.retire(acc).await?;
            }
        }
        Ok(())
    }

    /// Finalize (min-floor applies) or pure-reuse dispatch for an accumulator
    /// leaving the active map.
    async fn retire(&mut self, mut acc: SpeakerAccumulator) -> anyhow::Result<()> {
        match acc.state {
            AccumulatorState::Accumulating => {
                let total = acc.total_duration_ms(self.config.gap_duration_ms);
                if total < self.config.min_duration_ms {
                    debug!(
                        speaker = %acc.speaker,
                        total_duration_ms = total,
                        "Discarding accumulator below minimum duration"
                    );
                    return Ok(());
                }
                if !acc.in_processing_queue {
                    acc.in_processing_queue = true;
                    self.dispatch_clip(&mut acc).await?;
                }
            }
            AccumulatorState::Reusing => {
                if !acc.reused_sentences.is_empty() {
                    self.dispatch_reuse(&acc).await?;
                }
            }
        }
        Ok(())
    }

    /// Builds the clip, uploads it, and writes `audio_key` for every owned
    /// sentence. Clip/upload failures are logged and skipped: the sentences
    /// keep a null `audio_key` and other accumulators proceed. Store write
    /// failures propagate.
    async fn dispatch_clip(&mut self, acc: &mut SpeakerAccumulator) -> anyhow::Result<()> {
        let key = acc.clip_key(&self.output_prefix);

        let bytes = match clip::assemble_clip(
            &self.audio,
            &acc.time_ranges,
            self.config.gap_duration_ms,
        ) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(
                    speaker = %acc.speaker,
                    clip_key = %key,
                    error = %e,
                    "Clip assembly failed, skipping accumulator"
                );
                return Ok(());
            }
        };

        if let Err(e) = self.objects.put(&key, &bytes, "audio/wav").await {
            error!(
                clip_key = %key,
                error = %e,
                "Clip upload failed, skipping accumulator"
            );
            return Ok(());
        }

        let url = self.objects.public_url(&key);
        let sequences = acc.all_sequences();
        self.store
            .update_audio_key(&self.transcription_id, &sequences, &url)
            .await?;

        let segment_id = acc.segment_id();
        for sequence in &sequences {
            self.sentence_to_segment.insert(*sequence, segment_id.clone());
        }
        acc.generated_audio_key = Some(url);
        self.clip_count += 1;

        info!(
            speaker = %acc.speaker,
            clip_key = %key,
            sentences = sequences.len(),
            ranges = acc.time_ranges.len(),
            "Clip dispatched"
        );
        Ok(())
    }

    /// Writes only `audio_key` columns for reused sentences; produces no clip.
    async fn dispatch_reuse(&mut self, acc: &SpeakerAccumulator) -> anyhow::Result<()> {
        let Some(url) = acc.generated_audio_key.as_deref() else {
            // The owning clip dispatch failed earlier; nothing to inherit.
            debug!(speaker = %acc.speaker, "No clip to reuse, leaving audio_key null");
            return Ok(());
        };

        let sequences: Vec<u32> = acc.reused_sentences.iter().map(|s| s.sequence).collect();
        self.store
            .update_audio_key(&self.transcription_id, &sequences, url)
            .await?;

        let segment_id = acc.segment_id();
        for sequence in sequences {
            self.sentence_to_segment.insert(sequence, segment_id.clone());
        }

        info!(
            speaker = %acc.speaker,
            reused = acc.reused_sentences.len(),
            "Pure-reuse dispatch completed"
        );
        Ok(())
    }
}
