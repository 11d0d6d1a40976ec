use dubflow_db::models::TranscriptSegment;

use crate::config::SegmenterConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulatorState {
    /// Collecting sentences; time ranges still grow.
    Accumulating,
    /// The ceiling was reached and a clip owns the frozen ranges; later
    /// sentences of the same speaker inherit that clip.
    Reusing,
}

/// Per-speaker clip-assembly state machine.
///
/// Created on a speaker's first speech sentence, destroyed on speaker change
/// or stream end. While `Accumulating`, each added sentence either extends
/// the last time range (gap within the threshold) or opens a new one; once
/// the total duration reaches the ceiling the accumulator flips to `Reusing`
/// and its ranges freeze.
#[derive(Debug)]
pub struct SpeakerAccumulator {
    pub speaker: String,
    pub time_ranges: Vec<(u64, u64)>,
    pub pending_sentences: Vec<TranscriptSegment>,
    pub reused_sentences: Vec<TranscriptSegment>,
    pub sequence_start: u32,
    pub state: AccumulatorState,
    pub generated_audio_key: Option<String>,
    pub in_processing_queue: bool,
}

impl SpeakerAccumulator {
    pub fn new(sentence: TranscriptSegment) -> Self {
        Self {
            speaker: sentence.speaker.clone(),
            time_ranges: vec![(sentence.start_ms, sentence.end_ms)],
            sequence_start: sentence.sequence,
            pending_sentences: vec![sentence],
            reused_sentences: Vec::new(),
            state: AccumulatorState::Accumulating,
            generated_audio_key: None,
            in_processing_queue: false,
        }
    }

    /// Adds a sentence while `Accumulating`.
    pub fn add(&mut self, sentence: TranscriptSegment, config: &SegmenterConfig) {
        debug_assert_eq!(self.state, AccumulatorState::Accumulating);

        let last_end = self.time_ranges.last().map(|r| r.1).unwrap_or(0);
        let gap = sentence.start_ms.saturating_sub(last_end);
        if gap <= config.gap_threshold_ms() {
            if let Some(last) = self.time_ranges.last_mut() {
                last.1 = sentence.end_ms;
            }
        } else {
            self.time_ranges.push((sentence.start_ms, sentence.end_ms));
        }
        self.pending_sentences.push(sentence);
    }

    /// Records a sentence that arrived while `Reusing`; it will inherit
    /// `generated_audio_key` without changing the clip.
    pub fn add_reused(&mut self, sentence: TranscriptSegment) {
        self.reused_sentences.push(sentence);
    }

    /// Length of the clip this accumulator would produce: the range spans
    /// plus one inter-range silence per boundary.
    pub fn total_duration_ms(&self, gap_duration_ms: u64) -> u64 {
        let spans: u64 = self
            .time_ranges
            .iter()
            .map(|(start, end)| end.saturating_sub(*start))
            .sum();
        spans + gap_duration_ms * self.time_ranges.len().saturating_sub(1) as u64
    }

    /// Clip identity: `sequence_` + zero-padded starting sequence.
    pub fn segment_id(&self) -> String {
        format!("sequence_{:04}", self.sequence_start)
    }

    /// Object key for the produced clip.
    pub fn clip_key(&self, output_prefix: &str) -> String {
        format!(
            "{}/{}_{}.wav",
            output_prefix.trim_end_matches('/'),
            self.segment_id(),
            sanitize_speaker(&self.speaker)
        )
    }

    /// Sequences of every sentence this accumulator owns.
    pub fn all_sequences(&self) -> Vec<u32> {
        self.pending_sentences
            .iter()
            .chain(self.reused_sentences.iter())
            .map(|s| s.sequence)
            .collect()
    }
}

/// Speaker labels are free strings from the model; keep object keys safe.
fn sanitize_speaker(speaker: &str) -> String {
    let cleaned: String = speaker
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}
