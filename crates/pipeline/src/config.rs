use serde::{Deserialize, Serialize};

/// Tunables for the audio segmenter. Read once at task start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmenterConfig {
    /// Silence inserted between time ranges inside a clip.
    pub gap_duration_ms: u64,
    /// Accumulator ceiling; reaching it freezes the ranges and produces a clip.
    pub max_duration_ms: u64,
    /// Accumulators finalized below this total duration are discarded.
    pub min_duration_ms: u64,
    /// Multiplier applied to `gap_duration_ms` to decide range-extend vs.
    /// new-range when a sentence is added.
    pub gap_threshold_multiplier: u64,
}

impl SegmenterConfig {
    /// Largest inter-sentence gap that still extends the open range.
    pub fn gap_threshold_ms(&self) -> u64 {
        self.gap_duration_ms * self.gap_threshold_multiplier
    }
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            gap_duration_ms: 500,
            max_duration_ms: 12_000,
            min_duration_ms: 1_000,
            gap_threshold_multiplier: 3,
        }
    }
}

impl From<&dubflow_config::SegmenterSettings> for SegmenterConfig {
    fn from(settings: &dubflow_config::SegmenterSettings) -> Self {
        Self {
            gap_duration_ms: settings.gap_duration_ms,
            max_duration_ms: settings.max_duration_ms,
            min_duration_ms: settings.min_duration_ms,
            gap_threshold_multiplier: settings.gap_threshold_multiplier,
        }
    }
}

/// Generative-model call configuration.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Streaming transcription endpoint.
    pub endpoint: String,
    /// Optional model name forwarded in the multipart form.
    pub model: Option<String>,
    /// Per-transport timeout on the streaming call.
    pub timeout_secs: u64,
    /// Concurrent model calls allowed per process.
    pub max_concurrent_requests: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9090/transcribe".to_string(),
            model: None,
            timeout_secs: 600,
            max_concurrent_requests: 1,
        }
    }
}

impl From<&dubflow_config::ModelSettings> for ModelConfig {
    fn from(settings: &dubflow_config::ModelSettings) -> Self {
        Self {
            endpoint: settings.endpoint.clone(),
            model: settings.model.clone(),
            timeout_secs: settings.timeout_secs,
            max_concurrent_requests: settings.max_concurrent_requests.max(1),
        }
    }
}
