pub mod stream;

use std::sync::Arc;
use std::time::Duration;

use dubflow_db::models::{ContentType, TargetLanguage, TranslationStyle};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tokio::sync::Semaphore;
use tracing::info;

use crate::config::ModelConfig;
use crate::timecode::parse_timecode;
use stream::SegmentStream;

/// A transcript segment as emitted by the model, with times already parsed
/// to milliseconds. `sequence` is the model's raw counter; the merge engine
/// reassigns it.
#[derive(Debug, Clone)]
pub struct RawSegment {
    pub sequence: u32,
    pub start_ms: u64,
    pub end_ms: u64,
    pub content_type: ContentType,
    pub speaker: String,
    pub original: String,
    pub translation: String,
}

/// Wire form of a segment object: times are `"XmYsZms"` strings and the
/// content type is an open string.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireSegment {
    #[serde(default)]
    pub sequence: u32,
    #[serde(default)]
    pub start: String,
    #[serde(default)]
    pub end: String,
    #[serde(default)]
    pub content_type: String,
    #[serde(default = "default_speaker")]
    pub speaker: String,
    #[serde(default)]
    pub original: String,
    #[serde(default)]
    pub translation: String,
}

fn default_speaker() -> String {
    "N/A".to_string()
}

impl WireSegment {
    pub(crate) fn into_raw(self) -> RawSegment {
        RawSegment {
            sequence: self.sequence,
            start_ms: parse_timecode(&self.start).unwrap_or(0),
            end_ms: parse_timecode(&self.end).unwrap_or(0),
            content_type: parse_content_type(&self.content_type),
            speaker: self.speaker,
            original: self.original,
            translation: self.translation,
        }
    }
}

/// Unknown classifications map to non-human sounds, which the merge engine
/// drops; only the known speech kinds may enter the durable table.
fn parse_content_type(s: &str) -> ContentType {
    match s {
        "speech" => ContentType::Speech,
        "singing" => ContentType::Singing,
        "non_speech_human_vocalizations" => ContentType::NonSpeechHumanVocalizations,
        _ => ContentType::NonHumanSounds,
    }
}

/// Input for one streaming transcription call.
pub struct TranscribeRequest {
    pub file: Vec<u8>,
    pub file_name: String,
    pub mime_type: String,
    pub target_language: TargetLanguage,
    pub style: TranslationStyle,
}

/// Client for the generative-model transcription endpoint.
///
/// Posts a multipart form (`file`, `targetLanguage`, `style`, optional
/// `model`) and hands the streaming response to [`SegmentStream`].
/// Call concurrency is bounded by `max_concurrent_requests`.
pub struct ModelClient {
    http: reqwest::Client,
    config: ModelConfig,
    permits: Arc<Semaphore>,
}

impl ModelClient {
    pub fn new(config: ModelConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let permits = Arc::new(Semaphore::new(config.max_concurrent_requests.max(1)));
        Ok(Self {
            http,
            config,
            permits,
        })
    }

    /// Starts a streaming transcription. Resolves once response headers are
    /// in; segments arrive through the returned stream. The concurrency
    /// permit is held until the stream is dropped.
    pub async fn transcribe(&self, request: TranscribeRequest) -> anyhow::Result<SegmentStream> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| anyhow::anyhow!("Model request semaphore closed"))?;

        let file_size = request.file.len();
        let mut form = Form::new()
            .part(
                "file",
                Part::bytes(request.file)
                    .file_name(request.file_name.clone())
                    .mime_str(&request.mime_type)?,
            )
            .text("targetLanguage", request.target_language.as_str())
            .text("style", request.style.as_str());
        if let Some(model) = &self.config.model {
            form = form.text("model", model.clone());
        }

        info!(
            endpoint = %self.config.endpoint,
            file_name = %request.file_name,
            file_size,
            target_language = request.target_language.as_str(),
            style = request.style.as_str(),
            "Starting model transcription stream"
        );

        let response = self
            .http
            .post(&self.config.endpoint)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;

        Ok(SegmentStream::new(response, permit))
    }
}
