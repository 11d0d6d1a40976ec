//! Contracts for the external collaborators the pipeline calls but does not
//! own. The generative model has its own client in [`crate::model`]. Upload
//! handling and the downstream synthesizer never enter this process; the
//! synthesizer consumes the segmenter's sentence-to-clip map through the
//! watch response.

use async_trait::async_trait;
use serde::Deserialize;

/// Keys of the demuxed tracks, in the object store.
#[derive(Debug, Clone, Deserialize)]
pub struct SeparatedMedia {
    pub audio_key: String,
    pub video_key: String,
}

/// Audio/video demuxer. Splits the original upload into one audio and one
/// video blob at known keys.
#[async_trait]
pub trait MediaSeparator: Send + Sync + 'static {
    async fn separate(&self, original_key: &str, file_type: &str)
    -> anyhow::Result<SeparatedMedia>;
}

/// Demuxer reached over HTTP.
pub struct HttpMediaSeparator {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpMediaSeparator {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl MediaSeparator for HttpMediaSeparator {
    async fn separate(
        &self,
        original_key: &str,
        file_type: &str,
    ) -> anyhow::Result<SeparatedMedia> {
        let url = format!("{}/separate", self.endpoint.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({
                "original_key": original_key,
                "file_type": file_type,
            }))
            .send()
            .await?
            .error_for_status()?;
        let media = response.json().await?;
        Ok(media)
    }
}
