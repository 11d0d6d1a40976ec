use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Process-wide settings, loaded once at startup.
///
/// Sources, in override order: `config/default.toml` (optional), then
/// environment variables prefixed `DUBFLOW` with `__` as the section
/// separator (e.g. `DUBFLOW__DATABASE__URI`).
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub model: ModelSettings,
    #[serde(default)]
    pub separator: SeparatorSettings,
    #[serde(default)]
    pub segmenter: SegmenterSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_mongo_uri")]
    pub uri: String,
    #[serde(default = "default_db_name")]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageSettings {
    /// Root directory for the filesystem object store.
    #[serde(default = "default_storage_root")]
    pub root: String,
    /// Optional public host used to build clip URLs (`https://{domain}/{key}`).
    pub public_domain: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelSettings {
    /// Generative-model transcription endpoint (streaming response).
    #[serde(default = "default_model_endpoint")]
    pub endpoint: String,
    /// Optional model name forwarded in the multipart form.
    pub model: Option<String>,
    /// Per-transport timeout for the model call.
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,
    /// Generative-model call concurrency.
    #[serde(default = "default_model_concurrency")]
    pub max_concurrent_requests: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeparatorSettings {
    /// Audio/video demuxer service endpoint.
    #[serde(default = "default_separator_endpoint")]
    pub endpoint: String,
}

/// Segmenter tunables; read once at task start.
#[derive(Debug, Clone, Deserialize)]
pub struct SegmenterSettings {
    /// Silence inserted between ranges in a clip.
    #[serde(default = "default_gap_duration")]
    pub gap_duration_ms: u64,
    /// Accumulator ceiling.
    #[serde(default = "default_max_duration")]
    pub max_duration_ms: u64,
    /// Floor under which accumulators are discarded.
    #[serde(default = "default_min_duration")]
    pub min_duration_ms: u64,
    /// Multiplier applied to `gap_duration_ms` to decide range-extend vs. new-range.
    #[serde(default = "default_gap_multiplier")]
    pub gap_threshold_multiplier: u64,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(Environment::with_prefix("DUBFLOW").separator("__"))
            .build()?
            .try_deserialize()
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            uri: default_mongo_uri(),
            name: default_db_name(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
            public_domain: None,
        }
    }
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            endpoint: default_model_endpoint(),
            model: None,
            timeout_secs: default_model_timeout(),
            max_concurrent_requests: default_model_concurrency(),
        }
    }
}

impl Default for SeparatorSettings {
    fn default() -> Self {
        Self {
            endpoint: default_separator_endpoint(),
        }
    }
}

impl Default for SegmenterSettings {
    fn default() -> Self {
        Self {
            gap_duration_ms: default_gap_duration(),
            max_duration_ms: default_max_duration(),
            min_duration_ms: default_min_duration(),
            gap_threshold_multiplier: default_gap_multiplier(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_mongo_uri() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_db_name() -> String {
    "dubflow".to_string()
}

fn default_storage_root() -> String {
    "data/objects".to_string()
}

fn default_model_endpoint() -> String {
    "http://localhost:9090/transcribe".to_string()
}

fn default_model_timeout() -> u64 {
    600
}

fn default_model_concurrency() -> usize {
    1
}

fn default_separator_endpoint() -> String {
    "http://localhost:9091".to_string()
}

fn default_gap_duration() -> u64 {
    500
}

fn default_max_duration() -> u64 {
    12_000
}

fn default_min_duration() -> u64 {
    1_000
}

fn default_gap_multiplier() -> u64 {
    3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings: Settings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.segmenter.gap_duration_ms, 500);
        assert_eq!(settings.segmenter.max_duration_ms, 12_000);
        assert_eq!(settings.segmenter.min_duration_ms, 1_000);
        assert_eq!(settings.segmenter.gap_threshold_multiplier, 3);
        assert_eq!(settings.model.max_concurrent_requests, 1);
        assert!(settings.storage.public_domain.is_none());
    }
}
