mod fs;
mod memory;

pub use fs::FsObjectStore;
pub use memory::MemoryObjectStore;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("Invalid object key: {0}")]
    InvalidKey(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Clone)]
pub struct ObjectMetadata {
    pub size: u64,
    pub content_type: Option<String>,
}

/// Blob gateway shared by the pipeline stages.
///
/// All writes are single-object; multi-part assembly is an upload-path
/// concern outside this service.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    async fn get(&self, key: &str) -> StorageResult<Vec<u8>>;

    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> StorageResult<()>;

    async fn head(&self, key: &str) -> StorageResult<Option<ObjectMetadata>>;

    /// Public URL for a key: `https://{domain}/{key}` when a public domain is
    /// configured, otherwise the raw key.
    fn public_url(&self, key: &str) -> String;
}

pub(crate) fn build_public_url(public_domain: Option<&str>, key: &str) -> String {
    match public_domain {
        Some(domain) => format!("https://{}/{}", domain, key.trim_start_matches('/')),
        None => key.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_url_prefers_domain() {
        assert_eq!(
            build_public_url(Some("media.example.com"), "users/u1/t1/audio.aac"),
            "https://media.example.com/users/u1/t1/audio.aac"
        );
        assert_eq!(
            build_public_url(None, "users/u1/t1/audio.aac"),
            "users/u1/t1/audio.aac"
        );
    }
}
