use async_trait::async_trait;
use dashmap::DashMap;

use super::{ObjectMetadata, ObjectStore, StorageError, StorageResult, build_public_url};

struct StoredObject {
    bytes: Vec<u8>,
    content_type: String,
}

/// In-memory object store for tests and local development.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: DashMap<String, StoredObject>,
    public_domain: Option<String>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_public_domain(domain: impl Into<String>) -> Self {
        Self {
            objects: DashMap::new(),
            public_domain: Some(domain.into()),
        }
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.objects
            .get(key)
            .map(|o| o.bytes.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> StorageResult<()> {
        self.objects.insert(
            key.to_string(),
            StoredObject {
                bytes: bytes.to_vec(),
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn head(&self, key: &str) -> StorageResult<Option<ObjectMetadata>> {
        Ok(self.objects.get(key).map(|o| ObjectMetadata {
            size: o.bytes.len() as u64,
            content_type: Some(o.content_type.clone()),
        }))
    }

    fn public_url(&self, key: &str) -> String {
        build_public_url(self.public_domain.as_deref(), key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_head() {
        let store = MemoryObjectStore::new();
        store.put("a/b.wav", b"RIFF", "audio/wav").await.unwrap();

        assert_eq!(store.get("a/b.wav").await.unwrap(), b"RIFF");
        let meta = store.head("a/b.wav").await.unwrap().unwrap();
        assert_eq!(meta.size, 4);
        assert_eq!(meta.content_type.as_deref(), Some("audio/wav"));
        assert!(store.head("missing").await.unwrap().is_none());
        assert!(matches!(
            store.get("missing").await,
            Err(StorageError::NotFound(_))
        ));
    }
}
