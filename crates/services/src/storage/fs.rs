use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use super::{ObjectMetadata, ObjectStore, StorageError, StorageResult, build_public_url};

/// Filesystem-backed object store rooted at a data directory.
///
/// Keys map to paths under the root; traversal components are rejected so a
/// key can never escape it.
pub struct FsObjectStore {
    root: PathBuf,
    public_domain: Option<String>,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>, public_domain: Option<String>) -> Self {
        Self {
            root: root.into(),
            public_domain,
        }
    }

    fn resolve(&self, key: &str) -> StorageResult<PathBuf> {
        let relative = Path::new(key.trim_start_matches('/'));
        if relative.as_os_str().is_empty() {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        for component in relative.components() {
            match component {
                Component::Normal(_) => {}
                _ => return Err(StorageError::InvalidKey(key.to_string())),
            }
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> StorageResult<()> {
        let path = self.resolve(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        debug!(key, size = bytes.len(), content_type, "Object written");
        Ok(())
    }

    async fn head(&self, key: &str) -> StorageResult<Option<ObjectMetadata>> {
        let path = self.resolve(key)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) => Ok(Some(ObjectMetadata {
                size: meta.len(),
                content_type: None,
            })),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn public_url(&self, key: &str) -> String {
        build_public_url(self.public_domain.as_deref(), key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path(), None);

        store
            .put("users/u1/t1/audio.aac", b"bytes", "audio/aac")
            .await
            .unwrap();
        assert_eq!(store.get("users/u1/t1/audio.aac").await.unwrap(), b"bytes");
        let meta = store.head("users/u1/t1/audio.aac").await.unwrap().unwrap();
        assert_eq!(meta.size, 5);
        assert!(store.head("users/u1/t1/missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_traversal_keys_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path(), None);

        assert!(matches!(
            store.get("../etc/passwd").await,
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(
            store.put("a/../../b", b"x", "text/plain").await,
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_public_url_fallback_is_raw_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path(), Some("cdn.example.com".to_string()));
        assert_eq!(
            store.public_url("a/b.wav"),
            "https://cdn.example.com/a/b.wav"
        );
    }
}
