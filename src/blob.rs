//! Durable storage for uploaded receipt images.
//!
//! Keys are derived from the upload's filename but always carry a fresh
//! unique prefix, so two uploads named `receipt.jpg` never overwrite each
//! other. The receipt record keeps the verbatim filename; only the on-disk
//! name is sanitized.

use std::path::PathBuf;

use tracing::debug;
use uuid::Uuid;

/// Location of a stored upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobKey(pub String);

#[derive(Debug, thiserror::Error)]
#[error("failed to write upload {filename}: {source}")]
pub struct BlobError {
    pub filename: String,
    #[source]
    pub source: std::io::Error,
}

#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    /// Persist `data`, returning the key it was written under.
    async fn put(&self, filename: &str, data: &[u8]) -> Result<BlobKey, BlobError>;

    /// Remove a previously written blob.
    async fn remove(&self, key: &BlobKey) -> std::io::Result<()>;
}

/// Filesystem blob store rooted at `<data dir>/uploads`.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[cfg(test)]
    pub(crate) fn root(&self) -> &std::path::Path {
        &self.root
    }

    pub fn path_of(&self, key: &BlobKey) -> PathBuf {
        self.root.join(&key.0)
    }
}

#[async_trait::async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, filename: &str, data: &[u8]) -> Result<BlobKey, BlobError> {
        let key = BlobKey(format!("{}-{}", Uuid::new_v4().simple(), disk_name(filename)));
        let path = self.path_of(&key);

        let write = async {
            tokio::fs::create_dir_all(&self.root).await?;
            tokio::fs::write(&path, data).await
        };
        write.await.map_err(|source| BlobError {
            filename: filename.to_string(),
            source,
        })?;

        debug!("BlobStore: wrote {} ({} bytes)", path.display(), data.len());
        Ok(key)
    }

    async fn remove(&self, key: &BlobKey) -> std::io::Result<()> {
        tokio::fs::remove_file(self.path_of(key)).await
    }
}

/// Reduce an uploaded filename to a single safe path component.
///
/// Directory parts (either separator) are dropped, and anything outside
/// `[A-Za-z0-9._-]` becomes `_`.
pub fn disk_name(filename: &str) -> String {
    let base = filename
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or_default();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_disk_name() {
        assert_eq!(disk_name("a.png"), "a.png");
        assert_eq!(disk_name("../../etc/passwd"), "passwd");
        assert_eq!(disk_name("C:\\scans\\lunch.jpg"), "lunch.jpg");
        assert_eq!(disk_name("café bill.jpg"), "caf__bill.jpg");
        assert_eq!(disk_name(".."), "upload");
        assert_eq!(disk_name(".hidden"), "hidden");
        assert_eq!(disk_name("dir/"), "upload");
    }

    #[tokio::test]
    async fn test_put_never_overwrites() {
        let tmp = TempDir::new().unwrap();
        let store = FsBlobStore::new(tmp.path().join("uploads"));

        let first = store.put("receipt.jpg", b"one").await.unwrap();
        let second = store.put("receipt.jpg", b"two").await.unwrap();

        assert_ne!(first, second);
        assert!(first.0.ends_with("-receipt.jpg"));
        assert_eq!(std::fs::read(store.path_of(&first)).unwrap(), b"one");
        assert_eq!(std::fs::read(store.path_of(&second)).unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_put_stays_inside_root() {
        let tmp = TempDir::new().unwrap();
        let store = FsBlobStore::new(tmp.path().join("uploads"));

        let key = store.put("../escape.png", b"x").await.unwrap();
        let path = store.path_of(&key);
        assert_eq!(path.parent().unwrap(), store.root());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_remove() {
        let tmp = TempDir::new().unwrap();
        let store = FsBlobStore::new(tmp.path());

        let key = store.put("a.png", b"x").await.unwrap();
        store.remove(&key).await.unwrap();
        assert!(!store.path_of(&key).exists());
    }

    #[tokio::test]
    async fn test_put_fails_when_root_is_a_file() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("uploads");
        std::fs::write(&blocker, b"not a dir").unwrap();

        let store = FsBlobStore::new(&blocker);
        let err = store.put("a.png", b"x").await.unwrap_err();
        assert_eq!(err.filename, "a.png");
    }
}
