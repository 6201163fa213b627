// blobs/mod.rs — Object store backed by the local filesystem.
//
// Mirrors the narrow surface the engines need from a blob service: write-once
// put, long-lived read reference, prefix listing, prefix deletion. Artifacts
// are owned by the flow that created them and never mutated after write.

use anyhow::{bail, Context as _, Result};
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub async fn new(data_dir: &Path) -> Result<Self> {
        let root = data_dir.join("blobs");
        tokio::fs::create_dir_all(&root)
            .await
            .with_context(|| format!("failed to create blob root {}", root.display()))?;
        Ok(Self { root })
    }

    /// Resolve a logical blob path, rejecting anything that could escape the
    /// root. Paths are forward-slash separated, e.g. `exports/u1/123.json`.
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        if path.is_empty()
            || path.starts_with('/')
            || path.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..")
        {
            bail!("invalid blob path: {path:?}");
        }
        Ok(self.root.join(path))
    }

    /// Write-once put. Fails if a blob already exists at `path` — artifacts
    /// are never overwritten.
    pub async fn put(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let full = self.resolve(path)?;
        if tokio::fs::try_exists(&full).await? {
            bail!("blob already exists at {path}");
        }
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, bytes)
            .await
            .with_context(|| format!("failed to write blob {path}"))?;
        Ok(())
    }

    pub async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path)?;
        Ok(tokio::fs::read(&full)
            .await
            .with_context(|| format!("failed to read blob {path}"))?)
    }

    pub async fn exists(&self, path: &str) -> Result<bool> {
        let full = self.resolve(path)?;
        Ok(tokio::fs::try_exists(&full).await?)
    }

    /// Long-lived retrieval reference for a stored blob. With a filesystem
    /// backend this is a `file://` URL; a cloud backend would mint a signed
    /// URL here instead.
    pub fn read_reference(&self, path: &str) -> String {
        format!("file://{}", self.root.join(path).display())
    }

    /// Logical paths of every blob under `prefix` (e.g. `user-uploads/u1/`).
    pub async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let base = self.resolve(prefix.trim_end_matches('/'))?;
        if !tokio::fs::try_exists(&base).await? {
            return Ok(vec![]);
        }

        let mut found = Vec::new();
        let mut stack = vec![base];
        while let Some(dir) = stack.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    stack.push(path);
                } else if let Ok(rel) = path.strip_prefix(&self.root) {
                    found.push(rel.to_string_lossy().replace('\\', "/"));
                }
            }
        }
        found.sort();
        Ok(found)
    }

    /// Delete every blob under `prefix`, best-effort per file. Returns the
    /// number of blobs removed; individual failures are logged and skipped so
    /// one stubborn file does not block the rest of the cleanup.
    pub async fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        let paths = self.list_prefix(prefix).await?;
        let mut deleted = 0;
        for path in paths {
            let full = self.root.join(&path);
            match tokio::fs::remove_file(&full).await {
                Ok(()) => deleted += 1,
                Err(e) => warn!(path = %path, err = %e, "failed to delete blob"),
            }
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> (BlobStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new(dir.path()).await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn put_is_write_once() {
        let (store, _dir) = test_store().await;
        store.put("exports/u1/1_export.json", b"{}").await.unwrap();
        let err = store
            .put("exports/u1/1_export.json", b"other")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert_eq!(store.read("exports/u1/1_export.json").await.unwrap(), b"{}");
    }

    #[tokio::test]
    async fn traversal_paths_are_rejected() {
        let (store, _dir) = test_store().await;
        for bad in ["../escape", "a/../../b", "/abs", "", "a//b"] {
            assert!(store.put(bad, b"x").await.is_err(), "accepted {bad:?}");
        }
    }

    #[tokio::test]
    async fn prefix_listing_and_deletion() {
        let (store, _dir) = test_store().await;
        store.put("profile-pictures/u1/a.png", b"a").await.unwrap();
        store.put("profile-pictures/u1/b.png", b"b").await.unwrap();
        store.put("profile-pictures/u2/c.png", b"c").await.unwrap();

        let listed = store.list_prefix("profile-pictures/u1/").await.unwrap();
        assert_eq!(
            listed,
            vec![
                "profile-pictures/u1/a.png".to_string(),
                "profile-pictures/u1/b.png".to_string()
            ]
        );

        assert_eq!(store.delete_prefix("profile-pictures/u1/").await.unwrap(), 2);
        assert!(store
            .list_prefix("profile-pictures/u1/")
            .await
            .unwrap()
            .is_empty());
        // Other users' blobs are untouched.
        assert!(store.exists("profile-pictures/u2/c.png").await.unwrap());
    }

    #[tokio::test]
    async fn missing_prefix_lists_empty() {
        let (store, _dir) = test_store().await;
        assert!(store.list_prefix("user-uploads/nobody/").await.unwrap().is_empty());
        assert_eq!(store.delete_prefix("user-uploads/nobody/").await.unwrap(), 0);
    }
}
