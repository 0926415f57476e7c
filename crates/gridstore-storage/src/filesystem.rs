//! File system storage provider

use crate::presign::{PresignedOperation, PresignedUrl};
use crate::{StorageProvider, validate_key};
use async_trait::async_trait;
use chrono::Utc;
use gridstore_core::{Error, Result, sha256_hex};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

const URL_SCHEME: &str = "file";
const TEMP_SUFFIX: &str = ".gridstore-tmp";

/// File system storage provider.
///
/// Stores each object as a file on the local file system.
/// Directory structure: `base_path/{key}` with `/` in keys mapped to directories.
/// Writes go to a temporary sibling first and are renamed into place.
pub struct FileSystemStorageProvider {
    base_path: PathBuf,
    instance: String,
    secret: String,
}

impl FileSystemStorageProvider {
    /// Create a new file system provider rooted at `base_path`
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            instance: Uuid::new_v4().simple().to_string(),
            secret: Uuid::new_v4().to_string(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Complete a client-direct upload against a URL from [`StorageProvider::presign_put`]
    pub async fn accept_upload(&self, url: &str, data: Vec<u8>) -> Result<String> {
        let key = self.verified_key(url, PresignedOperation::Put)?;
        self.put(&key, data).await
    }

    fn verified_key(&self, url: &str, operation: PresignedOperation) -> Result<String> {
        let parsed = PresignedUrl::parse(url)?;
        if parsed.scheme != URL_SCHEME || parsed.authority != self.instance {
            return Err(Error::provider("presigned URL belongs to another provider"));
        }
        parsed.verify(&self.secret, operation, Utc::now())?;
        Ok(parsed.key)
    }

    /// Get the file path for an object key
    fn object_path(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(key
            .split('/')
            .fold(self.base_path.clone(), |path, segment| path.join(segment)))
    }

    /// Walk the tree below `dir`, collecting keys that start with `prefix`
    async fn collect_keys(&self, dir: PathBuf, prefix: &str, keys: &mut Vec<String>) -> Result<()> {
        let mut pending = vec![dir];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(err.into()),
            };

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                if path.to_string_lossy().ends_with(TEMP_SUFFIX) {
                    continue;
                }
                if let Some(key) = self.key_for(&path)
                    && key.starts_with(prefix)
                {
                    keys.push(key);
                }
            }
        }

        Ok(())
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.base_path).ok()?;
        let segments: Option<Vec<&str>> = relative
            .components()
            .map(|component| component.as_os_str().to_str())
            .collect();
        Some(segments?.join("/"))
    }

    /// Deepest existing directory that can contain keys starting with `prefix`
    fn scan_root(&self, prefix: &str) -> PathBuf {
        let directory_part = match prefix.rfind('/') {
            Some(idx) => &prefix[..idx],
            None => "",
        };
        directory_part
            .split('/')
            .filter(|segment| !segment.is_empty() && *segment != "." && *segment != "..")
            .fold(self.base_path.clone(), |path, segment| path.join(segment))
    }

    fn presign(&self, operation: PresignedOperation, key: &str, expires: Duration) -> Result<String> {
        validate_key(key)?;
        Ok(PresignedUrl::sign(URL_SCHEME, &self.instance, &self.secret, operation, key, expires)?
            .to_url())
    }
}

#[async_trait]
impl StorageProvider for FileSystemStorageProvider {
    fn name(&self) -> &str {
        "filesystem"
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<String> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let checksum = sha256_hex(&data);
        let temp_path = PathBuf::from(format!(
            "{}.{}{}",
            path.display(),
            Uuid::new_v4().simple(),
            TEMP_SUFFIX
        ));

        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);

        if let Err(err) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(err.into());
        }

        Ok(checksum)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.object_path(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(Error::provider(format!("object not found: {}", key)))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let path = self.object_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            // Deleting a non-existent object is not an error
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        self.collect_keys(self.scan_root(prefix), prefix, &mut keys)
            .await?;
        keys.sort();
        Ok(keys)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.object_path(key)?;
        Ok(fs::try_exists(&path).await? && !path.is_dir())
    }

    async fn presign_get(&self, key: &str, expires: Duration) -> Result<String> {
        if !self.exists(key).await? {
            return Err(Error::provider(format!("object not found: {}", key)));
        }
        self.presign(PresignedOperation::Get, key, expires)
    }

    async fn presign_put(&self, key: &str, expires: Duration) -> Result<String> {
        self.presign(PresignedOperation::Put, key, expires)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_and_get() {
        let temp_dir = TempDir::new().unwrap();
        let provider = FileSystemStorageProvider::new(temp_dir.path());

        let checksum = provider
            .put("grid/sbx/shared/ns/_v1/_data", b"Hello, world!".to_vec())
            .await
            .unwrap();
        assert_eq!(checksum, sha256_hex(b"Hello, world!"));

        let data = provider.get("grid/sbx/shared/ns/_v1/_data").await.unwrap();
        assert_eq!(data, b"Hello, world!");
        assert!(temp_dir.path().join("grid/sbx/shared/ns/_v1/_data").exists());
    }

    #[tokio::test]
    async fn test_overwrite_replaces_content() {
        let temp_dir = TempDir::new().unwrap();
        let provider = FileSystemStorageProvider::new(temp_dir.path());

        provider.put("k", b"one".to_vec()).await.unwrap();
        provider.put("k", b"two".to_vec()).await.unwrap();
        assert_eq!(provider.get("k").await.unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_binary_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let provider = FileSystemStorageProvider::new(temp_dir.path());

        let binary_data: Vec<u8> = (0..=255).collect();
        provider.put("bin/image.png", binary_data.clone()).await.unwrap();
        assert_eq!(provider.get("bin/image.png").await.unwrap(), binary_data);
    }

    #[tokio::test]
    async fn test_list_by_prefix() {
        let temp_dir = TempDir::new().unwrap();
        let provider = FileSystemStorageProvider::new(temp_dir.path());

        for key in ["grid/s/a/1", "grid/s/a/sub/2", "grid/s/ab/3", "meta/x.json"] {
            provider.put(key, vec![1]).await.unwrap();
        }

        assert_eq!(
            provider.list("grid/s/a/").await.unwrap(),
            vec!["grid/s/a/1", "grid/s/a/sub/2"]
        );
        assert_eq!(
            provider.list("grid/s/a").await.unwrap(),
            vec!["grid/s/a/1", "grid/s/a/sub/2", "grid/s/ab/3"]
        );
        assert!(provider.list("missing/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_object() {
        let temp_dir = TempDir::new().unwrap();
        let provider = FileSystemStorageProvider::new(temp_dir.path());

        provider.put("a/b", b"To be deleted".to_vec()).await.unwrap();
        assert!(provider.delete("a/b").await.unwrap());
        assert!(!provider.delete("a/b").await.unwrap());
        assert!(provider.get("a/b").await.is_err());
        assert!(!provider.exists("a/b").await.unwrap());
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let temp_dir = TempDir::new().unwrap();
        let provider = FileSystemStorageProvider::new(temp_dir.path());
        assert!(provider.put("../outside", vec![1]).await.is_err());
    }

    #[tokio::test]
    async fn test_presigned_upload() {
        let temp_dir = TempDir::new().unwrap();
        let provider = FileSystemStorageProvider::new(temp_dir.path());

        let url = provider
            .presign_put("uploads/report.pdf", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(url.starts_with("file://"));

        provider.accept_upload(&url, b"%PDF".to_vec()).await.unwrap();
        assert_eq!(provider.get("uploads/report.pdf").await.unwrap(), b"%PDF");
    }

    #[tokio::test]
    async fn test_presigned_url_hides_layout_and_binds_instance() {
        let temp_dir = TempDir::new().unwrap();
        let provider = FileSystemStorageProvider::new(temp_dir.path());
        let other = FileSystemStorageProvider::new(temp_dir.path());

        let url = provider
            .presign_put("grid/sbx/shared/ns/_v1/_data", Duration::from_secs(60))
            .await
            .unwrap();
        let root = temp_dir.path().to_string_lossy().into_owned();
        assert!(!url.contains(&root));

        assert!(other.accept_upload(&url, b"x".to_vec()).await.is_err());
        assert!(!provider.exists("grid/sbx/shared/ns/_v1/_data").await.unwrap());
        provider.accept_upload(&url, b"x".to_vec()).await.unwrap();
    }
}
