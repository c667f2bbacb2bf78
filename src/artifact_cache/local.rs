use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use tokio::fs::{create_dir_all, remove_file, rename, try_exists, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error, trace, warn};
use uuid::Uuid;

use crate::artifact_cache::{ErrorHandler, RemoteArtifactCache};
use crate::util::blob::Blob;
use crate::util::validating_stream::ValidatingStream;

const INDEX_FILE: &str = "index.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct IndexEntry {
    file_name: String,
    sha1: [u8;20],
    md5: [u8;16],
}

/// Keeps downloaded bytes in a single directory, one uniquely named file per URI. The URI to file
///  mapping is persisted in `index.json` next to the files so entries survive restarts.
pub struct LocalRemoteArtifactCache {
    root: PathBuf,
    index: Mutex<HashMap<String, IndexEntry>>,
}

impl LocalRemoteArtifactCache {
    pub async fn open(root: &Path) -> anyhow::Result<LocalRemoteArtifactCache> {
        create_dir_all(root).await
            .with_context(|| format!("creating remote artifact cache directory {}", root.display()))?;

        let index_path = root.join(INDEX_FILE);
        let index = if try_exists(&index_path).await? {
            let json = tokio::fs::read(&index_path).await?;
            match serde_json::from_slice(&json) {
                Ok(index) => index,
                Err(e) => {
                    warn!("discarding unreadable index {}: {}", index_path.display(), e);
                    HashMap::new()
                }
            }
        }
        else {
            HashMap::new()
        };

        debug!("opened remote artifact cache in {} with {} entries", root.display(), index.len());
        Ok(LocalRemoteArtifactCache {
            root: root.to_path_buf(),
            index: Mutex::new(index),
        })
    }

    /// SHA1 and MD5 of the bytes cached for `uri`, as computed while storing them
    pub async fn checksums(&self, uri: &str) -> Option<([u8;20], [u8;16])> {
        self.index.lock().await
            .get(uri)
            .map(|e| (e.sha1, e.md5))
    }

    fn path_for(&self, entry: &IndexEntry) -> PathBuf {
        self.root.join(&entry.file_name)
    }

    async fn do_insert(temp_path: &Path, blob: Blob) -> anyhow::Result<([u8;20], [u8;16])> {
        let mut data = ValidatingStream::for_blob(blob);

        let mut file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(temp_path)
            .await?;

        let mut sha1_hasher: Sha1 = Default::default();
        let mut md5_hasher = md5::Context::new();

        while let Some(bytes) = data.next().await {
            let bytes = bytes?;
            sha1_hasher.update(&bytes);
            md5_hasher.consume(&bytes);
            file.write_all(&bytes).await?;
        }
        file.flush().await?;

        Ok((sha1_hasher.finalize().into(), md5_hasher.compute().into()))
    }

    async fn persist_index(&self, index: &HashMap<String, IndexEntry>) -> anyhow::Result<()> {
        let json = serde_json::to_vec_pretty(index)?;
        let temp_path = self.root.join(format!("{}.writing", INDEX_FILE));
        tokio::fs::write(&temp_path, json).await?;
        rename(&temp_path, self.root.join(INDEX_FILE)).await?;
        Ok(())
    }

    async fn register(&self, uri: &str, entry: IndexEntry) -> anyhow::Result<PathBuf> {
        let path = self.path_for(&entry);

        let mut index = self.index.lock().await;
        let previous = index.insert(uri.to_string(), entry);
        if let Err(e) = self.persist_index(&index).await {
            match previous {
                Some(previous) => index.insert(uri.to_string(), previous),
                None => index.remove(uri),
            };
            return Err(e);
        }
        drop(index);

        if let Some(previous) = previous {
            let previous_path = self.path_for(&previous);
            if let Err(e) = remove_file(&previous_path).await {
                debug!("could not remove replaced file {}: {}", previous_path.display(), e);
            }
        }
        Ok(path)
    }
}

#[async_trait]
impl RemoteArtifactCache for LocalRemoteArtifactCache {
    async fn get(&self, uri: &str) -> Option<PathBuf> {
        let mut index = self.index.lock().await;
        let path = self.path_for(index.get(uri)?);

        match try_exists(&path).await {
            Ok(true) => Some(path),
            _ => {
                debug!("cached file {} for {} is gone - dropping the entry", path.display(), uri);
                index.remove(uri);
                if let Err(e) = self.persist_index(&index).await {
                    warn!("failed to persist remote artifact cache index: {:#}", e);
                }
                None
            }
        }
    }

    async fn put(&self, uri: &str, blob: Blob, on_error: ErrorHandler<'_>) -> Option<PathBuf> {
        let key = Uuid::new_v4();
        let file_name = key.as_hyphenated().to_string();
        let temp_path = self.root.join(format!("{}.inserting", file_name));

        trace!("storing {} as {}", uri, file_name);

        let stored = match Self::do_insert(&temp_path, blob).await {
            Ok(checksums) => rename(&temp_path, self.root.join(&file_name)).await
                .map(|_| checksums)
                .map_err(anyhow::Error::from),
            Err(e) => Err(e),
        };

        let (sha1, md5) = match stored {
            Ok(checksums) => checksums,
            Err(e) => {
                if try_exists(&temp_path).await.unwrap_or(false) {
                    if let Err(cleanup) = remove_file(&temp_path).await {
                        error!("error cleaning up {} after failed attempt to store {}: {}", temp_path.display(), uri, cleanup);
                    }
                }
                on_error(e.context(format!("storing {}", uri)));
                return None;
            }
        };

        match self.register(uri, IndexEntry { file_name: file_name.clone(), sha1, md5 }).await {
            Ok(path) => Some(path),
            Err(e) => {
                let stored_path = self.root.join(&file_name);
                if let Err(cleanup) = remove_file(&stored_path).await {
                    debug!("could not remove unregistered file {}: {}", stored_path.display(), cleanup);
                }
                on_error(e.context(format!("registering {}", uri)));
                None
            }
        }
    }

    async fn contains_key(&self, uri: &str) -> bool {
        self.get(uri).await.is_some()
    }

    async fn clear(&self) {
        let mut index = self.index.lock().await;
        for (uri, entry) in index.iter() {
            let path = self.path_for(entry);
            if let Err(e) = remove_file(&path).await {
                trace!("ignoring failure to remove {} for {}: {}", path.display(), uri, e);
            }
        }
        index.clear();

        if let Err(e) = self.persist_index(&index).await {
            warn!("failed to persist remote artifact cache index: {:#}", e);
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Mutex as StdMutex;

    use super::*;

    const URI: &str = "https://repo.example.com/org/a/b/1.0/b-1.0.pom";

    fn collecting(errors: &StdMutex<Vec<String>>) -> impl Fn(anyhow::Error) + Send + Sync + '_ {
        move |e| errors.lock().unwrap().push(format!("{:#}", e))
    }

    #[tokio::test]
    async fn test_put_get() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalRemoteArtifactCache::open(dir.path()).await.unwrap();
        let errors = StdMutex::new(Vec::new());

        assert!(cache.get(URI).await.is_none());

        let path = cache.put(URI, Blob::from_bytes("<project/>"), &collecting(&errors)).await.unwrap();
        assert!(path.starts_with(dir.path()));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"<project/>");

        assert_eq!(cache.get(URI).await, Some(path));
        assert!(cache.contains_key(URI).await);
        assert_eq!(cache.checksums(URI).await.unwrap().1, <[u8;16]>::from(md5::compute(b"<project/>")));
        assert!(errors.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let errors = StdMutex::new(Vec::new());

        let path = {
            let cache = LocalRemoteArtifactCache::open(dir.path()).await.unwrap();
            cache.put(URI, Blob::from_bytes("data"), &collecting(&errors)).await.unwrap()
        };

        let cache = LocalRemoteArtifactCache::open(dir.path()).await.unwrap();
        assert_eq!(cache.get(URI).await, Some(path));
    }

    #[tokio::test]
    async fn test_checksum_mismatch_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalRemoteArtifactCache::open(dir.path()).await.unwrap();
        let errors = StdMutex::new(Vec::new());

        let result = cache.put(URI, Blob::from_bytes("data").with_sha1([0u8; 20]), &collecting(&errors)).await;

        assert!(result.is_none());
        assert!(!cache.contains_key(URI).await);
        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("failed validation"));

        let files = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(files, 0);
    }

    #[tokio::test]
    async fn test_unregistered_file_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalRemoteArtifactCache::open(dir.path()).await.unwrap();
        let errors = StdMutex::new(Vec::new());
        // the index can not be written
        std::fs::create_dir(dir.path().join(format!("{}.writing", INDEX_FILE))).unwrap();

        let result = cache.put(URI, Blob::from_bytes("data"), &collecting(&errors)).await;

        assert!(result.is_none());
        assert!(cache.checksums(URI).await.is_none());
        assert!(errors.lock().unwrap()[0].starts_with("registering"));
        let files = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(files, 1);
    }

    #[tokio::test]
    async fn test_missing_file_drops_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalRemoteArtifactCache::open(dir.path()).await.unwrap();
        let errors = StdMutex::new(Vec::new());

        let path = cache.put(URI, Blob::from_bytes("data"), &collecting(&errors)).await.unwrap();
        std::fs::remove_file(path).unwrap();

        assert!(cache.get(URI).await.is_none());
        assert!(cache.checksums(URI).await.is_none());
    }

    #[tokio::test]
    async fn test_replacing_removes_old_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalRemoteArtifactCache::open(dir.path()).await.unwrap();
        let errors = StdMutex::new(Vec::new());

        let old = cache.put(URI, Blob::from_bytes("old"), &collecting(&errors)).await.unwrap();
        let new = cache.put(URI, Blob::from_bytes("new"), &collecting(&errors)).await.unwrap();

        assert_ne!(old, new);
        assert!(!old.exists());
        assert_eq!(cache.get(URI).await, Some(new));
    }

    #[tokio::test]
    async fn test_clear() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalRemoteArtifactCache::open(dir.path()).await.unwrap();
        let errors = StdMutex::new(Vec::new());

        let a = cache.put("a", Blob::from_bytes("a"), &collecting(&errors)).await.unwrap();
        let b = cache.put("b", Blob::from_bytes("b"), &collecting(&errors)).await.unwrap();
        // a file that is already gone does not stop clearing the rest
        std::fs::remove_file(&a).unwrap();

        cache.clear().await;

        assert!(!b.exists());
        assert!(!cache.contains_key("a").await);
        assert!(!cache.contains_key("b").await);
    }

    #[tokio::test]
    async fn test_compute() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalRemoteArtifactCache::open(dir.path()).await.unwrap();
        let errors = StdMutex::new(Vec::new());

        // nothing to store is not an error
        let nothing = cache.compute(URI, || async { Ok(None) }, &collecting(&errors)).await;
        assert!(nothing.is_none());
        assert!(errors.lock().unwrap().is_empty());

        let stored = cache.compute(URI, || async { Ok(Some(Blob::from_bytes("data"))) }, &collecting(&errors)).await;
        assert!(stored.is_some());

        let cached = cache.compute(URI, || async { Err(anyhow::anyhow!("must not be called")) }, &collecting(&errors)).await;
        assert_eq!(cached, stored);
        assert!(errors.lock().unwrap().is_empty());

        let failed = cache.compute("other", || async { Err(anyhow::anyhow!("connection refused")) }, &collecting(&errors)).await;
        assert!(failed.is_none());
        assert_eq!(*errors.lock().unwrap(), vec!["connection refused".to_string()]);
    }
}
