pub mod local;
pub mod or_else;

use std::future::Future;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::trace;

use crate::artifact_cache::or_else::OrElseRemoteArtifactCache;
use crate::util::blob::Blob;

/// Receives failures that a cache operation swallowed instead of returning them
pub type ErrorHandler<'a> = &'a (dyn Fn(anyhow::Error) + Send + Sync);

/// A URI-addressed cache for downloaded bytes (POMs, metadata, jars), independent of what the
///  bytes mean. Failures never propagate out of these operations: they are passed to the
///  caller's error handler, and the operation returns `None`.
#[async_trait]
pub trait RemoteArtifactCache: Send + Sync {
    /// the local file holding the bytes for `uri`, if they were cached
    async fn get(&self, uri: &str) -> Option<PathBuf>;

    /// Stores the blob's bytes in a new file and returns its path.
    async fn put(&self, uri: &str, blob: Blob, on_error: ErrorHandler<'_>) -> Option<PathBuf>;

    async fn contains_key(&self, uri: &str) -> bool;

    /// Best-effort removal of every cached file, then forgets all entries.
    async fn clear(&self);

    /// Cache-aside: returns the cached path if there is one, else stores whatever `supplier`
    ///  produces. A supplier returning `Ok(None)` (e.g. 'not modified') is not an error.
    async fn compute<F, Fut>(&self, uri: &str, supplier: F, on_error: ErrorHandler<'_>) -> Option<PathBuf>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = anyhow::Result<Option<Blob>>> + Send,
        Self: Sized,
    {
        if let Some(path) = self.get(uri).await {
            trace!("remote artifact cache hit for {}", uri);
            return Some(path);
        }

        match supplier().await {
            Ok(Some(blob)) => self.put(uri, blob, on_error).await,
            Ok(None) => None,
            Err(e) => {
                on_error(e);
                None
            }
        }
    }

    /// A cache that consults `self` first and `other` second.
    fn or_else<B: RemoteArtifactCache>(self, other: B) -> OrElseRemoteArtifactCache<Self, B>
    where
        Self: Sized,
    {
        OrElseRemoteArtifactCache::new(self, other)
    }
}
