use std::path::PathBuf;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use tracing::debug;

use crate::artifact_cache::{ErrorHandler, RemoteArtifactCache};
use crate::util::blob::Blob;

/// Consults `first`, then `second`. Stores go to `first`, and only fall through to `second` if
///  `first` could not store the bytes.
pub struct OrElseRemoteArtifactCache<A, B> {
    first: A,
    second: B,
}

impl<A: RemoteArtifactCache, B: RemoteArtifactCache> OrElseRemoteArtifactCache<A, B> {
    pub fn new(first: A, second: B) -> OrElseRemoteArtifactCache<A, B> {
        OrElseRemoteArtifactCache { first, second }
    }

    pub fn first(&self) -> &A {
        &self.first
    }

    pub fn second(&self) -> &B {
        &self.second
    }
}

/// A blob's stream can only be consumed once, so it is buffered to allow a second attempt
async fn buffer(blob: Blob) -> anyhow::Result<(Bytes, Option<[u8;20]>, Option<[u8;16]>)> {
    let Blob { mut data, sha1, md5 } = blob;
    let mut buf = BytesMut::new();
    while let Some(chunk) = data.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok((buf.freeze(), sha1, md5))
}

fn rebuild(data: Bytes, sha1: Option<[u8;20]>, md5: Option<[u8;16]>) -> Blob {
    Blob {
        sha1,
        md5,
        ..Blob::from_bytes(data)
    }
}

#[async_trait]
impl<A: RemoteArtifactCache, B: RemoteArtifactCache> RemoteArtifactCache for OrElseRemoteArtifactCache<A, B> {
    async fn get(&self, uri: &str) -> Option<PathBuf> {
        match self.first.get(uri).await {
            Some(path) => Some(path),
            None => self.second.get(uri).await,
        }
    }

    async fn put(&self, uri: &str, blob: Blob, on_error: ErrorHandler<'_>) -> Option<PathBuf> {
        let (data, sha1, md5) = match buffer(blob).await {
            Ok(buffered) => buffered,
            Err(e) => {
                on_error(e);
                return None;
            }
        };

        let log_first = |e: anyhow::Error| debug!("first cache failed to store {}, trying the second: {:#}", uri, e);
        if let Some(path) = self.first.put(uri, rebuild(data.clone(), sha1, md5), &log_first).await {
            return Some(path);
        }
        self.second.put(uri, rebuild(data, sha1, md5), on_error).await
    }

    async fn contains_key(&self, uri: &str) -> bool {
        self.first.contains_key(uri).await || self.second.contains_key(uri).await
    }

    async fn clear(&self) {
        self.first.clear().await;
        self.second.clear().await;
    }
}
