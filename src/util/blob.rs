use std::pin::Pin;

use bytes::Bytes;
use futures_core::Stream;

/// Downloaded bytes on their way into a cache, with the checksums the remote side announced
///  for them (if any).
pub struct Blob {
    pub data: Pin<Box<dyn Stream<Item = anyhow::Result<Bytes>> + Send + 'static>>,
    pub md5: Option<[u8;16]>,
    pub sha1: Option<[u8;20]>,
}
impl Blob {
    pub fn new(data: impl Stream<Item = anyhow::Result<Bytes>> + Send + 'static) -> Blob {
        Blob {
            data: Box::pin(data),
            md5: None,
            sha1: None,
        }
    }

    /// a single-chunk blob, mostly for tests and for content that is already in memory
    pub fn from_bytes(data: impl Into<Bytes>) -> Blob {
        let data: Bytes = data.into();
        Blob::new(futures::stream::once(async move { Ok(data) }))
    }

    pub fn with_sha1(self, sha1: [u8;20]) -> Blob {
        Blob { sha1: Some(sha1), ..self }
    }

    pub fn with_md5(self, md5: [u8;16]) -> Blob {
        Blob { md5: Some(md5), ..self }
    }
}
