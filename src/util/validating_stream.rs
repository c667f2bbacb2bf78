use std::pin::Pin;
use std::task::{Context, Poll};

use anyhow::anyhow;
use bytes::Bytes;
use futures_core::{ready, Stream};
use pin_project_lite::pin_project;
use sha1::{Digest, Sha1};
use sha1::digest::consts::U20;
use sha1::digest::generic_array::GenericArray;
use tracing::trace;

use crate::util::blob::Blob;

/// This struct wraps a byte stream, allowing it to be consumed asynchronously without
///  materializing it but at the same time performing validation that requires knowledge of the
///  entire data (e.g. SHA1 checksum check).
///
/// The actual contract is to append an (empty) chunk of data to the stream with an error if the
///  validation fails. Once a stream chunk with an error was returned, this stream will stop
///  polling from upstream and always return an error
pin_project! {
    pub struct ValidatingStream<S> {
        #[pin]
        inner: S,
        validators: Vec<Box<dyn StreamValidator>>,
        is_failed: bool,
        is_done: bool,
    }
}
impl<S> ValidatingStream<S> {
    pub fn new(inner: S) -> ValidatingStream<S> {
        ValidatingStream {
            inner,
            validators: Vec::new(),
            is_failed: false,
            is_done: false,
        }
    }

    pub fn with_validator(mut self, validator: impl StreamValidator + 'static) -> ValidatingStream<S> {
        self.validators.push(Box::new(validator));
        self
    }
}

impl ValidatingStream<Pin<Box<dyn Stream<Item = anyhow::Result<Bytes>> + Send + 'static>>> {
    /// validates a blob's data against whichever checksums it announces
    pub fn for_blob(blob: Blob) -> Self {
        let mut result = ValidatingStream::new(blob.data);
        if let Some(sha1) = blob.sha1 {
            result = result.with_validator(Sha1Validator::new(sha1));
        }
        if let Some(md5) = blob.md5 {
            result = result.with_validator(Md5Validator::new(md5));
        }
        result
    }
}

impl<S: Stream<Item = anyhow::Result<Bytes>>> Stream for ValidatingStream<S> {
    type Item = anyhow::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.is_failed {
            return Poll::Ready(Some(Err(anyhow!("polling from failed stream"))));
        }
        if self.is_done {
            return Poll::Ready(None);
        }

        let this = self.project();
        match ready!(this.inner.poll_next(cx)) {
            Some(Ok(data)) => {
                for v in this.validators.iter_mut() {
                    v.add_data(&data);
                }
                Poll::Ready(Some(Ok(data)))
            }
            None => {
                // upstream is fully drained -> finalize validation
                *this.is_done = true;
                match this.validators.iter().find_map(|v| v.validate().err()) {
                    None => Poll::Ready(None),
                    Some(msg) => {
                        *this.is_failed = true;
                        Poll::Ready(Some(Err(anyhow!("failed validation: {}", msg))))
                    }
                }
            }
            Some(Err(e)) => {
                *this.is_failed = true;
                Poll::Ready(Some(Err(e)))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

pub trait StreamValidator: Send {
    fn add_data(&mut self, data: &Bytes);
    fn validate(&self) -> Result<(), String>;
}

pub struct Sha1Validator {
    hasher: Sha1,
    expected_hash: GenericArray<u8, U20>,
}
impl Sha1Validator {
    pub fn new(expected_hash: [u8; 20]) -> Sha1Validator {
        Sha1Validator {
            hasher: Default::default(),
            expected_hash: expected_hash.into(),
        }
    }
}
impl StreamValidator for Sha1Validator {
    fn add_data(&mut self, data: &Bytes) {
        self.hasher.update(data);
    }

    fn validate(&self) -> Result<(), String> {
        let hash = self.hasher.clone().finalize();
        trace!("validating SHA1 hash");
        if hash == self.expected_hash {
            Ok(())
        }
        else {
            Err(format!("SHA1 is {}, expected {}", hex::encode(hash), hex::encode(self.expected_hash)))
        }
    }
}

pub struct Md5Validator {
    context: md5::Context,
    expected_hash: [u8; 16],
}
impl Md5Validator {
    pub fn new(expected_hash: [u8; 16]) -> Md5Validator {
        Md5Validator {
            context: md5::Context::new(),
            expected_hash,
        }
    }
}
impl StreamValidator for Md5Validator {
    fn add_data(&mut self, data: &Bytes) {
        self.context.consume(data);
    }

    fn validate(&self) -> Result<(), String> {
        let hash: [u8;16] = self.context.clone()
            .compute()
            .into();
        trace!("validating MD5 hash");
        if hash == self.expected_hash {
            Ok(())
        }
        else {
            Err(format!("MD5 is {}, expected {}", hex::encode(hash), hex::encode(self.expected_hash)))
        }
    }
}

#[cfg(test)]
mod test {
    use futures::StreamExt;
    use rstest::rstest;

    use super::*;

    fn sha1_of(data: &[u8]) -> [u8; 20] {
        Sha1::digest(data).into()
    }

    fn chunked(chunks: &[&'static [u8]]) -> impl Stream<Item = anyhow::Result<Bytes>> {
        futures::stream::iter(chunks.iter().map(|c| Ok(Bytes::from_static(c))).collect::<Vec<_>>())
    }

    #[tokio::test]
    async fn test_passes_data_through() {
        let stream = ValidatingStream::new(chunked(&[b"abc", b"def"]))
            .with_validator(Sha1Validator::new(sha1_of(b"abcdef")))
            .with_validator(Md5Validator::new(md5::compute(b"abcdef").into()));

        let chunks: Vec<_> = stream.collect().await;
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.is_ok()));
    }

    #[rstest]
    #[case::sha1(Blob::from_bytes("abc").with_sha1([0u8; 20]))]
    #[case::md5(Blob::from_bytes("abc").with_md5([0u8; 16]))]
    #[tokio::test]
    async fn test_checksum_mismatch(#[case] blob: Blob) {
        let mut stream = ValidatingStream::for_blob(blob);

        assert_eq!(stream.next().await.unwrap().unwrap(), Bytes::from_static(b"abc"));
        let failure = stream.next().await.unwrap().unwrap_err();
        assert!(failure.to_string().starts_with("failed validation"));

        // sticky failure
        assert!(stream.next().await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_upstream_error_is_sticky() {
        let upstream = futures::stream::iter(vec![Ok(Bytes::from_static(b"a")), Err(anyhow!("connection reset"))]);
        let mut stream = ValidatingStream::new(upstream);

        assert!(stream.next().await.unwrap().is_ok());
        assert_eq!(stream.next().await.unwrap().unwrap_err().to_string(), "connection reset");
        assert!(stream.next().await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_done_after_successful_validation() {
        let mut stream = ValidatingStream::for_blob(Blob::from_bytes("abc").with_sha1(sha1_of(b"abc")));
        assert!(stream.next().await.unwrap().is_ok());
        assert!(stream.next().await.is_none());
        assert!(stream.next().await.is_none());
    }
}
