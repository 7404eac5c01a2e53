//! SHA-256 tee for the extraction byte stream.
//!
//! The pipeline must hash exactly the bytes the NAR extractor consumes;
//! there is no buffered copy to hash after the fact, so the digest has to
//! be computed inside the reader chain. This adapter sits between the
//! length-capped decompressed stream and the extractor and absorbs every
//! byte it yields into a running digest. The digest lives behind an
//! [`Arc<Mutex<…>>`] handle because the reader itself is swallowed by the
//! extractor and never returned.

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{ready, Context, Poll};

use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, ReadBuf};

/// Running SHA-256 over the NAR byte stream, plus how many bytes went in.
pub struct NarDigest {
    ctx: ring::digest::Context,
    len: u64,
}

impl NarDigest {
    fn new() -> Self {
        Self {
            ctx: ring::digest::Context::new(&ring::digest::SHA256),
            len: 0,
        }
    }

    fn absorb(&mut self, bytes: &[u8]) {
        self.ctx.update(bytes);
        self.len += bytes.len() as u64;
    }

    /// SHA-256 of everything absorbed so far.
    pub fn digest(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(self.ctx.clone().finish().as_ref());
        out
    }

    /// Bytes absorbed so far: once extraction is done, the decompressed
    /// size of the archive as actually consumed.
    pub fn bytes_hashed(&self) -> u64 {
        self.len
    }
}

impl std::fmt::Debug for NarDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NarDigest")
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

pin_project! {
    /// An [`AsyncRead`] adapter feeding every byte it yields into a
    /// shared [`NarDigest`].
    pub struct HashingReader<R> {
        #[pin]
        inner: R,
        digest: Arc<Mutex<NarDigest>>,
    }
}

impl<R> HashingReader<R> {
    /// Wrap `inner`. The second half of the pair is the digest handle,
    /// still usable after the reader has been moved into its consumer.
    pub fn new(inner: R) -> (Self, Arc<Mutex<NarDigest>>) {
        let digest = Arc::new(Mutex::new(NarDigest::new()));
        let reader = Self {
            inner,
            digest: Arc::clone(&digest),
        };
        (reader, digest)
    }
}

impl<R: AsyncRead> AsyncRead for HashingReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.project();
        // the caller may hand over a partially filled buffer (read_exact
        // does); only bytes past this mark are new
        let mark = buf.filled().len();
        ready!(this.inner.poll_read(cx, buf))?;
        let fresh = &buf.filled()[mark..];
        if !fresh.is_empty() {
            this.digest.lock().unwrap().absorb(fresh);
        }
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt as _;

    #[tokio::test]
    async fn digests_everything_read() {
        let data = b"hello, world";
        let (mut reader, digest) = HashingReader::new(std::io::Cursor::new(data));

        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, data);

        let expected = ring::digest::digest(&ring::digest::SHA256, data);
        let digest = digest.lock().unwrap();
        assert_eq!(digest.bytes_hashed(), data.len() as u64);
        assert_eq!(digest.digest().as_slice(), expected.as_ref());
    }

    #[tokio::test]
    async fn digest_of_nothing() {
        let (mut reader, digest) = HashingReader::new(std::io::Cursor::new(b""));
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();

        let expected = ring::digest::digest(&ring::digest::SHA256, b"");
        let digest = digest.lock().unwrap();
        assert_eq!(digest.bytes_hashed(), 0);
        assert_eq!(digest.digest().as_slice(), expected.as_ref());
    }

    #[tokio::test]
    async fn partial_reads_accumulate() {
        let data = b"0123456789abcdef";
        let (mut reader, digest) = HashingReader::new(std::io::Cursor::new(data));

        // the digest must accumulate across many small reads
        let mut chunk = [0u8; 4];
        for _ in 0..4 {
            reader.read_exact(&mut chunk).await.unwrap();
        }

        let expected = ring::digest::digest(&ring::digest::SHA256, data);
        let digest = digest.lock().unwrap();
        assert_eq!(digest.bytes_hashed(), data.len() as u64);
        assert_eq!(digest.digest().as_slice(), expected.as_ref());
    }
}
