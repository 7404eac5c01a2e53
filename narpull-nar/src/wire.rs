//! Primitive decoders for the NAR wire format.
//!
//! Everything in a NAR is either a little-endian 64-bit integer or a
//! length-prefixed byte string padded with zeros to the next 8-byte
//! boundary. The reader is forward-only with a single token of pushback,
//! which is exactly the lookahead the directory grammar needs.

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Ceiling for structural tokens and entry names. File contents are
/// streamed through [`WireReader::inner_mut`] and are not subject to it.
pub const MAX_STRING_LEN: u64 = 16 * 1024;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("archive read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("token length {0} exceeds the {MAX_STRING_LEN} byte limit")]
    TokenTooLong(u64),

    #[error("negative length field")]
    NegativeLength,
}

/// Padding that follows a string of `len` bytes.
pub const fn pad_len(len: u64) -> u64 {
    (8 - len % 8) % 8
}

pub struct WireReader<R> {
    inner: R,
    pushback: Option<Vec<u8>>,
}

impl<R: AsyncRead + Unpin> WireReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            pushback: None,
        }
    }

    /// Read a length field. The wire type is a signed 64-bit integer;
    /// negative values are protocol errors.
    pub async fn read_length(&mut self) -> Result<u64, WireError> {
        let mut buf = [0u8; 8];
        self.inner.read_exact(&mut buf).await?;
        let value = u64::from_le_bytes(buf);
        if value > i64::MAX as u64 {
            return Err(WireError::NegativeLength);
        }
        Ok(value)
    }

    /// Read a length-prefixed string and discard its padding.
    pub async fn read_string(&mut self) -> Result<Vec<u8>, WireError> {
        if let Some(token) = self.pushback.take() {
            return Ok(token);
        }
        let len = self.read_length().await?;
        if len > MAX_STRING_LEN {
            return Err(WireError::TokenTooLong(len));
        }
        let padded = (len + pad_len(len)) as usize;
        let mut buf = vec![0u8; padded];
        self.inner.read_exact(&mut buf).await?;
        buf.truncate(len as usize);
        Ok(buf)
    }

    /// Push back one previously read string; the next [`read_string`]
    /// returns it without touching the stream.
    ///
    /// [`read_string`]: Self::read_string
    pub fn unread(&mut self, token: Vec<u8>) {
        debug_assert!(self.pushback.is_none(), "pushback slot already occupied");
        self.pushback = Some(token);
    }

    /// Direct access to the underlying reader, for streaming file
    /// contents past the token layer.
    pub fn inner_mut(&mut self) -> &mut R {
        &mut self.inner
    }
}
