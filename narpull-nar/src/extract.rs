//! Streaming NAR extraction.
//!
//! A NAR is a preorder serialization of a filesystem subtree:
//!
//! ```text
//! nar       := "nix-archive-1" node
//! node      := "(" "type" kind body ")"
//! kind      := "regular" | "symlink" | "directory"
//! regular   := [ "executable" "" ] "contents" <length> <raw bytes> <pad>
//! symlink   := "target" <string>
//! directory := ( "entry" "(" "name" <string> "node" node ")" )*
//! ```
//!
//! The extractor decodes the stream in a single forward pass and
//! materializes it under a target path, enforcing the format invariants:
//! entry names must be safe path components in strictly increasing
//! byte-lexicographic order, and every `(` must be matched. Callers stage
//! into a scratch directory, so a failed extraction never leaves a partial
//! tree at the final location.

use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::trace;

use crate::wire::{pad_len, WireError, WireReader};

pub const NAR_MAGIC: &[u8] = b"nix-archive-1";

const COPY_BUF_SIZE: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum NarError {
    #[error("not a NAR archive (bad magic)")]
    BadMagic,

    #[error("expected `{expected}`, got `{actual}`")]
    UnexpectedToken { expected: String, actual: String },

    #[error("unknown node type `{0}`")]
    UnknownNodeType(String),

    #[error("invalid path component `{0}`")]
    InvalidPathComponent(String),

    #[error("directory entries not sorted: `{prev}` >= `{next}`")]
    UnsortedEntries { prev: String, next: String },

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error("{operation} {path}: {source}")]
    Write {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl NarError {
    fn write(operation: &'static str, path: &Path, source: io::Error) -> Self {
        NarError::Write {
            operation,
            path: path.to_path_buf(),
            source,
        }
    }
}

fn lossy(token: &[u8]) -> String {
    String::from_utf8_lossy(token).into_owned()
}

/// Decodes a NAR stream and writes the tree below `root`.
///
/// `root` itself is created by the extraction (as a directory, regular
/// file or symlink, whatever the archive's top node is) and must not
/// already exist.
pub struct NarExtractor<R> {
    wire: WireReader<R>,
    root: PathBuf,
}

impl<R: AsyncRead + Unpin> NarExtractor<R> {
    pub fn new(reader: R, root: impl Into<PathBuf>) -> Self {
        Self {
            wire: WireReader::new(reader),
            root: root.into(),
        }
    }

    pub async fn extract(mut self) -> Result<(), NarError> {
        let magic = self.wire.read_string().await?;
        if magic != NAR_MAGIC {
            return Err(NarError::BadMagic);
        }
        if let Some(parent) = self.root.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| NarError::write("creating parent of", parent, e))?;
        }
        let root = self.root.clone();
        self.node(&root).await
    }

    async fn node(&mut self, path: &Path) -> Result<(), NarError> {
        self.expect(b"(").await?;
        self.expect(b"type").await?;
        let kind = self.wire.read_string().await?;
        match kind.as_slice() {
            b"regular" => self.regular(path).await?,
            b"symlink" => self.symlink(path).await?,
            b"directory" => self.directory(path).await?,
            _ => return Err(NarError::UnknownNodeType(lossy(&kind))),
        }
        self.expect(b")").await
    }

    async fn regular(&mut self, path: &Path) -> Result<(), NarError> {
        let mut token = self.wire.read_string().await?;
        let mut mode = 0o644;
        if token == b"executable" {
            mode = 0o755;
            self.expect(b"").await?;
            token = self.wire.read_string().await?;
        }
        if token != b"contents" {
            return Err(NarError::UnexpectedToken {
                expected: "contents".to_string(),
                actual: lossy(&token),
            });
        }

        let length = self.wire.read_length().await?;
        trace!(path = %path.display(), length, "writing regular file");

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(mode)
            .open(path)
            .await
            .map_err(|e| NarError::write("creating file", path, e))?;

        let mut buf = vec![0u8; COPY_BUF_SIZE];
        let mut remaining = length;
        while remaining > 0 {
            let want = buf.len().min(remaining as usize);
            let n = self
                .wire
                .inner_mut()
                .read(&mut buf[..want])
                .await
                .map_err(WireError::Io)?;
            if n == 0 {
                return Err(WireError::Io(io::ErrorKind::UnexpectedEof.into()).into());
            }
            file.write_all(&buf[..n])
                .await
                .map_err(|e| NarError::write("writing file", path, e))?;
            remaining -= n as u64;
        }
        file.flush()
            .await
            .map_err(|e| NarError::write("writing file", path, e))?;
        drop(file);

        // contents are padded like any other string
        let pad = pad_len(length) as usize;
        if pad > 0 {
            let mut scratch = [0u8; 8];
            self.wire
                .inner_mut()
                .read_exact(&mut scratch[..pad])
                .await
                .map_err(WireError::Io)?;
        }
        Ok(())
    }

    async fn symlink(&mut self, path: &Path) -> Result<(), NarError> {
        self.expect(b"target").await?;
        let target = self.wire.read_string().await?;
        trace!(path = %path.display(), "creating symlink");
        fs::symlink(std::ffi::OsStr::from_bytes(&target), path)
            .await
            .map_err(|e| NarError::write("creating symlink", path, e))
    }

    async fn directory(&mut self, path: &Path) -> Result<(), NarError> {
        fs::create_dir(path)
            .await
            .map_err(|e| NarError::write("creating directory", path, e))?;

        let mut prev: Option<Vec<u8>> = None;
        loop {
            // one token of lookahead: either "entry" or the parent's ")"
            let token = self.wire.read_string().await?;
            if token != b"entry" {
                self.wire.unread(token);
                return Ok(());
            }

            self.expect(b"(").await?;
            self.expect(b"name").await?;
            let name = self.wire.read_string().await?;
            validate_component(&name)?;
            if let Some(prev) = &prev {
                if prev.as_slice() >= name.as_slice() {
                    return Err(NarError::UnsortedEntries {
                        prev: lossy(prev),
                        next: lossy(&name),
                    });
                }
            }
            self.expect(b"node").await?;

            let child = path.join(std::ffi::OsStr::from_bytes(&name));
            Box::pin(self.node(&child)).await?;

            self.expect(b")").await?;
            prev = Some(name);
        }
    }

    async fn expect(&mut self, expected: &'static [u8]) -> Result<(), NarError> {
        let token = self.wire.read_string().await?;
        if token != expected {
            return Err(NarError::UnexpectedToken {
                expected: lossy(expected),
                actual: lossy(&token),
            });
        }
        Ok(())
    }
}

fn validate_component(name: &[u8]) -> Result<(), NarError> {
    if name.is_empty() || name == b"." || name == b".." || name.contains(&b'/') {
        return Err(NarError::InvalidPathComponent(lossy(name)));
    }
    Ok(())
}

/// Extract a NAR stream below `root`, which must not yet exist.
pub async fn extract<R>(reader: R, root: impl Into<PathBuf>) -> Result<(), NarError>
where
    R: AsyncRead + Unpin,
{
    NarExtractor::new(reader, root).extract().await
}
