use std::io;
use std::path::PathBuf;

use narpull_nar::NarError;
use narpull_store_core::{NarInfoError, StoreBase};
use thiserror::Error;

/// Errors while walking the reference graph.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no configured substituter has `{0}`")]
    Unavailable(StoreBase),

    #[error("bad narinfo for `{base}`: {source}")]
    NarInfo {
        base: StoreBase,
        #[source]
        source: NarInfoError,
    },

    #[error("failed to inspect `{}`: {source}", path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Errors while downloading and manifesting one store path.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to fetch `{url}`: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("corrupt archive for `{base}`: {source}")]
    Nar {
        base: StoreBase,
        #[source]
        source: NarError,
    },

    #[error("hash mismatch for `{base}`: narinfo says {expected}, archive hashes to {actual}")]
    HashMismatch {
        base: StoreBase,
        expected: String,
        actual: String,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("cancelled")]
    Cancelled,
}

/// Extension trait for attaching context to I/O errors in the pipeline.
pub trait IoErrorContext<T> {
    fn io_context(self, context: impl Into<String>) -> std::result::Result<T, FetchError>;
}

impl<T> IoErrorContext<T> for std::result::Result<T, io::Error> {
    fn io_context(self, context: impl Into<String>) -> std::result::Result<T, FetchError> {
        self.map_err(|e| FetchError::Io {
            context: context.into(),
            source: e,
        })
    }
}
