//! The fetch-and-manifest pipeline.
//!
//! A producer queues resolved paths onto a rendezvous channel and a small
//! pool of workers drains it. Each worker streams the compressed NAR from
//! its substituter, decompresses on the fly, feeds the decompressed bytes
//! through a SHA-256 tee into the extractor, and promotes the staged tree
//! into the store with an atomic rename once the hash checks out.
//!
//! The first failing worker cancels the shared token; the others finish
//! their current item check, drain nothing further, and leave no trace
//! beyond their own removed staging directory.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_compression::tokio::bufread::{GzipDecoder, XzDecoder, ZstdDecoder};
use futures::TryStreamExt;
use narpull_nar::extract;
use narpull_store_core::{base32, Compression};
use tokio::fs;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{FetchError, IoErrorContext};
use crate::hashing_reader::HashingReader;
use crate::resolver::ResolvedPath;

/// Upper bound on concurrent downloads.
pub const MAX_WORKERS: usize = 8;

const HTTP_BUF_SIZE: usize = 64 * 1024;
const NAR_TIMEOUT: Duration = Duration::from_secs(10 * 60);
const STALL_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Prefix of per-path staging directories inside the store root.
const STAGING_PREFIX: &str = ".nix-download_";

#[derive(Clone)]
pub struct Fetcher {
    config: Arc<Config>,
    client: reqwest::Client,
}

impl Fetcher {
    pub fn new(config: Arc<Config>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(NAR_TIMEOUT)
            .read_timeout(STALL_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self { config, client })
    }

    /// Download and manifest every path in the plan, printing each
    /// destination to stdout as it is queued. Returns the first worker
    /// error, after all workers have wound down.
    pub async fn run(&self, plan: Vec<ResolvedPath>) -> Result<(), FetchError> {
        if plan.is_empty() {
            return Ok(());
        }
        let workers = worker_count(plan.len());
        let cancel = CancellationToken::new();

        let (tx, rx) = mpsc::channel::<ResolvedPath>(1);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let producer = {
            let config = Arc::clone(&self.config);
            tokio::spawn(async move {
                for item in plan {
                    let dest = config.store_path(&item.base);
                    // send fails once every worker is gone; stop queueing
                    if tx.send(item).await.is_err() {
                        break;
                    }
                    println!("{}", dest.display());
                }
            })
        };

        let mut set = JoinSet::new();
        for _ in 0..workers {
            let fetcher = self.clone();
            let rx = Arc::clone(&rx);
            let cancel = cancel.clone();
            set.spawn(async move {
                loop {
                    let item = {
                        let mut rx = rx.lock().await;
                        tokio::select! {
                            _ = cancel.cancelled() => return Ok(()),
                            item = rx.recv() => item,
                        }
                    };
                    let Some(item) = item else {
                        return Ok(());
                    };
                    if cancel.is_cancelled() {
                        return Ok(());
                    }
                    if let Err(err) = fetcher.fetch_one(&item).await {
                        cancel.cancel();
                        return Err(err);
                    }
                }
            });
        }
        drop(rx);

        let mut first_err = None;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    let _ = first_err.get_or_insert(err);
                }
                Err(join_err) => {
                    let _ = first_err.get_or_insert(FetchError::Join(join_err));
                }
            }
        }
        let _ = producer.await;

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Fetch, verify and promote a single store path. The staging
    /// directory is removed on every failure path.
    async fn fetch_one(&self, item: &ResolvedPath) -> Result<(), FetchError> {
        let dest = self.config.store_path(&item.base);
        let staging = self
            .config
            .store_root
            .join(format!("{STAGING_PREFIX}{}", item.base));

        debug!(base = %item.base, url = %item.nar_url, "fetching NAR");
        let result = self.manifest(item, &staging, &dest).await;
        if result.is_err() {
            if let Err(err) = remove_path_all(&staging).await {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %staging.display(), %err, "failed to clean staging path");
                }
            }
        }
        result
    }

    async fn manifest(
        &self,
        item: &ResolvedPath,
        staging: &Path,
        dest: &Path,
    ) -> Result<(), FetchError> {
        let resp = self
            .client
            .get(&item.nar_url)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|source| FetchError::Http {
                url: item.nar_url.clone(),
                source,
            })?;

        let body = StreamReader::new(resp.bytes_stream().map_err(std::io::Error::other));
        let body = BufReader::with_capacity(HTTP_BUF_SIZE, body);

        let decompressed: Box<dyn AsyncRead + Send + Unpin> = match item.compression {
            Compression::None => Box::new(body),
            Compression::Gzip => Box::new(GzipDecoder::new(body)),
            Compression::Xz => Box::new(XzDecoder::new(body)),
            Compression::Zstd => Box::new(ZstdDecoder::new(body)),
        };

        // bound the decompressed stream so a hostile archive cannot
        // expand past what the narinfo promised
        let bounded = decompressed.take(item.nar_size);
        let (reader, nar_digest) = HashingReader::new(bounded);

        extract(reader, staging)
            .await
            .map_err(|source| FetchError::Nar {
                base: item.base.clone(),
                source,
            })?;

        let (actual, nar_bytes) = {
            let nar_digest = nar_digest.lock().unwrap();
            (
                format!("sha256:{}", base32::encode(&nar_digest.digest())),
                nar_digest.bytes_hashed(),
            )
        };
        if actual != item.nar_hash {
            return Err(FetchError::HashMismatch {
                base: item.base.clone(),
                expected: item.nar_hash.clone(),
                actual,
            });
        }

        fs::rename(staging, dest).await.io_context(format!(
            "failed to promote {} to {}",
            staging.display(),
            dest.display()
        ))?;
        debug!(dest = %dest.display(), nar_bytes, "manifested");
        Ok(())
    }
}

/// Remove whatever `path` is, tree or single entry.
async fn remove_path_all(path: &Path) -> std::io::Result<()> {
    let meta = fs::symlink_metadata(path).await?;
    if meta.is_dir() {
        fs::remove_dir_all(path).await
    } else {
        fs::remove_file(path).await
    }
}

/// Worker count for a plan of `n` paths.
pub fn worker_count(n: usize) -> usize {
    n.min(MAX_WORKERS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_count_is_bounded() {
        assert_eq!(worker_count(0), 0);
        assert_eq!(worker_count(3), 3);
        assert_eq!(worker_count(8), 8);
        assert_eq!(worker_count(100), 8);
    }
}
