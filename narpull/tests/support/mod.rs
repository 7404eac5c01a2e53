//! Shared helpers: a signed in-memory cache, narinfo construction and a
//! minimal HTTP server to stand in for a substituter.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use base64::{engine::general_purpose, Engine};
use ed25519_dalek::{Signer, SigningKey};
use narpull::{Config, FetchedNarInfo, NarInfoSource};
use narpull_store_core::{base32, fingerprint, StoreBase};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use url::Url;

pub const KEY_NAME: &str = "test-cache-1";

pub fn signing_key() -> SigningKey {
    SigningKey::from_bytes(&[7u8; 32])
}

/// The `--public-key` argument matching [`signing_key`].
pub fn public_key_arg() -> String {
    format!(
        "{KEY_NAME}:{}",
        general_purpose::STANDARD.encode(signing_key().verifying_key().to_bytes())
    )
}

pub fn test_config(store_root: &Path, substituters: Vec<String>) -> Config {
    Config::new(store_root, substituters, vec![public_key_arg()]).unwrap()
}

/// `sha256:<base32>` of a NAR byte vector, as a narinfo advertises it.
pub fn nar_hash(nar: &[u8]) -> String {
    let digest = ring::digest::digest(&ring::digest::SHA256, nar);
    format!("sha256:{}", base32::encode(digest.as_ref()))
}

/// Build a signed narinfo document for `base` under `store_root`.
pub fn narinfo_text(
    store_root: &Path,
    base: &str,
    url: &str,
    compression: &str,
    nar_hash: &str,
    nar_size: u64,
    refs: &[&str],
) -> String {
    let store_path = format!("{}/{base}", store_root.display());
    let ref_bases: Vec<StoreBase> = refs.iter().map(|r| StoreBase::parse(r).unwrap()).collect();
    let message = fingerprint(&store_path, nar_hash, nar_size, &ref_bases);
    let sig = signing_key().sign(message.as_bytes());

    let mut text = format!(
        "StorePath: {store_path}\n\
         URL: {url}\n\
         Compression: {compression}\n\
         NarHash: {nar_hash}\n\
         NarSize: {nar_size}\n"
    );
    if !refs.is_empty() {
        text.push_str(&format!("References: {}\n", refs.join(" ")));
    }
    text.push_str(&format!(
        "Sig: {KEY_NAME}:{}\n",
        general_purpose::STANDARD.encode(sig.to_bytes())
    ));
    text
}

/// An in-memory narinfo source keyed by hash part, standing in for the
/// HTTP transport in resolver tests.
pub struct FakeSource {
    entries: HashMap<String, String>,
    substituter: Url,
}

impl FakeSource {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            substituter: Url::parse("http://cache.test").unwrap(),
        }
    }

    pub fn publish(&mut self, base: &StoreBase, narinfo: String) {
        self.entries.insert(base.hash_part().to_string(), narinfo);
    }
}

impl NarInfoSource for FakeSource {
    async fn fetch_narinfo(&self, hash_part: &str) -> Option<FetchedNarInfo> {
        self.entries.get(hash_part).map(|text| FetchedNarInfo {
            text: text.clone(),
            substituter: self.substituter.clone(),
        })
    }
}

/// A just-enough HTTP/1.1 server over a route map; unknown paths 404.
pub struct TestServer {
    pub url: String,
}

pub async fn serve(routes: HashMap<String, Vec<u8>>) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let routes = Arc::new(routes);

    tokio::spawn(async move {
        loop {
            let Ok((mut sock, _)) = listener.accept().await else {
                break;
            };
            let routes = Arc::clone(&routes);
            tokio::spawn(async move {
                let (reader, mut writer) = sock.split();
                let mut reader = BufReader::new(reader);

                let mut request_line = String::new();
                if reader.read_line(&mut request_line).await.is_err() {
                    return;
                }
                let path = request_line
                    .split_whitespace()
                    .nth(1)
                    .unwrap_or("/")
                    .to_string();

                // drain request headers
                loop {
                    let mut header = String::new();
                    match reader.read_line(&mut header).await {
                        Ok(0) => break,
                        Ok(_) if header == "\r\n" => break,
                        Ok(_) => {}
                        Err(_) => return,
                    }
                }

                match routes.get(&path) {
                    Some(body) => {
                        let head = format!(
                            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                            body.len()
                        );
                        let _ = writer.write_all(head.as_bytes()).await;
                        let _ = writer.write_all(body).await;
                    }
                    None => {
                        let _ = writer
                            .write_all(
                                b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                            )
                            .await;
                    }
                }
                let _ = writer.shutdown().await;
            });
        }
    });

    TestServer {
        url: format!("http://{addr}"),
    }
}

/// Gzip-compress a byte vector the way a substituter would serve it.
pub async fn gzip(data: &[u8]) -> Vec<u8> {
    use async_compression::tokio::bufread::GzipEncoder;
    let mut encoder = GzipEncoder::new(std::io::Cursor::new(data.to_vec()));
    let mut out = Vec::new();
    encoder.read_to_end(&mut out).await.unwrap();
    out
}
