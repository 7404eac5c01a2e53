//! Parsing and verification of `.narinfo` documents.
//!
//! A narinfo is a line-oriented UTF-8 text of `Key: Value` pairs published
//! by a substituter next to the NAR it describes. Lines without the
//! `": "` separator and unknown keys are ignored.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::fingerprint::fingerprint;
use crate::signature::{NarSignature, SignatureError, TrustedKeys};
use crate::store_path::{StoreBase, StorePathError};

#[derive(Debug, Error)]
pub enum NarInfoError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("invalid NarSize `{0}`")]
    InvalidNarSize(String),

    #[error("unsupported hash algorithm in `{0}`, only sha256 is supported")]
    UnsupportedHashAlgorithm(String),

    #[error("unsupported compression type `{0}`")]
    UnsupportedCompression(String),

    #[error("narinfo describes `{actual}`, expected `{expected}`")]
    StorePathMismatch { expected: String, actual: String },

    #[error("invalid reference `{0}`: {1}")]
    InvalidReference(String, #[source] StorePathError),

    #[error("malformed signature: {0}")]
    Signature(#[from] SignatureError),

    #[error("no signature present")]
    MissingSignature,

    #[error("signed by unknown key `{0}`")]
    UnknownKey(String),

    #[error("signature verification failed")]
    BadSignature,
}

/// NAR compression methods a substituter may serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Xz,
    Zstd,
}

impl FromStr for Compression {
    type Err = NarInfoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Compression::None),
            "gzip" => Ok(Compression::Gzip),
            "xz" => Ok(Compression::Xz),
            "zstd" => Ok(Compression::Zstd),
            other => Err(NarInfoError::UnsupportedCompression(other.to_string())),
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Compression::None => "none",
            Compression::Gzip => "gzip",
            Compression::Xz => "xz",
            Compression::Zstd => "zstd",
        })
    }
}

/// Parsed metadata about one store path.
///
/// `references` keeps the order they were published in; the signed
/// fingerprint depends on it.
#[derive(Debug, Clone)]
pub struct NarInfo {
    pub store_path: String,
    pub url: String,
    pub compression: Compression,
    pub nar_hash: String,
    pub nar_size: u64,
    pub references: Vec<StoreBase>,
    pub signatures: Vec<NarSignature>,
}

impl NarInfo {
    pub fn parse(text: &str) -> Result<Self, NarInfoError> {
        let mut store_path = None;
        let mut url = None;
        let mut compression = None;
        let mut nar_hash = None;
        let mut nar_size = None;
        let mut references = Vec::new();
        let mut signatures = Vec::new();

        for line in text.lines() {
            let Some((key, value)) = line.split_once(": ") else {
                continue;
            };
            match key {
                "StorePath" => store_path = Some(value.to_string()),
                "URL" => url = Some(value.to_string()),
                "Compression" => compression = Some(value.parse()?),
                "NarHash" => {
                    if !value.starts_with("sha256:") {
                        return Err(NarInfoError::UnsupportedHashAlgorithm(value.to_string()));
                    }
                    nar_hash = Some(value.to_string());
                }
                "NarSize" => {
                    nar_size = Some(
                        value
                            .parse::<u64>()
                            .map_err(|_| NarInfoError::InvalidNarSize(value.to_string()))?,
                    );
                }
                "References" => {
                    references = value
                        .split_whitespace()
                        .map(|r| {
                            StoreBase::parse(r)
                                .map_err(|e| NarInfoError::InvalidReference(r.to_string(), e))
                        })
                        .collect::<Result<_, _>>()?;
                }
                "Sig" => signatures.push(NarSignature::parse(value)?),
                _ => {}
            }
        }

        Ok(NarInfo {
            store_path: store_path.ok_or(NarInfoError::MissingField("StorePath"))?,
            url: url.ok_or(NarInfoError::MissingField("URL"))?,
            compression: compression.ok_or(NarInfoError::MissingField("Compression"))?,
            nar_hash: nar_hash.ok_or(NarInfoError::MissingField("NarHash"))?,
            nar_size: nar_size.ok_or(NarInfoError::MissingField("NarSize"))?,
            references,
            signatures,
        })
    }

    /// Check that this narinfo describes the path the caller asked for.
    pub fn ensure_store_path(&self, expected: &str) -> Result<(), NarInfoError> {
        if self.store_path != expected {
            return Err(NarInfoError::StorePathMismatch {
                expected: expected.to_string(),
                actual: self.store_path.clone(),
            });
        }
        Ok(())
    }

    /// The message the cache signed for this path.
    pub fn fingerprint(&self) -> String {
        fingerprint(
            &self.store_path,
            &self.nar_hash,
            self.nar_size,
            &self.references,
        )
    }

    /// Verify that at least one signature is by a trusted key and valid.
    ///
    /// Every `Sig` line is tried in published order before giving up.
    pub fn verify(&self, keys: &TrustedKeys) -> Result<(), NarInfoError> {
        if self.signatures.is_empty() {
            return Err(NarInfoError::MissingSignature);
        }
        let message = self.fingerprint();
        let mut tried_trusted_key = false;
        for sig in &self.signatures {
            let Some(key) = keys.get(sig.key_name()) else {
                continue;
            };
            tried_trusted_key = true;
            if key.verify(message.as_bytes(), sig.signature()) {
                return Ok(());
            }
        }
        if tried_trusted_key {
            Err(NarInfoError::BadSignature)
        } else {
            Err(NarInfoError::UnknownKey(
                self.signatures[0].key_name().to_string(),
            ))
        }
    }
}
