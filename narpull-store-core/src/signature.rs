//! Ed25519 cache signatures and the trusted public key set.

use std::collections::HashMap;
use std::fmt;

use base64::{engine::general_purpose, Engine};
use ed25519_dalek::{Signature as Ed25519Signature, Verifier, VerifyingKey};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("failed to decode base64: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    #[error("invalid signature length: expected 64 bytes, got {0}")]
    InvalidSignatureLength(usize),

    #[error("invalid public key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("invalid format: {0}")]
    InvalidFormat(String),

    #[error("failed to parse ed25519 key material: {0}")]
    Ed25519(#[from] ed25519_dalek::SignatureError),
}

/// A newtype wrapper around an Ed25519 signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature(Ed25519Signature);

impl Signature {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SignatureError> {
        if bytes.len() != 64 {
            return Err(SignatureError::InvalidSignatureLength(bytes.len()));
        }
        Ok(Signature(Ed25519Signature::from_slice(bytes)?))
    }

    /// Parse a signature from standard base64.
    pub fn from_base64(s: &str) -> Result<Self, SignatureError> {
        let bytes = general_purpose::STANDARD.decode(s)?;
        Self::from_bytes(&bytes)
    }

    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(self.0.to_bytes())
    }

    fn inner(&self) -> &Ed25519Signature {
        &self.0
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_base64())
    }
}

/// One `Sig` entry of a narinfo, in the text form `key-name:base64-signature`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NarSignature {
    key_name: String,
    sig: Signature,
}

impl NarSignature {
    /// Parse from the text format `key-name:base64-signature`.
    pub fn parse(s: &str) -> Result<Self, SignatureError> {
        let (key_name, sig) = s
            .split_once(':')
            .ok_or_else(|| SignatureError::InvalidFormat("missing `:` separator".to_string()))?;
        if key_name.is_empty() {
            return Err(SignatureError::InvalidFormat("empty key name".to_string()));
        }
        Ok(Self {
            key_name: key_name.to_string(),
            sig: Signature::from_base64(sig)?,
        })
    }

    /// The name of the key that produced this signature,
    /// e.g. `cache.nixos.org-1`.
    pub fn key_name(&self) -> &str {
        &self.key_name
    }

    pub fn signature(&self) -> &Signature {
        &self.sig
    }
}

impl fmt::Display for NarSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.key_name, self.sig)
    }
}

/// A named Ed25519 public key of a binary cache.
#[derive(Clone, Debug)]
pub struct PublicKey {
    name: String,
    key: VerifyingKey,
}

impl PublicKey {
    /// Parse from the text format `key-name:base64-public-key`, as handed
    /// to `--public-key` and published by caches.
    pub fn parse(s: &str) -> Result<Self, SignatureError> {
        let (name, key) = s
            .split_once(':')
            .ok_or_else(|| SignatureError::InvalidFormat("missing `:` separator".to_string()))?;
        if name.is_empty() {
            return Err(SignatureError::InvalidFormat("empty key name".to_string()));
        }
        let bytes = general_purpose::STANDARD.decode(key)?;
        let bytes: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| SignatureError::InvalidKeyLength(bytes.len()))?;
        Ok(Self {
            name: name.to_string(),
            key: VerifyingKey::from_bytes(&bytes)?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether `sig` is a valid signature over `message` by this key.
    pub fn verify(&self, message: &[u8], sig: &Signature) -> bool {
        self.key.verify(message, sig.inner()).is_ok()
    }
}

/// The set of cache keys trusted to sign store paths, indexed by key name.
///
/// Populated once at startup, read-only afterwards.
#[derive(Clone, Debug, Default)]
pub struct TrustedKeys(HashMap<String, PublicKey>);

impl TrustedKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: PublicKey) {
        self.0.insert(key.name().to_string(), key);
    }

    pub fn get(&self, name: &str) -> Option<&PublicKey> {
        self.0.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<PublicKey> for TrustedKeys {
    fn from_iter<I: IntoIterator<Item = PublicKey>>(iter: I) -> Self {
        let mut keys = Self::new();
        for key in iter {
            keys.insert(key);
        }
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CACHE_NIXOS_ORG: &str =
        "cache.nixos.org-1:6NCHdD59X431o0gWypbMrAURkbJ16ZPMQFGspcDShjY=";

    #[test]
    fn signature_roundtrip() {
        let sig = Signature::from_bytes(&[42u8; 64]).unwrap();
        let sig2 = Signature::from_base64(&sig.to_base64()).unwrap();
        assert_eq!(sig, sig2);
    }

    #[test]
    fn nar_signature_parse() {
        let text = "cache.example.com-1:6wzr1QlOPHG+knFuJIaw+85Z5ivwbdI512JikexG+nQ7JDSZM2hw8zzlcLrguzoLEpCA9VzaEEQflZEHVwy9AA==";
        let sig = NarSignature::parse(text).unwrap();
        assert_eq!(sig.key_name(), "cache.example.com-1");
        assert_eq!(sig.to_string(), text);
    }

    #[test]
    fn invalid_signature_length() {
        let short = general_purpose::STANDARD.encode([0u8; 32]);
        let err = NarSignature::parse(&format!("key:{short}")).unwrap_err();
        assert!(matches!(err, SignatureError::InvalidSignatureLength(32)));
    }

    #[test]
    fn public_key_parse() {
        let key = PublicKey::parse(CACHE_NIXOS_ORG).unwrap();
        assert_eq!(key.name(), "cache.nixos.org-1");
    }

    #[test]
    fn public_key_rejects() {
        assert!(PublicKey::parse("no-colon").is_err());
        assert!(PublicKey::parse(":no-name").is_err());
        assert!(PublicKey::parse("name:invalid-base64!!!").is_err());
        // 16 bytes is not an ed25519 public key
        let short = general_purpose::STANDARD.encode([0u8; 16]);
        assert!(matches!(
            PublicKey::parse(&format!("name:{short}")),
            Err(SignatureError::InvalidKeyLength(16))
        ));
    }

    #[test]
    fn trusted_keys_lookup() {
        let keys: TrustedKeys = [PublicKey::parse(CACHE_NIXOS_ORG).unwrap()]
            .into_iter()
            .collect();
        assert!(keys.get("cache.nixos.org-1").is_some());
        assert!(keys.get("cache.example.org-1").is_none());
    }
}
