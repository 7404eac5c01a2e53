//! Store base names of the form `HASH-NAME`.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Number of base32 characters in the hash part of a store base.
pub const HASH_PART_LEN: usize = 32;

const HASH_CHARS: &[u8; 32] = b"0123456789abcdfghijklmnpqrsvwxyz";

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum StorePathError {
    #[error("store base `{0}` is missing the `-` between hash and name")]
    MissingSeparator(String),

    #[error("store base `{0}` does not start with a 32-character base32 hash")]
    InvalidHashPart(String),

    #[error("store base `{0}` has an empty name part")]
    EmptyName(String),

    #[error("store base `{0}` contains a `/`")]
    InvalidName(String),
}

/// The `HASH-NAME` component of a store path, e.g.
/// `26xbg1ndr7hbcncrlf9nhx5is2b25d13-hello-2.12.1`.
///
/// Identity is the full string; the hash part is the lookup key at a
/// substituter.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StoreBase(String);

impl StoreBase {
    pub fn parse(s: &str) -> Result<Self, StorePathError> {
        if s.contains('/') {
            return Err(StorePathError::InvalidName(s.to_string()));
        }
        let hash = s
            .get(..HASH_PART_LEN)
            .ok_or_else(|| StorePathError::InvalidHashPart(s.to_string()))?;
        if !hash.bytes().all(|b| HASH_CHARS.contains(&b)) {
            return Err(StorePathError::InvalidHashPart(s.to_string()));
        }
        match s.as_bytes().get(HASH_PART_LEN) {
            Some(b'-') => {}
            _ => return Err(StorePathError::MissingSeparator(s.to_string())),
        }
        if s.len() == HASH_PART_LEN + 1 {
            return Err(StorePathError::EmptyName(s.to_string()));
        }
        Ok(StoreBase(s.to_string()))
    }

    /// The base32 hash prefix, the lookup key for `<hash>.narinfo`.
    pub fn hash_part(&self) -> &str {
        &self.0[..HASH_PART_LEN]
    }

    pub fn name(&self) -> &str {
        &self.0[HASH_PART_LEN + 1..]
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoreBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for StoreBase {
    type Err = StorePathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StoreBase::parse(s)
    }
}

impl AsRef<str> for StoreBase {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
