//! NAR (Nix ARchive) format handling for narpull.
//!
//! This crate decodes the archive format binary caches serve for store
//! paths and restores it to the filesystem in a single streaming pass,
//! with bounded memory usage. It only reads NARs; packing is a cache-side
//! concern and lives elsewhere.

pub mod extract;
pub mod wire;

#[cfg(any(test, feature = "test"))]
pub mod test_data;

pub use extract::{extract, NarError, NarExtractor, NAR_MAGIC};
pub use wire::{WireError, WireReader, MAX_STRING_LEN};
