//! Download store paths and their closures from signed binary caches.
//!
//! The flow per requested path: [`resolver`] walks the reference graph
//! through [`substituter`] lookups, verifying each narinfo signature
//! against the trusted keys in [`config`]; [`fetcher`] then streams,
//! decompresses, hash-checks and atomically manifests every missing path.

pub mod config;
pub mod error;
pub mod fetcher;
pub mod hashing_reader;
pub mod resolver;
pub mod substituter;

pub use config::Config;
pub use error::{FetchError, ResolveError};
pub use fetcher::Fetcher;
pub use resolver::{ResolvedPath, Resolver};
pub use substituter::{FetchedNarInfo, HttpSubstituters, NarInfoSource};
