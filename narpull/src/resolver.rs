//! Closure resolution: walk the reference graph and plan the downloads.

use std::collections::{HashSet, VecDeque};
use std::io;

use narpull_store_core::{Compression, NarInfo, StoreBase};
use tokio::fs;
use tracing::{debug, trace};

use crate::config::Config;
use crate::error::ResolveError;
use crate::substituter::NarInfoSource;

/// One entry of the download plan, everything the pipeline needs to
/// fetch, verify and manifest a single store path.
#[derive(Debug, Clone)]
pub struct ResolvedPath {
    pub base: StoreBase,
    /// References of this path, sorted lexicographically.
    pub references: Vec<StoreBase>,
    pub nar_url: String,
    pub compression: Compression,
    pub nar_size: u64,
    pub nar_hash: String,
}

pub struct Resolver<'a, S> {
    config: &'a Config,
    source: &'a S,
}

impl<'a, S: NarInfoSource> Resolver<'a, S> {
    pub fn new(config: &'a Config, source: &'a S) -> Self {
        Self { config, source }
    }

    /// BFS the reference graph from `root`, skipping paths already on
    /// disk, and return the plan in leaf-before-parent order: every
    /// path's references are either already present or appear earlier.
    ///
    /// BFS visits parents before their descendants, so reversing the
    /// visit order is enough; no full topological sort is needed.
    pub async fn resolve(&self, root: &StoreBase) -> Result<Vec<ResolvedPath>, ResolveError> {
        let mut visited: HashSet<StoreBase> = HashSet::new();
        let mut queue: VecDeque<StoreBase> = VecDeque::from([root.clone()]);
        let mut plan = Vec::new();

        while let Some(base) = queue.pop_front() {
            if !visited.insert(base.clone()) {
                continue;
            }

            let on_disk = self.config.store_path(&base);
            match fs::symlink_metadata(&on_disk).await {
                Ok(_) => {
                    trace!(base = %base, "already present, skipping");
                    continue;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(ResolveError::Stat {
                        path: on_disk,
                        source: e,
                    });
                }
            }

            let resolved = self.resolve_one(&base).await?;
            for reference in &resolved.references {
                if !visited.contains(reference) {
                    queue.push_back(reference.clone());
                }
            }
            plan.push(resolved);
        }

        plan.reverse();
        debug!(root = %root, missing = plan.len(), "closure resolved");
        Ok(plan)
    }

    async fn resolve_one(&self, base: &StoreBase) -> Result<ResolvedPath, ResolveError> {
        let fetched = self
            .source
            .fetch_narinfo(base.hash_part())
            .await
            .ok_or_else(|| ResolveError::Unavailable(base.clone()))?;

        let narinfo_err = |source| ResolveError::NarInfo {
            base: base.clone(),
            source,
        };

        let info = NarInfo::parse(&fetched.text).map_err(narinfo_err)?;
        let expected = format!("{}/{}", self.config.store_root.display(), base);
        info.ensure_store_path(&expected).map_err(narinfo_err)?;
        info.verify(&self.config.trusted_keys).map_err(narinfo_err)?;

        let nar_url = fetched.nar_url(&info.url);
        let mut references = info.references;
        references.sort();

        Ok(ResolvedPath {
            base: base.clone(),
            references,
            nar_url,
            compression: info.compression,
            nar_size: info.nar_size,
            nar_hash: info.nar_hash,
        })
    }
}
