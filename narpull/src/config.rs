//! Runtime configuration, fixed at startup and read-only afterwards.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use narpull_store_core::{PublicKey, StoreBase, StorePathError, TrustedKeys};
use url::Url;

pub const DEFAULT_SUBSTITUTER: &str = "https://cache.nixos.org";
pub const DEFAULT_PUBLIC_KEY: &str =
    "cache.nixos.org-1:6NCHdD59X431o0gWypbMrAURkbJ16ZPMQFGspcDShjY=";

#[derive(Debug, Clone)]
pub struct Config {
    pub store_root: PathBuf,
    pub substituters: Vec<Url>,
    pub trusted_keys: TrustedKeys,
}

impl Config {
    /// Build the configuration from CLI inputs, falling back to
    /// cache.nixos.org and its key when none are given.
    pub fn new(
        store: &Path,
        substituters: Vec<String>,
        public_keys: Vec<String>,
    ) -> Result<Config> {
        let store_root = std::path::absolute(store)
            .with_context(|| format!("bad store root `{}`", store.display()))?;

        let mut substituters = substituters;
        if substituters.is_empty() {
            substituters.push(DEFAULT_SUBSTITUTER.to_string());
        }
        let substituters = substituters
            .iter()
            .map(|s| {
                Url::parse(s.trim_end_matches('/'))
                    .with_context(|| format!("invalid substituter URL `{s}`"))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut public_keys = public_keys;
        if public_keys.is_empty() {
            public_keys.push(DEFAULT_PUBLIC_KEY.to_string());
        }
        let trusted_keys = public_keys
            .iter()
            .map(|k| PublicKey::parse(k).with_context(|| format!("invalid public key `{k}`")))
            .collect::<Result<TrustedKeys>>()?;

        Ok(Config {
            store_root,
            substituters,
            trusted_keys,
        })
    }

    /// Absolute on-disk location of a store base.
    pub fn store_path(&self, base: &StoreBase) -> PathBuf {
        self.store_root.join(base.as_str())
    }

    /// Parse a positional argument: either a bare `HASH-NAME` or an
    /// absolute store path whose prefix is stripped. Both the configured
    /// store root and the conventional `/nix/store` are accepted.
    pub fn parse_store_arg(&self, arg: &str) -> Result<StoreBase, StorePathError> {
        let root = format!("{}/", self.store_root.display());
        let base = arg
            .strip_prefix(&root)
            .or_else(|| arg.strip_prefix("/nix/store/"))
            .unwrap_or(arg);
        StoreBase::parse(base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_store(store: &str) -> Config {
        Config::new(Path::new(store), vec![], vec![]).unwrap()
    }

    #[test]
    fn defaults() {
        let config = config_with_store("/nix/store");
        assert_eq!(config.substituters.len(), 1);
        // Url keeps a normalized trailing slash; callers trim when joining
        assert_eq!(config.substituters[0].as_str(), "https://cache.nixos.org/");
        assert!(config.trusted_keys.get("cache.nixos.org-1").is_some());
    }

    #[test]
    fn rejects_bad_key() {
        assert!(Config::new(
            Path::new("/nix/store"),
            vec![],
            vec!["cache.example.org-1:not-base64!!".to_string()],
        )
        .is_err());
    }

    #[test]
    fn rejects_bad_substituter() {
        assert!(Config::new(
            Path::new("/nix/store"),
            vec!["not a url".to_string()],
            vec![],
        )
        .is_err());
    }

    #[test]
    fn strips_store_prefixes() {
        let config = config_with_store("/opt/store");
        let base = "26xbg1ndr7hbcncrlf9nhx5is2b25d13-hello-2.12.1";

        for arg in [
            base.to_string(),
            format!("/opt/store/{base}"),
            format!("/nix/store/{base}"),
        ] {
            assert_eq!(config.parse_store_arg(&arg).unwrap().as_str(), base);
        }
        assert!(config.parse_store_arg("/somewhere/else/x").is_err());
    }
}
