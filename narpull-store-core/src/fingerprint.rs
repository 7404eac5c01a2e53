//! The message a binary cache signs for one store path.

use crate::store_path::StoreBase;

/// Store prefix signatures are computed against. Caches always sign with
/// this canonical prefix, even when the local store root differs.
pub const CANONICAL_STORE_DIR: &str = "/nix/store";

/// Build the signed fingerprint for a store path:
///
/// `1;<store-path>;<nar-hash>;<nar-size>;<comma-joined reference paths>`
///
/// `store_path` and `nar_hash` are included verbatim as published in the
/// narinfo; each reference base is given the canonical `/nix/store/`
/// prefix. No trailing newline.
pub fn fingerprint(
    store_path: &str,
    nar_hash: &str,
    nar_size: u64,
    references: &[StoreBase],
) -> String {
    let mut out = format!("1;{store_path};{nar_hash};{nar_size};");
    for (i, reference) in references.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(CANONICAL_STORE_DIR);
        out.push('/');
        out.push_str(reference.as_str());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_references() {
        let refs = [
            StoreBase::parse("0jqd0rlxzra1rs38rdxl43yh6rxchgc6-curl-7.82.0").unwrap(),
            StoreBase::parse("5dq2jj6d7k197p6fzqn8l5n0jfmhxmcg-glibc-2.33-59").unwrap(),
        ];
        let fp = fingerprint(
            "/nix/store/syd87l2rxw8cbsxmxl853h0r6pdwhwjr-curl-7.82.0-bin",
            "sha256:1b4sb93wp679q4zx9k1ignby1yna3z7c4c2ri3wphylbc2dwsys0",
            196040,
            &refs,
        );
        assert_eq!(
            fp,
            "1;/nix/store/syd87l2rxw8cbsxmxl853h0r6pdwhwjr-curl-7.82.0-bin;sha256:1b4sb93wp679q4zx9k1ignby1yna3z7c4c2ri3wphylbc2dwsys0;196040;/nix/store/0jqd0rlxzra1rs38rdxl43yh6rxchgc6-curl-7.82.0,/nix/store/5dq2jj6d7k197p6fzqn8l5n0jfmhxmcg-glibc-2.33-59"
        );
    }

    #[test]
    fn without_references() {
        let fp = fingerprint(
            "/nix/store/26xbg1ndr7hbcncrlf9nhx5is2b25d13-hello-2.12.1",
            "sha256:1mkvday29m2qxg1fnbv8xh9s6151bh8a2xzhh0k86j7lqhyfwibh",
            226560,
            &[],
        );
        assert_eq!(
            fp,
            "1;/nix/store/26xbg1ndr7hbcncrlf9nhx5is2b25d13-hello-2.12.1;sha256:1mkvday29m2qxg1fnbv8xh9s6151bh8a2xzhh0k86j7lqhyfwibh;226560;"
        );
    }

    #[test]
    fn canonical_prefix_is_independent_of_store_root() {
        // Even for a relocated store the signed message uses /nix/store.
        let refs = [StoreBase::parse("00000000000000000000000000000000-dep").unwrap()];
        let fp = fingerprint(
            "/opt/store/11111111111111111111111111111111-pkg",
            "sha256:0000000000000000000000000000000000000000000000000000",
            1,
            &refs,
        );
        assert!(fp.ends_with(";/nix/store/00000000000000000000000000000000-dep"));
    }
}
