//! Nix-flavored base32 encoding.
//!
//! Not RFC 4648: the alphabet omits `e`, `o`, `t` and `u`, and characters
//! are emitted from the most significant 5-bit group down, reading the
//! input as a little-endian bit string.

// omitted: E O U T
const BASE32_CHARS: &[u8; 32] = b"0123456789abcdfghijklmnpqrsvwxyz";

/// Length of the base32 encoding of `n_bytes` bytes.
pub const fn encoded_len(n_bytes: usize) -> usize {
    if n_bytes == 0 {
        0
    } else {
        (n_bytes * 8 - 1) / 5 + 1
    }
}

/// Encode a byte digest in Nix base32.
pub fn encode(bytes: &[u8]) -> String {
    let len = encoded_len(bytes.len());
    let mut out = String::with_capacity(len);

    for n in (0..len).rev() {
        let b = n * 5;
        let i = b / 8;
        let j = b % 8;
        // 5 bits starting at bit offset b, possibly straddling two bytes
        let lo = bytes.get(i).map_or(0, |&v| v >> j);
        let hi = if j == 0 {
            0
        } else {
            bytes.get(i + 1).map_or(0, |&v| v << (8 - j))
        };
        out.push(BASE32_CHARS[((lo | hi) & 0x1f) as usize] as char);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::md5(16, 26)]
    #[case::sha1(20, 32)]
    #[case::sha256(32, 52)]
    #[case::sha512(64, 103)]
    fn digest_lengths(#[case] bytes: usize, #[case] chars: usize) {
        assert_eq!(encoded_len(bytes), chars);
        assert_eq!(encode(&vec![0u8; bytes]).len(), chars);
    }

    #[test]
    fn zero_digest_is_all_zeros() {
        assert_eq!(encode(&[0u8; 32]), "0".repeat(52));
    }

    #[test]
    fn sha256_abc_vector() {
        // Matches `nix-hash --type sha256 --to-base32` for sha256("abc").
        let digest = ring::digest::digest(&ring::digest::SHA256, b"abc");
        assert_eq!(
            encode(digest.as_ref()),
            "1b8m03r63zqhnjf7l5wnldhh7c134ap5vpj0850ymkq1iyzicy5s"
        );
    }

    #[test]
    fn empty_input() {
        assert_eq!(encode(&[]), "");
    }
}
