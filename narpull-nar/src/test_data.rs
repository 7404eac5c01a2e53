//! Helpers for building wire-exact NAR byte vectors in tests.

use crate::extract::NAR_MAGIC;
use crate::wire::pad_len;

/// Append a length-prefixed, zero-padded string.
pub fn push_string(out: &mut Vec<u8>, s: &[u8]) {
    out.extend_from_slice(&(s.len() as u64).to_le_bytes());
    out.extend_from_slice(s);
    out.extend(std::iter::repeat(0u8).take(pad_len(s.len() as u64) as usize));
}

/// A regular-file node, without the archive magic.
pub fn node_regular(contents: &[u8], executable: bool) -> Vec<u8> {
    let mut out = Vec::new();
    push_string(&mut out, b"(");
    push_string(&mut out, b"type");
    push_string(&mut out, b"regular");
    if executable {
        push_string(&mut out, b"executable");
        push_string(&mut out, b"");
    }
    push_string(&mut out, b"contents");
    // contents share the string wire shape: length, raw bytes, padding
    push_string(&mut out, contents);
    push_string(&mut out, b")");
    out
}

/// A symlink node, without the archive magic.
pub fn node_symlink(target: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    push_string(&mut out, b"(");
    push_string(&mut out, b"type");
    push_string(&mut out, b"symlink");
    push_string(&mut out, b"target");
    push_string(&mut out, target);
    push_string(&mut out, b")");
    out
}

/// A directory node from `(name, node)` pairs, without the archive magic.
pub fn node_directory(entries: Vec<(Vec<u8>, Vec<u8>)>) -> Vec<u8> {
    let mut out = Vec::new();
    push_string(&mut out, b"(");
    push_string(&mut out, b"type");
    push_string(&mut out, b"directory");
    for (name, node) in entries {
        push_string(&mut out, b"entry");
        push_string(&mut out, b"(");
        push_string(&mut out, b"name");
        push_string(&mut out, &name);
        push_string(&mut out, b"node");
        out.extend_from_slice(&node);
        push_string(&mut out, b")");
    }
    push_string(&mut out, b")");
    out
}

fn archive(node: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::new();
    push_string(&mut out, NAR_MAGIC);
    out.extend_from_slice(&node);
    out
}

/// A complete archive of a single regular file.
pub fn regular(contents: &[u8], executable: bool) -> Vec<u8> {
    archive(node_regular(contents, executable))
}

/// A complete archive of a single symlink.
pub fn symlink(target: &[u8]) -> Vec<u8> {
    archive(node_symlink(target))
}

/// A complete archive of a directory tree.
pub fn directory(entries: Vec<(Vec<u8>, Vec<u8>)>) -> Vec<u8> {
    archive(node_directory(entries))
}
