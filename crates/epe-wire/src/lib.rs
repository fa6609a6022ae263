// SPDX-License-Identifier: Apache-2.0
//! Binary framing for store export/import and the data-plane lookup ABI.
//!
//! Two independent wire formats live here:
//!
//! - The **store format** (`export_store`/`import_store`) is a full
//!   round-trip of a [`PolicyStore`]'s allow/suppress tree, used to move a
//!   store between coordinator instances or persist it to disk.
//! - The **lookup ABI** (`export_snapshot`/`decode_snapshot`) is the
//!   one-way feed a sidecar consumes: a flattened, already-resolved set of
//!   allowed paths plus the version it was compiled at. A sidecar only
//!   needs `contains(path) -> bool`; it never reconstructs a trie.

#![deny(missing_docs, rust_2018_idioms, unused_must_use)]

use std::io::{Cursor, Read};

use epe_trie::{PolicyStore, TrieNode};
use thiserror::Error;

const STORE_MAGIC: [u8; 4] = *b"EPE1";
const STORE_FORMAT_VERSION: u32 = 1;

/// Failures from decoding previously-serialized bytes. Encoding never fails.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    /// The first four bytes were not `"EPE1"`.
    #[error("bad magic: expected {STORE_MAGIC:?}, found {found:?}")]
    BadMagic {
        /// The four bytes actually read.
        found: [u8; 4],
    },
    /// The buffer ended before a complete record could be read.
    #[error("truncated input: needed {needed} more byte(s)")]
    Truncated {
        /// How many additional bytes the reader expected.
        needed: usize,
    },
    /// The header's node count did not match the number of records decoded.
    #[error("inconsistent child count: header claimed {claimed}, decoded {decoded}")]
    InconsistentChildCount {
        /// Node count declared in the header.
        claimed: u64,
        /// Node count actually produced by walking the body.
        decoded: u64,
    },
    /// A segment or path was not valid UTF-8.
    #[error("segment bytes were not valid UTF-8")]
    NotUtf8,
    /// Trailing bytes remained after a complete, well-formed decode.
    #[error("{extra} trailing byte(s) after a complete record")]
    TrailingBytes {
        /// Number of unconsumed bytes left in the buffer.
        extra: usize,
    },
}

const FLAG_ALLOWED: u8 = 0b01;
const FLAG_SUPPRESSED: u8 = 0b10;

fn read_exact(cursor: &mut Cursor<&[u8]>, buf: &mut [u8]) -> Result<(), WireError> {
    cursor.read_exact(buf).map_err(|_| WireError::Truncated {
        needed: buf.len().saturating_sub(
            (cursor.get_ref().len() as u64 - cursor.position()).min(buf.len() as u64) as usize,
        ),
    })
}

fn read_u16(cursor: &mut Cursor<&[u8]>) -> Result<u16, WireError> {
    let mut buf = [0u8; 2];
    read_exact(cursor, &mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32(cursor: &mut Cursor<&[u8]>) -> Result<u32, WireError> {
    let mut buf = [0u8; 4];
    read_exact(cursor, &mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64(cursor: &mut Cursor<&[u8]>) -> Result<u64, WireError> {
    let mut buf = [0u8; 8];
    read_exact(cursor, &mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn write_node(out: &mut Vec<u8>, segment: &str, node: &TrieNode, count: &mut u64) {
    *count += 1;
    let segment_bytes = segment.as_bytes();
    out.extend_from_slice(&(segment_bytes.len() as u16).to_le_bytes());
    out.extend_from_slice(segment_bytes);

    let mut flags = 0u8;
    if node.is_allowed() {
        flags |= FLAG_ALLOWED;
    }
    if node.is_suppressed() {
        flags |= FLAG_SUPPRESSED;
    }
    out.push(flags);

    let children = node.sorted_children();
    out.extend_from_slice(&(children.len() as u32).to_le_bytes());
    for (child_segment, child_node) in children {
        write_node(out, child_segment, child_node, count);
    }
}

/// Serializes `store` to the `"EPE1"` store format described in the
/// configuration surface: a magic/version/node-count header followed by a
/// pre-order walk of `(segment_len, segment, flags, child_count)` records.
#[must_use]
pub fn export_store(store: &PolicyStore) -> Vec<u8> {
    let mut body = Vec::new();
    let mut count = 0u64;
    write_node(&mut body, "", store.root(), &mut count);

    let mut out = Vec::with_capacity(4 + 4 + 8 + body.len());
    out.extend_from_slice(&STORE_MAGIC);
    out.extend_from_slice(&STORE_FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&count.to_le_bytes());
    out.extend_from_slice(&body);
    out
}

/// Decodes bytes produced by [`export_store`] back into a [`PolicyStore`]
/// for `service_id`. The service identity is not part of the wire format —
/// it is supplied by the caller, the same way a reload call knows which
/// service it is reloading for.
pub fn import_store(service_id: impl Into<String>, bytes: &[u8]) -> Result<PolicyStore, WireError> {
    let mut cursor = Cursor::new(bytes);

    let mut magic = [0u8; 4];
    read_exact(&mut cursor, &mut magic)?;
    if magic != STORE_MAGIC {
        return Err(WireError::BadMagic { found: magic });
    }
    let _format_version = read_u32(&mut cursor)?;
    let claimed_count = read_u64(&mut cursor)?;

    let mut store = PolicyStore::new(service_id);
    let mut decoded_count = 0u64;
    read_node_into(&mut cursor, &mut store, &mut Vec::new(), &mut decoded_count, true)?;

    if decoded_count != claimed_count {
        return Err(WireError::InconsistentChildCount {
            claimed: claimed_count,
            decoded: decoded_count,
        });
    }

    let remaining = cursor.get_ref().len() as u64 - cursor.position();
    if remaining != 0 {
        return Err(WireError::TrailingBytes {
            extra: remaining as usize,
        });
    }

    Ok(store)
}

fn read_node_into(
    cursor: &mut Cursor<&[u8]>,
    store: &mut PolicyStore,
    prefix: &mut Vec<String>,
    count: &mut u64,
    is_root: bool,
) -> Result<(), WireError> {
    *count += 1;
    let segment_len = read_u16(cursor)? as usize;
    let mut segment_bytes = vec![0u8; segment_len];
    read_exact(cursor, &mut segment_bytes)?;
    let segment = String::from_utf8(segment_bytes).map_err(|_| WireError::NotUtf8)?;
    if !is_root {
        prefix.push(segment);
    }

    let mut flags_buf = [0u8; 1];
    read_exact(cursor, &mut flags_buf)?;
    let flags = flags_buf[0];

    if flags & FLAG_ALLOWED != 0 {
        if let Ok(path) = epe_path::Path::from_segments(prefix.clone()) {
            store.allow(&path);
        }
    }
    if flags & FLAG_SUPPRESSED != 0 {
        if let Ok(path) = epe_path::Path::from_segments(prefix.clone()) {
            store.suppress(&path);
        }
    }

    let child_count = read_u32(cursor)?;
    for _ in 0..child_count {
        read_node_into(cursor, store, prefix, count, false)?;
    }

    if !is_root {
        prefix.pop();
    }
    Ok(())
}

/// Encodes a flattened snapshot as the data-plane lookup ABI: a `u64`
/// version header followed by a length-prefixed list of UTF-8 dotted
/// paths. Paths are emitted in sorted order for a deterministic byte
/// stream across recompiles of the same logical set.
#[must_use]
pub fn export_snapshot(snapshot: &epe_compiler::FlatSnapshot) -> Vec<u8> {
    let mut paths: Vec<&str> = snapshot.iter().collect();
    paths.sort_unstable();

    let mut out = Vec::new();
    out.extend_from_slice(&snapshot.version().to_le_bytes());
    for path in paths {
        let bytes = path.as_bytes();
        out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(bytes);
    }
    out
}

/// Decodes bytes produced by [`export_snapshot`] into a version and the
/// list of dotted paths it carries.
pub fn decode_snapshot(bytes: &[u8]) -> Result<(u64, Vec<String>), WireError> {
    let mut cursor = Cursor::new(bytes);
    let version = read_u64(&mut cursor)?;

    let mut paths = Vec::new();
    while (cursor.position() as usize) < bytes.len() {
        let len = read_u32(&mut cursor)? as usize;
        let mut buf = vec![0u8; len];
        read_exact(&mut cursor, &mut buf)?;
        paths.push(String::from_utf8(buf).map_err(|_| WireError::NotUtf8)?);
    }

    Ok((version, paths))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use epe_path::Path;

    fn p(s: &str) -> Path {
        Path::parse(s).unwrap()
    }

    #[test]
    fn store_round_trips_through_export_import() {
        let mut store = PolicyStore::new("svc");
        store.allow(&p("a.b.c"));
        store.allow(&p("a.b.d"));
        store.suppress(&p("a.b"));
        store.allow(&p("x.y"));

        let bytes = export_store(&store);
        let restored = import_store("svc", &bytes).unwrap();

        assert_eq!(store.flatten(), restored.flatten());
        assert_eq!(
            store.check(&p("a.b.c")),
            restored.check(&p("a.b.c"))
        );
    }

    #[test]
    fn import_rejects_bad_magic() {
        let bytes = b"NOPE\x01\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00".to_vec();
        let err = import_store("svc", &bytes).unwrap_err();
        assert!(matches!(err, WireError::BadMagic { .. }));
    }

    #[test]
    fn import_rejects_truncated_input() {
        let full = export_store(&{
            let mut s = PolicyStore::new("svc");
            s.allow(&p("a.b"));
            s
        });
        let truncated = &full[..full.len() - 3];
        let err = import_store("svc", truncated).unwrap_err();
        assert!(matches!(err, WireError::Truncated { .. }));
    }

    #[test]
    fn import_rejects_trailing_bytes() {
        let mut bytes = export_store(&PolicyStore::new("svc"));
        bytes.push(0xFF);
        let err = import_store("svc", &bytes).unwrap_err();
        assert!(matches!(err, WireError::TrailingBytes { .. }));
    }

    #[test]
    fn empty_store_round_trips() {
        let store = PolicyStore::new("svc");
        let bytes = export_store(&store);
        let restored = import_store("svc", &bytes).unwrap();
        assert!(restored.flatten().is_empty());
    }

    #[test]
    fn snapshot_abi_round_trips() {
        let mut store = PolicyStore::new("svc");
        store.allow(&p("a.b"));
        store.allow(&p("c"));
        let snap = epe_compiler::compile(&store, 7);

        let bytes = export_snapshot(&snap);
        let (version, paths) = decode_snapshot(&bytes).unwrap();

        assert_eq!(version, snap.version());
        assert_eq!(paths.len(), 2);
        assert!(paths.contains(&"a.b".to_string()));
        assert!(paths.contains(&"c".to_string()));
    }

    proptest::proptest! {
        #[test]
        fn store_round_trip_is_lossless(
            paths in proptest::collection::vec("[a-z]{1,4}(\\.[a-z]{1,4}){0,3}", 0..8),
            suppress_mask in proptest::collection::vec(proptest::bool::ANY, 0..8),
        ) {
            let mut store = PolicyStore::new("svc");
            for (i, dotted) in paths.iter().enumerate() {
                let path = Path::parse(dotted).unwrap();
                if suppress_mask.get(i).copied().unwrap_or(false) {
                    store.suppress(&path);
                } else {
                    store.allow(&path);
                }
            }

            let bytes = export_store(&store);
            let restored = import_store("svc", &bytes).unwrap();
            proptest::prop_assert_eq!(store.flatten(), restored.flatten());
        }
    }
}
