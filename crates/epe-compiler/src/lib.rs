// SPDX-License-Identifier: Apache-2.0
//! Flat compiler: turns a [`PolicyStore`] into an immutable, O(1)-lookup
//! [`FlatSnapshot`] honoring suppression precedence.

#![deny(missing_docs, rust_2018_idioms, unused_must_use)]

use epe_trie::PolicyStore;
use rustc_hash::FxHashSet;
use std::sync::Arc;

/// An immutable set of dotted paths plus the version/service identity it was
/// compiled for. Membership answers ALLOW in O(1). Wildcards are not
/// supported — hierarchical prefix matching is resolved at compile time by
/// emitting one path per allowed leaf.
#[derive(Debug, Clone)]
pub struct FlatSnapshot {
    service_id: Arc<str>,
    version: u64,
    paths: Arc<FxHashSet<String>>,
}

impl FlatSnapshot {
    /// The monotonically increasing version of this snapshot.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The service identity this snapshot was compiled for.
    #[must_use]
    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    /// `true` iff the exact dotted path is a member of this snapshot.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }

    /// Number of distinct allowed paths in this snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// `true` if the snapshot contains no allowed paths.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Iterate the contained dotted paths. Order is unspecified.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }
}

/// Compiles `store` into a fresh [`FlatSnapshot`], assigning
/// `previous_version + 1` as its version.
///
/// 1. Runs [`PolicyStore::flatten`] to obtain the pre-order allow list with
///    suppression pruning applied.
/// 2. Deduplicates into a fresh set.
/// 3. Stamps `version` and `service_id`.
#[must_use]
pub fn compile(store: &PolicyStore, previous_version: u64) -> FlatSnapshot {
    let paths: FxHashSet<String> = store.flatten().into_iter().collect();
    FlatSnapshot {
        service_id: Arc::from(store.service_id()),
        version: previous_version + 1,
        paths: Arc::new(paths),
    }
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
    fn s3_compile_precedence() {
        let mut store = PolicyStore::new("svc");
        store.allow(&p("a.b.c"));
        store.allow(&p("a.b.d"));
        store.suppress(&p("a.b"));
        store.allow(&p("x.y"));

        let snap = compile(&store, 0);
        assert_eq!(snap.version(), 1);
        assert!(snap.contains("x.y"));
        assert!(!snap.contains("a.b.c"));
        assert!(!snap.contains("a.b.d"));
        assert_eq!(snap.len(), 1);
    }

    #[test]
    fn version_is_monotone_across_recompiles() {
        let mut store = PolicyStore::new("svc");
        store.allow(&p("a"));
        let snap1 = compile(&store, 0);
        store.allow(&p("b"));
        let snap2 = compile(&store, snap1.version());
        let snap3 = compile(&store, snap2.version());
        assert!(snap2.version() > snap1.version());
        assert!(snap3.version() > snap2.version());
    }

    #[test]
    fn empty_store_compiles_to_empty_snapshot() {
        let store = PolicyStore::new("svc");
        let snap = compile(&store, 41);
        assert!(snap.is_empty());
        assert_eq!(snap.version(), 42);
    }

    proptest::proptest! {
        /// A compiled snapshot contains exactly the paths that check as
        /// allowed against the source store.
        #[test]
        fn compile_fidelity(
            allow_segs in proptest::collection::vec("[a-z]{1,4}", 1..3),
            suppress_prefix_len in 0usize..3,
        ) {
            let mut store = PolicyStore::new("svc");
            let allow_path = Path::from_segments(allow_segs.clone()).unwrap();
            store.allow(&allow_path);

            if suppress_prefix_len > 0 && suppress_prefix_len <= allow_segs.len() {
                let prefix = Path::from_segments(allow_segs[..suppress_prefix_len].to_vec()).unwrap();
                store.suppress(&prefix);
            }

            let snap = compile(&store, 0);
            let checked_allowed = store.check(&allow_path) == epe_trie::CheckResult::Allowed;
            proptest::prop_assert_eq!(snap.contains(&allow_path.to_dotted()), checked_allowed);
        }
    }
}
