// SPDX-License-Identifier: Apache-2.0
//! `PolicyStore`: the hierarchical allow/suppress map over dotted paths.

use epe_path::Path;

use crate::node::TrieNode;
use crate::CheckResult;

/// Owns one root [`TrieNode`] identified by `service_id`. Cloning produces a
/// deep, independent copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyStore {
    service_id: String,
    root: TrieNode,
}

impl PolicyStore {
    /// Create an empty store for the given service.
    #[must_use]
    pub fn new(service_id: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            root: TrieNode::default(),
        }
    }

    /// The identity this store was created for.
    #[must_use]
    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    /// The root node, for read-only inspection.
    #[must_use]
    pub fn root(&self) -> &TrieNode {
        &self.root
    }

    /// Walk segments from root, creating missing children, and set the
    /// terminal node's `allowed` flag. Idempotent. Never clears `suppressed`.
    pub fn allow(&mut self, path: &Path) {
        let node = Self::walk_creating(&mut self.root, path);
        node.allowed = true;
    }

    /// Walk segments from root, creating missing children, and set the
    /// terminal node's `suppressed` flag. Idempotent. Never clears `allowed`.
    pub fn suppress(&mut self, path: &Path) {
        let node = Self::walk_creating(&mut self.root, path);
        node.suppressed = true;
    }

    fn walk_creating<'a>(root: &'a mut TrieNode, path: &Path) -> &'a mut TrieNode {
        let mut node = root;
        for segment in path.segments() {
            node = node.children.entry(segment.clone()).or_default();
        }
        node
    }

    /// Walk segments from root; if any segment is missing, return
    /// `DeniedNotFound`. If any visited node (including the terminal) has
    /// `suppressed = true`, return `BlockedSuppressed` — suppression has
    /// precedence over allow and ancestor suppression blocks descendants.
    /// Otherwise return `Allowed` if the terminal is allowed, else
    /// `DeniedNotFound`.
    #[must_use]
    pub fn check(&self, path: &Path) -> CheckResult {
        let mut node = &self.root;
        if node.suppressed {
            return CheckResult::BlockedSuppressed;
        }
        for segment in path.segments() {
            match node.children.get(segment) {
                Some(next) => {
                    node = next;
                    if node.suppressed {
                        return CheckResult::BlockedSuppressed;
                    }
                }
                None => return CheckResult::DeniedNotFound,
            }
        }
        if node.allowed {
            CheckResult::Allowed
        } else {
            CheckResult::DeniedNotFound
        }
    }

    /// Walk both tries in lockstep along shared keys; emit the current path
    /// when **both** current nodes have `allowed = true`. Suppression flags
    /// are ignored here — pruning for enforcement is the compiler's job.
    ///
    /// Traversal order is pre-order over the receiver's children, with
    /// children visited in ascending segment order so results are stable
    /// across runs rather than following hash-map iteration order.
    #[must_use]
    pub fn intersection(&self, other: &PolicyStore) -> Vec<String> {
        let mut out = Vec::new();
        Self::intersect_walk(&self.root, &other.root, &mut Vec::new(), &mut out);
        out
    }

    fn intersect_walk(
        mine: &TrieNode,
        theirs: &TrieNode,
        prefix: &mut Vec<String>,
        out: &mut Vec<String>,
    ) {
        if mine.allowed && theirs.allowed {
            out.push(prefix.join("."));
        }
        for (segment, mine_child) in mine.sorted_children() {
            if let Some(their_child) = theirs.child(segment) {
                prefix.push(segment.to_string());
                Self::intersect_walk(mine_child, their_child, prefix, out);
                prefix.pop();
            }
        }
    }

    /// Pre-order walk from root: if a node is suppressed, emit nothing and do
    /// not descend into its children; otherwise emit the path if `allowed`,
    /// then always descend.
    #[must_use]
    pub fn flatten(&self) -> Vec<String> {
        let mut out = Vec::new();
        Self::flatten_walk(&self.root, &mut Vec::new(), &mut out);
        out
    }

    fn flatten_walk(node: &TrieNode, prefix: &mut Vec<String>, out: &mut Vec<String>) {
        if node.suppressed {
            return;
        }
        if node.allowed {
            out.push(prefix.join("."));
        }
        for (segment, child) in node.sorted_children() {
            prefix.push(segment.to_string());
            Self::flatten_walk(child, prefix, out);
            prefix.pop();
        }
    }

    /// For every path in `other` whose terminal has `suppressed = true`, call
    /// `suppress(path)` on self iff `path_filter(path)` accepts it.
    /// Transduction never copies allow flags.
    pub fn transduce_from(&mut self, other: &PolicyStore, path_filter: impl Fn(&str) -> bool) {
        let mut suppressed_paths = Vec::new();
        Self::collect_suppressed(&other.root, &mut Vec::new(), &mut suppressed_paths);
        for dotted in suppressed_paths {
            if path_filter(&dotted) {
                // Path was produced by our own traversal over valid segments,
                // so re-parsing cannot fail.
                if let Ok(path) = Path::parse(&dotted) {
                    self.suppress(&path);
                }
            }
        }
    }

    fn collect_suppressed(node: &TrieNode, prefix: &mut Vec<String>, out: &mut Vec<String>) {
        if node.suppressed {
            out.push(prefix.join("."));
        }
        for (segment, child) in node.sorted_children() {
            prefix.push(segment.to_string());
            Self::collect_suppressed(child, prefix, out);
            prefix.pop();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn p(s: &str) -> Path {
        Path::parse(s).unwrap()
    }

    #[test]
    fn s1_basic_allow_deny() {
        let mut store = PolicyStore::new("svc");
        store.allow(&p("user.name"));
        assert_eq!(store.check(&p("user.name")), CheckResult::Allowed);
        assert_eq!(store.check(&p("user.email")), CheckResult::DeniedNotFound);
        assert_eq!(store.check(&p("user")), CheckResult::DeniedNotFound);
    }

    #[test]
    fn s2_ancestor_suppression() {
        let mut store = PolicyStore::new("svc");
        store.allow(&p("user.email"));
        store.suppress(&p("user"));
        assert_eq!(
            store.check(&p("user.email")),
            CheckResult::BlockedSuppressed
        );
        assert!(store.flatten().is_empty());
    }

    #[test]
    fn s3_compile_precedence_flatten() {
        let mut store = PolicyStore::new("svc");
        store.allow(&p("a.b.c"));
        store.allow(&p("a.b.d"));
        store.suppress(&p("a.b"));
        store.allow(&p("x.y"));
        assert_eq!(store.flatten(), vec!["x.y".to_string()]);
    }

    #[test]
    fn idempotent_allow_and_suppress() {
        let mut a = PolicyStore::new("svc");
        a.allow(&p("a.b"));
        a.allow(&p("a.b"));
        let mut b = PolicyStore::new("svc");
        b.allow(&p("a.b"));
        assert_eq!(a.flatten(), b.flatten());

        a.suppress(&p("c"));
        a.suppress(&p("c"));
        b.suppress(&p("c"));
        assert_eq!(a.check(&p("c")), b.check(&p("c")));
    }

    #[test]
    fn allow_does_not_clear_suppress_and_vice_versa() {
        let mut store = PolicyStore::new("svc");
        store.suppress(&p("a"));
        store.allow(&p("a"));
        assert!(store.root().child("a").unwrap().is_suppressed());
        assert!(store.root().child("a").unwrap().is_allowed());
    }

    #[test]
    fn intersection_is_commutative_over_allows() {
        let mut a = PolicyStore::new("a");
        a.allow(&p("x.y"));
        a.allow(&p("x.z"));
        a.allow(&p("q"));

        let mut b = PolicyStore::new("b");
        b.allow(&p("x.y"));
        b.allow(&p("w"));

        let mut ab = a.intersection(&b);
        let mut ba = b.intersection(&a);
        ab.sort();
        ba.sort();
        assert_eq!(ab, ba);
        assert_eq!(ab, vec!["x.y".to_string()]);
    }

    #[test]
    fn s6_transduction_copies_suppress_only() {
        let mut a = PolicyStore::new("a");
        a.allow(&p("x"));
        a.suppress(&p("y.z"));

        let mut b = PolicyStore::new("b");
        b.transduce_from(&a, |_| true);

        assert_eq!(b.check(&p("y.z")), CheckResult::BlockedSuppressed);
        assert_eq!(b.check(&p("x")), CheckResult::DeniedNotFound);
    }

    #[test]
    fn transduction_respects_filter() {
        let mut a = PolicyStore::new("a");
        a.suppress(&p("y.z"));
        a.suppress(&p("other.thing"));

        let mut b = PolicyStore::new("b");
        b.transduce_from(&a, |path| path.starts_with("y"));

        assert_eq!(b.check(&p("y.z")), CheckResult::BlockedSuppressed);
        assert_eq!(b.check(&p("other.thing")), CheckResult::DeniedNotFound);
    }

    #[test]
    fn clone_is_deep_and_independent() {
        let mut a = PolicyStore::new("a");
        a.allow(&p("x.y"));
        let mut b = a.clone();
        b.allow(&p("x.z"));
        assert_eq!(a.check(&p("x.z")), CheckResult::DeniedNotFound);
        assert_eq!(b.check(&p("x.z")), CheckResult::Allowed);
    }
}
