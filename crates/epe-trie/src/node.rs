// SPDX-License-Identifier: Apache-2.0
//! The unit of storage in a [`crate::PolicyStore`].

use rustc_hash::FxHashMap;

/// A single node in the policy trie.
///
/// `allowed` and `suppressed` are independent flags — setting one never
/// clears the other. A node can be both allowed and suppressed at once;
/// suppression still wins at lookup time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrieNode {
    pub(crate) allowed: bool,
    pub(crate) suppressed: bool,
    pub(crate) children: FxHashMap<String, TrieNode>,
}

impl TrieNode {
    /// This node's path is explicitly permitted.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    /// This node's subtree is blocked.
    #[must_use]
    pub fn is_suppressed(&self) -> bool {
        self.suppressed
    }

    /// Look up an existing child by segment.
    #[must_use]
    pub fn child(&self, segment: &str) -> Option<&TrieNode> {
        self.children.get(segment)
    }

    /// Children sorted by segment for deterministic traversal.
    #[must_use]
    pub fn sorted_children(&self) -> Vec<(&str, &TrieNode)> {
        let mut entries: Vec<(&str, &TrieNode)> =
            self.children.iter().map(|(k, v)| (k.as_str(), v)).collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }
}
