// SPDX-License-Identifier: Apache-2.0
//! Hierarchical path trie store.
//!
//! The [`PolicyStore`] maps dotted paths to `{allowed, suppressed}` flags,
//! with suppression taking precedence and pruning its subtree during lookup
//! and flatten. This crate owns the storage and traversal algorithms; it
//! knows nothing about compilation, adaptive promotion, or the agent — those
//! live one layer up.

#![deny(missing_docs, rust_2018_idioms, unused_must_use)]

mod node;
mod store;

pub use node::TrieNode;
pub use store::PolicyStore;

/// Outcome of [`PolicyStore::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckResult {
    /// The path is explicitly allowed and no ancestor is suppressed.
    Allowed,
    /// An ancestor (or the path itself) is suppressed.
    BlockedSuppressed,
    /// The path is unknown, or known but never allowed.
    DeniedNotFound,
}

impl CheckResult {
    /// `true` only for [`CheckResult::Allowed`].
    #[must_use]
    pub fn is_allowed(self) -> bool {
        matches!(self, CheckResult::Allowed)
    }
}
