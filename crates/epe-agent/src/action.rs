// SPDX-License-Identifier: Apache-2.0
//! The agent's action space.

/// An action the agent may select for a given state. Variant declaration
/// order is significant: `Ord` derives the tie-break order required for
/// argmax ties — `Allow < Observe < Suppress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AgentAction {
    /// Mutate the store with `allow(path)`.
    Allow,
    /// No store mutation; defer.
    Observe,
    /// Mutate the store with `suppress(path)`.
    Suppress,
}

impl AgentAction {
    /// All three actions, in tie-break order.
    pub(crate) const ALL: [AgentAction; 3] =
        [AgentAction::Allow, AgentAction::Observe, AgentAction::Suppress];

    pub(crate) fn index(self) -> usize {
        match self {
            AgentAction::Allow => 0,
            AgentAction::Observe => 1,
            AgentAction::Suppress => 2,
        }
    }
}

/// Ground truth used to compute the reward for a step. Not known to the
/// agent in production — supplied by whatever labels training traces, or
/// left unused when the adaptive layer already gave a definitive verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    /// The event was legitimate traffic.
    Benign,
    /// The event was an attack or policy violation.
    Malicious,
}
