// SPDX-License-Identifier: Apache-2.0
//! Sparse `AgentState -> AgentAction -> f64` value table.

use rustc_hash::FxHashMap;

use crate::action::AgentAction;
use crate::state::AgentState;

/// Mapping from discretized state to a value per action. Missing entries
/// default to `0.0` — a state is only materialized in the table the first
/// time one of its actions is updated.
#[derive(Debug, Clone, Default)]
pub struct QTable {
    rows: FxHashMap<AgentState, [f64; 3]>,
}

impl QTable {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The value of `action` at `state`, or `0.0` if never written.
    #[must_use]
    pub fn get(&self, state: AgentState, action: AgentAction) -> f64 {
        self.rows
            .get(&state)
            .map_or(0.0, |row| row[action.index()])
    }

    /// Overwrite the value of `action` at `state`.
    pub fn set(&mut self, state: AgentState, action: AgentAction, value: f64) {
        self.rows.entry(state).or_insert([0.0; 3])[action.index()] = value;
    }

    /// The action with the greatest value at `state`, ties broken by
    /// declaration order (`Allow < Observe < Suppress`).
    #[must_use]
    pub fn best_action(&self, state: AgentState) -> AgentAction {
        let row = self.rows.get(&state);
        AgentAction::ALL
            .into_iter()
            .max_by(|a, b| {
                let va = row.map_or(0.0, |r| r[a.index()]);
                let vb = row.map_or(0.0, |r| r[b.index()]);
                // NaN/inf never reach here: Agent::step rejects non-finite
                // values before they can be written into the table.
                va.partial_cmp(&vb)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(b.cmp(a))
            })
            .unwrap_or(AgentAction::Observe)
    }

    /// The greatest value among all actions at `state` (`max_a' Q[s'][a']`).
    #[must_use]
    pub fn max_value(&self, state: AgentState) -> f64 {
        self.rows.get(&state).map_or(0.0, |row| {
            row.iter().copied().fold(f64::NEG_INFINITY, f64::max)
        })
    }

    /// Number of distinct states materialized in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// `true` if no state has ever been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
