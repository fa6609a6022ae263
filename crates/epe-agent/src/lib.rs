// SPDX-License-Identifier: Apache-2.0
//! Tabular Q-learning evolutionary agent.
//!
//! Given a discretized [`AgentState`], the agent chooses between
//! [`AgentAction::Allow`], [`AgentAction::Suppress`], and
//! [`AgentAction::Observe`] — epsilon-greedy over a sparse [`QTable`] — and
//! updates the table from the reward observed for that choice. The agent
//! never touches a store directly; mapping a chosen action onto
//! `store.allow`/`store.suppress` is the coordinator's job (spec.md §4.D).

#![deny(missing_docs, rust_2018_idioms, unused_must_use)]

mod action;
mod config;
mod qtable;
mod state;

pub use action::{AgentAction, Label};
pub use config::{AgentConfig, RewardTable};
pub use qtable::QTable;
pub use state::{AgentState, FeatureVector};

use rand::Rng;
use thiserror::Error;

/// Raised when a Q-table update would write a non-finite value. The agent
/// recovers by leaving the table untouched and reporting
/// [`AgentAction::Observe`] for the step that triggered it; callers should
/// log this and treat it as informational, not fatal (spec.md §7).
#[derive(Debug, Error, PartialEq)]
pub enum AgentError {
    /// The computed Q-value for `state`/`action` was `NaN` or infinite.
    #[error("q-update for state {state:?}, action {action:?} produced a non-finite value")]
    Degraded {
        /// The state whose update degraded.
        state: AgentState,
        /// The action whose update degraded.
        action: AgentAction,
    },
}

/// Tabular Q-learning agent over [`AgentState`] -> [`AgentAction`].
#[derive(Debug, Clone)]
pub struct Agent {
    config: AgentConfig,
    table: QTable,
    episodes: u64,
}

impl Agent {
    /// Construct an agent with an empty Q-table and zero episodes elapsed.
    #[must_use]
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config,
            table: QTable::new(),
            episodes: 0,
        }
    }

    /// The agent's hyperparameters.
    #[must_use]
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Read-only access to the current Q-table, e.g. for diagnostics.
    #[must_use]
    pub fn table(&self) -> &QTable {
        &self.table
    }

    /// Number of steps taken so far, driving epsilon decay.
    #[must_use]
    pub fn episodes(&self) -> u64 {
        self.episodes
    }

    /// Current exploration rate: linear decay from `epsilon_start` to
    /// `epsilon_end` across `epsilon_decay_episodes`, then held.
    #[must_use]
    pub fn epsilon(&self) -> f64 {
        let c = &self.config;
        if self.episodes >= c.epsilon_decay_episodes || c.epsilon_decay_episodes == 0 {
            return c.epsilon_end;
        }
        #[allow(clippy::cast_precision_loss)]
        let progress = self.episodes as f64 / c.epsilon_decay_episodes as f64;
        c.epsilon_start + (c.epsilon_end - c.epsilon_start) * progress
    }

    /// Choose an action for `state`: with probability `epsilon()`, uniformly
    /// at random; otherwise the table's argmax, ties broken
    /// `Allow < Observe < Suppress`. Does not mutate the table or advance the
    /// episode counter — call [`Agent::learn`] with the outcome to do both.
    pub fn choose_action(&self, state: AgentState, rng: &mut impl Rng) -> AgentAction {
        if rng.gen_bool(self.epsilon().clamp(0.0, 1.0)) {
            let idx = rng.gen_range(0..AgentAction::ALL.len());
            AgentAction::ALL[idx]
        } else {
            self.table.best_action(state)
        }
    }

    /// The reward granted for choosing `action` against ground-truth
    /// `label`, per the configured [`RewardTable`]. [`AgentAction::Observe`]
    /// defers the decision entirely and is neither rewarded nor penalized.
    #[must_use]
    pub fn reward_for(&self, action: AgentAction, label: Label) -> f64 {
        let r = &self.config.reward;
        match (action, label) {
            (AgentAction::Allow, Label::Benign) => r.true_negative,
            (AgentAction::Allow, Label::Malicious) => r.false_negative,
            (AgentAction::Suppress, Label::Malicious) => r.true_positive,
            (AgentAction::Suppress, Label::Benign) => r.false_positive,
            (AgentAction::Observe, _) => 0.0,
        }
    }

    /// Apply the Q-learning update for one transition
    /// `state --action--> reward, next_state`, then advance the episode
    /// counter (decaying epsilon for the next call).
    ///
    /// `Q[s][a] <- (1-alpha) Q[s][a] + alpha (r + gamma * max_a' Q[s'][a'])`.
    ///
    /// # Errors
    /// Returns [`AgentError::Degraded`] if the computed value is non-finite;
    /// the table is left unmodified and the episode counter still advances.
    pub fn learn(
        &mut self,
        state: AgentState,
        action: AgentAction,
        reward: f64,
        next_state: AgentState,
    ) -> Result<(), AgentError> {
        self.episodes += 1;

        let old = self.table.get(state, action);
        let future = self.table.max_value(next_state);
        let updated =
            (1.0 - self.config.alpha) * old + self.config.alpha * (reward + self.config.gamma * future);

        if !updated.is_finite() {
            tracing::warn!(?state, ?action, "q-update produced a non-finite value; degrading to observe");
            return Err(AgentError::Degraded { state, action });
        }

        self.table.set(state, action, updated);
        Ok(())
    }

    /// Choose an action, score it against `label`, and fold the resulting
    /// reward back into the table — the full step algorithm of spec.md
    /// §4.D in one call. On [`AgentError::Degraded`], the returned action is
    /// forced to [`AgentAction::Observe`] regardless of what was chosen,
    /// matching the documented degrade-to-observe behavior.
    pub fn step(
        &mut self,
        state: AgentState,
        next_state: AgentState,
        label: Label,
        rng: &mut impl Rng,
    ) -> AgentAction {
        let action = self.choose_action(state, rng);
        let reward = self.reward_for(action, label);
        match self.learn(state, action, reward, next_state) {
            Ok(()) => action,
            Err(_) => AgentAction::Observe,
        }
    }
}
