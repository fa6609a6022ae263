// SPDX-License-Identifier: Apache-2.0
//! Schema-evolution governor.
//!
//! Whitelists newly observed paths only after they have appeared
//! repeatedly, for long enough, and without suspicious traffic shape —
//! preventing both knee-jerk allows on a single novel request and
//! spam-repeated synonym attacks that would satisfy frequency alone.

#![deny(missing_docs, rust_2018_idioms, unused_must_use)]

mod config;
mod record;

pub use config::{AdaptiveConfig, PromoteThreshold};
pub use record::{AdaptiveRecord, AdaptiveState};

use std::num::NonZeroUsize;

use lru::LruCache;
use thiserror::Error;

/// Errors raised constructing or operating an [`AdaptiveLayer`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdaptiveError {
    /// `max_records` was zero, leaving no room to retain any observation.
    #[error("adaptive table capacity must be at least 1, got {max_records}")]
    Capacity {
        /// The rejected capacity.
        max_records: usize,
    },
}

/// The traffic-shape signal attached to one observed event. Each field is
/// expected in `[0, 1]`; callers are responsible for feature extraction
/// upstream — this layer only consumes the already-computed numbers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Features {
    /// Anomaly score, 0 = typical, 1 = maximally anomalous.
    pub anomaly: f64,
    /// Shannon-entropy-derived score of the payload, normalized to `[0,1]`.
    pub entropy: f64,
    /// Observed frequency of this path, normalized to `[0,1]`.
    pub frequency: f64,
    /// Path depth (segment count). Not used by the governor directly, but
    /// carried alongside the other features for callers that need it.
    pub depth: u32,
}

/// What the governor decided for one event, before the agent is ever
/// consulted. A definitive [`AdaptiveOutcome::Allow`] or
/// [`AdaptiveOutcome::Block`] means the agent is skipped entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdaptiveOutcome {
    /// The path is promoted (or was already promoted). The caller should
    /// ensure the store has a matching `allow` — calling `allow` again is
    /// harmless since it is idempotent.
    Allow,
    /// The path is suppressed by policy authority. No promotion is possible.
    Block,
    /// Still within grace, short of the observation count, or short of the
    /// promotion thresholds. The agent should be consulted next.
    Observe,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RecordKey {
    service_id: String,
    path: String,
}

impl RecordKey {
    fn new(service_id: &str, path: &str) -> Self {
        Self {
            service_id: service_id.to_string(),
            path: path.to_string(),
        }
    }
}

/// Tracks one [`AdaptiveRecord`] per `(service_id, path)` pair observed,
/// bounded by `config.max_records` with least-recently-seen eviction.
pub struct AdaptiveLayer {
    config: AdaptiveConfig,
    records: LruCache<RecordKey, AdaptiveRecord>,
}

impl AdaptiveLayer {
    /// Construct a layer with the given configuration.
    ///
    /// # Errors
    /// Returns [`AdaptiveError::Capacity`] if `config.max_records` is zero.
    pub fn new(config: AdaptiveConfig) -> Result<Self, AdaptiveError> {
        let cap = NonZeroUsize::new(config.max_records).ok_or(AdaptiveError::Capacity {
            max_records: config.max_records,
        })?;
        Ok(Self {
            config,
            records: LruCache::new(cap),
        })
    }

    /// Number of distinct `(service_id, path)` pairs currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// `true` if no record has been observed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Inspect the current record for `(service_id, path)` without touching
    /// its recency, or mutating anything. Returns `None` if never observed.
    #[must_use]
    pub fn peek(&self, service_id: &str, path: &str) -> Option<&AdaptiveRecord> {
        self.records.peek(&RecordKey::new(service_id, path))
    }

    /// Record one observation of `path` within `service_id` at `now_ms`,
    /// and decide the governor's outcome.
    pub fn on_event(
        &mut self,
        service_id: &str,
        path: &str,
        features: &Features,
        now_ms: u64,
    ) -> AdaptiveOutcome {
        let key = RecordKey::new(service_id, path);

        if self.records.get_mut(&key).is_none() {
            self.records.put(key.clone(), AdaptiveRecord::new(now_ms));
        }

        // get_mut above always leaves an entry behind, either pre-existing
        // or just inserted.
        let Some(record) = self.records.get_mut(&key) else {
            return AdaptiveOutcome::Observe;
        };
        record.count += 1;
        record.last_seen_ms = now_ms;

        Self::decide(record, features, &self.config, now_ms)
    }

    fn decide(
        record: &mut AdaptiveRecord,
        features: &Features,
        config: &AdaptiveConfig,
        now_ms: u64,
    ) -> AdaptiveOutcome {
        match record.state {
            AdaptiveState::Suppressed => AdaptiveOutcome::Block,
            AdaptiveState::Promoted => AdaptiveOutcome::Allow,
            AdaptiveState::Observing => {
                let age_ms = now_ms.saturating_sub(record.first_seen_ms);
                if age_ms < config.grace_period_ms || record.count < config.min_observations {
                    return AdaptiveOutcome::Observe;
                }

                let gate = &config.promote_threshold;
                if features.frequency >= gate.frequency_min
                    && features.anomaly <= gate.anomaly_max
                    && features.entropy <= gate.entropy_max
                {
                    record.state = AdaptiveState::Promoted;
                    AdaptiveOutcome::Allow
                } else {
                    AdaptiveOutcome::Observe
                }
            }
        }
    }

    /// Mark `(service_id, path)` suppressed, overriding any prior state.
    /// Creates a record if one does not already exist. Called when the
    /// agent selects SUPPRESS so future events short-circuit to BLOCK
    /// without re-consulting the agent.
    pub fn mark_suppressed(&mut self, service_id: &str, path: &str, now_ms: u64) {
        let key = RecordKey::new(service_id, path);
        if let Some(record) = self.records.get_mut(&key) {
            record.state = AdaptiveState::Suppressed;
            record.last_seen_ms = now_ms;
        } else {
            let mut record = AdaptiveRecord::new(now_ms);
            record.state = AdaptiveState::Suppressed;
            self.records.put(key, record);
        }
    }
}
