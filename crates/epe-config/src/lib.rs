// SPDX-License-Identifier: Apache-2.0
//! Configuration surface (spec.md §6) plus a pluggable storage port.
//!
//! [`EngineConfig`] collects every knob spec.md §6 enumerates, as a
//! JSON-serializable mirror of the lower crates' native config types (which
//! stay serde-free so the core algorithm crates don't carry a wire-format
//! dependency). [`ConfigStore`]/[`ConfigService`] are the same thin
//! load/save port the reference codebase uses for its own preferences —
//! see `epe-config-fs` for the filesystem-backed implementation.

#![deny(missing_docs, rust_2018_idioms, unused_must_use)]

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

/// Storage port for raw config blobs, keyed by logical name.
pub trait ConfigStore {
    /// Load a raw config blob. Returns [`ConfigError::NotFound`] when absent.
    fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError>;
    /// Persist a raw config blob.
    fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError>;
}

/// Errors raised loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No value stored for the requested key.
    #[error("not found")]
    NotFound,
    /// I/O failure reading or writing the backing store.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The stored bytes did not deserialize as the requested type.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    /// Catch-all for backend-specific failures (e.g. unresolvable config dir).
    #[error("other: {0}")]
    Other(String),
}

/// Thin service that serializes typed config values through a [`ConfigStore`].
pub struct ConfigService<S> {
    store: S,
}

impl<S> ConfigService<S> {
    /// Wrap `store` in a typed config service.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Consume the service, returning the inner store.
    pub fn into_inner(self) -> S {
        self.store
    }
}

impl<S: ConfigStore> ConfigService<S> {
    /// Load and deserialize the value stored for `key`. `Ok(None)` means the
    /// key has never been saved.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ConfigError> {
        match self.store.load_raw(key) {
            Ok(bytes) => {
                if bytes.is_empty() {
                    return Ok(None);
                }
                Ok(Some(serde_json::from_slice(&bytes)?))
            }
            Err(ConfigError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Serialize and persist `value` under `key`.
    pub fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<(), ConfigError> {
        let data = serde_json::to_vec_pretty(value)?;
        self.store.save_raw(key, &data)
    }
}

/// JSON mirror of [`epe_adaptive::PromoteThreshold`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromoteThresholdConfig {
    /// Minimum observed frequency, inclusive.
    pub frequency_min: f64,
    /// Maximum observed anomaly score, inclusive.
    pub anomaly_max: f64,
    /// Maximum observed entropy, inclusive.
    pub entropy_max: f64,
}

impl Default for PromoteThresholdConfig {
    fn default() -> Self {
        epe_adaptive::PromoteThreshold::default().into()
    }
}

impl From<epe_adaptive::PromoteThreshold> for PromoteThresholdConfig {
    fn from(t: epe_adaptive::PromoteThreshold) -> Self {
        Self {
            frequency_min: t.frequency_min,
            anomaly_max: t.anomaly_max,
            entropy_max: t.entropy_max,
        }
    }
}

impl From<PromoteThresholdConfig> for epe_adaptive::PromoteThreshold {
    fn from(t: PromoteThresholdConfig) -> Self {
        Self {
            frequency_min: t.frequency_min,
            anomaly_max: t.anomaly_max,
            entropy_max: t.entropy_max,
        }
    }
}

/// JSON mirror of [`epe_agent::RewardTable`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    /// Reward for allowing a benign path.
    pub true_negative: f64,
    /// Reward for suppressing a malicious path.
    pub true_positive: f64,
    /// Penalty for suppressing a benign path.
    pub false_positive: f64,
    /// Penalty for allowing a malicious path.
    pub false_negative: f64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        epe_agent::RewardTable::default().into()
    }
}

impl From<epe_agent::RewardTable> for RewardConfig {
    fn from(r: epe_agent::RewardTable) -> Self {
        Self {
            true_negative: r.true_negative,
            true_positive: r.true_positive,
            false_positive: r.false_positive,
            false_negative: r.false_negative,
        }
    }
}

impl From<RewardConfig> for epe_agent::RewardTable {
    fn from(r: RewardConfig) -> Self {
        Self {
            true_negative: r.true_negative,
            true_positive: r.true_positive,
            false_positive: r.false_positive,
            false_negative: r.false_negative,
        }
    }
}

/// JSON mirror of [`epe_agent::AgentConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Learning rate.
    pub alpha: f64,
    /// Discount factor.
    pub gamma: f64,
    /// Exploration rate at episode 0.
    pub epsilon_start: f64,
    /// Exploration rate held from `epsilon_decay_episodes` onward.
    pub epsilon_end: f64,
    /// Episode count over which epsilon decays linearly.
    pub epsilon_decay_episodes: u64,
    /// Number of uniform buckets each feature is discretized into.
    pub feature_buckets: u32,
    /// Reward table driving Q-updates.
    pub reward: RewardConfig,
}

impl Default for AgentSettings {
    fn default() -> Self {
        epe_agent::AgentConfig::default().into()
    }
}

impl From<epe_agent::AgentConfig> for AgentSettings {
    fn from(c: epe_agent::AgentConfig) -> Self {
        Self {
            alpha: c.alpha,
            gamma: c.gamma,
            epsilon_start: c.epsilon_start,
            epsilon_end: c.epsilon_end,
            epsilon_decay_episodes: c.epsilon_decay_episodes,
            feature_buckets: c.feature_buckets,
            reward: c.reward.into(),
        }
    }
}

impl From<AgentSettings> for epe_agent::AgentConfig {
    fn from(c: AgentSettings) -> Self {
        Self {
            alpha: c.alpha,
            gamma: c.gamma,
            epsilon_start: c.epsilon_start,
            epsilon_end: c.epsilon_end,
            epsilon_decay_episodes: c.epsilon_decay_episodes,
            feature_buckets: c.feature_buckets,
            reward: c.reward.into(),
        }
    }
}

/// JSON mirror of [`epe_path::PathLimits`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    /// Maximum byte length of a single segment.
    pub max_segment_bytes: usize,
    /// Maximum number of segments in a path.
    pub max_depth: usize,
}

impl Default for PathSettings {
    fn default() -> Self {
        epe_path::PathLimits::default().into()
    }
}

impl From<epe_path::PathLimits> for PathSettings {
    fn from(l: epe_path::PathLimits) -> Self {
        Self {
            max_segment_bytes: l.max_segment_bytes,
            max_depth: l.max_depth,
        }
    }
}

impl From<PathSettings> for epe_path::PathLimits {
    fn from(l: PathSettings) -> Self {
        Self {
            max_segment_bytes: l.max_segment_bytes,
            max_depth: l.max_depth,
        }
    }
}

/// Every knob enumerated in spec.md §6, collected into one serializable
/// configuration surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Adaptive grace window, in milliseconds.
    pub grace_period_ms: u64,
    /// Minimum observations per path before promotion.
    pub min_observations: u64,
    /// Adaptive table capacity, beyond which LRU eviction kicks in.
    pub max_records: usize,
    /// Promotion feature gate.
    pub promote_threshold: PromoteThresholdConfig,
    /// Q-learning hyperparameters and reward table.
    pub agent: AgentSettings,
    /// Path parsing limits.
    pub path: PathSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: 60_000,
            min_observations: 10,
            max_records: 100_000,
            promote_threshold: PromoteThresholdConfig::default(),
            agent: AgentSettings::default(),
            path: PathSettings::default(),
        }
    }
}

impl EngineConfig {
    /// Project this configuration into an [`epe_adaptive::AdaptiveConfig`].
    #[must_use]
    pub fn adaptive_config(&self) -> epe_adaptive::AdaptiveConfig {
        epe_adaptive::AdaptiveConfig {
            grace_period_ms: self.grace_period_ms,
            min_observations: self.min_observations,
            max_records: self.max_records,
            promote_threshold: self.promote_threshold.into(),
        }
    }

    /// Project this configuration into an [`epe_agent::AgentConfig`].
    #[must_use]
    pub fn agent_config(&self) -> epe_agent::AgentConfig {
        self.agent.into()
    }

    /// Project this configuration into [`epe_path::PathLimits`].
    #[must_use]
    pub fn path_limits(&self) -> epe_path::PathLimits {
        self.path.into()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MemStore {
        data: RefCell<HashMap<String, Vec<u8>>>,
    }

    impl ConfigStore for MemStore {
        fn load_raw(&self, key: &str) -> Result<Vec<u8>, ConfigError> {
            self.data
                .borrow()
                .get(key)
                .cloned()
                .ok_or(ConfigError::NotFound)
        }

        fn save_raw(&self, key: &str, data: &[u8]) -> Result<(), ConfigError> {
            self.data
                .borrow_mut()
                .insert(key.to_string(), data.to_vec());
            Ok(())
        }
    }

    #[test]
    fn default_matches_spec_defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.grace_period_ms, 60_000);
        assert_eq!(cfg.min_observations, 10);
        assert_eq!(cfg.max_records, 100_000);
        assert_eq!(cfg.promote_threshold.frequency_min, 0.02);
        assert_eq!(cfg.agent.alpha, 0.1);
        assert_eq!(cfg.path.max_depth, 32);
    }

    #[test]
    fn load_missing_key_returns_none() {
        let service = ConfigService::new(MemStore::default());
        let result: Option<EngineConfig> = service.load("engine").unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn save_then_load_round_trips() {
        let service = ConfigService::new(MemStore::default());
        let mut cfg = EngineConfig::default();
        cfg.grace_period_ms = 5_000;
        service.save("engine", &cfg).unwrap();

        let loaded: EngineConfig = service.load("engine").unwrap().unwrap();
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn projections_round_trip_into_lower_crate_types() {
        let cfg = EngineConfig::default();
        let adaptive = cfg.adaptive_config();
        assert_eq!(adaptive.grace_period_ms, cfg.grace_period_ms);
        let agent = cfg.agent_config();
        assert_eq!(agent.alpha, cfg.agent.alpha);
        let limits = cfg.path_limits();
        assert_eq!(limits.max_depth, cfg.path.max_depth);
    }
}
