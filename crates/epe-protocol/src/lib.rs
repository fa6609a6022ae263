// SPDX-License-Identifier: Apache-2.0
//! Detect-endpoint payload types and the internal [`Event`]/[`Decision`]
//! shapes the rest of the engine is built around.
//!
//! This crate only specifies the wire shape of spec.md §6's `/detect`
//! payload — the HTTP endpoint itself, routing, and transport are out of
//! scope (spec.md §1).

#![deny(missing_docs, rust_2018_idioms, unused_must_use)]

use epe_path::{Path, PathError};
use serde::{Deserialize, Serialize};

/// Traffic-shape features attached to a detect request. Mirrors
/// [`epe_adaptive::Features`] at the wire boundary; `depth`, if omitted, is
/// derived from the parsed path's segment count rather than rejected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeaturesPayload {
    /// Anomaly score in `[0, 1]`.
    pub anomaly: f64,
    /// Entropy score in `[0, 1]`.
    pub entropy: f64,
    /// Observed frequency in `[0, 1]`.
    pub frequency: f64,
    /// Path depth. Optional on the wire; derived from the path when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<u32>,
}

/// The `/detect` endpoint's request body (spec.md §6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectRequest {
    /// Identity of the service the event was observed on.
    pub service_id: String,
    /// Dotted path the event concerns.
    pub path: String,
    /// Opaque request payload, not interpreted by the engine.
    pub payload: String,
    /// Traffic-shape features for this event.
    pub features: FeaturesPayload,
}

/// Outcome returned to the detect caller. Serializes as the upper-case
/// tag spec.md §6 specifies (`"ALLOW" | "BLOCK" | "OBSERVE"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    /// The path is allowed; traffic should pass.
    #[serde(rename = "ALLOW")]
    Allow,
    /// The path is blocked; traffic should be rejected (HTTP 403 at the
    /// sidecar per spec.md §6).
    #[serde(rename = "BLOCK")]
    Block,
    /// Neither allowed nor blocked yet; traffic passes while the engine
    /// keeps watching.
    #[serde(rename = "OBSERVE")]
    Observe,
}

/// The `/detect` endpoint's response body (spec.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectResponse {
    /// The decision made for this event.
    pub decision: Decision,
    /// The snapshot version current at decision time.
    pub snapshot_version: u64,
}

/// A validated, internal event: `(service_id, path, payload, features)`
/// (spec.md §3), ready to hand to the adaptive layer and agent.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Identity of the service the event was observed on.
    pub service_id: String,
    /// The parsed, validated path.
    pub path: Path,
    /// Opaque request payload.
    pub payload: String,
    /// Traffic-shape features, with `depth` resolved.
    pub features: epe_adaptive::Features,
}

impl DetectRequest {
    /// Parse and validate this request into an [`Event`], enforcing `limits`
    /// on the path. Depth is taken from `features.depth` when present, else
    /// derived from the parsed path's segment count.
    ///
    /// # Errors
    /// Returns [`PathError`] if `self.path` fails to parse under `limits` —
    /// per spec.md §7 a malformed path is rejected before any store or
    /// adaptive-layer mutation occurs.
    pub fn into_event(self, limits: &epe_path::PathLimits) -> Result<Event, PathError> {
        let path = Path::parse_with_limits(&self.path, limits)?;
        #[allow(clippy::cast_possible_truncation)]
        let depth = self.features.depth.unwrap_or(path.depth() as u32);
        Ok(Event {
            service_id: self.service_id,
            path,
            payload: self.payload,
            features: epe_adaptive::Features {
                anomaly: self.features.anomaly,
                entropy: self.features.entropy,
                frequency: self.features.frequency,
                depth,
            },
        })
    }
}

impl From<epe_adaptive::Features> for epe_agent::FeatureVector {
    fn from(f: epe_adaptive::Features) -> Self {
        Self {
            anomaly: f.anomaly,
            entropy: f.entropy,
            frequency: f.frequency,
            depth: f.depth,
        }
    }
}
