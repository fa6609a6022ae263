// SPDX-License-Identifier: Apache-2.0
//! Single-writer orchestrator tying the path trie store, flat compiler,
//! adaptive layer, and evolutionary agent together (spec.md §4.E).
//!
//! All mutating operations serialize through one `tokio::sync::Mutex`
//! guarding [`PolicyStore`], the adaptive record table, and the Q-table.
//! Published [`FlatSnapshot`]s live behind an [`arc_swap::ArcSwap`] so
//! readers never contend with the writer (spec.md §5).

#![deny(missing_docs, rust_2018_idioms, unused_must_use)]

use std::sync::Arc;

use arc_swap::ArcSwap;
use epe_adaptive::{AdaptiveLayer, AdaptiveOutcome};
use epe_agent::{Agent, AgentAction, AgentState};
use epe_compiler::FlatSnapshot;
use epe_config::EngineConfig;
use epe_path::{Path, PathError, PathLimits};
use epe_trie::PolicyStore;
use rand::Rng;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{instrument, warn};

/// Errors surfaced by [`Coordinator`] operations, matching the kinds
/// enumerated in spec.md §7. [`epe_agent::AgentError`] is deliberately
/// absent: per the propagation policy it never escapes as an `Err` and is
/// instead logged and degraded to [`Decision::Observe`] internally.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// The request path failed to parse or validate.
    #[error(transparent)]
    InvalidPath(#[from] PathError),
    /// A snapshot or store operation named a service that never registered
    /// any policy.
    #[error("unknown service: {0}")]
    UnknownService(String),
    /// The adaptive record table could not be constructed or grow further.
    #[error(transparent)]
    Capacity(#[from] epe_adaptive::AdaptiveError),
    /// Malformed bytes passed to [`Coordinator::reload`].
    #[error(transparent)]
    SerializationError(#[from] epe_wire::WireError),
}

struct CoordinatorState {
    stores: FxHashMap<String, PolicyStore>,
    adaptive: AdaptiveLayer,
    agent: Agent,
}

impl CoordinatorState {
    fn store_mut(&mut self, service_id: &str) -> &mut PolicyStore {
        self.stores
            .entry(service_id.to_string())
            .or_insert_with(|| PolicyStore::new(service_id))
    }
}

/// Owns the [`PolicyStore`] per service, the shared [`AdaptiveLayer`], and
/// the shared [`Agent`]/Q-table, and publishes a [`FlatSnapshot`] per
/// service after every successful mutation.
pub struct Coordinator {
    state: Mutex<CoordinatorState>,
    snapshots: ArcSwap<FxHashMap<String, Arc<FlatSnapshot>>>,
    path_limits: PathLimits,
}

impl Coordinator {
    /// Build a coordinator from the full [`EngineConfig`] surface.
    ///
    /// # Errors
    /// Returns [`CoordinatorError::Capacity`] if `config.max_records` is
    /// zero, leaving no room for the adaptive record table.
    pub fn new(config: &EngineConfig) -> Result<Self, CoordinatorError> {
        let adaptive = AdaptiveLayer::new(config.adaptive_config())?;
        let agent = Agent::new(config.agent_config());
        Ok(Self {
            state: Mutex::new(CoordinatorState {
                stores: FxHashMap::default(),
                adaptive,
                agent,
            }),
            snapshots: ArcSwap::from_pointee(FxHashMap::default()),
            path_limits: config.path_limits(),
        })
    }

    fn publish(&self, state: &mut CoordinatorState, service_id: &str) -> u64 {
        let previous_version = self
            .snapshots
            .load()
            .get(service_id)
            .map_or(0, |s| s.version());
        let snapshot = epe_compiler::compile(state.store_mut(service_id), previous_version);
        let version = snapshot.version();

        let mut next = (**self.snapshots.load()).clone();
        next.insert(service_id.to_string(), Arc::new(snapshot));
        self.snapshots.store(Arc::new(next));
        version
    }

    fn current_version(&self, service_id: &str) -> u64 {
        self.snapshots
            .load()
            .get(service_id)
            .map_or(0, |s| s.version())
    }

    /// The currently published snapshot for `service_id`.
    ///
    /// # Errors
    /// Returns [`CoordinatorError::UnknownService`] if `service_id` has
    /// never had a mutation published.
    pub fn snapshot(&self, service_id: &str) -> Result<Arc<FlatSnapshot>, CoordinatorError> {
        self.snapshots
            .load()
            .get(service_id)
            .cloned()
            .ok_or_else(|| CoordinatorError::UnknownService(service_id.to_string()))
    }

    /// Explicitly allow `path` for `service_id`, serialized with every other
    /// mutating call. Returns the newly published snapshot version.
    ///
    /// # Errors
    /// Returns [`CoordinatorError::InvalidPath`] if `path` fails to parse.
    #[instrument(skip(self))]
    pub async fn allow(&self, service_id: &str, path: &str) -> Result<u64, CoordinatorError> {
        let parsed = Path::parse_with_limits(path, &self.path_limits)?;
        let mut state = self.state.lock().await;
        state.store_mut(service_id).allow(&parsed);
        Ok(self.publish(&mut state, service_id))
    }

    /// Explicitly suppress `path` for `service_id`. Returns the newly
    /// published snapshot version.
    ///
    /// # Errors
    /// Returns [`CoordinatorError::InvalidPath`] if `path` fails to parse.
    #[instrument(skip(self))]
    pub async fn suppress(&self, service_id: &str, path: &str) -> Result<u64, CoordinatorError> {
        let parsed = Path::parse_with_limits(path, &self.path_limits)?;
        let mut state = self.state.lock().await;
        state.store_mut(service_id).suppress(&parsed);
        Ok(self.publish(&mut state, service_id))
    }

    /// Copy every suppression in `source_service` into `target_service`
    /// that `filter` accepts (spec.md §4.A `transduce_from`). Returns the
    /// target's newly published snapshot version.
    ///
    /// # Errors
    /// Returns [`CoordinatorError::UnknownService`] if `source_service` has
    /// never had any policy applied.
    #[instrument(skip(self, filter))]
    pub async fn transduce(
        &self,
        source_service: &str,
        target_service: &str,
        filter: impl Fn(&str) -> bool,
    ) -> Result<u64, CoordinatorError> {
        let mut state = self.state.lock().await;
        if !state.stores.contains_key(source_service) {
            return Err(CoordinatorError::UnknownService(source_service.to_string()));
        }
        // Borrow-split: clone the source so we can mutate target and read
        // source through the same map without a second mutable borrow.
        let source = state.stores[source_service].clone();
        state.store_mut(target_service).transduce_from(&source, filter);
        Ok(self.publish(&mut state, target_service))
    }

    /// Serialize `service_id`'s store in the `"EPE1"` wire format
    /// (spec.md §6).
    ///
    /// # Errors
    /// Returns [`CoordinatorError::UnknownService`] if `service_id` has no
    /// store.
    pub async fn export(&self, service_id: &str) -> Result<Vec<u8>, CoordinatorError> {
        let state = self.state.lock().await;
        state
            .stores
            .get(service_id)
            .map(epe_wire::export_store)
            .ok_or_else(|| CoordinatorError::UnknownService(service_id.to_string()))
    }

    /// Replace `service_id`'s store with the store decoded from `bytes`,
    /// and republish its snapshot. Per spec.md §4.E, compiler failures
    /// leave the previously published snapshot intact — since this function
    /// decodes first and only mutates state after a successful decode, a
    /// failed `reload` never disturbs the existing snapshot.
    ///
    /// # Errors
    /// Returns [`CoordinatorError::SerializationError`] if `bytes` is
    /// malformed.
    #[instrument(skip(self, bytes))]
    pub async fn reload(&self, service_id: &str, bytes: &[u8]) -> Result<u64, CoordinatorError> {
        let store = epe_wire::import_store(service_id, bytes)?;
        let mut state = self.state.lock().await;
        state.stores.insert(service_id.to_string(), store);
        Ok(self.publish(&mut state, service_id))
    }

    /// Process one detect event end to end: consult the adaptive layer,
    /// fall through to the agent when it is indecisive, apply the resulting
    /// mutation, and publish a fresh snapshot (spec.md §4.E).
    ///
    /// `label`, when present, is the ground truth used to train the agent
    /// for this event — supplied by training/simulation traces (spec.md
    /// §4.D, §8's convergence contract). Production callers without a
    /// ground truth pass `None`; the agent still selects an action, it just
    /// does not learn from this particular event. When the adaptive layer
    /// is definitive (`Allow`/`Block`), the agent is always trained on the
    /// *implied* label regardless of `label`, per spec.md §4.E's "optionally
    /// update agent with the implied label" — this keeps the agent from
    /// unlearning stable policy.
    ///
    /// # Errors
    /// Returns [`CoordinatorError::InvalidPath`] if the request's path is
    /// malformed. Per spec.md §7 this is a definitive failure with no store
    /// or adaptive mutation; callers that want spec.md §6's fail-closed
    /// `BLOCK` response for a malformed path should map this error to one
    /// themselves (e.g. via [`Coordinator::on_detect_fail_closed`]).
    #[instrument(skip(self, rng))]
    pub async fn on_detect(
        &self,
        request: DetectRequest,
        now_ms: u64,
        label: Option<Label>,
        rng: &mut impl Rng,
    ) -> Result<DetectResponse, CoordinatorError> {
        let event = request.into_event(&self.path_limits)?;
        let dotted = event.path.to_dotted();

        let mut state = self.state.lock().await;
        let buckets = state.agent.config().feature_buckets;
        let feature_state = AgentState::discretize(event.features.into(), buckets);
        let outcome =
            state
                .adaptive
                .on_event(&event.service_id, &dotted, &event.features, now_ms);

        let (decision, mutated) = match outcome {
            AdaptiveOutcome::Allow => {
                state.store_mut(&event.service_id).allow(&event.path);
                train_implied(&mut state.agent, feature_state, AgentAction::Allow, Label::Benign);
                (Decision::Allow, true)
            }
            AdaptiveOutcome::Block => {
                // The store already carries this suppression from the event
                // that first triggered it; the adaptive record alone is what
                // short-circuits every subsequent event straight to Block.
                train_implied(
                    &mut state.agent,
                    feature_state,
                    AgentAction::Suppress,
                    Label::Malicious,
                );
                (Decision::Block, false)
            }
            AdaptiveOutcome::Observe => {
                let action = if let Some(label) = label {
                    state.agent.step(feature_state, feature_state, label, rng)
                } else {
                    state.agent.choose_action(feature_state, rng)
                };
                apply_agent_action(&mut state, &event.service_id, &event.path, &dotted, action, now_ms);
                (action_to_decision(action), action != AgentAction::Observe)
            }
        };

        let version = if mutated {
            self.publish(&mut state, &event.service_id)
        } else {
            self.current_version(&event.service_id)
        };

        Ok(DetectResponse {
            decision,
            snapshot_version: version,
        })
    }

    /// [`Coordinator::on_detect`], but a malformed path degrades to a
    /// definitive `BLOCK` instead of an `Err` (spec.md §6/§7: policy
    /// enforcement fails closed). The reason is logged, not returned.
    pub async fn on_detect_fail_closed(
        &self,
        request: DetectRequest,
        now_ms: u64,
        label: Option<Label>,
        rng: &mut impl Rng,
    ) -> DetectResponse {
        let service_id = request.service_id.clone();
        match self.on_detect(request, now_ms, label, rng).await {
            Ok(resp) => resp,
            Err(err) => {
                warn!(%err, service_id, "failing closed on invalid detect request");
                DetectResponse {
                    decision: Decision::Block,
                    snapshot_version: self.current_version(&service_id),
                }
            }
        }
    }
}

fn action_to_decision(action: AgentAction) -> Decision {
    match action {
        AgentAction::Allow => Decision::Allow,
        AgentAction::Suppress => Decision::Block,
        AgentAction::Observe => Decision::Observe,
    }
}

fn apply_agent_action(
    state: &mut CoordinatorState,
    service_id: &str,
    path: &Path,
    dotted: &str,
    action: AgentAction,
    now_ms: u64,
) {
    match action {
        AgentAction::Allow => state.store_mut(service_id).allow(path),
        AgentAction::Suppress => {
            state.store_mut(service_id).suppress(path);
            state.adaptive.mark_suppressed(service_id, dotted, now_ms);
        }
        AgentAction::Observe => {}
    }
}

/// Trains the agent on the label implied by a definitive adaptive outcome,
/// using the event's own state as its successor (spec.md does not define a
/// multi-step environment transition between events; each detect is treated
/// as a one-step episode for the Bellman backup). Logged, never escapes as
/// an error — matches the documented never-propagate rule for `AgentError`.
fn train_implied(agent: &mut Agent, state: AgentState, action: AgentAction, label: Label) {
    let reward = agent.reward_for(action, label);
    if let Err(err) = agent.learn(state, action, reward, state) {
        warn!(?err, "agent degraded training on implied label; ignoring");
    }
}

// Re-exported so downstream crates (e.g. `epe-daemon`) don't need a direct
// dependency on every lower crate just to call `Coordinator` methods.
/// Traffic-shape features consumed by the adaptive layer.
pub use epe_adaptive::Features;
/// Ground-truth label used to train the agent.
pub use epe_agent::Label;
/// Outcome returned to a detect caller.
pub use epe_protocol::Decision;
/// The `/detect` endpoint's request body.
pub use epe_protocol::DetectRequest;
/// The `/detect` endpoint's response body.
pub use epe_protocol::DetectResponse;
/// Traffic-shape features attached to a detect request.
pub use epe_protocol::FeaturesPayload;
