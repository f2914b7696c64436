//! Mesh topology manager: agent registry, weighted selection, trust
//! decay and congestion handling.
//!
//! The manager is a process-wide singleton shared by every concurrent
//! workflow execution. Each agent's metrics live behind their own lock
//! so two executions reporting outcomes for the same agent serialize on
//! that record instead of racing; the routing history is a separate
//! bounded buffer with its own lock.

use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};

use switchyard_core::{CongestionBehavior, MeshTopology};

use crate::decision::RoutingDecision;
use crate::metrics::{AgentMetrics, AgentMetricsUpdate};

/// Load at or above which an agent counts as congested.
const CONGESTION_THRESHOLD: f64 = 0.8;

/// Default cap for the routing-decision history buffer.
const DEFAULT_HISTORY_CAP: usize = 1000;

/// Maximum number of fallback candidates recorded per decision.
const MAX_FALLBACKS: usize = 3;

/// Callback invoked for every routing decision.
pub type DecisionObserver = Arc<dyn Fn(&RoutingDecision) + Send + Sync>;

/// Errors raised by agent selection.
#[derive(Debug, Error)]
pub enum MeshError {
    /// No agent is eligible and the fallback chain is exhausted.
    ///
    /// Callers decide whether to escalate or fail; no placeholder agent
    /// is ever substituted.
    #[error("no route for task type '{task_type}': {reason}")]
    Unroutable {
        /// Task type that could not be routed.
        task_type: String,
        /// Why no agent qualified.
        reason: String,
    },
}

/// Registry and router for the agent mesh.
pub struct MeshTopologyManager {
    /// Per-agent metric records; each record has its own lock.
    agents: RwLock<HashMap<String, Arc<Mutex<AgentMetrics>>>>,
    /// Bounded history of routing decisions (oldest evicted).
    history: Mutex<VecDeque<RoutingDecision>>,
    /// History capacity.
    history_cap: usize,
    /// Optional observer invoked per decision.
    observer: RwLock<Option<DecisionObserver>>,
}

impl std::fmt::Debug for MeshTopologyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeshTopologyManager")
            .field("agent_count", &self.agents.try_read().map(|a| a.len()).unwrap_or(0))
            .field("history_cap", &self.history_cap)
            .finish_non_exhaustive()
    }
}

impl MeshTopologyManager {
    /// Creates an empty manager with the default history cap.
    #[must_use]
    pub fn new() -> Self {
        Self::with_history_cap(DEFAULT_HISTORY_CAP)
    }

    /// Creates an empty manager with a custom history cap.
    #[must_use]
    pub fn with_history_cap(history_cap: usize) -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            history: Mutex::new(VecDeque::new()),
            history_cap,
            observer: RwLock::new(None),
        }
    }

    /// Sets the decision observer, replacing any previous one.
    pub fn set_decision_observer(&self, observer: DecisionObserver) {
        *self.observer.write().unwrap() = Some(observer);
    }

    /// Registers an agent, replacing an existing record with the same id.
    ///
    /// # Returns
    /// Returns `true` if the agent was newly registered, `false` if it
    /// replaced an existing record.
    pub fn register_agent(&self, mut metrics: AgentMetrics) -> bool {
        metrics.clamp_bounds();
        let id = metrics.agent_id.clone();

        debug!(agent_id = %id, "Registering agent");

        let mut agents = self.agents.write().unwrap();
        let was_new = !agents.contains_key(&id);
        agents.insert(id.clone(), Arc::new(Mutex::new(metrics)));

        if !was_new {
            warn!(agent_id = %id, "Agent metrics replaced in mesh");
        }

        was_new
    }

    /// Applies a partial metrics update.
    ///
    /// # Returns
    /// Returns `false` (no-op) if the agent is unknown.
    pub fn update_agent_metrics(&self, agent_id: &str, update: &AgentMetricsUpdate) -> bool {
        self.with_agent(agent_id, |metrics| update.apply(metrics))
    }

    /// Records a successful task outcome for an agent.
    ///
    /// Latency and success rate move on exponential averages, the
    /// failure streak resets and load relaxes by 0.1.
    ///
    /// # Returns
    /// Returns `false` if the agent is unknown.
    pub fn report_agent_success(&self, agent_id: &str, latency_ms: f64) -> bool {
        let updated = self.with_agent(agent_id, |metrics| {
            metrics.record_success(latency_ms);
            debug!(
                agent_id = %agent_id,
                latency_ms = latency_ms,
                success_rate = metrics.success_rate,
                load = metrics.load,
                "Recorded agent success"
            );
        });
        if !updated {
            warn!(agent_id = %agent_id, "Success report for unknown agent ignored");
        }
        updated
    }

    /// Records a failed task outcome for an agent.
    ///
    /// Past three consecutive failures the trust score decays by
    /// `0.1 * min(streak, 10)` per additional failure, floored at zero.
    ///
    /// # Returns
    /// Returns `false` if the agent is unknown.
    pub fn report_agent_failure(&self, agent_id: &str, error: Option<&str>) -> bool {
        let now = Utc::now();
        let updated = self.with_agent(agent_id, |metrics| {
            metrics.record_failure(now);
            info!(
                agent_id = %agent_id,
                consecutive_failures = metrics.consecutive_failures,
                trust_score = metrics.trust_score,
                error = error.unwrap_or("unspecified"),
                "Recorded agent failure"
            );
        });
        if !updated {
            warn!(agent_id = %agent_id, "Failure report for unknown agent ignored");
        }
        updated
    }

    /// Adjusts an agent's load by `delta`, clamped into `[0, 1]`.
    ///
    /// # Returns
    /// Returns `false` if the agent is unknown.
    pub fn update_agent_load(&self, agent_id: &str, delta: f64) -> bool {
        self.with_agent(agent_id, |metrics| {
            metrics.load = (metrics.load + delta).clamp(0.0, 1.0);
            debug!(agent_id = %agent_id, load = metrics.load, "Updated agent load");
        })
    }

    /// Returns a point-in-time copy of an agent's metrics.
    #[must_use]
    pub fn agent_snapshot(&self, agent_id: &str) -> Option<AgentMetrics> {
        let agents = self.agents.read().unwrap();
        agents.get(agent_id).map(|record| record.lock().unwrap().clone())
    }

    /// Number of registered agents.
    #[must_use]
    pub fn agent_count(&self) -> usize {
        self.agents.read().unwrap().len()
    }

    /// Returns a copy of the routing-decision history, oldest first.
    #[must_use]
    pub fn routing_history(&self) -> Vec<RoutingDecision> {
        self.history.lock().unwrap().iter().cloned().collect()
    }

    /// Selects an agent for a task under the workflow's topology.
    ///
    /// Eligibility requires every capability in `required_capabilities`
    /// and `trust_score >= trust_threshold`. The eligible agent with the
    /// highest strategy score wins; ties break by ascending agent id so
    /// selection is deterministic. When nothing is eligible the
    /// topology's fallback chain is walked by ascending priority; an
    /// exhausted chain yields `MeshError::Unroutable`.
    ///
    /// # Errors
    /// Returns `MeshError::Unroutable` when no agent can be routed.
    pub fn select_agent(
        &self,
        task_type: &str,
        required_capabilities: &[String],
        topology: &MeshTopology,
        trust_threshold: f64,
    ) -> Result<RoutingDecision, MeshError> {
        self.select_inner(task_type, required_capabilities, topology, trust_threshold, None)
    }

    /// Applies the topology's congestion policy to an agent.
    ///
    /// Returns `Ok(None)` when the agent is below the congestion
    /// threshold, unknown, or the policy leaves the assignment alone
    /// (`queue`, `degrade_gracefully`, or rerouting disallowed). Under
    /// `reroute` with rerouting allowed, selection re-runs with the
    /// congested agent excluded and the new decision is returned.
    ///
    /// # Errors
    /// Returns `MeshError::Unroutable` if rerouting finds no alternative.
    pub fn handle_congestion(
        &self,
        agent_id: &str,
        topology: &MeshTopology,
        task_type: &str,
        required_capabilities: &[String],
    ) -> Result<Option<RoutingDecision>, MeshError> {
        let Some(snapshot) = self.agent_snapshot(agent_id) else {
            return Ok(None);
        };

        if snapshot.load < CONGESTION_THRESHOLD {
            return Ok(None);
        }

        match topology.congestion_behavior {
            CongestionBehavior::Queue | CongestionBehavior::DegradeGracefully => {
                debug!(
                    agent_id = %agent_id,
                    load = snapshot.load,
                    behavior = %topology.congestion_behavior,
                    "Congested agent left in place per topology policy"
                );
                Ok(None)
            }
            CongestionBehavior::Reroute => {
                if !topology.allow_rerouting {
                    debug!(agent_id = %agent_id, "Rerouting disallowed by topology");
                    return Ok(None);
                }

                info!(
                    agent_id = %agent_id,
                    load = snapshot.load,
                    "Rerouting away from congested agent"
                );
                self.select_inner(
                    task_type,
                    required_capabilities,
                    topology,
                    0.0,
                    Some(agent_id),
                )
                .map(Some)
            }
        }
    }

    /// Runs a closure against one agent's locked record.
    fn with_agent<F>(&self, agent_id: &str, f: F) -> bool
    where
        F: FnOnce(&mut AgentMetrics),
    {
        let agents = self.agents.read().unwrap();
        match agents.get(agent_id) {
            Some(record) => {
                let mut metrics = record.lock().unwrap();
                f(&mut metrics);
                true
            }
            None => false,
        }
    }

    /// Shared selection path for both first routing and reroutes.
    fn select_inner(
        &self,
        task_type: &str,
        required_capabilities: &[String],
        topology: &MeshTopology,
        trust_threshold: f64,
        exclude: Option<&str>,
    ) -> Result<RoutingDecision, MeshError> {
        let strategy = topology.routing_strategy;

        // Snapshot scores for every eligible agent, then release the map.
        let mut candidates: Vec<(String, f64)> = {
            let agents = self.agents.read().unwrap();
            agents
                .iter()
                .filter(|(id, _)| exclude != Some(id.as_str()))
                .filter_map(|(id, record)| {
                    let metrics = record.lock().unwrap();
                    if !metrics.has_capabilities(required_capabilities) {
                        return None;
                    }
                    if metrics.trust_score < trust_threshold {
                        return None;
                    }
                    Some((id.clone(), metrics.score(strategy)))
                })
                .collect()
        };

        // Highest score first; ties broken by ascending agent id so the
        // same inputs always produce the same decision.
        candidates.sort_by(|a, b| {
            b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then_with(|| a.0.cmp(&b.0))
        });

        let decision = if let Some((winner, score)) = candidates.first().cloned() {
            let fallbacks: Vec<String> =
                candidates.iter().skip(1).take(MAX_FALLBACKS).map(|(id, _)| id.clone()).collect();
            let reason = match exclude {
                Some(congested) => {
                    format!("rerouted from congested agent '{congested}' using {strategy}")
                }
                None => format!("{strategy} selection"),
            };

            self.stamp_selected(&winner);
            RoutingDecision::new(winner, fallbacks, strategy, reason, score)
        } else {
            // No eligible agent: walk the configured fallback chain in
            // ascending priority order.
            let chain = topology.fallback_chain();
            let mut usable = chain.iter().filter(|f| exclude != Some(f.agent_id.as_str()));

            let Some(first) = usable.next() else {
                warn!(
                    task_type = %task_type,
                    required = ?required_capabilities,
                    trust_threshold = trust_threshold,
                    "No eligible agent and no fallback chain"
                );
                return Err(MeshError::Unroutable {
                    task_type: task_type.to_string(),
                    reason: format!(
                        "no agent with capabilities {required_capabilities:?} at trust >= {trust_threshold}, fallback chain empty"
                    ),
                });
            };

            let fallbacks: Vec<String> =
                usable.take(MAX_FALLBACKS).map(|f| f.agent_id.clone()).collect();
            let score =
                self.agent_snapshot(&first.agent_id).map_or(0.0, |m| m.score(strategy));

            self.stamp_selected(&first.agent_id);
            RoutingDecision::new(
                first.agent_id.clone(),
                fallbacks,
                strategy,
                "fallback chain (no eligible agent)",
                score,
            )
        };

        debug!(
            task_type = %task_type,
            selected = %decision.selected_agent_id,
            score = decision.score,
            strategy = %strategy,
            "Routing decision made"
        );

        self.record_decision(&decision);
        Ok(decision)
    }

    /// Stamps `last_selected` on a (possibly unregistered) agent.
    fn stamp_selected(&self, agent_id: &str) {
        self.with_agent(agent_id, |metrics| {
            metrics.last_selected = Some(Utc::now());
        });
    }

    /// Appends to the bounded history and notifies the observer.
    fn record_decision(&self, decision: &RoutingDecision) {
        {
            let mut history = self.history.lock().unwrap();
            while history.len() >= self.history_cap.max(1) {
                history.pop_front();
            }
            history.push_back(decision.clone());
        }

        let observer = self.observer.read().unwrap();
        if let Some(observer) = observer.as_ref() {
            observer(decision);
        }
    }
}

impl Default for MeshTopologyManager {
    fn default() -> Self {
        Self::new()
    }
}
