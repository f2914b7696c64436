//! Per-agent health and performance metrics.
//!
//! Trust, latency, success rate and load feed the selection scores in
//! the mesh manager. The bounded fields (`trust_score`, `success_rate`,
//! `load`) are always kept in `[0, 1]`; mutation goes through the
//! manager's report/update operations so concurrent reporters serialize
//! on the agent's record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use switchyard_core::RoutingStrategy;

/// Clamps a metric into the `[0, 1]` band.
fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Health and performance metrics for one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMetrics {
    /// Unique agent identifier.
    pub agent_id: String,
    /// Confidence in the agent's reliability, in `[0, 1]`.
    pub trust_score: f64,
    /// Exponentially-weighted average handler latency.
    pub avg_latency_ms: f64,
    /// Exponentially-weighted success rate, in `[0, 1]`.
    pub success_rate: f64,
    /// Current utilization, in `[0, 1]`.
    pub load: f64,
    /// Failures since the last success.
    pub consecutive_failures: u32,
    /// When the mesh last routed a task to this agent.
    pub last_selected: Option<DateTime<Utc>>,
    /// When the agent last reported a failure.
    pub last_failed: Option<DateTime<Utc>>,
    /// Capability tags the agent advertises.
    pub capabilities: HashSet<String>,
    /// Deployment location tag.
    pub location: Option<String>,
}

impl AgentMetrics {
    /// Creates metrics for a fresh agent: neutral trust, perfect success
    /// rate, no load.
    #[must_use]
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            trust_score: 0.5,
            avg_latency_ms: 0.0,
            success_rate: 1.0,
            load: 0.0,
            consecutive_failures: 0,
            last_selected: None,
            last_failed: None,
            capabilities: HashSet::new(),
            location: None,
        }
    }

    /// Sets the initial trust score (clamped).
    #[must_use]
    pub fn with_trust(mut self, trust_score: f64) -> Self {
        self.trust_score = clamp_unit(trust_score);
        self
    }

    /// Sets the average latency.
    #[must_use]
    pub fn with_latency(mut self, avg_latency_ms: f64) -> Self {
        self.avg_latency_ms = avg_latency_ms.max(0.0);
        self
    }

    /// Sets the current load (clamped).
    #[must_use]
    pub fn with_load(mut self, load: f64) -> Self {
        self.load = clamp_unit(load);
        self
    }

    /// Adds capability tags.
    #[must_use]
    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities.extend(capabilities.into_iter().map(Into::into));
        self
    }

    /// Sets the location tag.
    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Whether this agent advertises every required capability.
    #[must_use]
    pub fn has_capabilities(&self, required: &[String]) -> bool {
        required.iter().all(|c| self.capabilities.contains(c))
    }

    /// Selection score under the given strategy (higher is better).
    #[must_use]
    pub fn score(&self, strategy: RoutingStrategy) -> f64 {
        match strategy {
            RoutingStrategy::TrustWeighted => self.trust_score * (1.0 - self.load),
            RoutingStrategy::LatencyWeighted => {
                (1.0 - self.avg_latency_ms / 1000.0).max(0.0) * (1.0 - self.load)
            }
            RoutingStrategy::FallbackLinear => self.trust_score,
        }
    }

    /// Re-clamps the bounded fields after an external update.
    pub(crate) fn clamp_bounds(&mut self) {
        self.trust_score = clamp_unit(self.trust_score);
        self.success_rate = clamp_unit(self.success_rate);
        self.load = clamp_unit(self.load);
        self.avg_latency_ms = self.avg_latency_ms.max(0.0);
    }

    /// Applies a successful task report: EWMA latency and success rate,
    /// failure streak reset, load relief.
    pub(crate) fn record_success(&mut self, latency_ms: f64) {
        self.avg_latency_ms = 0.8 * self.avg_latency_ms + 0.2 * latency_ms.max(0.0);
        self.success_rate = clamp_unit(0.95 * self.success_rate + 0.05);
        self.consecutive_failures = 0;
        self.load = clamp_unit(self.load - 0.1);
    }

    /// Applies a failed task report: success-rate decay, failure streak,
    /// and trust decay once the streak passes three.
    pub(crate) fn record_failure(&mut self, now: DateTime<Utc>) {
        self.success_rate = clamp_unit(0.95 * self.success_rate);
        self.consecutive_failures += 1;
        self.last_failed = Some(now);
        if self.consecutive_failures > 3 {
            let penalty = 0.1 * f64::from(self.consecutive_failures.min(10));
            self.trust_score = (self.trust_score - penalty).max(0.0);
        }
    }
}

/// Partial update applied via `MeshTopologyManager::update_agent_metrics`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentMetricsUpdate {
    /// New trust score (clamped).
    pub trust_score: Option<f64>,
    /// New average latency.
    pub avg_latency_ms: Option<f64>,
    /// New success rate (clamped).
    pub success_rate: Option<f64>,
    /// New load (clamped).
    pub load: Option<f64>,
    /// Replacement capability set.
    pub capabilities: Option<HashSet<String>>,
    /// New location tag.
    pub location: Option<String>,
}

impl AgentMetricsUpdate {
    /// Applies the populated fields to the metrics record.
    pub(crate) fn apply(&self, metrics: &mut AgentMetrics) {
        if let Some(trust_score) = self.trust_score {
            metrics.trust_score = trust_score;
        }
        if let Some(avg_latency_ms) = self.avg_latency_ms {
            metrics.avg_latency_ms = avg_latency_ms;
        }
        if let Some(success_rate) = self.success_rate {
            metrics.success_rate = success_rate;
        }
        if let Some(load) = self.load {
            metrics.load = load;
        }
        if let Some(capabilities) = &self.capabilities {
            metrics.capabilities = capabilities.clone();
        }
        if let Some(location) = &self.location {
            metrics.location = Some(location.clone());
        }
        metrics.clamp_bounds();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_agent_defaults() {
        let metrics = AgentMetrics::new("agent-1");
        assert_eq!(metrics.trust_score, 0.5);
        assert_eq!(metrics.success_rate, 1.0);
        assert_eq!(metrics.load, 0.0);
        assert_eq!(metrics.consecutive_failures, 0);
    }

    #[test]
    fn test_builder_clamps() {
        let metrics = AgentMetrics::new("agent-1").with_trust(1.5).with_load(-0.2);
        assert_eq!(metrics.trust_score, 1.0);
        assert_eq!(metrics.load, 0.0);
    }

    #[test]
    fn test_trust_weighted_score() {
        let metrics = AgentMetrics::new("agent-1").with_trust(0.8).with_load(0.5);
        let score = metrics.score(RoutingStrategy::TrustWeighted);
        assert!((score - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_latency_weighted_score_floors_at_zero() {
        let metrics = AgentMetrics::new("agent-1").with_latency(2000.0).with_load(0.0);
        let score = metrics.score(RoutingStrategy::LatencyWeighted);
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_fallback_linear_ignores_load() {
        let metrics = AgentMetrics::new("agent-1").with_trust(0.7).with_load(0.9);
        assert!((metrics.score(RoutingStrategy::FallbackLinear) - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_record_success_formulas() {
        let mut metrics = AgentMetrics::new("agent-1").with_latency(100.0).with_load(0.5);
        metrics.success_rate = 0.5;
        metrics.consecutive_failures = 2;

        metrics.record_success(200.0);

        assert!((metrics.avg_latency_ms - 120.0).abs() < 1e-9);
        assert!((metrics.success_rate - 0.525).abs() < 1e-9);
        assert_eq!(metrics.consecutive_failures, 0);
        assert!((metrics.load - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_trust_decays_after_streak() {
        let mut metrics = AgentMetrics::new("agent-1").with_trust(0.9);
        let now = Utc::now();

        for _ in 0..3 {
            metrics.record_failure(now);
        }
        // Streak of three: no decay yet.
        assert_eq!(metrics.trust_score, 0.9);

        metrics.record_failure(now);
        // Fourth consecutive failure: 0.1 * 4 penalty.
        assert!((metrics.trust_score - 0.5).abs() < 1e-9);
        assert!(metrics.last_failed.is_some());
    }

    #[test]
    fn test_trust_never_negative() {
        let mut metrics = AgentMetrics::new("agent-1").with_trust(0.2);
        let now = Utc::now();
        for _ in 0..20 {
            metrics.record_failure(now);
        }
        assert_eq!(metrics.trust_score, 0.0);
        assert!(metrics.success_rate >= 0.0 && metrics.success_rate <= 1.0);
    }
}
