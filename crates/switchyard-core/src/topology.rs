//! Mesh topology configuration consumed per workflow.
//!
//! The topology tells the mesh manager how to pick an agent for a task:
//! which scoring strategy to use, which agents to fall back to when no
//! candidate is eligible, and what to do when the chosen agent is
//! congested.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Scoring strategy for agent selection (higher score wins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStrategy {
    /// Weigh trust against current load: `trust_score * (1 - load)`.
    #[default]
    TrustWeighted,
    /// Weigh responsiveness against load: `max(0, 1 - latency/1000) * (1 - load)`.
    LatencyWeighted,
    /// Plain trust ordering, load ignored: `trust_score`.
    FallbackLinear,
}

impl fmt::Display for RoutingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingStrategy::TrustWeighted => write!(f, "trust_weighted"),
            RoutingStrategy::LatencyWeighted => write!(f, "latency_weighted"),
            RoutingStrategy::FallbackLinear => write!(f, "fallback_linear"),
        }
    }
}

impl RoutingStrategy {
    /// Converts a string to a RoutingStrategy.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trust_weighted" => Some(RoutingStrategy::TrustWeighted),
            "latency_weighted" => Some(RoutingStrategy::LatencyWeighted),
            "fallback_linear" => Some(RoutingStrategy::FallbackLinear),
            _ => None,
        }
    }
}

/// Behavior when the selected agent is congested (load >= 0.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CongestionBehavior {
    /// Leave the task with the congested agent; the caller queues.
    #[default]
    Queue,
    /// Re-run selection excluding the congested agent.
    Reroute,
    /// Proceed with reduced expectations; no reassignment.
    DegradeGracefully,
}

impl fmt::Display for CongestionBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CongestionBehavior::Queue => write!(f, "queue"),
            CongestionBehavior::Reroute => write!(f, "reroute"),
            CongestionBehavior::DegradeGracefully => write!(f, "degrade_gracefully"),
        }
    }
}

/// A fallback agent entry; lower priority values are tried first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackAgent {
    /// The agent to fall back to.
    pub agent_id: String,
    /// Ascending try order (0 first).
    #[serde(default)]
    pub priority: u32,
}

/// Per-workflow agent-mesh configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MeshTopology {
    /// Scoring strategy used by agent selection.
    #[serde(default)]
    pub routing_strategy: RoutingStrategy,
    /// Whether congestion handling may reassign the task to another agent.
    #[serde(default)]
    pub allow_rerouting: bool,
    /// Ordered fallback chain used when no agent is eligible.
    #[serde(default)]
    pub fallback_agents: Vec<FallbackAgent>,
    /// What to do when the selected agent is congested.
    #[serde(default)]
    pub congestion_behavior: CongestionBehavior,
}

impl MeshTopology {
    /// Returns the fallback agents sorted by ascending priority.
    #[must_use]
    pub fn fallback_chain(&self) -> Vec<&FallbackAgent> {
        let mut chain: Vec<&FallbackAgent> = self.fallback_agents.iter().collect();
        chain.sort_by_key(|f| f.priority);
        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_round_trip() {
        for s in ["trust_weighted", "latency_weighted", "fallback_linear"] {
            let strategy = RoutingStrategy::from_str(s).unwrap();
            assert_eq!(strategy.to_string(), s);
        }
        assert!(RoutingStrategy::from_str("round_robin").is_none());
    }

    #[test]
    fn test_topology_defaults() {
        let topology: MeshTopology = serde_json::from_str("{}").unwrap();
        assert_eq!(topology.routing_strategy, RoutingStrategy::TrustWeighted);
        assert!(!topology.allow_rerouting);
        assert!(topology.fallback_agents.is_empty());
        assert_eq!(topology.congestion_behavior, CongestionBehavior::Queue);
    }

    #[test]
    fn test_fallback_chain_ordering() {
        let topology = MeshTopology {
            fallback_agents: vec![
                FallbackAgent { agent_id: "b".to_string(), priority: 2 },
                FallbackAgent { agent_id: "a".to_string(), priority: 1 },
            ],
            ..Default::default()
        };

        let chain = topology.fallback_chain();
        assert_eq!(chain[0].agent_id, "a");
        assert_eq!(chain[1].agent_id, "b");
    }
}
