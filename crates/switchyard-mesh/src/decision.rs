//! Routing decision records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use switchyard_core::RoutingStrategy;

/// The recorded outcome of one agent-selection call.
///
/// Immutable once created; appended to the manager's bounded routing
/// history and handed to the optional decision observer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    /// The agent the task was routed to.
    pub selected_agent_id: String,
    /// Up to three next-best candidates, best first.
    pub fallback_agent_ids: Vec<String>,
    /// Strategy that produced the score.
    pub strategy_used: RoutingStrategy,
    /// Human-readable selection context.
    pub reason: String,
    /// The winning score under `strategy_used`.
    pub score: f64,
    /// When the decision was made.
    pub timestamp: DateTime<Utc>,
}

impl RoutingDecision {
    /// Creates a decision stamped with the current time.
    #[must_use]
    pub fn new(
        selected_agent_id: impl Into<String>,
        fallback_agent_ids: Vec<String>,
        strategy_used: RoutingStrategy,
        reason: impl Into<String>,
        score: f64,
    ) -> Self {
        Self {
            selected_agent_id: selected_agent_id.into(),
            fallback_agent_ids,
            strategy_used,
            reason: reason.into(),
            score,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_serialization() {
        let decision = RoutingDecision::new(
            "agent-1",
            vec!["agent-2".to_string()],
            RoutingStrategy::TrustWeighted,
            "trust_weighted selection",
            0.72,
        );
        let json = serde_json::to_value(&decision).unwrap();
        assert_eq!(json["selected_agent_id"], "agent-1");
        assert_eq!(json["strategy_used"], "trust_weighted");
        assert_eq!(json["fallback_agent_ids"][0], "agent-2");
    }
}
