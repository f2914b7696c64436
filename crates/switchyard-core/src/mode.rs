//! Execution modes: the autonomy level granted to a workflow instance.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Autonomy level for a workflow execution.
///
/// Higher modes grant the execution more independent decision-making;
/// mode selection is driven by the trust score and agent confidence at
/// the time the workflow starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Observe only; every action requires confirmation.
    Passive,
    /// Act on direct instruction.
    #[default]
    Reactive,
    /// Anticipate next steps and prepare them.
    Predictive,
    /// Plan and execute multi-step goals autonomously.
    Strategic,
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Passive => write!(f, "passive"),
            ExecutionMode::Reactive => write!(f, "reactive"),
            ExecutionMode::Predictive => write!(f, "predictive"),
            ExecutionMode::Strategic => write!(f, "strategic"),
        }
    }
}

impl ExecutionMode {
    /// Converts a string to an ExecutionMode.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "passive" => Some(ExecutionMode::Passive),
            "reactive" => Some(ExecutionMode::Reactive),
            "predictive" => Some(ExecutionMode::Predictive),
            "strategic" => Some(ExecutionMode::Strategic),
            _ => None,
        }
    }

    /// Fixed evaluation order for configured mode rules: the most
    /// autonomous mode is considered first.
    #[must_use]
    pub fn priority_order() -> [ExecutionMode; 4] {
        [
            ExecutionMode::Strategic,
            ExecutionMode::Predictive,
            ExecutionMode::Reactive,
            ExecutionMode::Passive,
        ]
    }
}

/// A configured rule for entering one execution mode.
///
/// `threshold` and `condition` are restricted boolean expressions over
/// the variables `trust_score` and `confidence` (see the runtime's
/// expression evaluator); a missing expression counts as a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionModeConfig {
    /// The mode this rule selects.
    pub mode: ExecutionMode,
    /// Informational tag describing what triggers this mode.
    #[serde(default)]
    pub trigger: String,
    /// Threshold expression, e.g. `"trust_score >= 0.8"`.
    #[serde(default)]
    pub threshold: Option<String>,
    /// Additional condition expression, e.g. `"confidence > 0.9"`.
    #[serde(default)]
    pub condition: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_round_trip() {
        for s in ["passive", "reactive", "predictive", "strategic"] {
            let mode = ExecutionMode::from_str(s).unwrap();
            assert_eq!(mode.to_string(), s);
        }
        assert!(ExecutionMode::from_str("aggressive").is_none());
    }

    #[test]
    fn test_priority_order_most_autonomous_first() {
        let order = ExecutionMode::priority_order();
        assert_eq!(order[0], ExecutionMode::Strategic);
        assert_eq!(order[3], ExecutionMode::Passive);
    }

    #[test]
    fn test_mode_config_deserialization() {
        let config: ExecutionModeConfig = serde_json::from_str(
            r#"{"mode": "strategic", "trigger": "high_trust", "threshold": "trust_score >= 0.8"}"#,
        )
        .unwrap();
        assert_eq!(config.mode, ExecutionMode::Strategic);
        assert_eq!(config.threshold.as_deref(), Some("trust_score >= 0.8"));
        assert!(config.condition.is_none());
    }
}
