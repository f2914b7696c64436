//! Append-only execution trace entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome tag for a trace entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceDecision {
    /// The task was handed to the agent/handler.
    InputReceived,
    /// The handler finished successfully.
    Completed,
    /// The handler raised an error.
    Failed,
}

/// One entry in a workflow execution's agent trace.
///
/// Entries are append-only; one is written when a task attempt begins
/// and its decision is updated exactly once when the attempt resolves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentTraceEntry {
    /// Agent the task was attributed to, or the runtime sentinel when
    /// the task has no agent binding.
    pub agent_id: String,
    /// Outcome tag for the attempt.
    pub decision: TraceDecision,
    /// Human-readable context (task id, error text, ...).
    pub reason: String,
    /// When the entry was recorded.
    pub timestamp: DateTime<Utc>,
}

impl AgentTraceEntry {
    /// Creates a trace entry stamped with the current time.
    #[must_use]
    pub fn new(agent_id: impl Into<String>, decision: TraceDecision, reason: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            decision,
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }
}
