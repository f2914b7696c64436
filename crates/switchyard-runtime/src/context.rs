//! Execution status state machine and per-execution context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use tracing::error;

use switchyard_core::{
    AgentTraceEntry, ExecutionMode, OrchestratorError, RoutingStrategy, TraceDecision,
};

/// Lifecycle status of one workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Execution created, loop not yet scheduled.
    Pending,
    /// The loop is walking the task list.
    Running,
    /// Suspended awaiting an external `resume_workflow` call.
    Paused,
    /// All tasks finished (or were skipped via `continue`).
    Completed,
    /// A task failed with no intercepting policy.
    Failed,
    /// Stopped by request; no further tasks scheduled.
    Cancelled,
    /// Halted pending human intervention; resumable.
    Escalated,
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowStatus::Pending => write!(f, "pending"),
            WorkflowStatus::Running => write!(f, "running"),
            WorkflowStatus::Paused => write!(f, "paused"),
            WorkflowStatus::Completed => write!(f, "completed"),
            WorkflowStatus::Failed => write!(f, "failed"),
            WorkflowStatus::Cancelled => write!(f, "cancelled"),
            WorkflowStatus::Escalated => write!(f, "escalated"),
        }
    }
}

impl WorkflowStatus {
    /// Whether this status ends the execution for good.
    ///
    /// `Escalated` is deliberately not terminal: the loop has halted but
    /// the execution resumes when a human hands control back.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled
        )
    }

    /// Checks if the execution can transition to the given status.
    #[must_use]
    #[allow(clippy::match_same_arms)] // Each arm represents a distinct transition rule
    pub fn can_transition_to(&self, to: Self) -> bool {
        match (self, to) {
            // From Pending: the loop starts, or the execution is cancelled before it runs
            (Self::Pending, Self::Running | Self::Cancelled) => true,
            // From Running: any outcome, or a pause/escalation
            (
                Self::Running,
                Self::Paused
                | Self::Completed
                | Self::Failed
                | Self::Cancelled
                | Self::Escalated,
            ) => true,
            // From Paused: resume or cancel
            (Self::Paused, Self::Running | Self::Cancelled) => true,
            // From Escalated: a human resumes or abandons the execution
            (Self::Escalated, Self::Running | Self::Cancelled) => true,
            // Terminal states never transition
            _ => false,
        }
    }
}

/// Per-execution state owned by the runtime for the execution's
/// lifetime. Callers only ever see cloned snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecutionContext {
    /// Unique execution identifier.
    pub execution_id: String,
    /// The workflow this execution runs.
    pub workflow_id: String,
    /// Current lifecycle status.
    pub status: WorkflowStatus,
    /// When the execution was created.
    pub started_at: DateTime<Utc>,
    /// When a terminal status was reached.
    pub ended_at: Option<DateTime<Utc>>,
    /// The task currently executing; set only while `Running`.
    pub current_task_id: Option<String>,
    /// Trust score the execution was started with.
    pub trust_score: f64,
    /// Agent confidence the execution was started with.
    pub agent_confidence: f64,
    /// Autonomy mode decided at start.
    pub execution_mode: ExecutionMode,
    /// Routing strategy from the workflow's topology config.
    pub routing_strategy: RoutingStrategy,
    /// Variables accumulated from task outputs.
    pub variables: Map<String, Value>,
    /// Append-only trace, one entry per task attempt.
    pub agent_trace: Vec<AgentTraceEntry>,
    /// Set when the execution awaits human input.
    pub human_intervention_required: bool,
    /// Populated when the execution fails.
    pub error_message: Option<String>,
    /// Index of the next task the loop will run; lets a paused or
    /// escalated execution resume in the right place.
    pub next_task_index: usize,
    /// Whether the trace has been handed to the sink yet.
    #[serde(skip)]
    pub(crate) trace_saved: bool,
}

impl WorkflowExecutionContext {
    /// Creates a fresh `Pending` context.
    #[must_use]
    pub fn new(
        execution_id: String,
        workflow_id: String,
        trust_score: f64,
        agent_confidence: f64,
        execution_mode: ExecutionMode,
        routing_strategy: RoutingStrategy,
        variables: Map<String, Value>,
    ) -> Self {
        Self {
            execution_id,
            workflow_id,
            status: WorkflowStatus::Pending,
            started_at: Utc::now(),
            ended_at: None,
            current_task_id: None,
            trust_score,
            agent_confidence,
            execution_mode,
            routing_strategy,
            variables,
            agent_trace: Vec::new(),
            human_intervention_required: false,
            error_message: None,
            next_task_index: 0,
            trace_saved: false,
        }
    }

    /// Transitions to a new status, enforcing the state machine.
    ///
    /// Terminal statuses stamp `ended_at`; leaving `Running` clears
    /// `current_task_id` so it is only ever set mid-task.
    ///
    /// # Errors
    /// Returns `OrchestratorError::InvalidTransition` for a move the
    /// state machine does not allow.
    pub fn transition(&mut self, to: WorkflowStatus) -> Result<(), OrchestratorError> {
        if !self.status.can_transition_to(to) {
            error!(
                execution_id = %self.execution_id,
                from = %self.status,
                to = %to,
                "Invalid status transition"
            );
            return Err(OrchestratorError::InvalidTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }

        self.status = to;
        if to != WorkflowStatus::Running {
            self.current_task_id = None;
        }
        if to.is_terminal() {
            self.ended_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Appends a trace entry and returns its index.
    pub fn push_trace(&mut self, entry: AgentTraceEntry) -> usize {
        self.agent_trace.push(entry);
        self.agent_trace.len() - 1
    }

    /// Resolves a pending trace entry with its final decision.
    pub fn resolve_trace(&mut self, index: usize, decision: TraceDecision, reason: String) {
        if let Some(entry) = self.agent_trace.get_mut(index) {
            entry.decision = decision;
            entry.reason = reason;
        }
    }
}
