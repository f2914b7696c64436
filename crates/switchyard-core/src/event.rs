//! Workflow event model for streaming progress to listeners.
//!
//! This is the canonical event stream contract for the orchestration
//! core. Telemetry backends, dashboards and tests consume these events;
//! a listener failure must never affect orchestration outcomes, so the
//! runtime logs and swallows listener errors.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

/// High-level workflow events emitted at every state transition and
/// task boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// A workflow execution was created and its loop scheduled.
    WorkflowStarted {
        execution_id: String,
        workflow_id: String,
        execution_mode: String,
    },

    /// A task attempt began.
    TaskStarted {
        execution_id: String,
        task_id: String,
        agent_id: String,
    },

    /// A task attempt finished successfully.
    TaskCompleted {
        execution_id: String,
        task_id: String,
        agent_id: String,
    },

    /// A task attempt failed (may or may not be fatal, per policy).
    TaskFailed {
        execution_id: String,
        task_id: String,
        agent_id: String,
        error: String,
    },

    /// An agent was selected for a task by the mesh.
    AgentSelected {
        execution_id: Option<String>,
        task_type: String,
        agent_id: String,
        strategy: String,
    },

    /// The execution was paused awaiting external input.
    WorkflowPaused {
        execution_id: String,
        workflow_id: String,
    },

    /// The execution re-entered the loop after a pause or escalation.
    WorkflowResumed {
        execution_id: String,
        workflow_id: String,
    },

    /// The execution was cancelled; no further tasks are scheduled.
    WorkflowCancelled {
        execution_id: String,
        workflow_id: String,
    },

    /// The execution halted pending human intervention.
    WorkflowEscalated {
        execution_id: String,
        workflow_id: String,
        task_id: String,
    },

    /// All tasks finished (or were skipped via `continue`).
    WorkflowCompleted {
        execution_id: String,
        workflow_id: String,
    },

    /// The execution reached a terminal failure.
    WorkflowFailed {
        execution_id: String,
        workflow_id: String,
        error: String,
    },
}

impl WorkflowEvent {
    /// The execution this event belongs to, when it has one.
    #[must_use]
    pub fn execution_id(&self) -> Option<&str> {
        match self {
            WorkflowEvent::WorkflowStarted { execution_id, .. }
            | WorkflowEvent::TaskStarted { execution_id, .. }
            | WorkflowEvent::TaskCompleted { execution_id, .. }
            | WorkflowEvent::TaskFailed { execution_id, .. }
            | WorkflowEvent::WorkflowPaused { execution_id, .. }
            | WorkflowEvent::WorkflowResumed { execution_id, .. }
            | WorkflowEvent::WorkflowCancelled { execution_id, .. }
            | WorkflowEvent::WorkflowEscalated { execution_id, .. }
            | WorkflowEvent::WorkflowCompleted { execution_id, .. }
            | WorkflowEvent::WorkflowFailed { execution_id, .. } => Some(execution_id),
            WorkflowEvent::AgentSelected { execution_id, .. } => execution_id.as_deref(),
        }
    }

    /// Snake-case event name, for telemetry labels.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowEvent::WorkflowStarted { .. } => "workflow_started",
            WorkflowEvent::TaskStarted { .. } => "task_started",
            WorkflowEvent::TaskCompleted { .. } => "task_completed",
            WorkflowEvent::TaskFailed { .. } => "task_failed",
            WorkflowEvent::AgentSelected { .. } => "agent_selected",
            WorkflowEvent::WorkflowPaused { .. } => "workflow_paused",
            WorkflowEvent::WorkflowResumed { .. } => "workflow_resumed",
            WorkflowEvent::WorkflowCancelled { .. } => "workflow_cancelled",
            WorkflowEvent::WorkflowEscalated { .. } => "workflow_escalated",
            WorkflowEvent::WorkflowCompleted { .. } => "workflow_completed",
            WorkflowEvent::WorkflowFailed { .. } => "workflow_failed",
        }
    }
}

/// Receiver for workflow events.
///
/// Implementations must be fast or hand off internally; the runtime
/// awaits each listener in turn on the execution's own task.
#[async_trait]
pub trait EventListener: Send + Sync {
    /// Called once per emitted event.
    ///
    /// # Errors
    /// Errors are logged by the runtime and otherwise ignored.
    async fn on_event(&self, event: &WorkflowEvent) -> anyhow::Result<()>;
}

/// Buffering listener for tests and the CLI; keeps the most recent
/// `capacity` events.
pub struct MemoryEventListener {
    events: Arc<Mutex<Vec<WorkflowEvent>>>,
    capacity: usize,
}

impl MemoryEventListener {
    /// Creates a listener retaining up to `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { events: Arc::new(Mutex::new(Vec::new())), capacity }
    }

    /// Returns a copy of the buffered events.
    pub async fn events(&self) -> Vec<WorkflowEvent> {
        self.events.lock().await.clone()
    }

    /// Returns the buffered event names, in emission order.
    pub async fn event_names(&self) -> Vec<&'static str> {
        self.events.lock().await.iter().map(WorkflowEvent::name).collect()
    }
}

#[async_trait]
impl EventListener for MemoryEventListener {
    async fn on_event(&self, event: &WorkflowEvent) -> anyhow::Result<()> {
        let mut events = self.events.lock().await;
        while events.len() >= self.capacity.max(1) {
            events.remove(0);
        }
        events.push(event.clone());
        Ok(())
    }
}
