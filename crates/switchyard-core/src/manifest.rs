//! Workflow manifest data structures.
//!
//! A manifest is produced by an external authoring layer and consumed by
//! the runtime: workflow id, ordered task list, optional execution-mode
//! rules and an optional agent-mesh topology. Tasks carry a `next_tasks`
//! field for forward compatibility with branching execution, but the
//! runtime walks the task list strictly in declaration order.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;

use crate::mode::ExecutionModeConfig;
use crate::topology::MeshTopology;

/// Errors raised by manifest validation.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The workflow-level data is invalid.
    #[error("invalid workflow: {0}")]
    InvalidWorkflow(String),

    /// A task definition is invalid.
    #[error("invalid task: {0}")]
    InvalidTask(String),

    /// Two tasks share the same id.
    #[error("duplicate task id: {0}")]
    DuplicateTask(String),

    /// A `next_tasks` entry references a task that does not exist.
    #[error("task '{task}' references unknown task '{reference}'")]
    UnknownTaskReference {
        /// Task carrying the reference.
        task: String,
        /// The unresolved id.
        reference: String,
    },
}

/// What the runtime does when a task's handler fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record the failure and move on to the next task.
    Continue,
    /// Reserved for retry with budget/backoff; currently behaves like
    /// `Continue` so manifests using the tag keep working.
    Retry,
    /// Halt the loop and hand control to a human.
    Escalate,
}

/// A single task in a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    /// Unique identifier for the task within the workflow.
    pub id: String,
    /// Handler type key, e.g. `http_request`, `delay`, `human_approval`.
    pub task_type: String,
    /// Handler-specific parameters (opaque to the runtime).
    #[serde(default)]
    pub params: Value,
    /// Optional agent binding recorded in the execution trace.
    #[serde(default)]
    pub agent_id: Option<String>,
    /// Failure policy; absent means a failure is terminal.
    #[serde(default)]
    pub on_failure: Option<FailurePolicy>,
    /// Accepted for forward compatibility with branching execution.
    /// Validated for referential integrity but never consulted for
    /// control flow.
    #[serde(default)]
    pub next_tasks: Vec<String>,
}

impl TaskDefinition {
    /// Creates a new task definition with no parameters or bindings.
    #[must_use]
    pub fn new(id: impl Into<String>, task_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            task_type: task_type.into(),
            params: Value::Null,
            agent_id: None,
            on_failure: None,
            next_tasks: Vec::new(),
        }
    }

    /// Sets the handler parameters.
    #[must_use]
    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    /// Sets the failure policy.
    #[must_use]
    pub fn with_on_failure(mut self, policy: FailurePolicy) -> Self {
        self.on_failure = Some(policy);
        self
    }

    /// Binds the task to a specific agent for trace attribution.
    #[must_use]
    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Validates the task definition.
    ///
    /// # Errors
    /// * `ManifestError::InvalidTask` - If the task data is invalid
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.id.is_empty() {
            return Err(ManifestError::InvalidTask("task id cannot be empty".to_string()));
        }

        if self.task_type.is_empty() {
            return Err(ManifestError::InvalidTask(format!(
                "task '{}' has an empty task_type",
                self.id
            )));
        }

        Ok(())
    }
}

/// A complete workflow manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowManifest {
    /// Unique workflow identifier.
    pub id: String,
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    /// Ordered task list; executed strictly in this order.
    pub tasks: Vec<TaskDefinition>,
    /// Optional mode rules evaluated at workflow start.
    #[serde(default)]
    pub execution_modes: Vec<ExecutionModeConfig>,
    /// Optional agent-mesh configuration for this workflow.
    #[serde(default)]
    pub topology: Option<MeshTopology>,
}

impl WorkflowManifest {
    /// Creates a manifest with the given id and tasks.
    #[must_use]
    pub fn new(id: impl Into<String>, tasks: Vec<TaskDefinition>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            tasks,
            execution_modes: Vec::new(),
            topology: None,
        }
    }

    /// Validates the manifest: non-empty workflow id, valid and unique
    /// task ids, and resolvable `next_tasks` references.
    ///
    /// # Errors
    /// Returns the first `ManifestError` encountered.
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.id.is_empty() {
            return Err(ManifestError::InvalidWorkflow("workflow id cannot be empty".to_string()));
        }

        let mut seen = HashSet::new();
        for task in &self.tasks {
            task.validate()?;
            if !seen.insert(task.id.as_str()) {
                return Err(ManifestError::DuplicateTask(task.id.clone()));
            }
        }

        for task in &self.tasks {
            for reference in &task.next_tasks {
                if !seen.contains(reference.as_str()) {
                    return Err(ManifestError::UnknownTaskReference {
                        task: task.id.clone(),
                        reference: reference.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Looks up a task by id.
    #[must_use]
    pub fn task(&self, id: &str) -> Option<&TaskDefinition> {
        self.tasks.iter().find(|t| t.id == id)
    }
}
