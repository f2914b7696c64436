// Error types for orchestration

use thiserror::Error;

/// Result type for orchestration operations
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Orchestration errors
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Configuration problem detected before any task runs (unknown task
    /// type, malformed topology, invalid manifest).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No agent could be routed for a task.
    #[error("Routing error: {0}")]
    Routing(String),

    /// A task handler failed during execution.
    #[error("Task '{task_id}' failed: {message}")]
    TaskExecution {
        /// Id of the failing task.
        task_id: String,
        /// Error text produced by the handler.
        message: String,
    },

    /// The workflow id is not registered with the runtime.
    #[error("Unknown workflow: {0}")]
    UnknownWorkflow(String),

    /// The execution id does not name a live or finished execution.
    #[error("Unknown execution: {0}")]
    UnknownExecution(String),

    /// A lifecycle operation requested an invalid status transition.
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        /// Status the execution is currently in.
        from: String,
        /// Status that was requested.
        to: String,
    },

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
