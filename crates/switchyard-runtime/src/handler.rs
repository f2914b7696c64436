//! Task-handler contract and registry.
//!
//! Handlers are the pluggable capability layer: each is registered under
//! a string task-type key and implements one typed interface. The
//! runtime resolves every task type at workflow start, so a missing
//! handler is a configuration error raised before any task runs, never
//! discovered mid-flight.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use switchyard_core::TaskDefinition;

/// Errors a task handler may raise.
#[derive(Debug, Error)]
pub enum TaskExecutionError {
    /// The task's parameters are missing or malformed.
    #[error("invalid task parameters: {0}")]
    InvalidParams(String),

    /// The handler ran and failed.
    #[error("{0}")]
    Failed(String),

    /// The handler observed the cancellation token and exited early.
    #[error("task cancelled")]
    Cancelled,
}

/// What a handler returns on success.
#[derive(Debug, Clone, Default)]
pub struct TaskOutput {
    /// Key/value pairs merged into the execution's variables.
    pub variables: Map<String, Value>,
    /// When set, the runtime pauses the execution for human input
    /// instead of moving to the next task.
    pub human_intervention: bool,
}

impl TaskOutput {
    /// An empty, successful output.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Output carrying variables for the execution context.
    #[must_use]
    pub fn with_variables(variables: Map<String, Value>) -> Self {
        Self { variables, human_intervention: false }
    }

    /// Output requesting a pause for human intervention.
    #[must_use]
    pub fn human_intervention() -> Self {
        Self { variables: Map::new(), human_intervention: true }
    }
}

/// Read-only execution context handed to a handler.
#[derive(Debug, Clone)]
pub struct TaskContext {
    /// The execution this task belongs to.
    pub execution_id: String,
    /// The workflow being executed.
    pub workflow_id: String,
    /// Snapshot of the execution variables at dispatch time.
    pub variables: Map<String, Value>,
    /// Advisory cancellation signal; handlers may observe it to exit
    /// early but are never forcibly interrupted.
    pub cancellation: CancellationToken,
}

/// A pluggable task capability.
///
/// Implementations must not panic; failures are reported through
/// `TaskExecutionError` and mapped to the task's failure policy by the
/// runtime.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// The task-type key this handler serves, e.g. `http_request`.
    fn task_type(&self) -> &str;

    /// Executes one task attempt.
    ///
    /// # Errors
    /// Returns a `TaskExecutionError` on failure; the runtime applies
    /// the task's `on_failure` policy.
    async fn handle(
        &self,
        task: &TaskDefinition,
        ctx: &TaskContext,
    ) -> Result<TaskOutput, TaskExecutionError>;
}

/// String-keyed registry of task handlers.
pub struct HandlerRegistry {
    /// Map of task-type key to handler instance.
    handlers: RwLock<HashMap<String, Arc<dyn TaskHandler>>>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handler_count", &self.handlers.try_read().map(|h| h.len()).unwrap_or(0))
            .finish_non_exhaustive()
    }
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { handlers: RwLock::new(HashMap::new()) }
    }

    /// Registers a handler under its task-type key.
    ///
    /// # Returns
    /// Returns `true` if the key was new, `false` if an existing handler
    /// was replaced.
    pub fn register(&self, handler: Arc<dyn TaskHandler>) -> bool {
        let key = handler.task_type().to_string();
        debug!(task_type = %key, "Registering task handler");

        let mut handlers = self.handlers.write().unwrap();
        let was_new = !handlers.contains_key(&key);
        handlers.insert(key.clone(), handler);

        if !was_new {
            warn!(task_type = %key, "Task handler replaced in registry");
        }

        was_new
    }

    /// Looks up the handler for a task type.
    #[must_use]
    pub fn get(&self, task_type: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.read().unwrap().get(task_type).cloned()
    }

    /// Whether a handler is registered for the task type.
    #[must_use]
    pub fn contains(&self, task_type: &str) -> bool {
        self.handlers.read().unwrap().contains_key(task_type)
    }

    /// The registered task-type keys, sorted.
    #[must_use]
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.read().unwrap().keys().cloned().collect();
        types.sort();
        types
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn count(&self) -> usize {
        self.handlers.read().unwrap().len()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopHandler;

    #[async_trait]
    impl TaskHandler for NoopHandler {
        fn task_type(&self) -> &str {
            "noop"
        }

        async fn handle(
            &self,
            _task: &TaskDefinition,
            _ctx: &TaskContext,
        ) -> Result<TaskOutput, TaskExecutionError> {
            Ok(TaskOutput::empty())
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = HandlerRegistry::new();
        assert!(registry.register(Arc::new(NoopHandler)));
        assert!(registry.contains("noop"));
        assert!(registry.get("noop").is_some());
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_register_duplicate_replaces() {
        let registry = HandlerRegistry::new();
        assert!(registry.register(Arc::new(NoopHandler)));
        assert!(!registry.register(Arc::new(NoopHandler)));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_registered_types_sorted() {
        struct Named(&'static str);

        #[async_trait]
        impl TaskHandler for Named {
            fn task_type(&self) -> &str {
                self.0
            }

            async fn handle(
                &self,
                _task: &TaskDefinition,
                _ctx: &TaskContext,
            ) -> Result<TaskOutput, TaskExecutionError> {
                Ok(TaskOutput::empty())
            }
        }

        let registry = HandlerRegistry::new();
        registry.register(Arc::new(Named("delay")));
        registry.register(Arc::new(Named("agent_task")));
        assert_eq!(registry.registered_types(), vec!["agent_task", "delay"]);
    }
}
