//! Timed-delay task handler.

use async_trait::async_trait;
use std::time::Duration;
use tokio::time;
use tracing::debug;

use switchyard_core::TaskDefinition;

use crate::handler::{TaskContext, TaskExecutionError, TaskHandler, TaskOutput};

/// Sleeps for `params.duration_ms` milliseconds.
///
/// The sleep races the execution's cancellation token, so a cancelled
/// workflow does not sit out the remainder of a long delay.
#[derive(Debug, Default)]
pub struct DelayHandler;

#[async_trait]
impl TaskHandler for DelayHandler {
    fn task_type(&self) -> &str {
        "delay"
    }

    async fn handle(
        &self,
        task: &TaskDefinition,
        ctx: &TaskContext,
    ) -> Result<TaskOutput, TaskExecutionError> {
        let duration_ms = task
            .params
            .get("duration_ms")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| {
                TaskExecutionError::InvalidParams(
                    "delay requires a numeric 'duration_ms'".to_string(),
                )
            })?;

        debug!(task_id = %task.id, duration_ms = duration_ms, "Delaying");

        tokio::select! {
            () = time::sleep(Duration::from_millis(duration_ms)) => Ok(TaskOutput::empty()),
            () = ctx.cancellation.cancelled() => Err(TaskExecutionError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    fn ctx() -> TaskContext {
        TaskContext {
            execution_id: "exec-1".to_string(),
            workflow_id: "wf-1".to_string(),
            variables: serde_json::Map::new(),
            cancellation: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn test_delay_completes() {
        let task = TaskDefinition::new("t1", "delay").with_params(json!({"duration_ms": 5}));
        let output = DelayHandler.handle(&task, &ctx()).await.unwrap();
        assert!(output.variables.is_empty());
        assert!(!output.human_intervention);
    }

    #[tokio::test]
    async fn test_delay_missing_params() {
        let task = TaskDefinition::new("t1", "delay");
        let err = DelayHandler.handle(&task, &ctx()).await.unwrap_err();
        assert!(matches!(err, TaskExecutionError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn test_delay_observes_cancellation() {
        let task = TaskDefinition::new("t1", "delay").with_params(json!({"duration_ms": 60_000}));
        let ctx = ctx();
        ctx.cancellation.cancel();

        let err = DelayHandler.handle(&task, &ctx).await.unwrap_err();
        assert!(matches!(err, TaskExecutionError::Cancelled));
    }
}
