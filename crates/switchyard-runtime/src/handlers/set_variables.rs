//! Variable-injection task handler.

use async_trait::async_trait;

use switchyard_core::TaskDefinition;

use crate::handler::{TaskContext, TaskExecutionError, TaskHandler, TaskOutput};

/// Merges the task's params object into the execution variables.
#[derive(Debug, Default)]
pub struct SetVariablesHandler;

#[async_trait]
impl TaskHandler for SetVariablesHandler {
    fn task_type(&self) -> &str {
        "set_variables"
    }

    async fn handle(
        &self,
        task: &TaskDefinition,
        _ctx: &TaskContext,
    ) -> Result<TaskOutput, TaskExecutionError> {
        match &task.params {
            serde_json::Value::Object(map) => Ok(TaskOutput::with_variables(map.clone())),
            serde_json::Value::Null => Ok(TaskOutput::empty()),
            other => Err(TaskExecutionError::InvalidParams(format!(
                "set_variables requires an object, got {other}"
            ))),
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
    async fn test_merges_params() {
        let task = TaskDefinition::new("t1", "set_variables")
            .with_params(json!({"region": "eu-west-1", "retries": 3}));
        let output = SetVariablesHandler.handle(&task, &ctx()).await.unwrap();
        assert_eq!(output.variables["region"], "eu-west-1");
        assert_eq!(output.variables["retries"], 3);
    }

    #[tokio::test]
    async fn test_rejects_non_object() {
        let task = TaskDefinition::new("t1", "set_variables").with_params(json!([1, 2]));
        let err = SetVariablesHandler.handle(&task, &ctx()).await.unwrap_err();
        assert!(matches!(err, TaskExecutionError::InvalidParams(_)));
    }
}
