//! Human-approval task handler.

use async_trait::async_trait;
use tracing::info;

use switchyard_core::TaskDefinition;

use crate::handler::{TaskContext, TaskExecutionError, TaskHandler, TaskOutput};

/// Parks the execution for human input.
///
/// The approval UI itself lives outside the orchestrator; this handler
/// only raises the human-intervention flag so the runtime transitions
/// the execution to `Paused`. A later `resume_workflow` call continues
/// with the next task.
#[derive(Debug, Default)]
pub struct HumanApprovalHandler;

#[async_trait]
impl TaskHandler for HumanApprovalHandler {
    fn task_type(&self) -> &str {
        "human_approval"
    }

    async fn handle(
        &self,
        task: &TaskDefinition,
        ctx: &TaskContext,
    ) -> Result<TaskOutput, TaskExecutionError> {
        info!(
            execution_id = %ctx.execution_id,
            task_id = %task.id,
            "Human approval requested"
        );
        Ok(TaskOutput::human_intervention())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_requests_intervention() {
        let ctx = TaskContext {
            execution_id: "exec-1".to_string(),
            workflow_id: "wf-1".to_string(),
            variables: serde_json::Map::new(),
            cancellation: CancellationToken::new(),
        };
        let task = TaskDefinition::new("gate", "human_approval");
        let output = HumanApprovalHandler.handle(&task, &ctx).await.unwrap();
        assert!(output.human_intervention);
    }
}
