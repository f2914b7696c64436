//! End-to-end tests driving workflows through the runtime, the mode
//! manager and the agent mesh together.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::time::sleep;

use switchyard_core::{
    ExecutionMode, ExecutionModeConfig, FailurePolicy, MemoryEventListener, MemoryTraceSink,
    MeshTopology, RoutingStrategy, TaskDefinition, TraceDecision, WorkflowManifest,
};
use switchyard_mesh::{AgentMetrics, MeshTopologyManager};
use switchyard_runtime::{
    StartOptions, TaskContext, TaskExecutionError, TaskHandler, TaskOutput, WorkflowRuntime,
    WorkflowStatus,
};

/// Routes through the runtime's mesh facade and records the chosen
/// agent into the execution variables, the way an outbound dispatch
/// handler would.
struct RoutedTaskHandler {
    runtime: Arc<WorkflowRuntime>,
}

#[async_trait]
impl TaskHandler for RoutedTaskHandler {
    fn task_type(&self) -> &str {
        "agent_task"
    }

    async fn handle(
        &self,
        task: &TaskDefinition,
        ctx: &TaskContext,
    ) -> Result<TaskOutput, TaskExecutionError> {
        let capabilities: Vec<String> = task
            .params
            .get("capabilities")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();

        let decision = self
            .runtime
            .select_agent_for_task(&ctx.execution_id, &task.task_type, &capabilities, 0.5)
            .await
            .map_err(|e| TaskExecutionError::Failed(e.to_string()))?;

        self.runtime.mesh().report_agent_success(&decision.selected_agent_id, 150.0);

        let mut variables = serde_json::Map::new();
        variables.insert(format!("{}_agent", task.id), json!(decision.selected_agent_id));
        Ok(TaskOutput::with_variables(variables))
    }
}

async fn wait_for_status(
    runtime: &WorkflowRuntime,
    execution_id: &str,
    status: WorkflowStatus,
) -> switchyard_runtime::WorkflowExecutionContext {
    for _ in 0..200 {
        let snapshot = runtime.get_workflow_status(execution_id).await.unwrap();
        if snapshot.status == status {
            return snapshot;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("execution {execution_id} never reached {status}");
}

#[tokio::test]
async fn workflow_routes_tasks_through_the_mesh() {
    let mesh = Arc::new(MeshTopologyManager::new());
    mesh.register_agent(
        AgentMetrics::new("builder-1").with_trust(0.9).with_capabilities(["build"]),
    );
    mesh.register_agent(
        AgentMetrics::new("builder-2")
            .with_trust(0.9)
            .with_load(0.6)
            .with_capabilities(["build"]),
    );

    let runtime = Arc::new(WorkflowRuntime::new(Arc::clone(&mesh)));
    runtime.handlers().register(Arc::new(RoutedTaskHandler { runtime: Arc::clone(&runtime) }));

    let listener = Arc::new(MemoryEventListener::new(64));
    runtime.add_listener(listener.clone()).await;

    let mut manifest = WorkflowManifest::new(
        "build-pipeline",
        vec![TaskDefinition::new("compile", "agent_task")
            .with_params(json!({"capabilities": ["build"]}))],
    );
    manifest.topology = Some(MeshTopology {
        routing_strategy: RoutingStrategy::TrustWeighted,
        ..Default::default()
    });
    runtime.register_workflow(manifest).await.unwrap();

    let execution_id =
        runtime.start_workflow("build-pipeline", StartOptions::default()).await.unwrap();
    let snapshot = wait_for_status(&runtime, &execution_id, WorkflowStatus::Completed).await;

    // builder-1 wins on trust * (1 - load).
    assert_eq!(snapshot.variables["compile_agent"], "builder-1");
    assert!(listener.event_names().await.contains(&"agent_selected"));

    // The success report relaxed the winner's metrics.
    let metrics = mesh.agent_snapshot("builder-1").unwrap();
    assert_eq!(metrics.consecutive_failures, 0);
    assert!(metrics.last_selected.is_some());
    assert_eq!(mesh.routing_history().len(), 1);
}

#[tokio::test]
async fn unroutable_task_fails_the_workflow_explicitly() {
    let mesh = Arc::new(MeshTopologyManager::new());
    let runtime = Arc::new(WorkflowRuntime::new(Arc::clone(&mesh)));
    runtime.handlers().register(Arc::new(RoutedTaskHandler { runtime: Arc::clone(&runtime) }));

    runtime
        .register_workflow(WorkflowManifest::new(
            "wf",
            vec![TaskDefinition::new("orphan", "agent_task")
                .with_params(json!({"capabilities": ["gpu"]}))],
        ))
        .await
        .unwrap();

    let execution_id = runtime.start_workflow("wf", StartOptions::default()).await.unwrap();
    let snapshot = wait_for_status(&runtime, &execution_id, WorkflowStatus::Failed).await;

    let error = snapshot.error_message.unwrap();
    assert!(error.contains("orphan"));
    assert!(error.contains("no route"));
}

#[tokio::test]
async fn configured_modes_pick_the_execution_mode() {
    let runtime = WorkflowRuntime::new(Arc::new(MeshTopologyManager::new()));

    let mut manifest =
        WorkflowManifest::new("wf", vec![TaskDefinition::new("t1", "set_variables")]);
    manifest.execution_modes = vec![
        ExecutionModeConfig {
            mode: ExecutionMode::Strategic,
            trigger: "high_trust".to_string(),
            threshold: Some("trust_score >= 0.85".to_string()),
            condition: Some("confidence >= 0.9".to_string()),
        },
        ExecutionModeConfig {
            mode: ExecutionMode::Passive,
            trigger: "floor".to_string(),
            threshold: None,
            condition: None,
        },
    ];
    runtime.register_workflow(manifest).await.unwrap();

    // Fails the strategic rule, lands on the configured passive floor.
    let execution_id = runtime
        .start_workflow(
            "wf",
            StartOptions { trust_score: Some(0.6), confidence: Some(0.6), ..Default::default() },
        )
        .await
        .unwrap();
    let snapshot = wait_for_status(&runtime, &execution_id, WorkflowStatus::Completed).await;
    assert_eq!(snapshot.execution_mode, ExecutionMode::Passive);

    // Passes the strategic rule.
    let execution_id = runtime
        .start_workflow(
            "wf",
            StartOptions { trust_score: Some(0.9), confidence: Some(0.95), ..Default::default() },
        )
        .await
        .unwrap();
    let snapshot = wait_for_status(&runtime, &execution_id, WorkflowStatus::Completed).await;
    assert_eq!(snapshot.execution_mode, ExecutionMode::Strategic);
}

#[tokio::test]
async fn trace_survives_failure_for_inspection() {
    let runtime = WorkflowRuntime::new(Arc::new(MeshTopologyManager::new()));
    let sink = Arc::new(MemoryTraceSink::new());
    runtime.set_trace_sink(sink.clone()).await;

    runtime
        .register_workflow(WorkflowManifest::new(
            "wf",
            vec![
                TaskDefinition::new("seed", "set_variables").with_params(json!({"step": 1})),
                TaskDefinition::new("boom", "delay"), // missing duration_ms -> fails
            ],
        ))
        .await
        .unwrap();

    let execution_id = runtime.start_workflow("wf", StartOptions::default()).await.unwrap();
    let snapshot = wait_for_status(&runtime, &execution_id, WorkflowStatus::Failed).await;

    // Partial progress stays inspectable after the failure.
    assert_eq!(snapshot.variables["step"], 1);
    assert_eq!(snapshot.agent_trace.len(), 2);
    assert_eq!(snapshot.agent_trace[0].decision, TraceDecision::Completed);
    assert_eq!(snapshot.agent_trace[1].decision, TraceDecision::Failed);

    sleep(Duration::from_millis(50)).await;
    let stored = sink.trace(&execution_id).await.unwrap();
    assert_eq!(stored.len(), 2);
}

#[tokio::test]
async fn concurrent_executions_share_the_mesh() {
    let mesh = Arc::new(MeshTopologyManager::new());
    mesh.register_agent(
        AgentMetrics::new("shared").with_trust(0.9).with_capabilities(["build"]),
    );

    let runtime = Arc::new(WorkflowRuntime::new(Arc::clone(&mesh)));
    runtime.handlers().register(Arc::new(RoutedTaskHandler { runtime: Arc::clone(&runtime) }));

    runtime
        .register_workflow(WorkflowManifest::new(
            "wf",
            vec![TaskDefinition::new("compile", "agent_task")
                .with_params(json!({"capabilities": ["build"]}))],
        ))
        .await
        .unwrap();

    let mut execution_ids = Vec::new();
    for _ in 0..8 {
        execution_ids
            .push(runtime.start_workflow("wf", StartOptions::default()).await.unwrap());
    }
    for execution_id in &execution_ids {
        wait_for_status(&runtime, execution_id, WorkflowStatus::Completed).await;
    }

    // Every execution routed and reported against the same record, and
    // its metrics stayed in bounds.
    let metrics = mesh.agent_snapshot("shared").unwrap();
    assert!((0.0..=1.0).contains(&metrics.success_rate));
    assert!((0.0..=1.0).contains(&metrics.load));
    assert_eq!(mesh.routing_history().len(), 8);
}

#[tokio::test]
async fn escalation_policy_with_continue_neighbours() {
    let runtime = WorkflowRuntime::new(Arc::new(MeshTopologyManager::new()));

    runtime
        .register_workflow(WorkflowManifest::new(
            "wf",
            vec![
                TaskDefinition::new("soft", "delay").with_on_failure(FailurePolicy::Continue),
                TaskDefinition::new("hard", "delay").with_on_failure(FailurePolicy::Escalate),
                TaskDefinition::new("tail", "set_variables"),
            ],
        ))
        .await
        .unwrap();

    let execution_id = runtime.start_workflow("wf", StartOptions::default()).await.unwrap();
    let snapshot = wait_for_status(&runtime, &execution_id, WorkflowStatus::Escalated).await;

    // Both delays failed on missing params: the first was skipped, the
    // second escalated before the tail ran.
    assert!(snapshot.human_intervention_required);
    assert_eq!(snapshot.agent_trace.len(), 2);
    assert_eq!(snapshot.agent_trace[0].decision, TraceDecision::Failed);
    assert_eq!(snapshot.agent_trace[1].decision, TraceDecision::Failed);

    assert!(runtime.resume_workflow(&execution_id).await.unwrap());
    let snapshot = wait_for_status(&runtime, &execution_id, WorkflowStatus::Completed).await;
    assert_eq!(snapshot.agent_trace.len(), 3);
    assert_eq!(snapshot.agent_trace[2].decision, TraceDecision::Completed);
}
