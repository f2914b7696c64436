//! Workflow runtime: the per-execution state machine and task loop.
//!
//! Each started workflow becomes one spawned tokio task walking the
//! manifest's task list in declaration order. The runtime consults the
//! mode manager at start, dispatches every task through the handler
//! registry, applies the task's failure policy, and emits an event at
//! every state transition and task boundary. Cancellation is advisory:
//! flipping the status stops further scheduling but an in-flight
//! handler always runs to completion.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use switchyard_core::{
    AgentTraceEntry, EventListener, FailurePolicy, OrchestratorError, Result, TraceDecision,
    TraceSink, WorkflowEvent, WorkflowManifest,
};
use switchyard_mesh::{MeshTopologyManager, RoutingDecision};

use crate::context::{WorkflowExecutionContext, WorkflowStatus};
use crate::handler::{HandlerRegistry, TaskContext};
use crate::handlers::{DelayHandler, HumanApprovalHandler, SetVariablesHandler};
use crate::mode_manager::ExecutionModeManager;

/// Trust score assumed when the caller does not supply one.
const DEFAULT_TRUST_SCORE: f64 = 0.7;

/// Agent confidence assumed when the caller does not supply one.
const DEFAULT_CONFIDENCE: f64 = 0.8;

/// Trace attribution for tasks with no agent binding.
const RUNTIME_AGENT_ID: &str = "runtime";

/// Caller-supplied options for starting a workflow.
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    /// Seed variables for the execution context.
    pub initial_variables: Map<String, Value>,
    /// Trust score for mode selection; defaults to 0.7.
    pub trust_score: Option<f64>,
    /// Agent confidence for mode selection; defaults to 0.8.
    pub confidence: Option<f64>,
}

/// One live (or finished) execution.
struct ExecutionHandle {
    /// The execution context; lock held only for short sections, never
    /// across a handler invocation.
    context: Mutex<WorkflowExecutionContext>,
    /// Advisory cancellation signal shared with handlers.
    cancellation: CancellationToken,
}

/// Shared state behind the runtime facade.
struct RuntimeInner {
    /// Registered workflow manifests by id.
    workflows: RwLock<HashMap<String, Arc<WorkflowManifest>>>,
    /// Executions by execution id.
    executions: RwLock<HashMap<String, Arc<ExecutionHandle>>>,
    /// Task handlers by task-type key.
    handlers: HandlerRegistry,
    /// Autonomy-mode decision logic.
    mode_manager: ExecutionModeManager,
    /// Shared agent mesh.
    mesh: Arc<MeshTopologyManager>,
    /// Event listeners; failures are logged and swallowed.
    listeners: RwLock<Vec<Arc<dyn EventListener>>>,
    /// Destination for completed execution traces.
    trace_sink: RwLock<Option<Arc<dyn TraceSink>>>,
}

/// Orchestrates workflow executions against the agent mesh.
pub struct WorkflowRuntime {
    inner: Arc<RuntimeInner>,
}

impl std::fmt::Debug for WorkflowRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowRuntime")
            .field("handlers", &self.inner.handlers)
            .finish_non_exhaustive()
    }
}

impl WorkflowRuntime {
    /// Creates a runtime wired to the given mesh, with the built-in
    /// handlers (`delay`, `set_variables`, `human_approval`) registered.
    #[must_use]
    pub fn new(mesh: Arc<MeshTopologyManager>) -> Self {
        let handlers = HandlerRegistry::new();
        handlers.register(Arc::new(DelayHandler));
        handlers.register(Arc::new(SetVariablesHandler));
        handlers.register(Arc::new(HumanApprovalHandler));

        Self {
            inner: Arc::new(RuntimeInner {
                workflows: RwLock::new(HashMap::new()),
                executions: RwLock::new(HashMap::new()),
                handlers,
                mode_manager: ExecutionModeManager::new(),
                mesh,
                listeners: RwLock::new(Vec::new()),
                trace_sink: RwLock::new(None),
            }),
        }
    }

    /// The handler registry, for registering application handlers.
    #[must_use]
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.inner.handlers
    }

    /// The shared agent mesh.
    #[must_use]
    pub fn mesh(&self) -> &Arc<MeshTopologyManager> {
        &self.inner.mesh
    }

    /// Adds an event listener.
    pub async fn add_listener(&self, listener: Arc<dyn EventListener>) {
        self.inner.listeners.write().await.push(listener);
    }

    /// Sets the trace sink, replacing any previous one.
    pub async fn set_trace_sink(&self, sink: Arc<dyn TraceSink>) {
        *self.inner.trace_sink.write().await = Some(sink);
    }

    /// Registers a workflow manifest after validating it.
    ///
    /// # Errors
    /// Returns `OrchestratorError::Configuration` for an invalid
    /// manifest.
    pub async fn register_workflow(&self, manifest: WorkflowManifest) -> Result<()> {
        manifest
            .validate()
            .map_err(|e| OrchestratorError::Configuration(e.to_string()))?;

        debug!(workflow_id = %manifest.id, task_count = manifest.tasks.len(), "Registered workflow");
        self.inner.workflows.write().await.insert(manifest.id.clone(), Arc::new(manifest));
        Ok(())
    }

    /// Starts an execution of a registered workflow.
    ///
    /// Resolves every task type against the handler registry up front
    /// (a missing handler fails the start, never a mid-run task),
    /// decides the execution mode from the manifest's rules, records the
    /// topology's routing strategy and schedules the task loop as an
    /// independent tokio task.
    ///
    /// # Errors
    /// Returns `UnknownWorkflow` for an unregistered id and
    /// `Configuration` for unresolved task types.
    pub async fn start_workflow(
        &self,
        workflow_id: &str,
        options: StartOptions,
    ) -> Result<String> {
        let manifest = self
            .inner
            .workflows
            .read()
            .await
            .get(workflow_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::UnknownWorkflow(workflow_id.to_string()))?;

        // Fail fast: every task type must already have a handler.
        let missing: BTreeSet<&str> = manifest
            .tasks
            .iter()
            .map(|t| t.task_type.as_str())
            .filter(|t| !self.inner.handlers.contains(t))
            .collect();
        if !missing.is_empty() {
            return Err(OrchestratorError::Configuration(format!(
                "no handler registered for task type(s): {missing:?}"
            )));
        }

        let trust_score = options.trust_score.unwrap_or(DEFAULT_TRUST_SCORE);
        let confidence = options.confidence.unwrap_or(DEFAULT_CONFIDENCE);
        let execution_mode = self.inner.mode_manager.determine_execution_mode(
            trust_score,
            confidence,
            &manifest.execution_modes,
            None,
        );
        let routing_strategy =
            manifest.topology.as_ref().map(|t| t.routing_strategy).unwrap_or_default();

        let execution_id = format!("exec-{}", Uuid::new_v4());
        let context = WorkflowExecutionContext::new(
            execution_id.clone(),
            manifest.id.clone(),
            trust_score,
            confidence,
            execution_mode,
            routing_strategy,
            options.initial_variables,
        );
        let handle = Arc::new(ExecutionHandle {
            context: Mutex::new(context),
            cancellation: CancellationToken::new(),
        });
        self.inner.executions.write().await.insert(execution_id.clone(), Arc::clone(&handle));

        info!(
            execution_id = %execution_id,
            workflow_id = %manifest.id,
            execution_mode = %execution_mode,
            routing_strategy = %routing_strategy,
            "Workflow execution starting"
        );

        emit(
            &self.inner,
            WorkflowEvent::WorkflowStarted {
                execution_id: execution_id.clone(),
                workflow_id: manifest.id.clone(),
                execution_mode: execution_mode.to_string(),
            },
        )
        .await;

        handle.context.lock().await.transition(WorkflowStatus::Running)?;

        let inner = Arc::clone(&self.inner);
        let spawn_id = execution_id.clone();
        tokio::spawn(async move {
            run_loop(inner, spawn_id).await;
        });

        Ok(execution_id)
    }

    /// Pauses a running execution.
    ///
    /// # Returns
    /// `Ok(true)` if the execution was running and is now paused,
    /// `Ok(false)` otherwise.
    ///
    /// # Errors
    /// Returns `UnknownExecution` for an unknown id.
    pub async fn pause_workflow(&self, execution_id: &str) -> Result<bool> {
        let handle = self.execution(execution_id).await?;
        let paused = {
            let mut ctx = handle.context.lock().await;
            if ctx.status == WorkflowStatus::Running {
                ctx.transition(WorkflowStatus::Paused)?;
                true
            } else {
                false
            }
        };

        if paused {
            let workflow_id = handle.context.lock().await.workflow_id.clone();
            emit(
                &self.inner,
                WorkflowEvent::WorkflowPaused {
                    execution_id: execution_id.to_string(),
                    workflow_id,
                },
            )
            .await;
        }
        Ok(paused)
    }

    /// Resumes a paused or escalated execution at its next task.
    ///
    /// # Returns
    /// `Ok(true)` if the loop was re-entered, `Ok(false)` otherwise.
    ///
    /// # Errors
    /// Returns `UnknownExecution` for an unknown id.
    pub async fn resume_workflow(&self, execution_id: &str) -> Result<bool> {
        let handle = self.execution(execution_id).await?;
        let resumed = {
            let mut ctx = handle.context.lock().await;
            if matches!(ctx.status, WorkflowStatus::Paused | WorkflowStatus::Escalated) {
                ctx.transition(WorkflowStatus::Running)?;
                ctx.human_intervention_required = false;
                true
            } else {
                false
            }
        };

        if resumed {
            let workflow_id = handle.context.lock().await.workflow_id.clone();
            emit(
                &self.inner,
                WorkflowEvent::WorkflowResumed {
                    execution_id: execution_id.to_string(),
                    workflow_id,
                },
            )
            .await;

            let inner = Arc::clone(&self.inner);
            let spawn_id = execution_id.to_string();
            tokio::spawn(async move {
                run_loop(inner, spawn_id).await;
            });
        }
        Ok(resumed)
    }

    /// Cancels an execution. Advisory only: no further tasks are
    /// scheduled, the cancellation token fires, but an in-flight handler
    /// runs to completion.
    ///
    /// # Returns
    /// `Ok(true)` if the execution was cancelled, `Ok(false)` if it had
    /// already reached a terminal state.
    ///
    /// # Errors
    /// Returns `UnknownExecution` for an unknown id.
    pub async fn cancel_workflow(&self, execution_id: &str) -> Result<bool> {
        let handle = self.execution(execution_id).await?;

        let (cancelled, loop_idle, workflow_id) = {
            let mut ctx = handle.context.lock().await;
            if ctx.status.is_terminal() {
                return Ok(false);
            }
            // A Running execution has a live loop that will observe the
            // new status and finalize; otherwise the loop is parked and
            // finalization happens here.
            let loop_idle = ctx.status != WorkflowStatus::Running;
            ctx.transition(WorkflowStatus::Cancelled)?;
            (true, loop_idle, ctx.workflow_id.clone())
        };

        handle.cancellation.cancel();
        info!(execution_id = %execution_id, "Workflow execution cancelled");

        emit(
            &self.inner,
            WorkflowEvent::WorkflowCancelled {
                execution_id: execution_id.to_string(),
                workflow_id,
            },
        )
        .await;

        if loop_idle {
            finalize_trace(&self.inner, &handle).await;
        }
        Ok(cancelled)
    }

    /// Returns a read-only snapshot of an execution's context.
    ///
    /// # Errors
    /// Returns `UnknownExecution` for an unknown id.
    pub async fn get_workflow_status(
        &self,
        execution_id: &str,
    ) -> Result<WorkflowExecutionContext> {
        let handle = self.execution(execution_id).await?;
        let ctx = handle.context.lock().await;
        Ok(ctx.clone())
    }

    /// Selects an agent for a task on behalf of an execution, using the
    /// workflow's mesh topology, and emits an `agent_selected` event.
    ///
    /// Application task handlers use this to route their outbound work.
    ///
    /// # Errors
    /// Returns `Routing` when the mesh cannot route the task.
    pub async fn select_agent_for_task(
        &self,
        execution_id: &str,
        task_type: &str,
        required_capabilities: &[String],
        trust_threshold: f64,
    ) -> Result<RoutingDecision> {
        let handle = self.execution(execution_id).await?;
        let workflow_id = handle.context.lock().await.workflow_id.clone();

        let topology = {
            let workflows = self.inner.workflows.read().await;
            workflows
                .get(&workflow_id)
                .and_then(|m| m.topology.clone())
                .unwrap_or_default()
        };

        let decision = self
            .inner
            .mesh
            .select_agent(task_type, required_capabilities, &topology, trust_threshold)
            .map_err(|e| OrchestratorError::Routing(e.to_string()))?;

        emit(
            &self.inner,
            WorkflowEvent::AgentSelected {
                execution_id: Some(execution_id.to_string()),
                task_type: task_type.to_string(),
                agent_id: decision.selected_agent_id.clone(),
                strategy: decision.strategy_used.to_string(),
            },
        )
        .await;

        Ok(decision)
    }

    /// Looks up an execution handle.
    async fn execution(&self, execution_id: &str) -> Result<Arc<ExecutionHandle>> {
        self.inner
            .executions
            .read()
            .await
            .get(execution_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::UnknownExecution(execution_id.to_string()))
    }
}

/// What the loop does after a task attempt resolves.
enum StepOutcome {
    /// Move to the next task.
    Continue,
    /// Stop: paused for human intervention.
    Paused,
    /// Stop: escalated to a human.
    Escalated { task_id: String },
    /// Stop: terminal failure.
    Failed { error: String },
    /// Stop: the status changed externally (cancel or pause).
    Halted,
}

/// The per-execution task loop. Runs as one spawned tokio task; the
/// handler invocation is the only suspension point besides delay sleeps.
async fn run_loop(inner: Arc<RuntimeInner>, execution_id: String) {
    let Some(handle) = inner.executions.read().await.get(&execution_id).cloned() else {
        warn!(execution_id = %execution_id, "Execution vanished before loop start");
        return;
    };

    let workflow_id = handle.context.lock().await.workflow_id.clone();
    let Some(manifest) = inner.workflows.read().await.get(&workflow_id).cloned() else {
        warn!(workflow_id = %workflow_id, "Manifest vanished before loop start");
        return;
    };

    loop {
        // Pick the next task while holding the context lock.
        let (task, trace_index, agent_id) = {
            let mut ctx = handle.context.lock().await;
            if ctx.status != WorkflowStatus::Running {
                break;
            }

            let Some(task) = manifest.tasks.get(ctx.next_task_index).cloned() else {
                // Task list exhausted: terminal success.
                if let Err(e) = ctx.transition(WorkflowStatus::Completed) {
                    warn!(execution_id = %execution_id, error = %e, "Completion transition failed");
                }
                break;
            };

            ctx.current_task_id = Some(task.id.clone());
            let agent_id =
                task.agent_id.clone().unwrap_or_else(|| RUNTIME_AGENT_ID.to_string());
            let trace_index = ctx.push_trace(AgentTraceEntry::new(
                agent_id.clone(),
                TraceDecision::InputReceived,
                format!("task '{}' input received", task.id),
            ));
            (task, trace_index, agent_id)
        };

        emit(
            &inner,
            WorkflowEvent::TaskStarted {
                execution_id: execution_id.clone(),
                task_id: task.id.clone(),
                agent_id: agent_id.clone(),
            },
        )
        .await;

        // Resolved fail-fast at start; re-checked here in case the
        // registry changed underneath a long-lived execution.
        let Some(handler) = inner.handlers.get(&task.task_type) else {
            let error = format!("no handler registered for task type '{}'", task.task_type);
            let mut ctx = handle.context.lock().await;
            ctx.resolve_trace(trace_index, TraceDecision::Failed, error.clone());
            ctx.error_message = Some(format!("task '{}' failed: {error}", task.id));
            if let Err(e) = ctx.transition(WorkflowStatus::Failed) {
                warn!(execution_id = %execution_id, error = %e, "Failure transition failed");
            }
            drop(ctx);
            emit(
                &inner,
                WorkflowEvent::WorkflowFailed {
                    execution_id: execution_id.clone(),
                    workflow_id: workflow_id.clone(),
                    error,
                },
            )
            .await;
            finalize_trace(&inner, &handle).await;
            return;
        };

        // Snapshot the context for the handler; the lock is never held
        // across the handler await.
        let task_ctx = {
            let ctx = handle.context.lock().await;
            TaskContext {
                execution_id: execution_id.clone(),
                workflow_id: workflow_id.clone(),
                variables: ctx.variables.clone(),
                cancellation: handle.cancellation.clone(),
            }
        };

        debug!(execution_id = %execution_id, task_id = %task.id, task_type = %task.task_type, "Dispatching task");
        let result = handler.handle(&task, &task_ctx).await;

        let outcome = match result {
            Ok(output) => {
                let outcome = {
                    let mut ctx = handle.context.lock().await;
                    for (key, value) in output.variables {
                        ctx.variables.insert(key, value);
                    }
                    ctx.resolve_trace(
                        trace_index,
                        TraceDecision::Completed,
                        format!("task '{}' completed", task.id),
                    );
                    ctx.next_task_index += 1;

                    if ctx.status != WorkflowStatus::Running {
                        StepOutcome::Halted
                    } else if output.human_intervention {
                        ctx.human_intervention_required = true;
                        if let Err(e) = ctx.transition(WorkflowStatus::Paused) {
                            warn!(execution_id = %execution_id, error = %e, "Pause transition failed");
                        }
                        StepOutcome::Paused
                    } else {
                        StepOutcome::Continue
                    }
                };

                emit(
                    &inner,
                    WorkflowEvent::TaskCompleted {
                        execution_id: execution_id.clone(),
                        task_id: task.id.clone(),
                        agent_id: agent_id.clone(),
                    },
                )
                .await;
                outcome
            }
            Err(e) => {
                let error = e.to_string();
                let outcome = {
                    let mut ctx = handle.context.lock().await;
                    ctx.resolve_trace(
                        trace_index,
                        TraceDecision::Failed,
                        format!("task '{}' failed: {error}", task.id),
                    );

                    if ctx.status != WorkflowStatus::Running {
                        StepOutcome::Halted
                    } else {
                        match task.on_failure {
                            Some(FailurePolicy::Continue) => {
                                ctx.next_task_index += 1;
                                StepOutcome::Continue
                            }
                            Some(FailurePolicy::Retry) => {
                                // Retry budget/backoff is an extension
                                // point; the tag currently continues.
                                debug!(task_id = %task.id, "Retry policy treated as continue");
                                ctx.next_task_index += 1;
                                StepOutcome::Continue
                            }
                            Some(FailurePolicy::Escalate) => {
                                ctx.human_intervention_required = true;
                                ctx.next_task_index += 1;
                                if let Err(e) = ctx.transition(WorkflowStatus::Escalated) {
                                    warn!(execution_id = %execution_id, error = %e, "Escalation transition failed");
                                }
                                StepOutcome::Escalated { task_id: task.id.clone() }
                            }
                            None => {
                                let message = format!("task '{}' failed: {error}", task.id);
                                ctx.error_message = Some(message.clone());
                                if let Err(e) = ctx.transition(WorkflowStatus::Failed) {
                                    warn!(execution_id = %execution_id, error = %e, "Failure transition failed");
                                }
                                StepOutcome::Failed { error: message }
                            }
                        }
                    }
                };

                emit(
                    &inner,
                    WorkflowEvent::TaskFailed {
                        execution_id: execution_id.clone(),
                        task_id: task.id.clone(),
                        agent_id: agent_id.clone(),
                        error,
                    },
                )
                .await;
                outcome
            }
        };

        match outcome {
            StepOutcome::Continue => {}
            StepOutcome::Halted => break,
            StepOutcome::Paused => {
                emit(
                    &inner,
                    WorkflowEvent::WorkflowPaused {
                        execution_id: execution_id.clone(),
                        workflow_id: workflow_id.clone(),
                    },
                )
                .await;
                return;
            }
            StepOutcome::Escalated { task_id } => {
                emit(
                    &inner,
                    WorkflowEvent::WorkflowEscalated {
                        execution_id: execution_id.clone(),
                        workflow_id: workflow_id.clone(),
                        task_id,
                    },
                )
                .await;
                return;
            }
            StepOutcome::Failed { error } => {
                emit(
                    &inner,
                    WorkflowEvent::WorkflowFailed {
                        execution_id: execution_id.clone(),
                        workflow_id: workflow_id.clone(),
                        error,
                    },
                )
                .await;
                finalize_trace(&inner, &handle).await;
                return;
            }
        }
    }

    // Loop exit: either terminal success, or the status was changed
    // externally while a task was in flight.
    let status = handle.context.lock().await.status;
    match status {
        WorkflowStatus::Completed => {
            info!(execution_id = %execution_id, workflow_id = %workflow_id, "Workflow completed");
            emit(
                &inner,
                WorkflowEvent::WorkflowCompleted {
                    execution_id: execution_id.clone(),
                    workflow_id: workflow_id.clone(),
                },
            )
            .await;
            finalize_trace(&inner, &handle).await;
        }
        WorkflowStatus::Cancelled => {
            // cancel_workflow already emitted the event.
            finalize_trace(&inner, &handle).await;
        }
        // Paused externally: the loop parks until resume_workflow.
        _ => {}
    }
}

/// Emits an event to every listener; listener failures are logged and
/// never affect the execution.
async fn emit(inner: &RuntimeInner, event: WorkflowEvent) {
    let listeners: Vec<Arc<dyn EventListener>> =
        inner.listeners.read().await.iter().map(Arc::clone).collect();

    for listener in listeners {
        if let Err(e) = listener.on_event(&event).await {
            warn!(event = event.name(), error = %e, "Event listener failed (non-blocking)");
        }
    }
}

/// Hands the full trace to the sink exactly once per execution.
async fn finalize_trace(inner: &RuntimeInner, handle: &ExecutionHandle) {
    let payload = {
        let mut ctx = handle.context.lock().await;
        if ctx.trace_saved {
            None
        } else {
            ctx.trace_saved = true;
            Some((ctx.workflow_id.clone(), ctx.execution_id.clone(), ctx.agent_trace.clone()))
        }
    };

    let Some((workflow_id, execution_id, trace)) = payload else {
        return;
    };

    let sink = inner.trace_sink.read().await.clone();
    if let Some(sink) = sink {
        if let Err(e) = sink.save_trace(&workflow_id, &execution_id, &trace).await {
            warn!(execution_id = %execution_id, error = %e, "Trace sink failed (non-blocking)");
        }
    }
}
