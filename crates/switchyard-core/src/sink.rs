//! Outbound ports for trace persistence.
//!
//! The orchestration core never talks to storage directly; a completed
//! execution hands its full agent trace to whatever `TraceSink` was
//! injected at construction. Sink failures are non-blocking: the runtime
//! logs a warning and the execution outcome is unaffected.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::trace::AgentTraceEntry;

/// Destination for completed execution traces.
#[async_trait]
pub trait TraceSink: Send + Sync {
    /// Persists the trace of one finished execution.
    ///
    /// Invoked exactly once per execution, when it reaches a terminal
    /// state.
    ///
    /// # Errors
    /// Errors are logged by the runtime and otherwise ignored.
    async fn save_trace(
        &self,
        workflow_id: &str,
        execution_id: &str,
        trace: &[AgentTraceEntry],
    ) -> anyhow::Result<()>;
}

/// In-memory sink for tests and the CLI.
#[derive(Default)]
pub struct MemoryTraceSink {
    traces: Arc<Mutex<HashMap<String, Vec<AgentTraceEntry>>>>,
}

impl MemoryTraceSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stored trace for an execution, if any.
    pub async fn trace(&self, execution_id: &str) -> Option<Vec<AgentTraceEntry>> {
        self.traces.lock().await.get(execution_id).cloned()
    }

    /// Number of executions with a stored trace.
    pub async fn count(&self) -> usize {
        self.traces.lock().await.len()
    }
}

#[async_trait]
impl TraceSink for MemoryTraceSink {
    async fn save_trace(
        &self,
        _workflow_id: &str,
        execution_id: &str,
        trace: &[AgentTraceEntry],
    ) -> anyhow::Result<()> {
        self.traces.lock().await.insert(execution_id.to_string(), trace.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::TraceDecision;

    #[tokio::test]
    async fn test_memory_sink_stores_trace() {
        let sink = MemoryTraceSink::new();
        let trace =
            vec![AgentTraceEntry::new("agent-1", TraceDecision::Completed, "task t1 completed")];

        sink.save_trace("wf-1", "exec-1", &trace).await.unwrap();

        assert_eq!(sink.count().await, 1);
        let stored = sink.trace("exec-1").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].agent_id, "agent-1");
    }
}
