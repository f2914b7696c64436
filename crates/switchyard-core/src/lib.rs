//! Core data model for the Switchyard orchestrator.
//!
//! This crate defines the shared vocabulary of the system: workflow
//! manifests and task definitions, mesh topology and execution-mode
//! configuration, the workflow event stream, execution trace entries,
//! the trace sink port and the orchestration error taxonomy. It contains
//! no orchestration logic of its own.

pub mod error;
pub mod event;
pub mod manifest;
pub mod mode;
pub mod sink;
pub mod topology;
pub mod trace;

pub use error::{OrchestratorError, Result};
pub use event::{EventListener, MemoryEventListener, WorkflowEvent};
pub use manifest::{FailurePolicy, ManifestError, TaskDefinition, WorkflowManifest};
pub use mode::{ExecutionMode, ExecutionModeConfig};
pub use sink::{MemoryTraceSink, TraceSink};
pub use topology::{CongestionBehavior, FallbackAgent, MeshTopology, RoutingStrategy};
pub use trace::{AgentTraceEntry, TraceDecision};
