//! Agent mesh for the Switchyard orchestrator.
//!
//! Tracks per-agent trust, latency, load and success metrics, selects an
//! agent for each task under a configurable routing strategy, decays
//! trust on repeated failure and reroutes around congestion. All state
//! is in-memory and shared by every concurrent workflow execution.

pub mod decision;
pub mod manager;
pub mod metrics;

pub use decision::RoutingDecision;
pub use manager::{DecisionObserver, MeshError, MeshTopologyManager};
pub use metrics::{AgentMetrics, AgentMetricsUpdate};
