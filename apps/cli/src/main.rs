//! Switchyard CLI - run workflow manifests against an in-process
//! orchestrator.
//!
//! `syd run manifest.json` loads a workflow manifest, registers the
//! built-in handlers plus a `log` demo handler, drives the execution to
//! a terminal state and prints the outcome. `syd validate` checks a
//! manifest without running it.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tokio::time::sleep;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use switchyard_core::{TaskDefinition, WorkflowManifest};
use switchyard_mesh::MeshTopologyManager;
use switchyard_runtime::{
    StartOptions, TaskContext, TaskExecutionError, TaskHandler, TaskOutput, WorkflowRuntime,
    WorkflowStatus,
};

/// Switchyard - workflow orchestration over an agent mesh
#[derive(Parser, Debug)]
#[command(
    name = "syd",
    author,
    version,
    about = "Switchyard - route multi-step workflows across an agent mesh"
)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a workflow manifest file without running it
    Validate {
        /// Path to the manifest JSON file
        manifest: PathBuf,
    },

    /// Run a workflow manifest to a terminal state
    Run {
        /// Path to the manifest JSON file
        manifest: PathBuf,

        /// Trust score used for execution-mode selection
        #[arg(long)]
        trust: Option<f64>,

        /// Agent confidence used for execution-mode selection
        #[arg(long)]
        confidence: Option<f64>,

        /// Print the full agent trace after the run
        #[arg(long)]
        trace: bool,
    },
}

/// Demo handler: logs the task's `message` param and passes it through
/// as a variable.
struct LogHandler;

#[async_trait]
impl TaskHandler for LogHandler {
    fn task_type(&self) -> &str {
        "log"
    }

    async fn handle(
        &self,
        task: &TaskDefinition,
        ctx: &TaskContext,
    ) -> Result<TaskOutput, TaskExecutionError> {
        let message = task
            .params
            .get("message")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("(no message)");
        info!(execution_id = %ctx.execution_id, task_id = %task.id, "{message}");
        println!("[{}] {message}", task.id);

        let mut variables = serde_json::Map::new();
        variables.insert(format!("{}_logged", task.id), serde_json::Value::Bool(true));
        Ok(TaskOutput::with_variables(variables))
    }
}

fn load_manifest(path: &Path) -> anyhow::Result<WorkflowManifest> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read manifest {}", path.display()))?;
    let manifest: WorkflowManifest = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse manifest {}", path.display()))?;
    manifest
        .validate()
        .with_context(|| format!("invalid manifest {}", path.display()))?;
    Ok(manifest)
}

async fn run(
    path: &Path,
    trust: Option<f64>,
    confidence: Option<f64>,
    print_trace: bool,
) -> anyhow::Result<()> {
    let manifest = load_manifest(path)?;
    let workflow_id = manifest.id.clone();

    let mesh = Arc::new(MeshTopologyManager::new());
    let runtime = WorkflowRuntime::new(mesh);
    runtime.handlers().register(Arc::new(LogHandler));

    runtime.register_workflow(manifest).await?;
    let options = StartOptions { trust_score: trust, confidence, ..Default::default() };
    let execution_id = runtime.start_workflow(&workflow_id, options).await?;

    // Drive to a settled state: terminal, or parked awaiting a human.
    let snapshot = loop {
        let snapshot = runtime.get_workflow_status(&execution_id).await?;
        if snapshot.status.is_terminal()
            || matches!(snapshot.status, WorkflowStatus::Paused | WorkflowStatus::Escalated)
        {
            break snapshot;
        }
        sleep(Duration::from_millis(20)).await;
    };

    println!("workflow:  {workflow_id}");
    println!("execution: {execution_id}");
    println!("mode:      {}", snapshot.execution_mode);
    println!("status:    {}", snapshot.status);
    if !snapshot.variables.is_empty() {
        println!(
            "variables: {}",
            serde_json::to_string_pretty(&snapshot.variables)?
        );
    }

    if print_trace {
        println!("trace:");
        for entry in &snapshot.agent_trace {
            println!(
                "  {} {:?} {} - {}",
                entry.timestamp.format("%H:%M:%S%.3f"),
                entry.decision,
                entry.agent_id,
                entry.reason
            );
        }
    }

    match snapshot.status {
        WorkflowStatus::Completed => Ok(()),
        WorkflowStatus::Paused | WorkflowStatus::Escalated => {
            bail!("execution parked in '{}' awaiting human intervention", snapshot.status)
        }
        _ => {
            let error = snapshot.error_message.unwrap_or_else(|| "unknown error".to_string());
            bail!("execution ended '{}': {error}", snapshot.status)
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = Level::from_str(&args.log_level).unwrap_or(Level::WARN);
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install tracing subscriber")?;

    match args.command {
        Command::Validate { manifest } => {
            let parsed = load_manifest(&manifest)?;
            println!("manifest '{}' ok: {} task(s)", parsed.id, parsed.tasks.len());
            Ok(())
        }
        Command::Run { manifest, trust, confidence, trace } => {
            run(&manifest, trust, confidence, trace).await
        }
    }
}
