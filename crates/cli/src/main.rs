//! `renewal-workflow` CLI entry-point.
//!
//! Available sub-commands:
//! - `validate`: check a workflow definition JSON file.
//! - `simulate`: run a definition end to end against dry-run collaborators.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use effects::dispatch::TracingDispatcher;
use effects::identity::StaticIdentity;
use effects::scheduler::ManualScheduler;
use engine::{
    ApprovalDecision, ExecutionStatus, ExecutorConfig, NodeKind, RetryPolicy,
    WorkflowDefinition, WorkflowEngine, WorkflowExecution,
};

#[derive(Parser)]
#[command(
    name = "renewal-workflow",
    about = "Renewal and follow-up workflow engine",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a workflow definition JSON file.
    Validate {
        /// Path to the workflow JSON file.
        path: PathBuf,
    },
    /// Run a workflow definition to completion with dry-run actions.
    Simulate(SimulateArgs),
}

#[derive(Args)]
struct SimulateArgs {
    /// Path to the workflow JSON file.
    path: PathBuf,
    /// Initial execution context, as a JSON object.
    #[arg(long, default_value = "{}")]
    context: String,
    /// Trigger payload, as JSON.
    #[arg(long, default_value = "null")]
    trigger: String,
    /// Reject approvals instead of approving them.
    #[arg(long)]
    reject: bool,
    /// Give up after this many steps.
    #[arg(long, default_value_t = 1000)]
    max_steps: usize,
    #[arg(long, env = "WORKFLOW_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,
    #[arg(long, env = "WORKFLOW_RETRY_BASE_DELAY_MS", default_value_t = 100)]
    retry_base_delay_ms: u64,
    /// User id recorded as the actor of automatic steps.
    #[arg(long, env = "WORKFLOW_ACTOR")]
    actor: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Validate { path } => {
            let workflow = load(&path)?;
            let report = engine::validate(&workflow);
            if report.valid {
                println!("Workflow '{}' is valid", workflow.name());
            } else {
                eprintln!("Validation failed for '{}':", workflow.name());
                for error in &report.errors {
                    eprintln!("  - {error}");
                }
                std::process::exit(1);
            }
        }
        Command::Simulate(args) => {
            let execution = simulate(args).await?;
            println!("{}", serde_json::to_string_pretty(&execution)?);
        }
    }

    Ok(())
}

fn load(path: &Path) -> Result<WorkflowDefinition> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid workflow JSON in {}", path.display()))
}

async fn simulate(args: SimulateArgs) -> Result<WorkflowExecution> {
    let mut workflow = load(&args.path)?;
    workflow.activate().context("workflow cannot be activated")?;

    let context: Map<String, Value> =
        serde_json::from_str(&args.context).context("--context must be a JSON object")?;
    let trigger: Value = serde_json::from_str(&args.trigger).context("--trigger must be JSON")?;

    let scheduler = Arc::new(ManualScheduler::default());
    let identity = match args.actor {
        Some(actor) => StaticIdentity::new(actor),
        None => StaticIdentity::anonymous(),
    };
    let config = ExecutorConfig {
        retry: RetryPolicy::new(args.max_retries, Duration::from_millis(args.retry_base_delay_ms)),
    };
    let engine = WorkflowEngine::new(
        Arc::new(TracingDispatcher),
        scheduler.clone(),
        Arc::new(identity),
        config,
    );

    let mut execution = engine.start_execution(&workflow, context, trigger)?;
    let decision = if args.reject {
        ApprovalDecision::Rejected
    } else {
        ApprovalDecision::Approved
    };

    let mut remaining = args.max_steps;
    loop {
        let before = execution.step_log().len();
        match engine.run_until_blocked(&mut execution, remaining).await {
            Ok(()) => {}
            // the failure is already on the execution
            Err(err) => {
                warn!("execution stopped: {err}");
                break;
            }
        }
        remaining = remaining.saturating_sub((execution.step_log().len() - before).max(1));

        match execution.status() {
            ExecutionStatus::WaitingApproval => {
                let approver = match execution.current_node().map(|n| &n.kind) {
                    Some(NodeKind::Approval { approvers, .. }) => approvers.first().cloned(),
                    _ => None,
                };
                let Some(approver) = approver else {
                    bail!("approval node '{}' has no approvers", execution.cursor());
                };
                info!(%approver, ?decision, "auto-resolving approval");
                engine.resolve_approval(&mut execution, &approver, decision)?;
            }
            ExecutionStatus::Paused => {
                if let Some(due) = execution.resume_at() {
                    info!(%due, "fast-forwarding delay");
                    scheduler.set_now(due);
                }
                engine.resume_delay(&mut execution)?;
            }
            ExecutionStatus::Running => {
                warn!(max_steps = args.max_steps, "step budget exhausted");
                break;
            }
            ExecutionStatus::Completed | ExecutionStatus::Failed => break,
        }

        if remaining == 0 {
            warn!(max_steps = args.max_steps, "step budget exhausted");
            break;
        }
    }

    info!(status = %execution.status(), steps = execution.step_log().len(), "simulation finished");
    Ok(execution)
}
