use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Deserialize;
use tokio::sync::mpsc;

use graphflow::config::RunConfig;
use graphflow::filter::{FilterRule, FilterSet};
use graphflow::graph::{FlowGraph, GraphBuilder};
use graphflow::scheduler::{RunEvent, RunStatus, Scheduler};
use graphflow::termination::TerminationCondition;
use graphflow::worker::{ScriptedWorker, WorkerRef};
use graphflow::{gflog, Result};

/// Graphflow - DAG workflow orchestration for conversational agents
#[derive(Parser, Debug)]
#[command(name = "graphflow")]
#[command(version, about, long_about = None)]
#[command(
    after_help = "ENVIRONMENT:\n    GRAPHFLOW_DEBUG=1              Enable debug logging (alternative to --debug)\n    GRAPHFLOW_TIMEOUT_SECS=N       Override per-invocation deadline\n    GRAPHFLOW_MAX_ATTEMPTS=N       Override retry budget per agent\n    GRAPHFLOW_MAX_CONCURRENCY=N    Override concurrent invocation cap"
)]
pub struct Cli {
    /// Enable debug logging (writes to ~/.graphflow/graphflow.log)
    #[arg(short = 'd', long)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Workflow commands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Execute a workflow file against a task
    Run {
        /// Path to the workflow TOML file
        workflow: PathBuf,

        /// The task text seeded into the transcript
        task: String,

        /// Write the final transcript as JSON to this path
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Validate a workflow file without running it
    Validate {
        /// Path to the workflow TOML file
        workflow: PathBuf,
    },
}

/// On-disk workflow declaration: scripted agents, dependency edges, and a
/// termination condition tree.
#[derive(Debug, Deserialize)]
struct WorkflowFile {
    #[serde(default)]
    agents: Vec<AgentSpec>,
    #[serde(default)]
    edges: Vec<EdgeSpec>,
    termination: TerminationCondition,
}

#[derive(Debug, Deserialize)]
struct AgentSpec {
    id: String,
    /// Replies played back in order; the last one repeats when exhausted.
    replies: Vec<String>,
    #[serde(default)]
    filters: Vec<FilterRule>,
}

#[derive(Debug, Deserialize)]
struct EdgeSpec {
    from: String,
    to: String,
}

impl WorkflowFile {
    fn load(path: &Path) -> Result<Self> {
        Ok(toml::from_str(&fs::read_to_string(path)?)?)
    }

    fn build_graph(&self) -> Result<FlowGraph> {
        let mut builder = GraphBuilder::new();
        for agent in &self.agents {
            let worker: WorkerRef = Arc::new(ScriptedWorker::new(agent.replies.clone()));
            builder = builder.add_agent(
                agent.id.as_str(),
                worker,
                FilterSet::new(agent.filters.clone()),
            );
        }
        for edge in &self.edges {
            builder = builder.add_edge(edge.from.as_str(), edge.to.as_str());
        }
        builder.build()
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    graphflow::log::init_with_debug(cli.debug);

    match cli.command {
        Command::Run {
            workflow,
            task,
            output,
        } => run_workflow(&workflow, &task, output),
        Command::Validate { workflow } => run_validate(&workflow),
    }
}

/// Execute a workflow file: stream messages to the console as they are
/// appended, then print a summary and optionally write the transcript.
fn run_workflow(workflow_path: &Path, task: &str, output: Option<PathBuf>) -> Result<()> {
    gflog!("Run command: workflow={:?}, task={:?}", workflow_path, task);

    let file = WorkflowFile::load(workflow_path)?;
    let graph = file.build_graph()?;
    let config = RunConfig::load()?;

    println!("Running workflow: {}", workflow_path.display());
    println!("Agents: {}, edges: {}", graph.agent_count(), graph.edge_count());
    println!();

    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(async {
        let (event_tx, mut event_rx) = mpsc::channel(100);
        let printer = tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                match event {
                    RunEvent::MessageAppended(message) => {
                        println!("  [{}] {}", message.source, message.content);
                    }
                    RunEvent::AgentRetrying {
                        agent,
                        attempt,
                        error,
                    } => {
                        println!("  ({} attempt {} failed: {}, retrying)", agent, attempt, error);
                    }
                    RunEvent::AgentFailed { agent, error } => {
                        println!("  ({} failed: {})", agent, error);
                    }
                    RunEvent::AgentStarted { .. } | RunEvent::Finished(_) => {}
                }
            }
        });

        let mut scheduler = Scheduler::new(graph, file.termination.clone(), config, event_tx)?;
        let result = scheduler.run(task).await;
        // Dropping the scheduler closes the event channel so the printer ends.
        drop(scheduler);
        let _ = printer.await;
        result
    })?;

    println!();
    println!("  Run ID:   {}", result.run_id.short());
    println!("  Status:   {}", format_status(&result.status));
    println!("  Messages: {}", result.transcript.len());

    if let Some(path) = output {
        result.transcript.save_json(&path)?;
        println!("  Transcript written to {}", path.display());
    }

    Ok(())
}

/// Validate a workflow file: topology, filter sources, and termination tree.
fn run_validate(workflow_path: &Path) -> Result<()> {
    gflog!("Validate command: workflow={:?}", workflow_path);

    let file = WorkflowFile::load(workflow_path)?;
    let graph = file.build_graph()?;
    file.termination.validate()?;

    println!("Workflow is valid: {}", workflow_path.display());
    println!("  Agents:      {}", graph.agent_count());
    println!("  Edges:       {}", graph.edge_count());
    println!(
        "  Entry:       {}",
        graph
            .entry_agents()
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    println!("  Termination: {}", file.termination);

    Ok(())
}

/// Format run status with color codes for terminal.
fn format_status(status: &RunStatus) -> String {
    match status {
        RunStatus::Completed => format!("\x1b[32m{}\x1b[0m", status), // Green
        RunStatus::Terminated(_) => format!("\x1b[33m{}\x1b[0m", status), // Yellow
        RunStatus::Aborted(_) => format!("\x1b[31m{}\x1b[0m", status), // Red
    }
}
