//! Scheduler: the DAG-traversal loop that drives a workflow run.
//!
//! The scheduler dispatches every ready agent concurrently, appends each
//! completed invocation to the transcript through a single serialization
//! point, re-evaluates the termination condition after every append, and
//! resolves fan-in readiness as predecessors complete. It emits one event per
//! appended message plus one terminal event on the channel supplied at
//! construction.

use crate::config::RunConfig;
use crate::error::{Error, Result};
use crate::graph::FlowGraph;
use crate::termination::TerminationCondition;
use crate::transcript::{AgentId, Message, Transcript};
use crate::worker::WorkerError;
use crate::{gflog, gflog_debug, gflog_error, gflog_trace, gflog_warn};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Unique identifier for a workflow run.
///
/// Uses UUID v4 for generation and provides a short form display
/// for human-readable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Create a new unique run identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a single agent node during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    /// Predecessors incomplete.
    #[default]
    Pending,
    /// All predecessors done, awaiting dispatch.
    Ready,
    /// Worker invocation in flight.
    Running,
    /// Message appended to the transcript.
    Done,
    /// Retry budget exhausted.
    Failed,
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeState::Pending => write!(f, "pending"),
            NodeState::Ready => write!(f, "ready"),
            NodeState::Running => write!(f, "running"),
            NodeState::Done => write!(f, "done"),
            NodeState::Failed => write!(f, "failed"),
        }
    }
}

/// Per-agent record surfaced in the run result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Terminal (or last observed) state.
    pub state: NodeState,
    /// When the invocation was dispatched.
    pub started_at: Option<DateTime<Utc>>,
    /// When the node reached Done or Failed.
    pub finished_at: Option<DateTime<Utc>>,
    /// Invocation attempts consumed.
    pub attempts: u32,
}

/// Terminal status of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "detail")]
pub enum RunStatus {
    /// Graph exhausted without triggering the termination condition.
    Completed,
    /// Termination condition satisfied; reason describes the condition.
    Terminated(String),
    /// An agent exhausted its retry budget; reason describes the failure.
    Aborted(String),
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Terminated(reason) => write!(f, "terminated: {}", reason),
            RunStatus::Aborted(reason) => write!(f, "aborted: {}", reason),
        }
    }
}

/// Events emitted by the scheduler during a run.
///
/// These events allow external components (console streaming, persistence)
/// to react to run progress without polling. One `MessageAppended` fires per
/// transcript append, and exactly one `Finished` fires per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    /// An agent's worker invocation was dispatched.
    AgentStarted {
        /// The agent that started.
        agent: AgentId,
    },
    /// An invocation attempt failed and will be retried.
    AgentRetrying {
        /// The agent being retried.
        agent: AgentId,
        /// The attempt that just failed (1-based).
        attempt: u32,
        /// Description of the failure.
        error: String,
    },
    /// A message was appended to the transcript.
    MessageAppended(Message),
    /// An agent exhausted its retry budget.
    AgentFailed {
        /// The agent that failed.
        agent: AgentId,
        /// Description of the final failure.
        error: String,
    },
    /// The run reached a terminal status.
    Finished(RunStatus),
}

/// Outcome of a run: the full transcript plus terminal status and per-agent
/// lifecycle records. A failed run still carries the partial transcript.
#[derive(Debug)]
pub struct RunResult {
    pub run_id: RunId,
    pub status: RunStatus,
    pub transcript: Transcript,
    pub agents: HashMap<AgentId, NodeRecord>,
}

/// A finished worker invocation, reported back to the serialization point.
struct Completion {
    agent: AgentId,
    outcome: std::result::Result<String, WorkerError>,
    attempts: u32,
    completed_at: Instant,
}

/// Scheduler for a single workflow run.
///
/// Owns the graph and transcript for the duration of the run; the transcript
/// is the only mutable shared state and every append goes through the
/// scheduler's own completion loop.
pub struct Scheduler {
    graph: FlowGraph,
    termination: TerminationCondition,
    config: RunConfig,
    event_tx: mpsc::Sender<RunEvent>,
    cancel: CancellationToken,
}

impl Scheduler {
    /// Create a scheduler for a validated graph.
    ///
    /// Fails with `EmptyTermination` if the condition tree contains an empty
    /// composite; nothing is dispatched before validation passes.
    pub fn new(
        graph: FlowGraph,
        termination: TerminationCondition,
        config: RunConfig,
        event_tx: mpsc::Sender<RunEvent>,
    ) -> Result<Self> {
        termination.validate()?;
        Ok(Self {
            graph,
            termination,
            config,
            event_tx,
            cancel: CancellationToken::new(),
        })
    }

    async fn emit(&self, event: RunEvent) {
        let _ = self.event_tx.send(event).await;
    }

    /// Execute the run: seed the task, traverse the graph, return the outcome.
    ///
    /// Worker failures abort the run but still return `Ok` with the partial
    /// transcript inside [`RunResult`]; only infrastructure errors surface as
    /// `Err`.
    pub async fn run(&mut self, task: &str) -> Result<RunResult> {
        let run_id = RunId::new();
        gflog!(
            "Run {} starting: {} agent(s), termination: {}",
            run_id.short(),
            self.graph.agent_count(),
            self.termination
        );

        // A finished run leaves its token cancelled; each run gets a fresh
        // one so back-to-back runs on the same scheduler work.
        self.cancel = CancellationToken::new();

        let mut transcript = Transcript::new();
        let mut records: HashMap<AgentId, NodeRecord> = self
            .graph
            .agent_ids()
            .into_iter()
            .map(|id| (id, NodeRecord::default()))
            .collect();
        let mut unresolved: HashMap<AgentId, usize> = self
            .graph
            .agent_ids()
            .into_iter()
            .map(|id| {
                let count = self.graph.predecessor_count(&id);
                (id, count)
            })
            .collect();

        let mut ready = self.graph.entry_agents();
        for agent in &ready {
            if let Some(record) = records.get_mut(agent) {
                record.state = NodeState::Ready;
            }
        }

        // Seed the external task; termination is evaluated on the seed too.
        let seed = transcript.append(AgentId::user(), task);
        self.emit(RunEvent::MessageAppended(seed)).await;

        let mut status: Option<RunStatus> = None;
        if self.termination.is_satisfied(&transcript) {
            status = Some(RunStatus::Terminated(self.termination.to_string()));
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Completion>();
        let mut tasks: JoinSet<()> = JoinSet::new();
        let mut running = 0usize;

        while status.is_none() {
            // Fan-out: dispatch ready agents up to the concurrency cap. An
            // agent is only marked Running once it holds a permit; the rest
            // stay queued until a slot frees up.
            let mut deferred = Vec::new();
            for agent in std::mem::take(&mut ready) {
                let Ok(permit) = Arc::clone(&semaphore).try_acquire_owned() else {
                    deferred.push(agent);
                    continue;
                };
                let (Some(filters), Some(worker)) =
                    (self.graph.filters(&agent), self.graph.worker(&agent))
                else {
                    continue;
                };
                let view = filters.build_view(&transcript);
                gflog_debug!(
                    "Dispatching {} with a view of {} message(s)",
                    agent,
                    view.len()
                );
                if let Some(record) = records.get_mut(&agent) {
                    record.state = NodeState::Running;
                    record.started_at = Some(Utc::now());
                }
                running += 1;
                self.emit(RunEvent::AgentStarted {
                    agent: agent.clone(),
                })
                .await;

                let done_tx = done_tx.clone();
                let event_tx = self.event_tx.clone();
                let cancel = self.cancel.clone();
                let timeout = self.config.invocation_timeout();
                let max_attempts = self.config.max_attempts.max(1);
                tasks.spawn(async move {
                    let mut last_error = WorkerError::EmptyResult;
                    for attempt in 1..=max_attempts {
                        // Retries reuse the same filtered view.
                        let invocation = worker.invoke(view.clone());
                        let outcome = tokio::select! {
                            _ = cancel.cancelled() => return,
                            result = tokio::time::timeout(timeout, invocation) => result,
                        };
                        match outcome {
                            Ok(Ok(content)) if !content.is_empty() => {
                                // The permit must be released before the
                                // completion is reported so the dispatch
                                // loop sees the freed slot.
                                drop(permit);
                                let _ = done_tx.send(Completion {
                                    agent,
                                    outcome: Ok(content),
                                    attempts: attempt,
                                    completed_at: Instant::now(),
                                });
                                return;
                            }
                            Ok(Ok(_)) => last_error = WorkerError::EmptyResult,
                            Ok(Err(error)) => last_error = error,
                            Err(_) => last_error = WorkerError::Timeout,
                        }
                        if attempt < max_attempts {
                            gflog_warn!(
                                "Agent {} attempt {}/{} failed: {}",
                                agent,
                                attempt,
                                max_attempts,
                                last_error
                            );
                            let _ = event_tx
                                .send(RunEvent::AgentRetrying {
                                    agent: agent.clone(),
                                    attempt,
                                    error: last_error.to_string(),
                                })
                                .await;
                        }
                    }
                    drop(permit);
                    let _ = done_tx.send(Completion {
                        agent,
                        outcome: Err(last_error),
                        attempts: max_attempts,
                        completed_at: Instant::now(),
                    });
                });
            }
            ready = deferred;

            // Graph exhausted: nothing ready, nothing in flight.
            if running == 0 {
                status = Some(RunStatus::Completed);
                break;
            }

            // Single serialization point: collect completions, ordered by
            // completion time with ties broken by agent id.
            let Some(first) = done_rx.recv().await else {
                break;
            };
            let mut batch = vec![first];
            while let Ok(more) = done_rx.try_recv() {
                batch.push(more);
            }
            batch.sort_by(|a, b| {
                a.completed_at
                    .cmp(&b.completed_at)
                    .then_with(|| a.agent.cmp(&b.agent))
            });

            for completion in batch {
                running -= 1;
                match completion.outcome {
                    Ok(content) => {
                        if let Some(record) = records.get_mut(&completion.agent) {
                            record.state = NodeState::Done;
                            record.finished_at = Some(Utc::now());
                            record.attempts = completion.attempts;
                        }
                        if status.is_some() {
                            // The run already left Active at this
                            // serialization point; the cancellation race is
                            // resolved by not appending late results.
                            gflog_warn!(
                                "Dropping late result from {} after run end",
                                completion.agent
                            );
                            continue;
                        }
                        let message = transcript.append(completion.agent.clone(), content);
                        let sequence = message.sequence;
                        gflog_debug!(
                            "Appended message {} from {}",
                            message.sequence,
                            message.source
                        );
                        self.emit(RunEvent::MessageAppended(message)).await;

                        if self.termination.is_satisfied(&transcript) {
                            gflog!(
                                "Run {} terminating: {}",
                                run_id.short(),
                                self.termination
                            );
                            status =
                                Some(RunStatus::Terminated(self.termination.to_string()));
                            self.cancel.cancel();
                            continue;
                        }
                        gflog_trace!("Termination not satisfied at message {}", sequence);

                        // Fan-in: successors become ready only once every
                        // predecessor is done.
                        for successor in self.graph.successors(&completion.agent) {
                            if let Some(count) = unresolved.get_mut(&successor) {
                                *count = count.saturating_sub(1);
                                if *count == 0 {
                                    if let Some(record) = records.get_mut(&successor) {
                                        record.state = NodeState::Ready;
                                    }
                                    ready.push(successor);
                                }
                            }
                        }
                        ready.sort();
                    }
                    Err(error) => {
                        if let Some(record) = records.get_mut(&completion.agent) {
                            record.state = NodeState::Failed;
                            record.finished_at = Some(Utc::now());
                            record.attempts = completion.attempts;
                        }
                        gflog_error!(
                            "Agent {} failed after {} attempt(s): {}",
                            completion.agent,
                            completion.attempts,
                            error
                        );
                        self.emit(RunEvent::AgentFailed {
                            agent: completion.agent.clone(),
                            error: error.to_string(),
                        })
                        .await;
                        if status.is_none() {
                            let reason = Error::AgentFailed {
                                agent: completion.agent.clone(),
                                attempts: completion.attempts,
                                source: error,
                            };
                            status = Some(RunStatus::Aborted(reason.to_string()));
                            self.cancel.cancel();
                        }
                    }
                }
            }
        }

        // Best-effort cancellation of anything still in flight, then drain.
        self.cancel.cancel();
        drop(done_tx);
        while tasks.join_next().await.is_some() {}

        let status = status.unwrap_or(RunStatus::Completed);
        gflog!(
            "Run {} finished: {} ({} message(s))",
            run_id.short(),
            status,
            transcript.len()
        );
        self.emit(RunEvent::Finished(status.clone())).await;

        Ok(RunResult {
            run_id,
            status,
            transcript,
            agents: records,
        })
    }
}
