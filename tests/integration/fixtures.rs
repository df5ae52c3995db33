//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Scripted, slow, and failing workers
//! - A run harness bundling scheduler construction and event collection
//! - A fast run configuration suitable for CI

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::mpsc;

use graphflow::config::RunConfig;
use graphflow::graph::FlowGraph;
use graphflow::scheduler::{RunEvent, RunResult, Scheduler};
use graphflow::termination::TerminationCondition;
use graphflow::transcript::Message;
use graphflow::worker::{ScriptedWorker, Worker, WorkerError, WorkerRef};

/// Worker handle that always replies with the same content.
pub fn scripted(reply: &str) -> WorkerRef {
    Arc::new(ScriptedWorker::single(reply))
}

/// Worker that waits before replying. Used for timing-sensitive tests.
pub struct SlowWorker {
    delay: Duration,
    reply: String,
}

impl SlowWorker {
    pub fn new(delay_ms: u64, reply: &str) -> WorkerRef {
        Arc::new(Self {
            delay: Duration::from_millis(delay_ms),
            reply: reply.to_string(),
        })
    }
}

impl Worker for SlowWorker {
    fn invoke(&self, _view: Vec<Message>) -> BoxFuture<'static, Result<String, WorkerError>> {
        let delay = self.delay;
        let reply = self.reply.clone();
        async move {
            tokio::time::sleep(delay).await;
            Ok(reply)
        }
        .boxed()
    }
}

/// Worker that fails every attempt with a transport error.
pub struct FailingWorker {
    message: String,
}

impl FailingWorker {
    pub fn new(message: &str) -> WorkerRef {
        Arc::new(Self {
            message: message.to_string(),
        })
    }
}

impl Worker for FailingWorker {
    fn invoke(&self, _view: Vec<Message>) -> BoxFuture<'static, Result<String, WorkerError>> {
        let message = self.message.clone();
        async move { Err(WorkerError::Transport(message)) }.boxed()
    }
}

/// Worker that replies with a one-line description of the view it was shown.
///
/// Lets tests assert exactly what an agent saw without instrumenting the
/// scheduler.
pub struct ViewReportingWorker {
    name: String,
}

impl ViewReportingWorker {
    pub fn new(name: &str) -> WorkerRef {
        Arc::new(Self {
            name: name.to_string(),
        })
    }
}

impl Worker for ViewReportingWorker {
    fn invoke(&self, view: Vec<Message>) -> BoxFuture<'static, Result<String, WorkerError>> {
        let name = self.name.clone();
        async move {
            let sources: Vec<String> = view.iter().map(|m| m.source.to_string()).collect();
            Ok(format!("{} saw [{}]", name, sources.join(", ")))
        }
        .boxed()
    }
}

/// Run configuration with short timeouts, suitable for CI.
pub fn fast_config() -> RunConfig {
    RunConfig {
        invocation_timeout_secs: 5,
        max_attempts: 2,
        max_concurrency: 4,
    }
}

/// Bundles scheduler construction with event collection.
///
/// Events are buffered on a channel during the run and drained afterwards;
/// tests asserting on event order read the returned vector.
pub struct RunHarness {
    scheduler: Scheduler,
    event_rx: mpsc::Receiver<RunEvent>,
}

impl RunHarness {
    pub fn new(graph: FlowGraph, termination: TerminationCondition, config: RunConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(100);
        let scheduler =
            Scheduler::new(graph, termination, config, event_tx).expect("scheduler construction");
        Self {
            scheduler,
            event_rx,
        }
    }

    /// Execute the run and return the result together with all emitted events.
    pub async fn run(mut self, task: &str) -> (RunResult, Vec<RunEvent>) {
        let result = self.scheduler.run(task).await.expect("run");
        let mut events = Vec::new();
        while let Ok(event) = self.event_rx.try_recv() {
            events.push(event);
        }
        (result, events)
    }
}
