//! The worker capability consumed by the scheduler.
//!
//! A worker turns a filtered transcript view into new message content. The
//! scheduler treats it as a black box: how content is produced (an LLM call,
//! a subprocess, a canned script) is entirely the implementor's concern.

use crate::transcript::Message;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Typed failure from a worker invocation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    /// The invocation exceeded its configured deadline.
    #[error("invocation timed out")]
    Timeout,

    /// The underlying transport failed (network, subprocess, ...).
    #[error("transport failure: {0}")]
    Transport(String),

    /// The worker returned empty content.
    #[error("worker returned an empty result")]
    EmptyResult,
}

/// Content-generation capability invoked once per ready graph node.
///
/// `invoke` receives the node's filtered view of the transcript and resolves
/// to new message content. The scheduler enforces the per-call deadline and
/// cancellation externally; implementations only need to be cancel-safe in
/// the usual future-dropping sense.
pub trait Worker: Send + Sync {
    fn invoke(&self, view: Vec<Message>) -> BoxFuture<'static, Result<String, WorkerError>>;
}

/// Shared handle to a worker, as stored on graph nodes.
pub type WorkerRef = Arc<dyn Worker>;

/// Worker that replays a fixed list of replies.
///
/// Each completed invocation advances to the next reply; the last reply
/// repeats once the script is exhausted. Used by the CLI demo runner and
/// throughout the tests.
pub struct ScriptedWorker {
    replies: Vec<String>,
    calls: AtomicUsize,
}

impl ScriptedWorker {
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies,
            calls: AtomicUsize::new(0),
        }
    }

    /// Single fixed reply for every invocation.
    pub fn single(reply: impl Into<String>) -> Self {
        Self::new(vec![reply.into()])
    }

    /// Number of invocations observed so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Worker for ScriptedWorker {
    fn invoke(&self, _view: Vec<Message>) -> BoxFuture<'static, Result<String, WorkerError>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = match self.replies.get(n).or_else(|| self.replies.last()) {
            Some(reply) => Ok(reply.clone()),
            None => Err(WorkerError::EmptyResult),
        };
        async move { reply }.boxed()
    }
}
