pub mod config;
pub mod error;
pub mod filter;
pub mod graph;
pub mod log;
pub mod scheduler;
pub mod termination;
pub mod transcript;
pub mod worker;

pub use error::{Error, Result};
pub use scheduler::{NodeState, RunEvent, RunId, RunResult, RunStatus, Scheduler};
pub use transcript::{AgentId, Message, Transcript, USER_SOURCE};
