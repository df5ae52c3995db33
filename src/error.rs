use thiserror::Error;

use crate::transcript::AgentId;
use crate::worker::WorkerError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Graph contains a cycle through agent: {0}")]
    Cycle(AgentId),

    #[error("Edge references unknown agent: {0}")]
    DanglingEdge(AgentId),

    #[error("Graph has no entry node: every agent has a predecessor")]
    NoEntryNode,

    #[error("Agent already exists in graph: {0}")]
    DuplicateAgent(AgentId),

    #[error("Filter on agent {agent} references unknown source: {selector}")]
    UnknownFilterSource { agent: AgentId, selector: AgentId },

    #[error("Filter on agent {agent} for source {selector} has count 0")]
    ZeroFilterCount { agent: AgentId, selector: AgentId },

    #[error("Termination condition has an empty {0} list")]
    EmptyTermination(&'static str),

    #[error("Agent {agent} failed after {attempts} attempt(s): {source}")]
    AgentFailed {
        agent: AgentId,
        attempts: u32,
        source: WorkerError,
    },

    #[error("Transcript import is out of order at sequence {0}")]
    TranscriptOrder(u64),

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, Error>;
