//! Transcript data model: the append-only message log for a run.
//!
//! The transcript is the single source of truth for a workflow run. Messages
//! are created once by the scheduler (or when the initial task is seeded) and
//! are never mutated or removed afterwards.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Reserved source id for the externally seeded task message.
pub const USER_SOURCE: &str = "user";

/// Identifier for an agent node within a workflow graph.
///
/// Agents are addressed by human-readable names ("CodeWriter",
/// "SecurityAnalyzer"). The reserved id `user` marks the seeded task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    /// Create an agent id from a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The reserved id for external input (the seeded task).
    pub fn user() -> Self {
        Self(USER_SOURCE.to_string())
    }

    /// Whether this id is the reserved external-input id.
    pub fn is_user(&self) -> bool {
        self.0 == USER_SOURCE
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A single message in the transcript.
///
/// Messages carry a strictly increasing sequence number assigned at append
/// time and are immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Agent that produced this message, or [`AgentId::user`] for the seed.
    pub source: AgentId,
    /// Content payload.
    pub content: String,
    /// Position in the transcript, starting at 1, gapless.
    pub sequence: u64,
    /// When the message was appended.
    pub timestamp: DateTime<Utc>,
}

/// Export record for a transcript message.
///
/// The export format is consumed by external storage; importing a list of
/// records reconstructs a field-for-field identical transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptRecord {
    pub sequence: u64,
    pub source: AgentId,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Append-only ordered log of messages.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    /// Create an empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message from the given source, assigning the next sequence
    /// number. Returns a clone of the appended message.
    pub fn append(&mut self, source: AgentId, content: impl Into<String>) -> Message {
        let message = Message {
            source,
            content: content.into(),
            sequence: self.messages.len() as u64 + 1,
            timestamp: Utc::now(),
        };
        self.messages.push(message.clone());
        message
    }

    /// Number of messages in the transcript.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if the transcript is empty.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// All messages in append order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The most recent message, if any.
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Messages from a single source, in chronological order.
    pub fn from_source<'a>(&'a self, source: &'a AgentId) -> impl Iterator<Item = &'a Message> {
        self.messages.iter().filter(move |m| &m.source == source)
    }

    /// Export the transcript as ordered records for persistence.
    pub fn export(&self) -> Vec<TranscriptRecord> {
        self.messages
            .iter()
            .map(|m| TranscriptRecord {
                sequence: m.sequence,
                source: m.source.clone(),
                content: m.content.clone(),
                timestamp: m.timestamp,
            })
            .collect()
    }

    /// Reconstruct a transcript from exported records.
    ///
    /// Records must arrive in their original order with gapless sequence
    /// numbers starting at 1.
    pub fn from_records(records: Vec<TranscriptRecord>) -> Result<Self> {
        let mut messages = Vec::with_capacity(records.len());
        for (i, record) in records.into_iter().enumerate() {
            if record.sequence != i as u64 + 1 {
                return Err(Error::TranscriptOrder(record.sequence));
            }
            messages.push(Message {
                source: record.source,
                content: record.content,
                sequence: record.sequence,
                timestamp: record.timestamp,
            });
        }
        Ok(Self { messages })
    }

    /// Write the exported records to a JSON file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.export())?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load a transcript from a JSON file of exported records.
    pub fn load_json(path: &Path) -> Result<Self> {
        let records: Vec<TranscriptRecord> = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        Self::from_records(records)
    }
}
