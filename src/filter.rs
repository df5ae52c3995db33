//! Per-agent message filtering.
//!
//! Each graph node carries a [`FilterSet`] describing which slice of the
//! transcript its worker is allowed to see. Rules select messages by source
//! and take the first or last `count` of them; per-rule results are
//! concatenated in the declaration order of the rules, not global
//! chronological order, so an agent's framing stays stable regardless of how
//! messages from different sources interleave.

use crate::transcript::{AgentId, Message, Transcript};
use serde::{Deserialize, Serialize};

/// Which end of a source's message history a rule selects from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterPosition {
    /// The earliest `count` messages from the source.
    First,
    /// The latest `count` messages from the source.
    Last,
}

/// A single per-source selection rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRule {
    /// Source to select from: an agent id or the reserved `user` id.
    pub source: AgentId,
    /// Which end of the source's history to take.
    pub position: FilterPosition,
    /// How many messages to take. Must be positive; validated at graph build.
    pub count: usize,
}

impl FilterRule {
    /// Select the first `count` messages from `source`.
    pub fn first(source: impl Into<AgentId>, count: usize) -> Self {
        Self {
            source: source.into(),
            position: FilterPosition::First,
            count,
        }
    }

    /// Select the last `count` messages from `source`.
    pub fn last(source: impl Into<AgentId>, count: usize) -> Self {
        Self {
            source: source.into(),
            position: FilterPosition::Last,
            count,
        }
    }

    fn select(&self, transcript: &Transcript) -> Vec<Message> {
        let matched: Vec<&Message> = transcript.from_source(&self.source).collect();
        let taken: Vec<&Message> = match self.position {
            FilterPosition::First => matched.iter().take(self.count).copied().collect(),
            FilterPosition::Last => {
                let skip = matched.len().saturating_sub(self.count);
                matched.iter().skip(skip).copied().collect()
            }
        };
        taken.into_iter().cloned().collect()
    }
}

/// Declaration-ordered set of filter rules attached to a graph node.
///
/// An empty set means the agent sees the full transcript.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterSet {
    rules: Vec<FilterRule>,
}

impl FilterSet {
    /// A filter set that passes the entire transcript through.
    pub fn all() -> Self {
        Self::default()
    }

    /// Build a filter set from rules in declaration order.
    pub fn new(rules: Vec<FilterRule>) -> Self {
        Self { rules }
    }

    /// Whether this set passes the full transcript through.
    pub fn is_pass_through(&self) -> bool {
        self.rules.is_empty()
    }

    /// The rules in declaration order.
    pub fn rules(&self) -> &[FilterRule] {
        &self.rules
    }

    /// Build the filtered view of the transcript for this set.
    ///
    /// Pure: identical transcript and rules always yield an identical view.
    /// A rule whose source matched no messages contributes nothing.
    pub fn build_view(&self, transcript: &Transcript) -> Vec<Message> {
        if self.is_pass_through() {
            return transcript.messages().to_vec();
        }
        self.rules
            .iter()
            .flat_map(|rule| rule.select(transcript))
            .collect()
    }
}
