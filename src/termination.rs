//! Termination conditions evaluated against the transcript.
//!
//! Conditions form an explicit tagged tree of leaf predicates combined with
//! `All`/`Any` nodes, evaluated by a small recursive evaluator. The scheduler
//! re-evaluates the tree after every single append so termination is detected
//! at the earliest possible message.

use crate::error::{Error, Result};
use crate::transcript::Transcript;
use serde::{Deserialize, Serialize};

/// Composite predicate over the transcript deciding run completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum TerminationCondition {
    /// True once any message's content contains the keyword as a substring.
    KeywordPresent { keyword: String },
    /// True once the transcript holds at least `count` messages.
    MessageCountAtLeast { count: usize },
    /// True when every child condition is true.
    All { conditions: Vec<TerminationCondition> },
    /// True when any child condition is true (short-circuits).
    Any { conditions: Vec<TerminationCondition> },
}

impl TerminationCondition {
    /// Leaf: keyword substring match on any message from any source.
    pub fn keyword(keyword: impl Into<String>) -> Self {
        Self::KeywordPresent {
            keyword: keyword.into(),
        }
    }

    /// Leaf: transcript length threshold.
    pub fn message_count(count: usize) -> Self {
        Self::MessageCountAtLeast { count }
    }

    /// AND over children.
    pub fn all(conditions: Vec<TerminationCondition>) -> Self {
        Self::All { conditions }
    }

    /// OR over children.
    pub fn any(conditions: Vec<TerminationCondition>) -> Self {
        Self::Any { conditions }
    }

    /// Reject empty composite lists before a run starts.
    ///
    /// An empty `All` would be vacuously true and an empty `Any` vacuously
    /// false; both indicate a misconfigured workflow.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::KeywordPresent { .. } | Self::MessageCountAtLeast { .. } => Ok(()),
            Self::All { conditions } => {
                if conditions.is_empty() {
                    return Err(Error::EmptyTermination("all"));
                }
                conditions.iter().try_for_each(Self::validate)
            }
            Self::Any { conditions } => {
                if conditions.is_empty() {
                    return Err(Error::EmptyTermination("any"));
                }
                conditions.iter().try_for_each(Self::validate)
            }
        }
    }

    /// Evaluate the condition tree against the transcript.
    pub fn is_satisfied(&self, transcript: &Transcript) -> bool {
        match self {
            Self::KeywordPresent { keyword } => transcript
                .messages()
                .iter()
                .any(|m| m.content.contains(keyword.as_str())),
            Self::MessageCountAtLeast { count } => transcript.len() >= *count,
            Self::All { conditions } => conditions.iter().all(|c| c.is_satisfied(transcript)),
            Self::Any { conditions } => conditions.iter().any(|c| c.is_satisfied(transcript)),
        }
    }
}

impl std::fmt::Display for TerminationCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::KeywordPresent { keyword } => write!(f, "keyword \"{}\" present", keyword),
            Self::MessageCountAtLeast { count } => write!(f, "message count >= {}", count),
            Self::All { conditions } => {
                write!(f, "all(")?;
                for (i, c) in conditions.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", c)?;
                }
                write!(f, ")")
            }
            Self::Any { conditions } => {
                write!(f, "any(")?;
                for (i, c) in conditions.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", c)?;
                }
                write!(f, ")")
            }
        }
    }
}
