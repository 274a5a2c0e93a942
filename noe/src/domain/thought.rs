//! Thought - the typed, content-bearing unit of cognition

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier for a thought (time-ordered v7 UUID)
pub type ThoughtId = Uuid;

/// Kind of thought produced by the stream of consciousness or an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ThoughtKind {
    Observation,
    Reflection,
    Question,
    Insight,
    MetaCognitive,
    Memory,
    Curiosity,
}

impl ThoughtKind {
    /// Stable name used in logs and structural keys
    pub fn as_str(&self) -> &'static str {
        match self {
            ThoughtKind::Observation => "Observation",
            ThoughtKind::Reflection => "Reflection",
            ThoughtKind::Question => "Question",
            ThoughtKind::Insight => "Insight",
            ThoughtKind::MetaCognitive => "MetaCognitive",
            ThoughtKind::Memory => "Memory",
            ThoughtKind::Curiosity => "Curiosity",
        }
    }

    /// Hypergraph node type this kind of thought lands as.
    ///
    /// Memory thoughts become `memory` nodes so recall edges can target them
    /// alongside seeded memories; every other kind keeps its own name.
    pub fn node_type(&self) -> &'static str {
        match self {
            ThoughtKind::Memory => "memory",
            other => other.as_str(),
        }
    }
}

/// Where a thought came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ThoughtSource {
    Memory,
    Perception,
    Imagination,
    Association,
    Curiosity,
    Internal,
}

impl ThoughtSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThoughtSource::Memory => "memory",
            ThoughtSource::Perception => "perception",
            ThoughtSource::Imagination => "imagination",
            ThoughtSource::Association => "association",
            ThoughtSource::Curiosity => "curiosity",
            ThoughtSource::Internal => "internal",
        }
    }

    pub const ALL: [ThoughtSource; 6] = [
        ThoughtSource::Memory,
        ThoughtSource::Perception,
        ThoughtSource::Imagination,
        ThoughtSource::Association,
        ThoughtSource::Curiosity,
        ThoughtSource::Internal,
    ];
}

/// A single thought. Immutable once published on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thought {
    pub id: ThoughtId,
    pub timestamp: DateTime<Utc>,
    pub kind: ThoughtKind,
    pub content: String,
    pub source: ThoughtSource,
    /// Earlier thoughts this one cites; always older than `timestamp`
    pub associations: Vec<ThoughtId>,
    /// Importance in [0, 1]
    pub salience: f64,
}

impl Thought {
    /// Create a thought with default salience and no associations
    pub fn new(kind: ThoughtKind, source: ThoughtSource, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            timestamp: Utc::now(),
            kind,
            content: content.into(),
            source,
            associations: Vec::new(),
            salience: 0.5,
        }
    }

    pub fn with_salience(mut self, salience: f64) -> Self {
        self.salience = salience.clamp(0.0, 1.0);
        self
    }

    pub fn with_associations(mut self, associations: Vec<ThoughtId>) -> Self {
        self.associations = associations;
        self
    }
}
