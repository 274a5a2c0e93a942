//! Hypergraph records - nodes, typed edges and detected patterns

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier for a hypergraph node
pub type NodeId = Uuid;

/// A memory node. Activation rises on access and decays during
/// consolidation; orphaned nodes may be pruned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HypergraphNode {
    pub id: NodeId,
    pub content: String,
    /// Domain type: a thought kind name, or a graph-native type such as
    /// `memory`, `concept`, `knowledge_gap`, `cognitive_process`, `insight`
    pub node_type: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub access_count: u64,
    /// Current activation in [0, 1]
    pub activation: f64,
}

impl HypergraphNode {
    pub fn new(node_type: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            content: content.into(),
            node_type: node_type.into(),
            created_at: now,
            last_accessed: now,
            access_count: 0,
            activation: 0.5,
        }
    }

    /// Record an access: bump the counter and raise activation
    pub fn touch(&mut self) {
        self.access_count += 1;
        self.last_accessed = Utc::now();
        self.activation = (self.activation + 0.1).min(1.0);
    }
}

/// Typed relation between two nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeRelation {
    Recalls,
    Addresses,
    Integrates,
    ReflectsOn,
    Synthesizes,
    Causes,
    Requires,
}

impl EdgeRelation {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeRelation::Recalls => "recalls",
            EdgeRelation::Addresses => "addresses",
            EdgeRelation::Integrates => "integrates",
            EdgeRelation::ReflectsOn => "reflects_on",
            EdgeRelation::Synthesizes => "synthesizes",
            EdgeRelation::Causes => "causes",
            EdgeRelation::Requires => "requires",
        }
    }
}

/// Weighted directed edge. Weights decay toward zero over consolidation
/// passes; edges below the prune threshold are removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HypergraphEdge {
    pub src: NodeId,
    pub dst: NodeId,
    pub relation: EdgeRelation,
    pub weight: f64,
    pub traversal_count: u64,
}

impl HypergraphEdge {
    pub fn new(src: NodeId, dst: NodeId, relation: EdgeRelation, weight: f64) -> Self {
        Self {
            src,
            dst,
            relation,
            weight: weight.clamp(0.0, 1.0),
            traversal_count: 0,
        }
    }
}

/// A recurring structural key over edge endpoint types, promoted to an
/// insight node during consolidation once strong enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: Uuid,
    /// `"{src_type}-{dst_type}"`
    pub structural_key: String,
    pub node_refs: Vec<NodeId>,
    pub strength: f64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub occurrences: u64,
}
