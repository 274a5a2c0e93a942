//! Hypergraph store - nodes, typed weighted edges and structural patterns
//!
//! Single writer (the integrator task) behind a shared-read lock. All
//! mutation here is synchronous; the async consolidation driver chunks its
//! work around short lock acquisitions.

use std::collections::HashMap;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{EdgeRelation, HypergraphEdge, HypergraphNode, NodeId, Pattern};

/// Pluggable content similarity. The default is substring match: a hit
/// scores 0.5 (the documented no-embedding-backend default), a miss 0.0.
pub trait Similarity: Send + Sync {
    fn score(&self, a: &str, b: &str) -> f64;
}

/// Case-insensitive substring similarity
#[derive(Debug, Default, Clone)]
pub struct SubstringSimilarity;

impl Similarity for SubstringSimilarity {
    fn score(&self, a: &str, b: &str) -> f64 {
        let a = a.to_lowercase();
        let b = b.to_lowercase();
        if !a.is_empty() && !b.is_empty() && (a.contains(&b) || b.contains(&a)) {
            0.5
        } else {
            0.0
        }
    }
}

/// Edge identity: endpoints plus relation
pub type EdgeKey = (NodeId, NodeId, EdgeRelation);

#[derive(Debug, Clone)]
struct PatternEntry {
    id: Uuid,
    occurrences: u64,
    node_refs: Vec<NodeId>,
    first_seen: chrono::DateTime<Utc>,
    last_seen: chrono::DateTime<Utc>,
    emitted: bool,
    synthesized: bool,
}

/// Occurrence counting over structural keys `(src_type, dst_type)`
#[derive(Debug)]
pub struct PatternTracker {
    entries: HashMap<String, PatternEntry>,
    threshold: f64,
}

/// Node refs retained per pattern
const PATTERN_REF_CAP: usize = 32;

impl PatternTracker {
    pub fn new(threshold: f64) -> Self {
        Self {
            entries: HashMap::new(),
            threshold,
        }
    }

    /// Record one occurrence. Returns the pattern the first time its
    /// strength crosses the threshold.
    pub fn record(&mut self, key: String, src: NodeId, dst: NodeId) -> Option<Pattern> {
        let now = Utc::now();
        let entry = self.entries.entry(key.clone()).or_insert_with(|| PatternEntry {
            id: Uuid::now_v7(),
            occurrences: 0,
            node_refs: Vec::new(),
            first_seen: now,
            last_seen: now,
            emitted: false,
            synthesized: false,
        });
        entry.occurrences += 1;
        entry.last_seen = now;
        for id in [src, dst] {
            if entry.node_refs.len() < PATTERN_REF_CAP && !entry.node_refs.contains(&id) {
                entry.node_refs.push(id);
            }
        }

        let strength = (entry.occurrences as f64 / 10.0).min(1.0);
        if !entry.emitted && entry.occurrences as f64 / 10.0 > self.threshold {
            entry.emitted = true;
            debug!(%key, occurrences = entry.occurrences, "pattern crossed threshold");
            return Some(Self::materialize(&key, entry, strength));
        }
        None
    }

    fn materialize(key: &str, entry: &PatternEntry, strength: f64) -> Pattern {
        Pattern {
            id: entry.id,
            structural_key: key.to_string(),
            node_refs: entry.node_refs.clone(),
            strength,
            first_seen: entry.first_seen,
            last_seen: entry.last_seen,
            occurrences: entry.occurrences,
        }
    }

    /// All tracked patterns, strongest first
    pub fn patterns(&self) -> Vec<Pattern> {
        let mut out: Vec<Pattern> = self
            .entries
            .iter()
            .map(|(key, entry)| {
                Self::materialize(key, entry, (entry.occurrences as f64 / 10.0).min(1.0))
            })
            .collect();
        out.sort_by(|a, b| {
            b.strength
                .partial_cmp(&a.strength)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.structural_key.cmp(&b.structural_key))
        });
        out
    }

    pub fn strong(&self, min_strength: f64) -> Vec<Pattern> {
        self.patterns()
            .into_iter()
            .filter(|p| p.strength > min_strength)
            .collect()
    }

    fn take_unsynthesized(&mut self, min_strength: f64) -> Vec<Pattern> {
        let mut out = Vec::new();
        for (key, entry) in self.entries.iter_mut() {
            let strength = (entry.occurrences as f64 / 10.0).min(1.0);
            if strength > min_strength && !entry.synthesized {
                entry.synthesized = true;
                out.push(Self::materialize(key, entry, strength));
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The memory graph
pub struct Hypergraph {
    nodes: HashMap<NodeId, HypergraphNode>,
    edges: HashMap<EdgeKey, HypergraphEdge>,
    patterns: PatternTracker,
}

impl Hypergraph {
    pub fn new(pattern_threshold: f64) -> Self {
        Self {
            nodes: HashMap::new(),
            edges: HashMap::new(),
            patterns: PatternTracker::new(pattern_threshold),
        }
    }

    // === Nodes ===

    pub fn add_node(&mut self, node: HypergraphNode) -> NodeId {
        let id = node.id;
        self.nodes.insert(id, node);
        id
    }

    pub fn node(&self, id: &NodeId) -> Option<&HypergraphNode> {
        self.nodes.get(id)
    }

    pub fn touch_node(&mut self, id: &NodeId) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.touch();
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Nodes of the given type (case-insensitive)
    pub fn nodes_of_type(&self, node_type: &str) -> Vec<&HypergraphNode> {
        self.nodes
            .values()
            .filter(|n| n.node_type.eq_ignore_ascii_case(node_type))
            .collect()
    }

    /// Most recently created nodes of a type, newest first
    pub fn recent_nodes_of_type(&self, node_type: &str, n: usize) -> Vec<NodeId> {
        let mut nodes = self.nodes_of_type(node_type);
        nodes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        nodes.into_iter().take(n).map(|n| n.id).collect()
    }

    /// Content search via the pluggable similarity function, best first
    pub fn search_by_content(&self, query: &str, similarity: &dyn Similarity) -> Vec<(NodeId, f64)> {
        let mut hits: Vec<(NodeId, f64)> = self
            .nodes
            .values()
            .filter_map(|n| {
                let score = similarity.score(&n.content, query);
                (score > 0.0).then_some((n.id, score))
            })
            .collect();
        hits.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        hits
    }

    // === Edges ===

    /// Add an edge, counting its structural key. An existing edge is
    /// traversed (weight kept at the max) instead of duplicated. Returns a
    /// pattern the first time the key crosses the detection threshold.
    pub fn add_edge(
        &mut self,
        src: NodeId,
        dst: NodeId,
        relation: EdgeRelation,
        weight: f64,
    ) -> Option<Pattern> {
        if !self.nodes.contains_key(&src) || !self.nodes.contains_key(&dst) {
            debug!(%src, %dst, "add_edge: endpoint missing, ignoring");
            return None;
        }
        let key = (src, dst, relation);
        if let Some(edge) = self.edges.get_mut(&key) {
            edge.traversal_count += 1;
            edge.weight = edge.weight.max(weight.clamp(0.0, 1.0));
            return None;
        }

        let structural_key = format!(
            "{}-{}",
            self.nodes[&src].node_type, self.nodes[&dst].node_type
        );
        self.edges
            .insert(key, HypergraphEdge::new(src, dst, relation, weight));
        self.patterns.record(structural_key, src, dst)
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edge(&self, src: &NodeId, dst: &NodeId, relation: EdgeRelation) -> Option<&HypergraphEdge> {
        self.edges.get(&(*src, *dst, relation))
    }

    /// Mark an edge traversed
    pub fn traverse(&mut self, src: &NodeId, dst: &NodeId, relation: EdgeRelation) {
        if let Some(edge) = self.edges.get_mut(&(*src, *dst, relation)) {
            edge.traversal_count += 1;
        }
        self.touch_node(src);
        self.touch_node(dst);
    }

    // === Patterns ===

    pub fn patterns(&self) -> Vec<Pattern> {
        self.patterns.patterns()
    }

    pub fn strong_patterns(&self, min_strength: f64) -> Vec<Pattern> {
        self.patterns.strong(min_strength)
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    // === Consolidation primitives (driven by the async pass) ===

    /// Raise every edge weight by `alpha * traversal_count / max_traversal`
    pub fn strengthen(&mut self, alpha: f64) -> usize {
        let max_traversal = self
            .edges
            .values()
            .map(|e| e.traversal_count)
            .max()
            .unwrap_or(0);
        if max_traversal == 0 {
            return 0;
        }
        let mut strengthened = 0;
        for edge in self.edges.values_mut() {
            if edge.traversal_count > 0 {
                let boost = alpha * edge.traversal_count as f64 / max_traversal as f64;
                edge.weight = (edge.weight + boost).min(1.0);
                strengthened += 1;
            }
        }
        strengthened
    }

    /// Decay a chunk of edges by `(1 - delta)`; `range` indexes into the
    /// sorted key list so callers can chunk the pass
    pub fn decay_chunk(&mut self, keys: &[EdgeKey], delta: f64) -> usize {
        let mut decayed = 0;
        for key in keys {
            if let Some(edge) = self.edges.get_mut(key) {
                edge.weight *= 1.0 - delta;
                decayed += 1;
            }
        }
        decayed
    }

    pub fn decay_all(&mut self, delta: f64) -> usize {
        let keys = self.edge_keys();
        self.decay_chunk(&keys, delta)
    }

    pub fn edge_keys(&self) -> Vec<EdgeKey> {
        self.edges.keys().copied().collect()
    }

    /// Drop edges below the weight threshold, then nodes with no remaining
    /// edges. Returns `(edges_removed, nodes_removed)`.
    pub fn prune(&mut self, weight_threshold: f64) -> (usize, usize) {
        let before_edges = self.edges.len();
        self.edges.retain(|_, e| e.weight >= weight_threshold);
        let edges_removed = before_edges - self.edges.len();

        let mut connected: std::collections::HashSet<NodeId> = std::collections::HashSet::new();
        for (src, dst, _) in self.edges.keys() {
            connected.insert(*src);
            connected.insert(*dst);
        }
        let before_nodes = self.nodes.len();
        self.nodes.retain(|id, _| connected.contains(id));
        let nodes_removed = before_nodes - self.nodes.len();

        debug!(edges_removed, nodes_removed, "prune complete");
        (edges_removed, nodes_removed)
    }

    /// Create insight nodes for strong patterns not yet synthesized,
    /// connected by `Synthesizes` edges to the pattern's constituents
    pub fn synthesize(&mut self, min_strength: f64) -> Vec<NodeId> {
        let ready = self.patterns.take_unsynthesized(min_strength);
        let mut created = Vec::new();
        for pattern in ready {
            let node = HypergraphNode::new(
                "insight",
                format!(
                    "recurring structure {} ({} occurrences)",
                    pattern.structural_key, pattern.occurrences
                ),
            );
            let insight_id = self.add_node(node);
            for constituent in &pattern.node_refs {
                if self.nodes.contains_key(constituent) {
                    self.add_edge(
                        insight_id,
                        *constituent,
                        EdgeRelation::Synthesizes,
                        pattern.strength,
                    );
                }
            }
            created.push(insight_id);
        }
        created
    }
}
