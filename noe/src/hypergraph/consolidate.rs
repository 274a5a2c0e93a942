//! Dream consolidation - strengthen, decay, prune, synthesize
//!
//! The only CPU-bound pass allowed to outlive a step duration. It runs only
//! during Dreaming, takes the graph write lock in bounded chunks, and yields
//! between chunks so a cancellation lands at a checkpoint with the partial
//! result already committed.

use std::sync::{Arc, RwLock};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info};

use super::graph::Hypergraph;

/// Nodes/edges processed per lock acquisition before yielding
const CHUNK: usize = 1_000;

#[derive(Debug, Clone, Copy)]
pub struct ConsolidationConfig {
    /// Strengthen boost coefficient
    pub alpha: f64,
    /// Decay factor per pass
    pub delta: f64,
    /// Edges below this weight are pruned
    pub prune_threshold: f64,
    /// Patterns above this strength are synthesized into insight nodes
    pub synthesis_threshold: f64,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            alpha: 0.1,
            delta: 0.05,
            prune_threshold: 0.05,
            synthesis_threshold: 0.7,
        }
    }
}

/// What a consolidation pass did; published as wisdom when it commits
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ConsolidationStats {
    pub strengthened: usize,
    pub decayed: usize,
    pub edges_pruned: usize,
    pub nodes_pruned: usize,
    pub insights_created: usize,
    /// True when cancellation stopped the pass at a checkpoint
    pub partial: bool,
}

/// Run one consolidation pass. Each phase commits before the next begins;
/// if shutdown flips between chunks the stats so far are returned with
/// `partial` set.
pub async fn consolidate(
    graph: &Arc<RwLock<Hypergraph>>,
    config: ConsolidationConfig,
    shutdown: &watch::Receiver<bool>,
) -> ConsolidationStats {
    debug!(?config, "consolidate: starting pass");
    let mut stats = ConsolidationStats::default();

    // Strengthen needs the global max traversal, so it runs in one
    // acquisition; graphs large enough to matter have already been pruned.
    stats.strengthened = graph.write().unwrap().strengthen(config.alpha);
    tokio::task::yield_now().await;
    if *shutdown.borrow() {
        stats.partial = true;
        return stats;
    }

    // Decay in chunks over a key snapshot
    let keys = graph.read().unwrap().edge_keys();
    for chunk in keys.chunks(CHUNK) {
        stats.decayed += graph.write().unwrap().decay_chunk(chunk, config.delta);
        tokio::task::yield_now().await;
        if *shutdown.borrow() {
            stats.partial = true;
            return stats;
        }
    }

    let (edges_pruned, nodes_pruned) = graph.write().unwrap().prune(config.prune_threshold);
    stats.edges_pruned = edges_pruned;
    stats.nodes_pruned = nodes_pruned;
    tokio::task::yield_now().await;
    if *shutdown.borrow() {
        stats.partial = true;
        return stats;
    }

    stats.insights_created = graph
        .write()
        .unwrap()
        .synthesize(config.synthesis_threshold)
        .len();

    info!(
        strengthened = stats.strengthened,
        decayed = stats.decayed,
        edges_pruned = stats.edges_pruned,
        nodes_pruned = stats.nodes_pruned,
        insights_created = stats.insights_created,
        "consolidation pass complete"
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EdgeRelation, HypergraphNode};

    fn seeded_graph() -> Arc<RwLock<Hypergraph>> {
        let mut g = Hypergraph::new(0.7);
        let a = g.add_node(HypergraphNode::new("memory", "a"));
        let b = g.add_node(HypergraphNode::new("memory", "b"));
        let c = g.add_node(HypergraphNode::new("memory", "c"));
        g.add_edge(a, b, EdgeRelation::Recalls, 0.8);
        g.add_edge(b, c, EdgeRelation::Recalls, 0.04);
        Arc::new(RwLock::new(g))
    }

    #[tokio::test]
    async fn test_consolidation_prunes_weak_edges() {
        let graph = seeded_graph();
        let (_tx, rx) = watch::channel(false);

        let before = graph.read().unwrap().edge_count();
        let stats = consolidate(&graph, ConsolidationConfig::default(), &rx).await;

        assert!(!stats.partial);
        assert!(stats.edges_pruned >= 1);
        assert!(graph.read().unwrap().edge_count() < before);
    }

    #[tokio::test]
    async fn test_consolidation_decays_surviving_edges() {
        let graph = seeded_graph();
        let (_tx, rx) = watch::channel(false);

        consolidate(&graph, ConsolidationConfig::default(), &rx).await;

        let g = graph.read().unwrap();
        let keys = g.edge_keys();
        for (src, dst, rel) in keys {
            let w = g.edge(&src, &dst, rel).unwrap().weight;
            assert!(w < 0.8, "edge weight {} not decayed", w);
        }
    }

    #[tokio::test]
    async fn test_cancelled_consolidation_reports_partial() {
        let graph = seeded_graph();
        let (tx, rx) = watch::channel(true);
        let _ = tx; // already flipped before the pass starts

        let stats = consolidate(&graph, ConsolidationConfig::default(), &rx).await;
        assert!(stats.partial);
        // Strengthen committed before the checkpoint noticed shutdown
        assert_eq!(stats.edges_pruned, 0);
    }
}
