//! Hypergraph memory - graph store, integrator and dream consolidation
//!
//! The graph is the agent's long-term associative memory. The integrator
//! task is its single writer; engines and the snapshotter read through the
//! shared lock. During Dreaming the consolidation pass strengthens, decays,
//! prunes and synthesizes.

mod consolidate;
mod graph;
mod integrator;

pub use consolidate::{consolidate, ConsolidationConfig, ConsolidationStats};
pub use graph::{EdgeKey, Hypergraph, PatternTracker, Similarity, SubstringSimilarity};
pub use integrator::{HypergraphIntegrator, IntegratorConfig};
