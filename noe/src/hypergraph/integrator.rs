//! Hypergraph Integrator - the bus consumer that grows the memory graph
//!
//! Subscribes to thoughts, goal updates and dream insights. All writes to
//! the graph are serialized through this task; everyone else reads through
//! the shared lock. Consolidation runs here when the wake machine enters
//! Dreaming, and its completion is published as wisdom.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, RwLock};

use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{EdgeRelation, HypergraphNode, NodeId, Thought, ThoughtId, ThoughtKind, WakeState};
use crate::events::{CognitiveEvent, EventBus, Topic};

use super::consolidate::{consolidate, ConsolidationConfig};
use super::graph::{Hypergraph, Similarity, SubstringSimilarity};

/// Recall edges created per reflection
const MAX_RECALL_EDGES: usize = 5;

/// Remembered event ids for idempotent redelivery
const SEEN_WINDOW: usize = 4096;

/// Remembered thought-id to node-id mappings
const THOUGHT_MAP_WINDOW: usize = 8192;

pub struct IntegratorConfig {
    pub consolidation: ConsolidationConfig,
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self {
            consolidation: ConsolidationConfig::default(),
        }
    }
}

/// Bounded insert-ordered id set
struct SeenIds {
    order: VecDeque<Uuid>,
    set: HashSet<Uuid>,
    cap: usize,
}

impl SeenIds {
    fn new(cap: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(cap),
            set: HashSet::with_capacity(cap),
            cap,
        }
    }

    /// Returns false if the id was already present
    fn insert(&mut self, id: Uuid) -> bool {
        if !self.set.insert(id) {
            return false;
        }
        self.order.push_back(id);
        if self.order.len() > self.cap {
            if let Some(evicted) = self.order.pop_front() {
                self.set.remove(&evicted);
            }
        }
        true
    }
}

pub struct HypergraphIntegrator {
    graph: Arc<RwLock<Hypergraph>>,
    bus: Arc<EventBus>,
    similarity: Arc<dyn Similarity>,
    config: IntegratorConfig,
    seen: SeenIds,
    thought_nodes: HashMap<ThoughtId, NodeId>,
    thought_node_order: VecDeque<ThoughtId>,
    metrics: Option<Arc<crate::metrics::CoreMetrics>>,
}

impl HypergraphIntegrator {
    pub fn new(graph: Arc<RwLock<Hypergraph>>, bus: Arc<EventBus>, config: IntegratorConfig) -> Self {
        Self {
            graph,
            bus,
            similarity: Arc::new(SubstringSimilarity),
            config,
            seen: SeenIds::new(SEEN_WINDOW),
            thought_nodes: HashMap::new(),
            thought_node_order: VecDeque::new(),
            metrics: None,
        }
    }

    pub fn with_similarity(mut self, similarity: Arc<dyn Similarity>) -> Self {
        self.similarity = similarity;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<crate::metrics::CoreMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Spawn the integrator task
    pub fn spawn(mut self, mut shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        debug!("HypergraphIntegrator::spawn");
        let mut thoughts = self.bus.subscribe(Topic::Thought);
        let mut goal_updates = self.bus.subscribe(Topic::GoalUpdate);
        let mut insights = self.bus.subscribe(Topic::DreamInsight);
        let mut state_changes = self.bus.subscribe(Topic::StateChange);
        // Consolidation polls its own handle so the select arm keeps the
        // original receiver to itself
        let consolidation_shutdown = shutdown.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = thoughts.recv() => match event {
                        Some(event) => self.on_thought_event(event),
                        None => break,
                    },
                    event = goal_updates.recv() => match event {
                        Some(event) => self.on_goal_update(event),
                        None => break,
                    },
                    event = insights.recv() => match event {
                        Some(event) => self.on_dream_insight(event),
                        None => break,
                    },
                    event = state_changes.recv() => match event {
                        Some(event) => {
                            if let Some((_, WakeState::Dreaming)) = event.as_state_change() {
                                self.run_consolidation(&consolidation_shutdown).await;
                            }
                        }
                        None => break,
                    },
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("integrator stopped");
        })
    }

    fn remember_thought_node(&mut self, thought_id: ThoughtId, node_id: NodeId) {
        self.thought_nodes.insert(thought_id, node_id);
        self.thought_node_order.push_back(thought_id);
        if self.thought_node_order.len() > THOUGHT_MAP_WINDOW {
            if let Some(evicted) = self.thought_node_order.pop_front() {
                self.thought_nodes.remove(&evicted);
            }
        }
    }

    fn on_thought_event(&mut self, event: CognitiveEvent) {
        if !self.seen.insert(event.id) {
            debug!(event_id = %event.id, "duplicate thought event, ignoring");
            return;
        }
        let Some(thought) = event.as_thought() else {
            warn!(event_id = %event.id, "thought event with undecodable payload");
            return;
        };
        self.integrate_thought(&thought);
    }

    /// Add a node for the thought and wire it in per its kind
    pub fn integrate_thought(&mut self, thought: &Thought) {
        debug!(thought_id = %thought.id, kind = thought.kind.as_str(), "integrate_thought");
        let mut patterns = Vec::new();
        {
            let mut graph = self.graph.write().unwrap();
            let node = {
                let mut n = HypergraphNode::new(thought.kind.node_type(), thought.content.clone());
                n.activation = thought.salience;
                n
            };
            let node_id = graph.add_node(node);

            match thought.kind {
                ThoughtKind::Reflection => {
                    let targets = graph.recent_nodes_of_type("memory", MAX_RECALL_EDGES + 1);
                    for target in targets.into_iter().filter(|t| *t != node_id).take(MAX_RECALL_EDGES) {
                        let score = graph
                            .node(&target)
                            .map(|n| self.similarity.score(&thought.content, &n.content))
                            .unwrap_or(0.0);
                        let weight = if score > 0.0 { score } else { 0.5 };
                        patterns.extend(graph.add_edge(node_id, target, EdgeRelation::Recalls, weight));
                    }
                }
                ThoughtKind::Question => {
                    let gaps = graph.recent_nodes_of_type("knowledge_gap", usize::MAX);
                    for gap in gaps {
                        patterns.extend(graph.add_edge(node_id, gap, EdgeRelation::Addresses, 0.8));
                    }
                }
                ThoughtKind::Insight => {
                    for assoc in &thought.associations {
                        if let Some(target) = self.thought_nodes.get(assoc).copied() {
                            patterns.extend(graph.add_edge(
                                node_id,
                                target,
                                EdgeRelation::Integrates,
                                0.9,
                            ));
                        }
                    }
                }
                ThoughtKind::MetaCognitive => {
                    let processes = graph.recent_nodes_of_type("cognitive_process", usize::MAX);
                    for process in processes {
                        patterns.extend(graph.add_edge(
                            node_id,
                            process,
                            EdgeRelation::ReflectsOn,
                            0.7,
                        ));
                    }
                }
                _ => {}
            }

            drop(graph);
            self.remember_thought_node(thought.id, node_id);
        }

        // Publish outside the lock; mark our own events seen so the
        // subscription loop does not re-process them
        for pattern in patterns {
            let event = CognitiveEvent::dream_insight(&pattern);
            self.seen.insert(event.id);
            if let Some(metrics) = &self.metrics {
                metrics.record_pattern();
            }
            info!(key = %pattern.structural_key, strength = pattern.strength, "pattern detected");
            self.bus.publish(event);
        }
    }

    fn on_goal_update(&mut self, event: CognitiveEvent) {
        if !self.seen.insert(event.id) {
            return;
        }
        let Some(name) = event.payload.get("name").and_then(|v| v.as_str()) else {
            return;
        };
        debug!(%name, "goal update landing in graph");
        let mut graph = self.graph.write().unwrap();
        let existing = graph
            .nodes_of_type("goal")
            .iter()
            .find(|n| n.content == name)
            .map(|n| n.id);
        match existing {
            Some(id) => graph.touch_node(&id),
            None => {
                graph.add_node(HypergraphNode::new("goal", name));
            }
        }
    }

    fn on_dream_insight(&mut self, event: CognitiveEvent) {
        if !self.seen.insert(event.id) {
            return;
        }
        let Some(pattern) = event.as_pattern() else {
            return;
        };
        let mut graph = self.graph.write().unwrap();
        for node in &pattern.node_refs {
            graph.touch_node(node);
        }
    }

    async fn run_consolidation(&mut self, shutdown: &watch::Receiver<bool>) {
        info!("dream consolidation starting");
        let stats = consolidate(&self.graph, self.config.consolidation, shutdown).await;
        let event = CognitiveEvent::wisdom_gained(serde_json::json!({
            "consolidation": serde_json::to_value(stats).unwrap_or_default(),
        }));
        self.seen.insert(event.id);
        self.bus.publish(event);
    }
}
