//! Observable metrics, exported by name
//!
//! Lock-free counters updated by the components that own the numbers; the
//! export call assembles the full named map, folding in bus and hypergraph
//! observables at read time.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Instant;

use crate::domain::{EngineId, WakeState};
use crate::events::{EventBus, Topic};
use crate::hypergraph::Hypergraph;

fn to_milli(value: f64) -> u64 {
    (value.clamp(0.0, 1.0) * 1000.0).round() as u64
}

#[derive(Debug)]
pub struct CoreMetrics {
    cycle_count: AtomicU64,
    current_step: AtomicU64,
    fatigue_milli: AtomicU64,
    coherence_milli: AtomicU64,
    tasks_processed: [AtomicU64; 3],
    queue_depth: [AtomicU64; 3],
    failed_steps: [AtomicU64; 3],
    patterns_detected: AtomicU64,
    wake_state: AtomicU64,
    last_snapshot: RwLock<Option<Instant>>,
}

impl CoreMetrics {
    pub fn new() -> Self {
        Self {
            cycle_count: AtomicU64::new(0),
            current_step: AtomicU64::new(1),
            fatigue_milli: AtomicU64::new(0),
            coherence_milli: AtomicU64::new(1000),
            tasks_processed: std::array::from_fn(|_| AtomicU64::new(0)),
            queue_depth: std::array::from_fn(|_| AtomicU64::new(0)),
            failed_steps: std::array::from_fn(|_| AtomicU64::new(0)),
            patterns_detected: AtomicU64::new(0),
            wake_state: AtomicU64::new(WakeState::Initializing.ordinal() as u64),
            last_snapshot: RwLock::new(None),
        }
    }

    pub fn record_engine_step(&self, id: EngineId, queue_depth: usize) {
        self.tasks_processed[id.index()].fetch_add(1, Ordering::Relaxed);
        self.queue_depth[id.index()].store(queue_depth as u64, Ordering::Relaxed);
    }

    pub fn record_failed_step(&self, id: EngineId) {
        self.failed_steps[id.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_loop(&self, cycle_count: u64, current_step: u8, fatigue: f64, coherence: f64) {
        self.cycle_count.store(cycle_count, Ordering::Relaxed);
        self.current_step.store(current_step as u64, Ordering::Relaxed);
        self.fatigue_milli.store(to_milli(fatigue), Ordering::Relaxed);
        self.coherence_milli.store(to_milli(coherence), Ordering::Relaxed);
    }

    pub fn set_wake(&self, state: WakeState) {
        self.wake_state.store(state.ordinal() as u64, Ordering::Relaxed);
    }

    pub fn record_pattern(&self) {
        self.patterns_detected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_snapshot(&self) {
        *self.last_snapshot.write().unwrap() = Some(Instant::now());
    }

    pub fn tasks_processed(&self, id: EngineId) -> u64 {
        self.tasks_processed[id.index()].load(Ordering::Relaxed)
    }

    pub fn failed_steps(&self, id: EngineId) -> u64 {
        self.failed_steps[id.index()].load(Ordering::Relaxed)
    }

    pub fn cycle_count(&self) -> u64 {
        self.cycle_count.load(Ordering::Relaxed)
    }

    /// Full named export. Bus and hypergraph observables are read live.
    pub fn export(&self, bus: &EventBus, graph: &std::sync::RwLock<Hypergraph>) -> BTreeMap<String, f64> {
        let mut out = BTreeMap::new();
        out.insert("cycle_count".into(), self.cycle_count.load(Ordering::Relaxed) as f64);
        out.insert(
            "current_step".into(),
            self.current_step.load(Ordering::Relaxed) as f64,
        );
        out.insert(
            "fatigue".into(),
            self.fatigue_milli.load(Ordering::Relaxed) as f64 / 1000.0,
        );
        out.insert(
            "coherence".into(),
            self.coherence_milli.load(Ordering::Relaxed) as f64 / 1000.0,
        );
        for id in EngineId::ALL {
            let n = id.number();
            out.insert(
                format!("engine_{}_tasks_processed", n),
                self.tasks_processed[id.index()].load(Ordering::Relaxed) as f64,
            );
            out.insert(
                format!("engine_{}_queue_depth", n),
                self.queue_depth[id.index()].load(Ordering::Relaxed) as f64,
            );
            out.insert(
                format!("engine_{}_failed_steps", n),
                self.failed_steps[id.index()].load(Ordering::Relaxed) as f64,
            );
        }
        for topic in Topic::ALL {
            out.insert(
                format!("bus_drop_count_by_topic.{}", topic.as_str()),
                bus.drop_count(topic) as f64,
            );
        }
        {
            let graph = graph.read().unwrap();
            out.insert("hypergraph_nodes".into(), graph.node_count() as f64);
            out.insert("hypergraph_edges".into(), graph.edge_count() as f64);
        }
        out.insert(
            "patterns_detected".into(),
            self.patterns_detected.load(Ordering::Relaxed) as f64,
        );
        out.insert(
            "wake_state".into(),
            self.wake_state.load(Ordering::Relaxed) as f64,
        );
        let snapshot_age = self
            .last_snapshot
            .read()
            .unwrap()
            .map(|at| at.elapsed().as_secs_f64())
            .unwrap_or(f64::INFINITY);
        out.insert("snapshot_age_seconds".into(), snapshot_age);
        out
    }
}

impl Default for CoreMetrics {
    fn default() -> Self {
        Self::new()
    }
}
