//! CognitiveCore - construction, wiring and the control surface
//!
//! `CognitiveCore::start` builds every component from an explicit config
//! value (no ambient singletons), restores state from the latest snapshot,
//! and spawns the task set. The returned handle is the only way to drive
//! the core from outside: injected events go through the bus like
//! everything else.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use eyre::{Context, Result};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::clock::spawn_phase_clock;
use crate::config::Config;
use crate::cycle::{Orchestrator, OrchestratorConfig};
use crate::domain::{EngineId, EngineState, GoalStatus, LoopState, WakeState};
use crate::engine::{EngineContext, EngineHandle, InferenceEngine, InferenceTask};
use crate::events::{spawn_event_logger, CognitiveEvent, EventBus, Subscription, Topic};
use crate::hypergraph::{Hypergraph, HypergraphIntegrator, IntegratorConfig};
use crate::metrics::CoreMetrics;
use crate::providers::{OpenAiProvider, ProviderRegistry};
use crate::registry::Registries;
use crate::snapshot::{
    LoadOutcome, SnapshotRequest, SnapshotSources, SnapshotStore, Snapshotter,
};
use crate::stream::{ConsciousnessStream, RecentThoughts};
use crate::wake::WakeMachine;

/// A running cognitive core
pub struct CognitiveCore {
    bus: Arc<EventBus>,
    metrics: Arc<CoreMetrics>,
    registries: Arc<Registries>,
    graph: Arc<RwLock<Hypergraph>>,
    engines: Vec<EngineHandle>,
    loop_rx: watch::Receiver<LoopState>,
    wake_rx: watch::Receiver<WakeState>,
    shutdown_tx: watch::Sender<bool>,
    pause_tx: watch::Sender<bool>,
    snapshot_tx: mpsc::Sender<SnapshotRequest>,
    tasks: Vec<tokio::task::JoinHandle<()>>,
    step_duration: Duration,
}

impl CognitiveCore {
    /// Build and start the whole core from config
    pub async fn start(config: Config) -> Result<Self> {
        let step_duration = config.step_duration();
        info!(?step_duration, "starting cognitive core");

        // Restore whatever the last run left behind
        let store = SnapshotStore::new(config.snapshot_path());
        let restored = match store.load() {
            LoadOutcome::Loaded(snapshot) => Some(*snapshot),
            LoadOutcome::RecoveredFromPrev(snapshot) => Some(*snapshot),
            LoadOutcome::Fresh => None,
        };

        let bus = Arc::new(EventBus::new(config.core.bus_capacity));
        let metrics = Arc::new(CoreMetrics::new());
        let registries = Registries::new(config.goal_stale_after());
        let graph = Arc::new(RwLock::new(Hypergraph::new(
            config.hypergraph.pattern_threshold,
        )));
        let recent = RecentThoughts::new(config.stream.context_thoughts.max(10));
        let context_data = Arc::new(RwLock::new(serde_json::Map::new()));

        let initial_loop = match &restored {
            Some(snapshot) => {
                info!(
                    cycle_count = snapshot.loop_state.cycle_count,
                    "resuming from snapshot"
                );
                registries.goals.restore(snapshot.goals.clone());
                registries.skills.restore(snapshot.skills.clone());
                registries.interests.restore(snapshot.interests.clone());
                recent.restore(snapshot.recent_thoughts.clone());
                let mut state = snapshot.loop_state.clone();
                state.step_duration = step_duration;
                state
            }
            None => LoopState::new(step_duration),
        };

        // Provider chain; a missing key skips the provider, never the start
        let mut providers = ProviderRegistry::new(config.provider_cooldown(), step_duration * 2);
        for provider_config in &config.providers.chain {
            match OpenAiProvider::from_config(provider_config) {
                Ok(provider) => providers.push(Arc::new(provider)),
                Err(e) => warn!(name = %provider_config.name, error = %e, "provider skipped"),
            }
        }
        let providers = Arc::new(providers);

        // Shared channels
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (pause_tx, pause_rx) = watch::channel(false);
        let (rate_tx, rate_rx) = watch::channel(1.0);
        let (loop_tx, loop_rx) = watch::channel(initial_loop.clone());
        let (wake_tx, wake_rx) = watch::channel(WakeState::Initializing);
        let (report_tx, report_rx) = mpsc::channel(64);
        let (snapshot_tx, snapshot_rx) = mpsc::channel(8);

        let engine_states: Arc<RwLock<HashMap<EngineId, EngineState>>> =
            Arc::new(RwLock::new(HashMap::new()));

        let mut tasks = Vec::new();

        // Engines
        let mut engines = Vec::new();
        for id in EngineId::ALL {
            let ctx = EngineContext {
                bus: Arc::clone(&bus),
                providers: Arc::clone(&providers),
                registries: Arc::clone(&registries),
                graph: Arc::clone(&graph),
                context_data: Arc::clone(&context_data),
                loop_state: loop_rx.clone(),
            };
            let (handle, task) = InferenceEngine::spawn(
                id,
                ctx,
                Arc::clone(&engine_states),
                Arc::clone(&metrics),
                step_duration,
                report_tx.clone(),
            );
            engines.push(handle);
            tasks.push(task);
        }

        // Clock feeding the orchestrator
        let tick_rx = spawn_phase_clock(step_duration, rate_rx, shutdown_rx.clone());
        let orchestrator = Orchestrator::new(
            OrchestratorConfig {
                step_duration,
                fatigue: config.fatigue_config(),
            },
            initial_loop,
            loop_tx,
            engines.clone(),
            tick_rx,
            report_rx,
            Arc::clone(&bus),
            Arc::clone(&metrics),
            wake_rx.clone(),
            pause_rx,
            shutdown_rx.clone(),
        );
        tasks.push(orchestrator.spawn());

        // Wake machine
        let wake_machine = WakeMachine::new(
            config.wake_config(),
            Arc::clone(&bus),
            wake_tx,
            rate_tx,
            Arc::clone(&metrics),
        );
        tasks.push(wake_machine.spawn(shutdown_rx.clone()));

        // Stream of consciousness
        let stream = ConsciousnessStream::new(
            config.stream_config(),
            Arc::clone(&bus),
            Arc::clone(&providers),
            Arc::clone(&registries),
            Arc::clone(&recent),
            loop_rx.clone(),
            wake_rx.clone(),
        );
        tasks.push(stream.spawn(shutdown_rx.clone()));
        tasks.push(recent.spawn_collector(&bus, shutdown_rx.clone()));

        // Hypergraph integrator
        let integrator = HypergraphIntegrator::new(
            Arc::clone(&graph),
            Arc::clone(&bus),
            IntegratorConfig {
                consolidation: config.consolidation_config(),
            },
        )
        .with_metrics(Arc::clone(&metrics));
        tasks.push(integrator.spawn(shutdown_rx.clone()));

        // Snapshotter
        let snapshotter = Snapshotter::new(
            store,
            SnapshotSources {
                loop_rx: loop_rx.clone(),
                wake_rx: wake_rx.clone(),
                registries: Arc::clone(&registries),
                graph: Arc::clone(&graph),
                engine_states: Arc::clone(&engine_states),
                recent: Arc::clone(&recent),
            },
            config.snapshot_interval(),
            Arc::clone(&bus),
            Arc::clone(&metrics),
        );
        tasks.push(snapshotter.spawn(snapshot_rx, shutdown_rx.clone()));

        // Router: external events and registry upkeep
        tasks.push(spawn_router(
            Arc::clone(&bus),
            Arc::clone(&registries),
            engines.clone(),
            config.goal_stale_after(),
            shutdown_rx.clone(),
        ));

        // Optional activity log
        if let Some(path) = &config.logging.activity_log {
            tasks.push(spawn_event_logger(&bus, path.clone(), shutdown_rx.clone()));
        }

        info!(tasks = tasks.len(), "cognitive core started");
        Ok(Self {
            bus,
            metrics,
            registries,
            graph,
            engines,
            loop_rx,
            wake_rx,
            shutdown_tx,
            pause_tx,
            snapshot_tx,
            tasks,
            step_duration,
        })
    }

    /// Graceful stop: final snapshot, then fan out the shutdown signal and
    /// give the task set a 2xD quiescence window
    pub async fn stop(self) -> Result<()> {
        info!("stopping cognitive core");
        let _ = self.snapshot_now().await;
        let _ = self.shutdown_tx.send(true);

        let quiescence = self.step_duration * 2;
        if tokio::time::timeout(quiescence, futures::future::join_all(self.tasks))
            .await
            .is_err()
        {
            debug!("some tasks exceeded the quiescence window");
        }
        info!("cognitive core stopped");
        Ok(())
    }

    /// Pause loop advancement (the clock keeps running; ticks are ignored)
    pub fn pause(&self) {
        debug!("pause");
        let _ = self.pause_tx.send(true);
    }

    pub fn resume(&self) {
        debug!("resume");
        let _ = self.pause_tx.send(false);
    }

    /// Force a snapshot and wait for the write to land
    pub async fn snapshot_now(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.snapshot_tx
            .send(reply_tx)
            .await
            .map_err(|_| eyre::eyre!("snapshotter is gone"))?;
        reply_rx.await.context("snapshotter dropped the request")?
    }

    /// The sole sanctioned way to drive the core from outside
    pub fn inject_event(&self, event: CognitiveEvent) {
        debug!(kind = %event.kind, event_id = %event.id, "inject_event");
        self.bus.publish(event);
    }

    pub fn subscribe(&self, topic: Topic) -> Subscription {
        self.bus.subscribe(topic)
    }

    pub fn loop_state(&self) -> LoopState {
        self.loop_rx.borrow().clone()
    }

    pub fn wake_state(&self) -> WakeState {
        *self.wake_rx.borrow()
    }

    pub fn metrics(&self) -> BTreeMap<String, f64> {
        self.metrics.export(&self.bus, &self.graph)
    }

    pub fn registries(&self) -> &Arc<Registries> {
        &self.registries
    }

    pub fn engine_count(&self) -> usize {
        self.engines.len()
    }
}

/// Routes externally injected events into the engines and registries, and
/// sweeps stale goals on a timer
fn spawn_router(
    bus: Arc<EventBus>,
    registries: Arc<Registries>,
    engines: Vec<EngineHandle>,
    goal_stale_after: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    let mut external = bus.subscribe(Topic::ExternalMessage);
    let mut practice = bus.subscribe(Topic::SkillPractice);
    let mut goal_updates = bus.subscribe(Topic::GoalUpdate);
    let sweep_every = goal_stale_after.min(Duration::from_secs(60)).max(Duration::from_millis(100));

    tokio::spawn(async move {
        // External messages land on the coherence engine: they are present-
        // moment input
        let coherence_engine = engines
            .iter()
            .find(|e| e.id == EngineId::E2)
            .cloned();

        loop {
            tokio::select! {
                event = external.recv() => match event {
                    Some(event) => {
                        debug!(event_id = %event.id, "routing external message to E2");
                        if let Some(engine) = &coherence_engine {
                            engine
                                .inject(InferenceTask::external(event.payload.clone(), event.priority))
                                .await;
                        }
                    }
                    None => break,
                },
                event = practice.recv() => match event {
                    Some(event) => {
                        let name = event.payload.get("name").and_then(|v| v.as_str());
                        let quality = event
                            .payload
                            .get("quality")
                            .and_then(|v| v.as_f64())
                            .unwrap_or(0.5);
                        if let Some(name) = name {
                            let skill = registries.skills.practice(name, quality);
                            debug!(%name, proficiency = skill.proficiency, "skill practiced");
                        }
                    }
                    None => break,
                },
                event = goal_updates.recv() => match event {
                    Some(event) => {
                        // Explicit completion events flip the goal status
                        let to = event.payload.get("to").and_then(|v| v.as_str());
                        let goal_id = event
                            .payload
                            .get("goal_id")
                            .and_then(|v| v.as_str())
                            .and_then(|s| s.parse().ok());
                        if let (Some("completed"), Some(goal_id)) = (to, goal_id) {
                            registries.goals.set_status(&goal_id, GoalStatus::Completed);
                        }
                    }
                    None => break,
                },
                _ = tokio::time::sleep(sweep_every) => {
                    for goal in registries.goals.sweep_stale() {
                        bus.publish(CognitiveEvent::goal_update(
                            goal.id,
                            &goal.name,
                            GoalStatus::Pursuing.as_str(),
                            goal.status.as_str(),
                        ));
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("router stopped");
    })
}
