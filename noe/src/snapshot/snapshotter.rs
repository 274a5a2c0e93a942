//! Snapshotter task - periodic and event-driven state capture
//!
//! Writes on the configured interval, on entering Resting or Shutdown, and
//! on demand from the control surface. An unwritable target keeps state in
//! memory and retries with exponential backoff up to a ceiling.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::domain::{EngineId, EngineState, LoopState, WakeState};
use crate::events::{EventBus, Topic};
use crate::hypergraph::Hypergraph;
use crate::metrics::CoreMetrics;
use crate::registry::Registries;
use crate::stream::RecentThoughts;

use super::store::{CoreSnapshot, HypergraphSummary, SnapshotStore, SCHEMA_VERSION};

/// Patterns carried in the hypergraph summary
const TOP_PATTERNS: usize = 10;

/// Wall-clock budget for one snapshot write
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Backoff bounds for unwritable targets
const BACKOFF_INITIAL: Duration = Duration::from_secs(1);
const BACKOFF_CEILING: Duration = Duration::from_secs(60);

/// A demand-write request; the reply reports success
pub type SnapshotRequest = oneshot::Sender<eyre::Result<()>>;

/// Read handles over every mutable surface a snapshot captures
pub struct SnapshotSources {
    pub loop_rx: watch::Receiver<LoopState>,
    pub wake_rx: watch::Receiver<WakeState>,
    pub registries: Arc<Registries>,
    pub graph: Arc<RwLock<Hypergraph>>,
    pub engine_states: Arc<RwLock<HashMap<EngineId, EngineState>>>,
    pub recent: Arc<RecentThoughts>,
}

impl SnapshotSources {
    /// Assemble a snapshot from the current state of every surface
    pub fn collect(&self) -> CoreSnapshot {
        let mut engine_states: Vec<EngineState> =
            self.engine_states.read().unwrap().values().cloned().collect();
        engine_states.sort_by_key(|s| s.id.number());

        let (node_count, edge_count, top_patterns) = {
            let graph = self.graph.read().unwrap();
            let mut patterns = graph.patterns();
            patterns.truncate(TOP_PATTERNS);
            (graph.node_count(), graph.edge_count(), patterns)
        };

        CoreSnapshot {
            schema_version: SCHEMA_VERSION,
            taken_at: Utc::now(),
            loop_state: self.loop_rx.borrow().clone(),
            engine_states,
            wake_state: *self.wake_rx.borrow(),
            goals: self.registries.goals.export(),
            skills: self.registries.skills.export(),
            interests: self.registries.interests.export(),
            recent_thoughts: self.recent.to_vec(),
            hypergraph_summary: HypergraphSummary {
                node_count,
                edge_count,
                top_patterns,
            },
        }
    }
}

pub struct Snapshotter {
    store: SnapshotStore,
    sources: SnapshotSources,
    interval: Duration,
    bus: Arc<EventBus>,
    metrics: Arc<CoreMetrics>,
}

impl Snapshotter {
    pub fn new(
        store: SnapshotStore,
        sources: SnapshotSources,
        interval: Duration,
        bus: Arc<EventBus>,
        metrics: Arc<CoreMetrics>,
    ) -> Self {
        Self {
            store,
            sources,
            interval,
            bus,
            metrics,
        }
    }

    pub fn spawn(
        self,
        request_rx: mpsc::Receiver<SnapshotRequest>,
        shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(request_rx, shutdown))
    }

    async fn run(
        self,
        mut request_rx: mpsc::Receiver<SnapshotRequest>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        debug!(interval = ?self.interval, "snapshotter started");
        let mut state_changes = self.bus.subscribe(Topic::StateChange);
        let mut next_periodic = Instant::now() + self.interval;
        let mut backoff: Option<(Duration, Instant)> = None;

        loop {
            let retry_at = backoff.map(|(_, at)| at).unwrap_or_else(|| {
                // No retry pending: park this arm well past the periodic one
                next_periodic + Duration::from_secs(3600)
            });

            tokio::select! {
                _ = tokio::time::sleep_until(next_periodic) => {
                    next_periodic = Instant::now() + self.interval;
                    let _ = self.write(&mut backoff).await;
                }
                _ = tokio::time::sleep_until(retry_at) => {
                    debug!("retrying snapshot after backoff");
                    let _ = self.write(&mut backoff).await;
                }
                event = state_changes.recv() => match event {
                    Some(event) => {
                        if let Some((_, to)) = event.as_state_change() {
                            if matches!(to, WakeState::Resting | WakeState::Shutdown) {
                                debug!(%to, "state change triggers snapshot");
                                let _ = self.write(&mut backoff).await;
                            }
                        }
                    }
                    None => break,
                },
                request = request_rx.recv() => match request {
                    Some(reply) => {
                        let result = self.write(&mut backoff).await;
                        let _ = reply.send(result);
                    }
                    None => break,
                },
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        // Final capture on the way out
                        let _ = self.write(&mut backoff).await;
                        break;
                    }
                }
            }
        }
        debug!("snapshotter stopped");
    }

    async fn write(&self, backoff: &mut Option<(Duration, Instant)>) -> eyre::Result<()> {
        let snapshot = self.sources.collect();
        let store = self.store.clone();

        let result = tokio::time::timeout(
            WRITE_TIMEOUT,
            tokio::task::spawn_blocking(move || store.save(&snapshot)),
        )
        .await;

        match result {
            Ok(Ok(Ok(()))) => {
                self.metrics.record_snapshot();
                if backoff.take().is_some() {
                    info!("snapshot target writable again");
                }
                Ok(())
            }
            Ok(Ok(Err(e))) => {
                let delay = Self::bump_backoff(backoff);
                warn!(error = %e, retry_in = ?delay, "snapshot write failed, state kept in memory");
                Err(eyre::eyre!(e))
            }
            Ok(Err(join_err)) => {
                let delay = Self::bump_backoff(backoff);
                warn!(error = %join_err, retry_in = ?delay, "snapshot writer panicked");
                Err(eyre::eyre!(join_err))
            }
            Err(_) => {
                let delay = Self::bump_backoff(backoff);
                warn!(timeout = ?WRITE_TIMEOUT, retry_in = ?delay, "snapshot write timed out");
                Err(eyre::eyre!("snapshot write timed out"))
            }
        }
    }

    fn bump_backoff(backoff: &mut Option<(Duration, Instant)>) -> Duration {
        let next = match *backoff {
            None => BACKOFF_INITIAL,
            Some((current, _)) => (current * 2).min(BACKOFF_CEILING),
        };
        *backoff = Some((next, Instant::now() + next));
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CognitiveEvent;
    use tempfile::tempdir;

    fn sources() -> SnapshotSources {
        let (loop_tx, loop_rx) = watch::channel(LoopState::new(Duration::from_millis(100)));
        let (wake_tx, wake_rx) = watch::channel(WakeState::AwakeActive);
        drop((loop_tx, wake_tx));
        SnapshotSources {
            loop_rx,
            wake_rx,
            registries: Registries::new(Duration::from_secs(3600)),
            graph: Arc::new(RwLock::new(Hypergraph::new(0.7))),
            engine_states: Arc::new(RwLock::new(
                EngineId::ALL
                    .map(|id| (id, EngineState::new(id)))
                    .into_iter()
                    .collect(),
            )),
            recent: RecentThoughts::new(10),
        }
    }

    #[test]
    fn test_collect_has_all_engines_in_order() {
        let sources = sources();
        let snapshot = sources.collect();
        let numbers: Vec<u8> = snapshot.engine_states.iter().map(|s| s.id.number()).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_periodic_snapshot_written() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("core.json");
        let bus = Arc::new(EventBus::new(64));
        let snapshotter = Snapshotter::new(
            SnapshotStore::new(path.clone()),
            sources(),
            Duration::from_millis(50),
            Arc::clone(&bus),
            Arc::new(CoreMetrics::new()),
        );
        let (_req_tx, req_rx) = mpsc::channel(4);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        snapshotter.spawn(req_rx, shutdown_rx);

        for _ in 0..100 {
            if path.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(path.exists(), "periodic snapshot never appeared");
        shutdown_tx.send(true).unwrap();
    }

    #[tokio::test]
    async fn test_resting_transition_triggers_snapshot() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("core.json");
        let bus = Arc::new(EventBus::new(64));
        let snapshotter = Snapshotter::new(
            SnapshotStore::new(path.clone()),
            sources(),
            Duration::from_secs(3600), // periodic effectively off
            Arc::clone(&bus),
            Arc::new(CoreMetrics::new()),
        );
        let (_req_tx, req_rx) = mpsc::channel(4);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        snapshotter.spawn(req_rx, shutdown_rx);

        tokio::time::sleep(Duration::from_millis(50)).await;
        bus.publish(CognitiveEvent::state_change(
            WakeState::Tiring,
            WakeState::Resting,
        ));

        for _ in 0..100 {
            if path.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(path.exists(), "state-change snapshot never appeared");
        shutdown_tx.send(true).unwrap();
    }

    #[tokio::test]
    async fn test_demand_snapshot_replies() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("core.json");
        let bus = Arc::new(EventBus::new(64));
        let metrics = Arc::new(CoreMetrics::new());
        let snapshotter = Snapshotter::new(
            SnapshotStore::new(path.clone()),
            sources(),
            Duration::from_secs(3600),
            Arc::clone(&bus),
            Arc::clone(&metrics),
        );
        let (req_tx, req_rx) = mpsc::channel(4);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        snapshotter.spawn(req_rx, shutdown_rx);

        let (reply_tx, reply_rx) = oneshot::channel();
        req_tx.send(reply_tx).await.unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), reply_rx)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert!(path.exists());
        shutdown_tx.send(true).unwrap();
    }

    #[test]
    fn test_backoff_doubles_to_ceiling() {
        let mut backoff = None;
        assert_eq!(Snapshotter::bump_backoff(&mut backoff), BACKOFF_INITIAL);
        assert_eq!(
            Snapshotter::bump_backoff(&mut backoff),
            BACKOFF_INITIAL * 2
        );
        for _ in 0..20 {
            Snapshotter::bump_backoff(&mut backoff);
        }
        assert_eq!(backoff.unwrap().0, BACKOFF_CEILING);
    }
}
