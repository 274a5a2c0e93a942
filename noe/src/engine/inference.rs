//! InferenceEngine - one of the three specialized workers
//!
//! Each engine runs on its own task, owns its priority queue, and executes
//! only steps it owns. Dispatches arrive from the orchestrator; results go
//! back on the shared report channel. The engine mutates only its own
//! `EngineState`, mirrored into the shared map for snapshots and metrics.

use std::collections::BinaryHeap;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::domain::{EngineId, EngineState, StepIdx, StepOutcome, StepResult};
use crate::metrics::CoreMetrics;

use super::steps::{run_role, EngineContext, StepError};
use super::task::{InferenceTask, TaskKind};

/// Commands an engine accepts
#[derive(Debug)]
pub enum EngineCommand {
    /// Execute the given step now (must be owned by this engine)
    Execute(StepIdx),
    /// Queue a task
    Inject(InferenceTask),
    Shutdown,
}

/// A step result plus the coherence sample step 8 produces
#[derive(Debug)]
pub struct StepReport {
    pub result: StepResult,
    pub coherence: Option<f64>,
}

/// Cheap handle to a spawned engine
#[derive(Clone)]
pub struct EngineHandle {
    pub id: EngineId,
    cmd_tx: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    /// Dispatch a step without blocking; false when the engine's command
    /// queue is full (the orchestrator just waits for the next tick)
    pub fn try_execute(&self, step: StepIdx) -> bool {
        self.cmd_tx.try_send(EngineCommand::Execute(step)).is_ok()
    }

    pub async fn inject(&self, task: InferenceTask) {
        let _ = self.cmd_tx.send(EngineCommand::Inject(task)).await;
    }

    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(EngineCommand::Shutdown).await;
    }
}

pub struct InferenceEngine {
    id: EngineId,
    ctx: EngineContext,
    queue: BinaryHeap<InferenceTask>,
    state: EngineState,
    /// Shared mirror read by the snapshotter
    engine_states: Arc<RwLock<HashMap<EngineId, EngineState>>>,
    metrics: Arc<CoreMetrics>,
    /// Soft execution deadline (0.9 x step duration); logged, not aborted
    soft_deadline: Duration,
    report_tx: mpsc::Sender<StepReport>,
}

impl InferenceEngine {
    /// Spawn an engine task; returns its handle
    pub fn spawn(
        id: EngineId,
        ctx: EngineContext,
        engine_states: Arc<RwLock<HashMap<EngineId, EngineState>>>,
        metrics: Arc<CoreMetrics>,
        step_duration: Duration,
        report_tx: mpsc::Sender<StepReport>,
    ) -> (EngineHandle, tokio::task::JoinHandle<()>) {
        debug!(%id, "InferenceEngine::spawn");
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let engine = Self {
            id,
            ctx,
            queue: BinaryHeap::new(),
            state: EngineState::new(id),
            engine_states,
            metrics,
            soft_deadline: step_duration.mul_f64(0.9),
            report_tx,
        };
        let task = tokio::spawn(engine.run(cmd_rx));
        (EngineHandle { id, cmd_tx }, task)
    }

    async fn run(mut self, mut cmd_rx: mpsc::Receiver<EngineCommand>) {
        debug!(id = %self.id, "engine started");
        self.publish_state();
        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                EngineCommand::Execute(step) => {
                    let report = self.execute_step(step).await;
                    if self.report_tx.send(report).await.is_err() {
                        break;
                    }
                }
                EngineCommand::Inject(task) => {
                    debug!(id = %self.id, task_id = %task.id, "task injected");
                    self.queue.push(task);
                    self.state.queue_depth = self.queue.len();
                    self.publish_state();
                }
                EngineCommand::Shutdown => break,
            }
        }
        debug!(id = %self.id, "engine stopped");
    }

    async fn execute_step(&mut self, step: StepIdx) -> StepReport {
        let started_at = Utc::now();
        let started = tokio::time::Instant::now();

        // Defensive: executing a foreign step would break the partition
        if step.owner() != self.id {
            warn!(id = %self.id, %step, "dispatched a step this engine does not own");
            return StepReport {
                result: StepResult {
                    step,
                    engine_id: self.id,
                    started_at,
                    duration: Duration::ZERO,
                    outcome: StepOutcome::Failed { fatal: true },
                    emitted_events: Vec::new(),
                },
                coherence: None,
            };
        }

        // Pop the highest-priority queued task, or synthesize the step's
        // own default work when the queue is empty. External payloads are
        // surfaced to the role through the context map.
        let task = self
            .queue
            .pop()
            .unwrap_or_else(|| InferenceTask::step_default(step));
        debug!(id = %self.id, task_id = %task.id, kind = ?task.kind, "executing task");
        if task.kind == TaskKind::External {
            self.ctx
                .context_data
                .write()
                .unwrap()
                .insert("external_input".to_string(), task.payload);
        }
        self.state.queue_depth = self.queue.len();
        self.state.current_step = Some(step);

        let outcome = match run_role(step.role(), &self.ctx).await {
            Ok(output) => output,
            Err(StepError::Transient(msg)) => {
                warn!(id = %self.id, %step, %msg, "transient step failure");
                return self.report(step, started_at, started.elapsed(), StepOutcome::Failed { fatal: false }, Vec::new(), None);
            }
            Err(StepError::Fatal(msg)) => {
                warn!(id = %self.id, %step, %msg, "fatal step failure");
                return self.report(step, started_at, started.elapsed(), StepOutcome::Failed { fatal: true }, Vec::new(), None);
            }
        };

        let elapsed = started.elapsed();
        if elapsed > self.soft_deadline {
            warn!(
                id = %self.id,
                %step,
                ?elapsed,
                soft_deadline = ?self.soft_deadline,
                "step exceeded soft deadline"
            );
        }

        let outcome_kind = if outcome.skipped {
            StepOutcome::Skipped
        } else {
            StepOutcome::Ok
        };
        let emitted = if outcome.skipped {
            Vec::new()
        } else {
            outcome.emitted_events
        };
        self.report(step, started_at, elapsed, outcome_kind, emitted, outcome.coherence)
    }

    fn report(
        &mut self,
        step: StepIdx,
        started_at: chrono::DateTime<Utc>,
        duration: Duration,
        outcome: StepOutcome,
        emitted_events: Vec<uuid::Uuid>,
        coherence: Option<f64>,
    ) -> StepReport {
        self.state.tasks_processed += 1;
        self.state.last_heartbeat = Utc::now();
        self.metrics
            .record_engine_step(self.id, self.state.queue_depth);
        self.publish_state();

        StepReport {
            result: StepResult {
                step,
                engine_id: self.id,
                started_at,
                duration,
                outcome,
                emitted_events,
            },
            coherence,
        }
    }

    fn publish_state(&self) {
        self.engine_states
            .write()
            .unwrap()
            .insert(self.id, self.state.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::LoopState;
    use crate::events::EventBus;
    use crate::hypergraph::Hypergraph;
    use crate::providers::ProviderRegistry;
    use crate::registry::Registries;
    use tokio::sync::watch;

    fn context() -> EngineContext {
        let (tx, loop_rx) = watch::channel(LoopState::new(Duration::from_millis(100)));
        drop(tx);
        EngineContext {
            bus: Arc::new(EventBus::new(256)),
            providers: Arc::new(ProviderRegistry::with_defaults()),
            registries: Registries::new(Duration::from_secs(3600)),
            graph: Arc::new(RwLock::new(Hypergraph::new(0.7))),
            context_data: Arc::new(RwLock::new(serde_json::Map::new())),
            loop_state: loop_rx,
        }
    }

    fn spawn_engine(
        id: EngineId,
    ) -> (
        EngineHandle,
        mpsc::Receiver<StepReport>,
        Arc<RwLock<HashMap<EngineId, EngineState>>>,
    ) {
        let states = Arc::new(RwLock::new(HashMap::new()));
        let (report_tx, report_rx) = mpsc::channel(32);
        let (handle, _task) = InferenceEngine::spawn(
            id,
            context(),
            Arc::clone(&states),
            Arc::new(CoreMetrics::new()),
            Duration::from_millis(100),
            report_tx,
        );
        (handle, report_rx, states)
    }

    #[tokio::test]
    async fn test_engine_executes_owned_step() {
        let (handle, mut reports, _states) = spawn_engine(EngineId::E2);
        assert!(handle.try_execute(StepIdx::new(1).unwrap()));

        let report = reports.recv().await.unwrap();
        assert_eq!(report.result.engine_id, EngineId::E2);
        assert_eq!(report.result.step.get(), 1);
        // Cold start with no interests or goals: relevance skips
        assert_eq!(report.result.outcome, StepOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_engine_rejects_foreign_step() {
        let (handle, mut reports, _states) = spawn_engine(EngineId::E1);
        assert!(handle.try_execute(StepIdx::new(1).unwrap())); // owned by E2

        let report = reports.recv().await.unwrap();
        assert_eq!(
            report.result.outcome,
            StepOutcome::Failed { fatal: true }
        );
    }

    #[tokio::test]
    async fn test_engine_counts_processed_steps() {
        let (handle, mut reports, states) = spawn_engine(EngineId::E3);
        for step in [9, 10, 11, 12] {
            assert!(handle.try_execute(StepIdx::new(step).unwrap()));
            reports.recv().await.unwrap();
        }

        let state = states.read().unwrap()[&EngineId::E3].clone();
        assert_eq!(state.tasks_processed, 4);
    }

    #[tokio::test]
    async fn test_injected_task_raises_queue_depth() {
        let (handle, mut reports, states) = spawn_engine(EngineId::E2);
        handle
            .inject(InferenceTask::external(serde_json::json!({"msg": "hi"}), 80))
            .await;

        // Wait for the inject to land
        for _ in 0..50 {
            if states
                .read()
                .unwrap()
                .get(&EngineId::E2)
                .is_some_and(|s| s.queue_depth == 1)
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(states.read().unwrap()[&EngineId::E2].queue_depth, 1);

        // The next executed step consumes it
        assert!(handle.try_execute(StepIdx::new(7).unwrap()));
        reports.recv().await.unwrap();
        assert_eq!(states.read().unwrap()[&EngineId::E2].queue_depth, 0);
    }

    #[tokio::test]
    async fn test_step12_reports_ok_and_emits() {
        let (handle, mut reports, _states) = spawn_engine(EngineId::E3);
        assert!(handle.try_execute(StepIdx::new(12).unwrap()));

        let report = reports.recv().await.unwrap();
        assert_eq!(report.result.outcome, StepOutcome::Ok);
        assert_eq!(report.result.emitted_events.len(), 1);
    }
}
