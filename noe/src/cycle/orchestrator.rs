//! Cognitive Loop Orchestrator - owns LoopState and the 12-step pointer
//!
//! Single writer of `LoopState`. Ticks arrive tagged with the engine whose
//! stream produced them; when the pointer's current step belongs to that
//! engine the step is dispatched, otherwise the tick passes. The pointer
//! advances on every completed (or skipped) step, so each cycle executes
//! exactly the set {1..12} and no step index ever runs twice concurrently.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::clock::Tick;
use crate::domain::{EngineId, LoopState, StepIdx, StepOutcome, WakeState};
use crate::engine::{EngineHandle, StepReport};
use crate::events::{CognitiveEvent, EventBus};
use crate::metrics::CoreMetrics;

/// Fatigue tunables. The exact coupling of drop counts into fatigue is a
/// tunable, not a fixed formula.
#[derive(Debug, Clone, Copy)]
pub struct FatigueConfig {
    /// Active time that alone saturates fatigue to 1.0
    pub full_after: Duration,
    /// Additional fatigue per dropped bus event in the last cycle
    pub drop_gain: f64,
}

impl Default for FatigueConfig {
    fn default() -> Self {
        Self {
            full_after: Duration::from_secs(300),
            drop_gain: 0.001,
        }
    }
}

pub struct OrchestratorConfig {
    pub step_duration: Duration,
    pub fatigue: FatigueConfig,
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    loop_state: LoopState,
    loop_tx: watch::Sender<LoopState>,
    engines: HashMap<EngineId, EngineHandle>,
    tick_rx: mpsc::Receiver<Tick>,
    report_rx: mpsc::Receiver<StepReport>,
    bus: Arc<EventBus>,
    metrics: Arc<CoreMetrics>,
    wake_rx: watch::Receiver<WakeState>,
    pause_rx: watch::Receiver<bool>,
    shutdown_rx: watch::Receiver<bool>,
    /// Step currently executing on an engine
    in_flight: Option<StepIdx>,
    /// One retry is armed after a transient failure
    retry_armed: bool,
    last_rest: Instant,
    drops_at_cycle_start: u64,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: OrchestratorConfig,
        initial: LoopState,
        loop_tx: watch::Sender<LoopState>,
        engines: Vec<EngineHandle>,
        tick_rx: mpsc::Receiver<Tick>,
        report_rx: mpsc::Receiver<StepReport>,
        bus: Arc<EventBus>,
        metrics: Arc<CoreMetrics>,
        wake_rx: watch::Receiver<WakeState>,
        pause_rx: watch::Receiver<bool>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        let engines = engines.into_iter().map(|h| (h.id, h)).collect();
        Self {
            config,
            loop_state: initial,
            loop_tx,
            engines,
            tick_rx,
            report_rx,
            bus,
            metrics,
            wake_rx,
            pause_rx,
            shutdown_rx,
            in_flight: None,
            retry_armed: false,
            last_rest: Instant::now(),
            drops_at_cycle_start: 0,
        }
    }

    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        info!(
            cycle_count = self.loop_state.cycle_count,
            step = %self.loop_state.current_step,
            "orchestrator started"
        );
        self.publish_loop_state();

        loop {
            tokio::select! {
                tick = self.tick_rx.recv() => match tick {
                    Some(tick) => self.on_tick(tick),
                    None => break,
                },
                report = self.report_rx.recv() => match report {
                    Some(report) => {
                        if !self.on_report(report).await {
                            break;
                        }
                    }
                    None => break,
                },
                _ = self.wake_rx.changed() => self.on_wake_change(),
                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        for handle in self.engines.values() {
            handle.shutdown().await;
        }
        debug!("orchestrator stopped");
    }

    fn on_wake_change(&mut self) {
        let wake = *self.wake_rx.borrow();
        if wake == WakeState::Waking {
            // Waking resets fatigue; the rest actually rested us
            debug!("waking observed, resetting fatigue");
            self.loop_state.fatigue = 0.0;
            self.last_rest = Instant::now();
            self.drops_at_cycle_start = self.bus.total_drops();
            self.publish_loop_state();
        }
    }

    fn on_tick(&mut self, tick: Tick) {
        if *self.pause_rx.borrow() {
            return;
        }
        if self.in_flight.is_some() {
            return;
        }

        let step = self.loop_state.current_step;
        let owner = step.owner();
        let wake = *self.wake_rx.borrow();

        // During rest only E1 stays active; steps owned by the parked
        // engines are skipped at the pointer on E1's (slowed) cadence
        if wake.is_rest_phase() && owner != EngineId::E1 {
            if tick.engine == EngineId::E1 {
                debug!(%step, "rest phase, auto-skipping step of parked engine");
                self.advance();
            }
            return;
        }

        if tick.engine != owner {
            return;
        }

        let Some(handle) = self.engines.get(&owner) else {
            return;
        };
        if handle.try_execute(step) {
            self.in_flight = Some(step);
            self.loop_state.step_started_at = Utc::now();
            self.publish_loop_state();
        }
    }

    /// Returns false when the loop must stop (fatal failure)
    async fn on_report(&mut self, report: StepReport) -> bool {
        let step = report.result.step;
        if self.in_flight != Some(step) {
            warn!(%step, "stale step report, ignoring");
            return true;
        }
        self.in_flight = None;

        if let Some(coherence) = report.coherence {
            self.loop_state.coherence = coherence.clamp(0.0, 1.0);
        }

        match report.result.outcome {
            StepOutcome::Ok | StepOutcome::Skipped => {
                self.retry_armed = false;
                self.advance();
            }
            StepOutcome::Failed { fatal: false } => {
                if !self.retry_armed {
                    debug!(%step, "transient failure, arming one retry");
                    self.retry_armed = true;
                    // Pointer stays; the owner's next tick retries
                } else {
                    debug!(%step, "second transient failure, downgrading to skip");
                    self.retry_armed = false;
                    self.metrics.record_failed_step(report.result.engine_id);
                    self.advance();
                }
            }
            StepOutcome::Failed { fatal: true } => {
                error!(%step, engine = %report.result.engine_id, "fatal step failure");
                self.metrics.record_failed_step(report.result.engine_id);
                let from = *self.wake_rx.borrow();
                self.bus
                    .publish(CognitiveEvent::state_change(from, WakeState::Shutdown));
                return false;
            }
        }
        true
    }

    fn advance(&mut self) {
        let (next, wrapped) = self.loop_state.current_step.next();
        self.loop_state.current_step = next;
        self.loop_state.step_started_at = Utc::now();

        if wrapped {
            self.loop_state.cycle_count += 1;
            self.loop_state.fatigue = self.compute_fatigue();
            info!(
                cycle_count = self.loop_state.cycle_count,
                fatigue = self.loop_state.fatigue,
                coherence = self.loop_state.coherence,
                "cycle complete"
            );
            self.bus.publish(CognitiveEvent::cycle_complete(
                self.loop_state.cycle_count,
                self.loop_state.fatigue,
                self.loop_state.coherence,
            ));
        }

        self.metrics.set_loop(
            self.loop_state.cycle_count,
            self.loop_state.current_step.get(),
            self.loop_state.fatigue,
            self.loop_state.coherence,
        );
        self.publish_loop_state();
    }

    fn compute_fatigue(&mut self) -> f64 {
        let active = self.last_rest.elapsed().as_secs_f64()
            / self.config.fatigue.full_after.as_secs_f64().max(f64::EPSILON);
        let drops_now = self.bus.total_drops();
        let recent_drops = drops_now.saturating_sub(self.drops_at_cycle_start);
        self.drops_at_cycle_start = drops_now;
        (active + self.config.fatigue.drop_gain * recent_drops as f64).min(1.0)
    }

    fn publish_loop_state(&self) {
        let _ = self.loop_tx.send(self.loop_state.clone());
    }
}
