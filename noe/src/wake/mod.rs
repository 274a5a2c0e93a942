//! Wake/Rest/Dream state machine
//!
//! Single writer of `WakeState`. Fatigue samples arrive on cycle-complete
//! events; dwell-time transitions run off the timer. Every transition is
//! published as a `StateChange` event (none are silent), and entering a
//! rest phase halves the clock rate via the shared rate watch.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::domain::WakeState;
use crate::events::{CognitiveEvent, EventBus, Topic};
use crate::metrics::CoreMetrics;

/// Thresholds and dwell times, all configurable
#[derive(Debug, Clone, Copy)]
pub struct WakeConfig {
    /// Fatigue at which AwakeActive tips into Tiring
    pub fatigue_tiring: f64,
    /// Fatigue at which Tiring tips into Resting
    pub fatigue_resting: f64,
    /// Max dwell in Tiring before Resting anyway
    pub t_tiring: Duration,
    /// Dwell in Resting before Dreaming
    pub t_rest: Duration,
    /// Max dwell in Dreaming before Waking even without consolidation
    pub t_dream: Duration,
    /// Clock rate multiplier while resting or dreaming
    pub rest_rate: f64,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            fatigue_tiring: 0.75,
            fatigue_resting: 0.90,
            t_tiring: Duration::from_secs(60),
            t_rest: Duration::from_secs(30),
            t_dream: Duration::from_secs(30),
            rest_rate: 0.5,
        }
    }
}

pub struct WakeMachine {
    config: WakeConfig,
    state: WakeState,
    entered_at: Instant,
    first_cycle_seen: bool,
    bus: Arc<EventBus>,
    wake_tx: watch::Sender<WakeState>,
    rate_tx: watch::Sender<f64>,
    metrics: Arc<CoreMetrics>,
}

impl WakeMachine {
    pub fn new(
        config: WakeConfig,
        bus: Arc<EventBus>,
        wake_tx: watch::Sender<WakeState>,
        rate_tx: watch::Sender<f64>,
        metrics: Arc<CoreMetrics>,
    ) -> Self {
        Self {
            config,
            state: WakeState::Initializing,
            entered_at: Instant::now(),
            first_cycle_seen: false,
            bus,
            wake_tx,
            rate_tx,
            metrics,
        }
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut cycles = self.bus.subscribe(Topic::CycleComplete);
        let mut wisdom = self.bus.subscribe(Topic::WisdomGained);
        let mut state_changes = self.bus.subscribe(Topic::StateChange);

        // Construction is the whole init; wake up right away
        self.transition(WakeState::Waking);

        loop {
            let deadline = self.dwell_deadline();
            tokio::select! {
                event = cycles.recv() => match event {
                    Some(event) => self.on_cycle_complete(&event),
                    None => break,
                },
                event = wisdom.recv() => match event {
                    Some(event) => self.on_wisdom(&event),
                    None => break,
                },
                event = state_changes.recv() => match event {
                    Some(event) => {
                        // Adopt a shutdown published by someone else (the
                        // orchestrator on fatal failure); it is already on
                        // the bus so it is not republished here
                        if let Some((_, WakeState::Shutdown)) = event.as_state_change() {
                            if self.state != WakeState::Shutdown {
                                info!("adopting externally published shutdown");
                                self.state = WakeState::Shutdown;
                                let _ = self.wake_tx.send(WakeState::Shutdown);
                                self.metrics.set_wake(WakeState::Shutdown);
                                break;
                            }
                        }
                    }
                    None => break,
                },
                _ = tokio::time::sleep_until(deadline) => self.on_dwell_elapsed(),
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        self.transition(WakeState::Shutdown);
                        break;
                    }
                }
            }
            if self.state.is_terminal() {
                break;
            }
        }
        debug!("wake machine stopped");
    }

    fn dwell_deadline(&self) -> Instant {
        let dwell = match self.state {
            WakeState::Tiring => self.config.t_tiring,
            WakeState::Resting => self.config.t_rest,
            WakeState::Dreaming => self.config.t_dream,
            // No timed transition pending; park the timer far out
            _ => Duration::from_secs(3600),
        };
        self.entered_at + dwell
    }

    fn on_cycle_complete(&mut self, event: &CognitiveEvent) {
        let Some(fatigue) = event.cycle_fatigue() else {
            return;
        };
        debug!(state = %self.state, fatigue, "fatigue sample");
        match self.state {
            WakeState::Waking => {
                if !self.first_cycle_seen {
                    self.first_cycle_seen = true;
                    self.transition(WakeState::AwakeActive);
                }
            }
            WakeState::AwakeActive if fatigue >= self.config.fatigue_tiring => {
                self.transition(WakeState::Tiring);
            }
            WakeState::Tiring if fatigue >= self.config.fatigue_resting => {
                self.transition(WakeState::Resting);
            }
            _ => {}
        }
    }

    fn on_wisdom(&mut self, event: &CognitiveEvent) {
        if self.state == WakeState::Dreaming && event.payload.get("consolidation").is_some() {
            debug!("consolidation complete, waking");
            self.transition(WakeState::Waking);
        }
    }

    fn on_dwell_elapsed(&mut self) {
        match self.state {
            WakeState::Tiring => self.transition(WakeState::Resting),
            WakeState::Resting => self.transition(WakeState::Dreaming),
            WakeState::Dreaming => self.transition(WakeState::Waking),
            _ => {}
        }
    }

    fn transition(&mut self, to: WakeState) {
        let from = self.state;
        if from == to {
            return;
        }
        info!(%from, %to, "wake transition");
        self.bus.publish(CognitiveEvent::state_change(from, to));
        self.state = to;
        self.entered_at = Instant::now();
        if to == WakeState::Waking {
            // A fresh waking needs a fresh first cycle before AwakeActive
            self.first_cycle_seen = false;
        }
        let _ = self.wake_tx.send(to);
        let _ = self.rate_tx.send(if to.is_rest_phase() {
            self.config.rest_rate
        } else {
            1.0
        });
        self.metrics.set_wake(to);
    }
}
