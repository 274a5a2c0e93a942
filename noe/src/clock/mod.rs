//! Clock & Phase Timer - three phase-offset tick streams
//!
//! One stream per engine at the configured step duration D, offset by 0,
//! 4D and 8D (120 degrees around the 12-step loop). The clock is the single
//! source of time for step advancement; wall-clock is used only for
//! persisted timestamps. A watch-driven rate multiplier implements the
//! halved cadence of the rest phase, and the shutdown watch stops all three
//! streams within one period.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::domain::EngineId;

/// A single clock tick, tagged with the engine whose stream produced it
#[derive(Debug, Clone, Copy)]
pub struct Tick {
    pub engine: EngineId,
    pub seq: u64,
    pub at: Instant,
}

/// Phase offsets in step-durations for E1/E2/E3.
///
/// E2 owns step 1, so its stream has no offset; E1 (steps 2..=6) and E3
/// (steps 9..=12) trail by a third of the cycle each.
fn phase_offset(engine: EngineId, step_duration: Duration) -> Duration {
    match engine {
        EngineId::E2 => Duration::ZERO,
        EngineId::E1 => step_duration * 4,
        EngineId::E3 => step_duration * 8,
    }
}

/// Spawn the three tick streams. All ticks funnel into one channel consumed
/// by the orchestrator; a full channel sheds the tick rather than slowing
/// the clock (the next one arrives a period later anyway).
pub fn spawn_phase_clock(
    step_duration: Duration,
    rate: watch::Receiver<f64>,
    shutdown: watch::Receiver<bool>,
) -> mpsc::Receiver<Tick> {
    debug!(?step_duration, "spawn_phase_clock: starting tick streams");
    let (tx, rx) = mpsc::channel(16);

    for engine in EngineId::ALL {
        let tx = tx.clone();
        let rate = rate.clone();
        let mut shutdown = shutdown.clone();
        let offset = phase_offset(engine, step_duration);
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(offset) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }

            let mut seq: u64 = 0;
            loop {
                let multiplier = (*rate.borrow()).clamp(0.05, 4.0);
                let period = step_duration.div_f64(multiplier);
                tokio::select! {
                    _ = tokio::time::sleep(period) => {
                        seq += 1;
                        let tick = Tick { engine, seq, at: Instant::now() };
                        trace!(%engine, seq, "phase clock tick");
                        if tx.try_send(tick).is_err() {
                            trace!(%engine, seq, "tick channel full, shedding tick");
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            debug!(%engine, "phase clock stream stopping");
                            return;
                        }
                    }
                }
            }
        });
    }

    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_all_streams_tick() {
        let (_rate_tx, rate_rx) = watch::channel(1.0);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut ticks = spawn_phase_clock(Duration::from_millis(10), rate_rx, shutdown_rx);

        let mut seen: HashMap<EngineId, u32> = HashMap::new();
        let deadline = tokio::time::Instant::now() + Duration::from_millis(500);
        while seen.len() < 3 || seen.values().any(|&c| c < 2) {
            let tick = tokio::time::timeout_at(deadline, ticks.recv())
                .await
                .expect("clock stalled")
                .expect("clock closed");
            *seen.entry(tick.engine).or_default() += 1;
        }

        shutdown_tx.send(true).unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_stops_streams_within_a_period() {
        let step = Duration::from_millis(20);
        let (_rate_tx, rate_rx) = watch::channel(1.0);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut ticks = spawn_phase_clock(step, rate_rx, shutdown_rx);

        // Let it run briefly, then stop
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(true).unwrap();
        tokio::time::sleep(step * 2).await;

        // Drain anything emitted before the stop took effect
        while ticks.try_recv().is_ok() {}

        // No new ticks after the quiescence window
        tokio::time::sleep(step * 3).await;
        assert!(ticks.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_rate_multiplier_slows_cadence() {
        let step = Duration::from_millis(10);
        let (rate_tx, rate_rx) = watch::channel(1.0);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut ticks = spawn_phase_clock(step, rate_rx, shutdown_rx);

        // Full rate: count ticks over a window
        tokio::time::sleep(Duration::from_millis(200)).await;
        let mut fast = 0;
        while ticks.try_recv().is_ok() {
            fast += 1;
        }

        // Half rate: same window should produce notably fewer ticks
        rate_tx.send(0.5).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        let mut slow = 0;
        while ticks.try_recv().is_ok() {
            slow += 1;
        }

        assert!(slow < fast, "half rate produced {} vs {} ticks", slow, fast);
        shutdown_tx.send(true).unwrap();
    }

    #[test]
    fn test_phase_offsets() {
        let d = Duration::from_millis(500);
        assert_eq!(phase_offset(EngineId::E2, d), Duration::ZERO);
        assert_eq!(phase_offset(EngineId::E1, d), d * 4);
        assert_eq!(phase_offset(EngineId::E3, d), d * 8);
    }
}
