//! Loop and wake state - the two single-writer state records

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::step::StepIdx;

/// State of the 12-step loop. Written only by the orchestrator; everyone
/// else observes a watch snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopState {
    pub cycle_count: u64,
    pub current_step: StepIdx,
    pub step_started_at: DateTime<Utc>,
    pub step_duration: Duration,
    /// Workload pressure in [0, 1]; drives wake transitions
    pub fatigue: f64,
    /// Inter-step consistency in [0, 1]; computed at step 8
    pub coherence: f64,
}

impl LoopState {
    pub fn new(step_duration: Duration) -> Self {
        Self {
            cycle_count: 0,
            current_step: StepIdx::FIRST,
            step_started_at: Utc::now(),
            step_duration,
            fatigue: 0.0,
            coherence: 1.0,
        }
    }
}

/// Wake/rest/dream phase. Written only by the wake state machine; every
/// transition is also published as a `StateChange` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WakeState {
    Initializing,
    Waking,
    AwakeActive,
    Tiring,
    Resting,
    Dreaming,
    Shutdown,
}

impl WakeState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WakeState::Initializing => "initializing",
            WakeState::Waking => "waking",
            WakeState::AwakeActive => "awake_active",
            WakeState::Tiring => "tiring",
            WakeState::Resting => "resting",
            WakeState::Dreaming => "dreaming",
            WakeState::Shutdown => "shutdown",
        }
    }

    /// Ordinal for metric export
    pub fn ordinal(&self) -> u8 {
        match self {
            WakeState::Initializing => 0,
            WakeState::Waking => 1,
            WakeState::AwakeActive => 2,
            WakeState::Tiring => 3,
            WakeState::Resting => 4,
            WakeState::Dreaming => 5,
            WakeState::Shutdown => 6,
        }
    }

    /// States in which only E1 runs and the clock is slowed
    pub fn is_rest_phase(&self) -> bool {
        matches!(self, WakeState::Resting | WakeState::Dreaming)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WakeState::Shutdown)
    }
}

impl std::fmt::Display for WakeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
