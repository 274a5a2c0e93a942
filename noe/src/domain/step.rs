//! Step indices, engine identities and per-step bookkeeping
//!
//! The 12-step loop is partitioned across three engines. The partition is
//! static: every step has exactly one owner, and the three assigned sets
//! cover 1..=12 with no overlap.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Number of steps in one cognitive cycle
pub const STEP_COUNT: u8 = 12;

/// A step index in 1..=12
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepIdx(u8);

impl StepIdx {
    pub const FIRST: StepIdx = StepIdx(1);

    pub fn new(idx: u8) -> Option<Self> {
        (1..=STEP_COUNT).contains(&idx).then_some(Self(idx))
    }

    pub fn get(&self) -> u8 {
        self.0
    }

    /// Next step, plus whether the 12 -> 1 wrap happened
    pub fn next(&self) -> (StepIdx, bool) {
        if self.0 == STEP_COUNT {
            (StepIdx(1), true)
        } else {
            (StepIdx(self.0 + 1), false)
        }
    }

    /// The engine that owns this step
    pub fn owner(&self) -> EngineId {
        match self.0 {
            2..=6 => EngineId::E1,
            1 | 7 | 8 => EngineId::E2,
            _ => EngineId::E3,
        }
    }

    pub fn role(&self) -> StepRole {
        match self.0 {
            1 => StepRole::RelevanceRealization,
            2 => StepRole::RecallEpisodic,
            3 => StepRole::RecallProcedural,
            4 => StepRole::RecallDeclarative,
            5 => StepRole::PatternMatch,
            6 => StepRole::IntegratePast,
            7 => StepRole::OrientPresent,
            8 => StepRole::AssessCoherence,
            9 => StepRole::SimulateFuture,
            10 => StepRole::EvaluateAffordances,
            11 => StepRole::CommitIntent,
            _ => StepRole::Express,
        }
    }
}

impl std::fmt::Display for StepIdx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a step does, independent of which engine runs it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepRole {
    RelevanceRealization,
    RecallEpisodic,
    RecallProcedural,
    RecallDeclarative,
    PatternMatch,
    IntegratePast,
    OrientPresent,
    AssessCoherence,
    SimulateFuture,
    EvaluateAffordances,
    CommitIntent,
    Express,
}

/// Engine identity, 1..=3
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineId {
    E1,
    E2,
    E3,
}

impl EngineId {
    pub const ALL: [EngineId; 3] = [EngineId::E1, EngineId::E2, EngineId::E3];

    pub fn index(&self) -> usize {
        match self {
            EngineId::E1 => 0,
            EngineId::E2 => 1,
            EngineId::E3 => 2,
        }
    }

    pub fn number(&self) -> u8 {
        self.index() as u8 + 1
    }

    pub fn specialization(&self) -> Specialization {
        match self {
            EngineId::E1 => Specialization::Memory,
            EngineId::E2 => Specialization::Coherence,
            EngineId::E3 => Specialization::Imagination,
        }
    }

    /// The steps this engine owns, in execution order
    pub fn assigned_steps(&self) -> &'static [u8] {
        match self {
            EngineId::E1 => &[2, 3, 4, 5, 6],
            EngineId::E2 => &[1, 7, 8],
            EngineId::E3 => &[9, 10, 11, 12],
        }
    }
}

impl std::fmt::Display for EngineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "E{}", self.number())
    }
}

/// Temporal focus of an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Specialization {
    /// Past - reflective mode
    Memory,
    /// Present - pivotal mode
    Coherence,
    /// Future - expressive mode
    Imagination,
}

impl Specialization {
    pub fn as_str(&self) -> &'static str {
        match self {
            Specialization::Memory => "memory",
            Specialization::Coherence => "coherence",
            Specialization::Imagination => "imagination",
        }
    }
}

/// Outcome of a single step execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepOutcome {
    Ok,
    /// No input available; advance without recording emitted events
    Skipped,
    Failed {
        fatal: bool,
    },
}

/// Record of one step execution, produced by an engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step: StepIdx,
    pub engine_id: EngineId,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub outcome: StepOutcome,
    pub emitted_events: Vec<Uuid>,
}

/// Snapshot of an engine's bookkeeping, mutated only by the owning engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineState {
    pub id: EngineId,
    pub specialization: Specialization,
    pub assigned_steps: BTreeSet<u8>,
    pub current_step: Option<StepIdx>,
    pub tasks_processed: u64,
    pub queue_depth: usize,
    pub last_heartbeat: DateTime<Utc>,
}

impl EngineState {
    pub fn new(id: EngineId) -> Self {
        Self {
            id,
            specialization: id.specialization(),
            assigned_steps: id.assigned_steps().iter().copied().collect(),
            current_step: None,
            tasks_processed: 0,
            queue_depth: 0,
            last_heartbeat: Utc::now(),
        }
    }
}
