//! Core data model shared across the cognitive scheduler
//!
//! Everything here is plain data: thoughts, step bookkeeping, loop and wake
//! state, hypergraph records, and registry entries. Behavior lives in the
//! component modules; these types serde round-trip exactly for snapshots.

mod hypergraph;
mod registry;
mod state;
mod step;
mod thought;

pub use hypergraph::{EdgeRelation, HypergraphEdge, HypergraphNode, NodeId, Pattern};
pub use registry::{Goal, GoalStatus, Interest, Skill};
pub use state::{LoopState, WakeState};
pub use step::{
    EngineId, EngineState, Specialization, StepIdx, StepOutcome, StepResult, StepRole, STEP_COUNT,
};
pub use thought::{Thought, ThoughtId, ThoughtKind, ThoughtSource};
