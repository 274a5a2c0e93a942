//! Inference engines - three specialized workers over the 12-step loop
//!
//! E1 (memory, steps 2-6), E2 (coherence, steps 1/7/8) and E3 (imagination,
//! steps 9-12). Engines hold a handle to the bus and the shared state
//! surfaces but never to each other or the orchestrator.

mod inference;
mod steps;
mod task;

pub use inference::{EngineCommand, EngineHandle, InferenceEngine, StepReport};
pub use steps::{run_role, EngineContext, StepError, StepOutput};
pub use task::{InferenceTask, TaskKind};
