//! Cognitive loop - the orchestrator that advances the 12-step pointer

mod orchestrator;

pub use orchestrator::{FatigueConfig, Orchestrator, OrchestratorConfig};
