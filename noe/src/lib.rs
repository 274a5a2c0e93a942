//! Noema - a phase-locked cognitive scheduler
//!
//! Noema runs an autonomous cognitive agent as a single process: three
//! specialized inference engines share a 12-step loop under a phase-offset
//! clock, a wake/rest/dream state machine paces the workload, a stream of
//! consciousness produces thoughts on its own cadence, and a hypergraph
//! integrator consolidates memory while dreaming. Everything communicates
//! over one typed event bus, and all mutable state survives restarts
//! through atomic snapshots.
//!
//! # Core Concepts
//!
//! - **One bus, no back-references**: components hold a handle to the bus
//!   but never to each other
//! - **Single writers**: loop state, wake state and the hypergraph each
//!   have exactly one writing task
//! - **Cognition never stalls on an LLM**: the provider chain degrades to
//!   deterministic templates, not errors
//! - **Crash-safe by snapshot**: temp-file, fsync, atomic rename, with the
//!   previous snapshot kept as fallback
//!
//! # Modules
//!
//! - [`events`] - typed pub/sub bus and the event vocabulary
//! - [`clock`] - the three phase-offset tick streams
//! - [`engine`] - inference engines and step roles
//! - [`cycle`] - the loop orchestrator
//! - [`wake`] - the wake/rest/dream state machine
//! - [`stream`] - the stream of consciousness
//! - [`hypergraph`] - associative memory and dream consolidation
//! - [`registry`] - goals, skills and interests
//! - [`snapshot`] - the persistence contract
//! - [`core`] - construction and the control surface

pub mod cli;
pub mod clock;
pub mod config;
pub mod core;
pub mod cycle;
pub mod domain;
pub mod engine;
pub mod events;
pub mod hypergraph;
pub mod metrics;
pub mod providers;
pub mod registry;
pub mod snapshot;
pub mod stream;
pub mod wake;

// Re-export commonly used types
pub use crate::core::CognitiveCore;
pub use config::{Config, ProviderConfig};
pub use cycle::{FatigueConfig, Orchestrator, OrchestratorConfig};
pub use domain::{
    EngineId, EngineState, Goal, GoalStatus, HypergraphEdge, HypergraphNode, Interest, LoopState,
    Pattern, Skill, StepIdx, StepOutcome, StepResult, Thought, ThoughtKind, ThoughtSource,
    WakeState,
};
pub use engine::{EngineHandle, InferenceEngine, InferenceTask};
pub use events::{CognitiveEvent, EventBus, Subscription, Topic};
pub use hypergraph::{Hypergraph, HypergraphIntegrator, Similarity, SubstringSimilarity};
pub use metrics::CoreMetrics;
pub use providers::{
    GenerateOptions, GenerateResult, Health, LlmProvider, OpenAiProvider, ProviderError,
    ProviderRegistry,
};
pub use registry::{GoalRegistry, InterestRegistry, Registries, SkillRegistry};
pub use snapshot::{CoreSnapshot, LoadOutcome, SnapshotStore};
pub use stream::{ConsciousnessStream, RecentThoughts};
pub use wake::{WakeConfig, WakeMachine};
