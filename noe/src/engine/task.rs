//! Inference tasks and their queue ordering

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::StepIdx;

/// Where a task came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskKind {
    /// Synthesized from the step's own role when the queue is empty
    StepWork,
    /// Injected from outside via the control surface
    External,
}

/// Priority of synthesized step work; external tasks outrank it by default
const STEP_WORK_PRIORITY: u8 = 50;

/// A unit of work queued on an engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceTask {
    pub id: String,
    pub kind: TaskKind,
    /// 0..=100, higher first
    pub priority: u8,
    pub payload: serde_json::Value,
    pub scheduled_at: DateTime<Utc>,
}

impl InferenceTask {
    pub fn new(kind: TaskKind, priority: u8, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            kind,
            priority: priority.min(100),
            payload,
            scheduled_at: Utc::now(),
        }
    }

    pub fn external(payload: serde_json::Value, priority: u8) -> Self {
        Self::new(TaskKind::External, priority, payload)
    }

    /// The default work an engine materializes for a step when nothing is
    /// queued
    pub fn step_default(step: StepIdx) -> Self {
        Self::new(
            TaskKind::StepWork,
            STEP_WORK_PRIORITY,
            serde_json::json!({ "step": step.get() }),
        )
    }
}

impl Eq for InferenceTask {}

impl PartialEq for InferenceTask {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Ord for InferenceTask {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Max-heap: higher priority first, then earlier scheduling, then
        // lexicographically smaller id
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.scheduled_at.cmp(&self.scheduled_at))
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for InferenceTask {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
