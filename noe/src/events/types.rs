//! Event vocabulary for the cognitive bus
//!
//! `CognitiveEvent` is the only thing that travels between components. The
//! core never interprets `payload` internals - it is an opaque JSON carrier
//! plus the `kind` tag; the typed constructors/accessors here are a
//! convenience for subscribers that own the decoding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Pattern, Thought, WakeState};

/// Bus topic. One broadcast channel exists per topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    Thought,
    GoalUpdate,
    SkillPractice,
    WisdomGained,
    DreamInsight,
    StateChange,
    ExternalMessage,
    CycleComplete,
}

impl Topic {
    pub const ALL: [Topic; 8] = [
        Topic::Thought,
        Topic::GoalUpdate,
        Topic::SkillPractice,
        Topic::WisdomGained,
        Topic::DreamInsight,
        Topic::StateChange,
        Topic::ExternalMessage,
        Topic::CycleComplete,
    ];

    /// Exported topic name
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Thought => "thought",
            Topic::GoalUpdate => "goal_update",
            Topic::SkillPractice => "skill_practice",
            Topic::WisdomGained => "wisdom_gained",
            Topic::DreamInsight => "dream_insight",
            Topic::StateChange => "state_change",
            Topic::ExternalMessage => "external_message",
            Topic::CycleComplete => "cycle_complete",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Topic::Thought => 0,
            Topic::GoalUpdate => 1,
            Topic::SkillPractice => 2,
            Topic::WisdomGained => 3,
            Topic::DreamInsight => 4,
            Topic::StateChange => 5,
            Topic::ExternalMessage => 6,
            Topic::CycleComplete => 7,
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed cognitive event. Delivery is at-least-once; subscribers must be
/// idempotent on `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CognitiveEvent {
    pub id: Uuid,
    pub kind: Topic,
    /// Scheduling priority in 0..=100
    pub priority: u8,
    pub scheduled_at: DateTime<Utc>,
    /// Opaque payload; subscribers decode it
    pub payload: serde_json::Value,
}

impl CognitiveEvent {
    pub fn new(kind: Topic, priority: u8, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::now_v7(),
            kind,
            priority: priority.min(100),
            scheduled_at: Utc::now(),
            payload,
        }
    }

    // === Typed constructors ===

    /// A thought published by the stream of consciousness or an engine.
    /// The event timestamp is taken after the thought's own, so any cited
    /// association is strictly older than the citing event.
    pub fn thought(thought: &Thought) -> Self {
        let payload = serde_json::to_value(thought).unwrap_or_default();
        Self::new(Topic::Thought, 50, payload)
    }

    pub fn goal_update(goal_id: Uuid, name: &str, from: &str, to: &str) -> Self {
        Self::new(
            Topic::GoalUpdate,
            60,
            serde_json::json!({
                "goal_id": goal_id,
                "name": name,
                "from": from,
                "to": to,
            }),
        )
    }

    pub fn skill_practice(name: &str, quality: f64) -> Self {
        Self::new(
            Topic::SkillPractice,
            40,
            serde_json::json!({ "name": name, "quality": quality }),
        )
    }

    pub fn dream_insight(pattern: &Pattern) -> Self {
        let payload = serde_json::to_value(pattern).unwrap_or_default();
        Self::new(Topic::DreamInsight, 70, payload)
    }

    pub fn state_change(from: WakeState, to: WakeState) -> Self {
        Self::new(
            Topic::StateChange,
            90,
            serde_json::json!({ "from": from, "to": to }),
        )
    }

    pub fn cycle_complete(cycle_count: u64, fatigue: f64, coherence: f64) -> Self {
        Self::new(
            Topic::CycleComplete,
            80,
            serde_json::json!({
                "cycle_count": cycle_count,
                "fatigue": fatigue,
                "coherence": coherence,
            }),
        )
    }

    pub fn external_message(content: &str) -> Self {
        Self::new(
            Topic::ExternalMessage,
            75,
            serde_json::json!({ "content": content }),
        )
    }

    /// Consolidation report, published as wisdom when a dream pass commits
    pub fn wisdom_gained(summary: serde_json::Value) -> Self {
        Self::new(Topic::WisdomGained, 65, summary)
    }

    // === Typed accessors ===

    pub fn as_thought(&self) -> Option<Thought> {
        (self.kind == Topic::Thought)
            .then(|| serde_json::from_value(self.payload.clone()).ok())
            .flatten()
    }

    pub fn as_pattern(&self) -> Option<Pattern> {
        (self.kind == Topic::DreamInsight)
            .then(|| serde_json::from_value(self.payload.clone()).ok())
            .flatten()
    }

    pub fn as_state_change(&self) -> Option<(WakeState, WakeState)> {
        if self.kind != Topic::StateChange {
            return None;
        }
        let from = serde_json::from_value(self.payload.get("from")?.clone()).ok()?;
        let to = serde_json::from_value(self.payload.get("to")?.clone()).ok()?;
        Some((from, to))
    }

    pub fn cycle_fatigue(&self) -> Option<f64> {
        (self.kind == Topic::CycleComplete)
            .then(|| self.payload.get("fatigue").and_then(|v| v.as_f64()))
            .flatten()
    }
}

/// A timestamped entry for the JSONL activity log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,
    pub event: CognitiveEvent,
}

impl EventLogEntry {
    pub fn new(event: CognitiveEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ThoughtKind, ThoughtSource};

    #[test]
    fn test_topic_names() {
        assert_eq!(Topic::Thought.as_str(), "thought");
        assert_eq!(Topic::CycleComplete.as_str(), "cycle_complete");
        assert_eq!(Topic::ALL.len(), 8);
    }

    #[test]
    fn test_topic_indices_distinct() {
        let indices: std::collections::HashSet<_> = Topic::ALL.iter().map(|t| t.index()).collect();
        assert_eq!(indices.len(), Topic::ALL.len());
    }

    #[test]
    fn test_priority_clamped() {
        let event = CognitiveEvent::new(Topic::Thought, 255, serde_json::json!({}));
        assert_eq!(event.priority, 100);
    }

    #[test]
    fn test_thought_event_round_trip() {
        let thought = Thought::new(ThoughtKind::Reflection, ThoughtSource::Memory, "the pier");
        let event = CognitiveEvent::thought(&thought);
        assert_eq!(event.kind, Topic::Thought);
        let decoded = event.as_thought().unwrap();
        assert_eq!(decoded, thought);
    }

    #[test]
    fn test_thought_event_timestamp_after_thought() {
        let thought = Thought::new(ThoughtKind::Reflection, ThoughtSource::Memory, "x");
        let event = CognitiveEvent::thought(&thought);
        assert!(event.scheduled_at >= thought.timestamp);
    }

    #[test]
    fn test_state_change_accessor() {
        let event = CognitiveEvent::state_change(WakeState::Resting, WakeState::Dreaming);
        let (from, to) = event.as_state_change().unwrap();
        assert_eq!(from, WakeState::Resting);
        assert_eq!(to, WakeState::Dreaming);
    }

    #[test]
    fn test_accessor_rejects_wrong_kind() {
        let event = CognitiveEvent::external_message("hello");
        assert!(event.as_thought().is_none());
        assert!(event.as_state_change().is_none());
    }

    #[test]
    fn test_event_serialization() {
        let event = CognitiveEvent::cycle_complete(3, 0.4, 0.9);
        let json = serde_json::to_string(&event).unwrap();
        let back: CognitiveEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, event.id);
        assert_eq!(back.cycle_fatigue(), Some(0.4));
    }
}
