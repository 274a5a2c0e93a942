//! Property tests over the pure laws of the core

use std::collections::BinaryHeap;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use proptest::prelude::*;

use noema::domain::{Interest, LoopState, Skill, StepIdx};
use noema::engine::{InferenceTask, TaskKind};
use noema::providers::FallbackLibrary;

proptest! {
    /// Heap pop order honors priority, then earlier scheduling, then id
    #[test]
    fn task_queue_ordering_law(
        specs in proptest::collection::vec((0u8..=100, 0i64..1000, "[a-z]{1,8}"), 1..40)
    ) {
        let base = Utc::now();
        let mut heap = BinaryHeap::new();
        for (priority, offset_ms, id) in &specs {
            heap.push(InferenceTask {
                id: id.clone(),
                kind: TaskKind::External,
                priority: *priority,
                payload: serde_json::json!({}),
                scheduled_at: base + TimeDelta::milliseconds(*offset_ms),
            });
        }

        let mut previous: Option<InferenceTask> = None;
        while let Some(task) = heap.pop() {
            if let Some(prev) = &previous {
                let in_order = prev.priority > task.priority
                    || (prev.priority == task.priority
                        && prev.scheduled_at < task.scheduled_at)
                    || (prev.priority == task.priority
                        && prev.scheduled_at == task.scheduled_at
                        && prev.id <= task.id);
                prop_assert!(
                    in_order,
                    "popped {:?} after {:?}",
                    (task.priority, task.scheduled_at, &task.id),
                    (prev.priority, prev.scheduled_at, &prev.id)
                );
            }
            previous = Some(task);
        }
    }

    /// The step pointer always stays in 1..=12 and wraps exactly at 12
    #[test]
    fn step_pointer_stays_in_range(start in 1u8..=12, advances in 0usize..100) {
        let mut step = StepIdx::new(start).unwrap();
        let mut wraps = 0usize;
        for _ in 0..advances {
            let (next, wrapped) = step.next();
            prop_assert!((1..=12).contains(&next.get()));
            if wrapped {
                prop_assert_eq!(step.get(), 12);
                prop_assert_eq!(next.get(), 1);
                wraps += 1;
            }
            step = next;
        }
        prop_assert!(wraps <= advances / 12 + 1);
    }

    /// Interest decay never increases strength and never goes negative
    #[test]
    fn interest_decay_is_monotone(
        strength in 0.0f64..=1.0,
        decay_rate in 0.0f64..5.0,
        elapsed_ms in 0i64..100_000
    ) {
        let mut interest = Interest::new("drift", strength, decay_rate);
        interest.last_touched = Utc::now() - TimeDelta::milliseconds(elapsed_ms);
        let effective = interest.effective_strength(Utc::now());
        prop_assert!(effective <= strength + 1e-9);
        prop_assert!(effective >= 0.0);
    }

    /// Skill proficiency stays in [0, 1] and grows under practice
    #[test]
    fn skill_practice_is_bounded(qualities in proptest::collection::vec(0.0f64..=1.0, 1..50)) {
        let mut skill = Skill::new("craft", 0.5);
        let mut last = skill.proficiency;
        for quality in qualities {
            let next = skill.practice(quality);
            prop_assert!(next >= last - 1e-12);
            prop_assert!((0.0..=1.0).contains(&next));
            last = next;
        }
    }

    /// Fallback responses are deterministic in the prompt
    #[test]
    fn fallback_is_deterministic(prompt in ".{0,80}") {
        let lib = FallbackLibrary::new();
        prop_assert_eq!(lib.respond(&prompt), lib.respond(&prompt));
    }

    /// LoopState serde round-trips exactly, fractional scalars included
    #[test]
    fn loop_state_round_trips(cycle in 0u64..10_000, fatigue in 0.0f64..=1.0, coherence in 0.0f64..=1.0) {
        let mut state = LoopState::new(Duration::from_millis(500));
        state.cycle_count = cycle;
        state.fatigue = fatigue;
        state.coherence = coherence;

        let json = serde_json::to_string(&state).unwrap();
        let back: LoopState = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(back, state);
    }
}
