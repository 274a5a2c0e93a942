//! Goal/Skill/Interest registries - the prioritization state engines consult
//!
//! Each registry sits behind its own exclusive-write / shared-read lock;
//! nothing holds a registry lock across a bus publish.

use std::sync::Arc;
use std::time::Duration;

mod goals;
mod interests;
mod skills;

pub use goals::GoalRegistry;
pub use interests::InterestRegistry;
pub use skills::SkillRegistry;

/// The three registries bundled for handing to engines and the stream
pub struct Registries {
    pub goals: GoalRegistry,
    pub skills: SkillRegistry,
    pub interests: InterestRegistry,
}

impl Registries {
    pub fn new(goal_stale_after: Duration) -> Arc<Self> {
        Arc::new(Self {
            goals: GoalRegistry::new(goal_stale_after),
            skills: SkillRegistry::new(),
            interests: InterestRegistry::new(),
        })
    }
}
