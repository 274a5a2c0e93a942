//! Goal registry

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{Goal, GoalStatus};

/// Goals keyed by id, behind an exclusive-write / shared-read lock
pub struct GoalRegistry {
    inner: RwLock<HashMap<Uuid, Goal>>,
    stale_after: Duration,
}

impl GoalRegistry {
    pub fn new(stale_after: Duration) -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            stale_after,
        }
    }

    /// Create and store a new open goal
    pub fn add(&self, name: &str, score: f64) -> Goal {
        debug!(%name, score, "GoalRegistry::add");
        let goal = Goal::new(name, score);
        self.inner.write().unwrap().insert(goal.id, goal.clone());
        goal
    }

    /// Insert a pre-built goal (snapshot restore)
    pub fn insert(&self, goal: Goal) {
        self.inner.write().unwrap().insert(goal.id, goal);
    }

    pub fn get(&self, id: &Uuid) -> Option<Goal> {
        self.inner.read().unwrap().get(id).cloned()
    }

    /// Replace an existing goal wholesale
    pub fn update(&self, goal: Goal) {
        debug!(goal_id = %goal.id, status = goal.status.as_str(), "GoalRegistry::update");
        self.inner.write().unwrap().insert(goal.id, goal);
    }

    /// Refresh `last_touched`
    pub fn touch(&self, id: &Uuid) {
        if let Some(goal) = self.inner.write().unwrap().get_mut(id) {
            goal.last_touched = Utc::now();
        }
    }

    /// Set status, returning the old one if the goal exists
    pub fn set_status(&self, id: &Uuid, status: GoalStatus) -> Option<GoalStatus> {
        debug!(%id, to = status.as_str(), "GoalRegistry::set_status");
        let mut inner = self.inner.write().unwrap();
        let goal = inner.get_mut(id)?;
        let old = goal.status;
        goal.status = status;
        goal.last_touched = Utc::now();
        Some(old)
    }

    /// Highest-scoring goals matching the filter
    pub fn top_n(&self, filter: impl Fn(&Goal) -> bool, n: usize) -> Vec<Goal> {
        let inner = self.inner.read().unwrap();
        let mut goals: Vec<Goal> = inner.values().filter(|g| filter(g)).cloned().collect();
        goals.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        goals.truncate(n);
        goals
    }

    /// Step-11 commit: promote the best open goal to pursuing.
    /// Returns the goal and its prior status for event publication.
    pub fn commit_intent(&self) -> Option<(Goal, GoalStatus)> {
        let mut inner = self.inner.write().unwrap();
        let best = inner
            .values()
            .filter(|g| g.status == GoalStatus::Open)
            .max_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal))
            .map(|g| g.id)?;
        let goal = inner.get_mut(&best)?;
        let old = goal.status;
        goal.status = GoalStatus::Pursuing;
        goal.last_touched = Utc::now();
        debug!(goal_id = %goal.id, name = %goal.name, "GoalRegistry::commit_intent");
        Some((goal.clone(), old))
    }

    /// Demote pursuing goals untouched for longer than the stale window.
    /// Returns the demoted goals for event publication.
    pub fn sweep_stale(&self) -> Vec<Goal> {
        let now = Utc::now();
        let mut demoted = Vec::new();
        let mut inner = self.inner.write().unwrap();
        for goal in inner.values_mut() {
            if goal.status == GoalStatus::Pursuing {
                let idle = (now - goal.last_touched)
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                if idle > self.stale_after {
                    debug!(goal_id = %goal.id, "GoalRegistry::sweep_stale: demoting");
                    goal.status = GoalStatus::Open;
                    demoted.push(goal.clone());
                }
            }
        }
        demoted
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted-by-id copy for snapshots (stable ordering for byte-equal saves)
    pub fn export(&self) -> Vec<Goal> {
        let mut goals: Vec<Goal> = self.inner.read().unwrap().values().cloned().collect();
        goals.sort_by_key(|g| g.id);
        goals
    }

    pub fn restore(&self, goals: Vec<Goal>) {
        let mut inner = self.inner.write().unwrap();
        inner.clear();
        for goal in goals {
            inner.insert(goal.id, goal);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> GoalRegistry {
        GoalRegistry::new(Duration::from_secs(3600))
    }

    #[test]
    fn test_add_and_get() {
        let reg = registry();
        let goal = reg.add("map the cove", 0.7);
        let got = reg.get(&goal.id).unwrap();
        assert_eq!(got.name, "map the cove");
        assert_eq!(got.status, GoalStatus::Open);
    }

    #[test]
    fn test_top_n_sorted_by_score() {
        let reg = registry();
        reg.add("low", 0.2);
        reg.add("high", 0.9);
        reg.add("mid", 0.5);

        let top = reg.top_n(|_| true, 2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].name, "high");
        assert_eq!(top[1].name, "mid");
    }

    #[test]
    fn test_commit_intent_promotes_best_open() {
        let reg = registry();
        reg.add("minor", 0.3);
        let big = reg.add("major", 0.9);

        let (committed, old) = reg.commit_intent().unwrap();
        assert_eq!(committed.id, big.id);
        assert_eq!(old, GoalStatus::Open);
        assert_eq!(committed.status, GoalStatus::Pursuing);

        // Second commit picks the remaining open goal
        let (second, _) = reg.commit_intent().unwrap();
        assert_eq!(second.name, "minor");

        // Nothing open left
        assert!(reg.commit_intent().is_none());
    }

    #[test]
    fn test_sweep_stale_demotes_idle_pursuing() {
        let reg = GoalRegistry::new(Duration::from_millis(0));
        let goal = reg.add("drift", 0.5);
        reg.set_status(&goal.id, GoalStatus::Pursuing);

        std::thread::sleep(Duration::from_millis(5));
        let demoted = reg.sweep_stale();
        assert_eq!(demoted.len(), 1);
        assert_eq!(reg.get(&goal.id).unwrap().status, GoalStatus::Open);
    }

    #[test]
    fn test_sweep_ignores_completed() {
        let reg = GoalRegistry::new(Duration::from_millis(0));
        let goal = reg.add("done", 0.5);
        reg.set_status(&goal.id, GoalStatus::Completed);

        std::thread::sleep(Duration::from_millis(5));
        assert!(reg.sweep_stale().is_empty());
        assert_eq!(reg.get(&goal.id).unwrap().status, GoalStatus::Completed);
    }

    #[test]
    fn test_export_restore_round_trip() {
        let reg = registry();
        reg.add("a", 0.1);
        reg.add("b", 0.2);
        let exported = reg.export();

        let other = registry();
        other.restore(exported.clone());
        assert_eq!(other.export(), exported);
    }

    #[test]
    fn test_export_is_sorted_by_id() {
        let reg = registry();
        for i in 0..10 {
            reg.add(&format!("g{}", i), 0.5);
        }
        let exported = reg.export();
        assert!(exported.windows(2).all(|w| w[0].id <= w[1].id));
    }
}
