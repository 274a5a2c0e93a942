//! Interest registry
//!
//! Strength decays exponentially from the last touch; reads compute the
//! effective strength at call time so nothing has to run a decay sweep.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::domain::Interest;

pub struct InterestRegistry {
    inner: RwLock<HashMap<Uuid, Interest>>,
}

impl InterestRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn add(&self, name: &str, strength: f64, decay_rate: f64) -> Interest {
        debug!(%name, strength, decay_rate, "InterestRegistry::add");
        let interest = Interest::new(name, strength, decay_rate);
        self.inner.write().unwrap().insert(interest.id, interest.clone());
        interest
    }

    pub fn insert(&self, interest: Interest) {
        self.inner.write().unwrap().insert(interest.id, interest);
    }

    pub fn get(&self, id: &Uuid) -> Option<Interest> {
        self.inner.read().unwrap().get(id).cloned()
    }

    pub fn update(&self, interest: Interest) {
        self.inner.write().unwrap().insert(interest.id, interest);
    }

    /// Re-anchor the decay curve at now without changing strength
    pub fn touch(&self, id: &Uuid) {
        let mut inner = self.inner.write().unwrap();
        if let Some(interest) = inner.get_mut(id) {
            let now = Utc::now();
            interest.strength = interest.effective_strength(now);
            interest.last_touched = now;
        }
    }

    /// Reinforce the named interest, creating it if unknown. The current
    /// effective strength is bumped by `amount` and re-anchored.
    pub fn reinforce(&self, name: &str, amount: f64) -> Interest {
        debug!(%name, amount, "InterestRegistry::reinforce");
        let mut inner = self.inner.write().unwrap();
        let now = Utc::now();
        let existing = inner.values_mut().find(|i| i.name == name);
        match existing {
            Some(interest) => {
                interest.strength = (interest.effective_strength(now) + amount).clamp(0.0, 1.0);
                interest.score = interest.strength;
                interest.last_touched = now;
                interest.clone()
            }
            None => {
                let interest = Interest::new(name, amount.clamp(0.0, 1.0), 0.01);
                inner.insert(interest.id, interest.clone());
                interest
            }
        }
    }

    /// Strongest interests as of now, by effective (decayed) strength
    pub fn top_n(&self, filter: impl Fn(&Interest) -> bool, n: usize) -> Vec<Interest> {
        let now = Utc::now();
        let inner = self.inner.read().unwrap();
        let mut interests: Vec<Interest> = inner.values().filter(|i| filter(i)).cloned().collect();
        interests.sort_by(|a, b| {
            b.effective_strength(now)
                .partial_cmp(&a.effective_strength(now))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        interests.truncate(n);
        interests
    }

    /// Peak effective strength across all interests; used as the curiosity
    /// signal for the consciousness stream
    pub fn max_strength(&self) -> f64 {
        let now = Utc::now();
        self.inner
            .read()
            .unwrap()
            .values()
            .map(|i| i.effective_strength(now))
            .fold(0.0, f64::max)
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn export(&self) -> Vec<Interest> {
        let mut interests: Vec<Interest> = self.inner.read().unwrap().values().cloned().collect();
        interests.sort_by_key(|i| i.id);
        interests
    }

    pub fn restore(&self, interests: Vec<Interest>) {
        let mut inner = self.inner.write().unwrap();
        inner.clear();
        for interest in interests {
            inner.insert(interest.id, interest);
        }
    }
}

impl Default for InterestRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn test_reinforce_creates_and_bumps() {
        let reg = InterestRegistry::new();
        let first = reg.reinforce("tide pools", 0.4);
        assert!((first.strength - 0.4).abs() < 1e-9);

        let second = reg.reinforce("tide pools", 0.3);
        assert!(second.strength > 0.4);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_reinforce_clamped() {
        let reg = InterestRegistry::new();
        reg.reinforce("x", 0.9);
        let bumped = reg.reinforce("x", 0.9);
        assert!(bumped.strength <= 1.0);
    }

    #[test]
    fn test_top_n_uses_effective_strength() {
        let reg = InterestRegistry::new();
        // Strong but fast-decaying and long idle
        let mut faded = Interest::new("faded", 0.9, 1.0);
        faded.last_touched = Utc::now() - TimeDelta::seconds(30);
        reg.insert(faded);
        // Weaker but fresh
        reg.add("fresh", 0.5, 0.01);

        let top = reg.top_n(|_| true, 1);
        assert_eq!(top[0].name, "fresh");
    }

    #[test]
    fn test_max_strength_empty_is_zero() {
        let reg = InterestRegistry::new();
        assert_eq!(reg.max_strength(), 0.0);
    }

    #[test]
    fn test_touch_anchors_decay() {
        let reg = InterestRegistry::new();
        let mut interest = Interest::new("drift", 0.8, 0.5);
        interest.last_touched = Utc::now() - TimeDelta::seconds(5);
        let id = interest.id;
        reg.insert(interest);

        reg.touch(&id);
        let touched = reg.get(&id).unwrap();
        // Strength re-anchored below the original after 5s of decay
        assert!(touched.strength < 0.8);
        assert!((Utc::now() - touched.last_touched).num_seconds() < 2);
    }

    #[test]
    fn test_export_restore_round_trip() {
        let reg = InterestRegistry::new();
        reg.add("a", 0.3, 0.1);
        reg.add("b", 0.6, 0.2);
        let exported = reg.export();

        let other = InterestRegistry::new();
        other.restore(exported.clone());
        assert_eq!(other.export(), exported);
    }
}
