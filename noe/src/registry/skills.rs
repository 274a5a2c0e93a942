//! Skill registry

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::domain::Skill;

pub struct SkillRegistry {
    inner: RwLock<HashMap<Uuid, Skill>>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn add(&self, name: &str, score: f64) -> Skill {
        debug!(%name, score, "SkillRegistry::add");
        let skill = Skill::new(name, score);
        self.inner.write().unwrap().insert(skill.id, skill.clone());
        skill
    }

    pub fn insert(&self, skill: Skill) {
        self.inner.write().unwrap().insert(skill.id, skill);
    }

    pub fn get(&self, id: &Uuid) -> Option<Skill> {
        self.inner.read().unwrap().get(id).cloned()
    }

    pub fn update(&self, skill: Skill) {
        self.inner.write().unwrap().insert(skill.id, skill);
    }

    pub fn touch(&self, id: &Uuid) {
        if let Some(skill) = self.inner.write().unwrap().get_mut(id) {
            skill.last_touched = Utc::now();
        }
    }

    /// Apply a practice session to the named skill, creating it on first
    /// practice. Returns the updated skill.
    pub fn practice(&self, name: &str, quality: f64) -> Skill {
        debug!(%name, quality, "SkillRegistry::practice");
        let mut inner = self.inner.write().unwrap();
        let existing = inner.values_mut().find(|s| s.name == name);
        match existing {
            Some(skill) => {
                skill.practice(quality);
                skill.clone()
            }
            None => {
                let mut skill = Skill::new(name, 0.5);
                skill.practice(quality);
                inner.insert(skill.id, skill.clone());
                skill
            }
        }
    }

    /// Highest-scoring skills matching the filter; ties broken by recency
    /// of practice
    pub fn top_n(&self, filter: impl Fn(&Skill) -> bool, n: usize) -> Vec<Skill> {
        let inner = self.inner.read().unwrap();
        let mut skills: Vec<Skill> = inner.values().filter(|s| filter(s)).cloned().collect();
        skills.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.last_touched.cmp(&a.last_touched))
        });
        skills.truncate(n);
        skills
    }

    /// Most recently practiced skills
    pub fn recently_practiced(&self, n: usize) -> Vec<Skill> {
        let inner = self.inner.read().unwrap();
        let mut skills: Vec<Skill> = inner.values().cloned().collect();
        skills.sort_by(|a, b| b.last_touched.cmp(&a.last_touched));
        skills.truncate(n);
        skills
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn export(&self) -> Vec<Skill> {
        let mut skills: Vec<Skill> = self.inner.read().unwrap().values().cloned().collect();
        skills.sort_by_key(|s| s.id);
        skills
    }

    pub fn restore(&self, skills: Vec<Skill>) {
        let mut inner = self.inner.write().unwrap();
        inner.clear();
        for skill in skills {
            inner.insert(skill.id, skill);
        }
    }
}

impl Default for SkillRegistry {
    fn default() -> Self {
        Self::new()
    }
}
