//! Registry entries - goals, skills and interests

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a goal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GoalStatus {
    Open,
    Pursuing,
    Completed,
    Abandoned,
}

impl GoalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalStatus::Open => "open",
            GoalStatus::Pursuing => "pursuing",
            GoalStatus::Completed => "completed",
            GoalStatus::Abandoned => "abandoned",
        }
    }
}

/// A goal tracked by the goal registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub score: f64,
    pub last_touched: DateTime<Utc>,
    pub status: GoalStatus,
}

impl Goal {
    pub fn new(name: impl Into<String>, score: f64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            created_at: now,
            score: score.clamp(0.0, 1.0),
            last_touched: now,
            status: GoalStatus::Open,
        }
    }
}

/// A skill with proficiency that grows with diminishing returns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub score: f64,
    pub last_touched: DateTime<Utc>,
    pub proficiency: f64,
    pub practice_count: u64,
}

impl Skill {
    pub fn new(name: impl Into<String>, score: f64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            created_at: now,
            score: score.clamp(0.0, 1.0),
            last_touched: now,
            proficiency: 0.0,
            practice_count: 0,
        }
    }

    /// Apply one practice session. Gain is derived from quality in [0, 1]
    /// and mapped into the 0.05..=0.2 band; returns the new proficiency.
    pub fn practice(&mut self, quality: f64) -> f64 {
        let gain = 0.05 + quality.clamp(0.0, 1.0) * 0.15;
        self.proficiency += (1.0 - self.proficiency) * gain;
        self.practice_count += 1;
        self.last_touched = Utc::now();
        self.proficiency
    }
}

/// An interest whose strength decays exponentially when untouched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interest {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub score: f64,
    pub last_touched: DateTime<Utc>,
    /// Decay constant per second
    pub decay_rate: f64,
    /// Strength at `last_touched`; decays from there
    pub strength: f64,
}

impl Interest {
    pub fn new(name: impl Into<String>, strength: f64, decay_rate: f64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            created_at: now,
            score: strength.clamp(0.0, 1.0),
            last_touched: now,
            decay_rate: decay_rate.max(0.0),
            strength: strength.clamp(0.0, 1.0),
        }
    }

    /// Strength as of `now`, after exponential decay since last touch
    pub fn effective_strength(&self, now: DateTime<Utc>) -> f64 {
        let elapsed = (now - self.last_touched).num_milliseconds().max(0) as f64 / 1000.0;
        self.strength * (-self.decay_rate * elapsed).exp()
    }
}
