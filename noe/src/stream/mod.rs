//! Stream of Consciousness - thought production on its own cadence
//!
//! Runs independently of the 12-step loop: every few seconds (jittered) it
//! picks a source weighted by interests and the loop's current step role,
//! assembles a context window, asks the provider chain for prose (or falls
//! back to a per-source template when no provider is registered), and
//! publishes the thought. Cadence adapts to the wake state.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tracing::{debug, trace};

use crate::domain::{LoopState, Thought, ThoughtKind, ThoughtSource, WakeState};
use crate::events::{CognitiveEvent, EventBus, Topic};
use crate::providers::{GenerateOptions, ProviderRegistry};
use crate::registry::Registries;

/// Shared bounded buffer of recently published thoughts. Filled by a bus
/// subscriber; read by the stream (context windows) and the snapshotter.
pub struct RecentThoughts {
    inner: RwLock<VecDeque<Thought>>,
    cap: usize,
}

impl RecentThoughts {
    pub fn new(cap: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: RwLock::new(VecDeque::with_capacity(cap)),
            cap,
        })
    }

    pub fn push(&self, thought: Thought) {
        let mut inner = self.inner.write().unwrap();
        if inner.iter().any(|t| t.id == thought.id) {
            return;
        }
        inner.push_back(thought);
        while inner.len() > self.cap {
            inner.pop_front();
        }
    }

    pub fn to_vec(&self) -> Vec<Thought> {
        self.inner.read().unwrap().iter().cloned().collect()
    }

    pub fn last_n(&self, n: usize) -> Vec<Thought> {
        let inner = self.inner.read().unwrap();
        inner.iter().rev().take(n).rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Seed from a snapshot (restored thoughts are context, not re-emitted)
    pub fn restore(&self, thoughts: Vec<Thought>) {
        let mut inner = self.inner.write().unwrap();
        inner.clear();
        for thought in thoughts.into_iter().take(self.cap) {
            inner.push_back(thought);
        }
    }

    /// Spawn the bus subscriber that keeps the buffer current
    pub fn spawn_collector(
        self: &Arc<Self>,
        bus: &EventBus,
        mut shutdown: watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let buffer = Arc::clone(self);
        let mut sub = bus.subscribe(Topic::Thought);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = sub.recv() => match event {
                        Some(event) => {
                            if let Some(thought) = event.as_thought() {
                                buffer.push(thought);
                            }
                        }
                        None => break,
                    },
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    }
}

#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Base cadence between thoughts
    pub cadence: Duration,
    /// Jitter fraction applied to the cadence
    pub jitter: f64,
    /// Thoughts carried into the context window
    pub context_thoughts: usize,
    pub context_goals: usize,
    pub context_skills: usize,
    pub context_interests: usize,
    /// Curiosity above this keeps thoughts flowing through Resting
    pub curiosity_gate: f64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            cadence: Duration::from_secs(3),
            jitter: 0.2,
            context_thoughts: 10,
            context_goals: 3,
            context_skills: 3,
            context_interests: 3,
            curiosity_gate: 0.6,
        }
    }
}

pub struct ConsciousnessStream {
    config: StreamConfig,
    bus: Arc<EventBus>,
    providers: Arc<ProviderRegistry>,
    registries: Arc<Registries>,
    recent: Arc<RecentThoughts>,
    loop_rx: watch::Receiver<LoopState>,
    wake_rx: watch::Receiver<WakeState>,
}

impl ConsciousnessStream {
    pub fn new(
        config: StreamConfig,
        bus: Arc<EventBus>,
        providers: Arc<ProviderRegistry>,
        registries: Arc<Registries>,
        recent: Arc<RecentThoughts>,
        loop_rx: watch::Receiver<LoopState>,
        wake_rx: watch::Receiver<WakeState>,
    ) -> Self {
        Self {
            config,
            bus,
            providers,
            registries,
            recent,
            loop_rx,
            wake_rx,
        }
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        debug!(cadence = ?self.config.cadence, "consciousness stream started");
        loop {
            let delay = self.next_delay();
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            let wake = *self.wake_rx.borrow();
            match wake {
                WakeState::Dreaming | WakeState::Shutdown => {
                    trace!(%wake, "stream paused");
                    continue;
                }
                WakeState::Resting => {
                    let curiosity = self.registries.interests.max_strength();
                    if curiosity <= self.config.curiosity_gate {
                        trace!(curiosity, "resting and not curious enough");
                        continue;
                    }
                }
                _ => {}
            }

            let thought = self.compose().await;
            debug!(kind = thought.kind.as_str(), source = thought.source.as_str(), "thought produced");
            self.bus.publish(CognitiveEvent::thought(&thought));
        }
        debug!("consciousness stream stopped");
    }

    fn next_delay(&self) -> Duration {
        let wake = *self.wake_rx.borrow();
        let factor = match wake {
            WakeState::Tiring | WakeState::Resting => 2.0,
            _ => 1.0,
        };
        let jitter = {
            let mut rng = rand::rng();
            1.0 + self.config.jitter * rng.random_range(-1.0..=1.0)
        };
        self.config.cadence.mul_f64(factor * jitter.max(0.1))
    }

    /// Pick a source weighted by interest strength and the current step role
    fn choose_source(&self) -> ThoughtSource {
        let step = self.loop_rx.borrow().current_step.get();
        let curiosity = self.registries.interests.max_strength();

        let weight = |source: ThoughtSource| -> f64 {
            let step_bias = match (source, step) {
                (ThoughtSource::Memory | ThoughtSource::Association, 2..=6) => 1.5,
                (ThoughtSource::Imagination, 9..=12) => 1.5,
                (ThoughtSource::Perception | ThoughtSource::Internal, 1 | 7 | 8) => 1.5,
                _ => 1.0,
            };
            let interest_bias = match source {
                ThoughtSource::Curiosity => 1.0 + curiosity,
                ThoughtSource::Association => 1.0 + curiosity * 0.5,
                _ => 1.0,
            };
            step_bias * interest_bias
        };

        let weights: Vec<(ThoughtSource, f64)> =
            ThoughtSource::ALL.iter().map(|s| (*s, weight(*s))).collect();
        let total: f64 = weights.iter().map(|(_, w)| w).sum();
        let mut roll = rand::rng().random_range(0.0..total);
        for (source, w) in &weights {
            if roll < *w {
                return *source;
            }
            roll -= w;
        }
        ThoughtSource::Internal
    }

    fn kind_for(source: ThoughtSource) -> ThoughtKind {
        match source {
            ThoughtSource::Memory => ThoughtKind::Memory,
            ThoughtSource::Perception => ThoughtKind::Observation,
            ThoughtSource::Imagination => ThoughtKind::Insight,
            ThoughtSource::Association => ThoughtKind::Reflection,
            ThoughtSource::Curiosity => ThoughtKind::Question,
            ThoughtSource::Internal => ThoughtKind::MetaCognitive,
        }
    }

    fn context_prompt(&self, source: ThoughtSource) -> String {
        let thoughts = self.recent.last_n(self.config.context_thoughts);
        let goals = self.registries.goals.top_n(|_| true, self.config.context_goals);
        let skills = self.registries.skills.recently_practiced(self.config.context_skills);
        let interests = self.registries.interests.top_n(|_| true, self.config.context_interests);

        let mut prompt = format!("Produce one short {} thought.", source.as_str());
        if !interests.is_empty() {
            let names: Vec<&str> = interests.iter().map(|i| i.name.as_str()).collect();
            prompt.push_str(&format!(" Current interests: {}.", names.join(", ")));
        }
        if !goals.is_empty() {
            let names: Vec<&str> = goals.iter().map(|g| g.name.as_str()).collect();
            prompt.push_str(&format!(" Active goals: {}.", names.join(", ")));
        }
        if !skills.is_empty() {
            let names: Vec<&str> = skills.iter().map(|s| s.name.as_str()).collect();
            prompt.push_str(&format!(" Practiced skills: {}.", names.join(", ")));
        }
        if let Some(last) = thoughts.last() {
            prompt.push_str(&format!(" The previous thought was: \"{}\"", last.content));
        }
        prompt
    }

    fn source_template(&self, source: ThoughtSource) -> String {
        let topic = self
            .registries
            .interests
            .top_n(|_| true, 1)
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "the present moment".to_string());
        match source {
            ThoughtSource::Memory => format!("Recalling what is known about {}.", topic),
            ThoughtSource::Perception => format!("Noticing {} as it is right now.", topic),
            ThoughtSource::Imagination => format!("Imagining where {} could lead.", topic),
            ThoughtSource::Association => format!("Tracing what {} connects to.", topic),
            ThoughtSource::Curiosity => format!("What remains unknown about {}?", topic),
            ThoughtSource::Internal => format!("Weighing how the thinking about {} is going.", topic),
        }
    }

    async fn compose(&self) -> Thought {
        let source = self.choose_source();
        let content = if self.providers.is_empty() {
            self.source_template(source)
        } else {
            let prompt = self.context_prompt(source);
            self.providers
                .generate(&prompt, &GenerateOptions::default())
                .await
                .text
        };

        let associations: Vec<_> = self
            .recent
            .last_n(3)
            .iter()
            .map(|t| t.id)
            .collect();
        let salience = 0.3 + 0.6 * self.registries.interests.max_strength();

        Thought::new(Self::kind_for(source), source, content)
            .with_associations(associations)
            .with_salience(salience)
    }
}
