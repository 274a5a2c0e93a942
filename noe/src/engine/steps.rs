//! Step role implementations
//!
//! Each of the 12 roles is a small deterministic routine over the shared
//! state surfaces (registries, hypergraph, context data); only Express
//! reaches for the provider chain. Roles report Skipped when they have no
//! input to work with, which is the normal case on a cold start.

use std::sync::{Arc, RwLock};

use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{GoalStatus, LoopState, StepRole, Thought, ThoughtKind, ThoughtSource};
use crate::events::{CognitiveEvent, EventBus};
use crate::hypergraph::{Hypergraph, SubstringSimilarity};
use crate::providers::{GenerateOptions, ProviderRegistry};
use crate::registry::Registries;

/// Patterns republished per pattern-match step
const PATTERNS_PER_STEP: usize = 3;

/// Candidate actions simulated per future step
const CANDIDATES: usize = 3;

/// Failure from a step role
#[derive(Debug, Error)]
pub enum StepError {
    #[error("transient step failure: {0}")]
    Transient(String),
    #[error("fatal step failure: {0}")]
    Fatal(String),
}

/// What a role produced
#[derive(Debug, Default)]
pub struct StepOutput {
    pub emitted_events: Vec<Uuid>,
    /// Set only by the coherence assessment
    pub coherence: Option<f64>,
    pub skipped: bool,
}

impl StepOutput {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Shared surfaces a role works against. `context_data` is the free-form
/// cross-step scratch map; cancellation travels separately as `ctx` watch
/// channels owned by the tasks themselves.
pub struct EngineContext {
    pub bus: Arc<EventBus>,
    pub providers: Arc<ProviderRegistry>,
    pub registries: Arc<Registries>,
    pub graph: Arc<RwLock<Hypergraph>>,
    pub context_data: Arc<RwLock<serde_json::Map<String, Value>>>,
    pub loop_state: watch::Receiver<LoopState>,
}

impl EngineContext {
    fn ctx_get(&self, key: &str) -> Option<Value> {
        self.context_data.read().unwrap().get(key).cloned()
    }

    fn ctx_set(&self, key: &str, value: Value) {
        self.context_data.write().unwrap().insert(key.to_string(), value);
    }

    fn ctx_take(&self, key: &str) -> Option<Value> {
        self.context_data.write().unwrap().remove(key)
    }

    fn dominant_topic(&self) -> Option<String> {
        self.ctx_get("dominant_topic")
            .and_then(|v| v.as_str().map(str::to_string))
    }
}

/// Execute one role. The caller enforces the soft deadline and wraps the
/// output into a `StepResult`.
pub async fn run_role(role: StepRole, ctx: &EngineContext) -> Result<StepOutput, StepError> {
    debug!(?role, "run_role");
    match role {
        StepRole::RelevanceRealization => relevance_realization(ctx),
        StepRole::RecallEpisodic => recall_episodic(ctx),
        StepRole::RecallProcedural => recall_procedural(ctx),
        StepRole::RecallDeclarative => recall_declarative(ctx),
        StepRole::PatternMatch => pattern_match(ctx),
        StepRole::IntegratePast => integrate_past(ctx),
        StepRole::OrientPresent => orient_present(ctx),
        StepRole::AssessCoherence => assess_coherence(ctx),
        StepRole::SimulateFuture => simulate_future(ctx),
        StepRole::EvaluateAffordances => evaluate_affordances(ctx),
        StepRole::CommitIntent => commit_intent(ctx),
        StepRole::Express => express(ctx).await,
    }
}

/// Step 1: select the dominant topic from interests and goals
fn relevance_realization(ctx: &EngineContext) -> Result<StepOutput, StepError> {
    let interests = ctx.registries.interests.top_n(|_| true, 1);
    let goals = ctx.registries.goals.top_n(|g| g.status != GoalStatus::Completed, 1);

    let topic = match (interests.first(), goals.first()) {
        (Some(i), Some(g)) => {
            // The stronger signal wins the topic slot
            if i.effective_strength(chrono::Utc::now()) >= g.score {
                i.name.clone()
            } else {
                g.name.clone()
            }
        }
        (Some(i), None) => i.name.clone(),
        (None, Some(g)) => g.name.clone(),
        (None, None) => return Ok(StepOutput::skipped()),
    };

    debug!(%topic, "dominant topic selected");
    if let Some(interest) = interests.first() {
        ctx.registries.interests.touch(&interest.id);
    }
    ctx.ctx_set("dominant_topic", Value::String(topic));
    Ok(StepOutput::default())
}

/// Step 2: activate thought nodes relevant to the dominant topic
fn recall_episodic(ctx: &EngineContext) -> Result<StepOutput, StepError> {
    let Some(topic) = ctx.dominant_topic() else {
        return Ok(StepOutput::skipped());
    };
    let mut graph = ctx.graph.write().unwrap();
    let hits = graph.search_by_content(&topic, &SubstringSimilarity);
    if hits.is_empty() {
        return Ok(StepOutput::skipped());
    }
    let ids: Vec<Value> = hits
        .iter()
        .take(8)
        .map(|(id, _)| Value::String(id.to_string()))
        .collect();
    for (id, _) in hits.iter().take(8) {
        graph.touch_node(id);
    }
    drop(graph);
    ctx.ctx_set("active_nodes", Value::Array(ids));
    Ok(StepOutput::default())
}

/// Step 3: raise skills matching the topic
fn recall_procedural(ctx: &EngineContext) -> Result<StepOutput, StepError> {
    let topic = ctx.dominant_topic().unwrap_or_default();
    let matching = ctx.registries.skills.top_n(
        |s| topic.is_empty() || s.name.contains(&topic) || topic.contains(&s.name),
        3,
    );
    if matching.is_empty() {
        return Ok(StepOutput::skipped());
    }
    for skill in &matching {
        ctx.registries.skills.touch(&skill.id);
    }
    Ok(StepOutput::default())
}

/// Step 4: load concept nodes
fn recall_declarative(ctx: &EngineContext) -> Result<StepOutput, StepError> {
    let mut graph = ctx.graph.write().unwrap();
    let concepts = graph.recent_nodes_of_type("concept", 5);
    if concepts.is_empty() {
        return Ok(StepOutput::skipped());
    }
    for id in &concepts {
        graph.touch_node(id);
    }
    Ok(StepOutput::default())
}

/// Step 5: republish strong patterns as dream insights
fn pattern_match(ctx: &EngineContext) -> Result<StepOutput, StepError> {
    let strong = ctx.graph.read().unwrap().strong_patterns(0.7);
    if strong.is_empty() {
        return Ok(StepOutput::skipped());
    }
    let mut output = StepOutput::default();
    for pattern in strong.into_iter().take(PATTERNS_PER_STEP) {
        let event = CognitiveEvent::dream_insight(&pattern);
        output.emitted_events.push(event.id);
        ctx.bus.publish(event);
    }
    Ok(output)
}

/// Step 6: write associations between the activated nodes
fn integrate_past(ctx: &EngineContext) -> Result<StepOutput, StepError> {
    let Some(Value::Array(ids)) = ctx.ctx_get("active_nodes") else {
        return Ok(StepOutput::skipped());
    };
    let nodes: Vec<Uuid> = ids
        .iter()
        .filter_map(|v| v.as_str().and_then(|s| s.parse().ok()))
        .collect();
    if nodes.len() < 2 {
        return Ok(StepOutput::skipped());
    }
    let mut graph = ctx.graph.write().unwrap();
    for pair in nodes.windows(2) {
        graph.add_edge(pair[0], pair[1], crate::domain::EdgeRelation::Causes, 0.6);
    }
    Ok(StepOutput::default())
}

/// Step 7: fold in any outside input, then reassert the current goal
fn orient_present(ctx: &EngineContext) -> Result<StepOutput, StepError> {
    // An injected external message is present-moment input: it lands as a
    // reinforced interest so it can win the next relevance pass
    let mut handled_input = false;
    if let Some(input) = ctx.ctx_take("external_input") {
        if let Some(content) = input.get("content").and_then(|v| v.as_str()) {
            debug!(%content, "orienting on external input");
            ctx.registries.interests.reinforce(content, 0.3);
            handled_input = true;
        }
    }

    let pursuing = ctx
        .registries
        .goals
        .top_n(|g| g.status == GoalStatus::Pursuing, 1);
    let Some(goal) = pursuing.first() else {
        return Ok(if handled_input {
            StepOutput::default()
        } else {
            StepOutput::skipped()
        });
    };
    ctx.registries.goals.touch(&goal.id);
    ctx.ctx_set("current_goal", Value::String(goal.name.clone()));
    Ok(StepOutput::default())
}

/// Step 8: compute loop coherence from topic/goal continuity, discounted
/// by current fatigue
fn assess_coherence(ctx: &EngineContext) -> Result<StepOutput, StepError> {
    let topic = ctx.dominant_topic();
    let goal = ctx
        .ctx_get("current_goal")
        .and_then(|v| v.as_str().map(str::to_string));

    let mut coherence: f64 = 0.0;
    if topic.is_some() {
        coherence += 0.4;
    }
    if goal.is_some() {
        coherence += 0.3;
    }
    if let (Some(t), Some(g)) = (&topic, &goal) {
        if t.contains(g.as_str()) || g.contains(t.as_str()) {
            coherence += 0.3;
        }
    }

    let fatigue = ctx.loop_state.borrow().fatigue;
    coherence *= 1.0 - 0.2 * fatigue;

    debug!(coherence, fatigue, "coherence assessed");
    Ok(StepOutput {
        coherence: Some(coherence.clamp(0.0, 1.0)),
        ..StepOutput::default()
    })
}

/// Step 9: generate candidate actions for the current goals
fn simulate_future(ctx: &EngineContext) -> Result<StepOutput, StepError> {
    let goals = ctx
        .registries
        .goals
        .top_n(|g| g.status != GoalStatus::Completed, CANDIDATES);
    if goals.is_empty() {
        return Ok(StepOutput::skipped());
    }
    let skills = ctx.registries.skills.recently_practiced(1);
    let candidates: Vec<Value> = goals
        .iter()
        .map(|g| {
            let approach = skills
                .first()
                .map(|s| s.name.clone())
                .unwrap_or_else(|| "observation".to_string());
            serde_json::json!({
                "goal": g.name,
                "goal_score": g.score,
                "approach": approach,
            })
        })
        .collect();
    ctx.ctx_set("candidates", Value::Array(candidates));
    Ok(StepOutput::default())
}

/// Step 10: score the candidates
fn evaluate_affordances(ctx: &EngineContext) -> Result<StepOutput, StepError> {
    let Some(Value::Array(candidates)) = ctx.ctx_get("candidates") else {
        return Ok(StepOutput::skipped());
    };
    if candidates.is_empty() {
        return Ok(StepOutput::skipped());
    }

    let proficiency_of = |name: &str| -> f64 {
        ctx.registries
            .skills
            .top_n(|s| s.name == name, 1)
            .first()
            .map(|s| s.proficiency)
            .unwrap_or(0.1)
    };

    let best = candidates
        .iter()
        .max_by(|a, b| {
            let score = |c: &Value| {
                let goal_score = c.get("goal_score").and_then(|v| v.as_f64()).unwrap_or(0.0);
                let approach = c.get("approach").and_then(|v| v.as_str()).unwrap_or("");
                goal_score * (0.5 + 0.5 * proficiency_of(approach))
            };
            score(a)
                .partial_cmp(&score(b))
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .cloned();

    if let Some(best) = best {
        ctx.ctx_set("best_candidate", best);
    }
    Ok(StepOutput::default())
}

/// Step 11: commit to the best open goal
fn commit_intent(ctx: &EngineContext) -> Result<StepOutput, StepError> {
    let Some((goal, old)) = ctx.registries.goals.commit_intent() else {
        return Ok(StepOutput::skipped());
    };
    let event = CognitiveEvent::goal_update(
        goal.id,
        &goal.name,
        old.as_str(),
        goal.status.as_str(),
    );
    let mut output = StepOutput::default();
    output.emitted_events.push(event.id);
    ctx.bus.publish(event);
    Ok(output)
}

/// Step 12: emit the outward-facing thought
async fn express(ctx: &EngineContext) -> Result<StepOutput, StepError> {
    let topic = ctx.dominant_topic().unwrap_or_else(|| "the present moment".to_string());
    let intent = ctx
        .ctx_get("best_candidate")
        .and_then(|c| c.get("goal").and_then(|v| v.as_str().map(str::to_string)));

    let prompt = match &intent {
        Some(goal) => format!("Express, in one sentence, an intention about {} while attending to {}.", goal, topic),
        None => format!("Express, in one sentence, the current focus on {}.", topic),
    };

    // The registry never errors: provider text or a deterministic template
    let generated = ctx.providers.generate(&prompt, &GenerateOptions::default()).await;

    let thought = Thought::new(ThoughtKind::Observation, ThoughtSource::Internal, generated.text)
        .with_salience(if intent.is_some() { 0.8 } else { 0.5 });
    let event = CognitiveEvent::thought(&thought);
    let mut output = StepOutput::default();
    output.emitted_events.push(event.id);
    ctx.bus.publish(event);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::HypergraphNode;
    use std::time::Duration;

    fn context() -> EngineContext {
        let (tx, loop_rx) = watch::channel(LoopState::new(Duration::from_millis(100)));
        // Dropping the sender is fine: roles only borrow the latest value
        drop(tx);
        EngineContext {
            bus: Arc::new(EventBus::new(256)),
            providers: Arc::new(ProviderRegistry::with_defaults()),
            registries: Registries::new(Duration::from_secs(3600)),
            graph: Arc::new(RwLock::new(Hypergraph::new(0.7))),
            context_data: Arc::new(RwLock::new(serde_json::Map::new())),
            loop_state: loop_rx,
        }
    }

    #[tokio::test]
    async fn test_relevance_skips_with_no_signals() {
        let ctx = context();
        let out = run_role(StepRole::RelevanceRealization, &ctx).await.unwrap();
        assert!(out.skipped);
    }

    #[tokio::test]
    async fn test_relevance_selects_strongest_signal() {
        let ctx = context();
        ctx.registries.interests.add("tide pools", 0.9, 0.001);
        ctx.registries.goals.add("chart the reef", 0.4);

        let out = run_role(StepRole::RelevanceRealization, &ctx).await.unwrap();
        assert!(!out.skipped);
        assert_eq!(ctx.dominant_topic().unwrap(), "tide pools");
    }

    #[tokio::test]
    async fn test_recall_episodic_touches_matching_nodes() {
        let ctx = context();
        ctx.ctx_set("dominant_topic", Value::String("harbor".into()));
        let id = {
            let mut g = ctx.graph.write().unwrap();
            g.add_node(HypergraphNode::new("memory", "the harbor at dusk"))
        };

        let out = run_role(StepRole::RecallEpisodic, &ctx).await.unwrap();
        assert!(!out.skipped);
        assert_eq!(ctx.graph.read().unwrap().node(&id).unwrap().access_count, 1);
    }

    #[tokio::test]
    async fn test_coherence_reflects_continuity() {
        let ctx = context();
        // Nothing set: zero coherence
        let out = run_role(StepRole::AssessCoherence, &ctx).await.unwrap();
        assert_eq!(out.coherence, Some(0.0));

        // Topic and aligned goal: full coherence
        ctx.ctx_set("dominant_topic", Value::String("chart the reef".into()));
        ctx.ctx_set("current_goal", Value::String("chart the reef".into()));
        let out = run_role(StepRole::AssessCoherence, &ctx).await.unwrap();
        assert_eq!(out.coherence, Some(1.0));
    }

    #[tokio::test]
    async fn test_commit_intent_publishes_goal_update() {
        let ctx = context();
        let mut sub = ctx.bus.subscribe(crate::events::Topic::GoalUpdate);
        ctx.registries.goals.add("chart the reef", 0.8);

        let out = run_role(StepRole::CommitIntent, &ctx).await.unwrap();
        assert_eq!(out.emitted_events.len(), 1);

        let event = sub.try_recv().unwrap();
        assert_eq!(event.payload["to"], "pursuing");
    }

    #[tokio::test]
    async fn test_express_publishes_thought_without_llm() {
        let ctx = context();
        let mut sub = ctx.bus.subscribe(crate::events::Topic::Thought);

        let out = run_role(StepRole::Express, &ctx).await.unwrap();
        assert_eq!(out.emitted_events.len(), 1);

        let event = sub.try_recv().unwrap();
        let thought = event.as_thought().unwrap();
        assert_eq!(thought.source, ThoughtSource::Internal);
        assert!(!thought.content.is_empty());
    }

    #[tokio::test]
    async fn test_orient_present_consumes_external_input() {
        let ctx = context();
        ctx.ctx_set(
            "external_input",
            serde_json::json!({ "content": "storm warning" }),
        );

        let out = run_role(StepRole::OrientPresent, &ctx).await.unwrap();
        assert!(!out.skipped);

        let interests = ctx.registries.interests.top_n(|_| true, 1);
        assert_eq!(interests[0].name, "storm warning");
        // Input is consumed, not re-processed next cycle
        assert!(ctx.ctx_get("external_input").is_none());
    }

    #[tokio::test]
    async fn test_simulate_then_evaluate_pick_best() {
        let ctx = context();
        ctx.registries.goals.add("minor errand", 0.2);
        ctx.registries.goals.add("major expedition", 0.9);
        ctx.registries.skills.practice("navigation", 0.9);

        run_role(StepRole::SimulateFuture, &ctx).await.unwrap();
        run_role(StepRole::EvaluateAffordances, &ctx).await.unwrap();

        let best = ctx.ctx_get("best_candidate").unwrap();
        assert_eq!(best["goal"], "major expedition");
    }

    #[tokio::test]
    async fn test_integrate_past_links_active_nodes() {
        let ctx = context();
        let (a, b) = {
            let mut g = ctx.graph.write().unwrap();
            (
                g.add_node(HypergraphNode::new("memory", "a")),
                g.add_node(HypergraphNode::new("memory", "b")),
            )
        };
        ctx.ctx_set(
            "active_nodes",
            Value::Array(vec![
                Value::String(a.to_string()),
                Value::String(b.to_string()),
            ]),
        );

        run_role(StepRole::IntegratePast, &ctx).await.unwrap();
        assert_eq!(ctx.graph.read().unwrap().edge_count(), 1);
    }
}
