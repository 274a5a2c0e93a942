//! Deterministic fallback templates
//!
//! When every provider in the chain is unavailable the core still has to
//! produce prose: template selection is a stable hash of the prompt, so the
//! same prompt always yields the same line and tests can rely on it.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Templates keyed by `{topic}`, the first few words of the prompt
const TEMPLATES: &[&str] = &[
    "Still turning over {topic}; nothing new surfaces yet.",
    "Circling back to {topic} without fresh input.",
    "Holding {topic} in mind while the rest settles.",
    "A quiet pass over {topic}; the shape of it is unchanged.",
    "Revisiting {topic} from memory alone.",
    "Letting {topic} sit; no outside voice to consult.",
];

/// Deterministic template library
#[derive(Debug, Default, Clone)]
pub struct FallbackLibrary;

impl FallbackLibrary {
    pub fn new() -> Self {
        Self
    }

    /// Render a fallback response for the given prompt
    pub fn respond(&self, prompt: &str) -> String {
        let mut hasher = DefaultHasher::new();
        prompt.hash(&mut hasher);
        let template = TEMPLATES[(hasher.finish() as usize) % TEMPLATES.len()];

        let topic: String = prompt
            .split_whitespace()
            .take(4)
            .collect::<Vec<_>>()
            .join(" ");
        let topic = if topic.is_empty() {
            "the moment".to_string()
        } else {
            topic
        };
        template.replace("{topic}", &topic)
    }
}
