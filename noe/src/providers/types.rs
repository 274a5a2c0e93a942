//! Provider request/response types

use serde::{Deserialize, Serialize};

/// Options for a generation request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateOptions {
    /// Sampling temperature in [0, 1]
    pub temperature: f64,
    pub max_tokens: u32,
    pub stop_sequences: Vec<String>,
    pub stream: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1024,
            stop_sequences: Vec::new(),
            stream: false,
        }
    }
}

/// Reported provider health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Health {
    Healthy,
    Degraded,
    Down,
}

/// One streaming chunk
#[derive(Debug, Clone)]
pub struct StreamChunk {
    pub text: String,
    pub done: bool,
}

/// How a generation was ultimately produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationPath {
    /// Served by the named provider
    Provider(String),
    /// Served by the deterministic template library
    Fallback,
}

/// Result of a registry generation. Never an error: when every provider
/// fails the text comes from the fallback library instead.
#[derive(Debug, Clone)]
pub struct GenerateResult {
    pub text: String,
    pub via: GenerationPath,
}

impl GenerateResult {
    pub fn is_fallback(&self) -> bool {
        self.via == GenerationPath::Fallback
    }
}
