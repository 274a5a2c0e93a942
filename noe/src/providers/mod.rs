//! LLM providers - the ordered fallback chain the core generates prose with
//!
//! The core consumes one contract: `generate(prompt, opts)` plus `health()`.
//! The registry walks its chain in order, degrades failures for a cooldown
//! window, and answers from the deterministic template library when nothing
//! is reachable - cognition never stalls on a missing LLM.

use async_trait::async_trait;
use tokio::sync::mpsc;

mod error;
mod fallback;
mod openai;
mod registry;
mod types;

pub use error::ProviderError;
pub use fallback::FallbackLibrary;
pub use openai::OpenAiProvider;
pub use registry::{ProviderRegistry, DEFAULT_COOLDOWN};
pub use types::{GenerateOptions, GenerateResult, GenerationPath, Health, StreamChunk};

/// The provider contract the registry consumes
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Stable name used in logs, metrics and health queries
    fn name(&self) -> &str;

    /// Produce text for the prompt, or a typed error
    async fn generate(&self, prompt: &str, opts: &GenerateOptions)
        -> Result<String, ProviderError>;

    /// Self-reported health; the registry overlays cooldown state on top
    fn health(&self) -> Health;

    /// Streaming generation. The default buffers `generate` into a single
    /// terminal chunk; streaming-native providers override this.
    async fn generate_streaming(
        &self,
        prompt: &str,
        opts: &GenerateOptions,
        chunk_tx: mpsc::Sender<StreamChunk>,
    ) -> Result<String, ProviderError> {
        let text = self.generate(prompt, opts).await?;
        let _ = chunk_tx
            .send(StreamChunk {
                text: text.clone(),
                done: true,
            })
            .await;
        Ok(text)
    }
}
