//! Provider registry - ordered fallback chain with health and cooldown
//!
//! Providers are tried in registration order. A failing provider is marked
//! degraded for the cooldown window and skipped until it expires; an
//! unrecoverable failure disables it outright. When the whole chain fails
//! the deterministic template library answers instead - generation never
//! surfaces an error to the caller.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::error::ProviderError;
use super::fallback::FallbackLibrary;
use super::types::{GenerateOptions, GenerateResult, GenerationPath, Health, StreamChunk};
use super::LlmProvider;

/// Default cooldown for degraded providers
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

struct ProviderSlot {
    provider: Arc<dyn LlmProvider>,
    /// Millis since registry epoch until which this slot is skipped; 0 = ok
    degraded_until_ms: AtomicU64,
    disabled: AtomicBool,
}

/// Ordered provider chain
pub struct ProviderRegistry {
    slots: Vec<ProviderSlot>,
    cooldown: Duration,
    /// Per-call deadline; the loop contract caps this at 2x step duration
    deadline: Duration,
    fallback: FallbackLibrary,
    epoch: Instant,
}

impl ProviderRegistry {
    pub fn new(cooldown: Duration, deadline: Duration) -> Self {
        debug!(?cooldown, ?deadline, "ProviderRegistry::new");
        Self {
            slots: Vec::new(),
            cooldown,
            deadline,
            fallback: FallbackLibrary::new(),
            epoch: Instant::now(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_COOLDOWN, Duration::from_secs(1))
    }

    /// Append a provider to the chain
    pub fn push(&mut self, provider: Arc<dyn LlmProvider>) {
        debug!(name = provider.name(), "ProviderRegistry::push");
        self.slots.push(ProviderSlot {
            provider,
            degraded_until_ms: AtomicU64::new(0),
            disabled: AtomicBool::new(false),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn degrade(&self, slot: &ProviderSlot) {
        let until = self.now_ms() + self.cooldown.as_millis() as u64;
        slot.degraded_until_ms.store(until, Ordering::Relaxed);
    }

    fn is_degraded(&self, slot: &ProviderSlot) -> bool {
        self.now_ms() < slot.degraded_until_ms.load(Ordering::Relaxed)
    }

    /// Effective health of a named provider (registry view, including
    /// cooldown and disablement)
    pub fn health_of(&self, name: &str) -> Option<Health> {
        let slot = self.slots.iter().find(|s| s.provider.name() == name)?;
        if slot.disabled.load(Ordering::Relaxed) {
            return Some(Health::Down);
        }
        if self.is_degraded(slot) {
            return Some(Health::Degraded);
        }
        Some(slot.provider.health())
    }

    /// Run the chain. Always produces text: provider output when any
    /// provider succeeds, a deterministic template otherwise.
    pub async fn generate(&self, prompt: &str, opts: &GenerateOptions) -> GenerateResult {
        debug!(prompt_len = prompt.len(), "ProviderRegistry::generate");
        for slot in &self.slots {
            if slot.disabled.load(Ordering::Relaxed) {
                continue;
            }
            if self.is_degraded(slot) {
                debug!(name = slot.provider.name(), "skipping degraded provider");
                continue;
            }
            if slot.provider.health() == Health::Down {
                debug!(name = slot.provider.name(), "provider reports down, degrading");
                self.degrade(slot);
                continue;
            }

            match tokio::time::timeout(self.deadline, slot.provider.generate(prompt, opts)).await {
                Ok(Ok(text)) => {
                    slot.degraded_until_ms.store(0, Ordering::Relaxed);
                    return GenerateResult {
                        text,
                        via: GenerationPath::Provider(slot.provider.name().to_string()),
                    };
                }
                Ok(Err(e)) if e.is_unrecoverable() => {
                    warn!(name = slot.provider.name(), error = %e, "provider disabled");
                    slot.disabled.store(true, Ordering::Relaxed);
                }
                Ok(Err(e)) => {
                    warn!(name = slot.provider.name(), error = %e, "provider degraded");
                    self.degrade(slot);
                }
                Err(_) => {
                    warn!(
                        name = slot.provider.name(),
                        deadline = ?self.deadline,
                        "provider deadline elapsed, degrading"
                    );
                    self.degrade(slot);
                }
            }
        }

        debug!("all providers unavailable, using fallback template");
        GenerateResult {
            text: self.fallback.respond(prompt),
            via: GenerationPath::Fallback,
        }
    }

    /// Streaming variant. Chunks from the serving provider are forwarded to
    /// `chunk_tx`; the buffered full text is returned either way.
    pub async fn generate_streaming(
        &self,
        prompt: &str,
        opts: &GenerateOptions,
        chunk_tx: mpsc::Sender<StreamChunk>,
    ) -> GenerateResult {
        let result = self.generate(prompt, opts).await;
        let _ = chunk_tx
            .send(StreamChunk {
                text: result.text.clone(),
                done: true,
            })
            .await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// Scripted provider: errors for the first `fail_first` calls, then
    /// succeeds with its name
    struct ScriptedProvider {
        name: String,
        fail_first: usize,
        error: ProviderError,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(name: &str, fail_first: usize, error: ProviderError) -> Self {
            Self {
                name: name.to_string(),
                fail_first,
                error,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn generate(
            &self,
            _prompt: &str,
            _opts: &GenerateOptions,
        ) -> Result<String, ProviderError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                Err(self.error.clone())
            } else {
                Ok(format!("from {}", self.name))
            }
        }

        fn health(&self) -> Health {
            Health::Healthy
        }
    }

    fn registry(cooldown: Duration) -> ProviderRegistry {
        ProviderRegistry::new(cooldown, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_first_healthy_provider_serves() {
        let mut reg = registry(Duration::from_secs(30));
        reg.push(Arc::new(ScriptedProvider::new(
            "alpha",
            0,
            ProviderError::Transient("unused".into()),
        )));
        reg.push(Arc::new(ScriptedProvider::new(
            "beta",
            0,
            ProviderError::Transient("unused".into()),
        )));

        let result = reg.generate("hi", &GenerateOptions::default()).await;
        assert_eq!(result.text, "from alpha");
        assert_eq!(result.via, GenerationPath::Provider("alpha".into()));
    }

    #[tokio::test]
    async fn test_transient_failure_falls_through_and_degrades() {
        let first = Arc::new(ScriptedProvider::new(
            "flaky",
            3,
            ProviderError::Transient("blip".into()),
        ));
        let second = Arc::new(ScriptedProvider::new(
            "steady",
            0,
            ProviderError::Transient("unused".into()),
        ));

        let mut reg = registry(Duration::from_millis(200));
        reg.push(Arc::clone(&first) as Arc<dyn LlmProvider>);
        reg.push(Arc::clone(&second) as Arc<dyn LlmProvider>);

        // Call 1: flaky errors once, steady serves; flaky enters cooldown
        let r1 = reg.generate("one", &GenerateOptions::default()).await;
        assert_eq!(r1.text, "from steady");
        assert_eq!(first.calls(), 1);

        // Calls 2-3 fall inside the cooldown: flaky is not even tried
        let r2 = reg.generate("two", &GenerateOptions::default()).await;
        let r3 = reg.generate("three", &GenerateOptions::default()).await;
        assert_eq!(r2.text, "from steady");
        assert_eq!(r3.text, "from steady");
        assert_eq!(first.calls(), 1);
        assert_eq!(second.calls(), 3);

        // After the cooldown flaky is retried; the script has it fail twice
        // more (calls 2 and 3) before recovering on its 4th call
        tokio::time::sleep(Duration::from_millis(250)).await;
        let r4 = reg.generate("four", &GenerateOptions::default()).await;
        assert_eq!(r4.text, "from steady");
        assert_eq!(first.calls(), 2);

        tokio::time::sleep(Duration::from_millis(250)).await;
        let r5 = reg.generate("five", &GenerateOptions::default()).await;
        assert_eq!(r5.text, "from steady");
        assert_eq!(first.calls(), 3);

        tokio::time::sleep(Duration::from_millis(250)).await;
        let r6 = reg.generate("six", &GenerateOptions::default()).await;
        assert_eq!(r6.text, "from flaky");

        // Nothing ever hit the template library
        for r in [r1, r2, r3, r4, r5, r6] {
            assert!(!r.is_fallback());
        }
    }

    #[tokio::test]
    async fn test_unrecoverable_disables_provider() {
        let broken = Arc::new(ScriptedProvider::new(
            "broken",
            usize::MAX,
            ProviderError::Unrecoverable("bad key".into()),
        ));
        let mut reg = registry(Duration::from_millis(10));
        reg.push(Arc::clone(&broken) as Arc<dyn LlmProvider>);
        reg.push(Arc::new(ScriptedProvider::new(
            "ok",
            0,
            ProviderError::Transient("unused".into()),
        )));

        let r1 = reg.generate("a", &GenerateOptions::default()).await;
        assert_eq!(r1.text, "from ok");
        assert_eq!(broken.calls(), 1);

        // Even past the cooldown, the disabled provider stays out
        tokio::time::sleep(Duration::from_millis(30)).await;
        let r2 = reg.generate("b", &GenerateOptions::default()).await;
        assert_eq!(r2.text, "from ok");
        assert_eq!(broken.calls(), 1);
        assert_eq!(reg.health_of("broken"), Some(Health::Down));
    }

    #[tokio::test]
    async fn test_all_failing_yields_fallback() {
        let mut reg = registry(Duration::from_secs(30));
        reg.push(Arc::new(ScriptedProvider::new(
            "dead1",
            usize::MAX,
            ProviderError::Transient("down".into()),
        )));
        reg.push(Arc::new(ScriptedProvider::new(
            "dead2",
            usize::MAX,
            ProviderError::Timeout(Duration::from_secs(1)),
        )));

        let result = reg.generate("the tide", &GenerateOptions::default()).await;
        assert!(result.is_fallback());
        assert!(!result.text.is_empty());
    }

    #[tokio::test]
    async fn test_empty_registry_yields_fallback() {
        let reg = registry(Duration::from_secs(30));
        let result = reg.generate("anything", &GenerateOptions::default()).await;
        assert!(result.is_fallback());
    }

    #[tokio::test]
    async fn test_deadline_degrades_slow_provider() {
        struct SlowProvider;

        #[async_trait]
        impl LlmProvider for SlowProvider {
            fn name(&self) -> &str {
                "slow"
            }

            async fn generate(
                &self,
                _prompt: &str,
                _opts: &GenerateOptions,
            ) -> Result<String, ProviderError> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok("too late".into())
            }

            fn health(&self) -> Health {
                Health::Healthy
            }
        }

        let mut reg = ProviderRegistry::new(Duration::from_secs(30), Duration::from_millis(50));
        reg.push(Arc::new(SlowProvider));

        let start = Instant::now();
        let result = reg.generate("hi", &GenerateOptions::default()).await;
        assert!(result.is_fallback());
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_streaming_forwards_buffered_chunk() {
        let mut reg = registry(Duration::from_secs(30));
        reg.push(Arc::new(ScriptedProvider::new(
            "alpha",
            0,
            ProviderError::Transient("unused".into()),
        )));

        let (tx, mut rx) = mpsc::channel(4);
        let result = reg
            .generate_streaming("hi", &GenerateOptions::default(), tx)
            .await;
        let chunk = rx.recv().await.unwrap();
        assert!(chunk.done);
        assert_eq!(chunk.text, result.text);
    }
}
