//! OpenAI-compatible chat-completions adapter
//!
//! The one concrete HTTP provider shipped with the core. Anything speaking
//! the chat-completions protocol (hosted or local) can sit behind it; the
//! registry treats it like any other provider.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use super::error::ProviderError;
use super::types::{GenerateOptions, Health};
use super::LlmProvider;
use crate::config::ProviderConfig;

/// Consecutive-failure thresholds for self-reported health
const DEGRADED_AFTER: u32 = 3;
const DOWN_AFTER: u32 = 6;

#[derive(Debug)]
pub struct OpenAiProvider {
    name: String,
    model: String,
    api_key: String,
    base_url: String,
    http: Client,
    consecutive_failures: AtomicU32,
}

impl OpenAiProvider {
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        debug!(name = %config.name, model = %config.model, "OpenAiProvider::from_config");
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            ProviderError::Unrecoverable(format!(
                "environment variable {} is not set",
                config.api_key_env
            ))
        })?;

        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| ProviderError::Unrecoverable(e.to_string()))?;

        Ok(Self {
            name: config.name.clone(),
            model: config.model.clone(),
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
            consecutive_failures: AtomicU32::new(0),
        })
    }

    fn build_body(&self, prompt: &str, opts: &GenerateOptions) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": opts.temperature.clamp(0.0, 1.0),
            "max_tokens": opts.max_tokens,
        });
        if !opts.stop_sequences.is_empty() {
            body["stop"] = serde_json::json!(opts.stop_sequences);
        }
        body
    }

    fn record_failure(&self) {
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
    }

    fn map_status(&self, status: u16, detail: String) -> ProviderError {
        match status {
            429 => ProviderError::RateLimited { retry_after: None },
            408 | 500 | 502 | 503 | 504 => ProviderError::Transient(detail),
            _ => ProviderError::Unrecoverable(format!("status {}: {}", status, detail)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str, opts: &GenerateOptions) -> Result<String, ProviderError> {
        debug!(name = %self.name, prompt_len = prompt.len(), "OpenAiProvider::generate");
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = self.build_body(prompt, opts);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                self.record_failure();
                if e.is_timeout() {
                    ProviderError::Timeout(Duration::from_millis(0))
                } else {
                    ProviderError::Transient(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(name = %self.name, status, "chat completion failed");
            self.record_failure();
            return Err(self.map_status(status, detail));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            self.record_failure();
            ProviderError::Transient(format!("malformed response: {}", e))
        })?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        if text.is_empty() {
            self.record_failure();
            return Err(ProviderError::Transient("empty completion".into()));
        }

        self.record_success();
        Ok(text)
    }

    fn health(&self) -> Health {
        match self.consecutive_failures.load(Ordering::Relaxed) {
            n if n >= DOWN_AFTER => Health::Down,
            n if n >= DEGRADED_AFTER => Health::Degraded,
            _ => Health::Healthy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> OpenAiProvider {
        OpenAiProvider {
            name: "test".into(),
            model: "local-model".into(),
            api_key: "k".into(),
            base_url: "http://localhost:9".into(),
            http: Client::new(),
            consecutive_failures: AtomicU32::new(0),
        }
    }

    #[test]
    fn test_body_includes_options() {
        let p = provider();
        let opts = GenerateOptions {
            temperature: 0.3,
            max_tokens: 128,
            stop_sequences: vec!["\n\n".into()],
            stream: false,
        };
        let body = p.build_body("hello", &opts);
        assert_eq!(body["model"], "local-model");
        assert_eq!(body["temperature"], 0.3);
        assert_eq!(body["max_tokens"], 128);
        assert_eq!(body["stop"][0], "\n\n");
    }

    #[test]
    fn test_body_omits_empty_stop() {
        let p = provider();
        let body = p.build_body("hello", &GenerateOptions::default());
        assert!(body.get("stop").is_none());
    }

    #[test]
    fn test_status_mapping() {
        let p = provider();
        assert_eq!(p.map_status(429, String::new()).kind(), "rate_limited");
        assert_eq!(p.map_status(503, String::new()).kind(), "transient");
        assert_eq!(p.map_status(401, String::new()).kind(), "unrecoverable");
    }

    #[test]
    #[serial_test::serial]
    fn test_from_config_requires_api_key_env() {
        let config = crate::config::ProviderConfig {
            name: "local".into(),
            model: "local-model".into(),
            api_key_env: "NOEMA_TEST_MISSING_KEY".into(),
            base_url: "http://localhost:8080/".into(),
            timeout_ms: 1000,
        };
        std::env::remove_var("NOEMA_TEST_MISSING_KEY");
        let err = OpenAiProvider::from_config(&config).unwrap_err();
        assert!(err.is_unrecoverable());
    }

    #[test]
    #[serial_test::serial]
    fn test_from_config_reads_key_and_trims_base_url() {
        let config = crate::config::ProviderConfig {
            name: "local".into(),
            model: "local-model".into(),
            api_key_env: "NOEMA_TEST_PRESENT_KEY".into(),
            base_url: "http://localhost:8080/".into(),
            timeout_ms: 1000,
        };
        std::env::set_var("NOEMA_TEST_PRESENT_KEY", "secret");
        let provider = OpenAiProvider::from_config(&config).unwrap();
        assert_eq!(provider.base_url, "http://localhost:8080");
        assert_eq!(provider.api_key, "secret");
        std::env::remove_var("NOEMA_TEST_PRESENT_KEY");
    }

    #[test]
    fn test_health_thresholds() {
        let p = provider();
        assert_eq!(p.health(), Health::Healthy);
        for _ in 0..DEGRADED_AFTER {
            p.record_failure();
        }
        assert_eq!(p.health(), Health::Degraded);
        for _ in 0..DOWN_AFTER {
            p.record_failure();
        }
        assert_eq!(p.health(), Health::Down);
        p.record_success();
        assert_eq!(p.health(), Health::Healthy);
    }
}
