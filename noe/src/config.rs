//! Configuration types and layered loading
//!
//! Load order: explicit path, then project-local `.noema.yml`, then
//! `~/.config/noema/noema.yml`, then defaults. Every duration and threshold
//! of the core is a field here so tests and deployments can compress or
//! stretch the cognitive timescales.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cycle::FatigueConfig;
use crate::hypergraph::ConsolidationConfig;
use crate::stream::StreamConfig;
use crate::wake::WakeConfig;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub core: CoreSection,
    pub wake: WakeSection,
    pub fatigue: FatigueSection,
    pub stream: StreamSection,
    pub hypergraph: HypergraphSection,
    pub snapshot: SnapshotSection,
    pub providers: ProvidersSection,
    pub logging: LoggingSection,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path)
                .context(format!("Failed to load config from {}", path.display()));
        }

        let local_config = PathBuf::from(".noema.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("noema").join("noema.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!(
                            "Failed to load config from {}: {}",
                            user_config.display(),
                            e
                        );
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Peek at the log level before full config parsing, for early logging
    /// setup in the binary
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let path = config_path.cloned().or_else(|| {
            let local = PathBuf::from(".noema.yml");
            local.exists().then_some(local)
        })?;
        let content = fs::read_to_string(path).ok()?;
        let value: serde_yaml::Value = serde_yaml::from_str(&content).ok()?;
        value
            .get("logging")?
            .get("level")?
            .as_str()
            .map(str::to_string)
    }

    // === Derived component configs ===

    pub fn step_duration(&self) -> Duration {
        Duration::from_millis(self.core.step_duration_ms)
    }

    pub fn wake_config(&self) -> WakeConfig {
        WakeConfig {
            fatigue_tiring: self.wake.fatigue_tiring,
            fatigue_resting: self.wake.fatigue_resting,
            t_tiring: Duration::from_millis(self.wake.t_tiring_ms),
            t_rest: Duration::from_millis(self.wake.t_rest_ms),
            t_dream: Duration::from_millis(self.wake.t_dream_ms),
            rest_rate: self.wake.rest_rate,
        }
    }

    pub fn fatigue_config(&self) -> FatigueConfig {
        FatigueConfig {
            full_after: Duration::from_secs(self.fatigue.full_secs),
            drop_gain: self.fatigue.drop_gain,
        }
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            cadence: Duration::from_millis(self.stream.cadence_ms),
            jitter: self.stream.jitter,
            context_thoughts: self.stream.context_thoughts,
            context_goals: self.stream.context_goals,
            context_skills: self.stream.context_skills,
            context_interests: self.stream.context_interests,
            curiosity_gate: self.stream.curiosity_gate,
        }
    }

    pub fn consolidation_config(&self) -> ConsolidationConfig {
        ConsolidationConfig {
            alpha: self.hypergraph.alpha,
            delta: self.hypergraph.delta,
            prune_threshold: self.hypergraph.prune_threshold,
            synthesis_threshold: self.hypergraph.synthesis_threshold,
        }
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.snapshot.path.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("noema")
                .join("core.json")
        })
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_millis(self.snapshot.interval_ms)
    }

    pub fn provider_cooldown(&self) -> Duration {
        Duration::from_millis(self.providers.cooldown_ms)
    }

    pub fn goal_stale_after(&self) -> Duration {
        Duration::from_secs(self.core.goal_stale_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreSection {
    /// Step duration D in milliseconds
    #[serde(rename = "step-duration-ms")]
    pub step_duration_ms: u64,

    /// Per-topic bus ring capacity
    #[serde(rename = "bus-capacity")]
    pub bus_capacity: usize,

    /// Pursuing goals idle longer than this demote back to open
    #[serde(rename = "goal-stale-secs")]
    pub goal_stale_secs: u64,
}

impl Default for CoreSection {
    fn default() -> Self {
        Self {
            step_duration_ms: 500,
            bus_capacity: 1024,
            goal_stale_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WakeSection {
    #[serde(rename = "fatigue-tiring")]
    pub fatigue_tiring: f64,

    #[serde(rename = "fatigue-resting")]
    pub fatigue_resting: f64,

    #[serde(rename = "t-tiring-ms")]
    pub t_tiring_ms: u64,

    #[serde(rename = "t-rest-ms")]
    pub t_rest_ms: u64,

    #[serde(rename = "t-dream-ms")]
    pub t_dream_ms: u64,

    /// Clock rate multiplier while resting or dreaming
    #[serde(rename = "rest-rate")]
    pub rest_rate: f64,
}

impl Default for WakeSection {
    fn default() -> Self {
        Self {
            fatigue_tiring: 0.75,
            fatigue_resting: 0.90,
            t_tiring_ms: 60_000,
            t_rest_ms: 30_000,
            t_dream_ms: 30_000,
            rest_rate: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FatigueSection {
    /// Active seconds that alone saturate fatigue
    #[serde(rename = "full-secs")]
    pub full_secs: u64,

    /// Fatigue added per dropped bus event
    #[serde(rename = "drop-gain")]
    pub drop_gain: f64,
}

impl Default for FatigueSection {
    fn default() -> Self {
        Self {
            full_secs: 300,
            drop_gain: 0.001,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSection {
    #[serde(rename = "cadence-ms")]
    pub cadence_ms: u64,

    pub jitter: f64,

    #[serde(rename = "context-thoughts")]
    pub context_thoughts: usize,

    #[serde(rename = "context-goals")]
    pub context_goals: usize,

    #[serde(rename = "context-skills")]
    pub context_skills: usize,

    #[serde(rename = "context-interests")]
    pub context_interests: usize,

    #[serde(rename = "curiosity-gate")]
    pub curiosity_gate: f64,
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            cadence_ms: 3000,
            jitter: 0.2,
            context_thoughts: 10,
            context_goals: 3,
            context_skills: 3,
            context_interests: 3,
            curiosity_gate: 0.6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HypergraphSection {
    #[serde(rename = "pattern-threshold")]
    pub pattern_threshold: f64,

    /// Strengthen coefficient
    pub alpha: f64,

    /// Decay factor per consolidation pass
    pub delta: f64,

    #[serde(rename = "prune-threshold")]
    pub prune_threshold: f64,

    #[serde(rename = "synthesis-threshold")]
    pub synthesis_threshold: f64,
}

impl Default for HypergraphSection {
    fn default() -> Self {
        Self {
            pattern_threshold: 0.7,
            alpha: 0.1,
            delta: 0.05,
            prune_threshold: 0.05,
            synthesis_threshold: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotSection {
    /// Canonical snapshot file; defaults under the local data dir
    pub path: Option<PathBuf>,

    #[serde(rename = "interval-ms")]
    pub interval_ms: u64,
}

impl Default for SnapshotSection {
    fn default() -> Self {
        Self {
            path: None,
            interval_ms: 300_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersSection {
    /// Degraded-provider cooldown
    #[serde(rename = "cooldown-ms")]
    pub cooldown_ms: u64,

    /// Ordered provider chain; empty means template-only operation
    pub chain: Vec<ProviderConfig>,
}

impl Default for ProvidersSection {
    fn default() -> Self {
        Self {
            cooldown_ms: 30_000,
            chain: Vec::new(),
        }
    }
}

/// One OpenAI-compatible provider endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,

    pub model: String,

    /// Environment variable holding the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    #[serde(rename = "base-url")]
    pub base_url: String,

    #[serde(rename = "timeout-ms", default = "default_provider_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_provider_timeout_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// trace | debug | info | warn | error
    pub level: Option<String>,

    /// JSONL activity log of all bus events; off when unset
    #[serde(rename = "activity-log")]
    pub activity_log: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.step_duration(), Duration::from_millis(500));
        assert_eq!(config.core.bus_capacity, 1024);
        assert_eq!(config.wake.fatigue_tiring, 0.75);
        assert_eq!(config.hypergraph.pattern_threshold, 0.7);
        assert_eq!(config.snapshot_interval(), Duration::from_secs(300));
        assert_eq!(config.provider_cooldown(), Duration::from_secs(30));
        assert!(config.providers.chain.is_empty());
    }

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = r#"
core:
  step-duration-ms: 100
wake:
  t-tiring-ms: 200
providers:
  cooldown-ms: 5000
  chain:
    - name: local
      model: local-model
      api-key-env: LOCAL_KEY
      base-url: http://localhost:8080
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.core.step_duration_ms, 100);
        assert_eq!(config.core.bus_capacity, 1024); // default kept
        assert_eq!(config.wake.t_tiring_ms, 200);
        assert_eq!(config.providers.chain.len(), 1);
        assert_eq!(config.providers.chain[0].timeout_ms, 30_000);
    }

    #[test]
    fn test_component_config_derivation() {
        let config = Config::default();
        let wake = config.wake_config();
        assert_eq!(wake.t_rest, Duration::from_secs(30));
        let fatigue = config.fatigue_config();
        assert_eq!(fatigue.full_after, Duration::from_secs(300));
        let stream = config.stream_config();
        assert_eq!(stream.cadence, Duration::from_secs(3));
        assert_eq!(stream.context_thoughts, 10);
    }

    #[test]
    fn test_explicit_config_path() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("noema.yml");
        fs::write(&path, "core:\n  step-duration-ms: 42\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.core.step_duration_ms, 42);
    }

    #[test]
    fn test_missing_explicit_path_errors() {
        let missing = PathBuf::from("/definitely/not/here.yml");
        assert!(Config::load(Some(&missing)).is_err());
    }
}
