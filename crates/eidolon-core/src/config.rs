//! Eidolon configuration
//!
//! All tunable parameters in one place. Loaded from TOML at startup,
//! falls back to defaults if no config file exists.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration, mapping to `eidolon.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The persona and its single privileged principal.
    pub persona: PersonaConfig,
    /// Attention and salience tuning.
    pub attention: AttentionConfig,
    /// Memory capacities and decay.
    pub memory: MemoryConfig,
    /// Prediction engine tuning.
    pub prediction: PredictionConfig,
    /// Deadlines for external collaborators.
    pub deadlines: DeadlineConfig,
    /// Gateway bind and auth.
    pub gateway: GatewayConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            persona: PersonaConfig::default(),
            attention: AttentionConfig::default(),
            memory: MemoryConfig::default(),
            prediction: PredictionConfig::default(),
            deadlines: DeadlineConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaConfig {
    /// The single privileged principal. Immutable once the identity row exists.
    pub creator_name: String,
    /// Dimension of every embedding vector in the deployment.
    pub embedding_dim: usize,
    /// SQLite database path.
    pub db_path: String,
    /// Seconds of quiet before one proactive message may be pushed.
    pub proactive_idle_secs: u64,
    /// Seconds of quiet before background consolidation runs.
    pub idle_consolidation_secs: u64,
    /// Window within which an identical utterance is served from cache.
    pub dedup_window_secs: u64,
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            creator_name: "Creator".to_string(),
            embedding_dim: 384,
            db_path: "data/eidolon.db".to_string(),
            proactive_idle_secs: 300,
            idle_consolidation_secs: 600,
            dedup_window_secs: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttentionConfig {
    /// Below this salience the turn short-circuits to an acknowledgment.
    pub attention_floor: f32,
    /// Multiplier applied to anything coming from the Creator.
    pub creator_boost: f32,
    /// Weight of novelty in the salience sum.
    pub novelty_weight: f32,
    /// Weight of emotional intensity.
    pub emotion_weight: f32,
    /// Weight of utterance length.
    pub length_weight: f32,
    /// Weight of working-memory relevance.
    pub relevance_weight: f32,
}

impl Default for AttentionConfig {
    fn default() -> Self {
        Self {
            attention_floor: 0.1,
            creator_boost: 2.0,
            novelty_weight: 0.2,
            emotion_weight: 0.3,
            length_weight: 0.2,
            relevance_weight: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Working memory soft capacity (hard cap is capacity + 2, never above 9).
    pub working_memory_capacity: usize,
    /// Per-turn working-memory salience multiplier.
    pub decay_factor: f32,
    /// Episodic recency half-life in days.
    pub recency_halflife_days: f64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            working_memory_capacity: 7,
            decay_factor: 0.9,
            recency_halflife_days: 7.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    /// Prediction error above this proposes a surprise thought.
    pub prediction_error_threshold: f32,
    /// Online mean/variance learning rate.
    pub learning_rate: f32,
    /// Hard timeout for each module's thought proposal.
    pub per_module_timeout_ms: u64,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            prediction_error_threshold: 0.4,
            learning_rate: 0.1,
            per_module_timeout_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeadlineConfig {
    pub stt_deadline_s: u64,
    pub tts_deadline_s: u64,
    pub llm_deadline_s: u64,
    pub embed_deadline_s: u64,
    pub search_deadline_s: u64,
}

impl Default for DeadlineConfig {
    fn default() -> Self {
        Self {
            stt_deadline_s: 5,
            tts_deadline_s: 10,
            llm_deadline_s: 20,
            embed_deadline_s: 2,
            search_deadline_s: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub port: u16,
    pub bind: BindMode,
    /// Session token. None disables auth (development only).
    pub token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: 8900,
            bind: BindMode::Loopback,
            token: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindMode {
    #[default]
    Loopback,
    Lan,
}

impl BindMode {
    pub fn to_addr(&self) -> &str {
        match self {
            BindMode::Loopback => "127.0.0.1",
            BindMode::Lan => "0.0.0.0",
        }
    }
}

impl Config {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {} — using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("No config at {} — using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the current config as TOML (for generating a default config file).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Hard cap on live working-memory items: capacity + 2, never above 9.
    pub fn working_memory_hard_cap(&self) -> usize {
        (self.memory.working_memory_capacity + 2).min(9)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.persona.embedding_dim, 384);
        assert!((config.attention.attention_floor - 0.1).abs() < f32::EPSILON);
        assert!((config.attention.creator_boost - 2.0).abs() < f32::EPSILON);
        assert_eq!(config.memory.working_memory_capacity, 7);
        assert!((config.memory.decay_factor - 0.9).abs() < f32::EPSILON);
        assert_eq!(config.prediction.per_module_timeout_ms, 500);
        assert!((config.prediction.prediction_error_threshold - 0.4).abs() < f32::EPSILON);
        assert_eq!(config.deadlines.llm_deadline_s, 20);
        assert!((config.memory.recency_halflife_days - 7.0).abs() < f64::EPSILON);
    }

    #[test]
    fn hard_cap_never_exceeds_nine() {
        let mut config = Config::default();
        assert_eq!(config.working_memory_hard_cap(), 9);
        config.memory.working_memory_capacity = 9;
        assert_eq!(config.working_memory_hard_cap(), 9);
        config.memory.working_memory_capacity = 3;
        assert_eq!(config.working_memory_hard_cap(), 5);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let partial = r#"
[persona]
creator_name = "Mira"

[attention]
creator_boost = 3.0
"#;
        let config: Config = toml::from_str(partial).unwrap();
        assert_eq!(config.persona.creator_name, "Mira");
        assert!((config.attention.creator_boost - 3.0).abs() < f32::EPSILON);
        // Unspecified fields get defaults
        assert_eq!(config.persona.embedding_dim, 384);
        assert_eq!(config.memory.working_memory_capacity, 7);
    }

    #[test]
    fn default_roundtrips_through_toml() {
        let config = Config::default();
        let toml_str = config.to_toml();
        assert!(toml_str.contains("creator_boost"));
        assert!(toml_str.contains("recency_halflife_days"));
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.gateway.port, 8900);
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let config = Config::load(Path::new("/nonexistent/eidolon.toml"));
        assert_eq!(config.persona.embedding_dim, 384);
    }
}
