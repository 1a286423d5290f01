//! Engine configuration.
//!
//! All tunables live in validated structs resolved once at the boundary.
//! Loaded from `{data_path}/fabula.toml` or the `FABULA_CONFIG` env var
//! (JSON). Defaults match the empirically tuned production values.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::FabulaError;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub assembly: AssemblyConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub backend: BackendConfig,
}

/// Prompt assembly tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyConfig {
    /// Units per scene batch; aligned to the extraction cadence.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Reuse cached/snapshot prefixes when the task allows it.
    #[serde(default = "default_true")]
    pub prefix_reuse: bool,
    /// Overall token budget for the assembled prefix.
    #[serde(default = "default_prefix_budget")]
    pub prefix_token_budget: usize,
    /// Optional path to a `tokenizers` vocabulary file for token counting.
    #[serde(default)]
    pub tokenizer_path: Option<String>,
    /// Max snapshots retained in the prefix snapshot store.
    #[serde(default = "default_snapshot_capacity")]
    pub snapshot_capacity: u64,
    /// Snapshot time-to-live in seconds.
    #[serde(default = "default_snapshot_ttl")]
    pub snapshot_ttl_secs: u64,
}

/// Retrieval pipeline tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Master switch; off means the retrieved-context section never renders.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Token budget for the retrieved-context section.
    #[serde(default = "default_retrieval_budget")]
    pub token_budget: usize,
    /// Results requested per sub-query.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Reciprocal Rank Fusion constant (k=60 is conventional).
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f32,
    /// Minimum verified similarity for the top fused source. Below this the
    /// multi-query result is discarded in favor of the single-query
    /// fallback. Tune against the vector backend's score distribution.
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: f32,
    /// Cap on decomposed sub-queries.
    #[serde(default = "default_max_sub_queries")]
    pub max_sub_queries: usize,
    /// Enable the iterative recall agent for "recall" intent.
    #[serde(default)]
    pub agent_enabled: bool,
    /// Iteration cap for the recall agent.
    #[serde(default = "default_agent_iterations")]
    pub agent_max_iterations: usize,
    /// Overall recall agent timeout in seconds.
    #[serde(default = "default_agent_timeout")]
    pub agent_timeout_secs: u64,
    /// Vector index call timeout in seconds.
    #[serde(default = "default_search_timeout")]
    pub search_timeout_secs: u64,
}

/// Generative backend tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Completion call timeout in seconds.
    #[serde(default = "default_backend_timeout")]
    pub timeout_secs: u64,
    /// Max tokens for generation tasks.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    /// Max tokens for classification/extraction sub-tasks.
    #[serde(default = "default_utility_max_tokens")]
    pub utility_max_tokens: usize,
    /// Route extraction sub-tasks to the secondary backend when one is
    /// configured. Extraction then uses the minimal two-message form since
    /// a cached prefix has no value across backends.
    #[serde(default)]
    pub route_extraction_to_secondary: bool,
}

fn default_batch_size() -> usize {
    10
}

fn default_true() -> bool {
    true
}

fn default_prefix_budget() -> usize {
    24_000
}

fn default_snapshot_capacity() -> u64 {
    256
}

fn default_snapshot_ttl() -> u64 {
    3_600
}

fn default_retrieval_budget() -> usize {
    1_200
}

fn default_top_k() -> usize {
    8
}

fn default_rrf_k() -> f32 {
    60.0
}

fn default_quality_threshold() -> f32 {
    0.60
}

fn default_max_sub_queries() -> usize {
    6
}

fn default_agent_iterations() -> usize {
    3
}

fn default_agent_timeout() -> u64 {
    20
}

fn default_search_timeout() -> u64 {
    10
}

fn default_backend_timeout() -> u64 {
    120
}

fn default_max_tokens() -> usize {
    2_048
}

fn default_utility_max_tokens() -> usize {
    512
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            prefix_reuse: true,
            prefix_token_budget: default_prefix_budget(),
            tokenizer_path: None,
            snapshot_capacity: default_snapshot_capacity(),
            snapshot_ttl_secs: default_snapshot_ttl(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            token_budget: default_retrieval_budget(),
            top_k: default_top_k(),
            rrf_k: default_rrf_k(),
            quality_threshold: default_quality_threshold(),
            max_sub_queries: default_max_sub_queries(),
            agent_enabled: false,
            agent_max_iterations: default_agent_iterations(),
            agent_timeout_secs: default_agent_timeout(),
            search_timeout_secs: default_search_timeout(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_backend_timeout(),
            max_tokens: default_max_tokens(),
            utility_max_tokens: default_utility_max_tokens(),
            route_extraction_to_secondary: false,
        }
    }
}

impl RetrievalConfig {
    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs)
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_secs)
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl EngineConfig {
    /// Load configuration with priority:
    /// 1. `{data_path}/fabula.toml` file
    /// 2. `FABULA_CONFIG` env var (JSON)
    /// 3. Defaults
    ///
    /// The resolved config is validated before being returned.
    pub fn load(data_path: &Path) -> Result<Self, FabulaError> {
        let config_path = data_path.join("fabula.toml");
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(contents) => match toml::from_str::<EngineConfig>(&contents) {
                    Ok(config) => {
                        info!("Loaded engine config from {}", config_path.display());
                        config.validate()?;
                        return Ok(config);
                    }
                    Err(e) => {
                        tracing::warn!(
                            "Failed to parse {}: {}. Using default.",
                            config_path.display(),
                            e
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        "Failed to read {}: {}. Using default.",
                        config_path.display(),
                        e
                    );
                }
            }
        }

        if let Ok(json) = std::env::var("FABULA_CONFIG") {
            match serde_json::from_str::<EngineConfig>(&json) {
                Ok(config) => {
                    info!("Loaded engine config from FABULA_CONFIG env");
                    config.validate()?;
                    return Ok(config);
                }
                Err(e) => {
                    tracing::warn!("Failed to parse FABULA_CONFIG: {}. Using default.", e);
                }
            }
        }

        let config = EngineConfig::default();
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), FabulaError> {
        if self.assembly.batch_size == 0 {
            return Err(FabulaError::Config(
                "assembly.batch_size must be at least 1".into(),
            ));
        }
        if self.assembly.prefix_token_budget == 0 {
            return Err(FabulaError::Config(
                "assembly.prefix_token_budget must be positive".into(),
            ));
        }
        if self.retrieval.token_budget == 0 {
            return Err(FabulaError::Config(
                "retrieval.token_budget must be positive".into(),
            ));
        }
        if self.retrieval.top_k == 0 {
            return Err(FabulaError::Config("retrieval.top_k must be positive".into()));
        }
        if self.retrieval.rrf_k <= 0.0 {
            return Err(FabulaError::Config("retrieval.rrf_k must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.retrieval.quality_threshold) {
            return Err(FabulaError::Config(
                "retrieval.quality_threshold must be within [0, 1]".into(),
            ));
        }
        if self.retrieval.max_sub_queries == 0 {
            return Err(FabulaError::Config(
                "retrieval.max_sub_queries must be positive".into(),
            ));
        }
        if self.retrieval.agent_max_iterations == 0 {
            return Err(FabulaError::Config(
                "retrieval.agent_max_iterations must be positive".into(),
            ));
        }
        if self.backend.max_tokens == 0 || self.backend.utility_max_tokens == 0 {
            return Err(FabulaError::Config(
                "backend token limits must be positive".into(),
            ));
        }
        Ok(())
    }
}
