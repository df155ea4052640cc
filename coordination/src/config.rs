//! Engine configuration.
//!
//! Parsed from an already-loaded TOML document; finding and reading the file
//! is the caller's business. Every section is optional.
//!
//! ```toml
//! [dispatch]
//! max_concurrency = 8
//! request_timeout_secs = 90
//!
//! [dispatch.retry]
//! max_retries = 3
//!
//! [debate]
//! synthesizer = "opus"
//!
//! [[models]]
//! id = "qwen-coder"
//! aliases = ["qwen"]
//! provider = "remote_api"
//! api_style = "open_ai"
//! endpoint = "http://localhost:8000/v1/chat/completions"
//! ```

use serde::{Deserialize, Serialize};

use crate::consensus::ScoringConfig;
use crate::debate::DebateConfig;
use crate::perf_control::DispatchConfig;
use crate::registry::{ModelEntry, ModelRegistry, RegistryError};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Custom entries, applied after the built-in table in order.
    pub models: Vec<ModelEntry>,
    pub dispatch: DispatchConfig,
    pub scoring: ScoringConfig,
    pub debate: DebateConfig,
}

impl EngineConfig {
    pub fn from_toml_str(document: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(document)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.dispatch.validate().map_err(ConfigError::Invalid)?;
        self.scoring.validate().map_err(ConfigError::Invalid)?;
        if self.debate.round_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "debate.round_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Built-in table plus `models`, last registration wins.
    pub fn build_registry(&self) -> Result<ModelRegistry, ConfigError> {
        Ok(ModelRegistry::with_entries(self.models.iter().cloned())?)
    }
}
