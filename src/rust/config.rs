use std::env;
use std::fs;
use std::io;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::attention::DEFAULT_TARGET;
use crate::highlight::HighlightConfig;
use crate::sensitivity::SensitivityConfig;

/// Environment variable overriding the intercepted layer name
pub const TARGET_LAYER_ENV: &str = "ATTNCAT_TARGET_LAYER";
/// Environment variable overriding the highlight threshold
pub const THRESHOLD_ENV: &str = "ATTNCAT_THRESHOLD";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttncatConfig {
    /// Name of the layer to intercept
    pub target_layer: String,
    pub highlight: HighlightConfig,
    pub sensitivity: SensitivityConfig,
}

impl Default for AttncatConfig {
    fn default() -> Self {
        Self {
            target_layer: DEFAULT_TARGET.to_string(),
            highlight: HighlightConfig::default(),
            sensitivity: SensitivityConfig::default(),
        }
    }
}

impl AttncatConfig {
    /// Defaults with environment overrides applied
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    /// Reads a JSON config file. Missing fields take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| env::var(key).ok())
    }

    /// Applies overrides looked up by environment variable name.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(target) = lookup(TARGET_LAYER_ENV) {
            self.target_layer = target;
        }
        if let Some(threshold) = lookup(THRESHOLD_ENV) {
            self.highlight.threshold = threshold.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("{} is not a number: {}", THRESHOLD_ENV, threshold))
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_layer.trim().is_empty() {
            return Err(ConfigError::Invalid("target_layer cannot be empty".into()));
        }
        self.highlight.validate().map_err(ConfigError::Invalid)?;
        self.sensitivity.validate().map_err(ConfigError::Invalid)
    }
}
