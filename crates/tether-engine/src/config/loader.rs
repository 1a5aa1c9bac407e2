use super::schema::TetherConfig;
use regex::RegexBuilder;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from default locations:
    /// 1. ./tether.yaml
    /// 2. ~/.tether/config.yaml
    /// 3. Default configuration
    pub async fn load_default() -> Result<TetherConfig, ConfigError> {
        let local_config = PathBuf::from("./tether.yaml");
        if local_config.exists() {
            return Self::load_from(&local_config).await;
        }

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".tether").join("config.yaml");
            if home_config.exists() {
                return Self::load_from(&home_config).await;
            }
        }

        Ok(TetherConfig::default())
    }

    pub async fn load_from(path: &Path) -> Result<TetherConfig, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<TetherConfig, ConfigError> {
        let config: TetherConfig = serde_yaml::from_str(content)?;
        Self::validate(&config)?;
        Ok(config)
    }

    fn validate(config: &TetherConfig) -> Result<(), ConfigError> {
        for pattern in &config.completion.error_patterns {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| {
                    ConfigError::Invalid(format!("error pattern '{}': {}", pattern, e))
                })?;
        }
        if config.resolution.strategy_floor_ms > config.resolution.strategy_ceiling_ms {
            return Err(ConfigError::Invalid(format!(
                "resolution.strategy_floor_ms ({}) exceeds strategy_ceiling_ms ({})",
                config.resolution.strategy_floor_ms, config.resolution.strategy_ceiling_ms
            )));
        }
        if config.resolution.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "resolution.poll_interval_ms must be greater than zero".into(),
            ));
        }
        if config.completion.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "completion.poll_interval_ms must be greater than zero".into(),
            ));
        }
        if !config.site.conversation_path.contains("{id}") {
            return Err(ConfigError::Invalid(format!(
                "site.conversation_path '{}' has no {{id}} placeholder",
                config.site.conversation_path
            )));
        }
        if let Some(base) = &config.site.base_url {
            url::Url::parse(base)
                .map_err(|e| ConfigError::Invalid(format!("site.base_url '{}': {}", base, e)))?;
        }
        Ok(())
    }
}
