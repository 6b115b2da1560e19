//! Registry parsing from YAML/JSON.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use thiserror::Error;

use super::{ModelConfig, ModelRegistry};
use crate::error::ConfigurationError;

/// Errors that can occur when loading a registry file.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Failed to read registry file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Registry validation failed: {0}")]
    ValidationError(String),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

/// On-disk registry layout.
///
/// ```yaml
/// models:
///   - name: gpt-4o
///     provider: openai
///     weight: 1.2
///     cost_per_1k_tokens: 0.005
///     timeout: 20s
///   - name: claude-haiku
///     provider: anthropic
///     enabled: false
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RegistryFile {
    #[serde(default)]
    pub models: Vec<ModelConfig>,
}

impl RegistryFile {
    /// Parse a registry from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, RegistryError> {
        let file: RegistryFile = serde_yaml::from_str(yaml)?;
        file.validate()?;
        Ok(file)
    }

    /// Parse a registry from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, RegistryError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse a registry from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, RegistryError> {
        let file: RegistryFile = serde_json::from_str(json)?;
        file.validate()?;
        Ok(file)
    }

    /// Validate every entry and reject duplicate names.
    pub fn validate(&self) -> Result<(), RegistryError> {
        let mut seen = HashSet::new();
        for model in &self.models {
            if !seen.insert(model.name) {
                return Err(RegistryError::ValidationError(format!(
                    "Duplicate model: {}",
                    model.name
                )));
            }
            model.validate()?;
        }
        Ok(())
    }

    /// Build a live registry from this file.
    pub fn into_registry(self) -> Result<ModelRegistry, RegistryError> {
        let mut registry = ModelRegistry::new();
        for model in self.models {
            registry.upsert(model)?;
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ModelName, Provider};
    use std::time::Duration;

    const VALID_REGISTRY: &str = r#"
models:
  - name: gpt-4o
    provider: openai
    weight: 1.2
    cost_per_1k_tokens: 0.005
    timeout: 20s
  - name: claude-haiku
    provider: anthropic
    cost_per_1k_tokens: 0.0008
    enabled: false
"#;

    #[test]
    fn test_parse_valid_registry() {
        let file = RegistryFile::from_yaml(VALID_REGISTRY).unwrap();
        assert_eq!(file.models.len(), 2);

        let registry = file.into_registry().unwrap();
        let gpt = registry.get(ModelName::Gpt4o).unwrap();
        assert_eq!(gpt.provider, Provider::OpenAi);
        assert_eq!(gpt.timeout, Duration::from_secs(20));
        assert_eq!(gpt.max_tokens, 500);

        let haiku = registry.get(ModelName::ClaudeHaiku).unwrap();
        assert!(!haiku.enabled);
        assert_eq!(haiku.weight, 1.0);
        assert_eq!(registry.enabled_count(), 1);
    }

    #[test]
    fn test_unknown_model_name_is_rejected() {
        let yaml = r#"
models:
  - name: gpt-9
    provider: openai
"#;
        assert!(matches!(
            RegistryFile::from_yaml(yaml),
            Err(RegistryError::YamlError(_))
        ));
    }

    #[test]
    fn test_duplicate_models() {
        let yaml = r#"
models:
  - name: gemini-pro
    provider: google
  - name: gemini-pro
    provider: google
    weight: 2.0
"#;
        assert!(matches!(
            RegistryFile::from_yaml(yaml),
            Err(RegistryError::ValidationError(_))
        ));
    }

    #[test]
    fn test_invalid_weight_in_json() {
        let json = r#"{"models": [{"name": "mistral-large", "provider": "mistral", "weight": 0}]}"#;
        assert!(matches!(
            RegistryFile::from_json(json),
            Err(RegistryError::Configuration(
                ConfigurationError::InvalidModelConfig { .. }
            ))
        ));
    }
}
