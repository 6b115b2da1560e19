//! Model registry: the catalog of judges taking part in the ensemble.
//!
//! Pure in-memory state. Loading from files lives in [`file`].

mod config;
mod file;

pub use config::ModelConfig;
pub use file::{RegistryError, RegistryFile};

use std::collections::{BTreeMap, HashMap};

use crate::error::ConfigurationError;
use crate::types::ModelName;

/// Holds at most one live [`ModelConfig`] per model name.
///
/// Iteration order is the model name order, so listings and dispatch
/// plans are deterministic.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: BTreeMap<ModelName, ModelConfig>,
}

impl ModelRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry seeded with the default judge roster.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let defaults = [
            ModelConfig::new(ModelName::Gpt4o)
                .with_weight(1.2)
                .with_cost(0.005),
            ModelConfig::new(ModelName::ClaudeSonnet)
                .with_weight(1.1)
                .with_cost(0.003),
            ModelConfig::new(ModelName::GeminiPro)
                .with_weight(1.0)
                .with_cost(0.00125),
            ModelConfig::new(ModelName::ClaudeHaiku)
                .with_weight(0.8)
                .with_cost(0.0008),
            ModelConfig::new(ModelName::Gpt4oMini)
                .with_weight(0.7)
                .with_cost(0.00015),
        ];
        for config in defaults {
            registry.models.insert(config.name, config);
        }
        registry
    }

    /// Insert or replace the config for `config.name`.
    ///
    /// Returns the previous config, if any.
    pub fn upsert(&mut self, config: ModelConfig) -> Result<Option<ModelConfig>, ConfigurationError> {
        config.validate()?;
        tracing::debug!(model = %config.name, enabled = config.enabled, "Model configured");
        Ok(self.models.insert(config.name, config))
    }

    /// Enable a model without touching its configuration.
    pub fn enable(&mut self, name: ModelName) -> Result<(), ConfigurationError> {
        self.set_enabled(name, true)
    }

    /// Disable a model without touching its configuration.
    pub fn disable(&mut self, name: ModelName) -> Result<(), ConfigurationError> {
        self.set_enabled(name, false)
    }

    fn set_enabled(&mut self, name: ModelName, enabled: bool) -> Result<(), ConfigurationError> {
        let config = self
            .models
            .get_mut(&name)
            .ok_or_else(|| ConfigurationError::UnknownModel(name.to_string()))?;
        config.enabled = enabled;
        Ok(())
    }

    /// Look up a model's config.
    pub fn get(&self, name: ModelName) -> Option<&ModelConfig> {
        self.models.get(&name)
    }

    /// All configs, enabled or not.
    pub fn list(&self) -> Vec<ModelConfig> {
        self.models.values().cloned().collect()
    }

    /// Enabled configs only.
    pub fn enabled(&self) -> Vec<ModelConfig> {
        self.models.values().filter(|c| c.enabled).cloned().collect()
    }

    pub fn enabled_count(&self) -> usize {
        self.models.values().filter(|c| c.enabled).count()
    }

    /// Voting weights for aggregation.
    pub fn weights(&self) -> HashMap<ModelName, f64> {
        self.models.values().map(|c| (c.name, c.weight)).collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_replaces_by_name() {
        let mut registry = ModelRegistry::new();
        assert!(registry
            .upsert(ModelConfig::new(ModelName::Gpt4o).with_weight(1.0))
            .unwrap()
            .is_none());

        let previous = registry
            .upsert(ModelConfig::new(ModelName::Gpt4o).with_weight(2.0))
            .unwrap();
        assert_eq!(previous.unwrap().weight, 1.0);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(ModelName::Gpt4o).unwrap().weight, 2.0);
    }

    #[test]
    fn test_upsert_rejects_invalid_config() {
        let mut registry = ModelRegistry::new();
        let result = registry.upsert(ModelConfig::new(ModelName::Gpt4o).with_weight(-1.0));
        assert!(result.is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_disable_keeps_configuration() {
        let mut registry = ModelRegistry::new();
        registry
            .upsert(ModelConfig::new(ModelName::ClaudeHaiku).with_cost(0.25))
            .unwrap();

        registry.disable(ModelName::ClaudeHaiku).unwrap();
        assert_eq!(registry.enabled_count(), 0);
        assert_eq!(registry.get(ModelName::ClaudeHaiku).unwrap().cost_per_1k_tokens, 0.25);

        registry.enable(ModelName::ClaudeHaiku).unwrap();
        assert_eq!(registry.enabled().len(), 1);
    }

    #[test]
    fn test_toggle_unknown_model() {
        let mut registry = ModelRegistry::new();
        assert_eq!(
            registry.enable(ModelName::MistralLarge),
            Err(ConfigurationError::UnknownModel("mistral-large".to_string()))
        );
    }

    #[test]
    fn test_defaults_listing_is_ordered() {
        let registry = ModelRegistry::with_defaults();
        let names: Vec<ModelName> = registry.list().iter().map(|c| c.name).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
        assert_eq!(registry.enabled_count(), 5);
        assert_eq!(registry.weights()[&ModelName::Gpt4o], 1.2);
    }
}
