use std::sync::Arc;

use super::{
    anthropic::AnthropicProvider, base::Provider, configs::ProviderConfig,
    deepseek::DeepSeekProvider, google::GoogleProvider, internal::InternalProvider,
    openai::OpenAiProvider,
};
use crate::errors::{GatewayError, GatewayResult};
use crate::models::spec::ProviderFamily;

pub fn get_provider(config: ProviderConfig) -> GatewayResult<Arc<dyn Provider>> {
    match config {
        ProviderConfig::OpenAi(openai_config) => Ok(Arc::new(OpenAiProvider::new(openai_config)?)),
        ProviderConfig::Anthropic(anthropic_config) => {
            Ok(Arc::new(AnthropicProvider::new(anthropic_config)?))
        }
        ProviderConfig::Google(google_config) => Ok(Arc::new(GoogleProvider::new(google_config)?)),
        ProviderConfig::DeepSeek(deepseek_config) => {
            Ok(Arc::new(DeepSeekProvider::new(deepseek_config)?))
        }
        ProviderConfig::Internal(internal_config) => {
            Ok(Arc::new(InternalProvider::new(internal_config)?))
        }
    }
}

/// One constructed adapter per provider family, in registration order.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every adapter up front. Any construction failure aborts the whole registry.
    pub fn from_configs(configs: Vec<ProviderConfig>) -> GatewayResult<Self> {
        let mut registry = Self::new();
        for config in configs {
            let family = config.family();
            let provider = get_provider(config)?;
            tracing::info!(provider = %family, models = provider.list_models().len(), "registered provider");
            registry.register(provider)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, provider: Arc<dyn Provider>) -> GatewayResult<()> {
        let family = provider.family();
        if self.get(family).is_some() {
            return Err(GatewayError::Configuration(format!(
                "provider {} is registered twice",
                family
            )));
        }
        self.providers.push(provider);
        Ok(())
    }

    pub fn get(&self, family: ProviderFamily) -> Option<Arc<dyn Provider>> {
        self.providers
            .iter()
            .find(|provider| provider.family() == family)
            .cloned()
    }

    pub fn providers(&self) -> &[Arc<dyn Provider>] {
        &self.providers
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::providers::configs::{
        DeepSeekProviderConfig, InternalProviderConfig, OpenAiProviderConfig,
    };
    use secrecy::SecretString;

    fn key() -> SecretString {
        SecretString::from("test_api_key".to_string())
    }

    #[test]
    fn test_registry_keeps_registration_order() {
        let registry = ProviderRegistry::from_configs(vec![
            ProviderConfig::DeepSeek(DeepSeekProviderConfig::new(key())),
            ProviderConfig::OpenAi(OpenAiProviderConfig::new(key())),
        ])
        .unwrap();

        let families: Vec<_> = registry.providers().iter().map(|p| p.family()).collect();
        assert_eq!(families, vec![ProviderFamily::DeepSeek, ProviderFamily::OpenAi]);
        assert!(registry.get(ProviderFamily::Google).is_none());
    }

    #[test]
    fn test_duplicate_family_is_rejected() {
        let result = ProviderRegistry::from_configs(vec![
            ProviderConfig::OpenAi(OpenAiProviderConfig::new(key())),
            ProviderConfig::OpenAi(OpenAiProviderConfig::new(key())),
        ]);
        let err = result.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(err.to_string().contains("registered twice"));
    }

    #[test]
    fn test_construction_failure_is_fatal() {
        let result = ProviderRegistry::from_configs(vec![
            ProviderConfig::OpenAi(OpenAiProviderConfig::new(key())),
            ProviderConfig::Internal(InternalProviderConfig::new("not a url", key())),
        ]);
        assert!(result.is_err());
    }
}
