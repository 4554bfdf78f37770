//! Model id to adapter routing.
//!
//! The table is built once from the registry and never mutated, so lookups
//! need no locking.

use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::{GatewayError, GatewayResult};
use crate::models::spec::ModelSpec;
use crate::providers::base::Provider;
use crate::providers::factory::ProviderRegistry;

/// What the router knows about a resolved model.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedModel {
    pub spec: ModelSpec,
    /// Position of the serving adapter in registration order
    pub provider_index: usize,
}

pub struct ModelRouter {
    providers: Vec<Arc<dyn Provider>>,
    routes: HashMap<String, ResolvedModel>,
    models: Vec<ModelSpec>,
}

impl ModelRouter {
    pub fn new(registry: &ProviderRegistry) -> Self {
        Self::from_providers(registry.providers().to_vec())
    }

    /// When two adapters advertise the same model id the first registered wins.
    pub fn from_providers(providers: Vec<Arc<dyn Provider>>) -> Self {
        let mut routes: HashMap<String, ResolvedModel> = HashMap::new();
        let mut models = Vec::new();

        for (index, provider) in providers.iter().enumerate() {
            for spec in provider.list_models() {
                if let Some(existing) = routes.get(&spec.id) {
                    tracing::warn!(
                        model = %spec.id,
                        provider = %provider.family(),
                        served_by = %providers[existing.provider_index].family(),
                        "model id advertised twice, keeping the first registration"
                    );
                    continue;
                }
                routes.insert(
                    spec.id.clone(),
                    ResolvedModel {
                        spec: spec.clone(),
                        provider_index: index,
                    },
                );
                models.push(spec);
            }
        }

        Self {
            providers,
            routes,
            models,
        }
    }

    pub fn resolve(&self, model_id: &str) -> GatewayResult<(Arc<dyn Provider>, ResolvedModel)> {
        let resolved = self
            .routes
            .get(model_id)
            .ok_or_else(|| GatewayError::ModelNotFound(model_id.to_string()))?;

        Ok((
            Arc::clone(&self.providers[resolved.provider_index]),
            resolved.clone(),
        ))
    }

    /// Every routable model, in adapter registration order.
    pub fn list_models(&self) -> Vec<ModelSpec> {
        self.models.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::models::spec::ProviderFamily;
    use async_trait::async_trait;

    struct StaticProvider {
        family: ProviderFamily,
        models: Vec<&'static str>,
    }

    #[async_trait]
    impl Provider for StaticProvider {
        fn family(&self) -> ProviderFamily {
            self.family
        }

        fn list_models(&self) -> Vec<ModelSpec> {
            self.models
                .iter()
                .map(|id| ModelSpec::chat(*id, self.family))
                .collect()
        }
    }

    fn router() -> ModelRouter {
        ModelRouter::from_providers(vec![
            Arc::new(StaticProvider {
                family: ProviderFamily::OpenAi,
                models: vec!["gpt-x", "shared"],
            }),
            Arc::new(StaticProvider {
                family: ProviderFamily::Internal,
                models: vec![],
            }),
            Arc::new(StaticProvider {
                family: ProviderFamily::DeepSeek,
                models: vec!["deepseek-chat", "shared"],
            }),
        ])
    }

    #[test]
    fn test_resolve_is_stable() {
        let router = router();
        for _ in 0..3 {
            let (provider, resolved) = router.resolve("gpt-x").unwrap();
            assert_eq!(provider.family(), ProviderFamily::OpenAi);
            assert_eq!(resolved.provider_index, 0);
            assert_eq!(resolved.spec.id, "gpt-x");
        }

        let (provider, resolved) = router.resolve("deepseek-chat").unwrap();
        assert_eq!(provider.family(), ProviderFamily::DeepSeek);
        assert_eq!(resolved.provider_index, 2);
    }

    #[test]
    fn test_first_registration_wins() {
        let (provider, resolved) = router().resolve("shared").unwrap();
        assert_eq!(provider.family(), ProviderFamily::OpenAi);
        assert_eq!(resolved.spec.provider, ProviderFamily::OpenAi);
    }

    #[test]
    fn test_unknown_model() {
        let err = router().resolve("unknown-model").err().unwrap();
        assert_eq!(err.kind(), ErrorKind::ModelNotFound);
        assert_eq!(err.to_string(), "Model not found: unknown-model");
    }

    #[test]
    fn test_list_models_in_registration_order() {
        let router = router();
        let ids: Vec<_> = router.list_models().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec!["gpt-x", "shared", "deepseek-chat"]);
        assert_eq!(router.list_models(), router.list_models());
    }
}
