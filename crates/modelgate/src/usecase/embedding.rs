use std::sync::Arc;

use super::ensure_request_id;
use crate::context::CallContext;
use crate::errors::{GatewayError, GatewayResult};
use crate::models::embedding::{EmbedRequest, EmbedResponse};
use crate::models::spec::Capability;
use crate::router::ModelRouter;

pub struct EmbeddingUseCase {
    router: Arc<ModelRouter>,
}

impl EmbeddingUseCase {
    pub fn new(router: Arc<ModelRouter>) -> Self {
        Self { router }
    }

    /// Embed every content; the vectors come back in input order.
    pub async fn embed(&self, ctx: &CallContext, mut request: EmbedRequest) -> GatewayResult<EmbedResponse> {
        request.validate()?;
        ensure_request_id(&mut request.id);

        let (provider, resolved) = self.router.resolve(&request.model)?;
        if !resolved.spec.capabilities.supports(Capability::Embed) {
            return Err(
                GatewayError::unsupported(resolved.spec.provider.to_string(), Capability::Embed)
                    .with_model(&request.model),
            );
        }

        tracing::debug!(
            request_id = request.request_id(),
            model = %request.model,
            inputs = request.contents.len(),
            "dispatching embed"
        );

        provider
            .embed(ctx, &request)
            .await
            .and_then(|response| response.ensure_aligned(request.contents.len()))
            .map_err(|e| e.with_model(&request.model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::models::spec::{ModelSpec, ProviderFamily};
    use crate::providers::base::Provider;
    use async_trait::async_trait;

    /// Returns `[index, len]` for every input.
    struct LengthEmbedder;

    #[async_trait]
    impl Provider for LengthEmbedder {
        fn family(&self) -> ProviderFamily {
            ProviderFamily::Google
        }

        fn list_models(&self) -> Vec<ModelSpec> {
            vec![
                ModelSpec::embedding("embed-1", ProviderFamily::Google),
                ModelSpec::chat("chat-1", ProviderFamily::Google),
            ]
        }

        async fn embed(&self, _ctx: &CallContext, request: &EmbedRequest) -> GatewayResult<EmbedResponse> {
            Ok(EmbedResponse {
                id: request.request_id().to_string(),
                model: request.model.clone(),
                embeddings: request
                    .contents
                    .iter()
                    .enumerate()
                    .map(|(i, content)| vec![i as f32, content.len() as f32])
                    .collect(),
                usage: None,
            })
        }
    }

    fn use_case() -> EmbeddingUseCase {
        let router = ModelRouter::from_providers(vec![Arc::new(LengthEmbedder) as Arc<dyn Provider>]);
        EmbeddingUseCase::new(Arc::new(router))
    }

    #[tokio::test]
    async fn test_embed_is_index_aligned() {
        let response = use_case()
            .embed(
                &CallContext::default(),
                EmbedRequest::new("embed-1", vec!["a".into(), "bb".into()]),
            )
            .await
            .unwrap();

        assert_eq!(response.embeddings, vec![vec![0.0, 1.0], vec![1.0, 2.0]]);
        assert!(!response.id.is_empty());
    }

    #[tokio::test]
    async fn test_chat_model_cannot_embed() {
        let err = use_case()
            .embed(
                &CallContext::default(),
                EmbedRequest::new("chat-1", vec!["a".into()]),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }

    #[tokio::test]
    async fn test_empty_contents_rejected() {
        let err = use_case()
            .embed(&CallContext::default(), EmbedRequest::new("embed-1", vec![]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }
}
