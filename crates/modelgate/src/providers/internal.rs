use async_trait::async_trait;

use super::base::{ChunkSink, Provider};
use super::configs::InternalProviderConfig;
use super::openai_compat::OpenAiCompatClient;
use super::utils::OpenAiDialect;
use crate::context::CallContext;
use crate::errors::{GatewayError, GatewayResult};
use crate::models::chat::{ChatRequest, ChatResponse};
use crate::models::embedding::{EmbedRequest, EmbedResponse};
use crate::models::spec::{ModelSpec, ProviderFamily};

/// The in-house OpenAI-compatible deployment.
///
/// It serves only the models it is configured with, rejects the tool role and
/// expects every single-part message as a bare string.
pub struct InternalProvider {
    client: OpenAiCompatClient,
    models: Vec<ModelSpec>,
}

impl InternalProvider {
    pub fn new(config: InternalProviderConfig) -> GatewayResult<Self> {
        if config.models.is_empty() {
            return Err(GatewayError::Configuration(
                "internal provider needs at least one configured model".to_string(),
            ));
        }

        let dialect = OpenAiDialect {
            family: ProviderFamily::Internal,
            tool_role: false,
            images: true,
        };
        let client = OpenAiCompatClient::new(
            config.endpoint,
            dialect,
            config.collapse,
            "/v1/chat/completions",
        )?
        .with_embeddings("/v1/embeddings");

        Ok(Self {
            client,
            models: config.models,
        })
    }
}

#[async_trait]
impl Provider for InternalProvider {
    fn family(&self) -> ProviderFamily {
        ProviderFamily::Internal
    }

    fn list_models(&self) -> Vec<ModelSpec> {
        self.models.clone()
    }

    async fn chat(&self, ctx: &CallContext, request: &ChatRequest) -> GatewayResult<ChatResponse> {
        self.client.chat(ctx, request).await
    }

    async fn chat_stream(
        &self,
        ctx: &CallContext,
        request: &ChatRequest,
        sink: &mut dyn ChunkSink,
    ) -> GatewayResult<()> {
        self.client.chat_stream(ctx, request, sink).await
    }

    async fn embed(&self, ctx: &CallContext, request: &EmbedRequest) -> GatewayResult<EmbedResponse> {
        self.client.embed(ctx, request).await
    }
}
