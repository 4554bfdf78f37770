use async_trait::async_trait;

use super::base::{ChunkSink, Provider};
use super::configs::OpenAiProviderConfig;
use super::openai_compat::OpenAiCompatClient;
use super::utils::OpenAiDialect;
use crate::context::CallContext;
use crate::errors::GatewayResult;
use crate::models::chat::{ChatRequest, ChatResponse};
use crate::models::embedding::{EmbedRequest, EmbedResponse};
use crate::models::spec::{ModelSpec, ProviderFamily};

pub const OPENAI_HOST: &str = "https://api.openai.com";

pub fn default_models() -> Vec<ModelSpec> {
    vec![
        ModelSpec::chat("gpt-4o", ProviderFamily::OpenAi).with_display_name("GPT-4o"),
        ModelSpec::chat("gpt-4o-mini", ProviderFamily::OpenAi).with_display_name("GPT-4o mini"),
        ModelSpec::embedding("text-embedding-3-small", ProviderFamily::OpenAi),
        ModelSpec::embedding("text-embedding-3-large", ProviderFamily::OpenAi),
    ]
}

pub struct OpenAiProvider {
    client: OpenAiCompatClient,
    models: Vec<ModelSpec>,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiProviderConfig) -> GatewayResult<Self> {
        let dialect = OpenAiDialect {
            family: ProviderFamily::OpenAi,
            tool_role: true,
            images: true,
        };
        let client = OpenAiCompatClient::new(
            config.endpoint,
            dialect,
            config.collapse,
            "/v1/chat/completions",
        )?
        .with_embeddings("/v1/embeddings")
        .with_stream_usage();

        Ok(Self {
            client,
            models: config.models,
        })
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn family(&self) -> ProviderFamily {
        ProviderFamily::OpenAi
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
