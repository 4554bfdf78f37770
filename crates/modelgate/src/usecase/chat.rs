use std::sync::Arc;

use super::{ensure_request_id, GenerationDefaults};
use crate::context::CallContext;
use crate::errors::{GatewayError, GatewayResult};
use crate::models::chat::{ChatRequest, ChatResponse};
use crate::models::spec::Capability;
use crate::providers::base::{ChunkSink, Provider};
use crate::router::{ModelRouter, ResolvedModel};

/// Resolves the adapter for a chat request and delegates to it.
pub struct ChatUseCase {
    router: Arc<ModelRouter>,
    defaults: GenerationDefaults,
}

impl ChatUseCase {
    pub fn new(router: Arc<ModelRouter>, defaults: GenerationDefaults) -> Self {
        Self { router, defaults }
    }

    fn prepare(
        &self,
        mut request: ChatRequest,
        capability: Capability,
    ) -> GatewayResult<(ChatRequest, Arc<dyn Provider>, ResolvedModel)> {
        request.validate()?;
        ensure_request_id(&mut request.id);

        let (provider, resolved) = self.router.resolve(&request.model)?;
        let capabilities = &resolved.spec.capabilities;
        let missing = if !capabilities.supports(capability) {
            Some(capability)
        } else if !request.params.tools.is_empty() && !capabilities.supports(Capability::Tools) {
            Some(Capability::Tools)
        } else {
            None
        };
        if let Some(missing) = missing {
            return Err(
                GatewayError::unsupported(resolved.spec.provider.to_string(), missing)
                    .with_model(&request.model),
            );
        }

        let params = &mut request.params;
        if params.max_tokens.is_none() {
            params.max_tokens = self.defaults.max_tokens;
        }
        if params.temperature.is_none() {
            params.temperature = self.defaults.temperature;
        }
        Ok((request, provider, resolved))
    }

    pub async fn chat(&self, ctx: &CallContext, request: ChatRequest) -> GatewayResult<ChatResponse> {
        let (request, provider, resolved) = self.prepare(request, Capability::Chat)?;
        tracing::debug!(
            request_id = request.request_id(),
            model = %request.model,
            provider = %resolved.spec.provider,
            "dispatching chat"
        );

        provider
            .chat(ctx, &request)
            .await
            .map_err(|e| e.with_model(&request.model))
    }

    /// Forward chunks from the adapter to `sink` as they arrive.
    pub async fn chat_stream(
        &self,
        ctx: &CallContext,
        mut request: ChatRequest,
        sink: &mut dyn ChunkSink,
    ) -> GatewayResult<()> {
        request.stream = true;
        let (request, provider, resolved) = self.prepare(request, Capability::ChatStream)?;
        tracing::debug!(
            request_id = request.request_id(),
            model = %request.model,
            provider = %resolved.spec.provider,
            "dispatching chat stream"
        );

        provider
            .chat_stream(ctx, &request, sink)
            .await
            .map_err(|e| e.with_model(&request.model))
    }
}
