use async_trait::async_trait;

use crate::context::CallContext;
use crate::errors::{GatewayError, GatewayResult};
use crate::models::chat::{ChatRequest, ChatResponse, ChatResponseChunk};
use crate::models::embedding::{EmbedRequest, EmbedResponse};
use crate::models::spec::{Capability, ModelSpec, ProviderFamily};

/// Receiver of streamed chunks.
///
/// An error from [`ChunkSink::emit`] means the consumer is gone or refused the
/// chunk; the producer must stop reading upstream and return that error.
#[async_trait]
pub trait ChunkSink: Send {
    async fn emit(&mut self, chunk: ChatResponseChunk) -> GatewayResult<()>;
}

#[async_trait]
impl ChunkSink for Vec<ChatResponseChunk> {
    async fn emit(&mut self, chunk: ChatResponseChunk) -> GatewayResult<()> {
        self.push(chunk);
        Ok(())
    }
}

/// Base trait for upstream providers (OpenAI, Anthropic, etc)
///
/// Every capability defaults to [`GatewayError::Unsupported`]; an adapter
/// overrides the subset its provider offers.
#[async_trait]
pub trait Provider: Send + Sync {
    fn family(&self) -> ProviderFamily;

    /// Models this adapter advertises. Static for the lifetime of the adapter.
    fn list_models(&self) -> Vec<ModelSpec>;

    /// Generate a complete response in one call
    async fn chat(&self, _ctx: &CallContext, _request: &ChatRequest) -> GatewayResult<ChatResponse> {
        Err(GatewayError::unsupported(self.family().to_string(), Capability::Chat))
    }

    /// Generate a response, pushing chunks to `sink` in upstream arrival order
    async fn chat_stream(
        &self,
        _ctx: &CallContext,
        _request: &ChatRequest,
        _sink: &mut dyn ChunkSink,
    ) -> GatewayResult<()> {
        Err(GatewayError::unsupported(
            self.family().to_string(),
            Capability::ChatStream,
        ))
    }

    /// Embed each content, returning vectors index-aligned with the inputs
    async fn embed(&self, _ctx: &CallContext, _request: &EmbedRequest) -> GatewayResult<EmbedResponse> {
        Err(GatewayError::unsupported(self.family().to_string(), Capability::Embed))
    }
}
