use std::sync::Arc;
use std::time::Duration;

use modelgate::usecase::{ChatUseCase, EmbeddingUseCase, GenerationDefaults};
use modelgate::{CallContext, ModelRouter};
use tokio_util::sync::CancellationToken;

use crate::configuration::ServerSettings;
use crate::middleware::AuthConfig;

/// Shared application state. Everything in it is immutable after startup.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<ModelRouter>,
    pub chat: Arc<ChatUseCase>,
    pub embedding: Arc<EmbeddingUseCase>,
    pub auth: AuthConfig,
    pub request_timeout: Duration,
    pub stream_buffer: usize,
}

impl AppState {
    pub fn new(
        router: Arc<ModelRouter>,
        defaults: GenerationDefaults,
        server: &ServerSettings,
        auth: AuthConfig,
    ) -> Self {
        Self {
            chat: Arc::new(ChatUseCase::new(router.clone(), defaults)),
            embedding: Arc::new(EmbeddingUseCase::new(router.clone())),
            router,
            auth,
            request_timeout: server.request_timeout(),
            stream_buffer: server.stream_buffer.max(1),
        }
    }

    /// Context for one inbound call, carrying the configured deadline.
    pub fn call_context(&self, cancel: CancellationToken) -> CallContext {
        CallContext::new(cancel).with_timeout(self.request_timeout)
    }
}
