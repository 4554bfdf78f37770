use async_trait::async_trait;

use super::base::{ChunkSink, Provider};
use super::configs::DeepSeekProviderConfig;
use super::openai_compat::OpenAiCompatClient;
use super::utils::OpenAiDialect;
use crate::context::CallContext;
use crate::errors::GatewayResult;
use crate::models::chat::{ChatRequest, ChatResponse};
use crate::models::spec::{ModelSpec, ProviderFamily};

pub const DEEPSEEK_HOST: &str = "https://api.deepseek.com";

pub fn default_models() -> Vec<ModelSpec> {
    vec![
        ModelSpec::chat("deepseek-chat", ProviderFamily::DeepSeek).with_display_name("DeepSeek V3"),
        ModelSpec::chat("deepseek-reasoner", ProviderFamily::DeepSeek)
            .with_display_name("DeepSeek R1"),
    ]
}

/// DeepSeek speaks the OpenAI wire format but only takes plain string content
/// and has no image input or embeddings endpoint.
pub struct DeepSeekProvider {
    client: OpenAiCompatClient,
    models: Vec<ModelSpec>,
}

impl DeepSeekProvider {
    pub fn new(config: DeepSeekProviderConfig) -> GatewayResult<Self> {
        let dialect = OpenAiDialect {
            family: ProviderFamily::DeepSeek,
            tool_role: true,
            images: false,
        };
        let client =
            OpenAiCompatClient::new(config.endpoint, dialect, config.collapse, "/chat/completions")?
                .with_stream_usage();

        Ok(Self {
            client,
            models: config.models,
        })
    }
}

#[async_trait]
impl Provider for DeepSeekProvider {
    fn family(&self) -> ProviderFamily {
        ProviderFamily::DeepSeek
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::models::embedding::EmbedRequest;
    use crate::models::message::{ContentPart, Message};
    use secrecy::SecretString;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_at(host: &str) -> DeepSeekProvider {
        let mut config = DeepSeekProviderConfig::new(SecretString::from("test_api_key".to_string()));
        config.endpoint.host = host.to_string();
        DeepSeekProvider::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_chat_sends_collapsed_string_content() -> GatewayResult<()> {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({
                "model": "deepseek-chat",
                "messages": [
                    {"role": "system", "content": "Be brief."},
                    {"role": "user", "content": "Hello"}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "ds-1",
                "model": "deepseek-chat",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "Hi."},
                    "finish_reason": "stop"
                }]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let provider = provider_at(&mock_server.uri());
        let request = ChatRequest::new(
            "deepseek-chat",
            vec![
                Message::system(vec![ContentPart::text("Be brief.")]),
                Message::user(vec![ContentPart::text("Hello")]),
            ],
        );

        let response = provider.chat(&CallContext::default(), &request).await?;
        assert_eq!(response.message.content.text(), "Hi.");
        Ok(())
    }

    #[tokio::test]
    async fn test_images_are_rejected_before_sending() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let provider = provider_at(&mock_server.uri());
        let request = ChatRequest::new(
            "deepseek-chat",
            vec![Message::user(vec![
                ContentPart::text("What is this?"),
                ContentPart::image_url("https://example.com/a.png"),
            ])],
        );

        let err = provider
            .chat(&CallContext::default(), &request)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TranslationFailure);
    }

    #[tokio::test]
    async fn test_embed_is_unsupported() {
        let provider = provider_at(DEEPSEEK_HOST);
        let err = provider
            .embed(
                &CallContext::default(),
                &EmbedRequest::new("deepseek-chat", vec!["a".into()]),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }
}
