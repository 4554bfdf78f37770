//! HTTP client for the OpenAI chat completions wire format.
//!
//! OpenAI itself, DeepSeek and the internal deployment all speak this dialect;
//! they differ in paths, per-role content collapsing, and which roles and
//! content kinds they accept.

use reqwest::{Client, Response};
use secrecy::ExposeSecret;
use serde_json::{json, Value};

use super::base::ChunkSink;
use super::configs::{ContentCollapse, EndpointConfig};
use super::streaming::{pump_stream, sse_events, ChunkAssembler, Event, StreamDecoder, StreamEvent};
use super::utils::{
    check_response, collapse_content, get_openai_usage, get_u32, messages_to_openai_spec,
    openai_finish_reason, openai_response_to_chat_response, tools_to_openai_spec, OpenAiDialect,
};
use crate::context::CallContext;
use crate::errors::{GatewayError, GatewayResult, RejectReason};
use crate::models::chat::{ChatRequest, ChatResponse, ChunkDelta, ToolCallDelta};
use crate::models::embedding::{EmbedRequest, EmbedResponse};
use crate::models::spec::Capability;

pub struct OpenAiCompatClient {
    client: Client,
    endpoint: EndpointConfig,
    dialect: OpenAiDialect,
    collapse: ContentCollapse,
    chat_path: &'static str,
    embeddings_path: Option<&'static str>,
    stream_usage: bool,
}

impl OpenAiCompatClient {
    pub fn new(
        endpoint: EndpointConfig,
        dialect: OpenAiDialect,
        collapse: ContentCollapse,
        chat_path: &'static str,
    ) -> GatewayResult<Self> {
        endpoint.validate(dialect.family)?;
        let client = build_http_client(&endpoint)?;

        Ok(Self {
            client,
            endpoint,
            dialect,
            collapse,
            chat_path,
            embeddings_path: None,
            stream_usage: false,
        })
    }

    pub fn with_embeddings(mut self, path: &'static str) -> Self {
        self.embeddings_path = Some(path);
        self
    }

    /// Ask for a usage report at the end of streamed responses.
    pub fn with_stream_usage(mut self) -> Self {
        self.stream_usage = true;
        self
    }

    pub fn build_chat_payload(&self, request: &ChatRequest, stream: bool) -> GatewayResult<Value> {
        let messages = messages_to_openai_spec(&request.messages, &self.dialect)?;
        let mut payload = json!({
            "model": request.model,
            "messages": messages,
        });

        let params = &request.params;
        if let Some(temperature) = params.temperature {
            payload["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = params.max_tokens {
            payload["max_tokens"] = json!(max_tokens);
        }
        if let Some(top_p) = params.top_p {
            payload["top_p"] = json!(top_p);
        }
        if !params.stop.is_empty() {
            payload["stop"] = json!(params.stop);
        }
        if !params.tools.is_empty() {
            payload["tools"] = json!(tools_to_openai_spec(&params.tools)?);
        }
        if stream {
            payload["stream"] = json!(true);
            if self.stream_usage {
                payload["stream_options"] = json!({ "include_usage": true });
            }
        }

        collapse_content(&mut payload, &self.collapse);
        Ok(payload)
    }

    async fn post(&self, ctx: &CallContext, path: &str, payload: &Value) -> GatewayResult<Response> {
        let url = self.endpoint.url(path);
        tracing::debug!(provider = %self.dialect.family, %url, "sending upstream request");

        ctx.guard(async {
            let response = self
                .client
                .post(&url)
                .bearer_auth(self.endpoint.api_key.expose_secret())
                .json(payload)
                .send()
                .await?;
            check_response(response).await
        })
        .await
    }

    async fn post_json(&self, ctx: &CallContext, path: &str, payload: &Value) -> GatewayResult<Value> {
        let response = self.post(ctx, path, payload).await?;
        let body = ctx
            .guard(async { Ok::<_, GatewayError>(response.json::<Value>().await?) })
            .await?;

        // Some compatible servers report failures in a 200 body
        if let Some(error) = body.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(GatewayError::rejected(RejectReason::Other, None, message));
        }
        Ok(body)
    }

    pub async fn chat(&self, ctx: &CallContext, request: &ChatRequest) -> GatewayResult<ChatResponse> {
        let payload = self.build_chat_payload(request, false)?;
        let body = self.post_json(ctx, self.chat_path, &payload).await?;
        openai_response_to_chat_response(&body, request.request_id(), &request.model)
    }

    pub async fn chat_stream(
        &self,
        ctx: &CallContext,
        request: &ChatRequest,
        sink: &mut dyn ChunkSink,
    ) -> GatewayResult<()> {
        let payload = self.build_chat_payload(request, true)?;
        let response = self.post(ctx, self.chat_path, &payload).await?;

        pump_stream(
            ctx,
            sse_events(response),
            OpenAiStreamDecoder,
            ChunkAssembler::new(request.request_id(), &request.model),
            sink,
        )
        .await
    }

    pub async fn embed(&self, ctx: &CallContext, request: &EmbedRequest) -> GatewayResult<EmbedResponse> {
        let path = self.embeddings_path.ok_or_else(|| {
            GatewayError::unsupported(self.dialect.family.to_string(), Capability::Embed)
        })?;

        let payload = json!({
            "model": request.model,
            "input": request.contents,
        });
        let body = self.post_json(ctx, path, &payload).await?;
        parse_embeddings(&body, request)
    }
}

pub(crate) fn build_http_client(endpoint: &EndpointConfig) -> GatewayResult<Client> {
    Client::builder()
        .connect_timeout(endpoint.connect_timeout)
        .build()
        .map_err(|e| GatewayError::Configuration(format!("failed to build http client: {}", e)))
}

/// Read `data[*].embedding`, ordered by each entry's `index`.
fn parse_embeddings(body: &Value, request: &EmbedRequest) -> GatewayResult<EmbedResponse> {
    let data = body
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| GatewayError::TranslationFailure("embedding response has no data".into()))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, entry) in data.iter().enumerate() {
        let index = entry
            .get("index")
            .and_then(Value::as_u64)
            .map_or(position, |index| index as usize);
        let vector: Vec<f32> = serde_json::from_value(entry["embedding"].clone()).map_err(|e| {
            GatewayError::TranslationFailure(format!("invalid embedding vector: {}", e))
        })?;
        indexed.push((index, vector));
    }
    indexed.sort_by_key(|(index, _)| *index);

    // after sorting, entry i must carry index i
    if let Some((position, (index, _))) = indexed
        .iter()
        .enumerate()
        .find(|(position, (index, _))| index != position)
    {
        return Err(GatewayError::TranslationFailure(format!(
            "embedding index {} is duplicated or out of range (expected {})",
            index, position
        )));
    }

    EmbedResponse {
        id: request.request_id().to_string(),
        model: request.model.clone(),
        embeddings: indexed.into_iter().map(|(_, vector)| vector).collect(),
        usage: get_openai_usage(body),
    }
    .ensure_aligned(request.contents.len())
}

/// Decoder for `chat.completion.chunk` events terminated by `[DONE]`.
pub struct OpenAiStreamDecoder;

impl StreamDecoder for OpenAiStreamDecoder {
    fn decode(&mut self, event: &Event) -> GatewayResult<Vec<StreamEvent>> {
        if event.data.trim() == "[DONE]" {
            return Ok(vec![StreamEvent::Done]);
        }

        let chunk: Value = serde_json::from_str(&event.data)
            .map_err(|e| GatewayError::TranslationFailure(format!("invalid stream chunk: {}", e)))?;

        if let Some(error) = chunk.get("error") {
            let message = error["message"].as_str().unwrap_or("stream error");
            return Err(GatewayError::rejected(RejectReason::Other, None, message));
        }

        let mut events = Vec::new();
        if let Some(choice) = chunk["choices"].get(0) {
            let delta = &choice["delta"];
            let mut out = ChunkDelta {
                text: delta["content"].as_str().map(str::to_string),
                tool_calls: Vec::new(),
            };
            if let Some(calls) = delta["tool_calls"].as_array() {
                for (position, call) in calls.iter().enumerate() {
                    out.tool_calls.push(ToolCallDelta {
                        index: get_u32(call, "index")
                            .unwrap_or_else(|| u32::try_from(position).unwrap_or(u32::MAX)),
                        id: call["id"].as_str().map(str::to_string),
                        name: call["function"]["name"].as_str().map(str::to_string),
                        arguments: call["function"]["arguments"]
                            .as_str()
                            .unwrap_or_default()
                            .to_string(),
                    });
                }
            }
            events.push(StreamEvent::Delta(out));

            if let Some(reason) = choice["finish_reason"].as_str() {
                events.push(StreamEvent::Finish(openai_finish_reason(reason)));
            }
        }

        if let Some(usage) = get_openai_usage(&chunk) {
            events.push(StreamEvent::Usage(usage));
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::{FinishReason, Usage};
    use crate::models::message::Message;
    use crate::models::spec::ProviderFamily;
    use crate::providers::streaming::tests::sse;
    use secrecy::SecretString;

    fn client(collapse: ContentCollapse) -> OpenAiCompatClient {
        OpenAiCompatClient::new(
            EndpointConfig::new("http://localhost:1", SecretString::from("key".to_string())),
            OpenAiDialect {
                family: ProviderFamily::OpenAi,
                tool_role: true,
                images: true,
            },
            collapse,
            "/v1/chat/completions",
        )
        .unwrap()
        .with_stream_usage()
    }

    #[test]
    fn test_payload_includes_params_and_stream_options() {
        let mut request = ChatRequest::new("gpt-4o", vec![Message::user("Hello")]);
        request.params.temperature = Some(0.5);
        request.params.max_tokens = Some(100);
        request.params.stop = vec!["END".into()];

        let payload = client(ContentCollapse::NONE)
            .build_chat_payload(&request, true)
            .unwrap();

        assert_eq!(payload["model"], "gpt-4o");
        assert_eq!(payload["temperature"], 0.5);
        assert_eq!(payload["max_tokens"], 100);
        assert_eq!(payload["stop"], json!(["END"]));
        assert_eq!(payload["stream"], true);
        assert_eq!(payload["stream_options"]["include_usage"], true);
        assert!(payload.get("tools").is_none());
    }

    #[test]
    fn test_payload_applies_collapse() {
        let request = ChatRequest::new(
            "m",
            vec![Message::user(vec![
                crate::models::message::ContentPart::text("only part"),
            ])],
        );

        let payload = client(ContentCollapse::NONE)
            .build_chat_payload(&request, false)
            .unwrap();
        assert!(payload["messages"][0]["content"].is_array());
        assert!(payload.get("stream").is_none());

        let payload = client(ContentCollapse::ALL)
            .build_chat_payload(&request, false)
            .unwrap();
        assert_eq!(payload["messages"][0]["content"], "only part");
    }

    #[test]
    fn test_decoder_text_finish_usage_done() {
        let mut decoder = OpenAiStreamDecoder;

        let events = decoder
            .decode(&sse(
                "",
                r#"{"choices":[{"index":0,"delta":{"content":"Hi"},"finish_reason":null}]}"#,
            ))
            .unwrap();
        assert_eq!(events, vec![StreamEvent::Delta(ChunkDelta::text("Hi"))]);

        let events = decoder
            .decode(&sse(
                "",
                r#"{"choices":[{"index":0,"delta":{},"finish_reason":"length"}]}"#,
            ))
            .unwrap();
        assert_eq!(events[1], StreamEvent::Finish(FinishReason::Length));

        let events = decoder
            .decode(&sse(
                "",
                r#"{"choices":[],"usage":{"prompt_tokens":4,"completion_tokens":2,"total_tokens":6}}"#,
            ))
            .unwrap();
        assert_eq!(
            events,
            vec![StreamEvent::Usage(Usage::new(Some(4), Some(2), Some(6)))]
        );

        assert_eq!(
            decoder.decode(&sse("", "[DONE]")).unwrap(),
            vec![StreamEvent::Done]
        );
    }

    #[test]
    fn test_decoder_tool_call_fragments() {
        let mut decoder = OpenAiStreamDecoder;
        let events = decoder
            .decode(&sse(
                "",
                r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"id":"call_1","type":"function","function":{"name":"get_weather","arguments":"{\"loc"}}]}}]}"#,
            ))
            .unwrap();

        match &events[0] {
            StreamEvent::Delta(delta) => {
                assert_eq!(delta.tool_calls.len(), 1);
                assert_eq!(delta.tool_calls[0].id.as_deref(), Some("call_1"));
                assert_eq!(delta.tool_calls[0].name.as_deref(), Some("get_weather"));
                assert_eq!(delta.tool_calls[0].arguments, "{\"loc");
            }
            other => panic!("Expected delta, got {:?}", other),
        }
    }

    #[test]
    fn test_decoder_rejects_garbage() {
        let err = OpenAiStreamDecoder.decode(&sse("", "{not json")).unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::TranslationFailure);
    }

    #[test]
    fn test_parse_embeddings_orders_by_index() {
        let request = EmbedRequest::new("text-embedding-3-small", vec!["a".into(), "b".into()]);
        let body = json!({
            "data": [
                {"index": 1, "embedding": [0.3, 0.4]},
                {"index": 0, "embedding": [0.1, 0.2]}
            ],
            "usage": {"prompt_tokens": 2, "total_tokens": 2}
        });

        let response = parse_embeddings(&body, &request).unwrap();
        assert_eq!(response.embeddings, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
        assert_eq!(response.usage.unwrap().input_tokens, Some(2));

        let body = json!({"data": [{"index": 0, "embedding": [0.1]}]});
        let err = parse_embeddings(&body, &request).unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::TranslationFailure);
    }

    #[test]
    fn test_parse_embeddings_rejects_bad_indices() {
        let request = EmbedRequest::new("text-embedding-3-small", vec!["a".into(), "b".into()]);

        for indices in [[0, 0], [0, 2], [1, 1]] {
            let body = json!({
                "data": [
                    {"index": indices[0], "embedding": [0.1]},
                    {"index": indices[1], "embedding": [0.2]}
                ]
            });
            let err = parse_embeddings(&body, &request).unwrap_err();
            assert_eq!(err.kind(), crate::errors::ErrorKind::TranslationFailure, "{:?}", indices);
        }
    }
}
