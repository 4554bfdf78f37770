use async_trait::async_trait;
use reqwest::{Client, Response};
use secrecy::ExposeSecret;
use serde_json::{json, Value};
use std::collections::HashSet;

use super::base::{ChunkSink, Provider};
use super::configs::AnthropicProviderConfig;
use super::openai_compat::build_http_client;
use super::streaming::{pump_stream, sse_events, ChunkAssembler, Event, StreamDecoder, StreamEvent};
use super::utils::{assemble_content, check_response, collapse_content, collapse_value, get_u32};
use crate::context::CallContext;
use crate::errors::{GatewayError, GatewayResult, RejectReason};
use crate::models::chat::{ChatRequest, ChatResponse, ChunkDelta, FinishReason, ToolCallDelta, Usage};
use crate::models::message::{ContentPart, ImageSource, Message, MessageContent, Role};
use crate::models::spec::{ModelSpec, ProviderFamily};
use crate::models::tool::Tool;

pub const ANTHROPIC_HOST: &str = "https://api.anthropic.com";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

pub fn default_models() -> Vec<ModelSpec> {
    vec![
        ModelSpec::chat("claude-3-5-sonnet-latest", ProviderFamily::Anthropic)
            .with_display_name("Claude 3.5 Sonnet"),
        ModelSpec::chat("claude-3-5-haiku-latest", ProviderFamily::Anthropic)
            .with_display_name("Claude 3.5 Haiku"),
    ]
}

pub struct AnthropicProvider {
    client: Client,
    config: AnthropicProviderConfig,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicProviderConfig) -> GatewayResult<Self> {
        config.endpoint.validate(ProviderFamily::Anthropic)?;
        let client = build_http_client(&config.endpoint)?;

        Ok(Self { client, config })
    }

    fn get_usage(data: &Value) -> Option<Usage> {
        let usage = data.get("usage").filter(|usage| usage.is_object())?;
        let count = |key: &str| get_u32(usage, key);
        Some(Usage::new(count("input_tokens"), count("output_tokens"), None))
    }

    fn build_payload(&self, request: &ChatRequest, stream: bool) -> GatewayResult<Value> {
        let (system, messages) = messages_to_anthropic_spec(&request.messages)?;

        let mut payload = json!({
            "model": request.model,
            "messages": messages,
            "max_tokens": request.params.max_tokens.unwrap_or(self.config.default_max_tokens),
        });

        if !system.is_empty() {
            let mut system = Value::Array(system);
            if self.config.collapse.system {
                collapse_value(&mut system);
            }
            payload["system"] = system;
        }

        let params = &request.params;
        if let Some(temperature) = params.temperature {
            payload["temperature"] = json!(temperature);
        }
        if let Some(top_p) = params.top_p {
            payload["top_p"] = json!(top_p);
        }
        if !params.stop.is_empty() {
            payload["stop_sequences"] = json!(params.stop);
        }
        if !params.tools.is_empty() {
            payload["tools"] = json!(tools_to_anthropic_spec(&params.tools)?);
        }
        if stream {
            payload["stream"] = json!(true);
        }

        collapse_content(&mut payload, &self.config.collapse);
        if self.config.collapse.tool {
            collapse_tool_results(&mut payload);
        }
        Ok(payload)
    }

    async fn post(&self, ctx: &CallContext, payload: &Value) -> GatewayResult<Response> {
        let url = self.config.endpoint.url("/v1/messages");

        ctx.guard(async {
            let response = self
                .client
                .post(&url)
                .header("x-api-key", self.config.endpoint.api_key.expose_secret())
                .header("anthropic-version", &self.config.version)
                .json(payload)
                .send()
                .await?;
            check_response(response).await
        })
        .await
    }
}

/// Tool results ride inside user turns here, so the `tool` flag applies to the
/// `content` of each `tool_result` block rather than to a whole message.
fn collapse_tool_results(payload: &mut Value) {
    let Some(turns) = payload.get_mut("messages").and_then(Value::as_array_mut) else {
        return;
    };

    let blocks = turns
        .iter_mut()
        .filter_map(|turn| turn.get_mut("content").and_then(Value::as_array_mut))
        .flatten()
        .filter(|block| block.get("type").and_then(Value::as_str) == Some("tool_result"));
    for block in blocks {
        if let Some(content) = block.get_mut("content") {
            collapse_value(content);
        }
    }
}

fn image_block(source: ImageSource<'_>) -> Value {
    match source {
        ImageSource::Url(url) => json!({
            "type": "image",
            "source": { "type": "url", "url": url }
        }),
        ImageSource::Base64 { mime_type, data } => json!({
            "type": "image",
            "source": { "type": "base64", "media_type": mime_type, "data": data }
        }),
    }
}

fn content_blocks(message: &Message) -> GatewayResult<Vec<Value>> {
    let parts = match &message.content {
        MessageContent::Text(text) if message.role == Role::Tool => {
            return Err(GatewayError::TranslationFailure(format!(
                "tool message without tool_result parts: {}",
                text
            )))
        }
        MessageContent::Text(text) => return Ok(vec![json!({ "type": "text", "text": text })]),
        MessageContent::Parts(parts) => parts,
    };

    let mut blocks = Vec::with_capacity(parts.len());
    for part in parts {
        let block = match part {
            ContentPart::Text { text } => json!({ "type": "text", "text": text }),
            ContentPart::Image(image) => image_block(image.source()?),
            ContentPart::ToolCall {
                id,
                name,
                arguments,
            } => {
                if message.role != Role::Assistant {
                    return Err(GatewayError::TranslationFailure(
                        "only assistant messages may contain tool calls".into(),
                    ));
                }
                if !arguments.is_object() {
                    return Err(GatewayError::TranslationFailure(format!(
                        "arguments of tool call '{}' must be a JSON object",
                        name
                    )));
                }
                json!({ "type": "tool_use", "id": id, "name": name, "input": arguments })
            }
            ContentPart::ToolResult {
                tool_call_id,
                content,
                is_error,
            } => {
                let mut block = json!({
                    "type": "tool_result",
                    "tool_use_id": tool_call_id,
                    "content": [{ "type": "text", "text": content }],
                });
                if *is_error {
                    block["is_error"] = json!(true);
                }
                block
            }
        };
        blocks.push(block);
    }
    Ok(blocks)
}

/// Split normalized messages into the top-level system blocks and the turn list.
///
/// Tool results travel in user turns, and consecutive turns with the same wire
/// role are merged because the API requires alternation.
pub fn messages_to_anthropic_spec(messages: &[Message]) -> GatewayResult<(Vec<Value>, Vec<Value>)> {
    let mut system = Vec::new();
    let mut turns: Vec<Value> = Vec::new();

    for message in messages {
        let blocks = content_blocks(message)?;
        let role = match message.role {
            Role::System => {
                system.extend(blocks);
                continue;
            }
            Role::User | Role::Tool => "user",
            Role::Assistant => "assistant",
        };

        match turns.last_mut() {
            Some(last) if last["role"] == role => {
                if let Some(content) = last["content"].as_array_mut() {
                    content.extend(blocks);
                }
            }
            _ => turns.push(json!({ "role": role, "content": blocks })),
        }
    }

    if turns.is_empty() {
        return Err(GatewayError::TranslationFailure(
            "anthropic requires at least one user or assistant message".into(),
        ));
    }
    Ok((system, turns))
}

pub fn tools_to_anthropic_spec(tools: &[Tool]) -> GatewayResult<Vec<Value>> {
    let mut names = HashSet::new();
    tools
        .iter()
        .map(|tool| {
            if !names.insert(tool.name.as_str()) {
                return Err(GatewayError::TranslationFailure(format!(
                    "Duplicate tool name: {}",
                    tool.name
                )));
            }
            Ok(json!({
                "name": tool.name,
                "description": tool.description,
                "input_schema": tool.parameters.to_json_schema(),
            }))
        })
        .collect()
}

fn stop_reason(reason: &str) -> FinishReason {
    match reason {
        "end_turn" | "stop_sequence" => FinishReason::Stop,
        "max_tokens" => FinishReason::Length,
        "tool_use" => FinishReason::ToolCalls,
        "refusal" => FinishReason::ContentFilter,
        _ => FinishReason::Other,
    }
}

fn response_to_chat_response(
    response: &Value,
    request: &ChatRequest,
) -> GatewayResult<ChatResponse> {
    let blocks = response
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            GatewayError::TranslationFailure("Invalid response format from Anthropic API".into())
        })?;

    let mut text = String::new();
    let mut parts = Vec::new();
    for block in blocks {
        match block["type"].as_str() {
            Some("text") => text.push_str(block["text"].as_str().unwrap_or_default()),
            Some("tool_use") => parts.push(ContentPart::tool_call(
                block["id"].as_str().unwrap_or_default(),
                block["name"].as_str().unwrap_or_default(),
                block["input"].clone(),
            )),
            _ => {}
        }
    }

    Ok(ChatResponse {
        id: request.request_id().to_string(),
        model: response["model"]
            .as_str()
            .unwrap_or(&request.model)
            .to_string(),
        message: Message::new(Role::Assistant, assemble_content(text, parts)),
        finish_reason: response["stop_reason"]
            .as_str()
            .map(stop_reason)
            .unwrap_or(FinishReason::Stop),
        usage: AnthropicProvider::get_usage(response),
        created: chrono::Utc::now().timestamp(),
    })
}

fn stream_error(error: &Value) -> GatewayError {
    let message = error["message"].as_str().unwrap_or("stream error");
    match error["type"].as_str() {
        Some("overloaded_error") | Some("api_error") => {
            GatewayError::UpstreamTransport(format!("anthropic: {}", message))
        }
        Some("rate_limit_error") => GatewayError::rejected(RejectReason::RateLimited, None, message),
        Some("authentication_error") | Some("permission_error") => {
            GatewayError::rejected(RejectReason::Auth, None, message)
        }
        Some("invalid_request_error") => {
            GatewayError::rejected(RejectReason::InvalidRequest, None, message)
        }
        _ => GatewayError::rejected(RejectReason::Other, None, message),
    }
}

/// Decoder for the Messages API event stream.
#[derive(Default)]
pub struct AnthropicStreamDecoder;

impl StreamDecoder for AnthropicStreamDecoder {
    fn decode(&mut self, event: &Event) -> GatewayResult<Vec<StreamEvent>> {
        let data: Value = serde_json::from_str(&event.data)
            .map_err(|e| GatewayError::TranslationFailure(format!("invalid stream event: {}", e)))?;
        let kind = match event.event.as_str() {
            "" | "message" => data["type"].as_str().unwrap_or_default(),
            named => named,
        };

        let index = get_u32(&data, "index").unwrap_or_default();
        let events = match kind {
            "message_start" => AnthropicProvider::get_usage(&data["message"])
                .map(StreamEvent::Usage)
                .into_iter()
                .collect(),
            "content_block_start" => {
                let block = &data["content_block"];
                match block["type"].as_str() {
                    Some("tool_use") => vec![StreamEvent::Delta(ChunkDelta {
                        text: None,
                        tool_calls: vec![ToolCallDelta {
                            index,
                            id: block["id"].as_str().map(str::to_string),
                            name: block["name"].as_str().map(str::to_string),
                            arguments: String::new(),
                        }],
                    })],
                    Some("text") => match block["text"].as_str() {
                        Some(text) if !text.is_empty() => {
                            vec![StreamEvent::Delta(ChunkDelta::text(text))]
                        }
                        _ => vec![],
                    },
                    _ => vec![],
                }
            }
            "content_block_delta" => {
                let delta = &data["delta"];
                match delta["type"].as_str() {
                    Some("text_delta") => vec![StreamEvent::Delta(ChunkDelta::text(
                        delta["text"].as_str().unwrap_or_default(),
                    ))],
                    Some("input_json_delta") => vec![StreamEvent::Delta(ChunkDelta {
                        text: None,
                        tool_calls: vec![ToolCallDelta {
                            index,
                            arguments: delta["partial_json"].as_str().unwrap_or_default().to_string(),
                            ..Default::default()
                        }],
                    })],
                    _ => vec![],
                }
            }
            "message_delta" => {
                let mut events = Vec::new();
                if let Some(reason) = data["delta"]["stop_reason"].as_str() {
                    events.push(StreamEvent::Finish(stop_reason(reason)));
                }
                if let Some(usage) = AnthropicProvider::get_usage(&data) {
                    events.push(StreamEvent::Usage(usage));
                }
                events
            }
            "message_stop" => vec![StreamEvent::Done],
            "error" => return Err(stream_error(&data["error"])),
            _ => vec![],
        };
        Ok(events)
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn family(&self) -> ProviderFamily {
        ProviderFamily::Anthropic
    }

    fn list_models(&self) -> Vec<ModelSpec> {
        self.config.models.clone()
    }

    async fn chat(&self, ctx: &CallContext, request: &ChatRequest) -> GatewayResult<ChatResponse> {
        let payload = self.build_payload(request, false)?;
        let response = self.post(ctx, &payload).await?;
        let body = ctx
            .guard(async { Ok::<_, GatewayError>(response.json::<Value>().await?) })
            .await?;
        response_to_chat_response(&body, request)
    }

    async fn chat_stream(
        &self,
        ctx: &CallContext,
        request: &ChatRequest,
        sink: &mut dyn ChunkSink,
    ) -> GatewayResult<()> {
        let payload = self.build_payload(request, true)?;
        let response = self.post(ctx, &payload).await?;

        pump_stream(
            ctx,
            sse_events(response),
            AnthropicStreamDecoder,
            ChunkAssembler::new(request.request_id(), &request.model),
            sink,
        )
        .await
    }
}
