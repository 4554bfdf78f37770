use async_trait::async_trait;
use reqwest::{Client, Response};
use secrecy::ExposeSecret;
use serde_json::{json, Map, Value};
use std::collections::HashMap;

use super::base::{ChunkSink, Provider};
use super::configs::GoogleProviderConfig;
use super::openai_compat::build_http_client;
use super::streaming::{pump_stream, sse_events, ChunkAssembler, Event, StreamDecoder, StreamEvent};
use super::utils::{assemble_content, check_response, get_u32};
use crate::context::CallContext;
use crate::errors::{GatewayError, GatewayResult};
use crate::models::chat::{ChatRequest, ChatResponse, ChunkDelta, FinishReason, ToolCallDelta, Usage};
use crate::models::embedding::{EmbedRequest, EmbedResponse};
use crate::models::message::{ContentPart, ImageSource, Message, MessageContent, Role};
use crate::models::spec::{ModelSpec, ProviderFamily};
use crate::models::tool::Tool;

pub const GOOGLE_HOST: &str = "https://generativelanguage.googleapis.com";

/// Schema keywords the function declaration format accepts.
const ALLOWED_SCHEMA_KEYS: &[&str] = &[
    "type",
    "description",
    "properties",
    "required",
    "items",
    "enum",
    "format",
    "nullable",
];

pub fn default_models() -> Vec<ModelSpec> {
    vec![
        ModelSpec::chat("gemini-1.5-pro", ProviderFamily::Google).with_display_name("Gemini 1.5 Pro"),
        ModelSpec::chat("gemini-1.5-flash", ProviderFamily::Google)
            .with_display_name("Gemini 1.5 Flash"),
        ModelSpec::embedding("text-embedding-004", ProviderFamily::Google),
    ]
}

pub struct GoogleProvider {
    client: Client,
    config: GoogleProviderConfig,
}

impl GoogleProvider {
    pub fn new(config: GoogleProviderConfig) -> GatewayResult<Self> {
        config.endpoint.validate(ProviderFamily::Google)?;
        let client = build_http_client(&config.endpoint)?;

        Ok(Self { client, config })
    }

    async fn post(&self, ctx: &CallContext, path: &str, payload: &Value) -> GatewayResult<Response> {
        let url = self.config.endpoint.url(path);

        ctx.guard(async {
            let response = self
                .client
                .post(&url)
                .header("x-goog-api-key", self.config.endpoint.api_key.expose_secret())
                .json(payload)
                .send()
                .await?;
            check_response(response).await
        })
        .await
    }

    async fn post_json(&self, ctx: &CallContext, path: &str, payload: &Value) -> GatewayResult<Value> {
        let response = self.post(ctx, path, payload).await?;
        ctx.guard(async { Ok::<_, GatewayError>(response.json::<Value>().await?) })
            .await
    }
}

fn model_path(model: &str) -> String {
    format!("/v1beta/models/{}", model.trim_start_matches("models/"))
}

fn mime_type_from_url(url: &str) -> Option<&'static str> {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    match path.rsplit('.').next()? {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "heic" => Some("image/heic"),
        _ => None,
    }
}

fn image_part(source: ImageSource<'_>) -> GatewayResult<Value> {
    match source {
        ImageSource::Base64 { mime_type, data } => Ok(json!({
            "inlineData": { "mimeType": mime_type, "data": data }
        })),
        ImageSource::Url(url) => {
            let mime_type = mime_type_from_url(url).ok_or_else(|| {
                GatewayError::TranslationFailure(format!(
                    "cannot determine the image type of '{}'",
                    url
                ))
            })?;
            Ok(json!({
                "fileData": { "mimeType": mime_type, "fileUri": url }
            }))
        }
    }
}

/// Reduce a JSON schema to the keywords function declarations accept.
pub fn strip_schema(schema: &Value) -> Value {
    let Some(object) = schema.as_object() else {
        return schema.clone();
    };

    let mut stripped = Map::new();
    for (key, value) in object {
        if !ALLOWED_SCHEMA_KEYS.contains(&key.as_str()) {
            continue;
        }
        let value = match key.as_str() {
            "properties" => match value.as_object() {
                Some(properties) => Value::Object(
                    properties
                        .iter()
                        .map(|(name, property)| (name.clone(), strip_schema(property)))
                        .collect(),
                ),
                None => value.clone(),
            },
            "items" => strip_schema(value),
            _ => value.clone(),
        };
        stripped.insert(key.clone(), value);
    }
    Value::Object(stripped)
}

pub fn tools_to_google_spec(tools: &[Tool]) -> Value {
    let declarations: Vec<Value> = tools
        .iter()
        .map(|tool| {
            let mut declaration = json!({
                "name": tool.name,
                "description": tool.description,
            });
            if !tool.parameters.properties.is_empty() {
                declaration["parameters"] = strip_schema(&tool.parameters.to_json_schema());
            }
            declaration
        })
        .collect();
    json!([{ "functionDeclarations": declarations }])
}

/// Convert messages into `systemInstruction` parts and `contents`.
///
/// A tool result carries only the call id; the function name is recovered
/// from the assistant turn that issued the call.
pub fn messages_to_google_spec(messages: &[Message]) -> GatewayResult<(Vec<Value>, Vec<Value>)> {
    let mut call_names: HashMap<&str, &str> = HashMap::new();
    let mut system = Vec::new();
    let mut contents: Vec<Value> = Vec::new();

    for message in messages {
        let mut parts = Vec::new();
        match &message.content {
            MessageContent::Text(text) if message.role == Role::Tool => {
                return Err(GatewayError::TranslationFailure(format!(
                    "tool message without tool_result parts: {}",
                    text
                )))
            }
            MessageContent::Text(text) => parts.push(json!({ "text": text })),
            MessageContent::Parts(items) => {
                for part in items {
                    parts.push(match part {
                        ContentPart::Text { text } => json!({ "text": text }),
                        ContentPart::Image(image) => image_part(image.source()?)?,
                        ContentPart::ToolCall {
                            id,
                            name,
                            arguments,
                        } => {
                            call_names.insert(id.as_str(), name.as_str());
                            json!({ "functionCall": { "name": name, "args": arguments } })
                        }
                        ContentPart::ToolResult {
                            tool_call_id,
                            content,
                            ..
                        } => {
                            let name = call_names.get(tool_call_id.as_str()).ok_or_else(|| {
                                GatewayError::TranslationFailure(format!(
                                    "tool result '{}' does not match any earlier tool call",
                                    tool_call_id
                                ))
                            })?;
                            json!({
                                "functionResponse": {
                                    "name": name,
                                    "response": { "content": content }
                                }
                            })
                        }
                    });
                }
            }
        }

        let role = match message.role {
            Role::System => {
                system.extend(parts);
                continue;
            }
            Role::User | Role::Tool => "user",
            Role::Assistant => "model",
        };

        match contents.last_mut() {
            Some(last) if last["role"] == role => {
                if let Some(existing) = last["parts"].as_array_mut() {
                    existing.extend(parts);
                }
            }
            _ => contents.push(json!({ "role": role, "parts": parts })),
        }
    }

    Ok((system, contents))
}

fn build_payload(request: &ChatRequest) -> GatewayResult<Value> {
    let (system, contents) = messages_to_google_spec(&request.messages)?;
    let mut payload = json!({ "contents": contents });

    if !system.is_empty() {
        payload["systemInstruction"] = json!({ "parts": system });
    }

    let params = &request.params;
    let mut generation = Map::new();
    if let Some(temperature) = params.temperature {
        generation.insert("temperature".into(), json!(temperature));
    }
    if let Some(max_tokens) = params.max_tokens {
        generation.insert("maxOutputTokens".into(), json!(max_tokens));
    }
    if let Some(top_p) = params.top_p {
        generation.insert("topP".into(), json!(top_p));
    }
    if !params.stop.is_empty() {
        generation.insert("stopSequences".into(), json!(params.stop));
    }
    if !generation.is_empty() {
        payload["generationConfig"] = Value::Object(generation);
    }
    if !params.tools.is_empty() {
        payload["tools"] = tools_to_google_spec(&params.tools);
    }
    Ok(payload)
}

fn finish_reason(reason: &str, has_tool_calls: bool) -> FinishReason {
    match reason {
        "STOP" if has_tool_calls => FinishReason::ToolCalls,
        "STOP" => FinishReason::Stop,
        "MAX_TOKENS" => FinishReason::Length,
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" => {
            FinishReason::ContentFilter
        }
        _ => FinishReason::Other,
    }
}

fn get_usage(data: &Value) -> Option<Usage> {
    let usage = data.get("usageMetadata").filter(|usage| usage.is_object())?;
    let count = |key: &str| get_u32(usage, key);
    Some(Usage::new(
        count("promptTokenCount"),
        count("candidatesTokenCount"),
        count("totalTokenCount"),
    ))
}

fn response_to_chat_response(response: &Value, request: &ChatRequest) -> GatewayResult<ChatResponse> {
    let Some(candidate) = response["candidates"].get(0) else {
        if response["promptFeedback"]["blockReason"].is_string() {
            return Ok(ChatResponse {
                id: request.request_id().to_string(),
                model: request.model.clone(),
                message: Message::assistant(""),
                finish_reason: FinishReason::ContentFilter,
                usage: get_usage(response),
                created: chrono::Utc::now().timestamp(),
            });
        }
        return Err(GatewayError::TranslationFailure(
            "response has no candidates".into(),
        ));
    };

    let mut text = String::new();
    let mut parts = Vec::new();
    if let Some(items) = candidate["content"]["parts"].as_array() {
        for part in items {
            if let Some(fragment) = part["text"].as_str() {
                text.push_str(fragment);
            } else if let Some(call) = part.get("functionCall") {
                parts.push(ContentPart::tool_call(
                    format!("call_{}", parts.len()),
                    call["name"].as_str().unwrap_or_default(),
                    call.get("args").cloned().unwrap_or_else(|| json!({})),
                ));
            }
        }
    }

    let has_tool_calls = !parts.is_empty();
    Ok(ChatResponse {
        id: request.request_id().to_string(),
        model: response["modelVersion"]
            .as_str()
            .unwrap_or(&request.model)
            .to_string(),
        message: Message::new(Role::Assistant, assemble_content(text, parts)),
        finish_reason: candidate["finishReason"]
            .as_str()
            .map_or(FinishReason::Stop, |reason| finish_reason(reason, has_tool_calls)),
        usage: get_usage(response),
        created: chrono::Utc::now().timestamp(),
    })
}

/// Each event is a complete partial response; the stream simply ends after the
/// candidate reports a finish reason.
#[derive(Default)]
pub struct GoogleStreamDecoder {
    tool_calls: u32,
}

impl StreamDecoder for GoogleStreamDecoder {
    fn decode(&mut self, event: &Event) -> GatewayResult<Vec<StreamEvent>> {
        let data: Value = serde_json::from_str(&event.data)
            .map_err(|e| GatewayError::TranslationFailure(format!("invalid stream chunk: {}", e)))?;

        let mut events = Vec::new();
        if let Some(candidate) = data["candidates"].get(0) {
            let mut delta = ChunkDelta::default();
            if let Some(parts) = candidate["content"]["parts"].as_array() {
                for part in parts {
                    if let Some(text) = part["text"].as_str() {
                        delta.append(ChunkDelta::text(text));
                    } else if let Some(call) = part.get("functionCall") {
                        let index = self.tool_calls;
                        self.tool_calls += 1;
                        delta.tool_calls.push(ToolCallDelta {
                            index,
                            id: Some(format!("call_{}", index)),
                            name: call["name"].as_str().map(str::to_string),
                            arguments: call.get("args").map(Value::to_string).unwrap_or_default(),
                        });
                    }
                }
            }
            events.push(StreamEvent::Delta(delta));

            if let Some(reason) = candidate["finishReason"].as_str() {
                events.push(StreamEvent::Finish(finish_reason(reason, self.tool_calls > 0)));
            }
        } else if data["promptFeedback"]["blockReason"].is_string() {
            events.push(StreamEvent::Finish(FinishReason::ContentFilter));
        }

        if let Some(usage) = get_usage(&data) {
            events.push(StreamEvent::Usage(usage));
        }
        Ok(events)
    }
}

#[async_trait]
impl Provider for GoogleProvider {
    fn family(&self) -> ProviderFamily {
        ProviderFamily::Google
    }

    fn list_models(&self) -> Vec<ModelSpec> {
        self.config.models.clone()
    }

    async fn chat(&self, ctx: &CallContext, request: &ChatRequest) -> GatewayResult<ChatResponse> {
        let payload = build_payload(request)?;
        let path = format!("{}:generateContent", model_path(&request.model));
        let body = self.post_json(ctx, &path, &payload).await?;
        response_to_chat_response(&body, request)
    }

    async fn chat_stream(
        &self,
        ctx: &CallContext,
        request: &ChatRequest,
        sink: &mut dyn ChunkSink,
    ) -> GatewayResult<()> {
        let payload = build_payload(request)?;
        let path = format!("{}:streamGenerateContent?alt=sse", model_path(&request.model));
        let response = self.post(ctx, &path, &payload).await?;

        pump_stream(
            ctx,
            sse_events(response),
            GoogleStreamDecoder::default(),
            ChunkAssembler::new(request.request_id(), &request.model),
            sink,
        )
        .await
    }

    async fn embed(&self, ctx: &CallContext, request: &EmbedRequest) -> GatewayResult<EmbedResponse> {
        let model = format!("models/{}", request.model.trim_start_matches("models/"));
        let requests: Vec<Value> = request
            .contents
            .iter()
            .map(|content| {
                json!({
                    "model": model,
                    "content": { "parts": [{ "text": content }] }
                })
            })
            .collect();

        let path = format!("{}:batchEmbedContents", model_path(&request.model));
        let body = self
            .post_json(ctx, &path, &json!({ "requests": requests }))
            .await?;

        let embeddings = body["embeddings"]
            .as_array()
            .ok_or_else(|| GatewayError::TranslationFailure("embedding response has no embeddings".into()))?
            .iter()
            .map(|embedding| {
                serde_json::from_value::<Vec<f32>>(embedding["values"].clone()).map_err(|e| {
                    GatewayError::TranslationFailure(format!("invalid embedding vector: {}", e))
                })
            })
            .collect::<GatewayResult<Vec<_>>>()?;

        EmbedResponse {
            id: request.request_id().to_string(),
            model: request.model.clone(),
            embeddings,
            usage: None,
        }
        .ensure_aligned(request.contents.len())
    }
}
