use lazy_static::lazy_static;
use regex::Regex;
use reqwest::{Response, StatusCode};
use serde_json::{json, Map, Value};

use super::configs::ContentCollapse;
use crate::errors::{redact, GatewayError, GatewayResult, RejectReason};
use crate::models::chat::{ChatResponse, FinishReason, Usage};
use crate::models::message::{ContentPart, ImageSource, Message, MessageContent, Role};
use crate::models::spec::ProviderFamily;
use crate::models::tool::Tool;

lazy_static! {
    static ref INVALID_NAME_CHARS: Regex = Regex::new(r"[^a-zA-Z0-9_-]").unwrap();
    static ref VALID_NAME: Regex = Regex::new(r"^[a-zA-Z0-9_-]+$").unwrap();
}

/// What an OpenAI-compatible endpoint accepts beyond the common subset.
#[derive(Debug, Clone, Copy)]
pub struct OpenAiDialect {
    pub family: ProviderFamily,
    pub tool_role: bool,
    pub images: bool,
}

fn openai_role(role: Role, dialect: &OpenAiDialect) -> GatewayResult<&'static str> {
    match role {
        Role::System => Ok("system"),
        Role::User => Ok("user"),
        Role::Assistant => Ok("assistant"),
        Role::Tool if dialect.tool_role => Ok("tool"),
        Role::Tool => Err(GatewayError::unsupported_role(
            dialect.family.to_string(),
            role.as_ref(),
        )),
    }
}

/// Convert an image into an OpenAI `image_url` content part
pub fn convert_image(source: ImageSource<'_>) -> Value {
    let url = match source {
        ImageSource::Url(url) => url.to_string(),
        ImageSource::Base64 { mime_type, data } => format!("data:{};base64,{}", mime_type, data),
    };
    json!({
        "type": "image_url",
        "image_url": { "url": url }
    })
}

/// Convert normalized messages to the OpenAI chat message specification.
///
/// Structured content is always emitted as an array of typed parts; the
/// per-role rewrite to bare strings happens afterwards on the serialized
/// payload, see [`collapse_content`].
pub fn messages_to_openai_spec(
    messages: &[Message],
    dialect: &OpenAiDialect,
) -> GatewayResult<Vec<Value>> {
    let mut messages_spec = Vec::with_capacity(messages.len());

    for message in messages {
        let role = openai_role(message.role, dialect)?;

        let parts = match &message.content {
            MessageContent::Text(text) if message.role != Role::Tool => {
                let mut converted = json!({ "role": role, "content": text });
                if let Some(name) = &message.name {
                    converted["name"] = json!(name);
                }
                messages_spec.push(converted);
                continue;
            }
            MessageContent::Text(_) => {
                return Err(GatewayError::TranslationFailure(
                    "tool messages must carry tool_result parts".into(),
                ))
            }
            MessageContent::Parts(parts) => parts,
        };

        if message.role == Role::Tool {
            for part in parts {
                match part {
                    ContentPart::ToolResult {
                        tool_call_id,
                        content,
                        ..
                    } => messages_spec.push(json!({
                        "role": role,
                        "tool_call_id": tool_call_id,
                        "content": [{ "type": "text", "text": content }],
                    })),
                    _ => {
                        return Err(GatewayError::TranslationFailure(
                            "tool messages may only contain tool_result parts".into(),
                        ))
                    }
                }
            }
            continue;
        }

        let mut content = Vec::new();
        let mut tool_calls = Vec::new();
        for part in parts {
            match part {
                ContentPart::Text { text } => content.push(json!({ "type": "text", "text": text })),
                ContentPart::Image(image) => {
                    if !dialect.images {
                        return Err(GatewayError::TranslationFailure(format!(
                            "{} does not accept image content",
                            dialect.family
                        )));
                    }
                    content.push(convert_image(image.source()?));
                }
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
                    tool_calls.push(json!({
                        "id": id,
                        "type": "function",
                        "function": {
                            "name": sanitize_function_name(name),
                            "arguments": arguments.to_string(),
                        }
                    }));
                }
                ContentPart::ToolResult { .. } => {
                    return Err(GatewayError::TranslationFailure(
                        "tool results must be sent with the tool role".into(),
                    ))
                }
            }
        }

        let mut converted = json!({ "role": role });
        if !content.is_empty() || tool_calls.is_empty() {
            converted["content"] = Value::Array(content);
        }
        if !tool_calls.is_empty() {
            converted["tool_calls"] = Value::Array(tool_calls);
        }
        if let Some(name) = &message.name {
            converted["name"] = json!(name);
        }
        messages_spec.push(converted);
    }

    Ok(messages_spec)
}

/// Convert tools to the OpenAI function tool specification.
///
/// The parameters schema passes through as-is, including keywords the
/// normalized schema has no field for.
pub fn tools_to_openai_spec(tools: &[Tool]) -> GatewayResult<Vec<Value>> {
    let mut tool_names = std::collections::HashSet::new();
    let mut result = Vec::new();

    for tool in tools {
        if !tool_names.insert(&tool.name) {
            return Err(GatewayError::TranslationFailure(format!(
                "Duplicate tool name: {}",
                tool.name
            )));
        }

        result.push(json!({
            "type": "function",
            "function": {
                "name": sanitize_function_name(&tool.name),
                "description": tool.description,
                "parameters": tool.parameters.to_json_schema(),
            }
        }));
    }

    Ok(result)
}

/// Rewrite `[{"type": "text", "text": s}]` to `s`; any other shape is left alone.
pub fn collapse_value(content: &mut Value) -> bool {
    let text = match content.as_array().map(Vec::as_slice) {
        Some([only]) if only.get("type").and_then(Value::as_str) == Some("text") => {
            match only.get("text").and_then(Value::as_str) {
                Some(text) => text.to_string(),
                None => return false,
            }
        }
        _ => return false,
    };
    *content = Value::String(text);
    true
}

/// Collapse single-part text content in an already serialized payload's
/// `messages`, for each role whose flag is set.
pub fn collapse_content(payload: &mut Value, collapse: &ContentCollapse) {
    let Some(messages) = payload.get_mut("messages").and_then(Value::as_array_mut) else {
        return;
    };

    for message in messages {
        let enabled = message
            .get("role")
            .and_then(Value::as_str)
            .map_or(false, |role| collapse.for_wire_role(role));
        if enabled {
            if let Some(content) = message.get_mut("content") {
                collapse_value(content);
            }
        }
    }
}

pub fn openai_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "stop" => FinishReason::Stop,
        "length" => FinishReason::Length,
        "tool_calls" | "function_call" => FinishReason::ToolCalls,
        "content_filter" => FinishReason::ContentFilter,
        _ => FinishReason::Other,
    }
}

/// Read a non-negative integer field, clamping values beyond `u32::MAX`.
pub fn get_u32(data: &Value, key: &str) -> Option<u32> {
    data.get(key)
        .and_then(Value::as_u64)
        .map(|value| u32::try_from(value).unwrap_or(u32::MAX))
}

pub fn get_openai_usage(data: &Value) -> Option<Usage> {
    let usage = data.get("usage").filter(|usage| usage.is_object())?;

    let count = |key: &str| get_u32(usage, key);
    Some(Usage::new(
        count("prompt_tokens"),
        count("completion_tokens"),
        count("total_tokens"),
    ))
}

/// Parse tool call arguments; text that is not JSON is kept as a string.
pub fn parse_arguments(arguments: &str) -> Value {
    if arguments.trim().is_empty() {
        return Value::Object(Map::new());
    }
    serde_json::from_str(arguments).unwrap_or_else(|_| Value::String(arguments.to_string()))
}

/// Build message content from text and parts, preferring a bare string when possible.
pub fn assemble_content(text: String, mut parts: Vec<ContentPart>) -> MessageContent {
    if parts.is_empty() {
        return MessageContent::Text(text);
    }
    if !text.is_empty() {
        parts.insert(0, ContentPart::text(text));
    }
    MessageContent::Parts(parts)
}

/// Convert an OpenAI chat completion into the normalized response
pub fn openai_response_to_chat_response(
    response: &Value,
    request_id: &str,
    model: &str,
) -> GatewayResult<ChatResponse> {
    let choice = response
        .get("choices")
        .and_then(|choices| choices.get(0))
        .ok_or_else(|| GatewayError::TranslationFailure("response has no choices".into()))?;
    let original = &choice["message"];

    let text = original
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let mut parts = Vec::new();
    if let Some(tool_calls) = original.get("tool_calls").and_then(Value::as_array) {
        for tool_call in tool_calls {
            let id = tool_call["id"].as_str().unwrap_or_default();
            let name = tool_call["function"]["name"].as_str().unwrap_or_default();
            let arguments = tool_call["function"]["arguments"]
                .as_str()
                .unwrap_or_default();

            if !is_valid_function_name(name) {
                return Err(GatewayError::TranslationFailure(format!(
                    "The provided function name '{}' had invalid characters, it must match this regex [a-zA-Z0-9_-]+",
                    name
                )));
            }
            parts.push(ContentPart::tool_call(id, name, parse_arguments(arguments)));
        }
    }

    let finish_reason = choice
        .get("finish_reason")
        .and_then(Value::as_str)
        .map(openai_finish_reason)
        .unwrap_or(FinishReason::Stop);

    Ok(ChatResponse {
        id: request_id.to_string(),
        model: response
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or(model)
            .to_string(),
        message: Message::new(Role::Assistant, assemble_content(text, parts)),
        finish_reason,
        usage: get_openai_usage(response),
        created: chrono::Utc::now().timestamp(),
    })
}

pub fn sanitize_function_name(name: &str) -> String {
    INVALID_NAME_CHARS.replace_all(name, "_").to_string()
}

pub fn is_valid_function_name(name: &str) -> bool {
    VALID_NAME.is_match(name)
}

/// Pull a human-readable message out of a provider error body.
pub fn error_message_from_body(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let error = value.get("error").unwrap_or(&value);
    error
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| error.as_str())
        .map(str::to_string)
}

/// Map a non-success upstream status to a normalized error.
pub fn classify_status(status: StatusCode, body: &str) -> GatewayError {
    let message = error_message_from_body(body).unwrap_or_else(|| {
        if body.trim().is_empty() {
            status.canonical_reason().unwrap_or("unknown error").to_string()
        } else {
            body.chars().take(512).collect()
        }
    });
    let code = Some(status.as_u16());

    match status.as_u16() {
        401 | 403 => GatewayError::rejected(RejectReason::Auth, code, message),
        429 => GatewayError::rejected(RejectReason::RateLimited, code, message),
        400 | 404 | 409 | 413 | 422 => {
            GatewayError::rejected(RejectReason::InvalidRequest, code, message)
        }
        408 | 502 | 503 | 504 | 529 => {
            GatewayError::UpstreamTransport(redact(&format!("{}: {}", status, message)))
        }
        _ => GatewayError::rejected(RejectReason::Other, code, message),
    }
}

/// Pass a successful response through; classify anything else.
pub async fn check_response(response: Response) -> GatewayResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, &body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::models::tool::{ParameterProperty, ToolParameters};

    const OPENAI_TOOL_USE_RESPONSE: &str = r#"{
        "id": "chatcmpl-1",
        "model": "gpt-4o-2024-08-06",
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "1",
                    "type": "function",
                    "function": {
                        "name": "example_fn",
                        "arguments": "{\"param\": \"value\"}"
                    }
                }]
            },
            "finish_reason": "tool_calls"
        }],
        "usage": {
            "prompt_tokens": 10,
            "completion_tokens": 25,
            "total_tokens": 35
        }
    }"#;

    fn dialect() -> OpenAiDialect {
        OpenAiDialect {
            family: ProviderFamily::OpenAi,
            tool_role: true,
            images: true,
        }
    }

    fn weather_tool(name: &str) -> Tool {
        Tool::new(
            name,
            "Gets the current weather for a location",
            ToolParameters::default().with_property(
                "location",
                ParameterProperty::new("string", "The city and state, e.g. New York, NY"),
                true,
            ),
        )
    }

    #[test]
    fn test_usage_counts_clamp_to_u32() {
        let usage = get_openai_usage(&json!({
            "usage": {"prompt_tokens": 5_000_000_000u64, "completion_tokens": 7}
        }))
        .unwrap();
        assert_eq!(usage.input_tokens, Some(u32::MAX));
        assert_eq!(usage.output_tokens, Some(7));
        assert_eq!(usage.total_tokens, Some(u32::MAX));

        assert_eq!(get_u32(&json!({"index": -1}), "index"), None);
    }

    #[test]
    fn test_messages_to_openai_spec() -> GatewayResult<()> {
        let spec = messages_to_openai_spec(&[Message::user("Hello")], &dialect())?;

        assert_eq!(spec.len(), 1);
        assert_eq!(spec[0]["role"], "user");
        assert_eq!(spec[0]["content"], "Hello");
        Ok(())
    }

    #[test]
    fn test_messages_to_openai_spec_complex() -> GatewayResult<()> {
        let messages = vec![
            Message::system("Be brief."),
            Message::user(vec![
                ContentPart::text("What is in this image?"),
                ContentPart::Image(crate::models::message::ImageContent::from_base64(
                    "AAAA",
                    "image/png",
                )),
            ]),
            Message::assistant(vec![ContentPart::tool_call(
                "call_1",
                "look up",
                json!({"q": "cat"}),
            )]),
            Message::tool_result("call_1", "A cat."),
        ];

        let spec = messages_to_openai_spec(&messages, &dialect())?;

        assert_eq!(spec.len(), 4);
        assert_eq!(spec[0]["content"], "Be brief.");
        assert_eq!(spec[1]["content"][1]["type"], "image_url");
        assert_eq!(
            spec[1]["content"][1]["image_url"]["url"],
            "data:image/png;base64,AAAA"
        );
        assert!(spec[2].get("content").is_none());
        assert_eq!(spec[2]["tool_calls"][0]["function"]["name"], "look_up");
        assert_eq!(
            spec[2]["tool_calls"][0]["function"]["arguments"],
            "{\"q\":\"cat\"}"
        );
        assert_eq!(spec[3]["role"], "tool");
        assert_eq!(spec[3]["tool_call_id"], "call_1");
        assert_eq!(spec[3]["content"], json!([{"type": "text", "text": "A cat."}]));
        Ok(())
    }

    #[test]
    fn test_tool_role_rejected_when_unsupported() {
        let dialect = OpenAiDialect {
            family: ProviderFamily::Internal,
            tool_role: false,
            images: true,
        };
        let err = messages_to_openai_spec(&[Message::tool_result("1", "ok")], &dialect).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedRole);
        assert_eq!(err.to_string(), "internal cannot represent role 'tool'");
    }

    #[test]
    fn test_images_rejected_when_unsupported() {
        let dialect = OpenAiDialect {
            family: ProviderFamily::DeepSeek,
            tool_role: true,
            images: false,
        };
        let message = Message::user(vec![ContentPart::image_url("https://example.com/a.png")]);
        let err = messages_to_openai_spec(&[message], &dialect).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TranslationFailure);
    }

    #[test]
    fn test_collapse_single_text_part_per_role() {
        let messages = vec![
            Message::system(vec![ContentPart::text("sys")]),
            Message::user(vec![ContentPart::text("hello")]),
            Message::user(vec![
                ContentPart::text("look"),
                ContentPart::image_url("https://example.com/a.png"),
            ]),
            Message::tool_result("call_1", "done"),
        ];
        let mut payload = json!({
            "messages": messages_to_openai_spec(&messages, &dialect()).unwrap()
        });

        collapse_content(
            &mut payload,
            &ContentCollapse {
                user: true,
                tool: true,
                ..ContentCollapse::NONE
            },
        );

        // system flag is off: stays an array
        assert!(payload["messages"][0]["content"].is_array());
        assert_eq!(payload["messages"][1]["content"], "hello");
        // multi-part content never collapses
        assert_eq!(payload["messages"][2]["content"].as_array().unwrap().len(), 2);
        assert_eq!(payload["messages"][3]["content"], "done");
    }

    #[test]
    fn test_collapse_value_ignores_non_text() {
        let mut content = json!([{"type": "image_url", "image_url": {"url": "x"}}]);
        assert!(!collapse_value(&mut content));
        assert!(content.is_array());

        let mut content = json!("already a string");
        assert!(!collapse_value(&mut content));
    }

    #[test]
    fn test_tools_to_openai_spec() -> GatewayResult<()> {
        let mut tool = weather_tool("test_tool");
        tool.parameters
            .extra
            .insert("additionalProperties".into(), json!(false));

        let spec = tools_to_openai_spec(&[tool])?;

        assert_eq!(spec.len(), 1);
        assert_eq!(spec[0]["type"], "function");
        assert_eq!(spec[0]["function"]["name"], "test_tool");
        assert_eq!(spec[0]["function"]["parameters"]["required"], json!(["location"]));
        assert_eq!(
            spec[0]["function"]["parameters"]["additionalProperties"],
            json!(false)
        );
        Ok(())
    }

    #[test]
    fn test_tools_to_openai_spec_duplicate() {
        let result = tools_to_openai_spec(&[weather_tool("test_tool"), weather_tool("test_tool")]);
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TranslationFailure);
        assert!(err.to_string().contains("Duplicate tool name"));
    }

    #[test]
    fn test_sanitize_function_name() {
        assert_eq!(sanitize_function_name("hello-world"), "hello-world");
        assert_eq!(sanitize_function_name("hello world"), "hello_world");
        assert_eq!(sanitize_function_name("hello@world"), "hello_world");
    }

    #[test]
    fn test_is_valid_function_name() {
        assert!(is_valid_function_name("hello-world"));
        assert!(is_valid_function_name("hello_world"));
        assert!(!is_valid_function_name("hello world"));
        assert!(!is_valid_function_name("hello@world"));
    }

    #[test]
    fn test_openai_response_to_chat_response_text() -> GatewayResult<()> {
        let response = json!({
            "choices": [{
                "message": { "role": "assistant", "content": "Hello from John Cena!" },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 10, "completion_tokens": 25 }
        });

        let chat = openai_response_to_chat_response(&response, "req-1", "gpt-4o")?;
        assert_eq!(chat.id, "req-1");
        assert_eq!(chat.model, "gpt-4o");
        assert_eq!(
            chat.message.content,
            MessageContent::Text("Hello from John Cena!".into())
        );
        assert_eq!(chat.finish_reason, FinishReason::Stop);
        assert_eq!(chat.usage, Some(Usage::new(Some(10), Some(25), Some(35))));
        Ok(())
    }

    #[test]
    fn test_openai_response_to_chat_response_tool_call() -> GatewayResult<()> {
        let response: Value = serde_json::from_str(OPENAI_TOOL_USE_RESPONSE).unwrap();
        let chat = openai_response_to_chat_response(&response, "req-1", "gpt-4o")?;

        assert_eq!(chat.model, "gpt-4o-2024-08-06");
        assert_eq!(chat.finish_reason, FinishReason::ToolCalls);
        let calls: Vec<_> = chat.message.content.tool_calls().collect();
        assert_eq!(calls, vec![("1", "example_fn", &json!({"param": "value"}))]);
        Ok(())
    }

    #[test]
    fn test_openai_response_invalid_func_name() {
        let mut response: Value = serde_json::from_str(OPENAI_TOOL_USE_RESPONSE).unwrap();
        response["choices"][0]["message"]["tool_calls"][0]["function"]["name"] =
            json!("invalid fn");

        let err = openai_response_to_chat_response(&response, "req-1", "gpt-4o").unwrap_err();
        assert!(err.to_string().contains("The provided function name"));
    }

    #[test]
    fn test_parse_arguments_keeps_invalid_json() {
        assert_eq!(parse_arguments("{\"a\":1}"), json!({"a": 1}));
        assert_eq!(parse_arguments(""), json!({}));
        assert_eq!(parse_arguments("invalid json {"), json!("invalid json {"));
    }

    #[test]
    fn test_classify_status() {
        let body = r#"{"error": {"message": "Rate limit reached", "type": "requests"}}"#;
        let err = classify_status(StatusCode::TOO_MANY_REQUESTS, body);
        assert_eq!(err.kind(), ErrorKind::UpstreamRejected(RejectReason::RateLimited));
        assert!(err.to_string().contains("Rate limit reached"));

        let err = classify_status(StatusCode::UNAUTHORIZED, r#"{"error": {"message": "Incorrect API key provided: sk-abcdefgh1234"}}"#);
        assert_eq!(err.kind(), ErrorKind::UpstreamRejected(RejectReason::Auth));
        assert!(!err.to_string().contains("sk-abcdefgh1234"));

        let err = classify_status(StatusCode::SERVICE_UNAVAILABLE, "");
        assert_eq!(err.kind(), ErrorKind::UpstreamTransport);

        let err = classify_status(StatusCode::BAD_REQUEST, "plain text body");
        assert_eq!(
            err.kind(),
            ErrorKind::UpstreamRejected(RejectReason::InvalidRequest)
        );
        assert!(err.to_string().contains("plain text body"));

        let err = classify_status(StatusCode::INTERNAL_SERVER_ERROR, "{}");
        assert_eq!(err.kind(), ErrorKind::UpstreamRejected(RejectReason::Other));
    }
}
