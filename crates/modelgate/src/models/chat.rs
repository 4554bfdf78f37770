use serde::{Deserialize, Serialize};

use super::message::Message;
use super::tool::Tool;
use crate::errors::{GatewayError, GatewayResult};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(flatten)]
    pub params: GenerationParams,
    #[serde(default)]
    pub stream: bool,
}

impl ChatRequest {
    pub fn new<M: Into<String>>(model: M, messages: Vec<Message>) -> Self {
        Self {
            id: None,
            model: model.into(),
            messages,
            params: GenerationParams::default(),
            stream: false,
        }
    }

    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.params.tools = tools;
        self
    }

    /// The request id, or an empty string before the use case assigned one.
    pub fn request_id(&self) -> &str {
        self.id.as_deref().unwrap_or_default()
    }

    pub fn validate(&self) -> GatewayResult<()> {
        if self.model.trim().is_empty() {
            return Err(GatewayError::InvalidRequest("model id must not be empty".into()));
        }
        if self.messages.is_empty() {
            return Err(GatewayError::InvalidRequest(
                "chat requests need at least one message".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Other,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

impl Usage {
    pub fn new(
        input_tokens: Option<u32>,
        output_tokens: Option<u32>,
        total_tokens: Option<u32>,
    ) -> Self {
        let total_tokens = total_tokens.or(match (input_tokens, output_tokens) {
            (Some(input), Some(output)) => Some(input.saturating_add(output)),
            _ => None,
        });
        Self {
            input_tokens,
            output_tokens,
            total_tokens,
        }
    }

    /// Overlay the counts present in `later` onto `self`.
    pub fn merge(&mut self, later: Usage) {
        self.input_tokens = later.input_tokens.or(self.input_tokens);
        self.output_tokens = later.output_tokens.or(self.output_tokens);
        self.total_tokens = match (later.total_tokens, self.input_tokens, self.output_tokens) {
            (Some(total), _, _) => Some(total),
            (None, Some(input), Some(output)) => Some(input.saturating_add(output)),
            (None, _, _) => self.total_tokens,
        };
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub id: String,
    pub model: String,
    pub message: Message,
    pub finish_reason: FinishReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    pub created: i64,
}

/// Incremental fragment of a tool call within a stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub arguments: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallDelta>,
}

impl ChunkDelta {
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self {
            text: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.as_deref().map_or(true, str::is_empty) && self.tool_calls.is_empty()
    }

    /// Append `other` after the content already held in `self`.
    pub fn append(&mut self, other: ChunkDelta) {
        if let Some(text) = other.text {
            self.text.get_or_insert_with(String::new).push_str(&text);
        }
        self.tool_calls.extend(other.tool_calls);
    }
}

/// One incremental unit of a streamed chat response.
///
/// Within one stream `sequence` increases by one per chunk and exactly the
/// last chunk has `is_final` set; only that chunk carries the finish reason
/// and the usage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponseChunk {
    pub id: String,
    pub model: String,
    pub sequence: u64,
    pub delta: ChunkDelta,
    pub is_final: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::models::message::Message;
    use serde_json::json;

    #[test]
    fn test_usage_totals_saturate() {
        let usage = Usage::new(Some(u32::MAX), Some(1), None);
        assert_eq!(usage.total_tokens, Some(u32::MAX));

        let mut usage = Usage::new(Some(u32::MAX - 1), None, None);
        usage.merge(Usage::new(None, Some(5), None));
        assert_eq!(usage.output_tokens, Some(5));
        assert_eq!(usage.total_tokens, Some(u32::MAX));

        assert_eq!(Usage::new(Some(3), Some(4), None).total_tokens, Some(7));
    }

    #[test]
    fn test_request_flattens_params() {
        let request: ChatRequest = serde_json::from_value(json!({
            "model": "gpt-4o",
            "messages": [{"role": "user", "content": "hi"}],
            "temperature": 0.2,
            "max_tokens": 64
        }))
        .unwrap();

        assert_eq!(request.params.temperature, Some(0.2));
        assert_eq!(request.params.max_tokens, Some(64));
        assert!(!request.stream);
        assert_eq!(request.request_id(), "");
    }

    #[test]
    fn test_validate() {
        let request = ChatRequest::new("", vec![Message::user("hi")]);
        assert_eq!(request.validate().unwrap_err().kind(), ErrorKind::InvalidRequest);

        let request = ChatRequest::new("gpt-4o", vec![]);
        assert_eq!(request.validate().unwrap_err().kind(), ErrorKind::InvalidRequest);

        assert!(ChatRequest::new("gpt-4o", vec![Message::user("hi")])
            .validate()
            .is_ok());
    }

    #[test]
    fn test_usage_merge_prefers_later_counts() {
        let mut usage = Usage::new(Some(10), None, None);
        assert_eq!(usage.total_tokens, None);

        usage.merge(Usage::new(None, Some(5), None));
        assert_eq!(usage, Usage::new(Some(10), Some(5), Some(15)));

        usage.merge(Usage::new(Some(12), Some(6), Some(20)));
        assert_eq!(usage.total_tokens, Some(20));
        assert_eq!(usage.input_tokens, Some(12));
    }

    #[test]
    fn test_delta_append() {
        let mut delta = ChunkDelta::default();
        assert!(delta.is_empty());
        delta.append(ChunkDelta::text("Hel"));
        delta.append(ChunkDelta::text("lo"));
        assert_eq!(delta.text.as_deref(), Some("Hello"));
    }
}
