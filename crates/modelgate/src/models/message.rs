use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{GatewayError, GatewayResult};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumIter,
    strum_macros::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    /// Parse a caller-supplied role. Unknown roles are rejected, never dropped.
    pub fn parse(role: &str) -> GatewayResult<Role> {
        match role.to_ascii_lowercase().as_str() {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "tool" => Ok(Role::Tool),
            _ => Err(GatewayError::unsupported_role("gateway", role)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Where the bytes of an image come from, resolved from an [`ImageContent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource<'a> {
    Url(&'a str),
    Base64 { mime_type: &'a str, data: &'a str },
}

impl ImageContent {
    pub fn from_url<S: Into<String>>(url: S) -> Self {
        Self {
            url: Some(url.into()),
            data: None,
            mime_type: None,
        }
    }

    pub fn from_base64<S: Into<String>, T: Into<String>>(data: S, mime_type: T) -> Self {
        Self {
            url: None,
            data: Some(data.into()),
            mime_type: Some(mime_type.into()),
        }
    }

    /// Resolve the image source; `data:` URLs are treated as inline base64.
    pub fn source(&self) -> GatewayResult<ImageSource<'_>> {
        if let Some(data) = &self.data {
            let mime_type = self.mime_type.as_deref().ok_or_else(|| {
                GatewayError::TranslationFailure("inline image data requires mime_type".into())
            })?;
            return Ok(ImageSource::Base64 { mime_type, data });
        }

        match &self.url {
            Some(url) => match url
                .strip_prefix("data:")
                .and_then(|rest| rest.split_once(";base64,"))
            {
                Some((mime_type, data)) => Ok(ImageSource::Base64 { mime_type, data }),
                None => Ok(ImageSource::Url(url)),
            },
            None => Err(GatewayError::TranslationFailure(
                "image content needs either url or data".into(),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
/// One typed element of structured message content
pub enum ContentPart {
    Text {
        text: String,
    },
    Image(ImageContent),
    ToolCall {
        id: String,
        name: String,
        arguments: Value,
    },
    ToolResult {
        tool_call_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

impl ContentPart {
    pub fn text<S: Into<String>>(text: S) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn image_url<S: Into<String>>(url: S) -> Self {
        ContentPart::Image(ImageContent::from_url(url))
    }

    pub fn tool_call<I: Into<String>, N: Into<String>>(id: I, name: N, arguments: Value) -> Self {
        ContentPart::ToolCall {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    pub fn tool_result<I: Into<String>, C: Into<String>>(tool_call_id: I, content: C) -> Self {
        ContentPart::ToolResult {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentPart::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Message content: either a bare string or an ordered list of typed parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::Text(String::new())
    }
}

impl MessageContent {
    pub fn is_empty(&self) -> bool {
        match self {
            MessageContent::Text(text) => text.is_empty(),
            MessageContent::Parts(parts) => parts.is_empty(),
        }
    }

    /// All text in the content, parts joined in order.
    pub fn text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts.iter().filter_map(ContentPart::as_text).collect(),
        }
    }

    /// The content as a list of parts; bare text becomes a single text part.
    pub fn to_parts(&self) -> Vec<ContentPart> {
        match self {
            MessageContent::Text(text) => vec![ContentPart::text(text.clone())],
            MessageContent::Parts(parts) => parts.clone(),
        }
    }

    pub fn tool_calls(&self) -> impl Iterator<Item = (&str, &str, &Value)> {
        let parts: &[ContentPart] = match self {
            MessageContent::Parts(parts) => parts,
            MessageContent::Text(_) => &[],
        };
        parts.iter().filter_map(|part| match part {
            ContentPart::ToolCall {
                id,
                name,
                arguments,
            } => Some((id.as_str(), name.as_str(), arguments)),
            _ => None,
        })
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        MessageContent::Text(text)
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        MessageContent::Text(text.to_string())
    }
}

impl From<Vec<ContentPart>> for MessageContent {
    fn from(parts: Vec<ContentPart>) -> Self {
        MessageContent::Parts(parts)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A message to or from an LLM
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    pub fn new<C: Into<MessageContent>>(role: Role, content: C) -> Self {
        Message {
            role,
            content: content.into(),
            name: None,
        }
    }

    pub fn system<C: Into<MessageContent>>(content: C) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user<C: Into<MessageContent>>(content: C) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant<C: Into<MessageContent>>(content: C) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// A tool-role message carrying one tool result
    pub fn tool_result<I: Into<String>, C: Into<String>>(tool_call_id: I, content: C) -> Self {
        Self::new(
            Role::Tool,
            vec![ContentPart::tool_result(tool_call_id, content)],
        )
    }

    /// Append a part, turning bare text content into a parts list
    pub fn with_part(mut self, part: ContentPart) -> Self {
        let mut parts = match std::mem::take(&mut self.content) {
            MessageContent::Text(text) if text.is_empty() => Vec::new(),
            other => other.to_parts(),
        };
        parts.push(part);
        self.content = MessageContent::Parts(parts);
        self
    }
}
