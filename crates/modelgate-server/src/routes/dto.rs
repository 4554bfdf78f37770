//! Wire shapes of the HTTP API that differ from the core types.

use axum::extract::rejection::JsonRejection;
use axum::Json;
use modelgate::errors::{GatewayError, GatewayResult};
use modelgate::models::chat::{ChatRequest, GenerationParams};
use modelgate::models::message::{Message, MessageContent, Role};
use modelgate::models::spec::ModelSpec;
use serde::{Deserialize, Serialize};

use crate::api_error::ApiError;

/// Inbound chat request. Roles arrive as free strings so that an unknown role
/// is reported as such instead of as a generic body rejection.
#[derive(Debug, Deserialize)]
pub struct ChatRequestBody {
    #[serde(default)]
    pub id: Option<String>,
    pub model: String,
    pub messages: Vec<MessageBody>,
    #[serde(flatten)]
    pub params: GenerationParams,
}

#[derive(Debug, Deserialize)]
pub struct MessageBody {
    pub role: String,
    #[serde(default)]
    pub content: MessageContent,
    #[serde(default)]
    pub name: Option<String>,
}

impl ChatRequestBody {
    pub fn into_request(self) -> GatewayResult<ChatRequest> {
        let messages = self
            .messages
            .into_iter()
            .map(|message| {
                Ok(Message {
                    role: Role::parse(&message.role)?,
                    content: message.content,
                    name: message.name,
                })
            })
            .collect::<GatewayResult<Vec<_>>>()?;

        let mut request = ChatRequest::new(self.model, messages);
        request.id = self.id;
        request.params = self.params;
        Ok(request)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelList {
    pub models: Vec<ModelSpec>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
}

/// Turn axum's body rejection into the gateway's error shape.
pub fn parse_json<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| GatewayError::InvalidRequest(rejection.body_text()).into())
}
