use serde::{Deserialize, Serialize};

use super::chat::Usage;
use crate::errors::{GatewayError, GatewayResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub model: String,
    pub contents: Vec<String>,
}

impl EmbedRequest {
    pub fn new<M: Into<String>>(model: M, contents: Vec<String>) -> Self {
        Self {
            id: None,
            model: model.into(),
            contents,
        }
    }

    pub fn request_id(&self) -> &str {
        self.id.as_deref().unwrap_or_default()
    }

    pub fn validate(&self) -> GatewayResult<()> {
        if self.model.trim().is_empty() {
            return Err(GatewayError::InvalidRequest("model id must not be empty".into()));
        }
        if self.contents.is_empty() {
            return Err(GatewayError::InvalidRequest(
                "embedding requests need at least one content".into(),
            ));
        }
        Ok(())
    }
}

/// Vectors are index-aligned with [`EmbedRequest::contents`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedResponse {
    pub id: String,
    pub model: String,
    pub embeddings: Vec<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl EmbedResponse {
    /// Reject a provider answer whose vector count does not match the inputs.
    pub fn ensure_aligned(self, expected: usize) -> GatewayResult<Self> {
        if self.embeddings.len() != expected {
            return Err(GatewayError::TranslationFailure(format!(
                "provider returned {} embeddings for {} inputs",
                self.embeddings.len(),
                expected
            )));
        }
        Ok(self)
    }
}
